//! Benchmark regression detection for CI
//!
//! Results are loaded from any of the JSON shapes benchmark tools emit,
//! normalized to milliseconds (time) or megabytes (memory), and compared
//! with a saved baseline. Regressions are graded against percentage
//! thresholds. Named benchmarks may also carry absolute limits.

use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Days of history considered for trends
pub const TREND_LOOKBACK_DAYS: i64 = 30;
const TREND_RECENT: usize = 5;
const TREND_CHANGE_PCT: f64 = 10.0;

/// Normalized unit of a measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Unit {
    #[serde(rename = "ms")]
    Ms,
    #[serde(rename = "MB")]
    Mb,
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ms => "ms",
            Self::Mb => "MB",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub value: f64,
    pub unit: Unit,
}

/// Convert `value` in `unit` to ms or MB
///
/// Unknown units are taken as milliseconds.
pub fn normalize(value: f64, unit: &str) -> Measurement {
    let (value, unit) = match unit.trim().to_lowercase().as_str() {
        "ns" => (value / 1e6, Unit::Ms),
        "us" | "µs" | "μs" => (value / 1e3, Unit::Ms),
        "ms" => (value, Unit::Ms),
        "s" => (value * 1e3, Unit::Ms),
        "b" => (value / 1e6, Unit::Mb),
        "kb" => (value / 1e3, Unit::Mb),
        "mb" => (value, Unit::Mb),
        other => {
            tracing::warn!(unit = other, "unknown unit, assuming ms");
            (value, Unit::Ms)
        }
    };
    Measurement { value, unit }
}

pub type Benchmarks = BTreeMap<String, Measurement>;

fn object_entry(value: &Value) -> Option<Measurement> {
    match value {
        Value::Number(n) => n.as_f64().map(|v| normalize(v, "ns")),
        Value::Object(obj) => {
            let v = obj
                .get("value")
                .or_else(|| obj.get("time"))
                .and_then(Value::as_f64)?;
            let unit = obj.get("unit").and_then(Value::as_str).unwrap_or("ns");
            Some(normalize(v, unit))
        }
        _ => None,
    }
}

/// Read benchmark values from any supported shape
///
/// Supported: `[{"id","value","unit"}]`, criterion summaries
/// (`{"benchmarks":[{"name","mean":{"estimate"}}]}`), `{"results":{..}}`,
/// a saved baseline, or a flat `{name: number | {value, unit}}` map.
/// Entries without a numeric value are skipped.
pub fn parse_results(data: &Value) -> Benchmarks {
    let mut out = Benchmarks::new();

    match data {
        Value::Array(items) => {
            for item in items {
                let id = item.get("id").and_then(Value::as_str);
                let value = item.get("value").and_then(Value::as_f64);
                if let (Some(id), Some(value)) = (id, value) {
                    let unit = item.get("unit").and_then(Value::as_str).unwrap_or("ns");
                    out.insert(id.to_string(), normalize(value, unit));
                }
            }
        }
        Value::Object(obj) => match (obj.get("benchmarks"), obj.get("results")) {
            (Some(Value::Array(benches)), _) => {
                for bench in benches {
                    let name = bench
                        .get("name")
                        .or_else(|| bench.get("id"))
                        .and_then(Value::as_str)
                        .unwrap_or("unknown");
                    let estimate = bench
                        .get("mean")
                        .and_then(|m| m.get("estimate"))
                        .and_then(Value::as_f64)
                        .unwrap_or(0.0);
                    if estimate > 0.0 {
                        out.insert(name.to_string(), normalize(estimate, "ns"));
                    }
                }
            }
            (Some(Value::Object(saved)), _) => {
                for (name, value) in saved {
                    if let Some(m) = object_entry(value) {
                        out.insert(name.clone(), m);
                    }
                }
            }
            (_, Some(Value::Object(results))) => {
                for (name, result) in results {
                    let ns = match result {
                        Value::Object(r) => r.get("duration_ns").and_then(Value::as_f64),
                        other => other.as_f64(),
                    };
                    if let Some(ns) = ns {
                        out.insert(name.clone(), normalize(ns, "ns"));
                    }
                }
            }
            _ => {
                for (name, value) in obj {
                    if let Some(m) = object_entry(value) {
                        out.insert(name.clone(), m);
                    }
                }
            }
        },
        _ => {}
    }

    out
}

pub fn load_results(path: &Path) -> Result<Benchmarks> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read: {}", path.display()))?;
    let data: Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse: {}", path.display()))?;
    let results = parse_results(&data);
    tracing::info!(path = %path.display(), count = results.len(), "loaded benchmarks");
    Ok(results)
}

/// Regression thresholds in percent
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Thresholds {
    pub minor: f64,
    pub major: f64,
    pub critical: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            minor: 5.0,
            major: 10.0,
            critical: 25.0,
        }
    }
}

impl Thresholds {
    pub fn strict() -> Self {
        Self {
            minor: 2.0,
            major: 5.0,
            critical: 15.0,
        }
    }

    pub fn severity(&self, change_pct: f64) -> Severity {
        if change_pct > self.critical {
            Severity::Critical
        } else if change_pct > self.major {
            Severity::Major
        } else {
            Severity::Minor
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Minor,
    Major,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Minor => "MINOR",
            Self::Major => "MAJOR",
            Self::Critical => "CRITICAL",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Change {
    pub name: String,
    pub baseline: f64,
    pub current: f64,
    pub unit: Unit,
    pub change_pct: f64,
    /// Set for regressions only
    pub severity: Option<Severity>,
}

#[derive(Debug, Default, Serialize)]
pub struct Comparison {
    pub regressions: Vec<Change>,
    pub improvements: Vec<Change>,
    pub stable: Vec<Change>,
    pub new: Vec<(String, Measurement)>,
    pub missing: Vec<(String, Measurement)>,
}

impl Comparison {
    pub fn count(&self, severity: Severity) -> usize {
        self.regressions
            .iter()
            .filter(|r| r.severity == Some(severity))
            .count()
    }
}

/// Classify every benchmark of `current` against `baseline`
pub fn compare(baseline: &Benchmarks, current: &Benchmarks, thresholds: &Thresholds) -> Comparison {
    let mut out = Comparison::default();

    for (name, base) in baseline {
        if !current.contains_key(name) {
            out.missing.push((name.clone(), *base));
        }
    }

    for (name, cur) in current {
        let Some(base) = baseline.get(name) else {
            out.new.push((name.clone(), *cur));
            continue;
        };
        if base.unit != cur.unit {
            tracing::warn!(benchmark = %name, "baseline and current measure different things, skipping");
            continue;
        }
        if base.value == 0.0 {
            tracing::debug!(benchmark = %name, "zero baseline, skipping");
            continue;
        }

        let change_pct = (cur.value - base.value) / base.value * 100.0;
        let mut change = Change {
            name: name.clone(),
            baseline: base.value,
            current: cur.value,
            unit: cur.unit,
            change_pct,
            severity: None,
        };

        if change_pct > thresholds.minor {
            change.severity = Some(thresholds.severity(change_pct));
            out.regressions.push(change);
        } else if change_pct < -thresholds.minor {
            out.improvements.push(change);
        } else {
            out.stable.push(change);
        }
    }

    out.regressions
        .sort_by(|a, b| b.change_pct.total_cmp(&a.change_pct));
    out.improvements
        .sort_by(|a, b| a.change_pct.total_cmp(&b.change_pct));
    out
}

/// Absolute limit for one benchmark, as read from the limits file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Limit {
    pub threshold: f64,
    #[serde(default = "default_limit_unit")]
    pub unit: String,
}

fn default_limit_unit() -> String {
    "ms".to_string()
}

pub fn load_limits(path: &Path) -> Result<BTreeMap<String, Limit>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read: {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse: {}", path.display()))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub name: String,
    pub value: f64,
    pub limit: f64,
    pub unit: Unit,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {:.2} {} (limit {} {})",
            self.name, self.value, self.unit, self.limit, self.unit
        )
    }
}

/// Benchmarks above their absolute limit
pub fn check_limits(current: &Benchmarks, limits: &BTreeMap<String, Limit>) -> Vec<Violation> {
    limits
        .iter()
        .filter_map(|(name, limit)| {
            let measured = current.get(name)?;
            let limit = normalize(limit.threshold, &limit.unit);
            (limit.unit == measured.unit && measured.value > limit.value).then(|| Violation {
                name: name.clone(),
                value: measured.value,
                limit: limit.value,
                unit: limit.unit,
            })
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitInfo {
    pub commit: String,
    pub branch: String,
}

impl GitInfo {
    /// First 8 characters of the commit
    pub fn short_commit(&self) -> &str {
        self.commit.get(..8).unwrap_or(&self.commit)
    }
}

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!text.is_empty()).then_some(text)
}

/// Current commit and branch, `unknown` when git is unavailable
pub fn git_info() -> GitInfo {
    GitInfo {
        commit: git(&["rev-parse", "HEAD"]).unwrap_or_else(|| "unknown".to_string()),
        branch: git(&["rev-parse", "--abbrev-ref", "HEAD"]).unwrap_or_else(|| "unknown".to_string()),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineMetadata {
    pub total_benchmarks: usize,
    pub git_commit: String,
    pub git_branch: String,
}

/// Saved baseline file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Baseline {
    pub timestamp: String,
    pub benchmarks: Benchmarks,
    pub metadata: BaselineMetadata,
}

impl Baseline {
    pub fn new(benchmarks: Benchmarks, git: &GitInfo) -> Self {
        Self {
            timestamp: Local::now().to_rfc3339(),
            metadata: BaselineMetadata {
                total_benchmarks: benchmarks.len(),
                git_commit: git.commit.clone(),
                git_branch: git.branch.clone(),
            },
            benchmarks,
        }
    }

    /// Write to `path`, plus a timestamped copy in `history_dir`
    ///
    /// Returns the history copy's path when one was written.
    pub fn save(&self, path: &Path, history_dir: Option<&Path>) -> Result<Option<PathBuf>> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, &json).with_context(|| format!("Failed to write: {}", path.display()))?;
        tracing::info!(path = %path.display(), count = self.benchmarks.len(), "baseline saved");

        let Some(dir) = history_dir else {
            return Ok(None);
        };
        fs::create_dir_all(dir).with_context(|| format!("Failed to create: {}", dir.display()))?;
        let commit = self.metadata.git_commit.get(..8).unwrap_or(&self.metadata.git_commit);
        let name = format!(
            "performance_{}_{}.json",
            Local::now().format("%Y%m%d_%H%M%S"),
            commit
        );
        let history_file = dir.join(name);
        fs::write(&history_file, &json)
            .with_context(|| format!("Failed to write: {}", history_file.display()))?;
        Ok(Some(history_file))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendKind {
    Improving,
    Degrading,
    Stable,
    InsufficientData,
}

impl fmt::Display for TrendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Improving => "improving",
            Self::Degrading => "degrading",
            Self::Stable => "stable",
            Self::InsufficientData => "insufficient_data",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trend {
    pub kind: TrendKind,
    pub data_points: usize,
}

/// Timestamp encoded in a `performance_<date>_<time>_<commit>.json` name
fn history_timestamp(path: &Path) -> Option<NaiveDateTime> {
    let stem = path.file_stem()?.to_str()?;
    let mut parts = stem.split('_').skip(1);
    let stamp = format!("{}_{}", parts.next()?, parts.next()?);
    NaiveDateTime::parse_from_str(&stamp, "%Y%m%d_%H%M%S").ok()
}

/// Trend of one benchmark over the history files newer than the lookback
pub fn analyze_trend(history_dir: &Path, name: &str, now: NaiveDateTime) -> Trend {
    let cutoff = now - ChronoDuration::days(TREND_LOOKBACK_DAYS);

    let mut points: Vec<(NaiveDateTime, f64)> = fs::read_dir(history_dir)
        .into_iter()
        .flatten()
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .filter_map(|p| {
            let at = history_timestamp(&p).filter(|at| *at >= cutoff)?;
            let data: Value = serde_json::from_str(&fs::read_to_string(&p).ok()?).ok()?;
            let value = object_entry(data.get("benchmarks")?.get(name)?)?;
            Some((at, value.value))
        })
        .collect();
    points.sort_by(|a, b| a.0.cmp(&b.0));

    let data_points = points.len();
    if data_points < 2 {
        return Trend {
            kind: TrendKind::InsufficientData,
            data_points,
        };
    }

    let split = data_points.saturating_sub(TREND_RECENT);
    let (older, recent) = points.split_at(split);
    let mean = |vals: &[(NaiveDateTime, f64)]| vals.iter().map(|(_, v)| v).sum::<f64>() / vals.len() as f64;

    let kind = if older.is_empty() || mean(older) == 0.0 {
        TrendKind::Stable
    } else {
        let change = (mean(recent) - mean(older)) / mean(older) * 100.0;
        if change > TREND_CHANGE_PCT {
            TrendKind::Degrading
        } else if change < -TREND_CHANGE_PCT {
            TrendKind::Improving
        } else {
            TrendKind::Stable
        }
    };

    Trend { kind, data_points }
}

/// Overall CI status of an analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Passed,
    Warning,
    Critical,
}

impl Status {
    /// 0 passed, 1 major regressions, 2 critical regressions or violations
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Passed => 0,
            Self::Warning => 1,
            Self::Critical => 2,
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct Analysis {
    pub comparison: Comparison,
    pub violations: Vec<Violation>,
    /// Trends of regressed benchmarks, when history is available
    pub trends: BTreeMap<String, Trend>,
}

impl Analysis {
    pub fn status(&self) -> Status {
        if self.comparison.count(Severity::Critical) > 0 || !self.violations.is_empty() {
            Status::Critical
        } else if self.comparison.count(Severity::Major) > 0 {
            Status::Warning
        } else {
            Status::Passed
        }
    }

    /// Markdown report
    pub fn render(&self, date: &str) -> String {
        let c = &self.comparison;
        let mut lines = vec![
            "# Performance Regression Analysis Report".to_string(),
            format!("**Date**: {}", date),
            String::new(),
            "## Executive Summary".to_string(),
            format!("- **Total Regressions**: {}", c.regressions.len()),
            format!("- **Critical**: {}", c.count(Severity::Critical)),
            format!("- **Major**: {}", c.count(Severity::Major)),
            format!("- **Improvements**: {}", c.improvements.len()),
            format!("- **Stable**: {}", c.stable.len()),
            format!("- **Threshold Violations**: {}", self.violations.len()),
            String::new(),
        ];

        lines.extend(match self.status() {
            Status::Critical => [
                "## ❌ PERFORMANCE STATUS: CRITICAL",
                "Critical performance regressions detected.",
            ],
            Status::Warning => [
                "## ⚠️ PERFORMANCE STATUS: WARNING",
                "Major performance regressions detected, review required.",
            ],
            Status::Passed => [
                "## ✅ PERFORMANCE STATUS: PASSED",
                "No critical performance issues detected.",
            ],
        }
        .map(str::to_string));
        lines.push(String::new());

        if !c.regressions.is_empty() {
            lines.push("## Regressions".to_string());
            lines.push(String::new());
            for r in &c.regressions {
                let severity = r.severity.unwrap_or(Severity::Minor);
                let icon = match severity {
                    Severity::Critical => "❌",
                    Severity::Major => "⚠️",
                    Severity::Minor => "📊",
                };
                lines.push(format!("### {} {}", icon, r.name));
                lines.push(format!("- **Current**: {:.3} {}", r.current, r.unit));
                lines.push(format!("- **Baseline**: {:.3} {}", r.baseline, r.unit));
                lines.push(format!("- **Change**: {:+.1}%", r.change_pct));
                lines.push(format!("- **Severity**: {}", severity));
                if let Some(trend) = self.trends.get(&r.name) {
                    lines.push(format!(
                        "- **Trend ({}d)**: {} ({} data points)",
                        TREND_LOOKBACK_DAYS, trend.kind, trend.data_points
                    ));
                }
                lines.push(String::new());
            }
        }

        if !c.improvements.is_empty() {
            lines.push("## Improvements".to_string());
            lines.push(String::new());
            for i in &c.improvements {
                lines.push(format!(
                    "- {}: {:+.1}% ({:.3} → {:.3} {})",
                    i.name, i.change_pct, i.baseline, i.current, i.unit
                ));
            }
            lines.push(String::new());
        }

        if !c.new.is_empty() {
            lines.push("## New Benchmarks".to_string());
            lines.push(String::new());
            for (name, m) in &c.new {
                lines.push(format!("- {}: {:.3} {}", name, m.value, m.unit));
            }
            lines.push(String::new());
        }

        if !c.missing.is_empty() {
            lines.push("## Missing Benchmarks".to_string());
            lines.push(String::new());
            for (name, _) in &c.missing {
                lines.push(format!("- {}", name));
            }
            lines.push(String::new());
        }

        if !self.violations.is_empty() {
            lines.push("## Critical Threshold Violations".to_string());
            lines.push(String::new());
            for v in &self.violations {
                lines.push(format!("- ❌ {}", v));
            }
            lines.push(String::new());
        }

        lines.join("\n")
    }
}

/// Inputs of one `bench check` run
#[derive(Debug, Clone)]
pub struct CheckConfig {
    pub baseline: PathBuf,
    pub thresholds: Thresholds,
    pub limits: BTreeMap<String, Limit>,
    pub update_baseline: bool,
    pub history_dir: Option<PathBuf>,
}

#[derive(Debug)]
pub enum CheckOutcome {
    /// No baseline existed; one was written from the results
    BaselineCreated { path: PathBuf, benchmarks: usize },
    Analyzed(Analysis),
}

/// Compare `current` against the configured baseline
pub fn check(current: Benchmarks, config: &CheckConfig) -> Result<CheckOutcome> {
    if !config.baseline.is_file() {
        tracing::warn!(path = %config.baseline.display(), "no baseline, creating one");
        let count = current.len();
        Baseline::new(current, &git_info()).save(&config.baseline, config.history_dir.as_deref())?;
        return Ok(CheckOutcome::BaselineCreated {
            path: config.baseline.clone(),
            benchmarks: count,
        });
    }

    let baseline = load_results(&config.baseline)?;
    let comparison = compare(&baseline, &current, &config.thresholds);
    let violations = check_limits(&current, &config.limits);

    let mut trends = BTreeMap::new();
    if let Some(dir) = &config.history_dir {
        let now = Local::now().naive_local();
        for r in &comparison.regressions {
            trends.insert(r.name.clone(), analyze_trend(dir, &r.name, now));
        }
    }

    if config.update_baseline {
        Baseline::new(current, &git_info()).save(&config.baseline, config.history_dir.as_deref())?;
    }

    Ok(CheckOutcome::Analyzed(Analysis {
        comparison,
        violations,
        trends,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn ms(value: f64) -> Measurement {
        Measurement {
            value,
            unit: Unit::Ms,
        }
    }

    fn bench(entries: &[(&str, f64)]) -> Benchmarks {
        entries.iter().map(|(n, v)| (n.to_string(), ms(*v))).collect()
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(2_000_000.0, "ns"), ms(2.0));
        assert_eq!(normalize(500.0, "µs"), ms(0.5));
        assert_eq!(normalize(1.5, "s"), ms(1500.0));
        assert_eq!(
            normalize(2048.0, "KB"),
            Measurement {
                value: 2.048,
                unit: Unit::Mb
            }
        );
    }

    #[test]
    fn test_parse_formats() {
        let list = json!([{"id": "a", "value": 3.0, "unit": "ms"}, {"id": "b", "value": "fast"}]);
        assert_eq!(parse_results(&list), bench(&[("a", 3.0)]));

        let criterion = json!({"benchmarks": [{"name": "a", "mean": {"estimate": 1_000_000.0}}, {"id": "z", "mean": {}}]});
        assert_eq!(parse_results(&criterion), bench(&[("a", 1.0)]));

        let results = json!({"results": {"a": {"duration_ns": 5_000_000}, "b": 1_000_000, "c": "x"}});
        assert_eq!(parse_results(&results), bench(&[("a", 5.0), ("b", 1.0)]));

        let flat = json!({"a": {"time": 2.0, "unit": "ms"}, "b": 3_000_000, "c": [1]});
        assert_eq!(parse_results(&flat), bench(&[("a", 2.0), ("b", 3.0)]));

        let saved = json!({
            "timestamp": "2025-01-01T00:00:00",
            "benchmarks": {"a": {"value": 4.0, "unit": "ms"}},
            "metadata": {}
        });
        assert_eq!(parse_results(&saved), bench(&[("a", 4.0)]));
    }

    #[test]
    fn test_compare() {
        let baseline = bench(&[("slow", 10.0), ("fast", 10.0), ("same", 10.0), ("gone", 1.0), ("zero", 0.0)]);
        let current = bench(&[("slow", 13.0), ("fast", 8.0), ("same", 10.3), ("added", 1.0), ("zero", 5.0)]);

        let c = compare(&baseline, &current, &Thresholds::default());
        assert_eq!(c.regressions.len(), 1);
        assert_eq!(c.regressions[0].name, "slow");
        assert_eq!(c.regressions[0].severity, Some(Severity::Critical));
        assert_eq!(c.improvements[0].name, "fast");
        assert_eq!(c.stable[0].name, "same");
        assert_eq!(c.new, vec![("added".to_string(), ms(1.0))]);
        assert_eq!(c.missing, vec![("gone".to_string(), ms(1.0))]);

        // 3% is a regression under strict thresholds
        let strict = compare(&baseline, &current, &Thresholds::strict());
        assert_eq!(strict.regressions.len(), 2);
    }

    #[test]
    fn test_severity_and_status() {
        let t = Thresholds::default();
        assert_eq!(t.severity(6.0), Severity::Minor);
        assert_eq!(t.severity(12.0), Severity::Major);
        assert_eq!(t.severity(30.0), Severity::Critical);

        let analysis = Analysis {
            comparison: compare(&bench(&[("a", 10.0)]), &bench(&[("a", 11.5)]), &t),
            ..Analysis::default()
        };
        assert_eq!(analysis.status(), Status::Warning);
        assert_eq!(analysis.status().exit_code(), 1);
        let report = analysis.render("today");
        assert!(report.contains("PERFORMANCE STATUS: WARNING"));
        assert!(report.contains("- **Change**: +15.0%"));
    }

    #[test]
    fn test_check_limits() {
        let mut limits = BTreeMap::new();
        limits.insert(
            "search".to_string(),
            Limit {
                threshold: 5.0,
                unit: "ms".to_string(),
            },
        );
        limits.insert(
            "startup".to_string(),
            Limit {
                threshold: 2.0,
                unit: "s".to_string(),
            },
        );
        let current = bench(&[("search", 6.0), ("startup", 1500.0)]);
        let violations = check_limits(&current, &limits);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].name, "search");
        assert_eq!(violations[0].to_string(), "search: 6.00 ms (limit 5 ms)");
    }

    #[test]
    fn test_trend() {
        let dir = tempfile::tempdir().unwrap();
        let now = NaiveDateTime::parse_from_str("20250301_120000", "%Y%m%d_%H%M%S").unwrap();
        let write = |stamp: &str, value: f64| {
            let data = json!({"benchmarks": {"a": {"value": value, "unit": "ms"}}});
            fs::write(
                dir.path().join(format!("performance_{}_abcdef12.json", stamp)),
                data.to_string(),
            )
            .unwrap();
        };

        assert_eq!(analyze_trend(dir.path(), "a", now).kind, TrendKind::InsufficientData);

        write("20250115_000000", 1.0); // outside lookback
        for day in 10..=15 {
            write(&format!("202502{}_000000", day), if day == 10 { 10.0 } else { 12.0 });
        }
        let trend = analyze_trend(dir.path(), "a", now);
        assert_eq!(trend.data_points, 6);
        assert_eq!(trend.kind, TrendKind::Degrading);
    }

    #[test]
    fn test_check_creates_then_compares() {
        let dir = tempfile::tempdir().unwrap();
        let config = CheckConfig {
            baseline: dir.path().join("baseline.json"),
            thresholds: Thresholds::default(),
            limits: BTreeMap::new(),
            update_baseline: false,
            history_dir: Some(dir.path().join("history")),
        };

        match check(bench(&[("a", 10.0)]), &config).unwrap() {
            CheckOutcome::BaselineCreated { benchmarks, .. } => assert_eq!(benchmarks, 1),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(fs::read_dir(dir.path().join("history")).unwrap().count(), 1);

        match check(bench(&[("a", 20.0)]), &config).unwrap() {
            CheckOutcome::Analyzed(analysis) => {
                assert_eq!(analysis.status(), Status::Critical);
                assert_eq!(analysis.trends["a"].kind, TrendKind::InsufficientData);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
