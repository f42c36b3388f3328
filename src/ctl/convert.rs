//! Bulk conversion of JSON annotations to the compact v4 form
//!
//! Components are read from the generated architecture section of the doc
//! file, converted to `// @ctl4: id:K:cur:tgt[:flags]` lines, and written
//! back over the matching `@component` line of each source file.

use anyhow::{bail, Context, Result};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use super::model::{format_number, Component, Kind};

/// Abbreviations applied to flags before the generic shortening
const FLAG_ABBREVIATIONS: &[(&str, &str)] = &[
    ("clean_architecture", "clean"),
    ("solid_principles", "solid"),
    ("single_responsibility", "sr"),
    ("dependency_injection", "di"),
    ("di_integration", "di"),
    ("di_ready", "di"),
    ("strategy_pattern", "strategy"),
    ("circuit_breaker", "cb"),
    ("production_ready", "prod"),
    ("production", "prod"),
    ("performance", "perf"),
    ("optimization", "opt"),
    ("optimized", "opt"),
    ("resilience", "resilient"),
    ("monitoring", "monitor"),
    ("alerting", "alerts"),
    ("ai_powered", "ai"),
    ("ai-optimized", "ai"),
    ("embeddings", "embed"),
    ("machine_learning", "ml"),
    ("neural_network", "nn"),
    ("deep_learning", "dl"),
    ("multi_provider", "multi"),
    ("orchestration", "orchestr"),
    ("coordination", "coord"),
    ("concurrent", "concur"),
    ("asynchronous", "async"),
    ("real_time", "rt"),
    ("streaming", "stream"),
    ("transactional", "tx"),
    ("integration", "integ"),
    ("comprehensive", "comp"),
    ("unit_tests", "unit"),
    ("benchmark", "bench"),
    ("profiler", "prof"),
    ("coverage", "cov"),
    ("infrastructure", "infra"),
    ("configuration", "config"),
    ("validation", "valid"),
    ("serialization", "serial"),
    ("deserialization", "deserial"),
    ("registration", "reg"),
];

const MAX_FLAGS: usize = 5;
const MAX_FLAG_LEN: usize = 10;

/// Components parsed from the doc's JSON block
#[derive(Debug, Default)]
pub struct DocComponents {
    /// Each component with the raw JSON line it came from
    pub components: Vec<(Component, String)>,
    pub parse_errors: usize,
}

/// Read the JSON lines of the section that starts at `start_marker`
pub fn extract_doc_components(doc: &str, start_marker: &str) -> Result<DocComponents> {
    let pattern = format!(r"(?s){}.*?```json\n(.*?)\n?```", regex::escape(start_marker));
    let re = Regex::new(&pattern).context("Failed to build section pattern")?;
    let Some(caps) = re.captures(doc) else {
        bail!("Section '{}' with a ```json block not found", start_marker);
    };

    let mut out = DocComponents::default();
    for (idx, line) in caps[1].lines().map(str::trim).filter(|l| !l.is_empty()).enumerate() {
        match serde_json::from_str::<Component>(line) {
            Ok(component) => out.components.push((component, line.to_string())),
            Err(e) => {
                tracing::warn!(line = idx + 1, error = %e, "unparsable component line");
                out.parse_errors += 1;
            }
        }
    }
    Ok(out)
}

fn compress_flag(flag: &str) -> String {
    let short = FLAG_ABBREVIATIONS
        .iter()
        .find(|(long, _)| *long == flag)
        .map_or(flag, |(_, short)| short);

    let chars: Vec<char> = short.chars().collect();
    if chars.len() <= MAX_FLAG_LEN {
        return short.to_string();
    }

    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    let middle: String = chars[2..chars.len() - 2]
        .iter()
        .filter(|c| !matches!(c, 'a' | 'e' | 'i' | 'o' | 'u'))
        .collect();
    format!("{}{}{}", head, middle, tail)
}

/// Abbreviate, dedupe, sort and cap a flag list; joined with `,`
pub fn compress_flags(flags: &[String]) -> String {
    let unique: BTreeSet<String> = flags.iter().map(|f| compress_flag(f)).collect();
    unique
        .into_iter()
        .take(MAX_FLAGS)
        .collect::<Vec<_>>()
        .join(",")
}

/// v4 kind letter: components, tests, agents, services, errors and
/// bugs keep theirs, anything else becomes `C`
fn v4_kind(kind: Kind) -> Kind {
    match kind {
        Kind::C | Kind::T | Kind::A | Kind::S | Kind::E | Kind::B => kind,
        _ => Kind::C,
    }
}

/// Render the `// @ctl4:` line for a component
pub fn to_ctl4(component: &Component) -> String {
    let (cur, tgt) = match &component.m {
        Some(m) => (format_number(&m.cur), format_number(&m.tgt)),
        None => ("0".to_string(), "100".to_string()),
    };

    let mut parts = vec![
        component.id.clone(),
        v4_kind(component.k).to_string(),
        cur,
        tgt,
    ];
    let flags = compress_flags(component.f.as_deref().unwrap_or_default());
    if !flags.is_empty() {
        parts.push(flags);
    }
    format!("// @ctl4: {}", parts.join(":"))
}

/// One row of the conversion mapping table
#[derive(Debug, Clone, Serialize)]
pub struct MappingRow {
    pub id: String,
    pub kind: String,
    /// Original JSON, cut to 50 characters
    pub original: String,
    pub ctl4: String,
    /// `orig→new (pct%)`
    pub compression: String,
    pub file: String,
}

impl MappingRow {
    pub fn new(component: &Component, raw: &str, ctl4: &str) -> Self {
        let original_len = raw.chars().count();
        let new_len = ctl4.chars().count();
        let pct = if original_len > 0 {
            (1.0 - new_len as f64 / original_len as f64) * 100.0
        } else {
            0.0
        };

        let original = if original_len > 50 {
            format!("{}...", raw.chars().take(50).collect::<String>())
        } else {
            raw.to_string()
        };

        Self {
            id: component.id.clone(),
            kind: component.k.to_string(),
            original,
            ctl4: ctl4.to_string(),
            compression: format!("{}→{} ({:.1}%)", original_len, new_len, pct),
            file: component
                .location()
                .map(|loc| split_location(loc).0.to_string())
                .unwrap_or_else(|| "N/A".to_string()),
        }
    }
}

/// Split `path:line` into its parts (line is `None` when absent)
fn split_location(location: &str) -> (&str, Option<usize>) {
    match location.rsplit_once(':') {
        Some((path, line)) => match line.parse() {
            Ok(n) => (path, Some(n)),
            Err(_) => (location, None),
        },
        None => (location, None),
    }
}

/// Result of replacing one annotation in source
#[derive(Debug, Clone, PartialEq)]
pub enum ReplaceOutcome {
    Replaced { file: PathBuf, line: usize },
    /// Dry-run: the line was found but left alone
    WouldReplace { file: PathBuf, line: usize },
    NotFound(String),
}

/// Replace the `@component` line for `component` with `ctl4`
///
/// The file named by `x_file` is looked up under each of `roots` in order.
/// The text before the comment (indentation or code) is kept.
pub fn replace_annotation(
    component: &Component,
    ctl4: &str,
    roots: &[PathBuf],
    dry_run: bool,
) -> Result<ReplaceOutcome> {
    let Some(location) = component.location() else {
        return Ok(ReplaceOutcome::NotFound("no x_file".to_string()));
    };
    let rel = split_location(location).0.replace('\\', "/");
    let Some(file) = roots.iter().map(|r| r.join(&rel)).find(|p| p.is_file()) else {
        return Ok(ReplaceOutcome::NotFound(format!("file not found: {}", rel)));
    };

    let pattern = format!(
        r#"//\s*@component:\s*\{{.*"id"\s*:\s*"{}""#,
        regex::escape(&component.id)
    );
    let re = Regex::new(&pattern).context("Failed to build annotation pattern")?;

    let content =
        fs::read_to_string(&file).with_context(|| format!("Failed to read: {}", file.display()))?;
    let mut lines: Vec<String> = content.split_inclusive('\n').map(str::to_string).collect();

    let Some((idx, start)) = lines
        .iter()
        .enumerate()
        .find_map(|(i, l)| re.find(l).map(|m| (i, m.start())))
    else {
        return Ok(ReplaceOutcome::NotFound(format!(
            "annotation for '{}' not in {}",
            component.id, rel
        )));
    };

    if dry_run {
        return Ok(ReplaceOutcome::WouldReplace {
            file,
            line: idx + 1,
        });
    }

    let old = &lines[idx];
    let ending = if old.ends_with("\r\n") {
        "\r\n"
    } else if old.ends_with('\n') {
        "\n"
    } else {
        ""
    };
    lines[idx] = format!("{}{}{}", &old[..start], ctl4, ending);

    fs::write(&file, lines.concat())
        .with_context(|| format!("Failed to write: {}", file.display()))?;
    tracing::debug!(file = %file.display(), line = idx + 1, id = %component.id, "annotation replaced");

    Ok(ReplaceOutcome::Replaced {
        file,
        line: idx + 1,
    })
}

fn group_label(kind: Kind) -> &'static str {
    match kind {
        Kind::C => "Core Components",
        Kind::T => "Tests & Benchmarks",
        Kind::A => "AI Agents",
        Kind::S => "Services",
        Kind::E => "Error Types",
        Kind::B => "Batches",
        _ => "Other",
    }
}

/// Doc section listing every component as a v4 line, grouped by kind
pub fn compact_section(components: &[Component]) -> String {
    let mut lines = vec![
        "## Components (CTL v4.0 Ultra-Compact Format)".to_string(),
        String::new(),
        "```ctl4".to_string(),
    ];

    for kind in [Kind::C, Kind::T, Kind::A, Kind::S, Kind::E, Kind::B] {
        let mut group: Vec<String> = components
            .iter()
            .filter(|c| v4_kind(c.k) == kind)
            .map(to_ctl4)
            .collect();
        if group.is_empty() {
            continue;
        }
        group.sort();
        lines.push(String::new());
        lines.push(format!("// {} ({})", group_label(kind), group.len()));
        lines.extend(group);
    }

    lines.push("```".to_string());
    lines.join("\n")
}

/// Summary of a conversion run
#[derive(Debug, Default, Serialize)]
pub struct ConvertReport {
    pub parsed: usize,
    pub converted: usize,
    pub replaced: usize,
    pub not_found: usize,
    pub parse_errors: usize,
    pub original_size: usize,
    pub compressed_size: usize,
    pub duration_ms: u128,
    pub rows: Vec<MappingRow>,
    /// Details for components whose annotation was not replaced
    pub misses: Vec<(String, String)>,
    #[serde(skip)]
    pub section: String,
}

impl ConvertReport {
    /// Size saved by the v4 form, in percent
    pub fn compression_percent(&self) -> f64 {
        if self.original_size == 0 {
            0.0
        } else {
            (1.0 - self.compressed_size as f64 / self.original_size as f64) * 100.0
        }
    }
}

/// Convert every component listed in the doc and rewrite its source line
pub fn convert(
    doc_path: &Path,
    start_marker: &str,
    roots: &[PathBuf],
    dry_run: bool,
) -> Result<ConvertReport> {
    let started = Instant::now();
    let doc = fs::read_to_string(doc_path)
        .with_context(|| format!("Failed to read: {}", doc_path.display()))?;
    let parsed = extract_doc_components(&doc, start_marker)?;
    if parsed.components.is_empty() {
        bail!("No components found in {}", doc_path.display());
    }

    let mut report = ConvertReport {
        parsed: parsed.components.len(),
        parse_errors: parsed.parse_errors,
        ..ConvertReport::default()
    };

    for (component, raw) in &parsed.components {
        let ctl4 = to_ctl4(component);
        let row = MappingRow::new(component, raw, &ctl4);
        report.original_size += raw.chars().count();
        report.compressed_size += ctl4.chars().count();
        report.converted += 1;

        match replace_annotation(component, &ctl4, roots, dry_run)? {
            ReplaceOutcome::Replaced { .. } | ReplaceOutcome::WouldReplace { .. } => {
                report.replaced += 1
            }
            ReplaceOutcome::NotFound(reason) => {
                tracing::warn!(id = %component.id, %reason, "annotation not replaced");
                report.not_found += 1;
                report.misses.push((component.id.clone(), reason));
            }
        }
        report.rows.push(row);
    }

    report.rows.sort_by(|a, b| (&a.kind, &a.id).cmp(&(&b.kind, &b.id)));
    let components: Vec<Component> = parsed.components.into_iter().map(|(c, _)| c).collect();
    report.section = compact_section(&components);
    report.duration_ms = started.elapsed().as_millis();
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ctl::model::Maturity;
    use pretty_assertions::assert_eq;

    fn flags(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_compress_flags() {
        assert_eq!(
            compress_flags(&flags(&["production_ready", "dependency_injection", "di_ready", "hnsw"])),
            "di,hnsw,prod"
        );
        // 14 chars: first and last two kept, vowels dropped in between
        assert_eq!(compress_flag("vectorizations"), "vectrztns");
        assert_eq!(compress_flag("shortflag"), "shortflag");
        assert_eq!(
            compress_flags(&flags(&["a", "b", "c", "d", "e", "f"])),
            "a,b,c,d,e"
        );
        assert_eq!(compress_flags(&[]), "");
    }

    #[test]
    fn test_to_ctl4() {
        let mut c = Component::new(Kind::C, "memory_lib", "Memory");
        c.m = Some(Maturity::new(92, 100, "%"));
        c.f = Some(flags(&["production", "hnsw"]));
        assert_eq!(to_ctl4(&c), "// @ctl4: memory_lib:C:92:100:hnsw,prod");

        let mut m = Component::new(Kind::M, "latency", "p99");
        m.m = Some(Maturity::new(
            crate::ctl::model::number_from_f64(12.5),
            crate::ctl::model::number_from_f64(10.0),
            "ms",
        ));
        assert_eq!(to_ctl4(&m), "// @ctl4: latency:C:12.5:10");
    }

    #[test]
    fn test_extract_doc_components() {
        let doc = "intro\n# AUTO-GENERATED ARCHITECTURE\n\n```json\n{\"k\":\"C\",\"id\":\"a\",\"t\":\"A\"}\nnot json\n{\"k\":\"T\",\"id\":\"b\",\"t\":\"B\"}\n```\n";
        let parsed = extract_doc_components(doc, "# AUTO-GENERATED ARCHITECTURE").unwrap();
        assert_eq!(parsed.components.len(), 2);
        assert_eq!(parsed.parse_errors, 1);
        assert!(extract_doc_components("nothing", "# AUTO-GENERATED ARCHITECTURE").is_err());
    }

    #[test]
    fn test_mapping_row() {
        let mut c = Component::new(Kind::T, "t1", "Task");
        c.set_extra("x_file", "core/src/lib.rs:4");
        let raw = r#"{"k":"T","id":"t1","t":"Task","x_file":"core/src/lib.rs:4"}"#;
        let row = MappingRow::new(&c, raw, "// @ctl4: t1:T:0:100");
        assert_eq!(row.file, "core/src/lib.rs");
        assert_eq!(row.original.chars().count(), 53);
        assert_eq!(row.compression, "59→20 (66.1%)");
    }

    #[test]
    fn test_convert_replaces_and_keeps_indent() {
        let dir = tempfile::tempdir().unwrap();
        let crates = dir.path().join("crates");
        let src = crates.join("core").join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(
            src.join("lib.rs"),
            "mod a {\n    // @component: {\"k\":\"C\",\"id\":\"core\",\"t\":\"Core\",\"f\":[\"production\"]}\n}\n",
        )
        .unwrap();

        let doc = dir.path().join("CLAUDE.md");
        fs::write(
            &doc,
            "# AUTO-GENERATED ARCHITECTURE\n\n```json\n{\"k\":\"C\",\"id\":\"core\",\"t\":\"Core\",\"f\":[\"production\"],\"x_file\":\"core/src/lib.rs:2\"}\n{\"k\":\"T\",\"id\":\"gone\",\"t\":\"Gone\",\"x_file\":\"core/src/missing.rs:1\"}\n```\n",
        )
        .unwrap();

        let roots = vec![crates.clone(), dir.path().to_path_buf()];

        let preview = convert(&doc, "# AUTO-GENERATED ARCHITECTURE", &roots, true).unwrap();
        assert_eq!(preview.replaced, 1);
        assert!(fs::read_to_string(src.join("lib.rs")).unwrap().contains("@component"));

        let report = convert(&doc, "# AUTO-GENERATED ARCHITECTURE", &roots, false).unwrap();
        assert_eq!(report.parsed, 2);
        assert_eq!(report.replaced, 1);
        assert_eq!(report.not_found, 1);
        assert_eq!(
            fs::read_to_string(src.join("lib.rs")).unwrap(),
            "mod a {\n    // @ctl4: core:C:0:100:prod\n}\n"
        );
        assert!(report.section.contains("// Core Components (1)\n// @ctl4: core:C:0:100:prod"));
        assert!(report.compression_percent() > 0.0);
    }
}
