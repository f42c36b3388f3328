//! Bench command - CI performance regression check

use anyhow::{Context, Result};
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, ContentArrangement, Table};
use std::fs;
use std::path::{Path, PathBuf};

use super::utils::{self, dimmed, green, red, yellow};
use devtools_helper::perf::{self, CheckConfig, CheckOutcome, Severity, Status, Thresholds};

/// Options for `bench check`
#[derive(Debug, Clone)]
pub struct CheckArgs {
    pub results: PathBuf,
    pub baseline: PathBuf,
    pub strict: bool,
    pub threshold: Option<f64>,
    pub limits: Option<PathBuf>,
    pub update_baseline: bool,
    pub history: Option<PathBuf>,
    pub report: PathBuf,
}

/// Execute `bench check`; returns the CI exit code
pub fn check(args: CheckArgs) -> Result<i32> {
    let mut thresholds = if args.strict {
        Thresholds::strict()
    } else {
        Thresholds::default()
    };
    if let Some(major) = args.threshold {
        thresholds.major = major;
    }

    let limits = match &args.limits {
        Some(path) => perf::load_limits(path)?,
        None => Default::default(),
    };

    let current = perf::load_results(&args.results)?;
    println!(
        "Loaded {} benchmark(s) from {}",
        current.len(),
        dimmed(args.results.display())
    );

    let config = CheckConfig {
        baseline: args.baseline.clone(),
        thresholds,
        limits,
        update_baseline: args.update_baseline,
        history_dir: args.history.clone(),
    };

    let analysis = match perf::check(current, &config)? {
        CheckOutcome::BaselineCreated { path, benchmarks } => {
            println!(
                "{} baseline {} ({} benchmark(s))",
                green("Created:"),
                path.display(),
                benchmarks
            );
            return Ok(0);
        }
        CheckOutcome::Analyzed(analysis) => analysis,
    };

    let c = &analysis.comparison;
    if !c.regressions.is_empty() {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL_CONDENSED)
            .set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec![
            Cell::new("Benchmark"),
            Cell::new("Baseline"),
            Cell::new("Current"),
            Cell::new("Change"),
            Cell::new("Severity"),
        ]);
        for r in &c.regressions {
            let severity = match r.severity {
                Some(Severity::Critical) => red("CRITICAL"),
                Some(Severity::Major) => yellow("MAJOR"),
                Some(Severity::Minor) | None => "minor".to_string(),
            };
            table.add_row(vec![
                Cell::new(&r.name),
                Cell::new(format!("{:.3} {}", r.baseline, r.unit)),
                Cell::new(format!("{:.3} {}", r.current, r.unit)),
                Cell::new(format!("{:+.1}%", r.change_pct)),
                Cell::new(severity),
            ]);
        }
        println!("{}", table);
    }

    for violation in &analysis.violations {
        eprintln!("{} {}", red("Limit exceeded:"), violation);
    }

    println!(
        "Regressions: {}, improvements: {}, stable: {}, new: {}, missing: {}",
        c.regressions.len(),
        c.improvements.len(),
        c.stable.len(),
        c.new.len(),
        c.missing.len()
    );

    let date = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    write_report(&args.report, &analysis.render(&date))?;

    let status = analysis.status();
    match status {
        Status::Passed => println!("{}", green("PASSED: no significant regressions")),
        Status::Warning => println!("{}", yellow("WARNING: major regressions detected")),
        Status::Critical => println!("{}", red("CRITICAL: critical regressions or limit violations")),
    }
    if args.update_baseline {
        println!("{} {}", green("Updated:"), args.baseline.display());
    }
    Ok(status.exit_code())
}

fn write_report(path: &Path, report: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create: {}", parent.display()))?;
    }
    fs::write(path, report).with_context(|| format!("Failed to write: {}", path.display()))?;
    println!(
        "{} {} ({})",
        green("Created:"),
        path.display(),
        utils::format_size(report.len() as u64)
    );
    Ok(())
}
