//! CTL commands - annotation sync, task store, conversion and cleanup

use anyhow::{bail, Context, Result};
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, ContentArrangement, Table};
use std::fs;
use std::path::{Path, PathBuf};

use super::utils::{self, dimmed, green, red, yellow};
use devtools_helper::config::SyncSettings;
use devtools_helper::ctl::convert;
use devtools_helper::ctl::store::{parse_item, priority_marks, Query, ReportFormat};
use devtools_helper::ctl::strip::{self, StripOptions};
use devtools_helper::ctl::{extract_components, Component, CtlSync, Kind, Parsers, Store, SyncOutcome};

fn report_outcome(outcome: &SyncOutcome) {
    match outcome {
        SyncOutcome::Updated {
            components,
            changed,
        } => {
            println!(
                "{} architecture doc ({} component(s), {} changed file(s))",
                green("Updated:"),
                components,
                changed.len()
            );
            for file in changed {
                println!("  {}", dimmed(file));
            }
        }
        SyncOutcome::NoChanges => println!("No changes detected"),
        SyncOutcome::DocMissing(path) => println!(
            "{} doc file not found: {} (not created)",
            yellow("Warning:"),
            path.display()
        ),
    }
}

/// `ctl sync`
pub fn sync(root: &Path, settings: &SyncSettings, watch: bool, force: bool) -> Result<()> {
    let mut daemon = CtlSync::new(root, settings);
    if !daemon.crates_dir.is_dir() {
        bail!("Crates directory not found: {}", daemon.crates_dir.display());
    }

    let outcome = daemon.sync_once(force)?;
    report_outcome(&outcome);

    if watch {
        println!(
            "Watching {} (Ctrl+C to stop)",
            dimmed(daemon.crates_dir.display())
        );
        daemon.watch(|result| match result {
            Ok(outcome) => report_outcome(&outcome),
            Err(e) => eprintln!("{} {:#}", red("Failed:"), e),
        })?;
    }
    Ok(())
}

/// `ctl stats`
pub fn stats(root: &Path, settings: &SyncSettings, json: bool) -> Result<()> {
    let mut daemon = CtlSync::new(root, settings);
    let stats = daemon.stats()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("{}", utils::bold("CTL Component Statistics"));
    println!("  Total components: {}", stats.total_components);
    println!("  CTL v2.0:         {}", stats.ctl2_components);
    println!("  CTL v3.0:         {}", stats.ctl3_components);
    println!("  CTL v4.0:         {}", stats.ctl4_components);
    println!("  Files scanned:    {}", stats.files_scanned);
    println!("  Last scan:        {}", dimmed(&stats.last_scan));

    if !stats.kind_distribution.is_empty() {
        println!("\nBy kind:");
        for (kind, count) in &stats.kind_distribution {
            println!("  {}: {}", kind, count);
        }
    }
    Ok(())
}

/// `ctl check`: parse and validate annotations in the given files
///
/// Returns the process exit code.
pub fn check(files: &[PathBuf], settings: &SyncSettings) -> Result<i32> {
    let parsers = Parsers::from_settings(settings);
    let mut error_count = 0;

    for file in files {
        let content = fs::read_to_string(file)
            .with_context(|| format!("Failed to read: {}", file.display()))?;
        let rel = file.to_string_lossy().replace('\\', "/");
        let extraction = extract_components(&content, &rel, &parsers);

        for component in &extraction.components {
            println!("{} {}", green("OK:"), component.to_compact_json());
        }
        for (line, error) in &extraction.errors {
            eprintln!("{} {}:{} - {}", red("Failed:"), rel, line, error);
        }
        error_count += extraction.errors.len();
    }

    if error_count > 0 {
        println!("\n{} validation error(s)", error_count);
        return Ok(1);
    }
    Ok(0)
}

/// `ctl add`
pub fn add(store_dir: &Path, item: &str) -> Result<()> {
    let store = Store::open(store_dir)?;
    let added = store.add(parse_item(item)?)?;
    println!("{} {} ({})", green("Added:"), added.id, added.t);
    Ok(())
}

fn component_table(items: &[Component]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Kind"),
        Cell::new("ID"),
        Cell::new("Title"),
        Cell::new("Priority"),
        Cell::new("Deps"),
    ]);

    for item in items {
        let deps = item
            .d
            .as_ref()
            .map(|d| d.iter().map(|dep| dep.id()).collect::<Vec<_>>().join(", "))
            .unwrap_or_default();
        table.add_row(vec![
            Cell::new(item.k.as_str()),
            Cell::new(&item.id),
            Cell::new(&item.t),
            Cell::new(priority_marks(item.p)),
            Cell::new(deps),
        ]);
    }
    table
}

/// `ctl query`
pub fn query(
    store_dir: &Path,
    kind: Option<&str>,
    priority: Option<u8>,
    depends_on: Option<String>,
    flags: Vec<String>,
) -> Result<()> {
    let kind = match kind {
        Some(k) => Some(Kind::parse(k).with_context(|| format!("Unknown kind: {}", k))?),
        None => None,
    };
    let store = Store::open(store_dir)?;
    let items = store.query(&Query {
        kind,
        priority,
        depends_on,
        flags,
    })?;

    if items.is_empty() {
        println!("No matching items.");
        return Ok(());
    }
    println!("{}", component_table(&items));
    Ok(())
}

/// `ctl complete`
pub fn complete(store_dir: &Path, id: &str) -> Result<()> {
    let store = Store::open(store_dir)?;
    let task = store.complete(id)?;
    println!("{} {} ({})", green("Completed:"), task.id, task.t);
    Ok(())
}

/// `ctl metric`
pub fn metric(store_dir: &Path, id: &str, current: f64) -> Result<()> {
    let store = Store::open(store_dir)?;
    let metric = store.update_metric(id, current)?;
    match &metric.m {
        Some(m) => println!(
            "{} {} = {} / {} {} ({:.1}%)",
            green("Updated:"),
            metric.id,
            m.current(),
            m.target(),
            m.u,
            m.progress()
        ),
        None => println!("{} {}", green("Updated:"), metric.id),
    }
    Ok(())
}

/// `ctl today`
pub fn today(store_dir: &Path) -> Result<()> {
    let store = Store::open(store_dir)?;
    let tasks = store.today()?;
    if tasks.is_empty() {
        println!("No high-priority tasks today.");
        return Ok(());
    }
    println!("{}", utils::bold("Today's focus"));
    println!("{}", component_table(&tasks));
    Ok(())
}

/// `ctl report`
pub fn report(store_dir: &Path, format: ReportFormat) -> Result<()> {
    let store = Store::open(store_dir)?;
    println!("{}", store.report(format)?);
    Ok(())
}

/// `ctl graph`
pub fn graph(store_dir: &Path) -> Result<()> {
    let store = Store::open(store_dir)?;
    println!("{}", store.graph()?);
    Ok(())
}

/// `ctl convert`: rewrite v2 annotations listed in the doc as v4 lines
pub fn convert(
    root: &Path,
    settings: &SyncSettings,
    dry_run: bool,
    output: Option<PathBuf>,
    mapping: bool,
) -> Result<()> {
    let doc_path = root.join(&settings.paths.doc_file);
    let roots = vec![root.join(&settings.paths.crates_dir), root.to_path_buf()];
    let report = convert::convert(&doc_path, &settings.markers.start, &roots, dry_run)?;

    if mapping {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL_CONDENSED)
            .set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec![
            Cell::new("ID"),
            Cell::new("Type"),
            Cell::new("Original"),
            Cell::new("CTL v4"),
            Cell::new("Compression"),
            Cell::new("File"),
        ]);
        for row in &report.rows {
            table.add_row(vec![
                Cell::new(&row.id),
                Cell::new(&row.kind),
                Cell::new(&row.original),
                Cell::new(&row.ctl4),
                Cell::new(&row.compression),
                Cell::new(&row.file),
            ]);
        }
        println!("{}\n", table);
    }

    for (id, reason) in &report.misses {
        println!("{} {} - {}", yellow("Not found:"), id, dimmed(reason));
    }

    if let Some(output) = output {
        if dry_run {
            println!("Would write compact section to {}", output.display());
        } else {
            fs::write(&output, &report.section)
                .with_context(|| format!("Failed to write: {}", output.display()))?;
            println!("{} {}", green("Created:"), output.display());
        }
    }

    let verb = if dry_run { "Would replace" } else { "Replaced" };
    println!("\n{}", utils::bold("Conversion summary"));
    println!("  Parsed:       {}", report.parsed);
    println!("  Converted:    {}", report.converted);
    println!("  {}: {}", verb, report.replaced);
    println!("  Not found:    {}", report.not_found);
    println!("  Parse errors: {}", report.parse_errors);
    println!(
        "  Compression:  {} → {} chars ({:.1}%)",
        report.original_size,
        report.compressed_size,
        report.compression_percent()
    );
    println!("  {}", dimmed(format!("took {} ms", report.duration_ms)));
    Ok(())
}

/// Options for `ctl strip`
#[derive(Debug, Clone)]
pub struct StripArgs {
    pub dry_run: bool,
    pub no_backup: bool,
    pub check: bool,
    pub report: Option<PathBuf>,
    pub yes: bool,
}

/// `ctl strip`: remove every annotation line from the crates
pub fn strip(root: &Path, settings: &SyncSettings, args: StripArgs) -> Result<()> {
    let crates_dir = root.join(&settings.paths.crates_dir);
    if !crates_dir.is_dir() {
        bail!("Crates directory not found: {}", crates_dir.display());
    }

    let annotations = strip::find_annotations(&crates_dir);
    if annotations.is_empty() {
        println!("No annotations found. Everything is clean!");
        return Ok(());
    }

    let files: std::collections::BTreeSet<&Path> =
        annotations.iter().map(|a| a.file.as_path()).collect();
    println!(
        "Found {} annotation(s) in {} file(s):\n",
        annotations.len(),
        files.len()
    );
    for annotation in &annotations {
        let rel = annotation
            .file
            .strip_prefix(root)
            .unwrap_or(&annotation.file);
        println!(
            "  {}:{} [{}] {}",
            rel.display(),
            annotation.line,
            annotation.kind,
            dimmed(utils::truncate(annotation.content.trim(), 60))
        );
    }

    if !args.dry_run && !utils::confirm("Remove these annotations?", args.yes)? {
        return Ok(());
    }

    let options = StripOptions {
        dry_run: args.dry_run,
        backup: !args.no_backup,
        check: args.check,
    };
    let report = strip::strip(root, &annotations, &options)?;

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("File"),
        Cell::new("Removed"),
        Cell::new("Lines"),
        Cell::new("Status"),
    ]);
    for result in &report.results {
        let rel = result.file.strip_prefix(root).unwrap_or(&result.file);
        let status = match &result.error {
            Some(e) => red(e),
            None if args.dry_run => "dry-run".to_string(),
            None => green("ok"),
        };
        table.add_row(vec![
            Cell::new(rel.display()),
            Cell::new(result.removed),
            Cell::new(format!("{} → {}", result.original_lines, result.final_lines)),
            Cell::new(status),
        ]);
    }
    println!("\n{}", table);

    if let Some(backup) = &report.backup {
        println!("{} {}", green("Backup:"), backup.display());
    }
    match report.compilation_success {
        Some(true) => println!("{} cargo check passed", green("Check:")),
        Some(false) => eprintln!("{} cargo check failed", red("Failed:")),
        None => {}
    }
    println!(
        "Removed {} annotation(s) from {} file(s) in {:.2}s",
        report.annotations_removed, report.files_with_annotations, report.duration_seconds
    );

    if let Some(path) = &args.report {
        report.save(path)?;
        println!("{} {}", green("Created:"), path.display());
    }
    Ok(())
}
