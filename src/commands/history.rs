//! History commands - browse and restore Cursor local history

use anyhow::{bail, Context, Result};
use clap::Args;
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, ContentArrangement, Table};
use serde::Serialize;
use std::path::{Path, PathBuf};

use super::utils::{self, dimmed, green, red, yellow};
use devtools_helper::{archive, config};
use devtools_helper::cursor::history::{self, find_versions, parse_time_arg, target_label};
use devtools_helper::cursor::restore::{ItemOutcome, RestoreSummary};
use devtools_helper::cursor::{restore, HistoryEntry, HistoryIndex, RestoreOptions, RestorePlan, TimelineQuery};

/// Filters shared by `list`, `plan` and `restore`
#[derive(Debug, Clone, Default, Args)]
pub struct TimelineArgs {
    /// Project directory (all history when omitted)
    pub project: Option<PathBuf>,

    /// Only versions saved at or after this time
    #[arg(long)]
    pub since: Option<String>,

    /// Only versions saved at or before this time
    #[arg(long)]
    pub until: Option<String>,

    /// Only targets whose path contains this pattern (`*` wildcards)
    #[arg(long)]
    pub filter: Option<String>,

    /// Keep only the newest version of each file
    #[arg(long)]
    pub latest: bool,
}

impl TimelineArgs {
    fn project_root(&self) -> Result<Option<PathBuf>> {
        self.project.as_deref().map(utils::existing_path).transpose()
    }

    fn query(&self) -> Result<TimelineQuery> {
        Ok(TimelineQuery {
            root: self.project_root()?,
            since: self.since.as_deref().map(parse_time_arg).transpose()?,
            until: self.until.as_deref().map(parse_time_arg).transpose()?,
            filter: self.filter.clone(),
            latest_only: self.latest,
            include_missing: false,
        })
    }
}

#[derive(Serialize)]
struct TimelineRow<'a> {
    time: String,
    source: Option<&'a str>,
    target: String,
    snapshot: &'a Path,
}

fn load_timeline(args: &TimelineArgs) -> Result<Vec<HistoryEntry>> {
    let history_dir = config::history_dir()?;
    if !history_dir.exists() {
        bail!("Cursor history directory not found: {}", history_dir.display());
    }

    let index = HistoryIndex::load(&history_dir)?;
    if index.skipped_folders > 0 {
        println!(
            "{} skipped {} unreadable history folder(s)",
            yellow("Warning:"),
            index.skipped_folders
        );
    }
    Ok(index.timeline(&args.query()?))
}

fn timeline_table(entries: &[HistoryEntry]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Time"),
        Cell::new("Source"),
        Cell::new("Target"),
        Cell::new("Snapshot"),
    ]);

    for entry in entries {
        let snapshot = entry
            .snapshot
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        table.add_row(vec![
            Cell::new(entry.format_time()),
            Cell::new(entry.source.as_deref().unwrap_or("-")),
            Cell::new(target_label(entry)),
            Cell::new(snapshot),
        ]);
    }
    table
}

/// `history list`
pub fn list(args: &TimelineArgs, json: bool) -> Result<()> {
    let entries = load_timeline(args)?;

    if json {
        let rows: Vec<TimelineRow> = entries
            .iter()
            .map(|e| TimelineRow {
                time: e.format_time(),
                source: e.source.as_deref(),
                target: target_label(e),
                snapshot: &e.snapshot,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No history entries found.");
        return Ok(());
    }

    println!("{}", timeline_table(&entries));
    println!("\nTotal: {} version(s)", entries.len());
    Ok(())
}

/// `history show`: every saved version of one file
pub fn show(file: &Path) -> Result<()> {
    let history_dir = config::history_dir()?;
    // The file may have been deleted, so fall back to an absolute path
    let file = match utils::existing_path(file) {
        Ok(path) => path,
        Err(_) => std::path::absolute(file)
            .with_context(|| format!("Invalid path: {}", file.display()))?,
    };

    let versions = find_versions(&history_dir, &file)?;
    if versions.is_empty() {
        println!("No history found for {}", file.display());
        return Ok(());
    }

    let uri = history::resource_uri_for_path(&file)?;
    println!("{}", utils::bold(file.display()));
    println!(
        "  {}\n",
        dimmed(format!("folder: {}", history::history_folder_name(&uri)))
    );

    for (i, version) in versions.iter().enumerate() {
        let size = std::fs::metadata(&version.snapshot)
            .map(|m| utils::format_size(m.len()))
            .unwrap_or_else(|_| "missing".to_string());
        println!(
            "  [{}] {}  {}  {}",
            i + 1,
            version.format_time(),
            version.source.as_deref().unwrap_or("-"),
            dimmed(format!("{} ({})", version.snapshot.display(), size))
        );
    }
    Ok(())
}

/// `history plan`: save the timeline as a reviewable restore plan
pub fn plan(args: &TimelineArgs, output: &Path) -> Result<()> {
    let entries = load_timeline(args)?;
    if entries.is_empty() {
        println!("No history entries found.");
        return Ok(());
    }

    let root = args.project_root()?;
    let plan = RestorePlan::from_entries(&entries, root.as_deref(), None)?;
    plan.write(output)?;

    println!(
        "{} {} ({} item(s), {} file(s))",
        green("Created:"),
        output.display(),
        plan.items.len(),
        plan.targets().len()
    );
    Ok(())
}

/// `history restore`: rebuild files straight from the timeline
pub fn restore_timeline(
    args: &TimelineArgs,
    dry_run: bool,
    backup: Option<PathBuf>,
    into: Option<PathBuf>,
    yes: bool,
) -> Result<()> {
    let entries = load_timeline(args)?;
    if entries.is_empty() {
        println!("No history entries found.");
        return Ok(());
    }

    let root = args.project_root()?;
    let plan = match (&root, &into) {
        (Some(root), Some(dest)) => RestorePlan::from_entries(
            &entries,
            Some(root.as_path()),
            Some((root.as_path(), dest.as_path())),
        )?,
        (None, Some(_)) => bail!("--into requires a PROJECT to rebase from"),
        _ => RestorePlan::from_entries(&entries, root.as_deref(), None)?,
    };

    replay(&plan, dry_run, backup, yes)
}

/// `history apply`: replay a saved plan
pub fn apply(plan_file: &Path, dry_run: bool, backup: Option<PathBuf>, yes: bool) -> Result<()> {
    let plan = RestorePlan::read(plan_file)?;
    if plan.items.is_empty() {
        println!("Plan is empty.");
        return Ok(());
    }
    replay(&plan, dry_run, backup, yes)
}

fn replay(plan: &RestorePlan, dry_run: bool, backup: Option<PathBuf>, yes: bool) -> Result<()> {
    let targets = plan.targets();
    let existing = targets.iter().filter(|t| t.is_file()).count();

    println!(
        "Restoring {} version(s) into {} file(s)",
        plan.items.len(),
        targets.len()
    );
    if let Some(root) = &plan.root {
        println!("  {}", dimmed(format!("root: {}", root.display())));
    }
    if existing > 0 {
        println!(
            "  {} {} existing file(s) will be overwritten",
            yellow("Warning:"),
            existing
        );
    }

    if !dry_run && !utils::confirm("Restore these files?", yes)? {
        return Ok(());
    }

    let options = RestoreOptions { dry_run, backup };
    let summary = restore(plan, &options)?;
    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &RestoreSummary) {
    if let Some(path) = &summary.backup {
        let files = archive::read_manifest(path).map(|m| m.files.len()).unwrap_or(0);
        println!(
            "{} {} ({} file(s))",
            green("Backup:"),
            path.display(),
            files
        );
    }

    let total = summary.outcomes.len();
    for (i, (item, outcome)) in summary.outcomes.iter().enumerate() {
        let name = item.target.display();
        match outcome {
            ItemOutcome::Restored => println!(
                "[{}/{}] {} {} ({})",
                i + 1,
                total,
                green("Restored:"),
                name,
                item.timestamp
            ),
            ItemOutcome::WouldRestore => println!(
                "[{}/{}] Would restore: {} ({})",
                i + 1,
                total,
                name,
                dimmed(&item.timestamp)
            ),
            ItemOutcome::Skipped(reason) => println!(
                "[{}/{}] {} {} - {}",
                i + 1,
                total,
                yellow("Skipped:"),
                name,
                reason
            ),
            ItemOutcome::Failed(error) => eprintln!(
                "[{}/{}] {} {} - {}",
                i + 1,
                total,
                red("Failed:"),
                name,
                error
            ),
        }
    }

    println!(
        "\nRestored: {}, failed: {}, skipped: {}",
        summary.restored, summary.failed, summary.skipped
    );
}
