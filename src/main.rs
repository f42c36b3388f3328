//! devtools-helper: developer tooling for a Rust workspace
//!
//! This tool is not affiliated with or endorsed by Anysphere, Inc. (Cursor).
//! It reads locally stored history files on your machine for recovery.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use devtools_helper::config::{self, SyncSettings};
use devtools_helper::ctl::store::ReportFormat;
use devtools_helper::models::CompareOptions;

mod commands;

use commands::history::TimelineArgs;
use commands::utils;

#[derive(Parser)]
#[command(name = "devtools-helper")]
#[command(about = "Developer tooling: Cursor history recovery, CTL sync, bench and unwrap checks", long_about = None)]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Host project root (defaults to the current directory)
    #[arg(long, global = true)]
    project_root: Option<PathBuf>,

    /// Sync settings file
    #[arg(long, global = true, default_value = "settings.json")]
    settings: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Browse and restore Cursor local history
    History {
        #[command(subcommand)]
        command: HistoryCommands,
    },

    /// CTL annotations: doc sync, task store, conversion and cleanup
    Ctl {
        #[command(subcommand)]
        command: CtlCommands,
    },

    /// Regenerate the architecture diagram from the workspace manifests
    Arch {
        /// Keep running and regenerate on Cargo.toml changes
        #[arg(long)]
        watch: bool,

        /// Print the diagram instead of updating the doc
        #[arg(long, conflicts_with = "watch")]
        print: bool,
    },

    /// Benchmark regression checks
    Bench {
        #[command(subcommand)]
        command: BenchCommands,
    },

    /// Audit unwrap()/expect() calls in non-test code
    Unwrap {
        /// Directory to scan (defaults to the project root)
        root: Option<PathBuf>,

        /// Also count panic!() calls
        #[arg(long)]
        panics: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        /// Fail when the total exceeds this budget
        #[arg(long)]
        max: Option<usize>,

        /// Rewrite .unwrap() to .expect("<context>")
        #[arg(long)]
        fix: bool,

        /// Show what would be done without making changes
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Check exported ONNX models and compare their outputs
    Models {
        #[command(subcommand)]
        command: ModelsCommands,
    },
}

#[derive(Subcommand)]
enum HistoryCommands {
    /// List saved versions as a timeline
    List {
        #[command(flatten)]
        timeline: TimelineArgs,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show every saved version of one file
    Show {
        file: PathBuf,
    },

    /// Save the timeline as a restore plan for review
    Plan {
        #[command(flatten)]
        timeline: TimelineArgs,

        /// Plan file to write
        #[arg(short, long, default_value = "plan.json")]
        output: PathBuf,
    },

    /// Restore files from the timeline
    Restore {
        #[command(flatten)]
        timeline: TimelineArgs,

        /// Show what would be done without making changes
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Back up files that would be overwritten (.tar.gz)
        #[arg(long)]
        backup: Option<PathBuf>,

        /// Restore into this directory instead of the project
        #[arg(long)]
        into: Option<PathBuf>,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Replay a saved restore plan
    Apply {
        plan: PathBuf,

        /// Show what would be done without making changes
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Back up files that would be overwritten (.tar.gz)
        #[arg(long)]
        backup: Option<PathBuf>,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum CtlCommands {
    /// Scan annotations and rewrite the architecture doc
    Sync {
        /// Keep running and re-sync on changes
        #[arg(long)]
        watch: bool,

        /// Rewrite the doc even when nothing changed
        #[arg(long)]
        force: bool,
    },

    /// Component statistics
    Stats {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Parse and validate annotations in the given files
    Check {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Add an item to the task store (JSON or key=value pairs)
    Add {
        item: String,

        /// Store directory
        #[arg(long, default_value = ".ctl")]
        store: PathBuf,
    },

    /// Query the task store
    Query {
        /// Kind letter (T, B, F, ...)
        #[arg(short, long)]
        kind: Option<String>,

        /// Priority 1-5
        #[arg(short, long)]
        priority: Option<u8>,

        /// Items depending on this id
        #[arg(short, long)]
        depends_on: Option<String>,

        /// Items carrying any of these flags
        #[arg(short, long, num_args = 1..)]
        flags: Vec<String>,

        /// Store directory
        #[arg(long, default_value = ".ctl")]
        store: PathBuf,
    },

    /// Mark a task as completed
    Complete {
        id: String,

        /// Store directory
        #[arg(long, default_value = ".ctl")]
        store: PathBuf,
    },

    /// Update a metric's current value
    Metric {
        id: String,

        /// New current value
        #[arg(long)]
        current: f64,

        /// Store directory
        #[arg(long, default_value = ".ctl")]
        store: PathBuf,
    },

    /// High-priority tasks
    Today {
        /// Store directory
        #[arg(long, default_value = ".ctl")]
        store: PathBuf,
    },

    /// Progress report
    Report {
        #[arg(long, value_enum, default_value = "text")]
        format: ReportFormat,

        /// Store directory
        #[arg(long, default_value = ".ctl")]
        store: PathBuf,
    },

    /// Mermaid dependency graph of the store
    Graph {
        /// Store directory
        #[arg(long, default_value = ".ctl")]
        store: PathBuf,
    },

    /// Convert v2 annotations listed in the doc to the compact v4 form
    Convert {
        /// Show what would be done without making changes
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Write the compact section to this file
        #[arg(long)]
        output: Option<PathBuf>,

        /// Print the conversion mapping table
        #[arg(long)]
        mapping: bool,
    },

    /// Remove every annotation line from the crates
    Strip {
        /// Show what would be done without making changes
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Skip the .tar.gz backup
        #[arg(long)]
        no_backup: bool,

        /// Run cargo check afterwards
        #[arg(long)]
        check: bool,

        /// Save the cleanup report as JSON
        #[arg(long)]
        report: Option<PathBuf>,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum BenchCommands {
    /// Compare benchmark results against the baseline
    Check {
        /// Benchmark results (JSON)
        results: PathBuf,

        /// Baseline file (created when missing)
        #[arg(long, default_value = "performance-baseline.json")]
        baseline: PathBuf,

        /// Use strict thresholds (2/5/15%)
        #[arg(long)]
        strict: bool,

        /// Override the major regression threshold (%)
        #[arg(long)]
        threshold: Option<f64>,

        /// Absolute limits for critical benchmarks (JSON)
        #[arg(long)]
        limits: Option<PathBuf>,

        /// Replace the baseline with these results
        #[arg(long)]
        update_baseline: bool,

        /// Directory of historical results for trend analysis
        #[arg(long)]
        history: Option<PathBuf>,

        /// Markdown report file
        #[arg(long, default_value = "performance-report.md")]
        report: PathBuf,
    },
}

#[derive(Subcommand)]
enum ModelsCommands {
    /// Check an exported model directory
    Verify {
        dir: PathBuf,
    },

    /// Compare dumped outputs of two models or runtimes
    Compare {
        a: PathBuf,
        b: PathBuf,

        /// Minimum cosine similarity per embedding
        #[arg(long, default_value_t = 0.99)]
        min_cosine: f64,

        /// Maximum absolute difference per value
        #[arg(long)]
        max_diff: Option<f64>,

        /// Ranking depth checked for score outputs
        #[arg(long, default_value_t = 3)]
        top_k: usize,
    },
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);
    if cli.no_color || std::env::var_os("NO_COLOR").is_some() {
        utils::set_color(false);
    }

    let root = config::resolve_project_root(cli.project_root)?;
    let code = match cli.command {
        Commands::History { command } => {
            run_history(command)?;
            0
        }
        Commands::Ctl { command } => {
            let settings = SyncSettings::load(&cli.settings)?;
            run_ctl(command, &root, &settings)?
        }
        Commands::Arch { watch, print } => {
            let settings = SyncSettings::load(&cli.settings)?;
            commands::arch::execute(&root, &settings, watch, print)?;
            0
        }
        Commands::Bench { command } => match command {
            BenchCommands::Check {
                results,
                baseline,
                strict,
                threshold,
                limits,
                update_baseline,
                history,
                report,
            } => commands::bench::check(commands::bench::CheckArgs {
                results,
                baseline,
                strict,
                threshold,
                limits,
                update_baseline,
                history,
                report,
            })?,
        },
        Commands::Unwrap {
            root: scan_root,
            panics,
            json,
            max,
            fix,
            dry_run,
            yes,
        } => {
            if dry_run && !json {
                utils::dry_run_notice();
            }
            commands::unwrap::execute(commands::unwrap::UnwrapArgs {
                root: scan_root.unwrap_or(root),
                panics,
                json,
                max,
                fix,
                dry_run,
                yes,
            })?
        }
        Commands::Models { command } => match command {
            ModelsCommands::Verify { dir } => commands::models::verify(&dir)?,
            ModelsCommands::Compare {
                a,
                b,
                min_cosine,
                max_diff,
                top_k,
            } => commands::models::compare(
                &a,
                &b,
                CompareOptions {
                    min_cosine,
                    max_diff,
                    top_k,
                },
            )?,
        },
    };

    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

fn run_history(command: HistoryCommands) -> Result<()> {
    match command {
        HistoryCommands::List { timeline, json } => commands::history::list(&timeline, json),
        HistoryCommands::Show { file } => commands::history::show(&file),
        HistoryCommands::Plan { timeline, output } => commands::history::plan(&timeline, &output),
        HistoryCommands::Restore {
            timeline,
            dry_run,
            backup,
            into,
            yes,
        } => {
            if dry_run {
                utils::dry_run_notice();
            }
            commands::history::restore_timeline(&timeline, dry_run, backup, into, yes)
        }
        HistoryCommands::Apply {
            plan,
            dry_run,
            backup,
            yes,
        } => {
            if dry_run {
                utils::dry_run_notice();
            }
            commands::history::apply(&plan, dry_run, backup, yes)
        }
    }
}

/// Runs one `ctl` subcommand; returns the exit code
fn run_ctl(command: CtlCommands, root: &std::path::Path, settings: &SyncSettings) -> Result<i32> {
    match command {
        CtlCommands::Sync { watch, force } => commands::ctl::sync(root, settings, watch, force)?,
        CtlCommands::Stats { json } => commands::ctl::stats(root, settings, json)?,
        CtlCommands::Check { files } => return commands::ctl::check(&files, settings),
        CtlCommands::Add { item, store } => commands::ctl::add(&store, &item)?,
        CtlCommands::Query {
            kind,
            priority,
            depends_on,
            flags,
            store,
        } => commands::ctl::query(&store, kind.as_deref(), priority, depends_on, flags)?,
        CtlCommands::Complete { id, store } => commands::ctl::complete(&store, &id)?,
        CtlCommands::Metric { id, current, store } => {
            commands::ctl::metric(&store, &id, current)?
        }
        CtlCommands::Today { store } => commands::ctl::today(&store)?,
        CtlCommands::Report { format, store } => commands::ctl::report(&store, format)?,
        CtlCommands::Graph { store } => commands::ctl::graph(&store)?,
        CtlCommands::Convert {
            dry_run,
            output,
            mapping,
        } => {
            if dry_run {
                utils::dry_run_notice();
            }
            commands::ctl::convert(root, settings, dry_run, output, mapping)?
        }
        CtlCommands::Strip {
            dry_run,
            no_backup,
            check,
            report,
            yes,
        } => {
            if dry_run {
                utils::dry_run_notice();
            }
            commands::ctl::strip(
                root,
                settings,
                commands::ctl::StripArgs {
                    dry_run,
                    no_backup,
                    check,
                    report,
                    yes,
                },
            )?
        }
    }
    Ok(0)
}
