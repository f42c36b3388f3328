//! Unwrap command - audit and rewrite panicking calls

use anyhow::Result;
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, ContentArrangement, Table};
use std::path::PathBuf;

use super::utils::{self, dimmed, green, red, yellow};
use devtools_helper::audit::{self, AuditReport, PanicKind};

/// Options for the unwrap command
#[derive(Debug, Clone)]
pub struct UnwrapArgs {
    pub root: PathBuf,
    pub panics: bool,
    pub json: bool,
    pub max: Option<usize>,
    pub fix: bool,
    pub dry_run: bool,
    pub yes: bool,
}

/// Files listed in the per-file table
const TOP_FILES: usize = 15;

fn print_tables(report: &AuditReport, panics: bool) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic);
    let mut header = vec![Cell::new("Crate"), Cell::new("unwrap()"), Cell::new("expect()")];
    if panics {
        header.push(Cell::new("panic!()"));
    }
    header.push(Cell::new("Total"));
    table.set_header(header);

    for (krate, counts) in report.by_crate() {
        let get = |kind: PanicKind| counts.get(&kind).copied().unwrap_or(0);
        let mut row = vec![
            Cell::new(krate),
            Cell::new(get(PanicKind::Unwrap)),
            Cell::new(get(PanicKind::Expect)),
        ];
        if panics {
            row.push(Cell::new(get(PanicKind::Panic)));
        }
        row.push(Cell::new(counts.values().sum::<usize>()));
        table.add_row(row);
    }
    println!("{}", table);

    let files = report.by_file();
    if files.is_empty() {
        return;
    }
    println!("\nTop files:");
    for (file, count) in files.iter().take(TOP_FILES) {
        println!("  {:>5}  {}", count, file.display());
    }
    if files.len() > TOP_FILES {
        println!("  {}", dimmed(format!("... and {} more", files.len() - TOP_FILES)));
    }
}

/// Execute the unwrap command; returns the CI exit code
pub fn execute(args: UnwrapArgs) -> Result<i32> {
    let report = audit::audit(&args.root, args.panics)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "Scanned {} file(s) under {}\n",
            report.files_scanned,
            args.root.display()
        );
        if report.total() == 0 {
            println!("{}", green("No panicking calls found. Everything is clean!"));
        } else {
            print_tables(&report, args.panics);
            println!(
                "\nTotal: {} ({} unwrap, {} expect{})",
                report.total(),
                report.count(PanicKind::Unwrap),
                report.count(PanicKind::Expect),
                if args.panics {
                    format!(", {} panic", report.count(PanicKind::Panic))
                } else {
                    String::new()
                }
            );
        }
    }

    if args.fix {
        fix(&report, args.dry_run, args.yes)?;
    }

    if let Some(max) = args.max {
        if report.total() > max {
            eprintln!(
                "{} {} panicking call(s) exceed the budget of {}",
                red("Failed:"),
                report.total(),
                max
            );
            return Ok(1);
        }
        println!("{} within budget ({} <= {})", green("OK:"), report.total(), max);
    }
    Ok(0)
}

fn fix(report: &AuditReport, dry_run: bool, yes: bool) -> Result<()> {
    let files = report.unwrap_files();
    let count = report.count(PanicKind::Unwrap);
    if files.is_empty() {
        println!("Nothing to fix.");
        return Ok(());
    }

    println!(
        "\nRewriting {} .unwrap() call(s) in {} file(s) to .expect(\"...\")",
        count,
        files.len()
    );
    if !dry_run && !utils::confirm("Apply these changes?", yes)? {
        return Ok(());
    }

    let mut fixed = 0;
    for file in &files {
        match audit::fix_file(file, dry_run) {
            Ok(n) if dry_run => println!("  Would fix {} in {}", n, file.display()),
            Ok(n) => {
                fixed += n;
                println!("{} {} ({})", green("Fixed:"), file.display(), n);
            }
            Err(e) => eprintln!("{} {} - {:#}", red("Failed:"), file.display(), e),
        }
    }
    if !dry_run {
        println!("Rewrote {} call(s)", fixed);
        if fixed < count {
            println!(
                "{} {} call(s) were left untouched",
                yellow("Warning:"),
                count - fixed
            );
        }
    }
    Ok(())
}
