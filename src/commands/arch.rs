//! Arch command - keep the architecture diagram in the doc current

use anyhow::Result;

use super::utils::{dimmed, green, red};
use devtools_helper::arch::{ArchDaemon, Architecture};
use devtools_helper::config::SyncSettings;
use std::path::Path;

fn report(arch: &Architecture, doc: &Path) {
    println!(
        "{} {} ({} crate(s), {} dependency edge(s), {} feature(s))",
        green("Updated:"),
        doc.display(),
        arch.crates.len(),
        arch.edge_count(),
        arch.feature_count()
    );
}

/// Execute the arch command
pub fn execute(root: &Path, settings: &SyncSettings, watch: bool, print: bool) -> Result<()> {
    let daemon = ArchDaemon::new(root, settings)?;

    if print {
        let arch = daemon.scan()?;
        println!("```mermaid\n{}\n```", arch.mermaid());
        return Ok(());
    }

    let arch = daemon.run_once()?;
    report(&arch, &daemon.doc_path);

    if watch {
        println!(
            "Watching {} for Cargo.toml changes (Ctrl+C to stop)",
            dimmed(daemon.crates_dir.display())
        );
        daemon.watch(|result| match result {
            Ok(arch) => report(&arch, &daemon.doc_path),
            Err(e) => eprintln!("{} {:#}", red("Failed:"), e),
        })?;
    }
    Ok(())
}
