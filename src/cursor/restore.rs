//! Chronological replay of history snapshots onto the working tree

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use super::history::{format_timestamp_ms, HistoryEntry};
use crate::archive;

/// Version of the restore plan format
pub const PLAN_VERSION: u32 = 1;

/// A saved, reviewable list of snapshot copies
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RestorePlan {
    pub version: u32,
    /// When the plan was generated (RFC3339)
    pub created_at: String,
    /// Project root the plan was built for, used as the backup root
    #[serde(default)]
    pub root: Option<PathBuf>,
    pub items: Vec<RestoreItem>,
}

/// One snapshot to copy over one target
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RestoreItem {
    pub source: PathBuf,
    pub target: PathBuf,
    /// Human-readable save time
    pub timestamp: String,
    /// Save time (epoch ms), used for ordering
    #[serde(default)]
    pub timestamp_ms: i64,
}

/// Options for replaying a plan
#[derive(Debug, Default, Clone)]
pub struct RestoreOptions {
    pub dry_run: bool,
    /// Write a tar.gz of every target that would be overwritten first
    pub backup: Option<PathBuf>,
}

/// What happened to one plan item
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Restored,
    /// Dry-run: the copy would have happened
    WouldRestore,
    /// The snapshot is gone; nothing was copied
    Skipped(String),
    Failed(String),
}

/// Result of replaying a plan
#[derive(Debug, Default)]
pub struct RestoreSummary {
    pub restored: usize,
    pub failed: usize,
    pub skipped: usize,
    pub backup: Option<PathBuf>,
    pub outcomes: Vec<(RestoreItem, ItemOutcome)>,
}

impl RestorePlan {
    /// Build a plan from timeline entries (remote entries are dropped)
    ///
    /// With `rebase = Some((root, dest))`, targets under `root` are moved
    /// under `dest` instead, so the original tree is left untouched.
    pub fn from_entries(
        entries: &[HistoryEntry],
        root: Option<&Path>,
        rebase: Option<(&Path, &Path)>,
    ) -> Result<Self> {
        let mut items = Vec::with_capacity(entries.len());

        for entry in entries {
            let Some(target) = &entry.target else {
                tracing::debug!(resource = %entry.resource, "skipping remote resource");
                continue;
            };

            let target = match rebase {
                Some((from, to)) => {
                    let relative = target.strip_prefix(from).with_context(|| {
                        format!("{} is not under {}", target.display(), from.display())
                    })?;
                    to.join(relative)
                }
                None => target.clone(),
            };

            items.push(RestoreItem {
                source: entry.snapshot.clone(),
                target,
                timestamp: format_timestamp_ms(entry.timestamp_ms),
                timestamp_ms: entry.timestamp_ms,
            });
        }

        let root = match rebase {
            Some((_, to)) => Some(to.to_path_buf()),
            None => root.map(Path::to_path_buf),
        };

        Ok(Self {
            version: PLAN_VERSION,
            created_at: chrono::Local::now().to_rfc3339(),
            root,
            items,
        })
    }

    /// Read a plan from a JSON file
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read: {}", path.display()))?;
        let plan: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse restore plan: {}", path.display()))?;

        if plan.version != PLAN_VERSION {
            bail!(
                "Unsupported restore plan version {} (expected {})",
                plan.version,
                PLAN_VERSION
            );
        }
        Ok(plan)
    }

    /// Write the plan as pretty JSON
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write: {}", path.as_ref().display()))?;
        Ok(())
    }

    /// Distinct targets touched by the plan
    pub fn targets(&self) -> BTreeSet<&Path> {
        self.items.iter().map(|i| i.target.as_path()).collect()
    }
}

/// Replay a plan in chronological order
///
/// Later versions of the same file overwrite earlier ones, so the final
/// state of each target is its newest snapshot in the plan. A failed copy
/// does not stop the run.
pub fn restore(plan: &RestorePlan, options: &RestoreOptions) -> Result<RestoreSummary> {
    let mut summary = RestoreSummary::default();

    let mut items = plan.items.clone();
    // Stable: plans without timestamp_ms keep their file order
    items.sort_by_key(|i| i.timestamp_ms);

    if let Some(backup_file) = &options.backup {
        let existing: Vec<PathBuf> = plan
            .targets()
            .into_iter()
            .filter(|t| t.is_file())
            .map(Path::to_path_buf)
            .collect();

        if !options.dry_run && !existing.is_empty() {
            let root = plan.root.clone().unwrap_or_else(|| PathBuf::from("/"));
            let path = archive::write_backup(backup_file, &root, &existing, "history-restore")?;
            summary.backup = Some(path);
        }
    }

    for item in items {
        let outcome = if !item.source.is_file() {
            summary.skipped += 1;
            ItemOutcome::Skipped(format!("snapshot missing: {}", item.source.display()))
        } else if options.dry_run {
            ItemOutcome::WouldRestore
        } else {
            match copy_snapshot(&item.source, &item.target) {
                Ok(()) => {
                    summary.restored += 1;
                    ItemOutcome::Restored
                }
                Err(e) => {
                    summary.failed += 1;
                    ItemOutcome::Failed(format!("{:#}", e))
                }
            }
        };
        summary.outcomes.push((item, outcome));
    }

    Ok(summary)
}

fn copy_snapshot(source: &Path, target: &Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create: {}", parent.display()))?;
    }
    fs::copy(source, target).with_context(|| {
        format!(
            "Failed to copy {} to {}",
            source.display(),
            target.display()
        )
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(dir: &Path, id: &str, content: &str, target: &Path, ts: i64) -> HistoryEntry {
        let snapshot = dir.join(id);
        fs::write(&snapshot, content).unwrap();
        HistoryEntry {
            resource: format!("file://{}", target.display()),
            target: Some(target.to_path_buf()),
            snapshot,
            timestamp_ms: ts,
            source: None,
            missing: false,
        }
    }

    #[test]
    fn test_restore_applies_newest_last() {
        let dir = tempfile::tempdir().unwrap();
        let snapshots = dir.path().join("history");
        fs::create_dir_all(&snapshots).unwrap();
        let project = dir.path().join("project");
        let target = project.join("docs").join("README.md");

        // Out of order on purpose; replay sorts by time
        let entries = vec![
            entry(&snapshots, "b.md", "second", &target, 200),
            entry(&snapshots, "a.md", "first", &target, 100),
        ];
        let plan = RestorePlan::from_entries(&entries, Some(&project), None).unwrap();
        let summary = restore(&plan, &RestoreOptions::default()).unwrap();

        assert_eq!(summary.restored, 2);
        assert_eq!(summary.failed, 0);
        assert_eq!(fs::read_to_string(&target).unwrap(), "second");
    }

    #[test]
    fn test_restore_dry_run_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out").join("a.rs");
        let entries = vec![entry(dir.path(), "x.rs", "x", &target, 1)];
        let plan = RestorePlan::from_entries(&entries, None, None).unwrap();

        let summary = restore(
            &plan,
            &RestoreOptions {
                dry_run: true,
                backup: None,
            },
        )
        .unwrap();

        assert_eq!(summary.restored, 0);
        assert_eq!(summary.outcomes[0].1, ItemOutcome::WouldRestore);
        assert!(!target.exists());
    }

    #[test]
    fn test_restore_skips_missing_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a.rs");
        let mut e = entry(dir.path(), "x.rs", "x", &target, 1);
        e.snapshot = dir.path().join("gone.rs");
        let plan = RestorePlan::from_entries(&[e], None, None).unwrap();

        let summary = restore(&plan, &RestoreOptions::default()).unwrap();
        assert_eq!(summary.skipped, 1);
        assert!(matches!(summary.outcomes[0].1, ItemOutcome::Skipped(_)));
    }

    #[test]
    fn test_restore_with_backup_and_rebase() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("project");
        let target = project.join("src").join("lib.rs");
        fs::create_dir_all(target.parent().unwrap()).unwrap();
        fs::write(&target, "current").unwrap();

        let entries = vec![entry(dir.path(), "v1.rs", "old", &target, 1)];

        // Rebased restore leaves the project alone
        let recovered = dir.path().join("recovered");
        let plan =
            RestorePlan::from_entries(&entries, Some(&project), Some((&project, &recovered)))
                .unwrap();
        restore(&plan, &RestoreOptions::default()).unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "current");
        assert_eq!(
            fs::read_to_string(recovered.join("src").join("lib.rs")).unwrap(),
            "old"
        );

        // In-place restore with a safety backup
        let plan = RestorePlan::from_entries(&entries, Some(&project), None).unwrap();
        let summary = restore(
            &plan,
            &RestoreOptions {
                dry_run: false,
                backup: Some(dir.path().join("safety")),
            },
        )
        .unwrap();
        let backup = summary.backup.unwrap();
        let manifest = archive::read_manifest(&backup).unwrap();
        assert_eq!(manifest.files, vec!["src/lib.rs".to_string()]);
        assert_eq!(fs::read_to_string(&target).unwrap(), "old");
    }

    #[test]
    fn test_plan_write_read() {
        let dir = tempfile::tempdir().unwrap();
        let plan = RestorePlan {
            version: PLAN_VERSION,
            created_at: "2025-08-08T10:15:25+00:00".to_string(),
            root: None,
            items: vec![RestoreItem {
                source: PathBuf::from("/h/-663df50e/h1PY.md"),
                target: PathBuf::from("/p/README.md"),
                timestamp: "2025-07-29 01:08:45.581".to_string(),
                timestamp_ms: 1_753_751_325_581,
            }],
        };
        let path = dir.path().join("plan.json");
        plan.write(&path).unwrap();
        assert_eq!(RestorePlan::read(&path).unwrap(), plan);
    }

    #[test]
    fn test_plan_rejects_unknown_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.json");
        fs::write(&path, r#"{"version":9,"created_at":"x","items":[]}"#).unwrap();
        assert!(RestorePlan::read(&path).is_err());
    }
}
