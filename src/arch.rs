//! Crate dependency diagram for the host workspace
//!
//! Every `Cargo.toml` under the crates directory becomes a node of a
//! mermaid `flowchart TD`, and every path dependency on a sibling crate an
//! edge. The diagram and a few totals are written into the doc's
//! architecture section, which runs from the start marker to the next
//! top-level heading.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use notify::{RecursiveMode, Watcher};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Component as PathPart, Path, PathBuf};
use std::sync::mpsc;
use std::time::{Duration, Instant};
use walkdir::WalkDir;

use crate::config::SyncSettings;

/// Minimum time between two regenerations in watch mode
const MIN_INTERVAL: Duration = Duration::from_secs(5);
/// Delay after a manifest change before regenerating
const SETTLE_DELAY: Duration = Duration::from_secs(2);

/// One crate of the host workspace
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CrateInfo {
    pub name: String,
    pub dir: PathBuf,
    pub description: Option<String>,
    /// Node ids of sibling crates this one depends on by path
    pub deps: BTreeSet<String>,
    pub features: Vec<String>,
}

/// Node class in the rendered diagram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeClass {
    Primary,
    Secondary,
    Utility,
}

impl NodeClass {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
            Self::Utility => "utility",
        }
    }
}

/// Scanned workspace, keyed by node id
#[derive(Debug, Default, Serialize)]
pub struct Architecture {
    pub crates: BTreeMap<String, CrateInfo>,
}

/// Mermaid node id for a crate directory name
pub fn node_id(dir_name: &str) -> String {
    dir_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// `my-crate` → `My-Crate`
fn title_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = true;
    for c in name.chars() {
        if upper {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        upper = !c.is_alphanumeric();
    }
    out
}

/// Resolve `.` and `..` without touching the filesystem
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for part in path.components() {
        match part {
            PathPart::CurDir => {}
            PathPart::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}

struct Manifest {
    dir: PathBuf,
    table: toml::Table,
}

fn read_manifest(path: &Path) -> Result<toml::Table> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read: {}", path.display()))?;
    let content = content.strip_prefix('\u{feff}').unwrap_or(&content);
    content
        .parse::<toml::Table>()
        .with_context(|| format!("Failed to parse: {}", path.display()))
}

impl Architecture {
    /// Read every crate manifest under `crates_dir`
    ///
    /// Unreadable manifests are logged and skipped.
    pub fn scan(crates_dir: &Path) -> Result<Self> {
        if !crates_dir.is_dir() {
            bail!("Crates directory not found: {}", crates_dir.display());
        }

        let mut manifests = Vec::new();
        let walker = WalkDir::new(crates_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || e.file_name() != "target");
        for entry in walker.filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() || entry.file_name() != "Cargo.toml" {
                continue;
            }
            let Some(dir) = entry.path().parent() else {
                continue;
            };
            match read_manifest(entry.path()) {
                Ok(table) => manifests.push(Manifest {
                    dir: dir.to_path_buf(),
                    table,
                }),
                Err(e) => tracing::warn!(error = %format!("{:#}", e), "skipping manifest"),
            }
        }

        let ids: BTreeMap<PathBuf, String> = manifests
            .iter()
            .map(|m| {
                let dir_name = m
                    .dir
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                (normalize(&m.dir), node_id(&dir_name))
            })
            .collect();

        let mut arch = Self::default();
        for manifest in &manifests {
            let Some(id) = ids.get(&normalize(&manifest.dir)) else {
                continue;
            };
            let package = manifest.table.get("package").and_then(|p| p.as_table());
            let name = package
                .and_then(|p| p.get("name"))
                .and_then(|n| n.as_str())
                .map(str::to_string)
                .or_else(|| {
                    manifest
                        .dir
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                })
                .unwrap_or_else(|| id.to_lowercase());
            let description = package
                .and_then(|p| p.get("description"))
                .and_then(|d| d.as_str())
                .map(str::to_string);

            let deps = manifest
                .table
                .get("dependencies")
                .and_then(|d| d.as_table())
                .into_iter()
                .flat_map(|deps| deps.values())
                .filter_map(|dep| dep.get("path").and_then(|p| p.as_str()))
                .filter_map(|path| ids.get(&normalize(&manifest.dir.join(path))))
                .filter(|dep| *dep != id)
                .cloned()
                .collect();

            let features = manifest
                .table
                .get("features")
                .and_then(|f| f.as_table())
                .map(|f| f.keys().cloned().collect())
                .unwrap_or_default();

            let info = CrateInfo {
                name,
                dir: manifest.dir.clone(),
                description,
                deps,
                features,
            };
            tracing::debug!(
                krate = %info.name,
                deps = info.deps.len(),
                features = info.features.len(),
                "scanned crate"
            );
            arch.crates.insert(id.clone(), info);
        }

        Ok(arch)
    }

    pub fn edge_count(&self) -> usize {
        self.crates.values().map(|c| c.deps.len()).sum()
    }

    pub fn feature_count(&self) -> usize {
        self.crates.values().map(|c| c.features.len()).sum()
    }

    /// Class of a node: `primary` when it has both dependents and
    /// dependencies, `utility` when it depends on nothing
    pub fn class_of(&self, id: &str) -> NodeClass {
        let has_deps = self.crates.get(id).is_some_and(|c| !c.deps.is_empty());
        let has_dependents = self.crates.values().any(|c| c.deps.contains(id));
        match (has_deps, has_dependents) {
            (false, _) => NodeClass::Utility,
            (true, true) => NodeClass::Primary,
            (true, false) => NodeClass::Secondary,
        }
    }

    /// Fenced mermaid diagram
    pub fn mermaid(&self) -> String {
        let mut lines = vec![
            "```mermaid".to_string(),
            "flowchart TD".to_string(),
            String::new(),
        ];

        for (id, info) in &self.crates {
            let label = info
                .description
                .clone()
                .unwrap_or_else(|| format!("{} Crate", title_case(&info.name)));
            lines.push(format!("    {}[\"{}\"]", id, label.replace('"', "'")));
        }

        lines.push(String::new());
        for (id, info) in &self.crates {
            for dep in &info.deps {
                lines.push(format!("    {} --> {}", id, dep));
            }
        }

        lines.push(String::new());
        lines.extend([
            "    classDef primary fill:#e1f5fe,stroke:#01579b,stroke-width:2px".to_string(),
            "    classDef secondary fill:#f3e5f5,stroke:#4a148c,stroke-width:1px".to_string(),
            "    classDef utility fill:#fff3e0,stroke:#e65100,stroke-width:1px".to_string(),
        ]);

        let mut classes: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for id in self.crates.keys() {
            classes.entry(self.class_of(id).as_str()).or_default().push(id);
        }
        for (class, ids) in classes {
            lines.push(format!("    class {} {}", ids.join(","), class));
        }

        lines.push("```".to_string());
        lines.join("\n")
    }

    /// The doc section, starting with `start_marker`
    pub fn section(&self, start_marker: &str, timestamp: &str) -> String {
        let with_features = self.crates.values().filter(|c| !c.features.is_empty()).count();
        format!(
            "{}\n\n*Last updated: {}*\n\n## Crate Dependency Graph\n\n{}\n\n## Project Statistics\n\n\
             - **Crates**: {}\n- **Dependency edges**: {}\n- **Feature flags**: {} (in {} crates)\n",
            start_marker,
            timestamp,
            self.mermaid(),
            self.crates.len(),
            self.edge_count(),
            self.feature_count(),
            with_features,
        )
    }
}

/// Replace the section at `start_marker` (up to the next `# ` heading),
/// or append it after a `---` separator
pub fn update_doc(doc: &str, section: &str, start_marker: &str) -> String {
    let Some(start) = doc.find(start_marker) else {
        return format!("{}\n\n---\n\n{}", doc.trim_end(), section);
    };

    let search_from = start + start_marker.len();
    let end = doc[search_from..]
        .find("\n# ")
        .map_or(doc.len(), |pos| search_from + pos + 1);

    let tail = &doc[end..];
    if tail.is_empty() {
        format!("{}{}", &doc[..start], section)
    } else {
        format!("{}{}\n{}", &doc[..start], section, tail)
    }
}

/// Keeps the doc's diagram in step with the workspace manifests
#[derive(Debug)]
pub struct ArchDaemon {
    pub crates_dir: PathBuf,
    pub doc_path: PathBuf,
    start_marker: String,
}

impl ArchDaemon {
    /// Fails unless `project_root` holds a `Cargo.toml`
    pub fn new(project_root: &Path, settings: &SyncSettings) -> Result<Self> {
        if !project_root.join("Cargo.toml").is_file() {
            bail!("Cargo.toml not found in project root: {}", project_root.display());
        }
        Ok(Self {
            crates_dir: project_root.join(&settings.paths.crates_dir),
            doc_path: project_root.join(&settings.paths.doc_file),
            start_marker: settings.markers.start.clone(),
        })
    }

    pub fn scan(&self) -> Result<Architecture> {
        Architecture::scan(&self.crates_dir)
    }

    /// Scan and rewrite the doc section
    pub fn run_once(&self) -> Result<Architecture> {
        let arch = self.scan()?;
        let doc = fs::read_to_string(&self.doc_path)
            .with_context(|| format!("Failed to read: {}", self.doc_path.display()))?;
        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();
        let updated = update_doc(&doc, &arch.section(&self.start_marker, &timestamp), &self.start_marker);
        fs::write(&self.doc_path, updated)
            .with_context(|| format!("Failed to write: {}", self.doc_path.display()))?;
        tracing::info!(crates = arch.crates.len(), "architecture section updated");
        Ok(arch)
    }

    /// Regenerate whenever a `Cargo.toml` changes, at most every 5 s
    pub fn watch<F>(&self, mut on_update: F) -> Result<()>
    where
        F: FnMut(Result<Architecture>),
    {
        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(tx).context("Failed to create watcher")?;
        watcher
            .watch(&self.crates_dir, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch: {}", self.crates_dir.display()))?;

        tracing::info!(path = %self.crates_dir.display(), "watching manifests");

        let mut last_update: Option<Instant> = None;
        for event in &rx {
            match event {
                Ok(event) => {
                    let touches_manifest = event
                        .paths
                        .iter()
                        .any(|p| p.file_name().is_some_and(|n| n == "Cargo.toml"));
                    if !touches_manifest || last_update.is_some_and(|t| t.elapsed() < MIN_INTERVAL) {
                        continue;
                    }
                    last_update = Some(Instant::now());
                    std::thread::sleep(SETTLE_DELAY);
                    while rx.try_recv().is_ok() {}
                    on_update(self.run_once());
                }
                Err(e) => tracing::warn!(error = %e, "watch error"),
            }
        }

        Ok(())
    }
}
