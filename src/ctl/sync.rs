//! Annotation sync: scan sources, regenerate the architecture section
//!
//! Every `*.rs` file under the crates directory is hashed and parsed. When
//! any hash differs from the cache, the section between the start and end
//! markers of the doc file is rewritten with one compact JSON line per
//! component.

use anyhow::{Context, Result};
use chrono::Utc;
use notify::{RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;
use walkdir::WalkDir;

use super::model::{sort_components, Component, Format};
use super::parser::{extract_components, Parsers};
use crate::config::{MarkerSettings, SyncSettings};

/// Per-file content hashes from the previous scan
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileCache {
    #[serde(default)]
    pub hashes: BTreeMap<String, String>,
}

impl FileCache {
    /// Load the cache; a missing or corrupt file yields an empty cache
    pub fn load(path: &Path) -> Self {
        let Ok(content) = fs::read_to_string(path) else {
            return Self::default();
        };
        match serde_json::from_str(&content) {
            Ok(cache) => cache,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring corrupt cache");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("Failed to write: {}", path.display()))
    }

    /// Record `hash` for `rel_path`; true when it differs from the cached one
    pub fn update(&mut self, rel_path: &str, hash: String) -> bool {
        if self.hashes.get(rel_path) == Some(&hash) {
            return false;
        }
        self.hashes.insert(rel_path.to_string(), hash);
        true
    }

    /// Drop entries for files not in `seen`; returns the dropped paths
    pub fn prune(&mut self, seen: &BTreeSet<String>) -> Vec<String> {
        let gone: Vec<String> = self
            .hashes
            .keys()
            .filter(|k| !seen.contains(*k))
            .cloned()
            .collect();
        for path in &gone {
            self.hashes.remove(path);
        }
        gone
    }
}

/// SHA-256 of a file's bytes, lowercase hex
pub fn hash_file(path: &Path) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read: {}", path.display()))?;
    Ok(hash_bytes(&bytes))
}

pub fn hash_bytes(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Result of one scan over the crates directory
#[derive(Debug, Default)]
pub struct ScanResult {
    /// Files whose hash changed since the last saved cache
    pub changed: Vec<String>,
    /// Valid components from all files, sorted by kind then id
    pub components: Vec<Component>,
    pub file_count: usize,
    /// Number of annotations rejected by parsing or validation
    pub invalid: usize,
}

/// What `sync_once` did
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    Updated { components: usize, changed: Vec<String> },
    NoChanges,
    /// The doc file does not exist; nothing was written
    DocMissing(PathBuf),
}

/// Component counts for `ctl stats`
#[derive(Debug, Serialize)]
pub struct SyncStats {
    pub total_components: usize,
    pub ctl2_components: usize,
    pub ctl3_components: usize,
    pub ctl4_components: usize,
    pub kind_distribution: BTreeMap<String, usize>,
    pub files_scanned: usize,
    pub last_scan: String,
}

/// The sync daemon for one host project
#[derive(Debug)]
pub struct CtlSync {
    pub crates_dir: PathBuf,
    pub doc_path: PathBuf,
    pub cache_path: PathBuf,
    markers: MarkerSettings,
    parsers: Parsers,
    debounce: Duration,
    cache: FileCache,
}

impl CtlSync {
    pub fn new(project_root: &Path, settings: &SyncSettings) -> Self {
        let cache_path = project_root.join(&settings.paths.cache_file);
        let cache = FileCache::load(&cache_path);
        Self {
            crates_dir: project_root.join(&settings.paths.crates_dir),
            doc_path: project_root.join(&settings.paths.doc_file),
            cache_path,
            markers: settings.markers.clone(),
            parsers: Parsers::from_settings(settings),
            debounce: Duration::from_millis(settings.watch.debounce_ms),
            cache,
        }
    }

    /// Hash and parse every source file
    pub fn scan(&mut self) -> Result<ScanResult> {
        let mut result = ScanResult::default();
        let mut seen = BTreeSet::new();

        if !self.crates_dir.is_dir() {
            tracing::warn!(path = %self.crates_dir.display(), "crates directory not found");
            return Ok(result);
        }

        let walker = WalkDir::new(&self.crates_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || e.file_name() != "target");

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            let path = entry.path();
            if !entry.file_type().is_file() || path.extension().map_or(true, |ext| ext != "rs") {
                continue;
            }

            result.file_count += 1;
            let rel_path = path
                .strip_prefix(&self.crates_dir)
                .unwrap_or(path)
                .to_string_lossy()
                .replace('\\', "/");
            seen.insert(rel_path.clone());

            let bytes = match fs::read(path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(file = %rel_path, error = %e, "failed to read");
                    continue;
                }
            };

            if self.cache.update(&rel_path, hash_bytes(&bytes)) {
                tracing::debug!(file = %rel_path, "changed");
                result.changed.push(rel_path.clone());
            }

            let Ok(content) = String::from_utf8(bytes) else {
                tracing::warn!(file = %rel_path, "not valid UTF-8, skipping");
                continue;
            };

            let extraction = extract_components(&content, &rel_path, &self.parsers);
            result.invalid += extraction.errors.len();
            result.components.extend(extraction.components);
        }

        for rel_path in self.cache.prune(&seen) {
            tracing::debug!(file = %rel_path, "removed");
            result.changed.push(rel_path);
        }

        sort_components(&mut result.components);
        tracing::info!(
            files = result.file_count,
            changed = result.changed.len(),
            components = result.components.len(),
            "scan complete"
        );
        Ok(result)
    }

    /// Scan once and rewrite the doc when anything changed (or `force`)
    pub fn sync_once(&mut self, force: bool) -> Result<SyncOutcome> {
        let scan = self.scan()?;

        if scan.changed.is_empty() && !force {
            return Ok(SyncOutcome::NoChanges);
        }

        if !self.doc_path.is_file() {
            tracing::warn!(path = %self.doc_path.display(), "doc file not found");
            // Forget unsaved hashes so the next run retries
            self.cache = FileCache::load(&self.cache_path);
            return Ok(SyncOutcome::DocMissing(self.doc_path.clone()));
        }

        let doc = fs::read_to_string(&self.doc_path)
            .with_context(|| format!("Failed to read: {}", self.doc_path.display()))?;
        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();
        let section = build_section(&scan.components, &timestamp, &self.markers.start);
        let updated = replace_section(&doc, &section, &self.markers);

        fs::write(&self.doc_path, updated)
            .with_context(|| format!("Failed to write: {}", self.doc_path.display()))?;
        self.cache.save(&self.cache_path)?;

        Ok(SyncOutcome::Updated {
            components: scan.components.len(),
            changed: scan.changed,
        })
    }

    /// Watch the crates directory and re-sync after each burst of `.rs` events
    ///
    /// Runs until the watcher channel closes. `on_sync` sees every result.
    pub fn watch<F>(&mut self, mut on_sync: F) -> Result<()>
    where
        F: FnMut(Result<SyncOutcome>),
    {
        let (tx, rx) = mpsc::channel();
        let mut watcher = notify::recommended_watcher(tx).context("Failed to create watcher")?;
        watcher
            .watch(&self.crates_dir, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch: {}", self.crates_dir.display()))?;

        tracing::info!(path = %self.crates_dir.display(), "watching for changes");

        for event in &rx {
            match event {
                Ok(event) => {
                    let touches_rust = event
                        .paths
                        .iter()
                        .any(|p| p.extension().is_some_and(|ext| ext == "rs"));
                    if !touches_rust {
                        continue;
                    }
                    std::thread::sleep(self.debounce);
                    // Drop the rest of the burst
                    while rx.try_recv().is_ok() {}
                    on_sync(self.sync_once(false));
                }
                Err(e) => tracing::warn!(error = %e, "watch error"),
            }
        }

        Ok(())
    }

    pub fn stats(&mut self) -> Result<SyncStats> {
        let scan = self.scan()?;
        let mut stats = SyncStats {
            total_components: scan.components.len(),
            ctl2_components: 0,
            ctl3_components: 0,
            ctl4_components: 0,
            kind_distribution: BTreeMap::new(),
            files_scanned: scan.file_count,
            last_scan: Utc::now().to_rfc3339(),
        };

        for component in &scan.components {
            *stats
                .kind_distribution
                .entry(component.k.to_string())
                .or_default() += 1;
            match component.format() {
                Format::V2 => stats.ctl2_components += 1,
                Format::V3 => stats.ctl3_components += 1,
                Format::V4 => stats.ctl4_components += 1,
            }
        }

        Ok(stats)
    }
}

/// Render the generated section (without trailing newline)
pub fn build_section(components: &[Component], timestamp: &str, start_marker: &str) -> String {
    let mut lines = vec![
        start_marker.to_string(),
        String::new(),
        format!("*Last updated: {}*", timestamp),
        String::new(),
        "## Components (CTL v2.0/v3.0 Mixed Format)".to_string(),
        String::new(),
        "```json".to_string(),
    ];
    lines.extend(components.iter().map(Component::to_compact_json));
    lines.push("```".to_string());
    lines.join("\n")
}

/// Swap the marked section of `doc` for `section`, or append it
pub fn replace_section(doc: &str, section: &str, markers: &MarkerSettings) -> String {
    let Some(start) = doc.find(&markers.start) else {
        return format!("{}\n\n{}", doc, section);
    };

    let end = doc[start..]
        .find(&markers.end)
        .map_or(doc.len(), |pos| start + pos);

    format!("{}{}\n\n{}", &doc[..start], section, &doc[end..])
}
