//! Local history index
//!
//! Cursor keeps a snapshot of every saved version of a file in:
//! `<user dir>/History/<folder>/`, next to an `entries.json` index:
//!
//! ```json
//! {"version":1,"resource":"file:///home/me/app/src/lib.rs",
//!  "entries":[{"id":"U3LC.rs","source":"Workspace Edit","timestamp":1754648125827}]}
//! ```
//!
//! The folder name is the editor's 32-bit string hash of the resource URI.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone};
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

/// Seed mixed into every string hash before the characters
const STRING_HASH_SEED: i32 = 149_417;

/// Compute the history folder name for a resource URI
///
/// The hash folds each UTF-16 code unit as `h = h * 31 + c` with 32-bit
/// wrapping arithmetic and is printed as signed hex.
///
/// # Example
/// ```
/// use devtools_helper::cursor::history::history_folder_name;
///
/// assert_eq!(history_folder_name(""), "247a9");
/// ```
pub fn history_folder_name(resource_uri: &str) -> String {
    let mut hash = number_hash(STRING_HASH_SEED, 0);
    for unit in resource_uri.encode_utf16() {
        hash = number_hash(unit as i32, hash);
    }

    if hash < 0 {
        format!("-{:x}", (hash as i64).unsigned_abs())
    } else {
        format!("{:x}", hash)
    }
}

fn number_hash(val: i32, initial: i32) -> i32 {
    initial.wrapping_shl(5).wrapping_sub(initial).wrapping_add(val)
}

/// Build the editor-style `file://` URI for a local path
///
/// On Windows the drive letter is lowercased and its colon encoded (`c%3A`),
/// matching what the editor stores in `entries.json`.
pub fn resource_uri_for_path(path: &Path) -> Result<String> {
    let url = Url::from_file_path(path)
        .map_err(|_| anyhow::anyhow!("Failed to convert path to URL: {}", path.display()))?;
    let uri = url.to_string();

    #[cfg(windows)]
    {
        if let Some(rest) = uri.strip_prefix("file:///") {
            let mut chars = rest.chars();
            if let (Some(drive), Some(':')) = (chars.next(), chars.next()) {
                return Ok(format!(
                    "file:///{}%3A{}",
                    drive.to_ascii_lowercase(),
                    chars.as_str()
                ));
            }
        }
    }

    Ok(uri)
}

/// Decode a `file://` resource URI into a local path
pub fn resource_to_path(resource: &str) -> Option<PathBuf> {
    let normalized = resource.replace("%3A", ":").replace("%3a", ":");
    let url = Url::parse(&normalized).ok()?;
    if url.scheme() != "file" {
        return None;
    }
    url.to_file_path().ok()
}

/// Human-readable form of a resource (local path or decoded remote path)
pub fn display_resource(resource: &str) -> String {
    if let Some(path) = resource_to_path(resource) {
        return path.display().to_string();
    }
    match Url::parse(resource) {
        Ok(url) => {
            let host = url
                .host_str()
                .map(|h| percent_decode_str(h).decode_utf8_lossy().to_string())
                .unwrap_or_default();
            let path = percent_decode_str(url.path()).decode_utf8_lossy();
            if host.is_empty() {
                format!("{}:{}", url.scheme(), path)
            } else {
                format!("[{}] {}", host, path)
            }
        }
        Err(_) => resource.to_string(),
    }
}

/// Raw `entries.json` structure
#[derive(Debug, Serialize, Deserialize)]
pub struct EntriesJson {
    #[serde(default)]
    pub version: u32,
    pub resource: String,
    #[serde(default)]
    pub entries: Vec<RawEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RawEntry {
    pub id: String,
    #[serde(default)]
    pub source: Option<String>,
    pub timestamp: i64,
}

/// One saved version of one file
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    /// Resource URI as recorded by the editor
    pub resource: String,
    /// Local path for `file:` resources, `None` for remote ones
    pub target: Option<PathBuf>,
    /// Snapshot file holding this version's content
    pub snapshot: PathBuf,
    /// Save time in milliseconds since the Unix epoch
    pub timestamp_ms: i64,
    /// What produced the version (e.g. "Workspace Edit", "undoRedo.source")
    pub source: Option<String>,
    /// The snapshot file is gone from disk
    pub missing: bool,
}

impl HistoryEntry {
    /// Save time in local time
    pub fn local_time(&self) -> Option<DateTime<Local>> {
        Local.timestamp_millis_opt(self.timestamp_ms).single()
    }

    /// Save time formatted like `2025-07-29 01:08:45.581`
    pub fn format_time(&self) -> String {
        format_timestamp_ms(self.timestamp_ms)
    }
}

/// Format epoch milliseconds in local time
pub fn format_timestamp_ms(timestamp_ms: i64) -> String {
    Local
        .timestamp_millis_opt(timestamp_ms)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
        .unwrap_or_else(|| timestamp_ms.to_string())
}

/// All history entries found under a history directory
#[derive(Debug, Default)]
pub struct HistoryIndex {
    pub entries: Vec<HistoryEntry>,
    /// Folders skipped because their index was missing or unreadable
    pub skipped_folders: usize,
}

/// Filters applied when building a timeline
#[derive(Debug, Default, Clone)]
pub struct TimelineQuery {
    /// Keep only targets under this directory
    pub root: Option<PathBuf>,
    /// Inclusive lower bound (epoch ms)
    pub since: Option<i64>,
    /// Inclusive upper bound (epoch ms)
    pub until: Option<i64>,
    /// Substring pattern on the target path; `*` matches anything
    pub filter: Option<String>,
    /// Keep only the newest version of each file
    pub latest_only: bool,
    /// Keep entries whose snapshot file is missing
    pub include_missing: bool,
}

impl HistoryIndex {
    /// Load every `entries.json` under `history_dir`
    pub fn load(history_dir: &Path) -> Result<Self> {
        let mut index = Self::default();

        if !history_dir.exists() {
            return Ok(index);
        }

        let entries = fs::read_dir(history_dir)
            .with_context(|| format!("Failed to read: {}", history_dir.display()))?;

        for entry in entries.flatten() {
            if !entry.file_type()?.is_dir() {
                continue;
            }

            match load_folder(&entry.path()) {
                Ok(mut versions) => index.entries.append(&mut versions),
                Err(e) => {
                    tracing::warn!(folder = %entry.path().display(), error = %e, "skipping history folder");
                    index.skipped_folders += 1;
                }
            }
        }

        Ok(index)
    }

    /// Build a chronological timeline matching `query`
    pub fn timeline(&self, query: &TimelineQuery) -> Vec<HistoryEntry> {
        let mut selected: Vec<HistoryEntry> = self
            .entries
            .iter()
            .filter(|e| query.include_missing || !e.missing)
            .filter(|e| query.since.map_or(true, |since| e.timestamp_ms >= since))
            .filter(|e| query.until.map_or(true, |until| e.timestamp_ms <= until))
            .filter(|e| match &query.root {
                Some(root) => e.target.as_deref().is_some_and(|t| is_under(t, root)),
                None => true,
            })
            .filter(|e| match &query.filter {
                Some(pattern) => matches_pattern(&target_label(e), pattern),
                None => true,
            })
            .cloned()
            .collect();

        if query.latest_only {
            let mut newest: HashMap<String, HistoryEntry> = HashMap::new();
            for entry in selected {
                let key = entry.resource.clone();
                match newest.get(&key) {
                    Some(existing) if existing.timestamp_ms >= entry.timestamp_ms => {}
                    _ => {
                        newest.insert(key, entry);
                    }
                }
            }
            selected = newest.into_values().collect();
        }

        selected.sort_by(|a, b| {
            a.timestamp_ms
                .cmp(&b.timestamp_ms)
                .then_with(|| target_label(a).cmp(&target_label(b)))
        });
        selected
    }
}

/// Load the versions recorded in a single history folder
pub fn load_folder(folder: &Path) -> Result<Vec<HistoryEntry>> {
    let index_path = folder.join("entries.json");
    if !index_path.exists() {
        bail!("No entries.json in {}", folder.display());
    }

    let content = fs::read_to_string(&index_path)
        .with_context(|| format!("Failed to read: {}", index_path.display()))?;
    let raw: EntriesJson = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse: {}", index_path.display()))?;

    let target = resource_to_path(&raw.resource);
    Ok(raw
        .entries
        .into_iter()
        .map(|e| {
            let snapshot = folder.join(&e.id);
            let missing = !snapshot.is_file();
            HistoryEntry {
                resource: raw.resource.clone(),
                target: target.clone(),
                snapshot,
                timestamp_ms: e.timestamp,
                source: e.source,
                missing,
            }
        })
        .collect())
}

/// Find every saved version of `file`, oldest first
///
/// Looks up the hashed folder name first and falls back to scanning all
/// indexes, since the editor may have encoded the URI differently.
pub fn find_versions(history_dir: &Path, file: &Path) -> Result<Vec<HistoryEntry>> {
    let uri = resource_uri_for_path(file)?;
    let folder = history_dir.join(history_folder_name(&uri));

    let mut versions = if folder.join("entries.json").exists() {
        load_folder(&folder)?
    } else {
        tracing::debug!(uri = %uri, "hashed folder not found, scanning all history");
        let index = HistoryIndex::load(history_dir)?;
        index
            .entries
            .into_iter()
            .filter(|e| e.target.as_deref().is_some_and(|t| same_path(t, file)))
            .collect()
    };

    versions.sort_by_key(|e| e.timestamp_ms);
    Ok(versions)
}

/// Parse a time bound: RFC3339, `YYYY-MM-DD` or `YYYY-MM-DD HH:MM:SS` (local)
pub fn parse_time_arg(s: &str) -> Result<i64> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.timestamp_millis());
    }

    let naive = if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        dt
    } else if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        date.and_hms_opt(0, 0, 0)
            .with_context(|| format!("Invalid date: {}", s))?
    } else {
        bail!(
            "Invalid time '{}'. Use RFC3339, YYYY-MM-DD or 'YYYY-MM-DD HH:MM:SS'",
            s
        );
    };

    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.timestamp_millis())
        .with_context(|| format!("Time does not exist in local timezone: {}", s))
}

/// Label used for sorting and filtering: local path or decoded resource
pub fn target_label(entry: &HistoryEntry) -> String {
    match &entry.target {
        Some(path) => path.to_string_lossy().replace('\\', "/"),
        None => display_resource(&entry.resource),
    }
}

/// Match `text` against a pattern where `*` stands for any run of characters
pub fn matches_pattern(text: &str, pattern: &str) -> bool {
    let mut rest = text;
    for part in pattern.split('*').filter(|p| !p.is_empty()) {
        match rest.find(part) {
            Some(pos) => rest = &rest[pos + part.len()..],
            None => return false,
        }
    }
    true
}

fn is_under(path: &Path, root: &Path) -> bool {
    #[cfg(windows)]
    {
        let path = path.to_string_lossy().to_lowercase().replace('/', "\\");
        let root = root.to_string_lossy().to_lowercase().replace('/', "\\");
        let root = root.trim_end_matches('\\');
        path == root || path.starts_with(&format!("{}\\", root))
    }

    #[cfg(not(windows))]
    {
        path.starts_with(root)
    }
}

fn same_path(a: &Path, b: &Path) -> bool {
    #[cfg(windows)]
    {
        a.to_string_lossy().to_lowercase() == b.to_string_lossy().to_lowercase()
    }

    #[cfg(not(windows))]
    {
        a == b
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_folder(history: &Path, resource: &str, versions: &[(&str, i64, &str)]) -> PathBuf {
        let folder = history.join(history_folder_name(resource));
        fs::create_dir_all(&folder).unwrap();
        let entries: Vec<RawEntry> = versions
            .iter()
            .map(|(id, ts, content)| {
                fs::write(folder.join(id), content).unwrap();
                RawEntry {
                    id: id.to_string(),
                    source: Some("Workspace Edit".to_string()),
                    timestamp: *ts,
                }
            })
            .collect();
        let index = EntriesJson {
            version: 1,
            resource: resource.to_string(),
            entries,
        };
        fs::write(
            folder.join("entries.json"),
            serde_json::to_string(&index).unwrap(),
        )
        .unwrap();
        folder
    }

    #[test]
    fn test_history_folder_name_empty() {
        // Only the seed is mixed in: 149417 = 0x247a9
        assert_eq!(history_folder_name(""), "247a9");
    }

    #[test]
    fn test_history_folder_name_single_char() {
        // 149417 * 31 + 'a'(97) = 4632024 = 0x46add8
        assert_eq!(history_folder_name("a"), "46add8");
    }

    #[test]
    fn test_history_folder_name_wraps_negative() {
        let name = history_folder_name("file:///home/user/projects/app/src/main.rs");
        // Long inputs overflow i32; the sign is kept as a prefix
        let trimmed = name.trim_start_matches('-');
        assert!(!trimmed.is_empty());
        assert!(trimmed.len() <= 8);
        assert!(trimmed.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_number_hash_matches_times_31() {
        assert_eq!(number_hash(5, 10), 10 * 31 + 5);
        assert_eq!(number_hash(0, i32::MAX), i32::MAX.wrapping_mul(31));
    }

    #[cfg(not(windows))]
    #[test]
    fn test_resource_roundtrip_with_spaces() {
        let uri = resource_uri_for_path(Path::new("/Users/me/my project/a.rs")).unwrap();
        assert_eq!(uri, "file:///Users/me/my%20project/a.rs");
        assert_eq!(
            resource_to_path(&uri),
            Some(PathBuf::from("/Users/me/my project/a.rs"))
        );
    }

    #[test]
    fn test_resource_to_path_remote() {
        assert_eq!(
            resource_to_path("vscode-remote://ssh-remote%2Bserver/home/u/app/a.rs"),
            None
        );
        assert_eq!(
            display_resource("vscode-remote://ssh-remote%2Bserver/home/u/app/a.rs"),
            "[ssh-remote+server] /home/u/app/a.rs"
        );
    }

    #[test]
    fn test_matches_pattern() {
        assert!(matches_pattern("/a/crates/cli/src/main.rs", "cli"));
        assert!(matches_pattern("/a/crates/cli/src/main.rs", "crates/*/main.rs"));
        assert!(matches_pattern("/a/b.rs", "*"));
        assert!(!matches_pattern("/a/crates/cli/src/main.rs", "main*cli"));
    }

    #[test]
    fn test_parse_time_arg_formats() {
        assert!(parse_time_arg("2025-07-29").is_ok());
        assert!(parse_time_arg("2025-07-29 01:08:45").is_ok());
        assert_eq!(
            parse_time_arg("2025-07-29T00:00:00Z").unwrap(),
            1_753_747_200_000
        );
        assert!(parse_time_arg("yesterday").is_err());
    }

    #[cfg(not(windows))]
    #[test]
    fn test_load_index_and_timeline() {
        let dir = tempfile::tempdir().unwrap();
        let history = dir.path();

        write_folder(
            history,
            "file:///work/app/README.md",
            &[("h1PY.md", 2_000, "v1"), ("GekM.md", 3_000, "v2")],
        );
        write_folder(history, "file:///work/app/.gitignore", &[("IAKW", 1_000, "target")]);
        write_folder(history, "file:///elsewhere/notes.md", &[("zzzz.md", 1_500, "x")]);
        // Broken folder is skipped, not fatal
        fs::create_dir_all(history.join("broken")).unwrap();

        let index = HistoryIndex::load(history).unwrap();
        assert_eq!(index.entries.len(), 4);
        assert_eq!(index.skipped_folders, 1);

        let query = TimelineQuery {
            root: Some(PathBuf::from("/work/app")),
            ..Default::default()
        };
        let timeline = index.timeline(&query);
        let stamps: Vec<i64> = timeline.iter().map(|e| e.timestamp_ms).collect();
        assert_eq!(stamps, vec![1_000, 2_000, 3_000]);

        let latest = index.timeline(&TimelineQuery {
            latest_only: true,
            ..query.clone()
        });
        assert_eq!(latest.len(), 2);
        assert!(latest.iter().any(|e| e.timestamp_ms == 3_000));

        let windowed = index.timeline(&TimelineQuery {
            since: Some(1_500),
            until: Some(2_500),
            ..Default::default()
        });
        let stamps: Vec<i64> = windowed.iter().map(|e| e.timestamp_ms).collect();
        assert_eq!(stamps, vec![1_500, 2_000]);

        let filtered = index.timeline(&TimelineQuery {
            filter: Some("README".to_string()),
            ..Default::default()
        });
        assert_eq!(filtered.len(), 2);
    }

    #[cfg(not(windows))]
    #[test]
    fn test_missing_snapshot_flagged() {
        let dir = tempfile::tempdir().unwrap();
        let folder = write_folder(dir.path(), "file:///work/app/a.rs", &[("AAAA.rs", 10, "x")]);
        fs::remove_file(folder.join("AAAA.rs")).unwrap();

        let index = HistoryIndex::load(dir.path()).unwrap();
        assert!(index.entries[0].missing);
        assert!(index.timeline(&TimelineQuery::default()).is_empty());
        assert_eq!(
            index
                .timeline(&TimelineQuery {
                    include_missing: true,
                    ..Default::default()
                })
                .len(),
            1
        );
    }

    #[cfg(not(windows))]
    #[test]
    fn test_find_versions_by_hash_and_scan() {
        let dir = tempfile::tempdir().unwrap();
        write_folder(
            dir.path(),
            "file:///work/app/src/lib.rs",
            &[("b.rs", 20, "new"), ("a.rs", 10, "old")],
        );

        let versions = find_versions(dir.path(), Path::new("/work/app/src/lib.rs")).unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].timestamp_ms, 10);

        // Folder under a foreign name is still found by scanning
        let other = dir.path().join("renamed");
        fs::create_dir_all(&other).unwrap();
        fs::write(other.join("c.rs"), "x").unwrap();
        fs::write(
            other.join("entries.json"),
            r#"{"version":1,"resource":"file:///work/app/src/other.rs","entries":[{"id":"c.rs","timestamp":5}]}"#,
        )
        .unwrap();
        let versions = find_versions(dir.path(), Path::new("/work/app/src/other.rs")).unwrap();
        assert_eq!(versions.len(), 1);
        assert_eq!(versions[0].source, None);
    }
}
