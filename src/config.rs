//! Platform-specific paths and sync settings

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the Cursor user directory
pub const CURSOR_USER_DIR_ENV: &str = "CURSOR_USER_DIR";

/// Get the Cursor user directory
/// - macOS: ~/Library/Application Support/Cursor/User/
/// - Linux: ~/.config/Cursor/User/
/// - Windows: %APPDATA%/Cursor/User/
pub fn cursor_user_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(CURSOR_USER_DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }

    #[cfg(target_os = "macos")]
    {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home
            .join("Library")
            .join("Application Support")
            .join("Cursor")
            .join("User"))
    }

    #[cfg(target_os = "linux")]
    {
        let config = dirs::config_dir().context("Could not determine config directory")?;
        Ok(config.join("Cursor").join("User"))
    }

    #[cfg(target_os = "windows")]
    {
        let appdata = dirs::config_dir().context("Could not determine AppData directory")?;
        Ok(appdata.join("Cursor").join("User"))
    }
}

/// Get the Cursor local history directory (`<user dir>/History`)
pub fn history_dir() -> Result<PathBuf> {
    Ok(cursor_user_dir()?.join("History"))
}

/// Resolve the host project root
///
/// An explicit path wins. Otherwise the current directory is used, except
/// when running from inside `docs-daemon/`, where the parent is the root.
pub fn resolve_project_root(explicit: Option<PathBuf>) -> Result<PathBuf> {
    match explicit {
        Some(p) => Ok(p),
        None => {
            let cwd = std::env::current_dir().context("Failed to get current directory")?;
            Ok(root_from_cwd(cwd))
        }
    }
}

fn root_from_cwd(cwd: PathBuf) -> PathBuf {
    if cwd.ends_with("docs-daemon") {
        if let Some(parent) = cwd.parent() {
            return parent.to_path_buf();
        }
    }
    cwd
}

/// Settings for the CTL sync daemon, read from `settings.json`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SyncSettings {
    pub paths: PathSettings,
    pub parsing: ParsingSettings,
    pub markers: MarkerSettings,
    pub watch: WatchSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PathSettings {
    /// Directory scanned for annotated sources, relative to the project root
    pub crates_dir: String,
    /// Markdown file holding the generated architecture section
    pub doc_file: String,
    /// Hash cache, relative to the project root
    pub cache_file: String,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            crates_dir: "crates".to_string(),
            doc_file: "CLAUDE.md".to_string(),
            cache_file: "cache.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ParsingSettings {
    pub ctl3: Ctl3Settings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Ctl3Settings {
    /// Use the enhanced tensor parser (extended operators, v2 migration)
    pub use_enhanced: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MarkerSettings {
    pub start: String,
    pub end: String,
}

impl Default for MarkerSettings {
    fn default() -> Self {
        Self {
            start: "# AUTO-GENERATED ARCHITECTURE".to_string(),
            end: "# AUTO-GENERATED COMPONENT STATUS".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WatchSettings {
    pub debounce_ms: u64,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self { debounce_ms: 500 }
    }
}

impl SyncSettings {
    /// Load settings from a file; a missing file yields defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "settings file not found, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse settings: {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_paths_exist() {
        // These should not panic
        let _ = cursor_user_dir();
        let _ = history_dir();
    }

    #[test]
    fn test_resolve_project_root_docs_daemon() {
        assert_eq!(
            root_from_cwd(PathBuf::from("/work/app/docs-daemon")),
            PathBuf::from("/work/app")
        );
        assert_eq!(root_from_cwd(PathBuf::from("/work/app")), PathBuf::from("/work/app"));
    }

    #[test]
    fn test_explicit_project_root_is_kept() {
        let root = resolve_project_root(Some(PathBuf::from("/work/app/docs-daemon"))).unwrap();
        assert_eq!(root, PathBuf::from("/work/app/docs-daemon"));
    }

    #[test]
    fn test_resolve_project_root_plain() {
        let root = resolve_project_root(Some(PathBuf::from("/work/app"))).unwrap();
        assert_eq!(root, PathBuf::from("/work/app"));
    }

    #[test]
    fn test_settings_missing_file_defaults() {
        let settings = SyncSettings::load("/nonexistent/settings.json").unwrap();
        assert_eq!(settings, SyncSettings::default());
        assert_eq!(settings.paths.crates_dir, "crates");
        assert_eq!(settings.watch.debounce_ms, 500);
    }

    #[test]
    fn test_settings_partial_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "paths": {{ "doc_file": "ARCH.md" }}, "parsing": {{ "ctl3": {{ "use_enhanced": true }} }} }}"#
        )
        .unwrap();

        let settings = SyncSettings::load(file.path()).unwrap();
        assert_eq!(settings.paths.doc_file, "ARCH.md");
        assert_eq!(settings.paths.crates_dir, "crates");
        assert!(settings.parsing.ctl3.use_enhanced);
        assert_eq!(settings.markers.start, "# AUTO-GENERATED ARCHITECTURE");
    }

    #[test]
    fn test_settings_malformed_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(SyncSettings::load(file.path()).is_err());
    }
}
