//! Shared utilities for commands

use anyhow::{Context, Result};
use owo_colors::{OwoColorize, Style};
use std::fmt::Display;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

static COLOR: AtomicBool = AtomicBool::new(true);

/// Turn colored output on or off for the rest of the process
pub fn set_color(enabled: bool) {
    COLOR.store(enabled, Ordering::Relaxed);
}

fn paint(text: impl Display, style: Style) -> String {
    if COLOR.load(Ordering::Relaxed) {
        text.style(style).to_string()
    } else {
        text.to_string()
    }
}

pub fn green(text: impl Display) -> String {
    paint(text, Style::new().green())
}

pub fn yellow(text: impl Display) -> String {
    paint(text, Style::new().yellow())
}

pub fn red(text: impl Display) -> String {
    paint(text, Style::new().red())
}

pub fn blue(text: impl Display) -> String {
    paint(text, Style::new().blue())
}

pub fn bold(text: impl Display) -> String {
    paint(text, Style::new().bold())
}

pub fn dimmed(text: impl Display) -> String {
    paint(text, Style::new().dimmed())
}

/// Print the dry-run banner
pub fn dry_run_notice() {
    println!("{}", blue("(DRY-RUN MODE - no changes will be made)"));
}

/// Ask a `(y/N)` question; `yes` answers it up front
pub fn confirm(prompt: &str, yes: bool) -> Result<bool> {
    if yes {
        return Ok(true);
    }

    print!("\n{} (y/N) ", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;

    if !input.trim().eq_ignore_ascii_case("y") {
        println!("Aborted.");
        return Ok(false);
    }
    Ok(true)
}

/// Format bytes as human-readable size
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Strip Windows extended-length path prefix (\\?\)
///
/// On Windows, `canonicalize()` returns paths like `\\?\C:\path` which don't
/// match the editor's stored paths and display poorly. This strips the prefix.
pub fn strip_windows_prefix(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    if let Some(stripped) = path_str.strip_prefix(r"\\?\") {
        PathBuf::from(stripped)
    } else {
        path.to_path_buf()
    }
}

/// Canonicalize a user-supplied path that must exist
pub fn existing_path(path: &Path) -> Result<PathBuf> {
    let canonical = path
        .canonicalize()
        .with_context(|| format!("Path does not exist: {}", path.display()))?;
    Ok(strip_windows_prefix(&canonical))
}

/// Shorten `text` to `max` chars, marking the cut with `...`
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", kept)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1024), "1.0 KB");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(1024 * 1024), "1.0 MB");
        assert_eq!(format_size(1024 * 1024 * 1024), "1.0 GB");
    }

    #[test]
    fn test_strip_windows_prefix() {
        let result = strip_windows_prefix(Path::new(r"\\?\C:\path\to\project"));
        assert_eq!(result, PathBuf::from(r"C:\path\to\project"));

        let result = strip_windows_prefix(Path::new("/path/to/project"));
        assert_eq!(result, PathBuf::from("/path/to/project"));
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("src/very/long/path.rs", 10), "src/ver...");
        assert_eq!(truncate("ÄÖÜäöü", 5), "ÄÖ...");
    }

    #[test]
    fn test_paint_respects_color_switch() {
        set_color(false);
        assert_eq!(green("Restored:"), "Restored:");
        set_color(true);
        assert_ne!(green("Restored:"), "Restored:");
    }
}
