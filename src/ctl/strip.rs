//! Removal of every annotation comment from a source tree

use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::LazyLock;
use std::time::Instant;
use walkdir::WalkDir;

use crate::archive;

static PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^\s*///?\s*@component:\s*\{.*\}\s*$",
        r"^\s*///?\s*@ctl4:.*$",
        r"^\s*///?\s*@ctl3:.*$",
        r"^\s*///?\s*CTL\s+v\d+\.\d+.*$",
        r"^\s*///?.*@component.*:.*$",
        r"^\s*///?.*Ⱦ\[.*\].*:=.*$",
        r"^\s*///?.*∇.*⊗.*⊕.*$",
    ]
    .iter()
    .map(|p| Regex::new(&format!("(?i){}", p)).expect("valid regex"))
    .collect()
});

static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)ctl\s+v\d+\.\d+").expect("valid regex"));

/// What kind of annotation a removed line held
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum AnnotationType {
    Component,
    Ctl4,
    Ctl3,
    VersionHeader,
    TensorNotation,
    TensorOperators,
    Unknown,
}

impl AnnotationType {
    fn detect(line: &str) -> Self {
        let lower = line.to_lowercase();
        if lower.contains("@component:") {
            Self::Component
        } else if lower.contains("@ctl4:") {
            Self::Ctl4
        } else if lower.contains("@ctl3:") {
            Self::Ctl3
        } else if VERSION_RE.is_match(line) {
            Self::VersionHeader
        } else if lower.contains("ⱦ[") {
            Self::TensorNotation
        } else if ['∇', '⊗', '⊕', '⊙', '⊡'].iter().any(|op| line.contains(*op)) {
            Self::TensorOperators
        } else {
            Self::Unknown
        }
    }
}

impl fmt::Display for AnnotationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Component => "@component",
            Self::Ctl4 => "@ctl4",
            Self::Ctl3 => "@ctl3",
            Self::VersionHeader => "CTL version",
            Self::TensorNotation => "Tensor notation",
            Self::TensorOperators => "Tensor operators",
            Self::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// A matched annotation line
#[derive(Debug, Clone, Serialize)]
pub struct Annotation {
    pub file: PathBuf,
    /// 1-based
    pub line: usize,
    pub content: String,
    pub kind: AnnotationType,
}

/// Whether `line` is an annotation comment, and which kind
pub fn classify_line(line: &str) -> Option<AnnotationType> {
    PATTERNS
        .iter()
        .any(|re| re.is_match(line))
        .then(|| AnnotationType::detect(line))
}

/// Every annotation line in the `.rs` files under `crates_dir`
pub fn find_annotations(crates_dir: &Path) -> Vec<Annotation> {
    let mut found = Vec::new();

    let walker = WalkDir::new(crates_dir)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || e.file_name() != "target");

    for entry in walker.filter_map(|e| e.ok()) {
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().map_or(true, |ext| ext != "rs") {
            continue;
        }
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "failed to read");
                continue;
            }
        };
        for (idx, line) in content.lines().enumerate() {
            if let Some(kind) = classify_line(line) {
                found.push(Annotation {
                    file: path.to_path_buf(),
                    line: idx + 1,
                    content: line.trim().to_string(),
                    kind,
                });
            }
        }
    }

    found
}

/// Outcome for one file
#[derive(Debug, Clone, Serialize)]
pub struct RemovalResult {
    pub file: PathBuf,
    pub removed: usize,
    pub original_lines: usize,
    pub final_lines: usize,
    pub kinds: Vec<AnnotationType>,
    pub success: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StripOptions {
    pub dry_run: bool,
    pub backup: bool,
    /// Run `cargo check --workspace` afterwards
    pub check: bool,
}

#[derive(Debug, Serialize)]
pub struct CleanupReport {
    pub files_processed: usize,
    pub annotations_removed: usize,
    pub files_with_annotations: usize,
    pub backup: Option<PathBuf>,
    /// `None` when no check was run
    pub compilation_success: Option<bool>,
    pub duration_seconds: f64,
    pub results: Vec<RemovalResult>,
}

/// Remove the given line numbers (1-based) from one file
fn remove_lines(file: &Path, lines: &[usize], kinds: Vec<AnnotationType>, dry_run: bool) -> RemovalResult {
    let mut result = RemovalResult {
        file: file.to_path_buf(),
        removed: 0,
        original_lines: 0,
        final_lines: 0,
        kinds,
        success: false,
        error: None,
    };

    let content = match fs::read_to_string(file) {
        Ok(c) => c,
        Err(e) => {
            result.error = Some(e.to_string());
            return result;
        }
    };

    let original: Vec<&str> = content.split_inclusive('\n').collect();
    let kept: Vec<&str> = original
        .iter()
        .enumerate()
        .filter(|(idx, _)| !lines.contains(&(idx + 1)))
        .map(|(_, l)| *l)
        .collect();

    result.original_lines = original.len();
    result.final_lines = kept.len();
    result.removed = original.len() - kept.len();

    if !dry_run {
        if let Err(e) = fs::write(file, kept.concat()) {
            result.error = Some(e.to_string());
            return result;
        }
    }

    result.success = true;
    result
}

/// Run `cargo check --workspace` in `project_root`
pub fn cargo_check(project_root: &Path) -> bool {
    match Command::new("cargo")
        .args(["check", "--workspace"])
        .current_dir(project_root)
        .output()
    {
        Ok(output) => {
            if !output.status.success() {
                tracing::warn!(
                    stderr = %String::from_utf8_lossy(&output.stderr),
                    "cargo check failed"
                );
            }
            output.status.success()
        }
        Err(e) => {
            tracing::warn!(error = %e, "could not run cargo");
            false
        }
    }
}

/// Strip the given annotations, grouped per file
pub fn strip(
    project_root: &Path,
    annotations: &[Annotation],
    options: &StripOptions,
) -> Result<CleanupReport> {
    let started = Instant::now();

    let mut by_file: BTreeMap<&Path, Vec<&Annotation>> = BTreeMap::new();
    for annotation in annotations {
        by_file.entry(&annotation.file).or_default().push(annotation);
    }

    let backup = if options.backup && !options.dry_run && !by_file.is_empty() {
        let name = format!(
            "ctl_cleanup_backup_{}",
            chrono::Local::now().format("%Y%m%d_%H%M%S")
        );
        let files: Vec<PathBuf> = by_file.keys().map(|p| p.to_path_buf()).collect();
        let path = archive::write_backup(
            &project_root.join("backups").join(name),
            project_root,
            &files,
            "ctl-strip",
        )
        .context("Failed to back up files before stripping")?;
        Some(path)
    } else {
        None
    };

    let results: Vec<RemovalResult> = by_file
        .iter()
        .map(|(file, anns)| {
            let lines: Vec<usize> = anns.iter().map(|a| a.line).collect();
            let mut kinds: Vec<AnnotationType> = anns.iter().map(|a| a.kind).collect();
            kinds.sort();
            kinds.dedup();
            let result = remove_lines(file, &lines, kinds, options.dry_run);
            if let Some(error) = &result.error {
                tracing::warn!(file = %file.display(), %error, "failed to strip");
            }
            result
        })
        .collect();

    let compilation_success = (options.check && !options.dry_run).then(|| cargo_check(project_root));

    let ok = results.iter().filter(|r| r.success);
    Ok(CleanupReport {
        files_processed: results.len(),
        annotations_removed: ok.clone().map(|r| r.removed).sum(),
        files_with_annotations: ok.filter(|r| r.removed > 0).count(),
        backup,
        compilation_success,
        duration_seconds: started.elapsed().as_secs_f64(),
        results,
    })
}

impl CleanupReport {
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("Failed to write: {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_classify_line() {
        assert_eq!(
            classify_line(r#"    // @component: {"k":"C","id":"x","t":"y"}"#),
            Some(AnnotationType::Component)
        );
        assert_eq!(
            classify_line("/// @CTL4: x:C:1:2"),
            Some(AnnotationType::Ctl4)
        );
        assert_eq!(
            classify_line("// @ctl3: Ⱦ[a:service] := {∇[1→2]}"),
            Some(AnnotationType::Ctl3)
        );
        assert_eq!(
            classify_line("// CTL v3.0 tensor header"),
            Some(AnnotationType::VersionHeader)
        );
        assert_eq!(
            classify_line("// see Ⱦ[a:b] := {}"),
            Some(AnnotationType::TensorNotation)
        );
        assert_eq!(
            classify_line("// ∇ then ⊗ then ⊕"),
            Some(AnnotationType::TensorOperators)
        );
        assert_eq!(classify_line("// ordinary comment"), None);
        assert_eq!(classify_line(r#"let s = "@component: {}";"#), None);
    }

    #[test]
    fn test_strip_removes_lines_and_backs_up() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("crates").join("core").join("src");
        fs::create_dir_all(&src).unwrap();
        let lib = src.join("lib.rs");
        fs::write(
            &lib,
            "// @component: {\"k\":\"C\",\"id\":\"core\",\"t\":\"Core\"}\nfn main() {}\n    // @ctl4: a:C:1:2\n",
        )
        .unwrap();
        fs::write(src.join("clean.rs"), "fn clean() {}\n").unwrap();

        let found = find_annotations(&dir.path().join("crates"));
        assert_eq!(found.len(), 2);
        assert_eq!(found[1].line, 3);

        let dry = strip(
            dir.path(),
            &found,
            &StripOptions {
                dry_run: true,
                backup: true,
                check: false,
            },
        )
        .unwrap();
        assert_eq!(dry.annotations_removed, 2);
        assert!(dry.backup.is_none());
        assert!(fs::read_to_string(&lib).unwrap().contains("@ctl4"));

        let report = strip(
            dir.path(),
            &found,
            &StripOptions {
                dry_run: false,
                backup: true,
                check: false,
            },
        )
        .unwrap();
        assert_eq!(fs::read_to_string(&lib).unwrap(), "fn main() {}\n");
        assert_eq!(report.files_processed, 1);
        assert_eq!(report.files_with_annotations, 1);
        assert_eq!(report.results[0].original_lines, 3);
        assert_eq!(report.results[0].final_lines, 1);
        assert_eq!(report.compilation_success, None);

        let backup = report.backup.unwrap();
        assert!(backup.starts_with(dir.path().join("backups")));
        let manifest = archive::read_manifest(&backup).unwrap();
        assert_eq!(manifest.reason, "ctl-strip");
        assert_eq!(manifest.files.len(), 1);
    }
}
