//! `unwrap()` audit and cleanup for non-test code
//!
//! Lines are sanitized before matching: string contents are blanked and
//! `//` comments cut off, so byte offsets still line up with the source.
//! Items under `#[cfg(test)]` are skipped by tracking brace depth from the
//! attribute's following item.

use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use walkdir::WalkDir;

/// Directories never scanned
pub const SKIPPED_DIRS: [&str; 4] = ["target", "tests", "benches", "examples"];

static FN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bfn\s+([A-Za-z_][A-Za-z0-9_]*)").expect("valid regex"));

const MAX_RECEIVER: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PanicKind {
    Unwrap,
    Expect,
    Panic,
}

impl PanicKind {
    fn needle(&self) -> &'static str {
        match self {
            Self::Unwrap => ".unwrap()",
            Self::Expect => ".expect(",
            Self::Panic => "panic!(",
        }
    }
}

impl fmt::Display for PanicKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unwrap => "unwrap",
            Self::Expect => "expect",
            Self::Panic => "panic",
        })
    }
}

/// One match in source
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hit {
    /// 1-based
    pub line: usize,
    /// Byte offset of the match in the line
    pub column: usize,
    pub kind: PanicKind,
    /// Innermost enclosing `fn`, if any
    pub function: Option<String>,
}

/// Per-line scanner state carried across lines
#[derive(Debug, Default)]
struct Scanner {
    in_string: bool,
    depth: i64,
    /// `#[cfg(test)]` seen, item not yet opened
    test_pending: bool,
    /// Depth to return to when the test item closes
    test_until: Option<i64>,
    /// (name, depth before the body, body opened)
    fns: Vec<(String, i64, bool)>,
}

impl Scanner {
    /// Blank string contents and drop `//` comments, keeping byte offsets
    fn sanitize(&mut self, line: &str) -> String {
        let bytes = line.as_bytes();
        let mut out = bytes.to_vec();
        let mut i = 0;
        while i < bytes.len() {
            let b = bytes[i];
            if self.in_string {
                if b == b'\\' {
                    out[i] = b' ';
                    if i + 1 < bytes.len() {
                        out[i + 1] = b' ';
                    }
                    i += 2;
                    continue;
                }
                if b == b'"' {
                    self.in_string = false;
                } else {
                    out[i] = b' ';
                }
                i += 1;
                continue;
            }
            match b {
                b'"' => self.in_string = true,
                b'/' if bytes.get(i + 1) == Some(&b'/') => {
                    out.truncate(i);
                    break;
                }
                b'\'' => {
                    // char literals; lifetimes fall through
                    if bytes.get(i + 2) == Some(&b'\'') {
                        out[i + 1] = b' ';
                        i += 3;
                        continue;
                    }
                    if bytes.get(i + 1) == Some(&b'\\') {
                        if let Some(end) = bytes[i + 2..].iter().take(10).position(|c| *c == b'\'') {
                            let close = i + 2 + end;
                            for c in &mut out[i + 1..close] {
                                *c = b' ';
                            }
                            i = close + 1;
                            continue;
                        }
                    }
                }
                _ => {}
            }
            i += 1;
        }
        String::from_utf8_lossy(&out).into_owned()
    }

    fn current_fn(&self) -> Option<String> {
        self.fns.last().map(|(name, _, _)| name.clone())
    }

    /// Update depth and tracking for `code`; returns whether the line is
    /// part of test-only code
    fn advance(&mut self, code: &str) -> bool {
        let mut in_test = self.test_until.is_some();

        if code.contains("#[cfg(test)]") {
            self.test_pending = true;
            in_test = true;
        }

        let mut pushed = false;
        if self.test_until.is_none() {
            if let Some(caps) = FN_RE.captures(code) {
                let declares_body = code.contains('{') || !code.trim_end().ends_with(';');
                if declares_body {
                    self.fns.push((caps[1].to_string(), self.depth, false));
                    pushed = true;
                }
            }
        }

        for c in code.chars() {
            match c {
                '{' => {
                    if self.test_pending && self.test_until.is_none() {
                        self.test_until = Some(self.depth);
                        self.test_pending = false;
                        in_test = true;
                    }
                    self.depth += 1;
                }
                '}' => {
                    self.depth -= 1;
                    if self.test_until == Some(self.depth) {
                        self.test_until = None;
                    }
                }
                _ => {}
            }
        }

        if self.test_pending && self.test_until.is_none() && code.trim_end().ends_with(';') {
            // `#[cfg(test)] mod tests;` or a bodiless item
            self.test_pending = false;
            in_test = true;
        }

        // one-line bodies open and close here
        if pushed && code.contains('{') {
            if let Some(f) = self.fns.last_mut() {
                f.2 = true;
            }
        }
        for f in self.fns.iter_mut() {
            if self.depth > f.1 {
                f.2 = true;
            }
        }
        while let Some((_, depth, opened)) = self.fns.last() {
            if *opened && self.depth <= *depth {
                self.fns.pop();
            } else {
                break;
            }
        }

        in_test
    }
}

/// All hits in one file's contents
pub fn scan_source(content: &str, include_panics: bool) -> Vec<Hit> {
    let mut kinds = vec![PanicKind::Unwrap, PanicKind::Expect];
    if include_panics {
        kinds.push(PanicKind::Panic);
    }

    let mut scanner = Scanner::default();
    let mut hits = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        let code = scanner.sanitize(line);
        let function = FN_RE
            .captures(&code)
            .map(|c| c[1].to_string())
            .or_else(|| scanner.current_fn());
        if scanner.advance(&code) {
            continue;
        }
        for kind in &kinds {
            for (column, _) in code.match_indices(kind.needle()) {
                if *kind == PanicKind::Panic && code[..column].ends_with(|c: char| c.is_alphanumeric() || c == '_') {
                    continue;
                }
                hits.push(Hit {
                    line: idx + 1,
                    column,
                    kind: *kind,
                    function: function.clone(),
                });
            }
        }
    }

    hits.sort_by_key(|h| (h.line, h.column));
    hits
}

/// Expression right before `.unwrap()`, for the expect message
fn receiver(before: &str) -> String {
    let bytes = before.as_bytes();
    let mut start = bytes.len();
    let mut parens = 0i32;
    while start > 0 {
        let c = bytes[start - 1];
        match c {
            b')' | b']' => parens += 1,
            b'(' | b'[' if parens > 0 => parens -= 1,
            _ if parens > 0 => {}
            b'_' | b'.' | b':' => {}
            _ if c.is_ascii_alphanumeric() => {}
            _ => break,
        }
        start -= 1;
    }
    let text: String = before[start..]
        .trim_start_matches(['.', ':'])
        .replace(['"', '\\'], "'");
    if text.chars().count() > MAX_RECEIVER {
        let tail: String = text.chars().rev().take(MAX_RECEIVER).collect::<Vec<_>>().into_iter().rev().collect();
        format!("..{}", tail)
    } else {
        text
    }
}

/// Rewrite every counted `.unwrap()` as `.expect("<fn>: <receiver>")`
///
/// Returns the new contents and how many calls were rewritten.
pub fn fix_source(content: &str) -> (String, usize) {
    let hits: Vec<Hit> = scan_source(content, false)
        .into_iter()
        .filter(|h| h.kind == PanicKind::Unwrap)
        .collect();
    if hits.is_empty() {
        return (content.to_string(), 0);
    }

    let mut by_line: BTreeMap<usize, Vec<&Hit>> = BTreeMap::new();
    for hit in &hits {
        by_line.entry(hit.line).or_default().push(hit);
    }

    let mut out = String::with_capacity(content.len() + hits.len() * 24);
    for (idx, raw) in content.split_inclusive('\n').enumerate() {
        let Some(line_hits) = by_line.get(&(idx + 1)) else {
            out.push_str(raw);
            continue;
        };
        let mut line = raw.to_string();
        for hit in line_hits.iter().rev() {
            let context = hit.function.as_deref().unwrap_or("top-level");
            let message = format!("{}: {}", context, receiver(&line[..hit.column]));
            let end = hit.column + PanicKind::Unwrap.needle().len();
            line.replace_range(hit.column..end, &format!(".expect(\"{}\")", message));
        }
        out.push_str(&line);
    }

    (out, hits.len())
}

/// One hit with its file
#[derive(Debug, Clone, Serialize)]
pub struct Occurrence {
    pub file: PathBuf,
    #[serde(rename = "crate")]
    pub krate: String,
    #[serde(flatten)]
    pub hit: Hit,
}

#[derive(Debug, Default, Serialize)]
pub struct AuditReport {
    pub root: PathBuf,
    pub files_scanned: usize,
    pub occurrences: Vec<Occurrence>,
}

/// Crate a file belongs to: the directory after `crates/`, else the first
/// directory under the root, else the root's own name
fn crate_of(root: &Path, rel: &Path) -> String {
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect();
    match parts.as_slice() {
        [first, name, _, ..] if first == "crates" => name.clone(),
        [first, _, ..] if first != "src" => first.clone(),
        _ => root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| ".".to_string()),
    }
}

/// Scan every non-test `.rs` file under `root`
pub fn audit(root: &Path, include_panics: bool) -> Result<AuditReport> {
    if !root.exists() {
        anyhow::bail!("Path not found: {}", root.display());
    }

    let mut report = AuditReport {
        root: root.to_path_buf(),
        ..AuditReport::default()
    };

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            e.depth() == 0
                || !e.file_type().is_dir()
                || !SKIPPED_DIRS.iter().any(|d| e.file_name() == *d)
        });

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
        report.files_scanned += 1;

        let rel = path.strip_prefix(root).unwrap_or(path);
        let krate = crate_of(root, rel);
        let hits = scan_source(&content, include_panics);
        tracing::debug!(file = %rel.display(), hits = hits.len(), "scanned");
        report
            .occurrences
            .extend(hits.into_iter().map(|hit| Occurrence {
                file: rel.to_path_buf(),
                krate: krate.clone(),
                hit,
            }));
    }

    Ok(report)
}

impl AuditReport {
    pub fn total(&self) -> usize {
        self.occurrences.len()
    }

    pub fn count(&self, kind: PanicKind) -> usize {
        self.occurrences.iter().filter(|o| o.hit.kind == kind).count()
    }

    /// Hits per crate, split by kind
    pub fn by_crate(&self) -> BTreeMap<&str, BTreeMap<PanicKind, usize>> {
        let mut out: BTreeMap<&str, BTreeMap<PanicKind, usize>> = BTreeMap::new();
        for o in &self.occurrences {
            *out.entry(&o.krate).or_default().entry(o.hit.kind).or_default() += 1;
        }
        out
    }

    /// Hits per file, most first
    pub fn by_file(&self) -> Vec<(&Path, usize)> {
        let mut counts: BTreeMap<&Path, usize> = BTreeMap::new();
        for o in &self.occurrences {
            *counts.entry(&o.file).or_default() += 1;
        }
        let mut files: Vec<_> = counts.into_iter().collect();
        files.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        files
    }

    /// Files with at least one `.unwrap()`, as absolute paths
    pub fn unwrap_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = self
            .occurrences
            .iter()
            .filter(|o| o.hit.kind == PanicKind::Unwrap)
            .map(|o| self.root.join(&o.file))
            .collect();
        files.dedup();
        files
    }
}

/// Apply [`fix_source`] to one file; writes nothing when `dry_run`
pub fn fix_file(path: &Path, dry_run: bool) -> Result<usize> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read: {}", path.display()))?;
    let (fixed, count) = fix_source(&content);
    if count > 0 && !dry_run {
        fs::write(path, fixed).with_context(|| format!("Failed to write: {}", path.display()))?;
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SOURCE: &str = r#"use std::fs;

fn load(path: &str) -> String {
    let text = fs::read_to_string(path).unwrap(); // checked by caller
    // a.unwrap() in a comment
    let s = "not .unwrap() here";
    text.parse::<u32>().expect("number");
    text
}

pub fn other() {
    panic!("boom");
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_it() {
        Some(1).unwrap();
    }
}

fn after() {
    let v = Some('"').unwrap();
}
"#;

    #[test]
    fn test_scan_source() {
        let hits = scan_source(SOURCE, false);
        let summary: Vec<(usize, PanicKind, Option<&str>)> = hits
            .iter()
            .map(|h| (h.line, h.kind, h.function.as_deref()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (4, PanicKind::Unwrap, Some("load")),
                (7, PanicKind::Expect, Some("load")),
                (24, PanicKind::Unwrap, Some("after")),
            ]
        );

        let with_panics = scan_source(SOURCE, true);
        assert!(with_panics
            .iter()
            .any(|h| h.kind == PanicKind::Panic && h.line == 12 && h.function.as_deref() == Some("other")));
    }

    #[test]
    fn test_cfg_test_bodiless_item() {
        let src = "#[cfg(test)]\nmod tests;\n\nfn a() {\n    x.unwrap();\n}\n";
        let hits = scan_source(src, false);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].line, 5);
    }

    #[test]
    fn test_receiver() {
        assert_eq!(receiver("    let x = map.get(&key)"), "map.get(&key)");
        assert_eq!(receiver("foo(bar"), "bar");
        assert_eq!(receiver("    s.lock()"), "s.lock()");
    }

    #[test]
    fn test_fix_source() {
        let src = "fn load() {\n    let v = cfg.get(\"k\").unwrap();\n}\n";
        let (fixed, count) = fix_source(src);
        assert_eq!(count, 1);
        assert_eq!(
            fixed,
            "fn load() {\n    let v = cfg.get(\"k\").expect(\"load: cfg.get('k')\");\n}\n"
        );

        let (unchanged, count) = fix_source("fn a() { b.expect(\"x\"); }\n");
        assert_eq!(count, 0);
        assert_eq!(unchanged, "fn a() { b.expect(\"x\"); }\n");
    }

    #[test]
    fn test_audit_tree() {
        let dir = tempfile::tempdir().unwrap();
        let write = |rel: &str, content: &str| {
            let path = dir.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        };
        write("crates/memory/src/lib.rs", "fn a() { x.unwrap(); y.unwrap(); }\n");
        write("crates/memory/tests/it.rs", "fn t() { x.unwrap(); }\n");
        write("crates/cli/src/main.rs", "fn main() { z.expect(\"z\"); }\n");
        write("target/debug/build.rs", "fn b() { x.unwrap(); }\n");

        let report = audit(dir.path(), false).unwrap();
        assert_eq!(report.files_scanned, 2);
        assert_eq!(report.total(), 3);
        assert_eq!(report.count(PanicKind::Unwrap), 2);
        let crates: Vec<&str> = report.by_crate().keys().copied().collect();
        assert_eq!(crates, vec!["cli", "memory"]);
        assert_eq!(report.by_file()[0].1, 2);

        let lib = dir.path().join("crates/memory/src/lib.rs");
        assert_eq!(report.unwrap_files(), vec![lib.clone()]);
        assert_eq!(fix_file(&lib, true).unwrap(), 2);
        assert!(fs::read_to_string(&lib).unwrap().contains(".unwrap()"));
        assert_eq!(fix_file(&lib, false).unwrap(), 2);
        assert_eq!(
            fs::read_to_string(&lib).unwrap(),
            "fn a() { x.expect(\"a: x\"); y.expect(\"a: y\"); }\n"
        );
    }
}
