//! tar.gz safety backups taken before files are overwritten

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tar::{Archive, Builder};

/// Manifest stored as `manifest.json` at the root of every backup
#[derive(Debug, Serialize, Deserialize)]
pub struct BackupManifest {
    /// Version of the backup format
    pub version: u32,
    /// What produced the backup (e.g. `history-restore`, `ctl-strip`)
    pub reason: String,
    /// Root the archived paths are relative to
    pub root: String,
    /// Timestamp of backup creation
    pub created_at: i64,
    /// Archived files, relative to `root`
    pub files: Vec<String>,
}

/// Write a tar.gz backup holding `files` (paths under `root`)
///
/// Files outside `root` are stored under `external/` with their full path
/// flattened. Returns the path of the created archive.
pub fn write_backup(
    backup_file: &Path,
    root: &Path,
    files: &[PathBuf],
    reason: &str,
) -> Result<PathBuf> {
    let backup_path = with_tar_gz_extension(backup_file);

    if let Some(parent) = backup_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create: {}", parent.display()))?;
        }
    }

    let file = File::create(&backup_path)
        .with_context(|| format!("Failed to create: {}", backup_path.display()))?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut archive = Builder::new(encoder);

    let mut names = Vec::with_capacity(files.len());
    for path in files {
        if !path.is_file() {
            continue;
        }
        let name = archive_name(root, path);
        archive
            .append_path_with_name(path, &name)
            .with_context(|| format!("Failed to archive: {}", path.display()))?;
        names.push(name);
    }

    let manifest = BackupManifest {
        version: 1,
        reason: reason.to_string(),
        root: root.to_string_lossy().to_string(),
        created_at: chrono::Utc::now().timestamp(),
        files: names,
    };
    let manifest_json = serde_json::to_string_pretty(&manifest)?;
    add_file_to_archive(&mut archive, "manifest.json", manifest_json.as_bytes())?;

    let encoder = archive.into_inner()?;
    encoder.finish()?;

    tracing::info!(path = %backup_path.display(), files = manifest.files.len(), "backup written");
    Ok(backup_path)
}

/// Read the manifest of a backup archive
pub fn read_manifest(backup_path: &Path) -> Result<BackupManifest> {
    let file = File::open(backup_path)
        .with_context(|| format!("Failed to open: {}", backup_path.display()))?;
    let mut archive = Archive::new(GzDecoder::new(file));

    for entry in archive.entries()? {
        let mut entry = entry?;
        if entry.path()?.as_ref() == Path::new("manifest.json") {
            let mut content = String::new();
            std::io::Read::read_to_string(&mut entry, &mut content)?;
            return serde_json::from_str(&content).context("Failed to parse manifest.json");
        }
    }

    anyhow::bail!("No manifest.json in backup: {}", backup_path.display())
}

fn with_tar_gz_extension(path: &Path) -> PathBuf {
    if path.to_string_lossy().ends_with(".tar.gz") {
        path.to_path_buf()
    } else {
        PathBuf::from(format!("{}.tar.gz", path.display()))
    }
}

fn archive_name(root: &Path, path: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(relative) => relative.to_string_lossy().replace('\\', "/"),
        Err(_) => {
            let flat: String = path
                .to_string_lossy()
                .chars()
                .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
                .collect();
            format!("external/{}", flat.trim_start_matches('_'))
        }
    }
}

/// Add a file with content to the archive
fn add_file_to_archive<W: Write>(
    archive: &mut Builder<W>,
    name: &str,
    content: &[u8],
) -> Result<()> {
    let mut header = tar::Header::new_gnu();
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(chrono::Utc::now().timestamp().max(0) as u64);
    header.set_cksum();

    archive.append_data(&mut header, name, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_tar_gz_extension() {
        assert_eq!(
            with_tar_gz_extension(Path::new("backup")),
            PathBuf::from("backup.tar.gz")
        );
        assert_eq!(
            with_tar_gz_extension(Path::new("backup.tar.gz")),
            PathBuf::from("backup.tar.gz")
        );
    }

    #[cfg(not(windows))]
    #[test]
    fn test_archive_name() {
        let root = Path::new("/work/app");
        assert_eq!(
            archive_name(root, Path::new("/work/app/src/lib.rs")),
            "src/lib.rs"
        );
        assert_eq!(
            archive_name(root, Path::new("/other/file.rs")),
            "external/other_file.rs"
        );
    }

    #[test]
    fn test_write_and_read_backup() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("project");
        fs::create_dir_all(root.join("src")).unwrap();
        let file = root.join("src").join("main.rs");
        fs::write(&file, "fn main() {}").unwrap();
        let missing = root.join("gone.rs");

        let out = write_backup(
            &dir.path().join("safety"),
            &root,
            &[file.clone(), missing],
            "test",
        )
        .unwrap();

        assert!(out.to_string_lossy().ends_with("safety.tar.gz"));
        let manifest = read_manifest(&out).unwrap();
        assert_eq!(manifest.version, 1);
        assert_eq!(manifest.reason, "test");
        assert_eq!(manifest.files, vec!["src/main.rs".to_string()]);
    }
}
