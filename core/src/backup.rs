//! Atomic replacement of translated game files.

use chrono::Local;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupOutcome {
    /// Timestamped copy of the previous file, when one was kept.
    pub backup_path: Option<PathBuf>,
    pub written_path: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("{0}")]
    Io(#[from] io::Error),
    #[error("Cannot back up {path}: {source}")]
    Backup { path: String, source: io::Error },
    #[error("{0} has no file name")]
    NoFileName(String),
}

/// Replace `target` with `contents` through a sibling staging file and a
/// rename, so readers never see a half-written JAR or table.
///
/// With `keep_backup`, an existing target is first copied to
/// `<name>.bak.<timestamp>`.
pub fn backup_and_swap(
    target: &Path,
    contents: &[u8],
    keep_backup: bool,
) -> Result<BackupOutcome, BackupError> {
    let file_name = target
        .file_name()
        .ok_or_else(|| BackupError::NoFileName(target.display().to_string()))?;
    if let Some(parent) = target.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let backup_path = if keep_backup && target.exists() {
        let mut name = file_name.to_os_string();
        name.push(format!(".bak.{}", Local::now().format("%Y%m%d%H%M%S")));
        let backup = target.with_file_name(name);
        fs::copy(target, &backup).map_err(|source| BackupError::Backup {
            path: target.display().to_string(),
            source,
        })?;
        log::info!("Backed up {} to {}", target.display(), backup.display());
        Some(backup)
    } else {
        None
    };

    let mut staging_name = file_name.to_os_string();
    staging_name.push(format!(".partial.{}", std::process::id()));
    let staging = target.with_file_name(staging_name);

    let written = File::create(&staging).and_then(|mut file| {
        file.write_all(contents)?;
        file.sync_all()
    });
    if let Err(err) = written.and_then(|_| replace(&staging, target)) {
        let _ = fs::remove_file(&staging);
        return Err(err.into());
    }

    Ok(BackupOutcome {
        backup_path,
        written_path: target.to_path_buf(),
    })
}

#[cfg(not(target_os = "windows"))]
fn replace(staging: &Path, target: &Path) -> io::Result<()> {
    fs::rename(staging, target)
}

// rename does not overwrite a file held open by the game launcher
#[cfg(target_os = "windows")]
fn replace(staging: &Path, target: &Path) -> io::Result<()> {
    match fs::rename(staging, target) {
        Err(err)
            if matches!(
                err.kind(),
                io::ErrorKind::AlreadyExists | io::ErrorKind::PermissionDenied
            ) =>
        {
            fs::remove_file(target)?;
            fs::rename(staging, target)
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn replaces_without_backup_by_default() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("mod.jar");
        fs::write(&target, b"original").unwrap();

        let outcome = backup_and_swap(&target, b"translated", false).unwrap();
        assert!(outcome.backup_path.is_none());
        assert_eq!(outcome.written_path, target);
        assert_eq!(fs::read(&target).unwrap(), b"translated");
        // no staging file left behind
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn keeps_timestamped_backup() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("rules.csv");
        fs::write(&target, b"original").unwrap();

        let outcome = backup_and_swap(&target, b"translated", true).unwrap();
        let backup = outcome.backup_path.unwrap();
        assert!(backup
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("rules.csv.bak."));
        assert_eq!(fs::read(&backup).unwrap(), b"original");
        assert_eq!(fs::read(&target).unwrap(), b"translated");
    }

    #[test]
    fn creates_missing_directories() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("data").join("hulls.csv");
        let outcome = backup_and_swap(&target, b"x", true).unwrap();
        assert!(outcome.backup_path.is_none());
        assert_eq!(fs::read(&target).unwrap(), b"x");
    }
}
