use std::fs::{self, File};
use std::path::{Path, PathBuf};

use crate::error::{ReconcileError, ReconcileResult};

/// Timestamp used in backup names, e.g. `20241016-183405`.
pub fn backup_stamp() -> String {
  chrono::Local::now().format("%Y%m%d-%H%M%S").to_string()
}

/// Backup location for `document`: `<stem>.backup-<stamp>.<ext>` next to it.
///
/// When that name is taken (two runs within the same second) a counter is appended so
/// an earlier backup is never overwritten.
pub fn backup_path_for(document: &Path, stamp: &str) -> PathBuf {
  let stem = document
    .file_stem()
    .map(|stem| stem.to_string_lossy().into_owned())
    .unwrap_or_else(|| "document".to_string());
  let extension = document
    .extension()
    .map(|ext| format!(".{}", ext.to_string_lossy()))
    .unwrap_or_default();

  let mut candidate = document.with_file_name(format!("{stem}.backup-{stamp}{extension}"));
  let mut counter = 1;
  while candidate.exists() {
    candidate = document.with_file_name(format!("{stem}.backup-{stamp}-{counter}{extension}"));
    counter += 1;
  }
  candidate
}

/// Whether `path` names a backup produced by [`backup_path_for`].
pub fn is_backup_file(path: &Path) -> bool {
  path
    .file_stem()
    .and_then(|stem| stem.to_str())
    .is_some_and(|stem| stem.contains(".backup-"))
}

/// A write that may only happen once the pre-edit content is safely stored.
///
/// Holding a `GuardedWrite` proves that the backup (when enabled) was written and
/// flushed to disk, so a failing write can never lose the original content.
#[derive(Debug)]
pub struct GuardedWrite {
  destination: PathBuf,
  backup: Option<PathBuf>,
}

impl GuardedWrite {
  /// Copy `destination` verbatim to a fresh backup file, then allow writing to it.
  pub fn acquire(destination: &Path, backup: bool, stamp: &str) -> ReconcileResult<Self> {
    let backup = if backup {
      let backup_path = backup_path_for(destination, stamp);
      copy_and_sync(destination, &backup_path).map_err(|source| {
        ReconcileError::BackupFailure {
          path: backup_path.clone(),
          source,
        }
      })?;
      tracing::debug!("backup written to {}", backup_path.display());
      Some(backup_path)
    } else {
      None
    };

    Ok(Self {
      destination: destination.to_path_buf(),
      backup,
    })
  }

  /// Backup written for this destination, if any.
  pub fn backup(&self) -> Option<&Path> {
    self.backup.as_deref()
  }

  /// Overwrite the destination, returning the backup location.
  pub fn commit(self, text: &str) -> ReconcileResult<Option<PathBuf>> {
    match fs::write(&self.destination, text) {
      Ok(()) => Ok(self.backup),
      Err(source) => Err(ReconcileError::WriteFailure {
        path: self.destination,
        backup: self.backup,
        source,
      }),
    }
  }
}

fn copy_and_sync(source: &Path, destination: &Path) -> std::io::Result<()> {
  fs::copy(source, destination)?;
  File::open(destination)?.sync_all()
}
