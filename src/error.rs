//! Fatal error taxonomy for a reconciliation run.
//!
//! Anything that concerns a single asset is collected into the report instead; only
//! document-level I/O may abort a run.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort a run.
#[derive(Debug, Error)]
pub enum ReconcileError {
  /// The primary document could not be read or is not valid UTF-8.
  #[error("failed to read input document {}", .path.display())]
  InputUnreadable {
    /// Path that caused the error.
    path: PathBuf,
    /// Source I/O error.
    #[source]
    source: std::io::Error,
  },
  /// The backup copy could not be written, so the document was left untouched.
  #[error("failed to write backup {}", .path.display())]
  BackupFailure {
    /// Backup path that could not be written.
    path: PathBuf,
    /// Source I/O error.
    #[source]
    source: std::io::Error,
  },
  /// The rewritten document could not be written.
  #[error("failed to write {} (backup kept at {})", .path.display(), backup_display(.backup))]
  WriteFailure {
    /// Destination that could not be written.
    path: PathBuf,
    /// Backup written before the failed write, if backups are enabled.
    backup: Option<PathBuf>,
    /// Source I/O error.
    #[source]
    source: std::io::Error,
  },
  /// An explicitly requested configuration file is unreadable or malformed.
  #[error("invalid configuration file {}: {message}", .path.display())]
  ConfigInvalid {
    /// Configuration path.
    path: PathBuf,
    /// Parser or I/O message.
    message: String,
  },
}

fn backup_display(backup: &Option<PathBuf>) -> String {
  backup
    .as_ref()
    .map(|path| path.display().to_string())
    .unwrap_or_else(|| "<none>".to_string())
}

/// Result alias used by the pipeline.
pub type ReconcileResult<T> = Result<T, ReconcileError>;
