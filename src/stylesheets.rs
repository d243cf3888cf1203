//! Stylesheet discovery under the configured directories.

use std::path::{Path, PathBuf};

use same_file::is_same_file;
use walkdir::WalkDir;

use crate::rewrite::is_backup_file;

/// Collect every `.css` file below `dirs`, sorted and without duplicates.
///
/// Overlapping directories and symlinked copies yield each file once. Backups written by
/// earlier runs are skipped. Entries that cannot be read are logged and ignored.
pub fn discover_stylesheets(dirs: &[PathBuf]) -> Vec<PathBuf> {
  let mut found: Vec<PathBuf> = Vec::new();

  for dir in dirs {
    if !dir.is_dir() {
      tracing::debug!("stylesheet directory {} does not exist", dir.display());
      continue;
    }

    for entry in WalkDir::new(dir).follow_links(true).sort_by_file_name() {
      let entry = match entry {
        Ok(entry) => entry,
        Err(err) => {
          tracing::warn!("cannot walk {}: {err}", dir.display());
          continue;
        }
      };
      let path = entry.path();
      if !entry.file_type().is_file() || !is_stylesheet(path) || is_backup_file(path) {
        continue;
      }
      if found.iter().any(|known| is_same_file(known, path).unwrap_or(false)) {
        continue;
      }
      found.push(path.to_path_buf());
    }
  }

  found.sort();
  found
}

fn is_stylesheet(path: &Path) -> bool {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .is_some_and(|ext| ext.eq_ignore_ascii_case("css"))
}
