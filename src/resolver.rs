//! Existence checks against the local asset tree.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::models::AssetPath;

/// Read-only view of the asset tree.
///
/// The filesystem implementation is [`FsAssetTree`]; tests swap in in-memory trees.
pub trait AssetTree {
  /// Returns `true` when a regular file exists at `path`.
  fn is_file(&self, path: &AssetPath) -> bool;

  /// Names of the regular files directly inside `directory` (relative to the root).
  fn list_files(&self, directory: &str) -> Vec<String>;
}

/// Asset tree backed by a directory on disk.
#[derive(Debug, Clone)]
pub struct FsAssetTree {
  root: PathBuf,
}

impl FsAssetTree {
  /// Create a tree rooted at `root`.
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  /// Root directory of the tree.
  pub fn root(&self) -> &Path {
    &self.root
  }
}

impl AssetTree for FsAssetTree {
  fn is_file(&self, path: &AssetPath) -> bool {
    path.to_fs_path(&self.root).is_file()
  }

  fn list_files(&self, directory: &str) -> Vec<String> {
    let dir = AssetPath::new(directory).to_fs_path(&self.root);
    let Ok(entries) = fs::read_dir(&dir) else {
      return Vec::new();
    };

    let mut names: Vec<String> = entries
      .flatten()
      .filter(|entry| entry.file_type().is_ok_and(|ft| ft.is_file()))
      .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
      .collect();
    names.sort();
    names
  }
}

/// Memoising existence checker used for the duration of one run.
///
/// The same asset is commonly referenced from several contexts (plain `src`, multiple
/// `srcset` entries and CSS), so each path and directory listing is looked up once.
pub struct ExistenceResolver<'a, T: AssetTree> {
  tree: &'a T,
  known: HashMap<AssetPath, bool>,
  listings: HashMap<String, Vec<String>>,
  lookups: usize,
}

impl<'a, T: AssetTree> ExistenceResolver<'a, T> {
  /// Create a resolver over `tree`.
  pub fn new(tree: &'a T) -> Self {
    Self {
      tree,
      known: HashMap::new(),
      listings: HashMap::new(),
      lookups: 0,
    }
  }

  /// Whether the asset exists, consulting the tree at most once per path.
  pub fn exists(&mut self, path: &AssetPath) -> bool {
    if let Some(&known) = self.known.get(path) {
      return known;
    }
    self.lookups += 1;
    let exists = self.tree.is_file(path);
    self.known.insert(path.clone(), exists);
    exists
  }

  /// Files directly inside `directory`, listed at most once per run.
  pub fn files_in(&mut self, directory: &str) -> &[String] {
    let tree = self.tree;
    self
      .listings
      .entry(directory.to_string())
      .or_insert_with(|| tree.list_files(directory))
      .as_slice()
  }

  /// Record that a file now exists, e.g. after it was fetched.
  pub fn mark_present(&mut self, path: &AssetPath) {
    self.known.insert(path.clone(), true);
    let directory = path.parent().to_string();
    if let Some(listing) = self.listings.get_mut(&directory) {
      let name = path.file_name().to_string();
      if let Err(index) = listing.binary_search(&name) {
        listing.insert(index, name);
      }
    }
  }

  /// Number of uncached existence checks performed so far.
  pub fn lookups(&self) -> usize {
    self.lookups
  }
}

#[cfg(test)]
pub(crate) mod testing {
  use std::cell::Cell;
  use std::collections::BTreeSet;

  use super::*;

  /// In-memory tree counting how often it is queried.
  #[derive(Debug, Default)]
  pub struct MemoryTree {
    files: BTreeSet<String>,
    queries: Cell<usize>,
  }

  impl MemoryTree {
    pub fn with_files<I, S>(files: I) -> Self
    where
      I: IntoIterator<Item = S>,
      S: Into<String>,
    {
      Self {
        files: files.into_iter().map(Into::into).collect(),
        queries: Cell::new(0),
      }
    }

    pub fn queries(&self) -> usize {
      self.queries.get()
    }
  }

  impl AssetTree for MemoryTree {
    fn is_file(&self, path: &AssetPath) -> bool {
      self.queries.set(self.queries.get() + 1);
      self.files.contains(path.as_str())
    }

    fn list_files(&self, directory: &str) -> Vec<String> {
      self
        .files
        .iter()
        .filter_map(|file| {
          let (dir, name) = file.rsplit_once('/').unwrap_or(("", file.as_str()));
          (dir == directory).then(|| name.to_string())
        })
        .collect()
    }
  }
}

#[cfg(test)]
mod tests {
  use super::testing::MemoryTree;
  use super::*;
  use tempfile::tempdir;

  #[test]
  fn memoises_repeated_lookups() {
    let tree = MemoryTree::with_files(["media/a.png"]);
    let mut resolver = ExistenceResolver::new(&tree);
    let path = AssetPath::new("media/a.png");
    assert!(resolver.exists(&path));
    assert!(resolver.exists(&path));
    assert!(!resolver.exists(&AssetPath::new("media/b.png")));
    assert_eq!(tree.queries(), 2);
    assert_eq!(resolver.lookups(), 2);
  }

  #[test]
  fn mark_present_updates_cached_listing() {
    let tree = MemoryTree::with_files(["media/a.png"]);
    let mut resolver = ExistenceResolver::new(&tree);
    assert_eq!(resolver.files_in("media"), ["a.png".to_string()]);
    resolver.mark_present(&AssetPath::new("media/b.png"));
    assert!(resolver.exists(&AssetPath::new("media/b.png")));
    assert_eq!(resolver.files_in("media"), [
      "a.png".to_string(),
      "b.png".to_string()
    ]);
  }

  #[test]
  fn filesystem_tree_checks_regular_files() -> std::io::Result<()> {
    let temp = tempdir()?;
    let root = temp.path();
    fs::create_dir_all(root.join("media/2024/10"))?;
    fs::write(root.join("media/2024/10/photo.png"), b"png")?;
    fs::create_dir_all(root.join("media/2024/10/nested"))?;

    let tree = FsAssetTree::new(root);
    assert!(tree.is_file(&AssetPath::new("media/2024/10/photo.png")));
    assert!(!tree.is_file(&AssetPath::new("media/2024/10/nested")));
    assert!(!tree.is_file(&AssetPath::new("media/2024/10/missing.png")));
    assert_eq!(tree.list_files("media/2024/10"), vec!["photo.png".to_string()]);
    assert!(tree.list_files("does/not/exist").is_empty());
    Ok(())
  }
}
