//! Project configuration loader describing the exported site and reconciliation policy.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ReconcileError, ReconcileResult};
use crate::fetch::MirrorConfig;
use crate::project::SiteLayout;
use crate::repair::{RepairRuleConfig, default_repair_rules};
use crate::variants::VariantRequest;

/// File name searched for in the project root.
pub const DEFAULT_CONFIG_FILE: &str = "reconcile.config.json";

/// What to do with references that stay missing after fallback mapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnresolvedPolicy {
  /// Leave the reference untouched and report it.
  #[default]
  Keep,
  /// Replace the locator with the placeholder and drop missing `srcset` entries.
  Placeholder,
}

/// Explicitly enumerated family of sequentially numbered assets.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FamilyConfig {
  /// Directory of the family relative to the asset root.
  pub directory: String,
  /// Base name with a `{n}` placeholder standing for the index, e.g. `photo-{n}`.
  pub stem: String,
}

/// Discoverable project configuration describing the site layout and policies.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProjectConfig {
  /// Primary HTML document relative to the project root.
  pub document: String,
  /// Directory asset paths are resolved against, relative to the project root.
  pub asset_root: String,
  /// Directories walked for stylesheets, relative to the project root.
  pub stylesheet_dirs: Vec<String>,
  /// Prefixes that mark a locator as pointing into the local asset tree.
  pub local_prefixes: Vec<String>,
  /// Extensions that count as media for `src` and `href` attributes.
  pub media_extensions: Vec<String>,
  /// Width the closest-variant fallback aims for.
  pub default_target_width: u32,
  /// Numbered families eligible for sibling fallback.
  pub families: Vec<FamilyConfig>,
  /// Handling of references without a fallback.
  pub unresolved: UnresolvedPolicy,
  /// Replacement locator used by [`UnresolvedPolicy::Placeholder`].
  pub placeholder: String,
  /// Write a timestamped backup before rewriting a file.
  pub backup: bool,
  /// Optional JSON report destination relative to the project root.
  pub report_path: Option<String>,
  /// Canonical path-repair table applied once per document.
  pub repairs: Vec<RepairRuleConfig>,
  /// Remote mirror used to fetch missing assets.
  pub mirror: Option<MirrorConfig>,
  /// Resize requests for the `variants` command.
  pub variants: Vec<VariantRequest>,
}

impl Default for ProjectConfig {
  fn default() -> Self {
    Self {
      document: "index.html".into(),
      asset_root: ".".into(),
      stylesheet_dirs: vec!["assets".into()],
      local_prefixes: [
        "./",
        "../",
        "/",
        "assets/",
        "core/",
        "wp-content/",
        "wp-includes/",
      ]
      .into_iter()
      .map(String::from)
      .collect(),
      media_extensions: [
        "png", "jpg", "jpeg", "gif", "webp", "avif", "svg", "ico", "bmp", "mp4", "webm", "ogg",
        "mp3", "woff", "woff2", "ttf", "otf", "eot",
      ]
      .into_iter()
      .map(String::from)
      .collect(),
      default_target_width: 768,
      families: Vec::new(),
      unresolved: UnresolvedPolicy::Keep,
      placeholder: "#".into(),
      backup: true,
      report_path: None,
      repairs: default_repair_rules(),
      mirror: None,
      variants: Vec::new(),
    }
  }
}

impl ProjectConfig {
  /// Load configuration from the provided directory.
  ///
  /// A missing file yields the defaults. A file that fails to parse is reported and the
  /// defaults are used so the run can still proceed.
  pub fn discover(root: &Path) -> Self {
    let candidate = root.join(DEFAULT_CONFIG_FILE);
    if !candidate.exists() {
      return Self::default();
    }

    match Self::from_path(&candidate) {
      Ok(config) => config,
      Err(err) => {
        tracing::warn!("{err}; falling back to defaults");
        Self::default()
      }
    }
  }

  /// Read configuration from a specific JSON file.
  pub fn from_path(path: &Path) -> ReconcileResult<Self> {
    let content = fs::read_to_string(path).map_err(|err| ReconcileError::ConfigInvalid {
      path: path.to_path_buf(),
      message: err.to_string(),
    })?;
    serde_json::from_str(&content).map_err(|err| ReconcileError::ConfigInvalid {
      path: path.to_path_buf(),
      message: err.to_string(),
    })
  }

  /// Resolve the configuration against a project root.
  pub fn into_layout(self, root: &Path) -> SiteLayout {
    SiteLayout::from_config(root, self)
  }

  /// Path of the primary document.
  pub fn document_path(&self, root: &Path) -> PathBuf {
    root.join(&self.document)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tempfile::tempdir;

  #[test]
  fn defaults_apply_without_config_file() {
    let dir = tempdir().unwrap();
    let config = ProjectConfig::discover(dir.path());
    assert_eq!(config.document, "index.html");
    assert_eq!(config.default_target_width, 768);
    assert!(config.backup);
    assert!(config.families.is_empty());
    assert!(!config.repairs.is_empty());
  }

  #[test]
  fn partial_file_overrides_only_named_fields() {
    let dir = tempdir().unwrap();
    fs::write(
      dir.path().join(DEFAULT_CONFIG_FILE),
      r#"{
        "document": "home.html",
        "default_target_width": 300,
        "unresolved": "placeholder",
        "families": [{ "directory": "media/2024/10", "stem": "photo-{n}" }]
      }"#,
    )
    .unwrap();

    let config = ProjectConfig::discover(dir.path());
    assert_eq!(config.document, "home.html");
    assert_eq!(config.default_target_width, 300);
    assert_eq!(config.unresolved, UnresolvedPolicy::Placeholder);
    assert_eq!(config.families.len(), 1);
    assert_eq!(config.placeholder, "#");
    assert!(config.local_prefixes.contains(&"./".to_string()));
  }

  #[test]
  fn malformed_discovered_file_falls_back_to_defaults() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join(DEFAULT_CONFIG_FILE), "{ not json").unwrap();
    let config = ProjectConfig::discover(dir.path());
    assert_eq!(config.document, "index.html");
  }

  #[test]
  fn explicit_malformed_file_is_an_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("custom.json");
    fs::write(&path, "[1, 2").unwrap();
    let err = ProjectConfig::from_path(&path).unwrap_err();
    assert!(matches!(err, ReconcileError::ConfigInvalid { .. }));
  }
}
