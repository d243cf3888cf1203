//! Resolved project layout handed to every pipeline stage.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::config::{ProjectConfig, UnresolvedPolicy};
use crate::fallback::FamilyPattern;
use crate::fetch::MirrorConfig;
use crate::repair::RepairRule;
use crate::variants::VariantRequest;

/// Owned description of where things live and how the run behaves.
///
/// Built once from [`ProjectConfig`]; every path is already joined onto the project
/// root so no stage depends on the current working directory.
#[derive(Debug, Clone)]
pub struct SiteLayout {
  /// Project root the configuration was resolved against.
  pub root: PathBuf,
  /// Primary HTML document.
  pub document_path: PathBuf,
  /// Root of the local asset tree.
  pub asset_root: PathBuf,
  /// Directories walked for stylesheets.
  pub stylesheet_dirs: Vec<PathBuf>,
  /// Prefixes marking a locator as local.
  pub local_prefixes: Vec<String>,
  /// Lowercase media extensions.
  pub media_extensions: BTreeSet<String>,
  /// Target width of the closest-variant fallback.
  pub default_target_width: u32,
  /// Compiled numbered families.
  pub families: Vec<FamilyPattern>,
  /// Handling of references without a fallback.
  pub unresolved: UnresolvedPolicy,
  /// Replacement locator for the placeholder policy.
  pub placeholder: String,
  /// Whether backups are written before rewriting.
  pub backup: bool,
  /// Optional JSON report destination.
  pub report_path: Option<PathBuf>,
  /// Compiled repair table.
  pub repairs: Vec<RepairRule>,
  /// Remote mirror settings.
  pub mirror: Option<MirrorConfig>,
  /// Resize requests.
  pub variants: Vec<VariantRequest>,
}

impl SiteLayout {
  /// Resolve a configuration against `root`.
  pub fn from_config(root: &Path, config: ProjectConfig) -> Self {
    let families = config
      .families
      .iter()
      .filter_map(|family| {
        let compiled = FamilyPattern::compile(family);
        if compiled.is_none() {
          tracing::warn!(
            "ignoring family {}/{}: stem needs exactly one {{n}} placeholder",
            family.directory,
            family.stem
          );
        }
        compiled
      })
      .collect();

    let repairs = config
      .repairs
      .iter()
      .filter_map(|rule| match RepairRule::compile(rule) {
        Ok(compiled) => Some(compiled),
        Err(err) => {
          tracing::warn!("skipping repair rule `{}`: {err}", rule.name);
          None
        }
      })
      .collect();

    let placeholder = if config.placeholder.contains(['"', '\'']) {
      tracing::warn!("placeholder must not contain quotes; using `#`");
      "#".to_string()
    } else {
      config.placeholder
    };

    Self {
      root: root.to_path_buf(),
      document_path: root.join(&config.document),
      asset_root: root.join(&config.asset_root),
      stylesheet_dirs: config
        .stylesheet_dirs
        .iter()
        .map(|dir| root.join(dir))
        .collect(),
      local_prefixes: config.local_prefixes,
      media_extensions: config
        .media_extensions
        .iter()
        .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
        .collect(),
      default_target_width: config.default_target_width,
      families,
      unresolved: config.unresolved,
      placeholder,
      backup: config.backup,
      report_path: config.report_path.map(|path| root.join(path)),
      repairs,
      mirror: config.mirror,
      variants: config.variants,
    }
  }

  /// Directory of `file` relative to the asset root, using forward slashes.
  ///
  /// Files outside the asset root resolve their references as if they lived at its top.
  pub fn base_dir_for(&self, file: &Path) -> String {
    let Some(parent) = file.parent() else {
      return String::new();
    };
    let relative = match parent.strip_prefix(&self.asset_root) {
      Ok(path) => path,
      Err(_) => return String::new(),
    };
    relative
      .components()
      .filter_map(|component| match component {
        std::path::Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
        _ => None,
      })
      .collect::<Vec<_>>()
      .join("/")
  }

  /// Whether `extension` counts as media.
  pub fn is_media_extension(&self, extension: &str) -> bool {
    self.media_extensions.contains(extension)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn layout() -> SiteLayout {
    ProjectConfig::default().into_layout(Path::new("/site"))
  }

  #[test]
  fn joins_paths_onto_root() {
    let layout = layout();
    assert_eq!(layout.document_path, PathBuf::from("/site/index.html"));
    assert_eq!(layout.stylesheet_dirs, vec![PathBuf::from("/site/assets")]);
  }

  #[test]
  fn base_dir_is_relative_to_asset_root() {
    let layout = layout();
    assert_eq!(layout.base_dir_for(Path::new("/site/index.html")), "");
    assert_eq!(
      layout.base_dir_for(Path::new("/site/assets/media/elementor/css/post-16.css")),
      "assets/media/elementor/css"
    );
  }

  #[test]
  fn quoted_placeholders_are_rejected() {
    let config = ProjectConfig {
      placeholder: "\"broken".into(),
      ..ProjectConfig::default()
    };
    let layout = config.into_layout(Path::new("/site"));
    assert_eq!(layout.placeholder, "#");
  }

  #[test]
  fn media_extensions_are_normalised() {
    let config = ProjectConfig {
      media_extensions: vec![".PNG".into(), "webp".into()],
      ..ProjectConfig::default()
    };
    let layout = config.into_layout(Path::new("/site"));
    assert!(layout.is_media_extension("png"));
    assert!(layout.is_media_extension("webp"));
    assert!(!layout.is_media_extension("jpg"));
  }
}
