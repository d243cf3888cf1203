//! Reconciliation orchestrator: repair, extract, resolve, fetch, map and rewrite.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use same_file::is_same_file;

use crate::asset_paths::{LocatorError, normalize_locator, repoint_locator};
use crate::config::UnresolvedPolicy;
use crate::error::{ReconcileError, ReconcileResult};
use crate::fallback::FallbackMapper;
use crate::fetch::{AssetFetcher, HttpFetcher, fetch_into};
use crate::models::{
  AssetPath, DocumentKind, ReferenceContext, ResolutionResult, ResourceReference, TextSpan,
};
use crate::project::SiteLayout;
use crate::references::{ReferenceFilter, extract_references, split_srcset};
use crate::repair::apply_repairs;
use crate::report::{AssetIssue, DocumentSummary, FallbackRecord, ReconcileReport};
use crate::resolver::{AssetTree, ExistenceResolver, FsAssetTree};
use crate::rewrite::{GuardedWrite, RewritePlan, backup_stamp};
use crate::stylesheets::discover_stylesheets;

/// Document loaded and repaired, with its references resolved to asset paths.
struct PreparedDocument {
  path: PathBuf,
  kind: DocumentKind,
  original: String,
  repaired: String,
  references: Vec<LocatedReference>,
}

struct LocatedReference {
  reference: ResourceReference,
  /// `None` when the locator climbs above the asset root.
  asset: Option<AssetPath>,
}

/// What happens to one reference in the rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Action {
  Keep,
  Replace(String),
  Drop,
}

/// Runs the reconciliation pipeline for one project layout.
pub struct Reconciler<'a> {
  layout: &'a SiteLayout,
  dry_run: bool,
  fetcher: Option<&'a dyn AssetFetcher>,
}

impl<'a> Reconciler<'a> {
  /// Create a reconciler for `layout`.
  pub fn new(layout: &'a SiteLayout) -> Self {
    Self {
      layout,
      dry_run: false,
      fetcher: None,
    }
  }

  /// Compute the report without writing or fetching anything.
  pub fn dry_run(mut self, dry_run: bool) -> Self {
    self.dry_run = dry_run;
    self
  }

  /// Fetch missing assets through `fetcher` instead of the configured mirror.
  pub fn with_fetcher(mut self, fetcher: &'a dyn AssetFetcher) -> Self {
    self.fetcher = Some(fetcher);
    self
  }

  /// Run the pipeline over the primary document and every discovered stylesheet.
  ///
  /// Only document-level I/O aborts the run; every per-asset problem ends up in the
  /// returned report.
  pub fn run(&self) -> ReconcileResult<ReconcileReport> {
    let mut report = ReconcileReport {
      dry_run: self.dry_run,
      ..ReconcileReport::default()
    };

    let documents = self.load_documents(&mut report)?;

    let http;
    let fetcher: Option<&dyn AssetFetcher> = if self.dry_run {
      None
    } else if let Some(fetcher) = self.fetcher {
      Some(fetcher)
    } else if let Some(mirror) = &self.layout.mirror {
      match HttpFetcher::new(mirror) {
        Ok(client) => {
          http = client;
          Some(&http)
        }
        Err(err) => {
          tracing::warn!("mirror disabled: {err}");
          None
        }
      }
    } else {
      None
    };

    let tree = FsAssetTree::new(&self.layout.asset_root);
    let mut resolver = ExistenceResolver::new(&tree);
    let results = self.resolve_assets(&documents, &mut resolver, fetcher, &mut report);
    tracing::debug!("{} existence lookups", resolver.lookups());

    let stamp = backup_stamp();
    for document in &documents {
      let summary = self.rewrite_document(document, &results, &stamp, &mut report)?;
      report.documents.push(summary);
    }

    Ok(report)
  }

  fn load_documents(&self, report: &mut ReconcileReport) -> ReconcileResult<Vec<PreparedDocument>> {
    let primary = &self.layout.document_path;
    let text = fs::read_to_string(primary).map_err(|source| ReconcileError::InputUnreadable {
      path: primary.clone(),
      source,
    })?;

    let mut documents = vec![self.prepare(primary, text, report)];

    for stylesheet in discover_stylesheets(&self.layout.stylesheet_dirs) {
      if is_same_file(&stylesheet, primary).unwrap_or(false) {
        continue;
      }
      match fs::read_to_string(&stylesheet) {
        Ok(text) => documents.push(self.prepare(&stylesheet, text, report)),
        Err(err) => tracing::warn!("skipping stylesheet {}: {err}", stylesheet.display()),
      }
    }

    Ok(documents)
  }

  fn prepare(&self, path: &Path, original: String, report: &mut ReconcileReport) -> PreparedDocument {
    let kind = DocumentKind::from_path(path);
    let repaired = apply_repairs(&original, kind, &self.layout.repairs);
    report.record_repairs(&repaired.counts);

    let filter = ReferenceFilter::from_layout(self.layout);
    let base_dir = self.layout.base_dir_for(path);
    let references: Vec<LocatedReference> = extract_references(&repaired.text, kind, &filter)
      .into_iter()
      .filter_map(|reference| match normalize_locator(&reference.locator, &base_dir) {
        Ok(asset) => Some(LocatedReference {
          reference,
          asset: Some(asset),
        }),
        Err(LocatorError::OutsideRoot) => {
          report.issues.push(AssetIssue::OutsideAssetRoot {
            locator: reference.locator.clone(),
            document: path.to_path_buf(),
          });
          Some(LocatedReference {
            reference,
            asset: None,
          })
        }
        Err(LocatorError::Empty) => None,
      })
      .collect();

    tracing::debug!("{}: {} references", path.display(), references.len());
    report.references_found += references.len();

    PreparedDocument {
      path: path.to_path_buf(),
      kind,
      original,
      repaired: repaired.text,
      references,
    }
  }

  /// Resolve every distinct asset exactly once, fetching and mapping the missing ones.
  fn resolve_assets<T: AssetTree>(
    &self,
    documents: &[PreparedDocument],
    resolver: &mut ExistenceResolver<'_, T>,
    fetcher: Option<&dyn AssetFetcher>,
    report: &mut ReconcileReport,
  ) -> BTreeMap<AssetPath, ResolutionResult> {
    let mut first_seen: BTreeMap<&AssetPath, (&Path, ReferenceContext)> = BTreeMap::new();
    for document in documents {
      for located in &document.references {
        if let Some(asset) = &located.asset {
          first_seen
            .entry(asset)
            .or_insert((document.path.as_path(), located.reference.context));
        }
      }
    }

    let mut results = BTreeMap::new();
    let mut missing = Vec::new();
    for &asset in first_seen.keys() {
      if resolver.exists(asset) {
        tracing::debug!("present: {asset}");
        report.present.insert(asset.clone());
        results.insert(asset.clone(), ResolutionResult::Present);
      } else {
        missing.push(asset);
      }
    }

    if let Some(fetcher) = fetcher {
      let mut still_missing = Vec::new();
      for asset in missing {
        match fetch_into(fetcher, asset, &self.layout.asset_root) {
          Ok(_) => {
            resolver.mark_present(asset);
            report.fetched.insert(asset.clone());
            report.present.insert(asset.clone());
            results.insert(asset.clone(), ResolutionResult::Present);
          }
          Err(err) => {
            tracing::warn!("fetch of {asset} failed: {err}");
            report.issues.push(AssetIssue::NetworkFetchFailure {
              path: asset.clone(),
              reason: err.to_string(),
            });
            still_missing.push(asset);
          }
        }
      }
      missing = still_missing;
    }

    let mapper = FallbackMapper::new(self.layout.default_target_width, &self.layout.families);
    for asset in missing {
      match mapper.map(asset, resolver) {
        Some(substitute) => {
          tracing::debug!("fallback: {asset} -> {} ({:?})", substitute.target, substitute.rule);
          if !substitute.tied_with.is_empty() {
            tracing::debug!(
              "tie for {asset}: chose {} over {} candidate(s)",
              substitute.target,
              substitute.tied_with.len()
            );
            report.issues.push(AssetIssue::FallbackAmbiguous {
              path: asset.clone(),
              chosen: substitute.target.clone(),
              tied_with: substitute.tied_with,
            });
          }
          report.fallbacks.insert(asset.clone(), FallbackRecord {
            missing: asset.clone(),
            target: substitute.target.clone(),
            rule: substitute.rule,
          });
          results.insert(asset.clone(), ResolutionResult::MissingWithFallback {
            target: substitute.target,
            rule: substitute.rule,
          });
        }
        None => {
          tracing::debug!("missing without fallback: {asset}");
          let (document, context) = first_seen[asset];
          report.missing.insert(asset.clone());
          report.issues.push(AssetIssue::MissingNoFallback {
            path: asset.clone(),
            document: document.to_path_buf(),
            context,
          });
          results.insert(asset.clone(), ResolutionResult::MissingNoFallback);
        }
      }
    }

    results
  }

  fn action_for(
    &self,
    located: &LocatedReference,
    results: &BTreeMap<AssetPath, ResolutionResult>,
  ) -> Action {
    let result = located.asset.as_ref().and_then(|asset| results.get(asset));
    match result {
      Some(ResolutionResult::Present) => Action::Keep,
      Some(ResolutionResult::MissingWithFallback { target, .. }) => {
        Action::Replace(repoint_locator(&located.reference.locator, target.file_name()))
      }
      Some(ResolutionResult::MissingNoFallback) | None => match self.layout.unresolved {
        UnresolvedPolicy::Keep => Action::Keep,
        UnresolvedPolicy::Placeholder => Action::Drop,
      },
    }
  }

  /// Build the rewrite plan for one document.
  ///
  /// Plain references are edited in place. A `srcset` with a dropped entry is rebuilt as
  /// a whole from its surviving entries so no dangling separators remain.
  fn plan_rewrite(
    &self,
    document: &PreparedDocument,
    results: &BTreeMap<AssetPath, ResolutionResult>,
    report: &mut ReconcileReport,
  ) -> RewritePlan {
    let mut plan = RewritePlan::new();
    let mut srcsets: BTreeMap<TextSpan, Vec<(&ResourceReference, Action)>> = BTreeMap::new();

    for located in &document.references {
      let action = self.action_for(located, results);
      if let Some(slot) = located.reference.srcset {
        srcsets
          .entry(slot.attribute)
          .or_default()
          .push((&located.reference, action));
        continue;
      }
      match action {
        Action::Keep => {}
        Action::Replace(text) => push_edit(&mut plan, located.reference.span, text),
        Action::Drop => {
          report.placeholders += 1;
          push_edit(&mut plan, located.reference.span, self.layout.placeholder.clone());
        }
      }
    }

    for (attribute, entries) in srcsets {
      let dropped = entries
        .iter()
        .filter(|(_, action)| *action == Action::Drop)
        .count();
      if dropped > 0 {
        report.placeholders += dropped;
        let value = rebuild_srcset(&document.repaired, attribute, &entries);
        push_edit(&mut plan, attribute, value);
        continue;
      }
      for (reference, action) in entries {
        if let Action::Replace(text) = action {
          push_edit(&mut plan, reference.span, text);
        }
      }
    }

    plan
  }

  fn rewrite_document(
    &self,
    document: &PreparedDocument,
    results: &BTreeMap<AssetPath, ResolutionResult>,
    stamp: &str,
    report: &mut ReconcileReport,
  ) -> ReconcileResult<DocumentSummary> {
    let plan = self.plan_rewrite(document, results, report);
    let output = match plan.apply(&document.repaired) {
      Ok(output) => output,
      Err(err) => {
        tracing::warn!("leaving {} unchanged: {err}", document.path.display());
        document.original.clone()
      }
    };

    let changed = output != document.original;
    let mut summary = DocumentSummary {
      path: document.path.clone(),
      kind: document.kind,
      references: document.references.len(),
      edits: plan.len(),
      changed,
      written: false,
      backup: None,
    };

    if changed && !self.dry_run {
      let guard = GuardedWrite::acquire(&document.path, self.layout.backup, stamp)?;
      summary.backup = guard.commit(&output)?;
      summary.written = true;
      tracing::info!("rewrote {} ({} edits)", document.path.display(), plan.len());
    }

    Ok(summary)
  }
}

fn push_edit(plan: &mut RewritePlan, span: TextSpan, replacement: String) {
  if let Err(err) = plan.push(span, replacement) {
    tracing::warn!("skipping edit: {err}");
  }
}

/// Surviving entries of a `srcset` value joined with `", "`, replacements applied.
fn rebuild_srcset(
  text: &str,
  attribute: TextSpan,
  entries: &[(&ResourceReference, Action)],
) -> String {
  split_srcset(attribute.slice(text))
    .into_iter()
    .filter_map(|entry| {
      let whole = entry.entry.offset(attribute.start);
      let url = entry.url.offset(attribute.start);
      let action = entries
        .iter()
        .find(|(reference, _)| reference.span == url)
        .map(|(_, action)| action);
      match action {
        Some(Action::Drop) => None,
        Some(Action::Replace(locator)) => Some(format!(
          "{}{}{}",
          &text[whole.start..url.start],
          locator,
          &text[url.end..whole.end]
        )),
        _ => Some(whole.slice(text).to_string()),
      }
    })
    .collect::<Vec<_>>()
    .join(", ")
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::{FamilyConfig, ProjectConfig};
  use crate::fetch::testing::FakeFetcher;
  use tempfile::{TempDir, tempdir};

  fn site(files: &[(&str, &str)]) -> std::io::Result<TempDir> {
    let temp = tempdir()?;
    for (path, content) in files {
      let path = temp.path().join(path);
      fs::create_dir_all(path.parent().unwrap())?;
      fs::write(path, content)?;
    }
    Ok(temp)
  }

  fn layout(root: &Path) -> SiteLayout {
    ProjectConfig::default().into_layout(root)
  }

  fn backups(dir: &Path) -> usize {
    fs::read_dir(dir)
      .unwrap()
      .flatten()
      .filter(|entry| entry.file_name().to_string_lossy().contains(".backup-"))
      .count()
  }

  #[test]
  fn sized_variant_is_repointed_to_its_original() -> Result<(), Box<dyn std::error::Error>> {
    let html = r#"<p class="x"><img alt="a"  src="./media/2024/10/photo-300x74.png?ver=2" width="300"></p>"#;
    let temp = site(&[("index.html", html), ("media/2024/10/photo.png", "png")])?;
    let layout = layout(temp.path());

    let report = Reconciler::new(&layout).run()?;

    let output = fs::read_to_string(temp.path().join("index.html"))?;
    assert_eq!(
      output,
      r#"<p class="x"><img alt="a"  src="./media/2024/10/photo.png?ver=2" width="300"></p>"#
    );
    assert_eq!(report.fallbacks.len(), 1);
    let backup = report.documents[0].backup.clone().unwrap();
    assert_eq!(fs::read_to_string(backup)?, html);
    Ok(())
  }

  #[test]
  fn missing_srcset_entry_without_fallback_is_kept_and_reported() -> Result<(), Box<dyn std::error::Error>> {
    let html = r#"<img srcset="./media/x-200x300.jpg 200w, ./media/x-768x1152.jpg 768w">"#;
    let temp = site(&[("index.html", html), ("media/x-768x1152.jpg", "jpg")])?;
    let layout = layout(temp.path());

    let report = Reconciler::new(&layout).run()?;

    assert_eq!(fs::read_to_string(temp.path().join("index.html"))?, html);
    assert!(report.missing.contains(&AssetPath::new("media/x-200x300.jpg")));
    assert!(report.present.contains(&AssetPath::new("media/x-768x1152.jpg")));
    assert!(report.fallbacks.is_empty());
    assert!(!report.documents[0].changed);
    assert_eq!(backups(temp.path()), 0);
    Ok(())
  }

  #[test]
  fn stylesheet_without_fallback_stays_byte_identical() -> Result<(), Box<dyn std::error::Error>> {
    let css = ".hero {\n  background: url(\"../../other/assets/photo.jpg\") no-repeat;\n}\n";
    let temp = site(&[("index.html", "<html></html>"), ("assets/css/site.css", css)])?;
    let layout = layout(temp.path());

    let report = Reconciler::new(&layout).run()?;

    assert_eq!(fs::read_to_string(temp.path().join("assets/css/site.css"))?, css);
    assert_eq!(report.documents.len(), 2);
    assert!(report.issues.iter().any(|issue| matches!(
      issue,
      AssetIssue::MissingNoFallback { path, context: ReferenceContext::CssUrl, .. }
        if path.as_str() == "other/assets/photo.jpg"
    )));
    Ok(())
  }

  #[test]
  fn second_run_changes_nothing() -> Result<(), Box<dyn std::error::Error>> {
    let html = r#"<img src="./media/a-300x200.png" srcset="./media/b.jpg 1x, ./media/a-300x200.png 2x"><div style="background:url('./media/b.jpg')"></div>"#;
    let temp = site(&[
      ("index.html", html),
      ("media/a.png", "png"),
      ("media/b-683x1024.jpg", "jpg"),
      ("media/b-1536x2304.jpg", "jpg"),
    ])?;
    let layout = layout(temp.path());

    let first = Reconciler::new(&layout).run()?;
    let after_first = fs::read_to_string(temp.path().join("index.html"))?;
    assert!(first.documents[0].written);
    assert!(after_first.contains(r#"src="./media/a.png""#));
    assert!(after_first.contains("url('./media/b-683x1024.jpg')"));

    let second = Reconciler::new(&layout).run()?;
    assert_eq!(fs::read_to_string(temp.path().join("index.html"))?, after_first);
    assert!(!second.documents[0].changed);
    assert!(second.fallbacks.is_empty());
    assert_eq!(backups(temp.path()), 1);
    Ok(())
  }

  #[test]
  fn every_fallback_target_exists() -> Result<(), Box<dyn std::error::Error>> {
    let html = r#"<img src="./m/photo-36-300x200.jpg"><img src="./m/x.jpg"><img src="./m/y-10x10.png">"#;
    let temp = site(&[
      ("index.html", html),
      ("m/photo-37-300x200.jpg", "jpg"),
      ("m/x-668x1000.jpg", "jpg"),
      ("m/x-868x1300.jpg", "jpg"),
    ])?;
    let config = ProjectConfig {
      families: vec![FamilyConfig {
        directory: "m".into(),
        stem: "photo-{n}".into(),
      }],
      ..ProjectConfig::default()
    };
    let layout = config.into_layout(temp.path());

    let report = Reconciler::new(&layout).run()?;

    assert_eq!(report.fallbacks.len(), 2);
    for record in report.fallbacks.values() {
      assert!(record.target.to_fs_path(temp.path()).is_file());
      assert_eq!(record.target.parent(), record.missing.parent());
    }
    assert_eq!(report.ambiguous(), 1);
    assert!(report.missing.contains(&AssetPath::new("m/y-10x10.png")));
    Ok(())
  }

  #[test]
  fn placeholder_policy_drops_unresolved_references() -> Result<(), Box<dyn std::error::Error>> {
    let html = r#"<img src="./m/gone.png" srcset="./m/gone-1x1.png 1x, ./m/ok.png 2x, ./m/a-5x5.png 3x">"#;
    let temp = site(&[("index.html", html), ("m/ok.png", "png"), ("m/a.png", "png")])?;
    let config = ProjectConfig {
      unresolved: UnresolvedPolicy::Placeholder,
      ..ProjectConfig::default()
    };
    let layout = config.into_layout(temp.path());

    let report = Reconciler::new(&layout).run()?;

    assert_eq!(
      fs::read_to_string(temp.path().join("index.html"))?,
      r##"<img src="#" srcset="./m/ok.png 2x, ./m/a.png 3x">"##
    );
    assert_eq!(report.placeholders, 2);

    Reconciler::new(&layout).run()?;
    assert_eq!(backups(temp.path()), 1);
    Ok(())
  }

  #[test]
  fn dry_run_writes_nothing() -> Result<(), Box<dyn std::error::Error>> {
    let html = r#"<img src="./m/p-300x74.png">"#;
    let temp = site(&[("index.html", html), ("m/p.png", "png")])?;
    let layout = layout(temp.path());

    let report = Reconciler::new(&layout).dry_run(true).run()?;

    assert!(report.dry_run);
    assert!(report.documents[0].changed);
    assert!(!report.documents[0].written);
    assert_eq!(fs::read_to_string(temp.path().join("index.html"))?, html);
    assert_eq!(backups(temp.path()), 0);
    Ok(())
  }

  #[test]
  fn fetched_assets_win_over_fallbacks_and_failures_continue() -> Result<(), Box<dyn std::error::Error>> {
    let html = r#"<img src="./m/p-300x74.png"><img src="./m/q.png">"#;
    let temp = site(&[("index.html", html), ("m/p.png", "png")])?;
    let layout = layout(temp.path());
    let fetcher = FakeFetcher::serving([("m/p-300x74.png", b"sized".as_slice())]);

    let report = Reconciler::new(&layout).with_fetcher(&fetcher).run()?;

    assert_eq!(fs::read(temp.path().join("m/p-300x74.png"))?, b"sized");
    assert!(report.fetched.contains(&AssetPath::new("m/p-300x74.png")));
    assert_eq!(report.fetch_failures(), 1);
    assert!(report.missing.contains(&AssetPath::new("m/q.png")));
    assert_eq!(fs::read_to_string(temp.path().join("index.html"))?, html);
    assert_eq!(fetcher.requests.borrow().len(), 2);
    Ok(())
  }

  #[test]
  fn dry_run_never_fetches() -> Result<(), Box<dyn std::error::Error>> {
    let temp = site(&[("index.html", r#"<img src="./m/q.png">"#)])?;
    let layout = layout(temp.path());
    let fetcher = FakeFetcher::default();

    Reconciler::new(&layout).dry_run(true).with_fetcher(&fetcher).run()?;
    assert!(fetcher.requests.borrow().is_empty());
    Ok(())
  }

  #[test]
  fn unreadable_primary_document_is_fatal() {
    let temp = tempdir().unwrap();
    let layout = layout(temp.path());
    let err = Reconciler::new(&layout).run().unwrap_err();
    assert!(matches!(err, ReconcileError::InputUnreadable { .. }));
  }

  #[test]
  fn locators_above_the_asset_root_are_reported() -> Result<(), Box<dyn std::error::Error>> {
    let html = r#"<img src="../../outside.png">"#;
    let temp = site(&[("index.html", html)])?;
    let layout = layout(temp.path());

    let report = Reconciler::new(&layout).run()?;
    assert_eq!(report.outside_root(), 1);
    assert_eq!(report.unique_assets(), 0);
    assert_eq!(fs::read_to_string(temp.path().join("index.html"))?, html);
    Ok(())
  }

  #[test]
  fn repairs_run_before_extraction() -> Result<(), Box<dyn std::error::Error>> {
    let html = r#"<img srcset="./wp-content/uploads/a.png 1x, ./wp-content/uploads/">"#;
    let temp = site(&[("index.html", html), ("wp-content/uploads/a.png", "png")])?;
    let layout = layout(temp.path());

    let report = Reconciler::new(&layout).run()?;

    assert_eq!(
      fs::read_to_string(temp.path().join("index.html"))?,
      r#"<img srcset="./wp-content/uploads/a.png 1x">"#
    );
    assert_eq!(report.repairs["dangling-srcset-entry"], 1);
    assert_eq!(report.references_found, 1);
    Ok(())
  }
}
