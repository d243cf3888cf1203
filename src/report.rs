//! End-of-run report collecting every per-asset outcome.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::models::{AssetPath, DocumentKind, FallbackRule, ReferenceContext};

const EXAMPLES_PER_CATEGORY: usize = 5;

/// Problem concerning a single asset. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum AssetIssue {
  /// The asset is missing and no fallback rule applied.
  MissingNoFallback {
    /// Missing asset.
    path: AssetPath,
    /// Document containing the first reference to it.
    document: PathBuf,
    /// Context of that reference.
    context: ReferenceContext,
  },
  /// Several candidates ranked equally; the larger width was chosen.
  FallbackAmbiguous {
    /// Missing asset.
    path: AssetPath,
    /// Chosen substitute.
    chosen: AssetPath,
    /// Candidates that lost the tie-break.
    tied_with: Vec<AssetPath>,
  },
  /// Downloading the asset from the mirror failed.
  NetworkFetchFailure {
    /// Missing asset.
    path: AssetPath,
    /// Failure description.
    reason: String,
  },
  /// The locator points above the asset root.
  OutsideAssetRoot {
    /// Locator as written.
    locator: String,
    /// Document containing it.
    document: PathBuf,
  },
}

/// Applied substitution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FallbackRecord {
  /// Missing asset.
  pub missing: AssetPath,
  /// Existing asset that replaced it.
  pub target: AssetPath,
  /// Rule that chose the target.
  pub rule: FallbackRule,
}

/// Per-document outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentSummary {
  /// Document path.
  pub path: PathBuf,
  /// Document kind.
  pub kind: DocumentKind,
  /// References extracted after repairs.
  pub references: usize,
  /// Edits in the rewrite plan.
  pub edits: usize,
  /// Whether the output differs from the input.
  pub changed: bool,
  /// Whether the output was written to disk.
  pub written: bool,
  /// Backup taken before writing.
  pub backup: Option<PathBuf>,
}

/// Summary of one reconciliation run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
  /// Nothing was written or fetched.
  pub dry_run: bool,
  /// Processed documents in processing order.
  pub documents: Vec<DocumentSummary>,
  /// Total references across all documents.
  pub references_found: usize,
  /// Assets found on disk, including fetched ones.
  pub present: BTreeSet<AssetPath>,
  /// Assets left missing without a substitute.
  pub missing: BTreeSet<AssetPath>,
  /// Substitutions, one per missing asset.
  pub fallbacks: BTreeMap<AssetPath, FallbackRecord>,
  /// Assets downloaded from the mirror.
  pub fetched: BTreeSet<AssetPath>,
  /// References replaced with the placeholder or dropped from a `srcset`.
  pub placeholders: usize,
  /// Matches rewritten per repair rule.
  pub repairs: BTreeMap<String, usize>,
  /// Per-asset problems.
  pub issues: Vec<AssetIssue>,
}

impl ReconcileReport {
  /// Distinct asset paths seen in the run.
  pub fn unique_assets(&self) -> usize {
    self.present.len() + self.missing.len() + self.fallbacks.len()
  }

  /// Number of failed downloads.
  pub fn fetch_failures(&self) -> usize {
    self.count_issues(|issue| matches!(issue, AssetIssue::NetworkFetchFailure { .. }))
  }

  /// Number of tie-breaks.
  pub fn ambiguous(&self) -> usize {
    self.count_issues(|issue| matches!(issue, AssetIssue::FallbackAmbiguous { .. }))
  }

  /// Number of locators pointing above the asset root.
  pub fn outside_root(&self) -> usize {
    self.count_issues(|issue| matches!(issue, AssetIssue::OutsideAssetRoot { .. }))
  }

  fn count_issues(&self, predicate: impl Fn(&AssetIssue) -> bool) -> usize {
    self.issues.iter().filter(|issue| predicate(issue)).count()
  }

  /// Add repair counts of one document.
  pub fn record_repairs(&mut self, counts: &BTreeMap<String, usize>) {
    for (name, count) in counts {
      *self.repairs.entry(name.clone()).or_insert(0) += count;
    }
  }

  /// Human readable summary ending with the present/missing/fallback totals.
  pub fn render_summary(&self) -> String {
    let mut out = String::new();
    if self.dry_run {
      out.push_str("dry run: no files were written or fetched\n");
    }

    let _ = writeln!(
      out,
      "documents: {} ({} changed)",
      self.documents.len(),
      self.documents.iter().filter(|doc| doc.changed).count()
    );
    for doc in self.documents.iter().filter(|doc| doc.written) {
      match &doc.backup {
        Some(backup) => {
          let _ = writeln!(out, "  rewrote {} (backup {})", doc.path.display(), backup.display());
        }
        None => {
          let _ = writeln!(out, "  rewrote {}", doc.path.display());
        }
      }
    }
    let _ = writeln!(
      out,
      "references: {} ({} unique assets)",
      self.references_found,
      self.unique_assets()
    );

    for (name, count) in &self.repairs {
      let _ = writeln!(out, "repair {name}: {count}");
    }

    section(&mut out, "present", self.present.iter().map(ToString::to_string));
    section(
      &mut out,
      "fallback",
      self
        .fallbacks
        .values()
        .map(|record| format!("{} -> {} ({:?})", record.missing, record.target, record.rule)),
    );
    section(&mut out, "missing", self.missing.iter().map(ToString::to_string));
    section(&mut out, "fetched", self.fetched.iter().map(ToString::to_string));
    section(
      &mut out,
      "fetch failed",
      self.issues.iter().filter_map(|issue| match issue {
        AssetIssue::NetworkFetchFailure { path, reason } => Some(format!("{path}: {reason}")),
        _ => None,
      }),
    );
    section(
      &mut out,
      "ambiguous",
      self.issues.iter().filter_map(|issue| match issue {
        AssetIssue::FallbackAmbiguous {
          path,
          chosen,
          tied_with,
        } => Some(format!("{path} -> {chosen} (tied with {})", join(tied_with))),
        _ => None,
      }),
    );
    section(
      &mut out,
      "outside asset root",
      self.issues.iter().filter_map(|issue| match issue {
        AssetIssue::OutsideAssetRoot { locator, document } => {
          Some(format!("{locator} in {}", document.display()))
        }
        _ => None,
      }),
    );
    if self.placeholders > 0 {
      let _ = writeln!(out, "placeholders: {}", self.placeholders);
    }

    let _ = write!(
      out,
      "total: {} present, {} missing, {} fallback applied",
      self.present.len(),
      self.missing.len(),
      self.fallbacks.len()
    );
    out
  }

  /// Write the report as pretty JSON.
  pub fn write_json(&self, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(self).context("failed to serialise report")?;
    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent)
        .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, json).with_context(|| format!("failed to write report {}", path.display()))
  }
}

fn section(out: &mut String, label: &str, items: impl Iterator<Item = String>) {
  let items: Vec<String> = items.collect();
  if items.is_empty() {
    return;
  }
  let _ = writeln!(out, "{label}: {}", items.len());
  for item in items.iter().take(EXAMPLES_PER_CATEGORY) {
    let _ = writeln!(out, "  {item}");
  }
  if items.len() > EXAMPLES_PER_CATEGORY {
    let _ = writeln!(out, "  ... and {} more", items.len() - EXAMPLES_PER_CATEGORY);
  }
}

fn join(paths: &[AssetPath]) -> String {
  paths
    .iter()
    .map(AssetPath::as_str)
    .collect::<Vec<_>>()
    .join(", ")
}
