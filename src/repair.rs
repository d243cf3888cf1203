//! Canonical path-repair table applied once per document before extraction.
//!
//! Scraped exports contain a few recurring malformations: a stylesheet directory glued in
//! front of an upload path, `srcset` values ending in entries that point at a bare
//! upload directory, and `url()` arguments naming that bare directory. Each table entry
//! is a pattern, a replacement and the kind of document it is allowed to touch.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::DocumentKind;

/// Documents a repair rule may modify.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RepairScope {
  /// HTML documents only.
  Html,
  /// Stylesheets only.
  Css,
  /// Every document.
  #[default]
  Any,
}

impl RepairScope {
  fn applies_to(self, kind: DocumentKind) -> bool {
    match self {
      Self::Any => true,
      Self::Html => kind == DocumentKind::Html,
      Self::Css => kind == DocumentKind::Css,
    }
  }
}

/// Repair rule as written in the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RepairRuleConfig {
  /// Name used in logs and the report.
  pub name: String,
  /// Regular expression to search for.
  pub pattern: String,
  /// Replacement, with `${1}`-style group references.
  pub replacement: String,
  /// Documents the rule applies to.
  #[serde(default)]
  pub scope: RepairScope,
}

/// Compiled repair rule.
#[derive(Debug, Clone)]
pub struct RepairRule {
  name: String,
  pattern: Regex,
  replacement: String,
  scope: RepairScope,
}

impl RepairRule {
  /// Compile a configured rule.
  pub fn compile(config: &RepairRuleConfig) -> Result<Self, regex::Error> {
    Ok(Self {
      name: config.name.clone(),
      pattern: Regex::new(&config.pattern)?,
      replacement: config.replacement.clone(),
      scope: config.scope,
    })
  }

  /// Name of the rule.
  pub fn name(&self) -> &str {
    &self.name
  }
}

const UPLOAD_DIRS: &str = "(?:wp-content/uploads|assets/media)";

/// Whole locator whose upload path was prefixed with the stylesheet directory.
///
/// The match starts at the locator boundary so any leading `/`, `./` or `../` run is
/// consumed with it; group 1 keeps the boundary character.
fn stylesheet_prefixed_pattern() -> String {
  format!(
    r#"(^|["'(\s;=,])(?:\.{{1,2}}/|/)*{UPLOAD_DIRS}/elementor/css/({UPLOAD_DIRS}/)"#
  )
}

/// Built-in repair table.
pub fn default_repair_rules() -> Vec<RepairRuleConfig> {
  vec![
    RepairRuleConfig {
      name: "stylesheet-dir-prefixed-upload-html".into(),
      pattern: stylesheet_prefixed_pattern(),
      replacement: "${1}./${2}".into(),
      scope: RepairScope::Html,
    },
    RepairRuleConfig {
      name: "stylesheet-dir-prefixed-upload-css".into(),
      pattern: stylesheet_prefixed_pattern(),
      replacement: "${1}/${2}".into(),
      scope: RepairScope::Css,
    },
    RepairRuleConfig {
      name: "dangling-srcset-entry".into(),
      pattern: format!(r#"(srcset="[^"]*?)(?:,\s*\./{UPLOAD_DIRS}/)+""#),
      replacement: "${1}\"".into(),
      scope: RepairScope::Html,
    },
    RepairRuleConfig {
      name: "bare-upload-dir-url".into(),
      pattern: format!(
        r#"url\(\s*(?:["']|&quot;)?(?:\./)?{UPLOAD_DIRS}/(?:["']|&quot;)?\s*\)"#
      ),
      replacement: "none".into(),
      scope: RepairScope::Any,
    },
  ]
}

/// Result of running the repair table over one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairOutcome {
  /// Repaired text.
  pub text: String,
  /// Number of matches rewritten per rule name.
  pub counts: BTreeMap<String, usize>,
}

/// Run every applicable rule once, in table order.
pub fn apply_repairs(text: &str, kind: DocumentKind, rules: &[RepairRule]) -> RepairOutcome {
  let mut current = text.to_string();
  let mut counts = BTreeMap::new();

  for rule in rules.iter().filter(|rule| rule.scope.applies_to(kind)) {
    let matches = rule.pattern.find_iter(&current).count();
    if matches == 0 {
      continue;
    }
    current = rule
      .pattern
      .replace_all(&current, rule.replacement.as_str())
      .into_owned();
    tracing::debug!("repair `{}` rewrote {} occurrence(s)", rule.name, matches);
    *counts.entry(rule.name.clone()).or_insert(0) += matches;
  }

  RepairOutcome {
    text: current,
    counts,
  }
}
