//! Reference extraction from HTML markup and stylesheets.
//!
//! Extraction is a pure read: the document text is scanned with a handful of patterns
//! and every local resource reference is returned with the exact byte span it occupies,
//! so later stages can rewrite it without touching anything else.

mod css;
mod html;
mod srcset;

use std::collections::{BTreeSet, HashSet};

use crate::asset_paths::{is_local_reference, locator_extension};
use crate::models::{DocumentKind, ReferenceContext, ResourceReference, SrcsetSlot, TextSpan};
use crate::project::SiteLayout;

pub use css::find_css_urls;
pub use html::{AttributeKind, AttributeValue, find_attribute_values, find_style_blocks};
pub use srcset::{SrcsetEntry, split_srcset};

/// Decides which locators and contexts the extractor keeps.
#[derive(Debug, Clone)]
pub struct ReferenceFilter {
  /// Prefixes marking a locator as local.
  pub local_prefixes: Vec<String>,
  /// Lowercase media extensions for `src` and `href`.
  pub media_extensions: BTreeSet<String>,
  /// Contexts to extract.
  pub contexts: BTreeSet<ReferenceContext>,
}

impl ReferenceFilter {
  /// Filter recognising every context with the layout's prefixes and extensions.
  pub fn from_layout(layout: &SiteLayout) -> Self {
    Self {
      local_prefixes: layout.local_prefixes.clone(),
      media_extensions: layout.media_extensions.clone(),
      contexts: [
        ReferenceContext::ImgSrc,
        ReferenceContext::SrcsetEntry,
        ReferenceContext::CssUrl,
        ReferenceContext::LinkHref,
      ]
      .into_iter()
      .collect(),
    }
  }

  fn accepts(&self, context: ReferenceContext, locator: &str) -> bool {
    if !self.contexts.contains(&context) || !is_local_reference(locator, &self.local_prefixes) {
      return false;
    }

    match context {
      ReferenceContext::SrcsetEntry | ReferenceContext::CssUrl => true,
      ReferenceContext::ImgSrc => {
        locator_extension(locator).is_some_and(|ext| self.media_extensions.contains(&ext))
      }
      ReferenceContext::LinkHref => locator_extension(locator)
        .is_some_and(|ext| ext == "css" || self.media_extensions.contains(&ext)),
    }
  }
}

/// Extract every local resource reference from a document, in document order.
pub fn extract_references(
  text: &str,
  kind: DocumentKind,
  filter: &ReferenceFilter,
) -> Vec<ResourceReference> {
  let mut references = Vec::new();

  match kind {
    DocumentKind::Css => collect_css_urls(text, 0, filter, &mut references),
    DocumentKind::Html => {
      for attribute in find_attribute_values(text) {
        collect_attribute(text, attribute, filter, &mut references);
      }
      for block in find_style_blocks(text) {
        collect_css_urls(block.slice(text), block.start, filter, &mut references);
      }
    }
  }

  references.sort_by_key(|reference| reference.span);
  let mut seen = HashSet::new();
  references.retain(|reference| seen.insert(reference.span));
  references
}

fn collect_attribute(
  text: &str,
  attribute: AttributeValue,
  filter: &ReferenceFilter,
  references: &mut Vec<ResourceReference>,
) {
  let value = attribute.value.slice(text);
  let offset = attribute.value.start;

  match attribute.kind {
    AttributeKind::Src => push_whole_value(value, offset, ReferenceContext::ImgSrc, filter, references),
    AttributeKind::Href => {
      push_whole_value(value, offset, ReferenceContext::LinkHref, filter, references)
    }
    AttributeKind::Style => collect_css_urls(value, offset, filter, references),
    AttributeKind::Srcset => {
      for entry in split_srcset(value) {
        let locator = entry.url.slice(value);
        if !filter.accepts(ReferenceContext::SrcsetEntry, locator) {
          continue;
        }
        references.push(ResourceReference {
          locator: locator.to_string(),
          context: ReferenceContext::SrcsetEntry,
          span: entry.url.offset(offset),
          descriptor: entry.descriptor,
          srcset: Some(SrcsetSlot {
            attribute: attribute.value,
            entry: entry.entry.offset(offset),
          }),
        });
      }
    }
  }
}

fn push_whole_value(
  value: &str,
  offset: usize,
  context: ReferenceContext,
  filter: &ReferenceFilter,
  references: &mut Vec<ResourceReference>,
) {
  let trimmed = value.trim();
  if !filter.accepts(context, trimmed) {
    return;
  }
  let start = offset + (value.len() - value.trim_start().len());
  references.push(ResourceReference {
    locator: trimmed.to_string(),
    context,
    span: TextSpan::new(start, start + trimmed.len()),
    descriptor: None,
    srcset: None,
  });
}

fn collect_css_urls(
  css: &str,
  offset: usize,
  filter: &ReferenceFilter,
  references: &mut Vec<ResourceReference>,
) {
  for span in find_css_urls(css) {
    let locator = span.slice(css);
    if !filter.accepts(ReferenceContext::CssUrl, locator) {
      continue;
    }
    references.push(ResourceReference {
      locator: locator.to_string(),
      context: ReferenceContext::CssUrl,
      span: span.offset(offset),
      descriptor: None,
      srcset: None,
    });
  }
}
