//! Data structures produced while reconciling a document against the asset tree.

use std::fmt;
use std::ops::Range;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Context a resource reference was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReferenceContext {
  /// `src` (or `data-src`) attribute pointing at a media file.
  ImgSrc,
  /// One `url descriptor` entry of a `srcset` (or `data-srcset`) attribute.
  SrcsetEntry,
  /// Argument of a CSS `url(...)` function.
  CssUrl,
  /// `href` attribute pointing at a stylesheet or media file.
  LinkHref,
}

impl ReferenceContext {
  /// Stable label used in logs and reports.
  pub fn label(self) -> &'static str {
    match self {
      Self::ImgSrc => "img-src",
      Self::SrcsetEntry => "srcset-entry",
      Self::CssUrl => "css-url",
      Self::LinkHref => "link-href",
    }
  }
}

/// Half-open byte range inside a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TextSpan {
  /// Offset of the first byte.
  pub start: usize,
  /// Offset one past the last byte.
  pub end: usize,
}

impl TextSpan {
  /// Create a span from explicit bounds.
  pub fn new(start: usize, end: usize) -> Self {
    debug_assert!(start <= end);
    Self { start, end }
  }

  /// Shift a span found inside a fragment back into document coordinates.
  pub fn offset(self, by: usize) -> Self {
    Self::new(self.start + by, self.end + by)
  }

  /// Length in bytes.
  pub fn len(&self) -> usize {
    self.end - self.start
  }

  /// Returns `true` for zero-length spans.
  pub fn is_empty(&self) -> bool {
    self.start == self.end
  }

  /// Whether the two spans share at least one byte.
  pub fn overlaps(&self, other: &TextSpan) -> bool {
    self.start < other.end && other.start < self.end
  }

  /// Whether `other` lies completely inside this span.
  pub fn contains(&self, other: &TextSpan) -> bool {
    self.start <= other.start && other.end <= self.end
  }

  /// Borrow the spanned text.
  pub fn slice<'t>(&self, text: &'t str) -> &'t str {
    &text[self.range()]
  }

  /// Convert into a standard range.
  pub fn range(&self) -> Range<usize> {
    self.start..self.end
  }
}

/// Placement of a `srcset` entry inside its attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SrcsetSlot {
  /// Span of the whole attribute value (between the quotes).
  pub attribute: TextSpan,
  /// Span of this entry: locator plus descriptor, without separators.
  pub entry: TextSpan,
}

/// One resource reference as it appears in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceReference {
  /// Locator exactly as written in the source.
  pub locator: String,
  /// Where the locator was found.
  pub context: ReferenceContext,
  /// Byte span of the locator in the document.
  pub span: TextSpan,
  /// `srcset` width or density descriptor (`600w`, `2x`), kept verbatim.
  pub descriptor: Option<String>,
  /// Attribute and entry spans for `srcset` entries.
  pub srcset: Option<SrcsetSlot>,
}

/// Normalised, forward-slash path of an asset relative to the asset root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetPath(String);

impl AssetPath {
  /// Wrap an already-normalised relative path.
  pub fn new(path: impl Into<String>) -> Self {
    Self(path.into())
  }

  /// Borrow the relative path.
  pub fn as_str(&self) -> &str {
    &self.0
  }

  /// Directory part (empty at the root).
  pub fn parent(&self) -> &str {
    self.0.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
  }

  /// File name part.
  pub fn file_name(&self) -> &str {
    self.0.rsplit_once('/').map(|(_, name)| name).unwrap_or(&self.0)
  }

  /// Sibling path in the same directory.
  pub fn sibling(&self, file_name: &str) -> Self {
    let dir = self.parent();
    if dir.is_empty() {
      Self(file_name.to_string())
    } else {
      Self(format!("{dir}/{file_name}"))
    }
  }

  /// Location of the asset on disk.
  pub fn to_fs_path(&self, root: &Path) -> PathBuf {
    let mut path = root.to_path_buf();
    for segment in self.0.split('/').filter(|segment| !segment.is_empty()) {
      path.push(segment);
    }
    path
  }
}

impl fmt::Display for AssetPath {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Decomposition of a file name following the `name[-WxH].ext` convention.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VariantDescriptor {
  /// Directory of the asset relative to the asset root.
  pub directory: String,
  /// File name without size suffix and extension.
  pub base_name: String,
  /// Declared width of a sized variant.
  pub width: Option<u32>,
  /// Declared height of a sized variant.
  pub height: Option<u32>,
  /// Extension without the leading dot.
  pub extension: String,
}

/// Fallback rule that produced a substitute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FallbackRule {
  /// Sized variant replaced by its original.
  Original,
  /// Original replaced by the sized variant closest to the target width.
  ClosestVariant,
  /// Replaced by the nearest existing member of a configured numbered family.
  FamilySibling,
}

/// Outcome of resolving one asset path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionResult {
  /// The file exists.
  Present,
  /// The file is missing and no rule produced a substitute.
  MissingNoFallback,
  /// The file is missing; `target` exists and replaces it.
  MissingWithFallback {
    /// Existing asset the reference is re-pointed to.
    target: AssetPath,
    /// Rule that chose the target.
    rule: FallbackRule,
  },
}

impl ResolutionResult {
  /// Returns `true` when the original file exists.
  pub fn is_present(&self) -> bool {
    matches!(self, Self::Present)
  }
}

/// Kind of document being reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
  /// HTML markup with attributes, inline styles and `<style>` blocks.
  Html,
  /// A standalone stylesheet.
  Css,
}

impl DocumentKind {
  /// Infer the kind from a file extension, defaulting to HTML.
  pub fn from_path(path: &Path) -> Self {
    match path.extension().and_then(|ext| ext.to_str()) {
      Some(ext) if ext.eq_ignore_ascii_case("css") => Self::Css,
      _ => Self::Html,
    }
  }
}
