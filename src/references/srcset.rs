use crate::models::TextSpan;

/// One `url descriptor` pair of a `srcset` value, in value-relative offsets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrcsetEntry {
  /// Span of the URL.
  pub url: TextSpan,
  /// Span of URL plus descriptor.
  pub entry: TextSpan,
  /// Width or density descriptor, if any.
  pub descriptor: Option<String>,
}

/// Split a `srcset` value into its comma separated entries.
///
/// The descriptor (`600w`, `2x`) is split off the URL rather than treated as part of the
/// path. Empty entries, such as the one left by a trailing comma, are skipped.
pub fn split_srcset(value: &str) -> Vec<SrcsetEntry> {
  let mut entries = Vec::new();
  let mut cursor = 0;

  for piece in value.split(',') {
    let piece_start = cursor;
    cursor += piece.len() + 1;

    let leading = piece.len() - piece.trim_start().len();
    let trimmed = piece.trim();
    if trimmed.is_empty() {
      continue;
    }

    let entry_start = piece_start + leading;
    let entry_end = entry_start + trimmed.len();
    let url_len = trimmed
      .find(char::is_whitespace)
      .unwrap_or(trimmed.len());
    let descriptor = trimmed[url_len..].trim();

    entries.push(SrcsetEntry {
      url: TextSpan::new(entry_start, entry_start + url_len),
      entry: TextSpan::new(entry_start, entry_end),
      descriptor: (!descriptor.is_empty()).then(|| descriptor.to_string()),
    });
  }

  entries
}
