use std::sync::OnceLock;

use regex::Regex;

fn asset_reference_ignores() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            vec![
                Regex::new(r"(?i)^https?://").expect("invalid http(s) regex"),
                Regex::new(r"^//").expect("invalid protocol-relative regex"),
                Regex::new(r"(?i)^data:").expect("invalid data URI regex"),
                Regex::new(r"(?i)^(?:mailto|tel|javascript|blob):").expect("invalid scheme regex"),
                Regex::new(r"^#").expect("invalid fragment regex"),
            ]
        })
        .as_slice()
}

/// Determine whether a reference can never point into the local asset tree.
///
/// External URLs, data URIs and in-page fragments are left to other tooling.
pub fn should_ignore_asset_reference(value: &str) -> bool {
    let value = value.trim();
    value.is_empty()
        || asset_reference_ignores()
            .iter()
            .any(|pattern| pattern.is_match(value))
}

/// Whether a locator starts with one of the configured local-asset prefixes.
pub fn is_local_reference(value: &str, prefixes: &[String]) -> bool {
    if should_ignore_asset_reference(value) {
        return false;
    }
    let value = value.trim();
    prefixes
        .iter()
        .any(|prefix| !prefix.is_empty() && value.starts_with(prefix.as_str()))
}

/// Drop `?query` and `#fragment` suffixes from a locator.
pub fn strip_query_and_fragment(value: &str) -> &str {
    let end = value.find(['?', '#']).unwrap_or(value.len());
    &value[..end]
}

/// Lowercase extension of the locator's file name, ignoring any query string.
pub fn locator_extension(value: &str) -> Option<String> {
    let path = strip_query_and_fragment(value);
    let file_name = path.rsplit('/').next()?;
    let (stem, ext) = file_name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
