use std::sync::OnceLock;

use regex::Regex;

use crate::models::TextSpan;

fn css_url_pattern() -> &'static Regex {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| {
    Regex::new(r#"(?i)url\(\s*(?:"([^"]*)"|'([^']*)'|&quot;(.*?)&quot;|([^)'"\s]*))\s*\)"#)
      .expect("invalid css url regex")
  })
}

/// Locate every `url(...)` argument in a stylesheet fragment.
///
/// Double, single and HTML-escaped (`&quot;`) quoting is recognised, as are unquoted
/// arguments. Spans cover the argument only, never the quotes.
pub fn find_css_urls(css: &str) -> Vec<TextSpan> {
  css_url_pattern()
    .captures_iter(css)
    .filter_map(|caps| {
      (1..=4)
        .find_map(|index| caps.get(index))
        .map(|value| TextSpan::new(value.start(), value.end()))
    })
    .filter(|span| !span.is_empty())
    .collect()
}
