use std::sync::OnceLock;

use regex::Regex;

use crate::models::TextSpan;

/// Attribute kinds the extractor looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
  /// `src` or `data-src`.
  Src,
  /// `srcset` or `data-srcset`.
  Srcset,
  /// `href`.
  Href,
  /// Inline `style`.
  Style,
}

/// Attribute value located in markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeValue {
  /// Which attribute the value belongs to.
  pub kind: AttributeKind,
  /// Span of the value between its quotes.
  pub value: TextSpan,
}

fn attribute_pattern() -> &'static Regex {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| {
    Regex::new(r#"(?i)\s(data-srcset|data-src|srcset|src|href|style)\s*=\s*(?:"([^"]*)"|'([^']*)')"#)
      .expect("invalid attribute regex")
  })
}

fn style_block_pattern() -> &'static Regex {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| {
    Regex::new(r"(?is)<style\b[^>]*>(.*?)</style\s*>").expect("invalid style block regex")
  })
}

/// Find quoted `src`, `srcset`, `href` and `style` attribute values in markup.
pub fn find_attribute_values(html: &str) -> Vec<AttributeValue> {
  attribute_pattern()
    .captures_iter(html)
    .filter_map(|caps| {
      let name = caps.get(1)?.as_str().to_ascii_lowercase();
      let kind = match name.as_str() {
        "src" | "data-src" => AttributeKind::Src,
        "srcset" | "data-srcset" => AttributeKind::Srcset,
        "href" => AttributeKind::Href,
        _ => AttributeKind::Style,
      };
      let value = caps.get(2).or_else(|| caps.get(3))?;
      Some(AttributeValue {
        kind,
        value: TextSpan::new(value.start(), value.end()),
      })
    })
    .collect()
}

/// Find the bodies of inline `<style>` blocks.
pub fn find_style_blocks(html: &str) -> Vec<TextSpan> {
  style_block_pattern()
    .captures_iter(html)
    .filter_map(|caps| caps.get(1))
    .map(|body| TextSpan::new(body.start(), body.end()))
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn finds_double_and_single_quoted_values() {
    let html = r#"<img src="./a.png" srcset='./a-300x200.png 300w'><link rel='stylesheet' href="./s.css">"#;
    let values = find_attribute_values(html);
    let found: Vec<(AttributeKind, &str)> = values
      .iter()
      .map(|value| (value.kind, value.value.slice(html)))
      .collect();
    assert_eq!(found, vec![
      (AttributeKind::Src, "./a.png"),
      (AttributeKind::Srcset, "./a-300x200.png 300w"),
      (AttributeKind::Href, "./s.css"),
    ]);
  }

  #[test]
  fn recognises_lazy_loading_attributes_and_case() {
    let html = r#"<img data-src="./a.png" DATA-SRCSET="./b.png 2x" SRC="./c.png">"#;
    let kinds: Vec<AttributeKind> = find_attribute_values(html)
      .into_iter()
      .map(|value| value.kind)
      .collect();
    assert_eq!(kinds, vec![
      AttributeKind::Src,
      AttributeKind::Srcset,
      AttributeKind::Src
    ]);
  }

  #[test]
  fn style_attributes_are_reported() {
    let html = r#"<div style="background:url('./bg.jpg')"></div>"#;
    let values = find_attribute_values(html);
    assert_eq!(values.len(), 1);
    assert_eq!(values[0].kind, AttributeKind::Style);
    assert_eq!(values[0].value.slice(html), "background:url('./bg.jpg')");
  }

  #[test]
  fn finds_style_block_bodies() {
    let html = "<style id=\"x\">a{}</style><p></p><STYLE>\nb{}\n</STYLE >";
    let blocks: Vec<&str> = find_style_blocks(html)
      .into_iter()
      .map(|span| span.slice(html))
      .collect();
    assert_eq!(blocks, vec!["a{}", "\nb{}\n"]);
  }
}
