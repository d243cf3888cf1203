use crate::models::TextSpan;

/// Replacement of one span of the original text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
  /// Span in the original text.
  pub span: TextSpan,
  /// Text written in place of the span.
  pub replacement: String,
}

/// Reasons an edit is refused by a plan.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
  /// The span shares bytes with an edit already in the plan.
  #[error("edit {start}..{end} overlaps an existing edit")]
  Overlap {
    /// Start of the refused span.
    start: usize,
    /// End of the refused span.
    end: usize,
  },
  /// The replacement carries a quote character that could unbalance an attribute.
  #[error("replacement `{0}` contains a quote character")]
  QuoteInReplacement(String),
  /// The span does not fit the document or splits a UTF-8 character.
  #[error("edit {start}..{end} is not a valid range of the document")]
  OutOfBounds {
    /// Start of the refused span.
    start: usize,
    /// End of the refused span.
    end: usize,
  },
}

/// Ordered, non-overlapping set of edits against one original text.
///
/// All spans are expressed in coordinates of the original text. [`RewritePlan::apply`]
/// streams through the text once, copying untouched bytes verbatim and splicing each
/// replacement at its span, so earlier edits never shift later ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewritePlan {
  edits: Vec<Edit>,
}

impl RewritePlan {
  /// Create an empty plan.
  pub fn new() -> Self {
    Self::default()
  }

  /// Add an edit, keeping the plan sorted by position.
  ///
  /// Edits that would overlap a planned edit or that introduce a quote character are
  /// refused, so applying the plan can never leave an attribute half replaced.
  pub fn push(&mut self, span: TextSpan, replacement: impl Into<String>) -> Result<(), PlanError> {
    let replacement = replacement.into();
    if replacement.contains(['"', '\'']) {
      return Err(PlanError::QuoteInReplacement(replacement));
    }

    let index = self.edits.partition_point(|edit| edit.span.start < span.start);
    let clashes_before = index > 0 && self.edits[index - 1].span.end > span.start;
    let clashes_after = self
      .edits
      .get(index)
      .is_some_and(|next| next.span.start < span.end || next.span.start == span.start);
    if clashes_before || clashes_after {
      return Err(PlanError::Overlap {
        start: span.start,
        end: span.end,
      });
    }

    self.edits.insert(index, Edit { span, replacement });
    Ok(())
  }

  /// Planned edits in document order.
  pub fn edits(&self) -> &[Edit] {
    &self.edits
  }

  /// Number of planned edits.
  pub fn len(&self) -> usize {
    self.edits.len()
  }

  /// Returns `true` when nothing is planned.
  pub fn is_empty(&self) -> bool {
    self.edits.is_empty()
  }

  /// Produce the rewritten text.
  pub fn apply(&self, original: &str) -> Result<String, PlanError> {
    let mut output = String::with_capacity(original.len());
    let mut cursor = 0;

    for edit in &self.edits {
      let TextSpan { start, end } = edit.span;
      if end > original.len() || !original.is_char_boundary(start) || !original.is_char_boundary(end)
      {
        return Err(PlanError::OutOfBounds { start, end });
      }
      output.push_str(&original[cursor..start]);
      output.push_str(&edit.replacement);
      cursor = end;
    }

    output.push_str(&original[cursor..]);
    Ok(output)
  }
}
