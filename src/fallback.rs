//! Fallback resolution for missing responsive image variants.
//!
//! The mapper never creates files; it only re-points a missing asset at a related file
//! that already exists. Every candidate is checked through the resolver, and the chosen
//! target is never itself the product of another substitution.

use std::cmp::Reverse;

use crate::config::FamilyConfig;
use crate::models::{AssetPath, FallbackRule, VariantDescriptor};
use crate::resolver::{AssetTree, ExistenceResolver};

/// Compiled numbered family such as `photo-{n}` in `media/2024/10`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FamilyPattern {
  directory: String,
  prefix: String,
  suffix: String,
}

impl FamilyPattern {
  /// Compile a family definition; the stem needs exactly one `{n}` placeholder.
  pub fn compile(config: &FamilyConfig) -> Option<Self> {
    let mut parts = config.stem.split("{n}");
    let prefix = parts.next()?;
    let suffix = parts.next()?;
    if parts.next().is_some() {
      return None;
    }
    Some(Self {
      directory: config.directory.trim_matches('/').to_string(),
      prefix: prefix.to_string(),
      suffix: suffix.to_string(),
    })
  }

  /// Index encoded in `base_name`, when it belongs to this family.
  pub fn index_of(&self, directory: &str, base_name: &str) -> Option<u32> {
    if directory != self.directory {
      return None;
    }
    let digits = base_name
      .strip_prefix(self.prefix.as_str())?
      .strip_suffix(self.suffix.as_str())?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
      return None;
    }
    digits.parse().ok()
  }
}

/// Substitute chosen for a missing asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitute {
  /// Existing asset to point at.
  pub target: AssetPath,
  /// Rule that selected it.
  pub rule: FallbackRule,
  /// Equally ranked candidates that lost the tie-break.
  pub tied_with: Vec<AssetPath>,
}

/// Applies the fallback rules in order; the first rule that finds an existing file wins.
#[derive(Debug, Clone)]
pub struct FallbackMapper<'a> {
  target_width: u32,
  families: &'a [FamilyPattern],
}

impl<'a> FallbackMapper<'a> {
  /// Create a mapper aiming at `target_width` for closest-variant selection.
  pub fn new(target_width: u32, families: &'a [FamilyPattern]) -> Self {
    Self {
      target_width,
      families,
    }
  }

  /// Find an existing substitute for `missing`, or `None` when no rule applies.
  pub fn map<T: AssetTree>(
    &self,
    missing: &AssetPath,
    resolver: &mut ExistenceResolver<'_, T>,
  ) -> Option<Substitute> {
    let descriptor = VariantDescriptor::parse(missing)?;

    let by_size = if descriptor.is_original() {
      self.closest_variant(&descriptor, resolver)
    } else {
      original_of(&descriptor, resolver)
    };

    by_size
      .or_else(|| self.family_sibling(&descriptor, resolver))
      .filter(|substitute| &substitute.target != missing)
  }

  fn closest_variant<T: AssetTree>(
    &self,
    descriptor: &VariantDescriptor,
    resolver: &mut ExistenceResolver<'_, T>,
  ) -> Option<Substitute> {
    let mut candidates = sized_members(descriptor, resolver);
    if candidates.is_empty() {
      return None;
    }

    let target = i64::from(self.target_width);
    let distance = |width: u32| (i64::from(width) - target).abs();
    candidates.sort_by_key(|(width, height, path)| {
      (distance(*width), Reverse(*width), Reverse(*height), path.clone())
    });

    let (best_width, _, best) = candidates.remove(0);
    let tied_with = candidates
      .into_iter()
      .filter(|(width, _, _)| distance(*width) == distance(best_width))
      .map(|(_, _, path)| path)
      .collect();

    Some(Substitute {
      target: best,
      rule: FallbackRule::ClosestVariant,
      tied_with,
    })
  }

  fn family_sibling<T: AssetTree>(
    &self,
    descriptor: &VariantDescriptor,
    resolver: &mut ExistenceResolver<'_, T>,
  ) -> Option<Substitute> {
    let (family, index) = self.families.iter().find_map(|family| {
      family
        .index_of(&descriptor.directory, &descriptor.base_name)
        .map(|index| (family, index))
    })?;

    let mut siblings: Vec<(u32, String)> = resolver
      .files_in(&descriptor.directory)
      .iter()
      .filter_map(|name| VariantDescriptor::parse_file_name(&descriptor.directory, name))
      .filter(|other| other.extension.eq_ignore_ascii_case(&descriptor.extension))
      .filter_map(|other| {
        family
          .index_of(&other.directory, &other.base_name)
          .filter(|other_index| *other_index != index)
          .map(|other_index| (other_index, other.base_name))
      })
      .collect();
    siblings.sort_by_key(|(other_index, _)| (other_index.abs_diff(index), Reverse(*other_index)));
    siblings.dedup();

    for (_, base_name) in siblings {
      let member = VariantDescriptor {
        base_name,
        ..descriptor.clone()
      };
      if let Some(target) = self.best_member_file(&member, resolver) {
        return Some(Substitute {
          target,
          rule: FallbackRule::FamilySibling,
          tied_with: Vec::new(),
        });
      }
    }

    None
  }

  /// Pick the file of a family member closest to what was requested: the same size,
  /// then the original, then the sized variant nearest the target width.
  fn best_member_file<T: AssetTree>(
    &self,
    member: &VariantDescriptor,
    resolver: &mut ExistenceResolver<'_, T>,
  ) -> Option<AssetPath> {
    let exact = member.path_for(&member.file_name());
    if resolver.exists(&exact) {
      return Some(exact);
    }

    let original = member.path_for(&member.original_file_name());
    if resolver.exists(&original) {
      return Some(original);
    }

    self
      .closest_variant(member, resolver)
      .map(|substitute| substitute.target)
  }
}

fn original_of<T: AssetTree>(
  descriptor: &VariantDescriptor,
  resolver: &mut ExistenceResolver<'_, T>,
) -> Option<Substitute> {
  let original = descriptor.path_for(&descriptor.original_file_name());
  resolver.exists(&original).then(|| Substitute {
    target: original,
    rule: FallbackRule::Original,
    tied_with: Vec::new(),
  })
}

/// Existing sized variants sharing the descriptor's base name and extension.
fn sized_members<T: AssetTree>(
  descriptor: &VariantDescriptor,
  resolver: &mut ExistenceResolver<'_, T>,
) -> Vec<(u32, u32, AssetPath)> {
  let names: Vec<String> = resolver.files_in(&descriptor.directory).to_vec();
  names
    .iter()
    .filter_map(|name| VariantDescriptor::parse_file_name(&descriptor.directory, name))
    .filter(|other| other.same_family(descriptor))
    .filter_map(|other| match (other.width, other.height) {
      (Some(width), Some(height)) => Some((width, height, other.path_for(&other.file_name()))),
      _ => None,
    })
    .filter(|(_, _, path)| resolver.exists(path))
    .collect()
}
