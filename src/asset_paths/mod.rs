//! Helpers for filtering, normalising and decomposing asset locators.
//!
//! The responsibilities are split into focused submodules so that reference filtering,
//! path normalisation and responsive-variant naming can be tested independently.

mod filters;
mod normalize;
mod variant;

pub use filters::{
    is_local_reference, locator_extension, should_ignore_asset_reference,
    strip_query_and_fragment,
};
pub use normalize::{LocatorError, normalize_locator, repoint_locator};
