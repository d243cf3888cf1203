#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod asset_paths;
pub mod config;
pub mod error;
pub mod fallback;
pub mod fetch;
pub mod models;
pub mod pipeline;
pub mod project;
pub mod references;
pub mod repair;
pub mod report;
pub mod resolver;
pub mod rewrite;
pub mod stylesheets;
pub mod variants;

pub use config::{DEFAULT_CONFIG_FILE, ProjectConfig, UnresolvedPolicy};
pub use error::{ReconcileError, ReconcileResult};
pub use pipeline::Reconciler;
pub use project::SiteLayout;
pub use report::{AssetIssue, ReconcileReport};
pub use variants::{VariantOutcome, VariantRequest, create_variant, run_variants};
