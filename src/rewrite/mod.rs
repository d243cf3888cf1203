//! Span-exact rewriting of documents and the backup taken before any write.

mod backup;
mod plan;

pub use backup::{GuardedWrite, backup_path_for, backup_stamp, is_backup_file};
pub use plan::{Edit, PlanError, RewritePlan};
