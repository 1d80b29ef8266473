//! Change Log and Snapshot Differ (spec.md §4.1, §4.2).

pub mod change_log;
pub mod differ;
pub mod error;
pub mod projector;
pub mod validation;

pub use change_log::{add_change, apply_pending_changes, cancel_change, project, NewChange};
pub use differ::snapshot_diff;
pub use error::ChangeLogError;
