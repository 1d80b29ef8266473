//! Cancellation Coordinator (spec.md §4.7).

pub mod coordinator;
pub mod error;

pub use coordinator::CancellationCoordinator;
pub use error::CancellationError;
