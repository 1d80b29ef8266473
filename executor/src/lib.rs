//! Deployment Executor (spec.md §4.4): drives a queued `Deployment` through
//! source acquisition, runtime provisioning, the healthcheck gate, and
//! proxy promotion, persisting a step marker after every step so a process
//! restart or a late-arriving cancellation can always compensate correctly.

pub mod builder;
pub mod cancel;
pub mod ctx;
pub mod driver;
pub mod error;
pub mod step;

pub use cancel::{CancelHandle, CancelRegistry};
pub use ctx::{ExecutorConfig, ExecutorCtx};
pub use driver::Executor;
pub use error::ExecutorError;
pub use step::StepMarker;
