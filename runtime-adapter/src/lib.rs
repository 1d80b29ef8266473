//! Typed, idempotent wrapper over the container runtime. Spec.md §6 treats
//! the runtime as a remote API with exactly eight operations; this crate
//! is that API, backed by `bollard` the way `deployer::project::docker`
//! wraps `bollard::Docker` for the teacher's per-project containers.

pub mod adapter;
pub mod error;
pub mod healthcheck;
pub mod spec;

pub use adapter::RuntimeAdapter;
pub use error::{RuntimeAdapterError, RuntimeAdapterResult};
pub use healthcheck::{wait_until_healthy, HealthcheckOutcome};
pub use spec::{service_spec_for_deployment, ServiceSpecInput};
