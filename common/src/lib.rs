pub mod error;
#[cfg(feature = "extract_propagation")]
pub mod extract_propagation;
pub mod ids;
pub mod models;

pub use error::{CoreError, CoreResult};
