//! Galleria Infrastructure Library
//!
//! Shared infrastructure for the Galleria binaries:
//! - Telemetry initialization (tracing subscriber)

#[cfg(feature = "observability-basic")]
pub mod telemetry;

#[cfg(feature = "observability-basic")]
pub use telemetry::{init_telemetry, LogFormat};
