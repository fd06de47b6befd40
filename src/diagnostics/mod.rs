//! Scan diagnostics
//!
//! The orchestrator reports what it loads, skips and discovers as
//! [`ScanEvent`]s. Embedders plug in their own [`DiagnosticHandler`];
//! [`LoggingHandler`] forwards events to `tracing`.

mod handler;
mod logging;

pub use handler::{DiagnosticHandler, NoOpHandler, ScanEvent, SkipReason};
pub use logging::LoggingHandler;
