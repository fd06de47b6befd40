//! Diagnostic handler trait and events

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

/// Why a candidate file contributed nothing to the scan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Not a managed module (native DLL, text file, ...)
    NotAModule,
    /// Unreadable, oversized or malformed module
    LoadFailed,
    /// Loaded, but descriptor synthesis failed
    ScanFailed,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SkipReason::NotAModule => "not a managed module",
            SkipReason::LoadFailed => "load failed",
            SkipReason::ScanFailed => "scan failed",
        })
    }
}

/// Events emitted while scanning a directory
#[derive(Debug, Clone)]
pub enum ScanEvent {
    /// Enumeration finished, processing begins
    Started { directory: PathBuf, files: usize },

    /// A module file was parsed
    ModuleLoaded {
        path: PathBuf,
        assembly: String,
        types: usize,
    },

    /// A file was skipped; its partial results were discarded
    ModuleSkipped {
        path: PathBuf,
        reason: SkipReason,
        detail: String,
    },

    /// An entry point produced a descriptor
    FunctionDiscovered {
        path: PathBuf,
        type_name: String,
        function: String,
        bindings: usize,
    },

    /// The scan finished
    Completed {
        functions: usize,
        extensions: usize,
        skipped: usize,
        duration: Duration,
    },
}

/// Receives scan events
pub trait DiagnosticHandler: Send + Sync {
    fn on_event(&self, event: &ScanEvent);
}

/// Handler that drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpHandler;

impl DiagnosticHandler for NoOpHandler {
    fn on_event(&self, _event: &ScanEvent) {}
}
