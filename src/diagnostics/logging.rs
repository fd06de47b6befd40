//! Logging-based diagnostic handler

use super::{DiagnosticHandler, ScanEvent, SkipReason};
use tracing::{debug, info, warn};

/// Writes scan events through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingHandler;

impl DiagnosticHandler for LoggingHandler {
    fn on_event(&self, event: &ScanEvent) {
        match event {
            ScanEvent::Started { directory, files } => {
                info!(dir = %directory.display(), files, "Scanning for functions");
            }
            ScanEvent::ModuleLoaded {
                path,
                assembly,
                types,
            } => {
                debug!(path = %path.display(), assembly = %assembly, types, "Module loaded");
            }
            ScanEvent::ModuleSkipped {
                path,
                reason: SkipReason::NotAModule,
                detail,
            } => {
                debug!(path = %path.display(), detail = %detail, "Not a managed module, skipped");
            }
            ScanEvent::ModuleSkipped {
                path,
                reason,
                detail,
            } => {
                warn!(path = %path.display(), reason = %reason, error = %detail, "Skipping file");
            }
            ScanEvent::FunctionDiscovered {
                path,
                type_name,
                function,
                bindings,
            } => {
                debug!(
                    path = %path.display(),
                    type_name = %type_name,
                    function = %function,
                    bindings,
                    "Function discovered"
                );
            }
            ScanEvent::Completed {
                functions,
                extensions,
                skipped,
                duration,
            } => {
                info!(
                    functions,
                    extensions,
                    skipped,
                    duration_ms = duration.as_millis(),
                    "Scan complete"
                );
            }
        }
    }
}
