//! Scan errors

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::diagnostics::SkipReason;
use crate::functions::BindingError;
use crate::loader::LoadError;

/// Errors raised by a scan
///
/// `Config` and `DirectoryNotFound` abort the whole scan; `Load` and
/// `Binding` describe one file and only ever surface as skipped files.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Scan directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("Failed to synthesize functions for {path}: {source}")]
    Binding {
        path: PathBuf,
        #[source]
        source: BindingError,
    },
}

impl ScanError {
    /// How a per-file failure is reported
    pub fn skip_reason(&self) -> SkipReason {
        match self {
            ScanError::Load(e) if e.is_not_a_module() => SkipReason::NotAModule,
            ScanError::Load(_) => SkipReason::LoadFailed,
            _ => SkipReason::ScanFailed,
        }
    }
}
