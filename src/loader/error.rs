//! Module loading errors

use std::path::PathBuf;

use thiserror::Error;

use crate::metadata::MetadataError;

/// Why a file could not be turned into a module
#[derive(Debug, Error)]
pub enum LoadError {
    /// The file could not be read
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file is not a managed PE image at all
    #[error("{path} is not a managed module: {source}")]
    NotAModule {
        path: PathBuf,
        #[source]
        source: MetadataError,
    },

    /// The file looks like a managed module but its metadata is broken
    #[error("Malformed metadata in {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: MetadataError,
    },

    /// The file exceeds the configured size limit
    #[error("{path} is {size} bytes, above the {limit} byte limit")]
    TooLarge { path: PathBuf, size: u64, limit: u64 },
}

impl LoadError {
    pub(crate) fn from_metadata(path: PathBuf, source: MetadataError) -> Self {
        match source {
            MetadataError::NotAModule(_) => LoadError::NotAModule { path, source },
            source => LoadError::Malformed { path, source },
        }
    }

    /// Whether the file simply isn't a module (as opposed to a broken one)
    pub fn is_not_a_module(&self) -> bool {
        matches!(self, LoadError::NotAModule { .. })
    }

    pub fn path(&self) -> &std::path::Path {
        match self {
            LoadError::Io { path, .. }
            | LoadError::NotAModule { path, .. }
            | LoadError::Malformed { path, .. }
            | LoadError::TooLarge { path, .. } => path,
        }
    }
}
