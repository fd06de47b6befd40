//! Directory scanning
//!
//! [`ScanOrchestrator`] enumerates the module files next to an assembly and
//! runs loading and descriptor synthesis over each, isolating failures per
//! file. [`generate`] is the one-call entry point for build tasks.

mod error;
mod orchestrator;
mod output;

pub use error::ScanError;
pub use orchestrator::ScanOrchestrator;
pub use output::{ScanOutput, SkippedFile};

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::config::ScanConfig;

/// Scans the directory of `assembly_path` with configuration from the
/// environment and logging diagnostics
pub fn generate(assembly_path: &Path, reference_paths: &[PathBuf]) -> Result<ScanOutput> {
    let config = ScanConfig::from_env().context("Invalid scan configuration")?;
    ScanOrchestrator::new(config)
        .scan(assembly_path, reference_paths)
        .with_context(|| format!("Failed to scan {}", assembly_path.display()))
}
