//! Scan results

use std::path::PathBuf;

use serde::Serialize;

use crate::diagnostics::SkipReason;
use crate::functions::{ExtensionRegistry, FunctionDescriptor};

/// A file that contributed nothing, and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedFile {
    pub path: PathBuf,
    pub reason: SkipReason,
    pub detail: String,
}

/// Everything one scan produced
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanOutput {
    /// Descriptors in file, type, method order
    pub functions: Vec<FunctionDescriptor>,
    pub extensions: ExtensionRegistry,
    pub skipped: Vec<SkippedFile>,
}

impl ScanOutput {
    pub fn function(&self, name: &str) -> Option<&FunctionDescriptor> {
        self.functions.iter().find(|function| function.name == name)
    }
}
