//! funcmeta - static function metadata extraction for .NET worker assemblies
//!
//! This library reads compiled ECMA-335 assemblies without loading or running
//! them, finds methods marked as function entry points, and derives the
//! binding metadata a function host needs to invoke them, along with the
//! extension packages those bindings come from.
//!
//! # Core Concepts
//!
//! - **Module**: one parsed assembly file; a graph of types, methods,
//!   parameters and the attributes declared on them
//! - **Classification**: an attribute counts as a binding (or entry point)
//!   when its type derives from a well-known marker type, possibly through
//!   base types defined in other assemblies
//! - **Descriptor**: one discovered function with its ordered bindings
//! - **Extension registry**: the latest declared version of each extension
//!   package referenced by a binding
//!
//! # Example Usage
//!
//! ```no_run
//! use funcmeta::{ScanConfig, ScanOrchestrator};
//! use std::path::{Path, PathBuf};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let orchestrator = ScanOrchestrator::new(ScanConfig::default());
//! let output = orchestrator.scan(
//!     Path::new("bin/Release/net8.0/App.dll"),
//!     &[PathBuf::from("refs")],
//! )?;
//!
//! for function in &output.functions {
//!     println!("{} -> {}", function.name, function.entry_point);
//! }
//! for (name, version) in output.extensions.iter() {
//!     println!("{} {}", name, version);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Project Structure
//!
//! - [`metadata`]: PE/COFF and ECMA-335 metadata decoding
//! - [`loader`]: module loading and cross-assembly resolution
//! - [`functions`]: classification, bindings and descriptor synthesis
//! - [`pipeline`]: directory scanning with per-file failure isolation
//! - [`diagnostics`]: scan events and handlers

pub mod config;
pub mod diagnostics;
pub mod functions;
pub mod loader;
pub mod metadata;
pub mod pipeline;
pub mod util;

pub use config::{ConfigError, ScanConfig};
pub use diagnostics::{DiagnosticHandler, LoggingHandler, NoOpHandler, ScanEvent, SkipReason};
pub use functions::{
    BindingDescriptor, BindingError, Direction, ExtensionRegistry, FunctionDescriptor, Marker,
};
pub use loader::{LoadError, ModuleContext, ModuleLoader};
pub use metadata::{MetadataError, Module};
pub use pipeline::{generate, ScanError, ScanOrchestrator, ScanOutput, SkippedFile};
pub use util::{init_default, init_from_env, init_logging, LoggingConfig};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
