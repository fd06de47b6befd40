//! Scan configuration
//!
//! Settings load from environment variables with fallbacks, so build tasks
//! can tune a scan without code changes.
//!
//! # Environment Variables
//!
//! - `FUNCMETA_REFERENCE_PATHS`: extra directories searched for referenced
//!   assemblies, in platform path-list syntax (`:` on Unix, `;` on Windows)
//! - `FUNCMETA_MODULE_EXTENSIONS`: comma-separated extensions of files to
//!   scan - default: "dll"
//! - `FUNCMETA_MAX_MODULE_SIZE`: largest module read, in bytes - default:
//!   268435456 (256 MiB)
//!
//! # Example
//!
//! ```no_run
//! use funcmeta::ScanConfig;
//!
//! let config = ScanConfig::default()
//!     .with_module_extensions(vec!["dll".to_string(), "exe".to_string()]);
//! config.validate().expect("Invalid configuration");
//! ```

use std::env;
use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

const DEFAULT_MODULE_EXTENSION: &str = "dll";
const DEFAULT_MAX_MODULE_SIZE: u64 = 256 * 1024 * 1024;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    /// Failed to parse configuration value
    #[error("Failed to parse {field}: {error}")]
    ParseError { field: String, error: String },
}

/// Parameters of one scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    /// Directories searched for referenced assemblies before the scanned one
    pub reference_paths: Vec<PathBuf>,

    /// File extensions (without dot, case-insensitive) treated as modules
    pub module_extensions: Vec<String>,

    /// Files larger than this are skipped
    pub max_module_size: u64,
}

impl Default for ScanConfig {
    /// Loads `FUNCMETA_*` variables, falling back to [`ScanConfig::new`]
    fn default() -> Self {
        let defaults = Self::new();

        let reference_paths = env::var_os("FUNCMETA_REFERENCE_PATHS")
            .map(|value| env::split_paths(&value).filter(|p| !p.as_os_str().is_empty()).collect())
            .unwrap_or(defaults.reference_paths);

        let module_extensions = env::var("FUNCMETA_MODULE_EXTENSIONS")
            .ok()
            .map(|value| parse_extensions(&value))
            .filter(|extensions| !extensions.is_empty())
            .unwrap_or(defaults.module_extensions);

        let max_module_size = env::var("FUNCMETA_MAX_MODULE_SIZE")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults.max_module_size);

        Self {
            reference_paths,
            module_extensions,
            max_module_size,
        }
    }
}

impl ScanConfig {
    /// Built-in defaults, ignoring the environment
    pub fn new() -> Self {
        Self {
            reference_paths: Vec::new(),
            module_extensions: vec![DEFAULT_MODULE_EXTENSION.to_string()],
            max_module_size: DEFAULT_MAX_MODULE_SIZE,
        }
    }

    /// Reads the environment strictly, reporting malformed values
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self::default();
        if let Ok(value) = env::var("FUNCMETA_MAX_MODULE_SIZE") {
            value.parse::<u64>().map_err(|e| ConfigError::ParseError {
                field: "FUNCMETA_MAX_MODULE_SIZE".to_string(),
                error: e.to_string(),
            })?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn with_reference_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.reference_paths = paths;
        self
    }

    pub fn with_module_extensions(mut self, extensions: Vec<String>) -> Self {
        self.module_extensions = extensions
            .iter()
            .map(|ext| normalize_extension(ext))
            .collect();
        self
    }

    pub fn with_max_module_size(mut self, bytes: u64) -> Self {
        self.max_module_size = bytes;
        self
    }

    /// Whether `extension` (without dot) names a module file
    pub fn is_module_extension(&self, extension: &str) -> bool {
        self.module_extensions
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(extension))
    }

    /// Validates the configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` when no extensions are set, an
    /// extension is blank, or the size limit is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.module_extensions.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "At least one module extension is required".to_string(),
            ));
        }
        if let Some(bad) = self
            .module_extensions
            .iter()
            .find(|ext| ext.is_empty() || ext.contains(['/', '\\']))
        {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid module extension: '{}'",
                bad
            )));
        }
        if self.max_module_size == 0 {
            return Err(ConfigError::ValidationFailed(
                "Max module size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for ScanConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Scan Configuration:")?;
        writeln!(f, "  Module Extensions: {}", self.module_extensions.join(", "))?;
        writeln!(f, "  Max Module Size: {} bytes", self.max_module_size)?;
        if self.reference_paths.is_empty() {
            writeln!(f, "  Reference Paths: (none)")?;
        } else {
            writeln!(f, "  Reference Paths:")?;
            for path in &self.reference_paths {
                writeln!(f, "    {}", path.display())?;
            }
        }
        Ok(())
    }
}

fn normalize_extension(extension: &str) -> String {
    extension.trim().trim_start_matches('.').to_ascii_lowercase()
}

fn parse_extensions(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(normalize_extension)
        .filter(|ext| !ext.is_empty())
        .collect()
}
