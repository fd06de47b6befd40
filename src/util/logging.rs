//! Structured logging setup
//!
//! Scans report through `tracing`; this module installs a subscriber for
//! binaries and build tasks that embed the crate. Libraries embedding funcmeta
//! alongside their own subscriber should skip these helpers entirely.
//!
//! # Environment Variables
//!
//! - `FUNCMETA_LOG_LEVEL`: trace|debug|info|warn|error, default "info"
//! - `FUNCMETA_LOG_JSON`: emit JSON lines (true|false), default "false"
//! - `RUST_LOG`: standard filter directives, applied on top
//!
//! # Example
//!
//! ```no_run
//! use funcmeta::util::logging;
//!
//! logging::init_from_env();
//! tracing::info!(dir = "bin/Release", "Scanning");
//! ```

use std::env;
use std::sync::Once;

use tracing::Level;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Chatty dependency targets held at `warn` unless `RUST_LOG` says otherwise
const QUIET_TARGETS: &[&str] = &["ignore", "globset"];

/// Controls how the subscriber formats events
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Minimum level for `funcmeta` targets
    pub level: Level,

    /// Emit JSON lines instead of human-readable output
    pub use_json: bool,

    /// Include the event target (e.g. `funcmeta::loader`)
    pub include_target: bool,

    /// Include file and line number
    pub include_location: bool,

    /// Include thread id and name
    pub include_thread_ids: bool,
}

impl Default for LoggingConfig {
    /// INFO level, plain console output with targets
    fn default() -> Self {
        Self {
            level: Level::INFO,
            use_json: false,
            include_target: true,
            include_location: false,
            include_thread_ids: false,
        }
    }
}

impl LoggingConfig {
    pub fn with_level(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// JSON output with full location metadata, for build servers
    pub fn build_server() -> Self {
        Self {
            level: Level::INFO,
            use_json: true,
            include_target: true,
            include_location: true,
            include_thread_ids: false,
        }
    }

    /// Debug-level console output for investigating a scan
    pub fn verbose() -> Self {
        Self {
            level: Level::DEBUG,
            ..Default::default()
        }
    }

    fn filter(&self) -> EnvFilter {
        let mut filter = EnvFilter::from_default_env();
        if let Ok(directive) = format!("funcmeta={}", self.level).parse::<Directive>() {
            filter = filter.add_directive(directive);
        }
        if env::var("RUST_LOG").is_err() {
            for target in QUIET_TARGETS {
                if let Ok(directive) = format!("{}=warn", target).parse::<Directive>() {
                    filter = filter.add_directive(directive);
                }
            }
        }
        filter
    }
}

/// Parses a level name case-insensitively, falling back to INFO
///
/// ```
/// use funcmeta::util::logging::parse_level;
/// use tracing::Level;
///
/// assert_eq!(parse_level("Debug"), Level::DEBUG);
/// assert_eq!(parse_level("verbose"), Level::INFO);
/// ```
pub fn parse_level(level_str: &str) -> Level {
    match level_str.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => {
            eprintln!(
                "Invalid log level '{}', defaulting to INFO. Valid levels: trace, debug, info, warn, error",
                level_str
            );
            Level::INFO
        }
    }
}

/// Installs the global subscriber; later calls are ignored
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let filter = config.filter();
        let layer = fmt::layer()
            .with_target(config.include_target)
            .with_file(config.include_location)
            .with_line_number(config.include_location)
            .with_thread_ids(config.include_thread_ids)
            .with_thread_names(config.include_thread_ids);

        // try_init: an embedding host may already own the global subscriber
        let result = if config.use_json {
            tracing_subscriber::registry()
                .with(filter)
                .with(layer.json())
                .try_init()
        } else {
            tracing_subscriber::registry().with(filter).with(layer).try_init()
        };
        if let Err(e) = result {
            eprintln!("Logging already initialized: {}", e);
        }
    });
}

pub fn init_default() {
    init_logging(LoggingConfig::default());
}

/// Reads `FUNCMETA_LOG_LEVEL` and `FUNCMETA_LOG_JSON`
pub fn init_from_env() {
    init_logging(config_from_env());
}

pub fn with_level(level_str: &str) {
    init_logging(LoggingConfig::with_level(parse_level(level_str)));
}

fn config_from_env() -> LoggingConfig {
    let level = env::var("FUNCMETA_LOG_LEVEL")
        .map(|value| parse_level(&value))
        .unwrap_or(Level::INFO);
    let use_json = env::var("FUNCMETA_LOG_JSON")
        .ok()
        .and_then(|v| v.parse::<bool>().ok())
        .unwrap_or(false);

    LoggingConfig {
        level,
        use_json,
        ..Default::default()
    }
}
