//! Configuration loading for APM services
//!
//! Bootstrap configuration is resolved in priority order:
//! 1. Command-line argument (highest priority, handled by each binary)
//! 2. Environment variable (handled by each binary via clap `env`)
//! 3. TOML config file
//! 4. Compiled defaults (fallback)
//!
//! A missing TOML file at the default location is not an error: the service
//! logs a warning and starts with compiled defaults.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Default HTTP port for the session service
pub const DEFAULT_PORT: u16 = 5760;

/// Default classifier/store base address, tried after any explicit overrides
pub const DEFAULT_SERVICE_URL: &str = "http://127.0.0.1:5000";

/// Bootstrap configuration loaded from a TOML file
///
/// Every field is optional so that a partial file only overrides what it names.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// HTTP server port
    #[serde(default)]
    pub port: Option<u16>,

    /// Ordered classifier base addresses (overrides, tried before the default)
    #[serde(default)]
    pub classifier_urls: Vec<String>,

    /// Report store base address (defaults to the resolved classifier base)
    #[serde(default)]
    pub store_url: Option<String>,

    /// Doctor identity attached to persisted reports
    #[serde(default)]
    pub doctor_id: Option<String>,

    /// Per-candidate liveness probe timeout
    #[serde(default)]
    pub probe_timeout_ms: Option<u64>,

    /// Classifier request timeout
    #[serde(default)]
    pub classify_timeout_ms: Option<u64>,

    /// Report persistence timeout
    #[serde(default)]
    pub save_timeout_ms: Option<u64>,

    /// Fusion weights and conflict threshold
    #[serde(default)]
    pub fusion: FusionConfig,

    /// Pacing delays for timed steps
    #[serde(default)]
    pub timing: TimingConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// `[fusion]` table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FusionConfig {
    pub eeg_weight: Option<f64>,
    pub biometric_weight: Option<f64>,
    pub conflict_gap_threshold: Option<f64>,
}

/// `[timing]` table, all values in milliseconds
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimingConfig {
    pub connect_ms: Option<u64>,
    pub analyzing_ms: Option<u64>,
    pub fuse_ms: Option<u64>,
}

/// `[logging]` table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Platform config path for a module: `<config_dir>/apm/<module>.toml`
pub fn default_config_path(module_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("apm").join(format!("{}.toml", module_name)))
}

/// Read and parse a TOML configuration file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read config file {}: {}", path.display(), e)))?;

    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse TOML {}: {}", path.display(), e)))
}

/// Load the module's TOML configuration with graceful degradation
///
/// An explicitly named file must exist and parse. The default location may be
/// absent, in which case compiled defaults are used.
pub fn load_or_default(explicit: Option<&Path>, module_name: &str) -> Result<TomlConfig> {
    if let Some(path) = explicit {
        let config = load_toml_config(path)?;
        info!("Loaded TOML configuration from {}", path.display());
        return Ok(config);
    }

    match default_config_path(module_name) {
        Some(path) if path.exists() => {
            let config = load_toml_config(&path)?;
            info!("Loaded TOML configuration from {}", path.display());
            Ok(config)
        }
        Some(path) => {
            warn!(
                "No config file at {}, using compiled defaults",
                path.display()
            );
            Ok(TomlConfig::default())
        }
        None => {
            warn!("Could not determine config directory, using compiled defaults");
            Ok(TomlConfig::default())
        }
    }
}

/// Write a TOML configuration file, creating parent directories as needed
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Failed to serialize TOML: {}", e)))?;
    std::fs::write(path, content)?;
    Ok(())
}
