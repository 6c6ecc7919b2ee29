//! Configuration for the `taskclock-cloud` record service.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/taskclock-cloud/config.toml`)
//! 4. Compiled defaults

use std::path::PathBuf;

use crate::server::DEFAULT_MAX_FRAME_SIZE;
use crate::store::DEFAULT_MAX_RECORDS_PER_USER;

/// Errors that can occur when loading service configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct CloudConfigFile {
    server: ServerFileConfig,
}

/// `[server]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ServerFileConfig {
    bind_addr: Option<String>,
    max_frame_size: Option<usize>,
    max_records_per_user: Option<usize>,
}

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// CLI arguments for the record service.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Per-user record service for TaskClock")]
pub struct CloudCliArgs {
    /// Address to bind the service to.
    #[arg(short, long, env = "TASKCLOCK_CLOUD_ADDR")]
    pub bind: Option<String>,

    /// Path to config file (default: `~/.config/taskclock-cloud/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Maximum accepted frame size in bytes.
    #[arg(long)]
    pub max_frame_size: Option<usize>,

    /// Maximum number of records per user zone.
    #[arg(long)]
    pub max_records_per_user: Option<usize>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "TASKCLOCK_CLOUD_LOG")]
    pub log_level: String,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved service configuration.
#[derive(Debug, Clone)]
pub struct CloudConfig {
    /// Address to bind the service to (e.g., `0.0.0.0:9100`).
    pub bind_addr: String,
    /// Maximum accepted frame size in bytes.
    pub max_frame_size: usize,
    /// Maximum number of records per user zone.
    pub max_records_per_user: usize,
    /// Log level filter string.
    pub log_level: String,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:9100".to_string(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_records_per_user: DEFAULT_MAX_RECORDS_PER_USER,
            log_level: "info".to_string(),
        }
    }
}

impl CloudConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// If no `--config` is given, the default path is tried and missing file
    /// is treated as empty config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed.
    pub fn load(cli: &CloudCliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Resolve a `CloudConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    fn resolve(cli: &CloudCliArgs, file: &CloudConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            bind_addr: cli
                .bind
                .clone()
                .or_else(|| file.server.bind_addr.clone())
                .unwrap_or(defaults.bind_addr),
            max_frame_size: cli
                .max_frame_size
                .or(file.server.max_frame_size)
                .unwrap_or(defaults.max_frame_size),
            max_records_per_user: cli
                .max_records_per_user
                .or(file.server.max_records_per_user)
                .unwrap_or(defaults.max_records_per_user),
            log_level: cli.log_level.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse the service's TOML config file.
fn load_config_file(
    explicit_path: Option<&std::path::Path>,
) -> Result<CloudConfigFile, ConfigError> {
    if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    }

    let Some(config_dir) = dirs::config_dir() else {
        return Ok(CloudConfigFile::default());
    };
    let path = config_dir.join("taskclock-cloud").join("config.toml");

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(CloudConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
