//! Configuration for the `taskclock` CLI.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/taskclock/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use taskclock_proto::record::RecordId;
use taskclock_proto::task::MAX_TASK_NAME_CHARS;

use crate::remote::cloud::CloudSettings;
use crate::store::{DEFAULT_MAX_TASKS, StoreConfig};

/// User id used when none is configured.
pub const DEFAULT_USER_ID: &str = "default";

/// Errors that can occur when loading configuration.
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

    /// The cloud URL is not a usable WebSocket URL.
    #[error("invalid cloud url {url:?}: {reason}")]
    InvalidUrl {
        /// The rejected value.
        url: String,
        /// What is wrong with it.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    cloud: CloudFileConfig,
    tasks: TasksFileConfig,
}

/// `[cloud]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct CloudFileConfig {
    url: Option<String>,
    user_id: Option<String>,
    connect_timeout_secs: Option<u64>,
    request_timeout_secs: Option<u64>,
}

/// `[tasks]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct TasksFileConfig {
    max_tasks: Option<usize>,
    max_name_chars: Option<usize>,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    // -- Cloud --
    /// Record service WebSocket URL. `None` selects the in-memory remote.
    pub cloud_url: Option<String>,
    /// User whose record zone is used.
    pub user_id: String,
    /// Timeout for connecting and registering with the record service.
    pub connect_timeout: Duration,
    /// Bound on every individual remote call.
    pub request_timeout: Duration,

    // -- Tasks --
    /// Maximum number of tasks.
    pub max_tasks: usize,
    /// Maximum counted characters in a task name.
    pub max_name_chars: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            cloud_url: None,
            user_id: DEFAULT_USER_ID.to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
            max_tasks: DEFAULT_MAX_TASKS,
            max_name_chars: MAX_TASK_NAME_CHARS,
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read
    /// or parsed, or if the resolved cloud URL is invalid.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        let config = Self::resolve(cli, &file);
        if let Some(url) = &config.cloud_url {
            validate_cloud_url(url)?;
        }
        Ok(config)
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            cloud_url: cli.cloud_url.clone().or_else(|| file.cloud.url.clone()),
            user_id: cli
                .user
                .clone()
                .or_else(|| file.cloud.user_id.clone())
                .unwrap_or(defaults.user_id),
            connect_timeout: file
                .cloud
                .connect_timeout_secs
                .map_or(defaults.connect_timeout, Duration::from_secs),
            request_timeout: file
                .cloud
                .request_timeout_secs
                .map_or(defaults.request_timeout, Duration::from_secs),
            max_tasks: file.tasks.max_tasks.unwrap_or(defaults.max_tasks),
            max_name_chars: file
                .tasks
                .max_name_chars
                .unwrap_or(defaults.max_name_chars),
        }
    }

    /// Limits for the [`crate::store::TaskStore`].
    #[must_use]
    pub const fn store_config(&self) -> StoreConfig {
        StoreConfig {
            max_tasks: self.max_tasks,
            max_name_chars: self.max_name_chars,
            request_timeout: self.request_timeout,
        }
    }

    /// Connection settings for the cloud remote, if a URL is configured.
    #[must_use]
    pub fn cloud_settings(&self) -> Option<CloudSettings> {
        let url = self.cloud_url.clone()?;
        Some(CloudSettings {
            url,
            user_id: self.user_id.clone(),
            connect_timeout: self.connect_timeout,
            register_timeout: self.request_timeout,
        })
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Single-activation task list synced to a cloud record store")]
pub struct CliArgs {
    /// WebSocket URL of the cloud record service (in-memory remote if unset).
    #[arg(long, env = "TASKCLOCK_CLOUD_URL")]
    pub cloud_url: Option<String>,

    /// User whose record zone to use.
    #[arg(long, env = "TASKCLOCK_USER")]
    pub user: Option<String>,

    /// Path to config file (default: `~/.config/taskclock/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "TASKCLOCK_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/taskclock.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Print machine-readable JSON instead of text.
    #[arg(long)]
    pub json: bool,

    /// What to do.
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(clap::Subcommand, Debug, Clone, Default, PartialEq, Eq)]
pub enum Command {
    /// List all tasks.
    #[default]
    List,
    /// Create a task.
    Add {
        /// Task name.
        name: String,
    },
    /// Remove an inactive task.
    Remove {
        /// Task id.
        id: RecordId,
    },
    /// Activate a task, deactivating every other task.
    Activate {
        /// Task id.
        id: RecordId,
    },
    /// Deactivate a task.
    Deactivate {
        /// Task id.
        id: RecordId,
    },
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Check that `raw` parses as a `ws://` or `wss://` URL with a host.
fn validate_cloud_url(raw: &str) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidUrl {
        url: raw.to_string(),
        reason,
    };
    let parsed = url::Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    if !matches!(parsed.scheme(), "ws" | "wss") {
        return Err(invalid(format!(
            "scheme must be ws or wss, got {}",
            parsed.scheme()
        )));
    }
    if parsed.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    Ok(())
}

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    }

    let Some(config_dir) = dirs::config_dir() else {
        return Ok(ConfigFile::default());
    };
    let path = config_dir.join("taskclock").join("config.toml");

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
