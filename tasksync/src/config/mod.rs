//! Configuration for the `tasksync` engine and demo.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/tasksync/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use crate::api::ApiConfig;
use crate::generator::GeneratorConfig;
use crate::history::DEFAULT_HISTORY_CAPACITY;

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

    /// A resolved value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    external: ExternalFileConfig,
    api: ApiFileConfig,
    history: HistoryFileConfig,
    demo: DemoFileConfig,
}

/// `[external]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ExternalFileConfig {
    min_interval_ms: Option<u64>,
    max_interval_ms: Option<u64>,
    actors: Option<Vec<String>>,
}

/// `[api]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ApiFileConfig {
    latency_ms: Option<u64>,
    failure_rate: Option<f64>,
}

/// `[history]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct HistoryFileConfig {
    capacity: Option<usize>,
}

/// `[demo]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct DemoFileConfig {
    seed: Option<u64>,
    duration_secs: Option<u64>,
    user_edit_interval_ms: Option<u64>,
    notification_buffer: Option<usize>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Fully resolved configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// External actor timing and names.
    pub generator: GeneratorConfig,
    /// Simulated backing call latency and failure rate.
    pub api: ApiConfig,
    /// Number of undoable actions kept.
    pub history_capacity: usize,
    /// RNG seed for reproducible runs; `None` seeds from the OS.
    pub seed: Option<u64>,
    /// How long the demo runs.
    pub duration: Duration,
    /// Delay between simulated user edits in the demo.
    pub user_edit_interval: Duration,
    /// Capacity of the notification channel.
    pub notification_buffer: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            generator: GeneratorConfig::default(),
            api: ApiConfig::default(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            seed: None,
            duration: Duration::from_secs(90),
            user_edit_interval: Duration::from_secs(4),
            notification_buffer: 64,
        }
    }
}

impl SyncConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an error.
    /// Otherwise the default path (`~/.config/tasksync/config.toml`) is
    /// tried and silently ignored if missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file cannot be read or parsed,
    /// or if a resolved value is out of range.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        let config = Self::resolve(cli, &file);
        config.validate()?;
        Ok(config)
    }

    /// Resolve a `SyncConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    #[must_use]
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            generator: GeneratorConfig {
                min_interval: file
                    .external
                    .min_interval_ms
                    .map_or(defaults.generator.min_interval, Duration::from_millis),
                max_interval: file
                    .external
                    .max_interval_ms
                    .map_or(defaults.generator.max_interval, Duration::from_millis),
                actors: file
                    .external
                    .actors
                    .clone()
                    .unwrap_or(defaults.generator.actors),
            },
            api: ApiConfig {
                latency: file
                    .api
                    .latency_ms
                    .map_or(defaults.api.latency, Duration::from_millis),
                failure_rate: cli
                    .failure_rate
                    .or(file.api.failure_rate)
                    .unwrap_or(defaults.api.failure_rate),
            },
            history_capacity: file.history.capacity.unwrap_or(defaults.history_capacity),
            seed: cli.seed.or(file.demo.seed),
            duration: cli
                .duration_secs
                .or(file.demo.duration_secs)
                .map_or(defaults.duration, Duration::from_secs),
            user_edit_interval: file
                .demo
                .user_edit_interval_ms
                .map_or(defaults.user_edit_interval, Duration::from_millis),
            notification_buffer: file
                .demo
                .notification_buffer
                .unwrap_or(defaults.notification_buffer),
        }
    }

    /// Checks that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.generator.min_interval > self.generator.max_interval {
            return Err(ConfigError::Invalid(format!(
                "external.min_interval_ms ({}) exceeds external.max_interval_ms ({})",
                self.generator.min_interval.as_millis(),
                self.generator.max_interval.as_millis()
            )));
        }
        if self.generator.actors.is_empty() {
            return Err(ConfigError::Invalid(
                "external.actors must name at least one actor".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.api.failure_rate) {
            return Err(ConfigError::Invalid(format!(
                "api.failure_rate must be within 0.0..=1.0, got {}",
                self.api.failure_rate
            )));
        }
        if self.history_capacity == 0 {
            return Err(ConfigError::Invalid(
                "history.capacity must be at least 1".to_string(),
            ));
        }
        if self.notification_buffer == 0 {
            return Err(ConfigError::Invalid(
                "demo.notification_buffer must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Optimistic task board sync simulation")]
pub struct CliArgs {
    /// Path to config file (default: `~/.config/tasksync/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// RNG seed for a reproducible run.
    #[arg(long, env = "TASKSYNC_SEED")]
    pub seed: Option<u64>,

    /// How long to run the demo, in seconds.
    #[arg(long)]
    pub duration_secs: Option<u64>,

    /// Probability that a simulated backing call fails.
    #[arg(long)]
    pub failure_rate: Option<f64>,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "TASKSYNC_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/tasksync.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ConfigFile::default());
        };
        config_dir.join("tasksync").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
