//! Session configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default row count of the emulated terminal
pub const DEFAULT_ROWS: u16 = 24;

/// Default column count (width) of the emulated terminal
pub const DEFAULT_COLUMNS: u16 = 132;

/// Default bound on expectations and idle waits
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_millis(250);

/// Default quiet period before the terminal counts as idle
pub const DEFAULT_IDLE_DURATION: Duration = Duration::from_millis(100);

/// Default bound on the flush performed before every view check
pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_millis(25);

/// Environment variable consulted by [`Config::with_env_overrides`]
pub const DEBUG_ENV: &str = "TERMSCOPE_DEBUG";

/// Environment variable naming a config file for [`Config::load`]
pub const CONFIG_ENV: &str = "TERMSCOPE_CONFIG";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("terminal size must be non-zero, got {rows}x{columns}")]
    ZeroSize { rows: u16, columns: u16 },

    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),
}

/// Session configuration (config file format)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Terminal height in rows
    pub rows: u16,

    /// Terminal width in columns
    pub columns: u16,

    /// Bound on expectations and idle waits (ms)
    pub idle_timeout_ms: u64,

    /// Quiet period before the terminal counts as idle (ms)
    pub idle_duration_ms: u64,

    /// Bound on the flush before each view check (ms)
    pub flush_timeout_ms: u64,

    /// Also wire the process's stdin/stdout into the session
    pub pipe_from_os: bool,

    /// Trace every evaluated byte and every flush/contains call
    pub debug: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rows: DEFAULT_ROWS,
            columns: DEFAULT_COLUMNS,
            idle_timeout_ms: DEFAULT_IDLE_TIMEOUT.as_millis() as u64,
            idle_duration_ms: DEFAULT_IDLE_DURATION.as_millis() as u64,
            flush_timeout_ms: DEFAULT_FLUSH_TIMEOUT.as_millis() as u64,
            pipe_from_os: false,
            debug: false,
        }
    }
}

impl Config {
    /// Load configuration from `$TERMSCOPE_CONFIG` or `./termscope.toml`,
    /// falling back to defaults
    pub fn load() -> Self {
        let config_paths = [
            std::env::var_os(CONFIG_ENV).map(PathBuf::from),
            Some(PathBuf::from("termscope.toml")),
        ];

        for path in config_paths.into_iter().flatten() {
            if !path.exists() {
                continue;
            }
            match Self::load_from(&path) {
                Ok(config) => {
                    tracing::info!(?path, rows = config.rows, columns = config.columns, "loaded configuration");
                    return config;
                }
                Err(e) => {
                    tracing::warn!(?path, error = %e, "ignoring config file");
                }
            }
        }

        tracing::debug!("using default configuration");
        Self::default()
    }

    /// Load and validate configuration from a TOML file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides, read once at the call site
    ///
    /// Only `TERMSCOPE_DEBUG` is consulted. Unparseable values are logged and
    /// ignored.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(value) = std::env::var_os(DEBUG_ENV) {
            let value = value.to_string_lossy();
            match parse_bool(&value) {
                Some(debug) => self.debug = debug,
                None => tracing::warn!(var = DEBUG_ENV, %value, "not a boolean, ignoring"),
            }
        }
        self
    }

    /// Reject configurations no session can run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rows == 0 || self.columns == 0 {
            return Err(ConfigError::ZeroSize {
                rows: self.rows,
                columns: self.columns,
            });
        }
        if self.idle_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout("idle_timeout_ms"));
        }
        if self.idle_duration_ms == 0 {
            return Err(ConfigError::ZeroTimeout("idle_duration_ms"));
        }
        if self.flush_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout("flush_timeout_ms"));
        }
        Ok(())
    }

    pub fn with_size(mut self, rows: u16, columns: u16) -> Self {
        self.rows = rows;
        self.columns = columns;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_idle_duration(mut self, duration: Duration) -> Self {
        self.idle_duration_ms = duration.as_millis() as u64;
        self
    }

    pub fn with_flush_timeout(mut self, timeout: Duration) -> Self {
        self.flush_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn idle_duration(&self) -> Duration {
        Duration::from_millis(self.idle_duration_ms)
    }

    pub fn flush_timeout(&self) -> Duration {
        Duration::from_millis(self.flush_timeout_ms)
    }
}

/// Boolean spellings accepted for environment toggles
fn parse_bool(value: &str) -> Option<bool> {
    match value.trim() {
        "1" | "t" | "T" | "true" | "TRUE" | "True" | "yes" | "on" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" | "no" | "off" => Some(false),
        _ => None,
    }
}
