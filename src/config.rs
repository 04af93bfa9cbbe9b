//! Configuration System
//!
//! Provides hierarchical configuration loading from:
//! - trealla.toml (default configuration)
//! - trealla.local.toml (git-ignored local overrides)
//! - Environment variables (TREALLA_* prefix)
//!
//! ## Example
//!
//! ```toml
//! # trealla.toml
//! [engine]
//! executable = "/usr/local/bin/tpl"
//! args = ["-q"]
//! read_timeout_ms = 500
//!
//! [logging]
//! level = "debug"
//! format = "json"
//! ```
//!
//! Environment variable overrides:
//! ```bash
//! TREALLA_ENGINE__EXECUTABLE=/opt/trealla/tpl
//! TREALLA_ENGINE__STARTUP_ATTEMPTS=4
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration struct
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How the engine subprocess is started and read from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Path or name of the Trealla toplevel binary
    #[serde(default = "default_executable")]
    pub executable: PathBuf,

    /// Extra command-line arguments passed to the engine
    #[serde(default)]
    pub args: Vec<String>,

    /// Timeout for a single read from the engine (milliseconds)
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Number of prompt waits tolerated during start-up
    #[serde(default = "default_startup_attempts")]
    pub startup_attempts: u32,

    /// Pseudo-terminal height
    #[serde(default = "default_pty_rows")]
    pub pty_rows: u16,

    /// Pseudo-terminal width; wide enough that result lines are not wrapped
    #[serde(default = "default_pty_cols")]
    pub pty_cols: u16,
}

impl EngineConfig {
    /// Engine settings for a specific executable, everything else default.
    pub fn for_executable(executable: impl Into<PathBuf>) -> Self {
        EngineConfig {
            executable: executable.into(),
            ..EngineConfig::default()
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_executable() -> PathBuf {
    PathBuf::from("tpl")
}
fn default_read_timeout_ms() -> u64 {
    1000
}
fn default_startup_attempts() -> u32 {
    2
}
fn default_pty_rows() -> u16 {
    24
}
fn default_pty_cols() -> u16 {
    200
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl Config {
    /// Load configuration from default locations
    ///
    /// Merges in order:
    /// 1. trealla.toml (base configuration)
    /// 2. trealla.local.toml (local overrides, git-ignored)
    /// 3. Environment variables (TREALLA_* prefix)
    pub fn load() -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file("trealla.toml"))
            .merge(Toml::file("trealla.local.toml"))
            .merge(Env::prefixed("TREALLA_").split("__"))
            .extract()
    }

    /// Load configuration from specific file path
    pub fn from_file(path: &str) -> Result<Self, figment::Error> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("TREALLA_").split("__"))
            .extract()
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            executable: default_executable(),
            args: Vec::new(),
            read_timeout_ms: default_read_timeout_ms(),
            startup_attempts: default_startup_attempts(),
            pty_rows: default_pty_rows(),
            pty_cols: default_pty_cols(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}
