//! Configuration loading and config file resolution
//!
//! The sync pipeline never reads files or the environment itself. This module
//! is the collaborator that turns a TOML file plus environment overrides into
//! a [`ShedboardConfig`], which the binary then hands to the pipeline.
//!
//! # Config file priority
//!
//! 1. Command-line argument (highest priority)
//! 2. `SHEDBOARD_CONFIG` environment variable
//! 3. `~/.config/shedboard/config.toml`
//! 4. `/etc/shedboard/config.toml`
//!
//! # Environment overrides
//!
//! `SHEDBOARD_BASE_URL`, `SHEDBOARD_USERNAME` and `SHEDBOARD_PASSWORD` take
//! precedence over the corresponding `[upstream]` values in the file.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const CONFIG_PATH_ENV: &str = "SHEDBOARD_CONFIG";
pub const BASE_URL_ENV: &str = "SHEDBOARD_BASE_URL";
pub const USERNAME_ENV: &str = "SHEDBOARD_USERNAME";
pub const PASSWORD_ENV: &str = "SHEDBOARD_PASSWORD";

/// Complete configuration file contents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShedboardConfig {
    pub upstream: UpstreamConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub club: ClubConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Upstream booking site location and credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// Site root, e.g. `https://club.example.org`
    pub base_url: String,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
        }
    }
}

/// Booking fetch pacing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Requests issued concurrently per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Pause between batches
    #[serde(default = "default_batch_delay_ms")]
    pub batch_delay_ms: u64,

    /// Forward booking window length
    #[serde(default = "default_window_days")]
    pub window_days: u32,

    /// Per-request timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_delay_ms: default_batch_delay_ms(),
            window_days: default_window_days(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Login behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_auth_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_auth_backoff_ms")]
    pub backoff_ms: u64,

    /// Non-success statuses the login POST may return even when it worked
    #[serde(default = "default_tolerated_login_statuses")]
    pub tolerated_login_statuses: Vec<u16>,

    /// Text that only appears on pages served to a logged-in member
    #[serde(default = "default_logged_in_marker")]
    pub logged_in_marker: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_auth_max_attempts(),
            backoff_ms: default_auth_backoff_ms(),
            tolerated_login_statuses: default_tolerated_login_statuses(),
            logged_in_marker: default_logged_in_marker(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClubConfig {
    /// Offset of the club's local time from UTC, used to decide "today"
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_ttl_secs() -> u64 {
    600
}

fn default_batch_size() -> usize {
    5
}

fn default_batch_delay_ms() -> u64 {
    500
}

fn default_window_days() -> u32 {
    7
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_auth_max_attempts() -> u32 {
    3
}

fn default_auth_backoff_ms() -> u64 {
    500
}

fn default_tolerated_login_statuses() -> Vec<u16> {
    vec![500]
}

fn default_logged_in_marker() -> String {
    "logout".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ShedboardConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Read and parse a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Apply overrides from an arbitrary key lookup
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base_url) = lookup(BASE_URL_ENV).filter(|v| !v.trim().is_empty()) {
            debug!("Base URL overridden from {}", BASE_URL_ENV);
            self.upstream.base_url = base_url;
        }
        if let Some(username) = lookup(USERNAME_ENV).filter(|v| !v.trim().is_empty()) {
            debug!("Username overridden from {}", USERNAME_ENV);
            self.upstream.username = username;
        }
        if let Some(password) = lookup(PASSWORD_ENV).filter(|v| !v.is_empty()) {
            debug!("Password overridden from {}", PASSWORD_ENV);
            self.upstream.password = password;
        }
    }

    /// Apply overrides from process environment variables
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }
}

/// Resolve which configuration file to load
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Result<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Ok(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }

    // Priority 3: User config directory
    if let Some(path) = dirs::config_dir().map(|d| d.join("shedboard").join("config.toml")) {
        if path.exists() {
            return Ok(path);
        }
    }

    // Priority 4: System-wide config
    let system_config = PathBuf::from("/etc/shedboard/config.toml");
    if system_config.exists() {
        return Ok(system_config);
    }

    Err(Error::Config(format!(
        "No config file found. Pass --config, set {}, or create ~/.config/shedboard/config.toml",
        CONFIG_PATH_ENV
    )))
}
