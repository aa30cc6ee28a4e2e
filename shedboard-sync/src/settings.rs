//! Injected pipeline settings
//!
//! The pipeline performs no file or environment access. Settings arrive
//! fully formed, usually built from a [`ShedboardConfig`] by the binary.

use crate::utils::RetryPolicy;
use chrono::{FixedOffset, Offset, Utc};
use shedboard_common::config::ShedboardConfig;
use shedboard_common::{Error, Result};
use std::time::Duration;

const USER_AGENT: &str = concat!("shedboard/", env!("CARGO_PKG_VERSION"));

/// Longest cache lifetime accepted
pub const MAX_CACHE_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Member login used against the upstream site
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Login behaviour
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub retry: RetryPolicy,
    /// Statuses the login POST returns on success despite not being 2xx/3xx
    pub tolerated_login_statuses: Vec<u16>,
    /// Case-insensitive text only present on logged-in pages
    pub logged_in_marker: String,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            tolerated_login_statuses: vec![500],
            logged_in_marker: "logout".to_string(),
        }
    }
}

/// Everything the pipeline needs to run
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Site root without trailing slash
    pub base_url: String,
    pub credentials: Credentials,
    pub cache_ttl: Duration,
    pub batch_size: usize,
    pub batch_delay: Duration,
    pub window_days: u32,
    pub request_timeout: Duration,
    pub auth: AuthSettings,
    /// Club-local offset used to decide which day the window starts on
    pub club_offset: FixedOffset,
    pub user_agent: String,
}

impl SyncSettings {
    /// Settings with defaults for everything but location and credentials
    pub fn new(base_url: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials: Credentials {
                username: username.into(),
                password: password.into(),
            },
            cache_ttl: Duration::from_secs(600),
            batch_size: 5,
            batch_delay: Duration::from_millis(500),
            window_days: 7,
            request_timeout: Duration::from_secs(15),
            auth: AuthSettings::default(),
            club_offset: utc(),
            user_agent: USER_AGENT.to_string(),
        }
    }

    /// Build settings from a loaded configuration file
    pub fn from_config(config: &ShedboardConfig) -> Result<Self> {
        let club_offset = config
            .club
            .utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                Error::Config(format!(
                    "club.utc_offset_minutes out of range: {}",
                    config.club.utc_offset_minutes
                ))
            })?;

        let mut settings = Self::new(
            config.upstream.base_url.clone(),
            config.upstream.username.clone(),
            config.upstream.password.clone(),
        );
        settings.cache_ttl = Duration::from_secs(config.cache.ttl_secs);
        settings.batch_size = config.fetch.batch_size;
        settings.batch_delay = Duration::from_millis(config.fetch.batch_delay_ms);
        settings.window_days = config.fetch.window_days;
        settings.request_timeout = Duration::from_secs(config.fetch.request_timeout_secs);
        settings.auth.retry.max_attempts = config.auth.max_attempts;
        settings.auth.retry.initial_backoff = Duration::from_millis(config.auth.backoff_ms);
        settings.auth.tolerated_login_statuses = config.auth.tolerated_login_statuses.clone();
        settings.auth.logged_in_marker = config.auth.logged_in_marker.clone();
        settings.club_offset = club_offset;

        settings.validate()?;
        Ok(settings)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(Error::Config("upstream base URL is empty".to_string()));
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "upstream base URL must be http(s): {}",
                self.base_url
            )));
        }
        if self.credentials.username.trim().is_empty() || self.credentials.password.is_empty() {
            return Err(Error::Config("upstream credentials are not configured".to_string()));
        }
        if self.cache_ttl > MAX_CACHE_TTL {
            return Err(Error::InvalidInput(format!(
                "cache TTL of {}s exceeds one year",
                self.cache_ttl.as_secs()
            )));
        }
        if self.batch_size == 0 {
            return Err(Error::InvalidInput("batch size must be at least 1".to_string()));
        }
        if self.window_days == 0 {
            return Err(Error::InvalidInput("booking window must be at least 1 day".to_string()));
        }
        if self.auth.logged_in_marker.trim().is_empty() {
            return Err(Error::Config("logged-in marker is empty".to_string()));
        }
        Ok(())
    }
}

fn utc() -> FixedOffset {
    Utc.fix()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(toml: &str) -> ShedboardConfig {
        ShedboardConfig::from_toml_str(toml).unwrap()
    }

    #[test]
    fn test_new_uses_defaults_and_trims_slash() {
        let settings = SyncSettings::new("https://club.example.org/", "u", "p");

        assert_eq!(settings.base_url, "https://club.example.org");
        assert_eq!(settings.cache_ttl, Duration::from_secs(600));
        assert_eq!(settings.batch_size, 5);
        assert_eq!(settings.batch_delay, Duration::from_millis(500));
        assert_eq!(settings.window_days, 7);
        assert_eq!(settings.auth.retry.max_attempts, 3);
        assert_eq!(settings.auth.tolerated_login_statuses, vec![500]);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_from_config() {
        let settings = SyncSettings::from_config(&config(
            r#"
            [upstream]
            base_url = "https://club.example.org"
            username = "captain"
            password = "secret"

            [cache]
            ttl_secs = 60

            [fetch]
            batch_size = 2
            batch_delay_ms = 250

            [club]
            utc_offset_minutes = 60
            "#,
        ))
        .unwrap();

        assert_eq!(settings.cache_ttl, Duration::from_secs(60));
        assert_eq!(settings.batch_size, 2);
        assert_eq!(settings.batch_delay, Duration::from_millis(250));
        assert_eq!(settings.club_offset.local_minus_utc(), 3600);
    }

    #[test]
    fn test_missing_credentials_rejected() {
        let result = SyncSettings::from_config(&config(
            "[upstream]\nbase_url = \"https://club.example.org\"\n",
        ));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut settings = SyncSettings::new("https://club.example.org", "u", "p");
        settings.batch_size = 0;
        assert!(matches!(settings.validate(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_absurd_cache_ttl_rejected() {
        let settings = SyncSettings::from_config(&config(
            r#"
            [upstream]
            base_url = "https://club.example.org"
            username = "captain"
            password = "secret"

            [cache]
            ttl_secs = 9223372036854775807
            "#,
        ));
        assert!(matches!(settings, Err(Error::InvalidInput(_))));

        let mut settings = SyncSettings::new("https://club.example.org", "u", "p");
        settings.cache_ttl = MAX_CACHE_TTL;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_non_http_base_url_rejected() {
        let settings = SyncSettings::new("ftp://club.example.org", "u", "p");
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_password() {
        let settings = SyncSettings::new("https://club.example.org", "u", "hunter2");
        let rendered = format!("{:?}", settings);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
