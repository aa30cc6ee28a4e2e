//! Test Helper Utilities
//!
//! Shared utilities for testing shedboard-sync against a fake upstream

#![allow(dead_code)]

pub mod fake_upstream;

pub use fake_upstream::{spawn, CsrfStyle, FakeConfig, FakeUpstream, PASSWORD, USERNAME};

use shedboard_sync::SyncSettings;
use std::time::Duration;

/// Settings pointed at a fake upstream, tuned so failures surface quickly
pub fn test_settings(base_url: &str) -> SyncSettings {
    let mut settings = SyncSettings::new(base_url, USERNAME, PASSWORD);
    settings.batch_delay = Duration::from_millis(10);
    settings.request_timeout = Duration::from_millis(500);
    settings.auth.retry.initial_backoff = Duration::from_millis(10);
    settings.auth.retry.max_backoff = Duration::from_millis(50);
    settings
}

/// Route pipeline logs to the test harness output; safe to call repeatedly
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shedboard_sync=debug".into()),
        )
        .with_test_writer()
        .try_init();
}
