//! # Shedboard Common Library
//!
//! Shared code for the shedboard booking mirror:
//! - Error and result types
//! - Configuration loading (TOML file + environment overrides)
//! - Clock abstraction used for cache expiry

pub mod config;
pub mod error;
pub mod time;

pub use error::{Error, Result};
pub use time::{Clock, ManualClock, SystemClock};
