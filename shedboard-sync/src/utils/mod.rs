//! Utility modules

pub mod html;
pub mod retry;

pub use retry::{retry_with_backoff, RetryPolicy};
