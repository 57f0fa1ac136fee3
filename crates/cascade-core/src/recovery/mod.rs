//! Recovery helpers for transient failures

pub mod retry;

pub use retry::{RetryPolicy, retry_for};
