//! # Resilience
//!
//! Retry with exponential backoff for calls to the remote compute backend.

pub mod retry;

pub use retry::{AttemptError, RetryFailure, RetryPolicy};
