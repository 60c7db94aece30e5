//! # Messaging
//!
//! Queue adapters the worker loop consumes requests from and publishes responses to.

pub mod queue;

pub use queue::{InMemoryQueue, JsonLinesQueue, MessageQueue};
