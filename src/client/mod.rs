//! # Compute Backend Client

pub mod r_worker;

pub use r_worker::{unwrap_envelope, RWorkerClient};
