//! Core deterministic primitives.
//!
//! Everything puzzle generation depends on lives here. Nothing in this
//! module reads the clock or any other ambient source, except `now_millis`
//! which the network layer uses to stamp records.

pub mod rng;

// Re-export core types
pub use rng::{DeterministicRng, derive_module_seed, seed_from_str};

/// Current wall-clock time in Unix milliseconds.
///
/// Only the network layer calls this; the state machine takes `now`
/// as a parameter so it stays a pure function.
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
