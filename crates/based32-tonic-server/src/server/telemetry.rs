//! Telemetry and diagnostics initialization for the transcription service.
//!
//! Sets up structured logging using the `tracing` ecosystem: environment
//! based filtering (via `RUST_LOG`, defaulting to `info`) and thread
//! tagged output for tracing requests across the worker pool.

use tracing_subscriber::{EnvFilter, fmt};

/// Initializes the global `tracing` subscriber.
///
/// Call once at process start, before any task is spawned.
pub fn init_telemetry() {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .with_thread_ids(true)
        .init();
}
