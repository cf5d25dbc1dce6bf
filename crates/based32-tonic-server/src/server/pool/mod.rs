//! The fixed worker pool.
//!
//! - [`manager`] - pool construction, round-robin selection, shutdown.
//! - [`worker`] - the per-worker event loop.

pub mod manager;
pub mod worker;
