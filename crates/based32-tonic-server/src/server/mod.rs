//! Server-side components of the based32 transcription service.
//!
//! This module contains the building blocks necessary to run the streaming
//! gRPC server: service logic, worker pool orchestration, stream dispatch,
//! and telemetry setup.
//!
//! ## Submodules
//!
//! - [`config`] - CLI/environment configuration and validation.
//! - [`pool`] - The fixed worker pool and its round-robin manager.
//! - [`service`] - The gRPC service implementation.
//! - [`streaming`] - Per-stream dispatch of requests onto the pool.
//! - [`telemetry`] - Structured logging initialization.
//!
//! These components are wired together in the server's `main.rs`.

pub mod config;
pub mod pool;
pub mod service;
pub mod streaming;
pub mod telemetry;
