//! Server-side wiring for the serial service.
//!
//! ## Modules
//!
//! - [`config`] - CLI/environment configuration (`CliArgs`, `ServerConfig`).
//! - [`service`] - axum routes and error mapping.
//! - [`telemetry`] - logging, optional OpenTelemetry export and metrics.

pub mod config;
pub mod service;
pub mod telemetry;
