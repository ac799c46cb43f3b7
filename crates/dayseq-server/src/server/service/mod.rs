//! HTTP surface of the serial allocator.
//!
//! ## Structure
//!
//! - [`handler`] - axum router, shared state and route handlers.
//! - [`error`] - mapping of allocation failures to HTTP responses.

pub mod error;
pub mod handler;
