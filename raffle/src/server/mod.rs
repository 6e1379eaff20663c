//! HTTP server module for the raffle platform.
//!
//! This module provides the Axum-based HTTP server with:
//! - Application state management
//! - Health check endpoints
//! - Router configuration
//! - Signal handling and job draining

pub mod health;
pub mod lifecycle;
pub mod routes;
pub mod state;

pub use health::health_check;
pub use lifecycle::{await_jobs, shutdown_signal};
pub use routes::build_router;
pub use state::{AppState, Integrations};
