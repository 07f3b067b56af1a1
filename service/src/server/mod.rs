//! HTTP server module for the order ingestion service.
//!
//! This module provides the Axum-based HTTP server with:
//! - Application state management
//! - Router configuration
//! - Application lifecycle and graceful shutdown

pub mod lifecycle;
pub mod routes;
pub mod state;

pub use lifecycle::Application;
pub use routes::build_router;
pub use state::AppState;
