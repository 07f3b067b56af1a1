//! Axum integration for the order ingestion service.
//!
//! The HTTP surface is a thin shell around the order store:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │           HTTP shell (Axum)             │  ← request ids, tracing
//! │  - Query string parsing                 │  ← plain-text errors
//! │  - JSON serialization                   │  ← health / readiness
//! ├─────────────────────────────────────────┤
//! │           Order store (core)            │
//! │  - Flat outer-join rows                 │  ← Postgres or in-memory
//! └─────────────────────────────────────────┘
//! ```
//!
//! This crate holds the pieces every router in the service shares:
//! - [`AppError`]: fixed user-facing messages, causes logged server-side
//! - [`handlers::health_check`] and [`handlers::readiness`]
//! - [`middleware::request_id_layer`] and the [`RequestId`] extractor

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod handlers;
pub mod middleware;

// Re-export key types for convenience
pub use error::AppError;
pub use middleware::{REQUEST_ID_HEADER, RequestId, request_id_layer};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
