//! # Order Ingest Service
//!
//! Consumes order events from the feed, upserts them into the relational
//! store, and serves the denormalized order view over HTTP.
//!
//! ```text
//! ┌──────────────┐   ┌───────────────────┐   ┌───────────────┐
//! │ MessageFeed  │──▶│ OrderConsumer     │──▶│               │
//! │ (Redpanda)   │◀──│  handler: ack/nack│   │  OrderStore   │
//! └──────────────┘   └───────────────────┘   │  (Postgres)   │
//!                    ┌───────────────────┐   │               │
//!   GET /orders ────▶│ OrderQueryService │──▶│               │
//!                    └───────────────────┘   └───────────────┘
//! ```
//!
//! Modules:
//! - [`config`]: environment configuration
//! - [`ingest`]: processor, per-message handler, consumer loop
//! - [`query`]: row folding for the read side
//! - [`api`]: HTTP handlers
//! - [`server`]: router, state, lifecycle
//! - [`metrics`]: metric descriptions and the Prometheus exporter

pub mod api;
pub mod config;
pub mod ingest;
pub mod metrics;
pub mod query;
pub mod server;

pub use config::Config;
pub use ingest::{IngestError, OrderConsumer, OrderMessageHandler, OrderUpsertProcessor};
pub use query::{OrderQueryService, OrderView};
pub use server::{AppState, Application, build_router};
