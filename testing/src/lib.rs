//! # Order Ingest Testing
//!
//! Testing utilities for the order ingestion pipeline.
//!
//! This crate provides:
//! - [`InMemoryOrderStore`]: an [`OrderStore`](order_ingest_core::OrderStore) honouring the
//!   same conflict semantics and outer-join shape as the Postgres store, with
//!   failure injection and a call log
//! - [`InMemoryMessageFeed`]: a [`MessageFeed`](order_ingest_core::MessageFeed) recording
//!   every ack/nack, optionally redelivering nacked messages
//! - [`OrderPayload`]: a builder for JSON order event payloads
//!
//! ## Example
//!
//! ```ignore
//! use order_ingest_testing::{InMemoryMessageFeed, InMemoryOrderStore, OrderPayload};
//!
//! #[tokio::test]
//! async fn test_ingest() {
//!     let store = Arc::new(InMemoryOrderStore::new());
//!     let feed = Arc::new(InMemoryMessageFeed::new());
//!
//!     feed.publish(OrderPayload::new("u1").item("5", 10.0, 2).to_bytes());
//!     // ... run the consumer ...
//!     assert_eq!(store.order_count(), 1);
//! }
//! ```

pub mod feed;
pub mod fixtures;
pub mod store;

// Re-export commonly used items
pub use feed::{InMemoryMessageFeed, Settlement};
pub use fixtures::OrderPayload;
pub use store::{InMemoryOrderStore, StoreOp, StoredOrder};
