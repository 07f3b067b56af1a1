//! # Order Ingest Core
//!
//! Core types and seams for the order ingestion pipeline.
//!
//! This crate owns no I/O. It defines:
//!
//! - **[`order`]**: the decoded order event schema, validated at decode time
//! - **[`store`]**: the [`OrderStore`](store::OrderStore) seam over the relational model
//! - **[`message_feed`]**: the [`MessageFeed`](message_feed::MessageFeed) seam over the
//!   at-least-once transport, with its acknowledge/negative-acknowledge contract
//!
//! ## Data Flow
//!
//! ```text
//! ┌──────────────┐    ┌───────────────────┐    ┌─────────────────┐
//! │ MessageFeed  │───▶│ OrderEvent::decode │───▶│   OrderStore    │
//! │ (Delivery)   │    │ (schema check)     │    │ customer/order/ │
//! └──────┬───────┘    └───────────────────┘    │ line items      │
//!        │ ack / nack                            └────────┬────────┘
//!        ▼                                                │
//!    transport                                 query_orders (flat rows)
//! ```
//!
//! Implementations live in sibling crates:
//! - `order-ingest-postgres`: `PostgresOrderStore`
//! - `order-ingest-redpanda`: `RedpandaMessageFeed`
//! - `order-ingest-testing`: in-memory doubles of both seams

// Re-export commonly used types
pub use chrono::{DateTime, Utc};

pub mod message_feed;
pub mod order;
pub mod store;

pub use message_feed::{Acknowledger, Delivery, DeliveryStream, FeedError, MessageFeed};
pub use order::{CustomerPayload, DecodeError, ItemPayload, OrderEvent, SkuPayload, ValidationError};
pub use store::{
    NewCustomer, NewLineItem, NewOrder, OrderFilter, OrderRow, OrderStore, StoreError, StoreFuture,
};
