//! Order ingestion: from a feed delivery to relational rows.
//!
//! - **`processor`**: the three-step upsert for one decoded event
//! - **`handler`**: per-message state machine deciding ack or nack
//! - **`consumer`**: subscribe-process-reconnect loop with bounded concurrency

pub mod consumer;
pub mod handler;
pub mod processor;

pub use consumer::{OrderConsumer, OrderConsumerBuilder};
pub use handler::{OrderMessageHandler, Outcome};
pub use processor::{OrderUpsertProcessor, ProcessReport};

use order_ingest_core::{DecodeError, FeedError, StoreError};
use thiserror::Error;

/// Errors raised while ingesting one message.
#[derive(Error, Debug)]
pub enum IngestError {
    /// Payload could not be decoded into an order event
    #[error("Failed to decode order event: {0}")]
    Decode(#[from] DecodeError),

    /// Customer, order or line item write failed
    #[error("Failed to persist order event: {0}")]
    Store(#[from] StoreError),

    /// The transport rejected the ack or nack
    #[error("Failed to settle message: {0}")]
    Settle(#[from] FeedError),

    /// Consumer built without a required component
    #[error("Consumer misconfigured: {0} is required")]
    Misconfigured(&'static str),
}

impl IngestError {
    /// Short label used as the `reason` metric tag.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode",
            Self::Store(_) => "store",
            Self::Settle(_) => "settle",
            Self::Misconfigured(_) => "config",
        }
    }
}
