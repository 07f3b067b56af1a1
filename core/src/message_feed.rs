//! Message feed abstraction for at-least-once order delivery.
//!
//! This module provides the [`MessageFeed`] trait for subscribing to the
//! upstream order feed. Every message arrives as a [`Delivery`] that must be
//! settled exactly once, either with [`Delivery::ack`] (consumed, never
//! redelivered) or [`Delivery::nack`] (redelivery requested).
//!
//! # Key Principles
//!
//! - **At-least-once delivery**: a message may be delivered more than once
//! - **Settle once**: `ack`/`nack` consume the delivery, so a message cannot
//!   be settled twice
//! - **Transport owns redelivery**: backoff, ordering and dead-lettering are
//!   configured on the transport, never in the consumer
//!
//! # Implementations
//!
//! - `InMemoryMessageFeed` (`order-ingest-testing`) - for tests
//! - `RedpandaMessageFeed` (`order-ingest-redpanda`) - Kafka-compatible brokers
//!
//! # Example
//!
//! ```rust,ignore
//! use futures::StreamExt;
//!
//! let mut stream = feed.subscribe("orders").await?;
//! while let Some(result) = stream.next().await {
//!     let delivery = result?;
//!     match handle(delivery.payload()).await {
//!         Ok(()) => delivery.ack()?,
//!         Err(_) => delivery.nack()?,
//!     }
//! }
//! ```

use futures::Stream;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during message feed operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    /// Failed to connect to the transport
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to subscribe
    #[error("Subscription to '{subscription}' failed: {reason}")]
    SubscriptionFailed {
        /// The subscription (topic) that failed
        subscription: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to settle (ack or nack) a message
    #[error("Failed to settle message '{message_id}': {reason}")]
    SettleFailed {
        /// Transport-assigned message id
        message_id: String,
        /// The reason for failure
        reason: String,
    },

    /// Network or transport error while receiving
    #[error("Transport error: {0}")]
    TransportError(String),
}

/// Transport-specific settlement of one message.
///
/// Implemented by each transport; consumed by [`Delivery`].
pub trait Acknowledger: Send + Sync {
    /// Mark the message consumed.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::SettleFailed`] if the transport rejects the ack.
    fn ack(self: Box<Self>) -> Result<(), FeedError>;

    /// Request redelivery of the message.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::SettleFailed`] if the transport rejects the nack.
    fn nack(self: Box<Self>) -> Result<(), FeedError>;
}

/// One message received from the feed.
pub struct Delivery {
    id: String,
    payload: Vec<u8>,
    acknowledger: Box<dyn Acknowledger>,
}

impl Delivery {
    /// Create a delivery.
    #[must_use]
    pub fn new(id: impl Into<String>, payload: Vec<u8>, acknowledger: Box<dyn Acknowledger>) -> Self {
        Self {
            id: id.into(),
            payload,
            acknowledger,
        }
    }

    /// Transport-assigned message id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Raw message payload.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Acknowledge: the message is consumed and will not be redelivered.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::SettleFailed`] if the transport rejects the ack.
    pub fn ack(self) -> Result<(), FeedError> {
        self.acknowledger.ack()
    }

    /// Negative-acknowledge: ask the transport to redeliver the message.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::SettleFailed`] if the transport rejects the nack.
    pub fn nack(self) -> Result<(), FeedError> {
        self.acknowledger.nack()
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("id", &self.id)
            .field("payload_len", &self.payload.len())
            .finish_non_exhaustive()
    }
}

/// Stream of deliveries from a subscription.
pub type DeliveryStream = Pin<Box<dyn Stream<Item = Result<Delivery, FeedError>> + Send>>;

/// Trait for message feed implementations.
///
/// # Dyn Compatibility
///
/// Uses explicit `Pin<Box<dyn Future>>` returns so the feed can be held as
/// `Arc<dyn MessageFeed>` by the consumer.
pub trait MessageFeed: Send + Sync {
    /// Subscribe and receive a stream of deliveries.
    ///
    /// The stream ends when the subscription is closed by the transport.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::SubscriptionFailed`] if subscription fails.
    fn subscribe(
        &self,
        subscription: &str,
    ) -> Pin<Box<dyn Future<Output = Result<DeliveryStream, FeedError>> + Send + '_>>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Recorder(Arc<Mutex<Vec<&'static str>>>);

    impl Acknowledger for Recorder {
        fn ack(self: Box<Self>) -> Result<(), FeedError> {
            self.0.lock().unwrap().push("ack");
            Ok(())
        }

        fn nack(self: Box<Self>) -> Result<(), FeedError> {
            self.0.lock().unwrap().push("nack");
            Ok(())
        }
    }

    #[test]
    fn ack_and_nack_reach_the_transport() {
        let log = Arc::new(Mutex::new(Vec::new()));

        let first = Delivery::new("m-1", b"{}".to_vec(), Box::new(Recorder(Arc::clone(&log))));
        let second = Delivery::new("m-2", b"{}".to_vec(), Box::new(Recorder(Arc::clone(&log))));

        first.ack().unwrap();
        second.nack().unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["ack", "nack"]);
    }

    #[test]
    fn debug_omits_payload_bytes() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let delivery = Delivery::new("m-1", b"secret".to_vec(), Box::new(Recorder(log)));

        let rendered = format!("{delivery:?}");
        assert!(rendered.contains("m-1"));
        assert!(rendered.contains("payload_len: 6"));
        assert!(!rendered.contains("secret"));
    }

    #[test]
    fn delivery_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Delivery>();
    }
}
