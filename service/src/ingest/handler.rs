//! Per-message handling.
//!
//! Each delivery moves through
//!
//! ```text
//! RECEIVED → DECODING → PROCESSING → ACKNOWLEDGED
//!                │            │
//!                └────────────┴────→ REJECTED
//! ```
//!
//! A rejected message is negatively acknowledged so the transport redelivers
//! it. Redelivery policy (backoff, dead-lettering) is the transport's concern.

use super::{IngestError, OrderUpsertProcessor, ProcessReport};
use order_ingest_core::{Delivery, OrderEvent, OrderStore};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

/// Terminal state of one message.
#[derive(Debug)]
pub enum Outcome {
    /// Processed and acknowledged
    Acknowledged(ProcessReport),
    /// Decoding or processing failed; negatively acknowledged
    Rejected(IngestError),
}

impl Outcome {
    /// Whether the message was acknowledged.
    #[must_use]
    pub const fn is_acknowledged(&self) -> bool {
        matches!(self, Self::Acknowledged(_))
    }
}

/// Decodes, processes and settles deliveries.
#[derive(Clone)]
pub struct OrderMessageHandler {
    processor: OrderUpsertProcessor,
}

impl OrderMessageHandler {
    /// Create a handler writing to `store`.
    #[must_use]
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self {
            processor: OrderUpsertProcessor::new(store),
        }
    }

    /// Handle one delivery and settle it exactly once.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Settle`] only when the transport rejects the ack
    /// or nack. Decode and store failures are reported as
    /// [`Outcome::Rejected`].
    pub async fn handle(&self, delivery: Delivery) -> Result<Outcome, IngestError> {
        let started = Instant::now();
        let message_id = delivery.id().to_string();

        let event = match OrderEvent::decode(delivery.payload()) {
            Ok(event) => event,
            Err(e) => {
                warn!(message_id = %message_id, error = %e, "Rejecting undecodable message");
                return Self::reject(delivery, e.into());
            },
        };

        match self.processor.process(&event).await {
            Ok(report) => {
                delivery.ack()?;
                metrics::counter!("order_ingest.messages.acked").increment(1);
                metrics::histogram!("order_ingest.process.duration")
                    .record(started.elapsed().as_secs_f64());
                debug!(
                    message_id = %message_id,
                    uuid = %event.uuid,
                    customer_id = report.customer_id,
                    items_inserted = report.items_inserted,
                    items_skipped = report.items_skipped,
                    "Message acknowledged"
                );
                Ok(Outcome::Acknowledged(report))
            },
            Err(e) => {
                error!(
                    message_id = %message_id,
                    uuid = %event.uuid,
                    customer_id = event.customer.id,
                    error = %e,
                    "Failed to persist order, rejecting message"
                );
                Self::reject(delivery, e.into())
            },
        }
    }

    fn reject(delivery: Delivery, cause: IngestError) -> Result<Outcome, IngestError> {
        delivery.nack()?;
        metrics::counter!("order_ingest.messages.nacked", "reason" => cause.reason()).increment(1);
        Ok(Outcome::Rejected(cause))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use order_ingest_core::{MessageFeed, StoreError};
    use order_ingest_testing::{
        InMemoryMessageFeed, InMemoryOrderStore, OrderPayload, Settlement, StoreOp,
    };

    async fn deliver(feed: &InMemoryMessageFeed, payload: Vec<u8>) -> Delivery {
        feed.publish(payload);
        let mut stream = feed.subscribe("orders").await.unwrap();
        stream.next().await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn valid_message_is_acknowledged() {
        let store = InMemoryOrderStore::new();
        let feed = InMemoryMessageFeed::new();
        let handler = OrderMessageHandler::new(Arc::new(store.clone()));

        let delivery = deliver(&feed, OrderPayload::new("u1").item("5", 10.0, 2).to_bytes()).await;
        let outcome = handler.handle(delivery).await.unwrap();

        assert!(outcome.is_acknowledged());
        assert_eq!(feed.settlements(), vec![("msg-1".to_string(), Settlement::Acked)]);
        assert_eq!(store.order_count(), 1);
    }

    #[tokio::test]
    async fn undecodable_message_is_rejected_without_store_access() {
        let store = InMemoryOrderStore::new();
        let feed = InMemoryMessageFeed::new();
        let handler = OrderMessageHandler::new(Arc::new(store.clone()));

        let delivery = deliver(&feed, b"not json".to_vec()).await;
        let outcome = handler.handle(delivery).await.unwrap();

        assert!(matches!(outcome, Outcome::Rejected(IngestError::Decode(_))));
        assert_eq!(feed.nacked(), vec!["msg-1".to_string()]);
        assert!(store.calls().is_empty());
    }

    #[tokio::test]
    async fn store_failure_is_rejected() {
        let store = InMemoryOrderStore::new();
        store.fail_on(StoreOp::InsertCustomer, StoreError::Unavailable("down".into()));
        let feed = InMemoryMessageFeed::new();
        let handler = OrderMessageHandler::new(Arc::new(store.clone()));

        let delivery = deliver(&feed, OrderPayload::new("u1").to_bytes()).await;
        let outcome = handler.handle(delivery).await.unwrap();

        match outcome {
            Outcome::Rejected(e) => assert_eq!(e.reason(), "store"),
            Outcome::Acknowledged(_) => panic!("store failure must not be acknowledged"),
        }
        assert_eq!(feed.nacked(), vec!["msg-1".to_string()]);
        assert_eq!(store.order_count(), 0);
    }
}
