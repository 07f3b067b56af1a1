//! In-memory message feed.
//!
//! Messages published with [`InMemoryMessageFeed::publish`] are delivered to
//! the (single) active subscription in publish order. Every settlement is
//! recorded so tests can assert on acknowledge/negative-acknowledge outcomes.
//! With [`InMemoryMessageFeed::with_redelivery`], a nacked message is put back
//! on the feed under the same id, emulating transport redelivery.

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Lock poisoning only happens after a test already panicked

use order_ingest_core::message_feed::{
    Acknowledger, Delivery, DeliveryStream, FeedError, MessageFeed,
};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// How a delivery was settled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Settlement {
    /// `ack()` was called
    Acked,
    /// `nack()` was called
    Nacked,
}

type Message = (String, Vec<u8>);

#[derive(Debug)]
struct FeedState {
    sender: mpsc::UnboundedSender<Message>,
    receiver: Option<mpsc::UnboundedReceiver<Message>>,
    settlements: Vec<(String, Settlement)>,
    published: usize,
    redeliver_on_nack: bool,
}

/// In-memory [`MessageFeed`] for testing consumers.
///
/// Only one subscription may be active at a time; a second `subscribe` while
/// the first stream is alive fails with [`FeedError::SubscriptionFailed`].
///
/// # Example
///
/// ```
/// use order_ingest_testing::InMemoryMessageFeed;
///
/// let feed = InMemoryMessageFeed::new();
/// let id = feed.publish(b"{}".to_vec());
/// assert_eq!(id, "msg-1");
/// assert!(feed.acked().is_empty());
/// ```
#[derive(Clone, Debug)]
pub struct InMemoryMessageFeed {
    state: Arc<Mutex<FeedState>>,
}

impl InMemoryMessageFeed {
    /// Create an empty feed.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            state: Arc::new(Mutex::new(FeedState {
                sender,
                receiver: Some(receiver),
                settlements: Vec::new(),
                published: 0,
                redeliver_on_nack: false,
            })),
        }
    }

    /// Redeliver nacked messages under their original id.
    #[must_use]
    pub fn with_redelivery(self) -> Self {
        self.state.lock().unwrap().redeliver_on_nack = true;
        self
    }

    /// Publish a payload; returns the assigned message id (`msg-<n>`).
    pub fn publish(&self, payload: impl Into<Vec<u8>>) -> String {
        let mut state = self.state.lock().unwrap();
        state.published += 1;
        let id = format!("msg-{}", state.published);
        // The receiver lives in the feed or in the subscription stream.
        let _ = state.sender.send((id.clone(), payload.into()));
        id
    }

    /// Every settlement so far, in settlement order.
    #[must_use]
    pub fn settlements(&self) -> Vec<(String, Settlement)> {
        self.state.lock().unwrap().settlements.clone()
    }

    /// Ids of acknowledged messages.
    #[must_use]
    pub fn acked(&self) -> Vec<String> {
        self.ids_with(Settlement::Acked)
    }

    /// Ids of negatively acknowledged messages.
    #[must_use]
    pub fn nacked(&self) -> Vec<String> {
        self.ids_with(Settlement::Nacked)
    }

    /// Poll until at least `count` settlements are recorded or `timeout` elapses.
    ///
    /// Returns whether the count was reached.
    pub async fn wait_for_settlements(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.state.lock().unwrap().settlements.len() >= count {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn ids_with(&self, settlement: Settlement) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .settlements
            .iter()
            .filter(|(_, s)| *s == settlement)
            .map(|(id, _)| id.clone())
            .collect()
    }
}

impl Default for InMemoryMessageFeed {
    fn default() -> Self {
        Self::new()
    }
}

struct InMemoryAcknowledger {
    id: String,
    payload: Vec<u8>,
    state: Arc<Mutex<FeedState>>,
}

impl Acknowledger for InMemoryAcknowledger {
    fn ack(self: Box<Self>) -> Result<(), FeedError> {
        self.state
            .lock()
            .unwrap()
            .settlements
            .push((self.id, Settlement::Acked));
        Ok(())
    }

    fn nack(self: Box<Self>) -> Result<(), FeedError> {
        let mut state = self.state.lock().unwrap();
        state.settlements.push((self.id.clone(), Settlement::Nacked));
        if state.redeliver_on_nack {
            let _ = state.sender.send((self.id, self.payload));
        }
        Ok(())
    }
}

impl MessageFeed for InMemoryMessageFeed {
    fn subscribe(
        &self,
        subscription: &str,
    ) -> Pin<Box<dyn Future<Output = Result<DeliveryStream, FeedError>> + Send + '_>> {
        let subscription = subscription.to_string();
        Box::pin(async move {
            let receiver = self.state.lock().unwrap().receiver.take().ok_or_else(|| {
                FeedError::SubscriptionFailed {
                    subscription: subscription.clone(),
                    reason: "already subscribed".to_string(),
                }
            })?;
            let state = Arc::clone(&self.state);

            let stream = async_stream::stream! {
                let mut receiver = receiver;
                while let Some((id, payload)) = receiver.recv().await {
                    let acknowledger = InMemoryAcknowledger {
                        id: id.clone(),
                        payload: payload.clone(),
                        state: Arc::clone(&state),
                    };
                    yield Ok::<_, FeedError>(Delivery::new(id, payload, Box::new(acknowledger)));
                }
            };

            Ok(Box::pin(stream) as DeliveryStream)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn delivers_in_publish_order_and_records_settlements() {
        let feed = InMemoryMessageFeed::new();
        feed.publish(b"one".to_vec());
        feed.publish(b"two".to_vec());

        let mut stream = feed.subscribe("orders").await.unwrap();

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.payload(), b"one");
        first.ack().unwrap();

        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.id(), "msg-2");
        second.nack().unwrap();

        assert_eq!(feed.acked(), vec!["msg-1".to_string()]);
        assert_eq!(feed.nacked(), vec!["msg-2".to_string()]);
    }

    #[tokio::test]
    async fn nack_redelivers_when_enabled() {
        let feed = InMemoryMessageFeed::new().with_redelivery();
        feed.publish(b"payload".to_vec());

        let mut stream = feed.subscribe("orders").await.unwrap();
        stream.next().await.unwrap().unwrap().nack().unwrap();

        let again = stream.next().await.unwrap().unwrap();
        assert_eq!(again.id(), "msg-1");
        assert_eq!(again.payload(), b"payload");
    }

    #[tokio::test]
    async fn second_subscription_is_rejected() {
        let feed = InMemoryMessageFeed::new();
        let _stream = feed.subscribe("orders").await.unwrap();

        let err = feed.subscribe("orders").await.err().unwrap();
        assert!(matches!(err, FeedError::SubscriptionFailed { .. }));
    }
}
