//! Redpanda message feed for order ingestion.
//!
//! This crate implements the [`MessageFeed`] trait from `order-ingest-core`
//! on top of rdkafka, so it works against Redpanda or any Kafka-compatible
//! broker.
//!
//! # Delivery Semantics
//!
//! **At-least-once delivery** with manual offset commits:
//! - Auto-commit is disabled; nothing is committed until the consumer settles
//! - `ack` commits the partition's low-water mark: the lowest offset that is
//!   still unsettled, so acknowledging out of order never commits past a
//!   message in flight
//! - `nack` pauses the partition, waits a backoff that doubles while the same
//!   partition keeps failing, then seeks back to the rejected offset and
//!   resumes
//! - Deliveries read ahead of a rejected offset are dropped unsettled and come
//!   back after the seek
//! - If the process dies before settling, everything after the last commit
//!   is redelivered
//!
//! Dead-letter topics belong to the broker deployment.
//!
//! # Example
//!
//! ```no_run
//! use order_ingest_redpanda::RedpandaMessageFeed;
//! use order_ingest_core::MessageFeed;
//! use futures::StreamExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let feed = RedpandaMessageFeed::builder()
//!     .brokers("localhost:9092")
//!     .consumer_group("marketing-sub")
//!     .build()?;
//!
//! let mut stream = feed.subscribe("orders").await?;
//! while let Some(result) = stream.next().await {
//!     let delivery = result?;
//!     println!("Received {} bytes", delivery.payload().len());
//!     delivery.ack()?;
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use order_ingest_core::message_feed::{
    Acknowledger, Delivery, DeliveryStream, FeedError, MessageFeed,
};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::util::Timeout;
use rdkafka::{Offset, TopicPartitionList};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

mod offsets;

use offsets::{AckOutcome, NackOutcome, OffsetTracker, redelivery_delay};

const DEFAULT_BUFFER_SIZE: usize = 1000;
const DEFAULT_AUTO_OFFSET_RESET: &str = "earliest";
const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(6);
const DEFAULT_SEEK_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_REDELIVERY_BACKOFF: Duration = Duration::from_millis(500);
const DEFAULT_MAX_REDELIVERY_BACKOFF: Duration = Duration::from_secs(30);

/// Redpanda-backed [`MessageFeed`].
///
/// Each call to [`MessageFeed::subscribe`] creates a dedicated consumer in
/// the configured consumer group, so several instances of the service share
/// the topic's partitions.
///
/// # Example
///
/// ```no_run
/// use order_ingest_redpanda::RedpandaMessageFeed;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let feed = RedpandaMessageFeed::new("localhost:9092", "marketing-sub")?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct RedpandaMessageFeed {
    brokers: String,
    consumer_group: String,
    buffer_size: usize,
    auto_offset_reset: String,
    session_timeout: Duration,
    seek_timeout: Duration,
    redelivery_backoff: Duration,
    max_redelivery_backoff: Duration,
}

impl RedpandaMessageFeed {
    /// Create a feed with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::ConnectionFailed`] if the configuration is invalid.
    pub fn new(brokers: &str, consumer_group: &str) -> Result<Self, FeedError> {
        Self::builder()
            .brokers(brokers)
            .consumer_group(consumer_group)
            .build()
    }

    /// Create a new builder for configuring the feed.
    #[must_use]
    pub fn builder() -> RedpandaMessageFeedBuilder {
        RedpandaMessageFeedBuilder::default()
    }

    /// Get a reference to the brokers string.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }

    /// Get the consumer group id.
    #[must_use]
    pub fn consumer_group(&self) -> &str {
        &self.consumer_group
    }

    fn consumer_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.brokers)
            .set("group.id", &self.consumer_group)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", &self.auto_offset_reset)
            .set(
                "session.timeout.ms",
                self.session_timeout.as_millis().to_string(),
            )
            .set("enable.partition.eof", "false");
        config
    }
}

/// Builder for configuring a [`RedpandaMessageFeed`].
///
/// # Example
///
/// ```no_run
/// use order_ingest_redpanda::RedpandaMessageFeed;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let feed = RedpandaMessageFeed::builder()
///     .brokers("localhost:9092,localhost:9093")
///     .consumer_group("marketing-sub")
///     .auto_offset_reset("latest")
///     .session_timeout(Duration::from_secs(10))
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Default, Debug)]
pub struct RedpandaMessageFeedBuilder {
    brokers: Option<String>,
    consumer_group: Option<String>,
    buffer_size: Option<usize>,
    auto_offset_reset: Option<String>,
    session_timeout: Option<Duration>,
    seek_timeout: Option<Duration>,
    redelivery_backoff: Option<Duration>,
    max_redelivery_backoff: Option<Duration>,
}

impl RedpandaMessageFeedBuilder {
    /// Set the broker addresses (comma-separated).
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Set the consumer group id.
    #[must_use]
    pub fn consumer_group(mut self, consumer_group: impl Into<String>) -> Self {
        self.consumer_group = Some(consumer_group.into());
        self
    }

    /// Set how many deliveries may be buffered ahead of the subscriber.
    ///
    /// Default: 1000. Zero is rejected by [`build`](Self::build).
    #[must_use]
    pub const fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = Some(buffer_size);
        self
    }

    /// Set where a new consumer group starts reading: `"earliest"`,
    /// `"latest"` or `"error"`.
    ///
    /// Default: `"earliest"`, so orders published before the first deploy are
    /// ingested.
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// Set the consumer group session timeout.
    ///
    /// Default: 6 seconds
    #[must_use]
    pub const fn session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = Some(timeout);
        self
    }

    /// Set how long a seek back to a rejected offset may take.
    ///
    /// Default: 5 seconds
    #[must_use]
    pub const fn seek_timeout(mut self, timeout: Duration) -> Self {
        self.seek_timeout = Some(timeout);
        self
    }

    /// Set the pause before the first redelivery of a rejected message.
    ///
    /// The pause doubles with each consecutive rejection on the same
    /// partition, up to [`max_redelivery_backoff`](Self::max_redelivery_backoff).
    ///
    /// Default: 500 milliseconds
    #[must_use]
    pub const fn redelivery_backoff(mut self, backoff: Duration) -> Self {
        self.redelivery_backoff = Some(backoff);
        self
    }

    /// Set the longest pause before a redelivery.
    ///
    /// Default: 30 seconds
    #[must_use]
    pub const fn max_redelivery_backoff(mut self, backoff: Duration) -> Self {
        self.max_redelivery_backoff = Some(backoff);
        self
    }

    /// Build the [`RedpandaMessageFeed`].
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::ConnectionFailed`] if:
    /// - Brokers or consumer group are not set
    /// - Buffer size is zero
    /// - The offset reset policy is unknown
    pub fn build(self) -> Result<RedpandaMessageFeed, FeedError> {
        let brokers = self
            .brokers
            .filter(|b| !b.trim().is_empty())
            .ok_or_else(|| FeedError::ConnectionFailed("Brokers not configured".to_string()))?;
        let consumer_group = self
            .consumer_group
            .filter(|g| !g.trim().is_empty())
            .ok_or_else(|| {
                FeedError::ConnectionFailed("Consumer group not configured".to_string())
            })?;

        let buffer_size = self.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE);
        if buffer_size == 0 {
            return Err(FeedError::ConnectionFailed(
                "buffer_size must be greater than 0".to_string(),
            ));
        }

        let auto_offset_reset = self
            .auto_offset_reset
            .unwrap_or_else(|| DEFAULT_AUTO_OFFSET_RESET.to_string());
        if !matches!(auto_offset_reset.as_str(), "earliest" | "latest" | "error") {
            return Err(FeedError::ConnectionFailed(format!(
                "Unknown auto.offset.reset policy: {auto_offset_reset}"
            )));
        }

        tracing::info!(
            brokers = %brokers,
            consumer_group = %consumer_group,
            buffer_size,
            auto_offset_reset = %auto_offset_reset,
            "RedpandaMessageFeed configured"
        );

        Ok(RedpandaMessageFeed {
            brokers,
            consumer_group,
            buffer_size,
            auto_offset_reset,
            session_timeout: self.session_timeout.unwrap_or(DEFAULT_SESSION_TIMEOUT),
            seek_timeout: self.seek_timeout.unwrap_or(DEFAULT_SEEK_TIMEOUT),
            redelivery_backoff: self.redelivery_backoff.unwrap_or(DEFAULT_REDELIVERY_BACKOFF),
            max_redelivery_backoff: self
                .max_redelivery_backoff
                .unwrap_or(DEFAULT_MAX_REDELIVERY_BACKOFF),
        })
    }
}

impl MessageFeed for RedpandaMessageFeed {
    fn subscribe(
        &self,
        subscription: &str,
    ) -> Pin<Box<dyn Future<Output = Result<DeliveryStream, FeedError>> + Send + '_>> {
        let topic = subscription.to_string();

        Box::pin(async move {
            let consumer: StreamConsumer = self.consumer_config().create().map_err(|e| {
                FeedError::SubscriptionFailed {
                    subscription: topic.clone(),
                    reason: format!("Failed to create consumer: {e}"),
                }
            })?;

            consumer
                .subscribe(&[topic.as_str()])
                .map_err(|e| FeedError::SubscriptionFailed {
                    subscription: topic.clone(),
                    reason: format!("Failed to subscribe to topic: {e}"),
                })?;

            tracing::info!(
                topic = %topic,
                consumer_group = %self.consumer_group,
                buffer_size = self.buffer_size,
                manual_commit = true,
                "Subscribed to topic"
            );

            let consumer = Arc::new(consumer);
            let offsets = Arc::new(Mutex::new(OffsetTracker::default()));
            let (tx, rx) = mpsc::channel(self.buffer_size);
            let (rewind_tx, rewind_rx) = mpsc::unbounded_channel();

            let forwarder = Forwarder {
                consumer,
                offsets: Arc::clone(&offsets),
                tx,
                rewind_tx,
                seek_timeout: self.seek_timeout,
                redelivery_backoff: self.redelivery_backoff,
                max_redelivery_backoff: self.max_redelivery_backoff,
            };
            tokio::spawn(forwarder.run(rewind_rx));

            let stream = async_stream::stream! {
                let mut rx = rx;
                while let Some(item) = rx.recv().await {
                    match item {
                        Ok(fetched) if !fetched.is_current(&offsets) => {
                            tracing::trace!(
                                message_id = %fetched.delivery.id(),
                                "Dropping delivery superseded by a rewind"
                            );
                        },
                        Ok(fetched) => yield Ok(fetched.delivery),
                        Err(e) => yield Err(e),
                    }
                }
            };

            Ok(Box::pin(stream) as DeliveryStream)
        })
    }
}

fn lock(offsets: &Mutex<OffsetTracker>) -> MutexGuard<'_, OffsetTracker> {
    offsets.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A delivery plus the partition position it was admitted at.
struct Fetched {
    topic: String,
    partition: i32,
    offset: i64,
    generation: u64,
    delivery: Delivery,
}

impl Fetched {
    fn is_current(&self, offsets: &Mutex<OffsetTracker>) -> bool {
        lock(offsets).is_current(&self.topic, self.partition, self.offset, self.generation)
    }
}

/// A rejected offset the partition must be rewound to.
#[derive(Debug)]
struct Rewind {
    topic: String,
    partition: i32,
    offset: i64,
    attempt: u32,
}

impl Rewind {
    fn same_partition(&self, other: &Self) -> bool {
        self.partition == other.partition && self.topic == other.topic
    }

    fn partition_list(&self) -> TopicPartitionList {
        let mut list = TopicPartitionList::new();
        list.add_partition(&self.topic, self.partition);
        list
    }
}

/// Queue a rewind. The lowest pending offset of a partition wins, so a
/// later seek never jumps past an earlier one.
fn schedule(scheduled: &mut Vec<(Instant, Rewind)>, at: Instant, rewind: Rewind) {
    if scheduled
        .iter()
        .any(|(_, pending)| pending.same_partition(&rewind) && pending.offset <= rewind.offset)
    {
        return;
    }
    scheduled.retain(|(_, pending)| !pending.same_partition(&rewind));
    scheduled.push((at, rewind));
}

/// Owns the consumer: reads messages ahead of the subscriber and carries out
/// rewinds requested by `nack`.
struct Forwarder {
    consumer: Arc<StreamConsumer>,
    offsets: Arc<Mutex<OffsetTracker>>,
    tx: mpsc::Sender<Result<Fetched, FeedError>>,
    rewind_tx: mpsc::UnboundedSender<Rewind>,
    seek_timeout: Duration,
    redelivery_backoff: Duration,
    max_redelivery_backoff: Duration,
}

impl Forwarder {
    async fn run(self, mut rewind_rx: mpsc::UnboundedReceiver<Rewind>) {
        use futures::StreamExt;

        let consumer = Arc::clone(&self.consumer);
        let mut stream = consumer.stream();
        let mut scheduled: Vec<(Instant, Rewind)> = Vec::new();

        loop {
            let next_due = scheduled.iter().map(|(at, _)| *at).min();

            tokio::select! {
                () = self.tx.closed() => break,
                Some(rewind) = rewind_rx.recv() => {
                    let delay = redelivery_delay(
                        self.redelivery_backoff,
                        self.max_redelivery_backoff,
                        rewind.attempt,
                    );
                    self.pause(&rewind, delay);
                    schedule(&mut scheduled, Instant::now() + delay, rewind);
                },
                () = tokio::time::sleep_until(next_due.unwrap_or_else(Instant::now)), if next_due.is_some() => {
                    let now = Instant::now();
                    let (due, waiting): (Vec<_>, Vec<_>) =
                        scheduled.drain(..).partition(|(at, _)| *at <= now);
                    scheduled = waiting;
                    for (_, rewind) in due {
                        if let Err(rewind) = self.seek(rewind).await {
                            schedule(&mut scheduled, now + self.redelivery_backoff, rewind);
                        }
                    }
                },
                next = stream.next() => {
                    let Some(msg_result) = next else {
                        break;
                    };
                    let item = match msg_result {
                        Ok(message) => match self.admit(&message) {
                            Some(fetched) => Ok(fetched),
                            None => continue,
                        },
                        Err(e) => Err(FeedError::TransportError(format!(
                            "Failed to receive message: {e}"
                        ))),
                    };
                    if self.tx.send(item).await.is_err() {
                        break;
                    }
                },
            }
        }

        tracing::debug!("Consumer task exiting");
    }

    fn admit(&self, message: &BorrowedMessage<'_>) -> Option<Fetched> {
        let topic = message.topic().to_string();
        let partition = message.partition();
        let offset = message.offset();

        let Some(generation) = lock(&self.offsets).admit(&topic, partition, offset) else {
            tracing::trace!(
                message_id = %message_id(&topic, partition, offset),
                "Skipping message read ahead of a rewind"
            );
            return None;
        };

        // An empty payload fails decoding and is nacked downstream.
        let payload = message.payload().map(<[u8]>::to_vec).unwrap_or_default();
        let acknowledger = KafkaAcknowledger {
            consumer: Arc::clone(&self.consumer),
            offsets: Arc::clone(&self.offsets),
            rewinds: self.rewind_tx.clone(),
            topic: topic.clone(),
            partition,
            offset,
            generation,
        };
        let id = acknowledger.message_id();

        tracing::trace!(message_id = %id, bytes = payload.len(), "Received message");
        Some(Fetched {
            topic,
            partition,
            offset,
            generation,
            delivery: Delivery::new(id, payload, Box::new(acknowledger)),
        })
    }

    fn pause(&self, rewind: &Rewind, delay: Duration) {
        tracing::debug!(
            topic = %rewind.topic,
            partition = rewind.partition,
            offset = rewind.offset,
            attempt = rewind.attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Pausing partition before redelivery"
        );
        if let Err(e) = self.consumer.pause(&rewind.partition_list()) {
            tracing::warn!(topic = %rewind.topic, partition = rewind.partition, error = %e, "Failed to pause partition");
        }
    }

    /// Seek back to the rejected offset and resume the partition.
    ///
    /// `seek` blocks on the broker, so it runs on the blocking pool. A failed
    /// seek hands the rewind back to be retried.
    async fn seek(&self, rewind: Rewind) -> Result<(), Rewind> {
        let consumer = Arc::clone(&self.consumer);
        let (topic, partition, offset) = (rewind.topic.clone(), rewind.partition, rewind.offset);
        let timeout = self.seek_timeout;

        let result = tokio::task::spawn_blocking(move || {
            consumer.seek(&topic, partition, Offset::Offset(offset), Timeout::After(timeout))
        })
        .await;

        match result {
            Ok(Ok(())) => {
                if let Err(e) = self.consumer.resume(&rewind.partition_list()) {
                    tracing::warn!(topic = %rewind.topic, partition, error = %e, "Failed to resume partition");
                }
                tracing::debug!(topic = %rewind.topic, partition, offset, "Rewound partition");
                Ok(())
            },
            Ok(Err(e)) => {
                tracing::warn!(topic = %rewind.topic, partition, offset, error = %e, "Failed to seek, retrying");
                Err(rewind)
            },
            Err(e) => {
                tracing::warn!(topic = %rewind.topic, partition, offset, error = %e, "Seek task failed, retrying");
                Err(rewind)
            },
        }
    }
}

/// Settles one Kafka message against its partition.
struct KafkaAcknowledger {
    consumer: Arc<StreamConsumer>,
    offsets: Arc<Mutex<OffsetTracker>>,
    rewinds: mpsc::UnboundedSender<Rewind>,
    topic: String,
    partition: i32,
    offset: i64,
    generation: u64,
}

impl KafkaAcknowledger {
    fn message_id(&self) -> String {
        message_id(&self.topic, self.partition, self.offset)
    }

    fn settle_error(&self, action: &str, reason: &dyn std::fmt::Display) -> FeedError {
        tracing::warn!(
            topic = %self.topic,
            partition = self.partition,
            offset = self.offset,
            error = %reason,
            "Failed to {action} message"
        );
        FeedError::SettleFailed {
            message_id: self.message_id(),
            reason: format!("{action} failed: {reason}"),
        }
    }
}

impl Acknowledger for KafkaAcknowledger {
    fn ack(self: Box<Self>) -> Result<(), FeedError> {
        let outcome = lock(&self.offsets).ack(&self.topic, self.partition, self.offset, self.generation);
        let position = match outcome {
            AckOutcome::Commit(position) => position,
            AckOutcome::Pending => return Ok(()),
            AckOutcome::Stale => {
                tracing::debug!(message_id = %self.message_id(), "Ack for superseded delivery ignored");
                return Ok(());
            },
        };

        let mut offsets = TopicPartitionList::new();
        offsets
            .add_partition_offset(&self.topic, self.partition, Offset::Offset(position))
            .map_err(|e| self.settle_error("commit", &e))?;
        self.consumer
            .commit(&offsets, CommitMode::Async)
            .map_err(|e| self.settle_error("commit", &e))
    }

    fn nack(self: Box<Self>) -> Result<(), FeedError> {
        let outcome = lock(&self.offsets).nack(&self.topic, self.partition, self.offset, self.generation);
        let NackOutcome::Rewind { attempt } = outcome else {
            tracing::debug!(message_id = %self.message_id(), "Nack for superseded delivery ignored");
            return Ok(());
        };

        self.rewinds
            .send(Rewind {
                topic: self.topic.clone(),
                partition: self.partition,
                offset: self.offset,
                attempt,
            })
            .map_err(|_| self.settle_error("rewind", &"consumer task stopped"))
    }
}

/// Delivery id: `topic/partition/offset`.
fn message_id(topic: &str, partition: i32, offset: i64) -> String {
    format!("{topic}/{partition}/{offset}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    struct Settling {
        consumer: Arc<StreamConsumer>,
        offsets: Arc<Mutex<OffsetTracker>>,
        rewinds: mpsc::UnboundedSender<Rewind>,
    }

    impl Settling {
        // Creating a consumer does not contact the broker.
        fn new(rewinds: mpsc::UnboundedSender<Rewind>) -> Self {
            let feed = RedpandaMessageFeed::new("127.0.0.1:1", "marketing-sub").unwrap();
            Self {
                consumer: Arc::new(feed.consumer_config().create().unwrap()),
                offsets: Arc::new(Mutex::new(OffsetTracker::default())),
                rewinds,
            }
        }

        fn deliver(&self, offset: i64) -> Box<KafkaAcknowledger> {
            let generation = lock(&self.offsets).admit("orders", 0, offset).unwrap();
            Box::new(KafkaAcknowledger {
                consumer: Arc::clone(&self.consumer),
                offsets: Arc::clone(&self.offsets),
                rewinds: self.rewinds.clone(),
                topic: "orders".to_string(),
                partition: 0,
                offset,
                generation,
            })
        }
    }

    fn rewind(partition: i32, offset: i64) -> Rewind {
        Rewind {
            topic: "orders".to_string(),
            partition,
            offset,
            attempt: 1,
        }
    }

    #[test]
    fn lowest_pending_rewind_per_partition_wins() {
        let now = Instant::now();
        let mut scheduled = Vec::new();

        schedule(&mut scheduled, now, rewind(0, 12));
        schedule(&mut scheduled, now, rewind(1, 40));
        schedule(&mut scheduled, now, rewind(0, 10));
        schedule(&mut scheduled, now, rewind(0, 11));

        let mut pending: Vec<_> = scheduled.iter().map(|(_, r)| (r.partition, r.offset)).collect();
        pending.sort_unstable();
        assert_eq!(pending, vec![(0, 10), (1, 40)]);
    }

    #[tokio::test]
    async fn nack_hands_rewind_to_forwarding_task() {
        let (rewind_tx, mut rewind_rx) = mpsc::unbounded_channel();
        let settling = Settling::new(rewind_tx);
        let rejected = settling.deliver(10);

        let started = std::time::Instant::now();
        rejected.nack().unwrap();
        assert!(started.elapsed() < DEFAULT_SEEK_TIMEOUT);

        let rewind = rewind_rx.try_recv().unwrap();
        assert_eq!((rewind.topic.as_str(), rewind.partition), ("orders", 0));
        assert_eq!((rewind.offset, rewind.attempt), (10, 1));
    }

    #[tokio::test]
    async fn settling_read_ahead_delivery_after_nack_is_ignored() {
        let (rewind_tx, mut rewind_rx) = mpsc::unbounded_channel();
        let settling = Settling::new(rewind_tx);
        let rejected = settling.deliver(10);
        let read_ahead = settling.deliver(11);
        let also_read_ahead = settling.deliver(12);

        rejected.nack().unwrap();
        assert!(read_ahead.ack().is_ok());
        assert!(also_read_ahead.nack().is_ok());

        assert_eq!(rewind_rx.try_recv().unwrap().offset, 10);
        assert!(rewind_rx.try_recv().is_err());
        assert!(!lock(&settling.offsets).is_current("orders", 0, 11, 0));
    }

    #[tokio::test]
    async fn nack_fails_once_forwarding_task_is_gone() {
        let (rewind_tx, rewind_rx) = mpsc::unbounded_channel();
        let settling = Settling::new(rewind_tx);
        let rejected = settling.deliver(10);
        drop(rewind_rx);

        let err = rejected.nack().err();
        assert!(matches!(
            err,
            Some(FeedError::SettleFailed { ref message_id, .. }) if message_id == "orders/0/10"
        ));
    }

    #[test]
    fn redpanda_message_feed_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<RedpandaMessageFeed>();
        assert_sync::<RedpandaMessageFeed>();
        assert_send::<KafkaAcknowledger>();
        assert_sync::<KafkaAcknowledger>();
    }

    #[test]
    fn builder_requires_brokers() {
        let err = RedpandaMessageFeed::builder()
            .consumer_group("marketing-sub")
            .build()
            .err();
        assert!(matches!(err, Some(FeedError::ConnectionFailed(_))));
    }

    #[test]
    fn builder_requires_consumer_group() {
        let err = RedpandaMessageFeed::builder()
            .brokers("localhost:9092")
            .consumer_group("  ")
            .build()
            .err();
        assert!(matches!(err, Some(FeedError::ConnectionFailed(_))));
    }

    #[test]
    fn builder_rejects_zero_buffer() {
        let err = RedpandaMessageFeed::builder()
            .brokers("localhost:9092")
            .consumer_group("marketing-sub")
            .buffer_size(0)
            .build()
            .err();
        assert!(matches!(err, Some(FeedError::ConnectionFailed(_))));
    }

    #[test]
    fn builder_rejects_unknown_offset_policy() {
        let err = RedpandaMessageFeed::builder()
            .brokers("localhost:9092")
            .consumer_group("marketing-sub")
            .auto_offset_reset("beginning")
            .build()
            .err();
        assert!(matches!(err, Some(FeedError::ConnectionFailed(_))));
    }

    #[test]
    fn new_applies_defaults() {
        let feed = RedpandaMessageFeed::new("localhost:9092", "marketing-sub");
        assert!(feed.is_ok());
        if let Ok(feed) = feed {
            assert_eq!(feed.brokers(), "localhost:9092");
            assert_eq!(feed.consumer_group(), "marketing-sub");
            assert_eq!(feed.buffer_size, DEFAULT_BUFFER_SIZE);
            assert_eq!(feed.auto_offset_reset, "earliest");

            let config = feed.consumer_config();
            assert_eq!(config.get("enable.auto.commit"), Some("false"));
            assert_eq!(config.get("session.timeout.ms"), Some("6000"));
        }
    }

    #[test]
    fn message_id_names_partition_and_offset() {
        assert_eq!(message_id("orders", 2, 41), "orders/2/41");
    }

    #[test]
    fn builder_applies_redelivery_backoff() {
        let feed = RedpandaMessageFeed::builder()
            .brokers("localhost:9092")
            .consumer_group("marketing-sub")
            .redelivery_backoff(Duration::from_secs(1))
            .max_redelivery_backoff(Duration::from_secs(8))
            .build();
        assert!(feed.is_ok());
        if let Ok(feed) = feed {
            assert_eq!(feed.redelivery_backoff, Duration::from_secs(1));
            assert_eq!(feed.max_redelivery_backoff, Duration::from_secs(8));
        }
    }

    #[test]
    fn rewind_targets_single_partition() {
        let rewind = Rewind {
            topic: "orders".to_string(),
            partition: 3,
            offset: 41,
            attempt: 1,
        };
        let list = rewind.partition_list();
        assert_eq!(list.count(), 1);
        assert!(list.find_partition("orders", 3).is_some());
    }
}
