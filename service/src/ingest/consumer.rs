//! Order feed consumer with automatic resubscription.
//!
//! [`OrderConsumer`] owns the subscribe-process-reconnect loop:
//!
//! ```text
//! loop {
//!     subscribe (or stop on shutdown)
//!     loop {
//!         acquire in-flight permit
//!         next delivery → spawn handler task (permit released when it settles)
//!     }
//!     stream ended or subscribe failed → wait retry_delay → resubscribe
//! }
//! drain in-flight handlers
//! ```
//!
//! Handlers never wait on each other. The semaphore caps how many run at once,
//! so a slow store applies backpressure to the feed instead of piling up tasks.
//!
//! # Example
//!
//! ```rust,ignore
//! let consumer = OrderConsumer::builder()
//!     .name("orders")
//!     .subscription("orders")
//!     .feed(feed)
//!     .handler(Arc::new(OrderMessageHandler::new(store)))
//!     .shutdown(shutdown_tx.subscribe())
//!     .build()?;
//!
//! let handle = consumer.spawn();
//! ```

use super::{IngestError, OrderMessageHandler};
use futures::StreamExt;
use order_ingest_core::{DeliveryStream, MessageFeed};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Semaphore, broadcast};
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info, warn};

const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(5);
const DEFAULT_MAX_IN_FLIGHT: usize = 64;

/// Why [`OrderConsumer::process_stream`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamEnd {
    Shutdown,
    Ended,
}

/// Consumes the order feed and hands each delivery to an
/// [`OrderMessageHandler`] on its own task.
///
/// Runs until the shutdown channel fires (or its sender is dropped).
pub struct OrderConsumer {
    name: String,
    subscription: String,
    feed: Arc<dyn MessageFeed>,
    handler: Arc<OrderMessageHandler>,
    shutdown: broadcast::Receiver<()>,
    retry_delay: Duration,
    max_in_flight: usize,
}

impl OrderConsumer {
    /// Create a builder for configuring a consumer.
    #[must_use]
    pub fn builder() -> OrderConsumerBuilder {
        OrderConsumerBuilder::default()
    }

    /// Spawn the consumer as a background task.
    ///
    /// The returned handle completes after shutdown once every in-flight
    /// handler has settled its message.
    #[must_use]
    pub fn spawn(mut self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&mut self) {
        info!(
            consumer = %self.name,
            subscription = %self.subscription,
            max_in_flight = self.max_in_flight,
            "Order consumer started"
        );

        let permits = Arc::new(Semaphore::new(self.max_in_flight));
        let mut in_flight = JoinSet::new();

        loop {
            let subscribed = tokio::select! {
                _ = self.shutdown.recv() => {
                    info!(consumer = %self.name, "Order consumer received shutdown signal");
                    break;
                }
                result = self.feed.subscribe(&self.subscription) => result,
            };

            match subscribed {
                Ok(mut stream) => {
                    info!(consumer = %self.name, subscription = %self.subscription, "Subscribed to order feed");

                    let end = self.process_stream(&mut stream, &permits, &mut in_flight).await;
                    if end == StreamEnd::Shutdown {
                        info!(consumer = %self.name, "Order consumer received shutdown signal during processing");
                        break;
                    }

                    warn!(
                        consumer = %self.name,
                        "Order feed stream ended, resubscribing in {:?}",
                        self.retry_delay
                    );
                },
                Err(e) => {
                    error!(
                        consumer = %self.name,
                        error = %e,
                        "Failed to subscribe to order feed, retrying in {:?}",
                        self.retry_delay
                    );
                },
            }

            if !self.wait_before_retry().await {
                info!(consumer = %self.name, "Order consumer received shutdown signal while waiting to resubscribe");
                break;
            }
        }

        let pending = in_flight.len();
        if pending > 0 {
            info!(consumer = %self.name, pending, "Waiting for in-flight messages");
        }
        while let Some(joined) = in_flight.join_next().await {
            self.log_join(joined);
        }

        info!(consumer = %self.name, "Order consumer stopped");
    }

    async fn process_stream(
        &mut self,
        stream: &mut DeliveryStream,
        permits: &Arc<Semaphore>,
        in_flight: &mut JoinSet<()>,
    ) -> StreamEnd {
        loop {
            while let Some(joined) = in_flight.try_join_next() {
                self.log_join(joined);
            }

            let permit = tokio::select! {
                _ = self.shutdown.recv() => return StreamEnd::Shutdown,
                permit = Arc::clone(permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    // Only happens if the semaphore is closed, which this loop never does.
                    Err(_) => return StreamEnd::Shutdown,
                },
            };

            let next = tokio::select! {
                _ = self.shutdown.recv() => return StreamEnd::Shutdown,
                next = stream.next() => next,
            };

            match next {
                Some(Ok(delivery)) => {
                    let handler = Arc::clone(&self.handler);
                    let name = self.name.clone();
                    in_flight.spawn(async move {
                        let message_id = delivery.id().to_string();
                        if let Err(e) = handler.handle(delivery).await {
                            error!(
                                consumer = %name,
                                message_id = %message_id,
                                error = %e,
                                "Failed to settle message"
                            );
                        }
                        drop(permit);
                    });
                },
                Some(Err(e)) => {
                    error!(consumer = %self.name, error = %e, "Error receiving message from feed");
                },
                None => return StreamEnd::Ended,
            }
        }
    }

    /// Sleep for the retry delay. Returns `false` if shutdown arrived first.
    async fn wait_before_retry(&mut self) -> bool {
        tokio::select! {
            _ = self.shutdown.recv() => false,
            () = tokio::time::sleep(self.retry_delay) => true,
        }
    }

    fn log_join(&self, joined: Result<(), JoinError>) {
        if let Err(e) = joined {
            error!(consumer = %self.name, error = %e, "Message handler task failed");
        }
    }
}

/// Builder for [`OrderConsumer`].
#[derive(Default)]
pub struct OrderConsumerBuilder {
    name: Option<String>,
    subscription: Option<String>,
    feed: Option<Arc<dyn MessageFeed>>,
    handler: Option<Arc<OrderMessageHandler>>,
    shutdown: Option<broadcast::Receiver<()>>,
    retry_delay: Option<Duration>,
    max_in_flight: Option<usize>,
}

impl OrderConsumerBuilder {
    /// Set consumer name (for logging; default: the subscription).
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the subscription (topic) to consume.
    #[must_use]
    pub fn subscription(mut self, subscription: impl Into<String>) -> Self {
        self.subscription = Some(subscription.into());
        self
    }

    /// Set the message feed.
    #[must_use]
    pub fn feed(mut self, feed: Arc<dyn MessageFeed>) -> Self {
        self.feed = Some(feed);
        self
    }

    /// Set the message handler.
    #[must_use]
    pub fn handler(mut self, handler: Arc<OrderMessageHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Set shutdown signal receiver.
    #[must_use]
    pub fn shutdown(mut self, shutdown: broadcast::Receiver<()>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Set delay before resubscribing (default: 5 seconds).
    #[must_use]
    pub const fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    /// Set how many messages may be processed at once (default: 64, minimum 1).
    #[must_use]
    pub const fn max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = Some(max_in_flight);
        self
    }

    /// Build the [`OrderConsumer`].
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Misconfigured`] if the subscription, feed,
    /// handler or shutdown receiver is missing.
    pub fn build(self) -> Result<OrderConsumer, IngestError> {
        let subscription = self
            .subscription
            .ok_or(IngestError::Misconfigured("subscription"))?;

        Ok(OrderConsumer {
            name: self.name.unwrap_or_else(|| subscription.clone()),
            feed: self.feed.ok_or(IngestError::Misconfigured("feed"))?,
            handler: self.handler.ok_or(IngestError::Misconfigured("handler"))?,
            shutdown: self.shutdown.ok_or(IngestError::Misconfigured("shutdown"))?,
            retry_delay: self.retry_delay.unwrap_or(DEFAULT_RETRY_DELAY),
            max_in_flight: self.max_in_flight.unwrap_or(DEFAULT_MAX_IN_FLIGHT).max(1),
            subscription,
        })
    }
}
