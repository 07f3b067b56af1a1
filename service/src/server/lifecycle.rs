//! Application lifecycle and graceful shutdown.
//!
//! [`Application::run`] drives the whole service:
//!
//! 1. **Startup**: spawn the order consumer
//! 2. **Runtime**: serve HTTP while the consumer processes the feed
//! 3. **Shutdown** (Ctrl+C or SIGTERM):
//!    - HTTP server stops accepting connections and drains requests
//!    - shutdown is broadcast to the consumer
//!    - the consumer stops pulling and finishes in-flight messages, bounded by
//!      the shutdown timeout
//!    - the connection pool is closed

use crate::ingest::OrderConsumer;
use order_ingest_postgres::PostgresOrderStore;
use std::future::Future;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

/// Running application: HTTP server plus order consumer.
pub struct Application {
    listener: TcpListener,
    router: axum::Router,
    consumer: OrderConsumer,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_timeout: Duration,
    postgres: Option<PostgresOrderStore>,
}

impl Application {
    /// Create an application.
    ///
    /// `shutdown_tx` must be the sender whose receiver was given to `consumer`.
    #[must_use]
    pub const fn new(
        listener: TcpListener,
        router: axum::Router,
        consumer: OrderConsumer,
        shutdown_tx: broadcast::Sender<()>,
        shutdown_timeout: Duration,
    ) -> Self {
        Self {
            listener,
            router,
            consumer,
            shutdown_tx,
            shutdown_timeout,
            postgres: None,
        }
    }

    /// Close this store's pool once everything else has stopped.
    #[must_use]
    pub fn with_postgres(mut self, store: PostgresOrderStore) -> Self {
        self.postgres = Some(store);
        self
    }

    /// Run until Ctrl+C or SIGTERM, then shut down gracefully.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the HTTP server fails.
    pub async fn run(self) -> std::io::Result<()> {
        self.run_until(shutdown_signal()).await
    }

    /// Run until `signal` completes, then shut down gracefully.
    ///
    /// # Errors
    ///
    /// Returns the I/O error if the HTTP server fails.
    pub async fn run_until<F>(self, signal: F) -> std::io::Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Self {
            listener,
            router,
            consumer,
            shutdown_tx,
            shutdown_timeout,
            postgres,
        } = self;

        info!("Starting order consumer");
        let consumer_handle = consumer.spawn();

        match listener.local_addr() {
            Ok(address) => info!(%address, "HTTP server listening for requests"),
            Err(e) => warn!(error = %e, "HTTP server listening on unknown address"),
        }
        let served = axum::serve(listener, router)
            .with_graceful_shutdown(signal)
            .await;

        info!("HTTP server stopped, initiating graceful shutdown...");
        // No receiver left only if the consumer already exited.
        let _ = shutdown_tx.send(());

        match tokio::time::timeout(shutdown_timeout, consumer_handle).await {
            Ok(Ok(())) => info!("Order consumer stopped gracefully"),
            Ok(Err(e)) => warn!(error = %e, "Order consumer task failed"),
            Err(_) => warn!(
                timeout_secs = shutdown_timeout.as_secs(),
                "Order consumer shutdown timed out"
            ),
        }

        if let Some(store) = postgres {
            store.close().await;
            info!("Database pool closed");
        }

        if let Err(e) = &served {
            error!(error = %e, "HTTP server failed");
        }
        info!("Graceful shutdown complete");
        served
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// If a handler cannot be installed, that source is ignored.
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            },
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        () = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
