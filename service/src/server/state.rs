//! Application state for the order ingestion HTTP server.
//!
//! Handlers extract only what they need through [`FromRef`]:
//! - `Arc<dyn OrderStore>` for the readiness probe
//! - `Arc<OrderQueryService>` for `/orders`

use crate::query::OrderQueryService;
use axum::extract::FromRef;
use order_ingest_core::OrderStore;
use std::sync::Arc;

/// Application state shared across all HTTP handlers.
///
/// Cloned (cheaply via Arc) for each request.
#[derive(Clone)]
pub struct AppState {
    /// Order store, shared with the consumer
    pub store: Arc<dyn OrderStore>,

    /// Read side built on the same store
    pub orders: Arc<OrderQueryService>,
}

impl AppState {
    /// Create the state over one shared store.
    #[must_use]
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        let orders = Arc::new(OrderQueryService::new(Arc::clone(&store)));
        Self { store, orders }
    }
}

impl FromRef<AppState> for Arc<dyn OrderStore> {
    fn from_ref(app_state: &AppState) -> Self {
        Arc::clone(&app_state.store)
    }
}

impl FromRef<AppState> for Arc<OrderQueryService> {
    fn from_ref(app_state: &AppState) -> Self {
        Arc::clone(&app_state.orders)
    }
}
