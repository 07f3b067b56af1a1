//! Router configuration for the order ingestion service.

use super::state::AppState;
use crate::api::list_orders;
use axum::{Router, routing::get};
use order_ingest_web::handlers::{health_check, readiness};
use order_ingest_web::request_id_layer;
use tower_http::trace::TraceLayer;

/// Build the complete Axum router.
///
/// - `GET /health`: liveness
/// - `GET /health/ready`: store ping
/// - `GET /orders`: order query
///
/// Every request passes through the request id layer (outermost, so the id
/// is on the span before tracing starts) and `TraceLayer`.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/ready", get(readiness))
        .route("/orders", get(list_orders))
        .layer(TraceLayer::new_for_http())
        .layer(request_id_layer())
        .with_state(state)
}
