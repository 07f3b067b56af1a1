//! Health check endpoints.
//!
//! These endpoints are used by load balancers and orchestrators to verify
//! service health.

use crate::error::AppError;
use axum::{extract::State, http::StatusCode};
use order_ingest_core::OrderStore;
use std::sync::Arc;

/// Liveness check.
///
/// Returns 200 OK while the process is serving requests. Does NOT check the
/// database.
///
/// # Endpoint
///
/// ```text
/// GET /health
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Readiness check: pings the order store.
///
/// # Status Codes
///
/// - 200 OK: the store answered
/// - 503 Service Unavailable: the store is unreachable or failing
///
/// # Endpoint
///
/// ```text
/// GET /health/ready
/// ```
///
/// # Errors
///
/// Returns a 503 [`AppError`] if the store ping fails.
pub async fn readiness(
    State(store): State<Arc<dyn OrderStore>>,
) -> Result<(StatusCode, &'static str), AppError> {
    store
        .ping()
        .await
        .map_err(|e| AppError::unavailable("not ready").with_source(e.into()))?;
    Ok((StatusCode::OK, "ready"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::response::IntoResponse;
    use order_ingest_core::StoreError;
    use order_ingest_testing::{InMemoryOrderStore, StoreOp};

    #[tokio::test]
    async fn test_simple_health_check() {
        let (status, body) = health_check().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn test_readiness_with_healthy_store() {
        let store: Arc<dyn OrderStore> = Arc::new(InMemoryOrderStore::new());

        let (status, body) = readiness(State(store)).await.unwrap();

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ready");
    }

    #[tokio::test]
    async fn test_readiness_with_failing_store() {
        let memory = InMemoryOrderStore::new();
        memory.fail_on(StoreOp::Ping, StoreError::Unavailable("connection refused".into()));
        let store: Arc<dyn OrderStore> = Arc::new(memory);

        let response = readiness(State(store)).await.into_response();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
