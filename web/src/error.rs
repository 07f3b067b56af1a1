//! Error type for web handlers.
//!
//! [`AppError`] carries a status code and a fixed, user-facing message. The
//! underlying cause is logged on server errors and never written to the
//! response body.

use axum::{
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use std::fmt;

/// Application error type for web handlers.
///
/// Responses are `text/plain` with the error message as the whole body.
///
/// # Examples
///
/// ```ignore
/// async fn handler(State(store): State<Arc<dyn OrderStore>>) -> Result<String, AppError> {
///     let rows = store.query_orders(&OrderFilter::all()).await.map_err(|e| {
///         AppError::internal("Erro ao consultar pedidos").with_source(e.into())
///     })?;
///     Ok(rows.len().to_string())
/// }
/// ```
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    /// Internal error (for logging, not exposed to client)
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub const fn new(status: StatusCode, message: String) -> Self {
        Self {
            status,
            message,
            source: None,
        }
    }

    /// Attach the underlying cause.
    #[must_use]
    pub fn with_source(mut self, source: anyhow::Error) -> Self {
        self.source = Some(source);
        self
    }

    /// Create a 400 Bad Request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message.into())
    }

    /// Create a 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message.into())
    }

    /// Create a 503 Service Unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message.into())
    }

    /// HTTP status of this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// User-facing message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.status.as_u16(), self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            match &self.source {
                Some(source) => tracing::error!(
                    status = %self.status,
                    message = %self.message,
                    error = %source,
                    "Request failed"
                ),
                None => tracing::error!(
                    status = %self.status,
                    message = %self.message,
                    "Request failed"
                ),
            }
        } else {
            tracing::debug!(status = %self.status, message = %self.message, "Request rejected");
        }

        (
            self.status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.message,
        )
            .into_response()
    }
}

/// Convert `anyhow::Error` to `AppError`.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("Internal server error").with_source(err)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use order_ingest_core::StoreError;

    #[test]
    fn test_error_display() {
        let err = AppError::bad_request("cliente_id must be an integer");
        assert_eq!(err.to_string(), "[400] cliente_id must be an integer");
    }

    #[test]
    fn test_store_error_kept_as_source() {
        use std::error::Error as _;

        let err = AppError::internal("Erro ao consultar pedidos")
            .with_source(StoreError::QueryFailed("boom".into()).into());
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.source().is_some());
    }

    #[tokio::test]
    async fn test_body_is_plain_message_without_cause() {
        let response = AppError::internal("Erro ao consultar pedidos")
            .with_source(anyhow::anyhow!("relation \"pedido\" does not exist"))
            .into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"Erro ao consultar pedidos");
    }
}
