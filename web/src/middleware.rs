//! Request id tracking.
//!
//! [`request_id_layer`] gives every request an id:
//!
//! 1. **Extract** the id from the `x-request-id` header, or generate a UUID v4
//!    when the header is missing or unusable
//! 2. **Store** it in request extensions as [`RequestId`]
//! 3. **Run** the inner service inside an `http_request` span carrying the id
//! 4. **Echo** it on the response `x-request-id` header
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, routing::get};
//! use order_ingest_web::middleware::{RequestId, request_id_layer};
//!
//! async fn handler(request_id: RequestId) -> String {
//!     format!("Request ID: {request_id}")
//! }
//!
//! let app = Router::new()
//!     .route("/orders", get(handler))
//!     .layer(request_id_layer());
//! ```

use axum::{
    async_trait,
    extract::{FromRequestParts, Request},
    http::{HeaderValue, StatusCode, request::Parts},
    response::Response,
};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::Instrument;
use uuid::Uuid;

/// Header carrying the request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

const MAX_REQUEST_ID_LEN: usize = 128;

/// Id of the current request, available to handlers as an extractor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(String);

impl RequestId {
    /// Accept a caller-supplied id if it is non-empty, at most 128 bytes and
    /// visible ASCII only.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        let usable = !raw.is_empty()
            && raw.len() <= MAX_REQUEST_ID_LEN
            && raw.bytes().all(|b| b.is_ascii_graphic());
        usable.then(|| Self(raw.to_string()))
    }

    /// Fresh random id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestId
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Self>().cloned().ok_or((
            StatusCode::INTERNAL_SERVER_ERROR,
            "request id layer not installed",
        ))
    }
}

/// Create the request id layer.
#[must_use]
pub const fn request_id_layer() -> RequestIdLayer {
    RequestIdLayer
}

/// Layer for request id tracking.
#[derive(Clone, Copy, Debug, Default)]
pub struct RequestIdLayer;

impl<S> Layer<S> for RequestIdLayer {
    type Service = RequestIdService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestIdService { inner }
    }
}

/// Service produced by [`RequestIdLayer`].
#[derive(Clone, Debug)]
pub struct RequestIdService<S> {
    inner: S,
}

impl<S> Service<Request> for RequestIdService<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let request_id = req
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(RequestId::parse)
            .unwrap_or_else(RequestId::generate);

        req.extensions_mut().insert(request_id.clone());

        let span = tracing::info_span!(
            "http_request",
            request_id = %request_id,
            method = %req.method(),
            uri = %req.uri(),
        );

        let fut = self.inner.call(req);

        Box::pin(async move {
            let mut response = fut.instrument(span).await?;

            if let Ok(value) = HeaderValue::from_str(request_id.as_str()) {
                response.headers_mut().insert(REQUEST_ID_HEADER, value);
            }

            Ok(response)
        })
    }
}
