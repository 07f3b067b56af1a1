//! HTTP API handlers.

pub mod orders;

pub use orders::{OrdersQuery, QUERY_FAILED_MESSAGE, list_orders};
