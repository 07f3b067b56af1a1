//! Relational store seam for the order model.
//!
//! The [`OrderStore`] trait exposes exactly the statements the ingestion
//! pipeline and the read side need. Each method maps to one atomic statement
//! in the backing database; the trait never groups them into a transaction.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE cliente (
//!     id   BIGINT PRIMARY KEY,
//!     nome TEXT NOT NULL
//! );
//!
//! CREATE TABLE pedido (
//!     id          BIGSERIAL PRIMARY KEY,
//!     uuid        TEXT NOT NULL UNIQUE,
//!     cliente_id  BIGINT NOT NULL REFERENCES cliente (id),
//!     created_at  TIMESTAMPTZ NOT NULL,
//!     valor_total DOUBLE PRECISION NOT NULL
//! );
//!
//! CREATE TABLE item_do_pedido (
//!     id         BIGSERIAL PRIMARY KEY,
//!     pedido_id  BIGINT NOT NULL REFERENCES pedido (id),
//!     produto_id BIGINT NOT NULL,
//!     quantidade INTEGER NOT NULL
//! );
//! ```
//!
//! # Conflict Semantics
//!
//! | Operation                     | On conflict                                   |
//! |-------------------------------|-----------------------------------------------|
//! | `insert_customer_if_absent`   | no-op, returns `None` (name kept)             |
//! | `upsert_order`                | replace customer, timestamp, total by `uuid`  |
//! | `insert_line_item`            | never conflicts; always appends               |
//!
//! # Dyn Compatibility
//!
//! Methods return [`StoreFuture`] (a boxed future) so the store can be shared
//! as `Arc<dyn OrderStore>` between the message consumer and HTTP handlers.

use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached (pool exhausted, connection refused, closed pool).
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A statement violated a constraint not covered by a conflict clause.
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// A statement failed for any other reason.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// A result row could not be mapped to the expected shape.
    #[error("Row decode failed: {0}")]
    RowDecode(String),
}

/// Boxed future returned by [`OrderStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Customer to insert if absent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewCustomer {
    /// External customer id
    pub id: i64,
    /// Display name
    pub name: String,
}

/// Order to insert or replace, keyed by `uuid`.
#[derive(Clone, Debug, PartialEq)]
pub struct NewOrder {
    /// Order natural key
    pub uuid: String,
    /// Owning customer
    pub customer_id: i64,
    /// Upstream creation timestamp
    pub created_at: DateTime<Utc>,
    /// Total computed from the event
    pub total: f64,
}

/// Line item to append.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewLineItem {
    /// Internal (surrogate) key of the parent order
    pub order_id: i64,
    /// Validated product id
    pub product_id: i64,
    /// Number of units
    pub quantity: i32,
}

/// Conjunctive filters for [`OrderStore::query_orders`].
///
/// `None` imposes no constraint.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OrderFilter {
    /// Match the order natural key
    pub uuid: Option<String>,
    /// Match the owning customer
    pub customer_id: Option<i64>,
    /// Match orders containing at least one line item for this product
    pub product_id: Option<i64>,
}

impl OrderFilter {
    /// A filter matching every order.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Restrict to one order natural key.
    #[must_use]
    pub fn with_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.uuid = Some(uuid.into());
        self
    }

    /// Restrict to one customer.
    #[must_use]
    pub const fn with_customer_id(mut self, customer_id: i64) -> Self {
        self.customer_id = Some(customer_id);
        self
    }

    /// Restrict to orders containing a product.
    #[must_use]
    pub const fn with_product_id(mut self, product_id: i64) -> Self {
        self.product_id = Some(product_id);
        self
    }
}

/// One row of the denormalized order ⋈ customer ⋈ line item join.
///
/// Orders without line items appear once with `product_id` and `quantity`
/// set to `None` (outer join).
#[derive(Clone, Debug, PartialEq)]
pub struct OrderRow {
    /// Order surrogate key
    pub id: i64,
    /// Order natural key
    pub uuid: String,
    /// Owning customer
    pub customer_id: i64,
    /// Upstream creation timestamp
    pub created_at: DateTime<Utc>,
    /// Stored total
    pub total: f64,
    /// Customer display name
    pub customer_name: Option<String>,
    /// Line item product id
    pub product_id: Option<i64>,
    /// Line item quantity
    pub quantity: Option<i32>,
}

/// Store for customers, orders and line items.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; one instance is shared by every
/// concurrently running message handler and HTTP request.
pub trait OrderStore: Send + Sync {
    /// Insert the customer unless a row with the same id exists.
    ///
    /// Returns `Some(id)` when a row was inserted, `None` when it already existed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the statement fails.
    fn insert_customer_if_absent(&self, customer: &NewCustomer) -> StoreFuture<'_, Option<i64>>;

    /// Insert the order, or replace customer, timestamp and total of the order
    /// with the same `uuid`.
    ///
    /// Returns the order's surrogate key.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the statement fails (e.g. unknown customer).
    fn upsert_order(&self, order: &NewOrder) -> StoreFuture<'_, i64>;

    /// Append one line item.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the statement fails (e.g. unknown order).
    fn insert_line_item(&self, item: &NewLineItem) -> StoreFuture<'_, ()>;

    /// Run the denormalized order query once and return every row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the query fails. No partial results.
    fn query_orders(&self, filter: &OrderFilter) -> StoreFuture<'_, Vec<OrderRow>>;

    /// Check that the store is reachable.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if it is not.
    fn ping(&self) -> StoreFuture<'_, ()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_builder_sets_fields() {
        let filter = OrderFilter::all()
            .with_uuid("u1")
            .with_customer_id(7)
            .with_product_id(5);

        assert_eq!(filter.uuid.as_deref(), Some("u1"));
        assert_eq!(filter.customer_id, Some(7));
        assert_eq!(filter.product_id, Some(5));
    }

    #[test]
    fn default_filter_matches_all() {
        assert_eq!(OrderFilter::all(), OrderFilter::default());
        assert!(OrderFilter::all().uuid.is_none());
    }

    #[test]
    fn order_store_is_dyn_compatible() {
        fn assert_dyn(_: Option<&dyn OrderStore>) {}
        assert_dyn(None);
    }
}
