//! Folding flat join rows into nested order views.

use chrono::{DateTime, Utc};
use order_ingest_core::{OrderFilter, OrderRow, OrderStore, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// One order as returned by `GET /orders`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderView {
    /// Internal order id
    pub id: i64,
    /// Order natural key
    pub uuid: String,
    /// Owning customer
    #[serde(rename = "cliente_id")]
    pub customer_id: i64,
    /// Upstream creation timestamp
    pub created_at: DateTime<Utc>,
    /// Stored total
    #[serde(rename = "valor_total")]
    pub total: f64,
    /// Customer display name
    #[serde(rename = "cliente_nome")]
    pub customer_name: Option<String>,
    /// Line items, in row order
    #[serde(rename = "itens")]
    pub items: Vec<ItemView>,
}

/// One line item of an [`OrderView`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemView {
    /// Product id
    #[serde(rename = "produto_id")]
    pub product_id: i64,
    /// Number of units
    #[serde(rename = "quantidade")]
    pub quantity: Option<i32>,
}

/// Group rows by order id, in order of first encounter.
///
/// Scalar fields come from the first row of each order. Every row with a
/// product id contributes one item; a row without one (an order with no line
/// items) contributes none.
#[must_use]
pub fn fold_rows(rows: Vec<OrderRow>) -> Vec<OrderView> {
    let mut orders: Vec<OrderView> = Vec::new();
    let mut index: HashMap<i64, usize> = HashMap::new();

    for row in rows {
        let slot = *index.entry(row.id).or_insert_with(|| {
            orders.push(OrderView {
                id: row.id,
                uuid: row.uuid.clone(),
                customer_id: row.customer_id,
                created_at: row.created_at,
                total: row.total,
                customer_name: row.customer_name.clone(),
                items: Vec::new(),
            });
            orders.len() - 1
        });

        if let Some(product_id) = row.product_id {
            orders[slot].items.push(ItemView {
                product_id,
                quantity: row.quantity,
            });
        }
    }

    orders
}

/// Read side of the order model.
#[derive(Clone)]
pub struct OrderQueryService {
    store: Arc<dyn OrderStore>,
}

impl OrderQueryService {
    /// Create a query service over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store }
    }

    /// Run the denormalized query once and fold the result.
    ///
    /// # Errors
    ///
    /// Returns the store's error; no partial result is produced.
    pub async fn find_orders(&self, filter: &OrderFilter) -> Result<Vec<OrderView>, StoreError> {
        let started = Instant::now();
        let rows = self.store.query_orders(filter).await?;
        let row_count = rows.len();
        let orders = fold_rows(rows);

        debug!(
            ?filter,
            rows = row_count,
            orders = orders.len(),
            elapsed_ms = started.elapsed().as_millis(),
            "Orders queried"
        );
        Ok(orders)
    }
}
