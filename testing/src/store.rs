//! In-memory order store.
//!
//! Mirrors the Postgres schema closely enough for behavioural tests:
//! - `cliente` insert-if-absent keyed by id
//! - `pedido` insert-or-replace keyed by `uuid`, surrogate ids from a sequence
//! - `item_do_pedido` append-only
//! - foreign keys enforced (order → customer, item → order)
//! - `query_orders` yields the left-join row shape, ordered by order id

#![allow(clippy::unwrap_used)] // Test infrastructure uses unwrap for simplicity
#![allow(clippy::missing_panics_doc)] // Lock poisoning only happens after a test already panicked

use chrono::{DateTime, Utc};
use order_ingest_core::store::{
    NewCustomer, NewLineItem, NewOrder, OrderFilter, OrderRow, OrderStore, StoreError, StoreFuture,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

/// Store operations, as recorded in the call log and targeted by failure injection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StoreOp {
    /// `insert_customer_if_absent`
    InsertCustomer,
    /// `upsert_order`
    UpsertOrder,
    /// `insert_line_item`
    InsertLineItem,
    /// `query_orders`
    QueryOrders,
    /// `ping`
    Ping,
}

/// A persisted order row.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredOrder {
    /// Surrogate key
    pub id: i64,
    /// Natural key
    pub uuid: String,
    /// Owning customer
    pub customer_id: i64,
    /// Upstream creation timestamp
    pub created_at: DateTime<Utc>,
    /// Stored total
    pub total: f64,
}

#[derive(Debug, Default)]
struct Tables {
    customers: BTreeMap<i64, String>,
    orders: BTreeMap<i64, StoredOrder>,
    order_ids_by_uuid: HashMap<String, i64>,
    next_order_id: i64,
    line_items: Vec<NewLineItem>,
    failures: HashMap<StoreOp, StoreError>,
    calls: Vec<StoreOp>,
}

/// In-memory [`OrderStore`] for fast, deterministic testing.
///
/// Clones share the same tables.
///
/// # Example
///
/// ```
/// use order_ingest_core::store::{NewCustomer, OrderStore};
/// use order_ingest_testing::InMemoryOrderStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryOrderStore::new();
/// let customer = NewCustomer { id: 1, name: "A".to_string() };
///
/// assert_eq!(store.insert_customer_if_absent(&customer).await?, Some(1));
/// assert_eq!(store.insert_customer_if_absent(&customer).await?, None);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug, Default)]
pub struct InMemoryOrderStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryOrderStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call of `op` fail with `error`.
    pub fn fail_on(&self, op: StoreOp, error: StoreError) {
        self.tables.write().unwrap().failures.insert(op, error);
    }

    /// Make every operation fail as if the database were down.
    pub fn fail_all(&self) {
        let error = StoreError::Unavailable("connection refused".to_string());
        for op in [
            StoreOp::InsertCustomer,
            StoreOp::UpsertOrder,
            StoreOp::InsertLineItem,
            StoreOp::QueryOrders,
            StoreOp::Ping,
        ] {
            self.fail_on(op, error.clone());
        }
    }

    /// Remove all injected failures.
    pub fn heal(&self) {
        self.tables.write().unwrap().failures.clear();
    }

    /// Every operation invoked so far, in call order (failed calls included).
    #[must_use]
    pub fn calls(&self) -> Vec<StoreOp> {
        self.tables.read().unwrap().calls.clone()
    }

    /// Number of customer rows.
    #[must_use]
    pub fn customer_count(&self) -> usize {
        self.tables.read().unwrap().customers.len()
    }

    /// Stored display name of a customer.
    #[must_use]
    pub fn customer_name(&self, id: i64) -> Option<String> {
        self.tables.read().unwrap().customers.get(&id).cloned()
    }

    /// Number of order rows.
    #[must_use]
    pub fn order_count(&self) -> usize {
        self.tables.read().unwrap().orders.len()
    }

    /// Order row by natural key.
    #[must_use]
    pub fn order_by_uuid(&self, uuid: &str) -> Option<StoredOrder> {
        let tables = self.tables.read().unwrap();
        tables
            .order_ids_by_uuid
            .get(uuid)
            .and_then(|id| tables.orders.get(id))
            .cloned()
    }

    /// Line item rows of one order, in insertion order.
    #[must_use]
    pub fn line_items_for(&self, order_id: i64) -> Vec<NewLineItem> {
        self.tables
            .read()
            .unwrap()
            .line_items
            .iter()
            .filter(|item| item.order_id == order_id)
            .cloned()
            .collect()
    }

    /// Total number of line item rows.
    #[must_use]
    pub fn line_item_count(&self) -> usize {
        self.tables.read().unwrap().line_items.len()
    }

    /// Whether no row of any table exists.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let tables = self.tables.read().unwrap();
        tables.customers.is_empty() && tables.orders.is_empty() && tables.line_items.is_empty()
    }

    /// Record the call and return the injected failure, if any.
    fn enter(tables: &mut Tables, op: StoreOp) -> Result<(), StoreError> {
        tables.calls.push(op);
        tables.failures.get(&op).cloned().map_or(Ok(()), Err)
    }

    fn rows_for(tables: &Tables, order: &StoredOrder) -> Vec<OrderRow> {
        let customer_name = tables.customers.get(&order.customer_id).cloned();
        let row = |product_id: Option<i64>, quantity: Option<i32>| OrderRow {
            id: order.id,
            uuid: order.uuid.clone(),
            customer_id: order.customer_id,
            created_at: order.created_at,
            total: order.total,
            customer_name: customer_name.clone(),
            product_id,
            quantity,
        };

        let items: Vec<OrderRow> = tables
            .line_items
            .iter()
            .filter(|item| item.order_id == order.id)
            .map(|item| row(Some(item.product_id), Some(item.quantity)))
            .collect();

        if items.is_empty() {
            vec![row(None, None)]
        } else {
            items
        }
    }
}

impl OrderStore for InMemoryOrderStore {
    fn insert_customer_if_absent(&self, customer: &NewCustomer) -> StoreFuture<'_, Option<i64>> {
        let customer = customer.clone();
        Box::pin(async move {
            let mut tables = self.tables.write().unwrap();
            Self::enter(&mut tables, StoreOp::InsertCustomer)?;

            if tables.customers.contains_key(&customer.id) {
                return Ok(None);
            }
            tables.customers.insert(customer.id, customer.name);
            Ok(Some(customer.id))
        })
    }

    fn upsert_order(&self, order: &NewOrder) -> StoreFuture<'_, i64> {
        let order = order.clone();
        Box::pin(async move {
            let mut tables = self.tables.write().unwrap();
            Self::enter(&mut tables, StoreOp::UpsertOrder)?;

            if !tables.customers.contains_key(&order.customer_id) {
                return Err(StoreError::ConstraintViolation(format!(
                    "pedido.cliente_id {} references a missing cliente",
                    order.customer_id
                )));
            }

            let id = if let Some(id) = tables.order_ids_by_uuid.get(&order.uuid).copied() {
                id
            } else {
                tables.next_order_id += 1;
                let id = tables.next_order_id;
                tables.order_ids_by_uuid.insert(order.uuid.clone(), id);
                id
            };

            tables.orders.insert(
                id,
                StoredOrder {
                    id,
                    uuid: order.uuid,
                    customer_id: order.customer_id,
                    created_at: order.created_at,
                    total: order.total,
                },
            );
            Ok(id)
        })
    }

    fn insert_line_item(&self, item: &NewLineItem) -> StoreFuture<'_, ()> {
        let item = item.clone();
        Box::pin(async move {
            let mut tables = self.tables.write().unwrap();
            Self::enter(&mut tables, StoreOp::InsertLineItem)?;

            if !tables.orders.contains_key(&item.order_id) {
                return Err(StoreError::ConstraintViolation(format!(
                    "item_do_pedido.pedido_id {} references a missing pedido",
                    item.order_id
                )));
            }
            tables.line_items.push(item);
            Ok(())
        })
    }

    fn query_orders(&self, filter: &OrderFilter) -> StoreFuture<'_, Vec<OrderRow>> {
        let filter = filter.clone();
        Box::pin(async move {
            let mut tables = self.tables.write().unwrap();
            Self::enter(&mut tables, StoreOp::QueryOrders)?;

            let rows = tables
                .orders
                .values()
                .filter(|order| filter.uuid.as_ref().is_none_or(|uuid| &order.uuid == uuid))
                .filter(|order| filter.customer_id.is_none_or(|id| order.customer_id == id))
                .filter(|order| {
                    filter.product_id.is_none_or(|product_id| {
                        tables
                            .line_items
                            .iter()
                            .any(|item| item.order_id == order.id && item.product_id == product_id)
                    })
                })
                .flat_map(|order| Self::rows_for(&tables, order))
                .collect();
            Ok(rows)
        })
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let mut tables = self.tables.write().unwrap();
            Self::enter(&mut tables, StoreOp::Ping)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order(uuid: &str, customer_id: i64, total: f64) -> NewOrder {
        NewOrder {
            uuid: uuid.to_string(),
            customer_id,
            created_at: Utc::now(),
            total,
        }
    }

    async fn seed_customer(store: &InMemoryOrderStore, id: i64, name: &str) {
        store
            .insert_customer_if_absent(&NewCustomer {
                id,
                name: name.to_string(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn customer_name_is_kept_on_conflict() {
        let store = InMemoryOrderStore::new();
        seed_customer(&store, 1, "First").await;

        let second = store
            .insert_customer_if_absent(&NewCustomer {
                id: 1,
                name: "Second".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(second, None);
        assert_eq!(store.customer_name(1).as_deref(), Some("First"));
    }

    #[tokio::test]
    async fn upsert_replaces_by_uuid_and_keeps_surrogate_key() {
        let store = InMemoryOrderStore::new();
        seed_customer(&store, 1, "A").await;
        seed_customer(&store, 2, "B").await;

        let first = store.upsert_order(&order("u1", 1, 10.0)).await.unwrap();
        let second = store.upsert_order(&order("u1", 2, 30.0)).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.order_count(), 1);
        let stored = store.order_by_uuid("u1").unwrap();
        assert_eq!(stored.customer_id, 2);
        assert!((stored.total - 30.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn foreign_keys_are_enforced() {
        let store = InMemoryOrderStore::new();

        let err = store.upsert_order(&order("u1", 99, 1.0)).await.unwrap_err();
        assert!(matches!(err, StoreError::ConstraintViolation(_)));

        let err = store
            .insert_line_item(&NewLineItem {
                order_id: 42,
                product_id: 1,
                quantity: 1,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ConstraintViolation(_)));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn query_produces_outer_join_rows() {
        let store = InMemoryOrderStore::new();
        seed_customer(&store, 1, "A").await;
        let with_items = store.upsert_order(&order("u1", 1, 5.0)).await.unwrap();
        store.upsert_order(&order("u2", 1, 0.0)).await.unwrap();
        for product_id in [5, 6] {
            store
                .insert_line_item(&NewLineItem {
                    order_id: with_items,
                    product_id,
                    quantity: 1,
                })
                .await
                .unwrap();
        }

        let rows = store.query_orders(&OrderFilter::all()).await.unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2].uuid, "u2");
        assert_eq!(rows[2].product_id, None);
        assert_eq!(rows[0].customer_name.as_deref(), Some("A"));

        let by_product = store
            .query_orders(&OrderFilter::all().with_product_id(6))
            .await
            .unwrap();
        assert_eq!(by_product.len(), 2, "matched order keeps all its items");
    }

    #[tokio::test]
    async fn injected_failures_are_returned_and_logged() {
        let store = InMemoryOrderStore::new();
        store.fail_on(
            StoreOp::Ping,
            StoreError::Unavailable("down".to_string()),
        );

        assert!(store.ping().await.is_err());
        store.heal();
        assert!(store.ping().await.is_ok());
        assert_eq!(store.calls(), vec![StoreOp::Ping, StoreOp::Ping]);
    }
}
