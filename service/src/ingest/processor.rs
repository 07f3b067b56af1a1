//! The order upsert processor.
//!
//! For one decoded [`OrderEvent`] it runs, strictly in order:
//!
//! 1. insert the customer if absent (an existing name is kept)
//! 2. compute the total over every item, valid product id or not
//! 3. upsert the order by `uuid`, replacing customer, timestamp and total
//! 4. append one line item per item with a valid product id
//!
//! Steps are separate statements with no enclosing transaction. A failure in
//! any store call aborts the event; an unparseable product id only skips its
//! own item.

use order_ingest_core::{
    NewCustomer, NewLineItem, NewOrder, OrderEvent, OrderStore, StoreError,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Result of processing one event.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessReport {
    /// Internal (surrogate) order id
    pub order_key: i64,
    /// Effective customer id the order references
    pub customer_id: i64,
    /// Order total written to the store
    pub total: f64,
    /// Line items appended
    pub items_inserted: usize,
    /// Items skipped for an invalid product id
    pub items_skipped: usize,
}

/// Writes order events to an [`OrderStore`].
#[derive(Clone)]
pub struct OrderUpsertProcessor {
    store: Arc<dyn OrderStore>,
}

impl OrderUpsertProcessor {
    /// Create a processor over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store }
    }

    /// Persist one event.
    ///
    /// # Errors
    ///
    /// Returns the first [`StoreError`]. Rows written before the failure stay
    /// committed; replaying the event is safe for customer and order.
    pub async fn process(&self, event: &OrderEvent) -> Result<ProcessReport, StoreError> {
        let inserted = self
            .store
            .insert_customer_if_absent(&NewCustomer {
                id: event.customer.id,
                name: event.customer.name.clone(),
            })
            .await?;
        let customer_id = inserted.unwrap_or(event.customer.id);

        let total = event.total_value();

        let order_key = self
            .store
            .upsert_order(&NewOrder {
                uuid: event.uuid.clone(),
                customer_id,
                created_at: event.created_at,
                total,
            })
            .await?;

        debug!(
            uuid = %event.uuid,
            order_key,
            customer_id,
            customer_created = inserted.is_some(),
            total,
            "Order upserted"
        );

        let mut items_inserted = 0;
        let mut items_skipped = 0;
        for item in &event.items {
            let product_id = match item.sku.product_id() {
                Ok(id) => id,
                Err(error) => {
                    warn!(uuid = %event.uuid, error = %error, "Skipping line item");
                    metrics::counter!("order_ingest.items.skipped").increment(1);
                    items_skipped += 1;
                    continue;
                },
            };

            self.store
                .insert_line_item(&NewLineItem {
                    order_id: order_key,
                    product_id,
                    quantity: item.quantity,
                })
                .await?;
            metrics::counter!("order_ingest.items.inserted").increment(1);
            items_inserted += 1;
        }

        Ok(ProcessReport {
            order_key,
            customer_id,
            total,
            items_inserted,
            items_skipped,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use order_ingest_testing::{InMemoryOrderStore, OrderPayload, StoreOp};

    fn event(payload: &OrderPayload) -> OrderEvent {
        OrderEvent::decode(&payload.to_bytes()).unwrap()
    }

    #[tokio::test]
    async fn writes_customer_order_and_items() {
        let store = InMemoryOrderStore::new();
        let processor = OrderUpsertProcessor::new(Arc::new(store.clone()));

        let report = processor
            .process(&event(&OrderPayload::new("u1").item("5", 10.0, 2).item(6, 1.5, 4)))
            .await
            .unwrap();

        assert_eq!(report.customer_id, 1);
        assert_eq!(report.items_inserted, 2);
        assert_eq!(report.items_skipped, 0);
        assert!((report.total - 26.0).abs() < f64::EPSILON);
        assert_eq!(store.customer_name(1).as_deref(), Some("A"));
        assert_eq!(store.line_items_for(report.order_key).len(), 2);
    }

    #[tokio::test]
    async fn invalid_product_id_skips_only_that_item() {
        let store = InMemoryOrderStore::new();
        let processor = OrderUpsertProcessor::new(Arc::new(store.clone()));

        let report = processor
            .process(&event(&OrderPayload::new("u1").item("abc", 3.0, 1).item("7", 2.0, 1)))
            .await
            .unwrap();

        assert_eq!(report.items_inserted, 1);
        assert_eq!(report.items_skipped, 1);
        assert!((report.total - 5.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn existing_customer_keeps_name_and_id() {
        let store = InMemoryOrderStore::new();
        let processor = OrderUpsertProcessor::new(Arc::new(store.clone()));

        processor
            .process(&event(&OrderPayload::new("u1").customer(9, "First")))
            .await
            .unwrap();
        let report = processor
            .process(&event(&OrderPayload::new("u2").customer(9, "Second")))
            .await
            .unwrap();

        assert_eq!(report.customer_id, 9);
        assert_eq!(store.customer_name(9).as_deref(), Some("First"));
    }

    #[tokio::test]
    async fn steps_run_in_order() {
        let store = InMemoryOrderStore::new();
        let processor = OrderUpsertProcessor::new(Arc::new(store.clone()));

        processor
            .process(&event(&OrderPayload::new("u1").item(1, 1.0, 1).item(2, 1.0, 1)))
            .await
            .unwrap();

        assert_eq!(
            store.calls(),
            vec![
                StoreOp::InsertCustomer,
                StoreOp::UpsertOrder,
                StoreOp::InsertLineItem,
                StoreOp::InsertLineItem,
            ]
        );
    }

    #[tokio::test]
    async fn order_failure_aborts_before_items() {
        let store = InMemoryOrderStore::new();
        store.fail_on(StoreOp::UpsertOrder, StoreError::QueryFailed("boom".into()));
        let processor = OrderUpsertProcessor::new(Arc::new(store.clone()));

        let err = processor
            .process(&event(&OrderPayload::new("u1").item(1, 1.0, 1)))
            .await
            .unwrap_err();

        assert_eq!(err, StoreError::QueryFailed("boom".into()));
        assert_eq!(store.line_item_count(), 0);
        assert_eq!(store.customer_count(), 1);
    }

    #[tokio::test]
    async fn line_item_failure_aborts_event() {
        let store = InMemoryOrderStore::new();
        store.fail_on(StoreOp::InsertLineItem, StoreError::Unavailable("down".into()));
        let processor = OrderUpsertProcessor::new(Arc::new(store.clone()));

        let result = processor
            .process(&event(&OrderPayload::new("u1").item(1, 1.0, 1)))
            .await;

        assert!(matches!(result, Err(StoreError::Unavailable(_))));
        assert_eq!(store.order_count(), 1);
    }
}
