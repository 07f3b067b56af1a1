//! Order event payload fixtures.

use serde_json::{Value, json};

/// Builder for JSON order event payloads.
///
/// Defaults: customer `{id: 1, name: "A"}`, no items, `created_at` `2024-01-01`.
///
/// # Example
///
/// ```
/// use order_ingest_testing::OrderPayload;
///
/// let bytes = OrderPayload::new("u1")
///     .customer(1, "A")
///     .item("5", 10.0, 2)
///     .to_bytes();
/// assert!(!bytes.is_empty());
/// ```
#[derive(Clone, Debug)]
pub struct OrderPayload {
    uuid: String,
    customer_id: i64,
    customer_name: String,
    items: Vec<Value>,
    created_at: String,
}

impl OrderPayload {
    /// Start a payload for the given order natural key.
    #[must_use]
    pub fn new(uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            customer_id: 1,
            customer_name: "A".to_string(),
            items: Vec::new(),
            created_at: "2024-01-01".to_string(),
        }
    }

    /// Set the customer.
    #[must_use]
    pub fn customer(mut self, id: i64, name: impl Into<String>) -> Self {
        self.customer_id = id;
        self.customer_name = name.into();
        self
    }

    /// Append an item; `sku_id` may be any JSON value (number, numeric or
    /// non-numeric string).
    #[must_use]
    pub fn item(mut self, sku_id: impl Into<Value>, value: f64, quantity: i32) -> Self {
        self.items.push(json!({
            "sku": {"id": sku_id.into(), "value": value},
            "quantity": quantity
        }));
        self
    }

    /// Set the upstream creation timestamp.
    #[must_use]
    pub fn created_at(mut self, created_at: impl Into<String>) -> Self {
        self.created_at = created_at.into();
        self
    }

    /// Render as a JSON value.
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "customer": {"id": self.customer_id, "name": self.customer_name},
            "items": self.items,
            "uuid": self.uuid,
            "created_at": self.created_at
        })
    }

    /// Render as payload bytes.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_json().to_string().into_bytes()
    }
}
