//! Decoded order event schema.
//!
//! Order events arrive as JSON payloads of the shape:
//!
//! ```json
//! {
//!   "customer": { "id": 1, "name": "Alice" },
//!   "items": [ { "sku": { "id": "5", "value": 10.0 }, "quantity": 2 } ],
//!   "uuid": "3f1c9a52-...",
//!   "created_at": "2024-01-01T10:00:00Z"
//! }
//! ```
//!
//! The schema is checked once, at decode time. A payload that is not JSON or
//! does not match the shape is a [`DecodeError`] and the whole message is
//! rejected. The product id inside each `sku` is deliberately *not* checked at
//! decode time: an unparseable product id is a [`ValidationError`] scoped to a
//! single line item, so it must not reject the event.
//!
//! # Example
//!
//! ```
//! use order_ingest_core::order::OrderEvent;
//!
//! let payload = br#"{
//!     "customer": {"id": 1, "name": "A"},
//!     "items": [{"sku": {"id": "5", "value": 10}, "quantity": 2}],
//!     "uuid": "u1",
//!     "created_at": "2024-01-01"
//! }"#;
//!
//! let event = OrderEvent::decode(payload).unwrap();
//! assert_eq!(event.uuid, "u1");
//! assert!((event.total_value() - 20.0).abs() < f64::EPSILON);
//! assert_eq!(event.items[0].sku.product_id().unwrap(), 5);
//! ```

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Errors raised while decoding a message payload into an [`OrderEvent`].
///
/// Any decode error rejects the whole message before the store is touched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The payload is not syntactically valid JSON (or is truncated).
    #[error("Payload is not valid JSON: {0}")]
    InvalidJson(String),

    /// The payload is JSON but does not match the order event shape.
    #[error("Payload does not match the order event schema: {0}")]
    Schema(String),

    /// The order natural key is empty.
    #[error("Order uuid must not be empty")]
    EmptyUuid,
}

impl From<serde_json::Error> for DecodeError {
    fn from(err: serde_json::Error) -> Self {
        match err.classify() {
            serde_json::error::Category::Data => Self::Schema(err.to_string()),
            serde_json::error::Category::Io
            | serde_json::error::Category::Syntax
            | serde_json::error::Category::Eof => Self::InvalidJson(err.to_string()),
        }
    }
}

/// Errors scoped to a single line item.
///
/// These never abort the event: the item is logged and skipped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The item's product id is not a representable integer.
    #[error("Invalid product id: {0}")]
    InvalidProductId(String),
}

/// A decoded order event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderEvent {
    /// Customer who placed the order
    pub customer: CustomerPayload,
    /// Line items, in event order
    pub items: Vec<ItemPayload>,
    /// Order natural key
    pub uuid: String,
    /// When the order was created upstream
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
}

/// Customer section of an order event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerPayload {
    /// External customer id
    pub id: i64,
    /// Display name (only stored the first time the customer is seen)
    pub name: String,
}

/// One line item of an order event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemPayload {
    /// Product reference and unit price
    pub sku: SkuPayload,
    /// Number of units
    pub quantity: i32,
}

/// Product reference of a line item.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SkuPayload {
    /// Raw product id as sent upstream; may be a JSON number or a string.
    ///
    /// Kept raw so that a bad id only invalidates its own item.
    #[serde(default)]
    pub id: Value,
    /// Unit price
    pub value: f64,
}

impl OrderEvent {
    /// Decode a raw message payload.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InvalidJson`] for non-JSON payloads,
    /// [`DecodeError::Schema`] when a required field is missing or has the wrong
    /// type (including an unparseable `created_at`), and
    /// [`DecodeError::EmptyUuid`] when the natural key is blank.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let event: Self = serde_json::from_slice(payload)?;

        if event.uuid.trim().is_empty() {
            return Err(DecodeError::EmptyUuid);
        }

        Ok(event)
    }

    /// Order total: Σ(unit price × quantity) over every item of the event.
    ///
    /// Items whose product id fails validation still count towards the total.
    #[must_use]
    pub fn total_value(&self) -> f64 {
        self.items.iter().map(ItemPayload::line_value).sum()
    }
}

impl ItemPayload {
    /// Unit price multiplied by quantity.
    #[must_use]
    pub fn line_value(&self) -> f64 {
        self.sku.value * f64::from(self.quantity)
    }
}

impl SkuPayload {
    /// Parse the product id as an integer.
    ///
    /// Accepts JSON integers and strings holding an integer (surrounding
    /// whitespace is ignored).
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::InvalidProductId`] for anything else
    /// (missing, fractional, non-numeric text, out of range).
    pub fn product_id(&self) -> Result<i64, ValidationError> {
        match &self.id {
            Value::Number(number) => number
                .as_i64()
                .ok_or_else(|| ValidationError::InvalidProductId(number.to_string())),
            Value::String(text) => text
                .trim()
                .parse::<i64>()
                .map_err(|_| ValidationError::InvalidProductId(text.clone())),
            other => Err(ValidationError::InvalidProductId(other.to_string())),
        }
    }
}

/// Parse an upstream timestamp.
///
/// Accepted forms, all interpreted as UTC when no offset is given:
/// - RFC 3339 (`2024-01-01T10:00:00Z`, `2024-01-01T10:00:00-03:00`)
/// - ISO date-time without offset (`2024-01-01T10:00:00`, `2024-01-01 10:00:00.123`)
/// - plain date (`2024-01-01`, midnight UTC)
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();

    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return Some(timestamp.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

mod timestamp {
    use super::parse_timestamp;
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_timestamp(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid created_at timestamp: {raw}")))
    }
}
