//! Order query endpoint.
//!
//! - GET /orders - List orders, optionally filtered by `uuid`, `cliente_id`
//!   and `produto_id`

use crate::query::{OrderQueryService, OrderView};
use axum::{
    Json,
    extract::{Query, State},
};
use order_ingest_core::OrderFilter;
use order_ingest_web::{AppError, RequestId, WebResult};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

/// Fixed body of a failed query.
pub const QUERY_FAILED_MESSAGE: &str = "Erro ao consultar pedidos";

/// Raw query string parameters.
///
/// Kept as strings so an empty value can mean "absent" and a malformed number
/// can be answered with a plain-text 400.
#[derive(Debug, Default, Deserialize)]
pub struct OrdersQuery {
    /// Order natural key
    pub uuid: Option<String>,
    /// Customer id
    pub cliente_id: Option<String>,
    /// Product id
    pub produto_id: Option<String>,
}

impl OrdersQuery {
    /// Validate into an [`OrderFilter`].
    ///
    /// # Errors
    ///
    /// Returns a 400 [`AppError`] naming the first non-integer id parameter.
    pub fn into_filter(self) -> Result<OrderFilter, AppError> {
        Ok(OrderFilter {
            uuid: present(self.uuid),
            customer_id: parse_id("cliente_id", self.cliente_id)?,
            product_id: parse_id("produto_id", self.produto_id)?,
        })
    }
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_id(name: &str, value: Option<String>) -> Result<Option<i64>, AppError> {
    present(value)
        .map(|v| v.trim().parse::<i64>())
        .transpose()
        .map_err(|_| AppError::bad_request(format!("Parâmetro inválido: {name}")))
}

/// List orders with their customer name and line items.
///
/// # Example
///
/// ```bash
/// curl 'http://localhost:3001/orders?uuid=u1'
/// ```
///
/// Response:
/// ```json
/// [
///   {
///     "id": 1,
///     "uuid": "u1",
///     "cliente_id": 1,
///     "created_at": "2024-01-01T00:00:00Z",
///     "valor_total": 20.0,
///     "cliente_nome": "A",
///     "itens": [{ "produto_id": 5, "quantidade": 2 }]
///   }
/// ]
/// ```
///
/// # Errors
///
/// - 400 with a plain-text message if `cliente_id` or `produto_id` is not an integer
/// - 500 with `Erro ao consultar pedidos` if the store query fails
pub async fn list_orders(
    State(orders): State<Arc<OrderQueryService>>,
    request_id: RequestId,
    Query(params): Query<OrdersQuery>,
) -> WebResult<Json<Vec<OrderView>>> {
    let filter = params.into_filter()?;

    let found = orders
        .find_orders(&filter)
        .await
        .map_err(|e| AppError::internal(QUERY_FAILED_MESSAGE).with_source(e.into()))?;

    info!(request_id = %request_id, ?filter, orders = found.len(), "Orders listed");
    Ok(Json(found))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    fn query(uuid: Option<&str>, cliente_id: Option<&str>, produto_id: Option<&str>) -> OrdersQuery {
        OrdersQuery {
            uuid: uuid.map(str::to_string),
            cliente_id: cliente_id.map(str::to_string),
            produto_id: produto_id.map(str::to_string),
        }
    }

    #[test]
    fn empty_parameters_are_absent() {
        let filter = query(Some(""), Some(" "), Some("")).into_filter().unwrap();
        assert_eq!(filter, OrderFilter::all());
    }

    #[test]
    fn ids_are_parsed() {
        let filter = query(Some("u1"), Some("7"), Some(" 5 ")).into_filter().unwrap();
        assert_eq!(
            filter,
            OrderFilter::all().with_uuid("u1").with_customer_id(7).with_product_id(5)
        );
    }

    #[test]
    fn non_integer_id_is_bad_request() {
        let err = query(None, Some("abc"), None).into_filter().unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.message(), "Parâmetro inválido: cliente_id");

        let err = query(None, None, Some("1.5")).into_filter().unwrap_err();
        assert_eq!(err.message(), "Parâmetro inválido: produto_id");
    }
}
