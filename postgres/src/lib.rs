//! `PostgreSQL` order store.
//!
//! Implements [`OrderStore`] over a `sqlx` connection pool against the
//! `cliente` / `pedido` / `item_do_pedido` schema shipped in `migrations/`.
//!
//! - Customers are insert-if-absent: an existing row is never updated.
//! - Orders are upserted on their natural key (`uuid`), keeping the
//!   surrogate id stable across redeliveries.
//! - Line items are append-only.
//!
//! # Example
//!
//! ```ignore
//! use order_ingest_postgres::PostgresOrderStore;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresOrderStore::new("postgres://localhost/orders").await?;
//!     store.migrate().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use order_ingest_core::store::{
    NewCustomer, NewLineItem, NewOrder, OrderFilter, OrderRow, OrderStore, StoreError,
    StoreFuture,
};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, QueryBuilder, Row};
use std::time::Instant;

const SELECT_ORDERS: &str = r"
    SELECT p.id, p.uuid, p.cliente_id, p.created_at, p.valor_total,
           c.nome AS cliente_nome, i.produto_id, i.quantidade
    FROM pedido p
    LEFT JOIN cliente c ON p.cliente_id = c.id
    LEFT JOIN item_do_pedido i ON p.id = i.pedido_id
    WHERE 1 = 1";

/// [`OrderStore`] backed by a `PostgreSQL` connection pool.
#[derive(Clone, Debug)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Connect with a default pool of 10 connections.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the connection fails.
    pub async fn new(database_url: &str) -> Result<Self, StoreError> {
        Self::connect_with(PgPoolOptions::new().max_connections(10), database_url).await
    }

    /// Connect using caller-supplied pool options.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the connection fails.
    pub async fn connect_with(
        options: PgPoolOptions,
        database_url: &str,
    ) -> Result<Self, StoreError> {
        let pool = options
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to connect: {e}")))?;
        Ok(Self::from_pool(pool))
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the order tables if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::QueryFailed`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Migration failed: {e}")))?;
        tracing::info!("Order schema migrations applied");
        Ok(())
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Close every pooled connection, waiting for checked-out ones.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl OrderStore for PostgresOrderStore {
    fn insert_customer_if_absent(&self, customer: &NewCustomer) -> StoreFuture<'_, Option<i64>> {
        let customer = customer.clone();
        Box::pin(async move {
            let inserted: Option<(i64,)> = sqlx::query_as(
                r"
                INSERT INTO cliente (id, nome)
                VALUES ($1, $2)
                ON CONFLICT (id) DO NOTHING
                RETURNING id
                ",
            )
            .bind(customer.id)
            .bind(&customer.name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_customer", e))?;

            tracing::debug!(
                customer_id = customer.id,
                created = inserted.is_some(),
                "Customer insert-if-absent"
            );
            Ok(inserted.map(|(id,)| id))
        })
    }

    fn upsert_order(&self, order: &NewOrder) -> StoreFuture<'_, i64> {
        let order = order.clone();
        Box::pin(async move {
            let (id,): (i64,) = sqlx::query_as(
                r"
                INSERT INTO pedido (uuid, cliente_id, created_at, valor_total)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (uuid) DO UPDATE
                SET cliente_id = EXCLUDED.cliente_id,
                    created_at = EXCLUDED.created_at,
                    valor_total = EXCLUDED.valor_total
                RETURNING id
                ",
            )
            .bind(&order.uuid)
            .bind(order.customer_id)
            .bind(order.created_at)
            .bind(order.total)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("upsert_order", e))?;

            tracing::debug!(uuid = %order.uuid, order_id = id, "Order upserted");
            Ok(id)
        })
    }

    fn insert_line_item(&self, item: &NewLineItem) -> StoreFuture<'_, ()> {
        let item = item.clone();
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO item_do_pedido (pedido_id, produto_id, quantidade) VALUES ($1, $2, $3)",
            )
            .bind(item.order_id)
            .bind(item.product_id)
            .bind(item.quantity)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("insert_line_item", e))?;
            Ok(())
        })
    }

    fn query_orders(&self, filter: &OrderFilter) -> StoreFuture<'_, Vec<OrderRow>> {
        let filter = filter.clone();
        Box::pin(async move {
            let start = Instant::now();

            let mut builder = QueryBuilder::<Postgres>::new(SELECT_ORDERS);
            if let Some(uuid) = filter.uuid {
                builder.push(" AND p.uuid = ").push_bind(uuid);
            }
            if let Some(customer_id) = filter.customer_id {
                builder.push(" AND p.cliente_id = ").push_bind(customer_id);
            }
            if let Some(product_id) = filter.product_id {
                // Order-level match: a matching order keeps all of its items.
                builder
                    .push(
                        " AND EXISTS (SELECT 1 FROM item_do_pedido f \
                         WHERE f.pedido_id = p.id AND f.produto_id = ",
                    )
                    .push_bind(product_id)
                    .push(")");
            }
            builder.push(" ORDER BY p.id, i.id");

            let rows = builder
                .build()
                .fetch_all(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("query_orders", e))?;

            metrics::histogram!("order_ingest.query.duration")
                .record(start.elapsed().as_secs_f64());

            rows.iter().map(decode_row).collect()
        })
    }

    fn ping(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query("SELECT 1")
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("ping", e))?;
            Ok(())
        })
    }
}

fn decode_row(row: &PgRow) -> Result<OrderRow, StoreError> {
    let decode = |e: sqlx::Error| StoreError::RowDecode(e.to_string());
    Ok(OrderRow {
        id: row.try_get("id").map_err(decode)?,
        uuid: row.try_get("uuid").map_err(decode)?,
        customer_id: row.try_get("cliente_id").map_err(decode)?,
        created_at: row.try_get("created_at").map_err(decode)?,
        total: row.try_get("valor_total").map_err(decode)?,
        customer_name: row.try_get("cliente_nome").map_err(decode)?,
        product_id: row.try_get("produto_id").map_err(decode)?,
        quantity: row.try_get("quantidade").map_err(decode)?,
    })
}

fn map_sqlx_error(operation: &'static str, error: sqlx::Error) -> StoreError {
    metrics::counter!("order_ingest.store.errors", "operation" => operation).increment(1);
    tracing::warn!(operation, error = %error, "Store operation failed");

    match &error {
        sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::WorkerCrashed => StoreError::Unavailable(format!("{operation}: {error}")),
        sqlx::Error::Database(db_err)
            if db_err.is_foreign_key_violation()
                || db_err.is_unique_violation()
                || db_err.is_check_violation() =>
        {
            StoreError::ConstraintViolation(format!("{operation}: {error}"))
        },
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::Decode(_) => StoreError::RowDecode(format!("{operation}: {error}")),
        _ => StoreError::QueryFailed(format!("{operation}: {error}")),
    }
}
