use async_trait::async_trait;
use chrono::Utc;
use domain::{
    MerchantTransactionId, Money, Order, OrderPatch, PaymentAttempt, PaymentMode,
    PaymentSettlement,
};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{LedgerError, OrderId, Result, store::OrderLedger};

/// PostgreSQL-backed order ledger.
///
/// Each order is stored as a JSONB document next to the columns that are
/// filtered on. Settlement runs inside a transaction holding a row lock on
/// the order so concurrent writers are serialized.
#[derive(Clone)]
pub struct PostgresOrderLedger {
    pool: PgPool,
}

impl PostgresOrderLedger {
    /// Creates a new PostgreSQL ledger.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let document: serde_json::Value = row.try_get("document")?;
        Ok(serde_json::from_value(document)?)
    }

    fn row_to_attempt(row: PgRow) -> Result<PaymentAttempt> {
        let method: String = row.try_get("method")?;
        let status: String = row.try_get("status")?;

        Ok(PaymentAttempt {
            merchant_transaction_id: MerchantTransactionId::new(
                row.try_get::<String, _>("merchant_transaction_id")?,
            ),
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            gateway_transaction_id: row.try_get("gateway_transaction_id")?,
            amount: Money::from_minor(row.try_get("amount")?),
            currency: row.try_get("currency")?,
            method: PaymentMode::parse(&method).ok_or_else(|| {
                LedgerError::Corrupt(format!("unknown payment method '{method}'"))
            })?,
            status: serde_json::from_value(serde_json::Value::String(status))?,
            raw_response: row.try_get("raw_response")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    async fn lock_order(tx: &mut Transaction<'_, Postgres>, order_id: OrderId) -> Result<Order> {
        let row = sqlx::query("SELECT document FROM orders WHERE id = $1 FOR UPDATE")
            .bind(order_id.as_uuid())
            .fetch_optional(&mut **tx)
            .await?
            .ok_or(LedgerError::OrderNotFound(order_id))?;
        Self::row_to_order(row)
    }

    async fn write_order(tx: &mut Transaction<'_, Postgres>, order: &Order) -> Result<()> {
        let document = serde_json::to_value(order)?;
        sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, payment_status = $3, merchant_transaction_id = $4,
                document = $5, updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(order.merchant_transaction_id.as_ref().map(|t| t.as_str()))
        .bind(document)
        .bind(order.updated_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl OrderLedger for PostgresOrderLedger {
    #[tracing::instrument(skip(self, order), fields(order_id = %order.id))]
    async fn create_order(&self, order: Order) -> Result<OrderId> {
        let order_id = order.id;
        let document = serde_json::to_value(&order)?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, customer_id, status, payment_status, merchant_transaction_id,
                                total_amount, document, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(order.customer_id.as_str())
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(order.merchant_transaction_id.as_ref().map(|t| t.as_str()))
        .bind(order.total_amount.minor_units())
        .bind(document)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("orders_pkey")
            {
                return LedgerError::DuplicateOrder(order_id);
            }
            LedgerError::Database(e)
        })?;

        metrics::counter!("ledger_orders_created_total").increment(1);
        Ok(order_id)
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let row: Option<PgRow> = sqlx::query("SELECT document FROM orders WHERE id = $1")
            .bind(order_id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_order).transpose()
    }

    #[tracing::instrument(skip(self, patch))]
    async fn update_order(&self, order_id: OrderId, patch: OrderPatch) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        let mut order = Self::lock_order(&mut tx, order_id).await?;
        order.apply_patch(&patch, Utc::now())?;
        Self::write_order(&mut tx, &order).await?;

        tx.commit().await?;
        Ok(order)
    }

    #[tracing::instrument(skip(self, settlement), fields(status = %settlement.status))]
    async fn settle_payment(
        &self,
        order_id: OrderId,
        settlement: PaymentSettlement,
    ) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        let mut order = Self::lock_order(&mut tx, order_id).await?;
        // Dropping the transaction on error rolls it back
        order.settle_payment(&settlement)?;
        Self::write_order(&mut tx, &order).await?;

        let attempt = &settlement.attempt;
        sqlx::query(
            r#"
            INSERT INTO payment_attempts (merchant_transaction_id, order_id, gateway_transaction_id,
                                          amount, currency, method, status, raw_response,
                                          created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (merchant_transaction_id) DO UPDATE SET
                gateway_transaction_id = EXCLUDED.gateway_transaction_id,
                status = EXCLUDED.status,
                raw_response = EXCLUDED.raw_response,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(attempt.merchant_transaction_id.as_str())
        .bind(order_id.as_uuid())
        .bind(&attempt.gateway_transaction_id)
        .bind(attempt.amount.minor_units())
        .bind(&attempt.currency)
        .bind(attempt.method.as_str())
        .bind(attempt.status.as_str())
        .bind(&attempt.raw_response)
        .bind(attempt.created_at)
        .bind(attempt.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!(%order_id, "payment settled");
        Ok(order)
    }

    async fn attempts_for(&self, order_id: OrderId) -> Result<Vec<PaymentAttempt>> {
        let rows = sqlx::query(
            r#"
            SELECT merchant_transaction_id, order_id, gateway_transaction_id, amount, currency,
                   method, status, raw_response, created_at, updated_at
            FROM payment_attempts
            WHERE order_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_attempt).collect()
    }
}

