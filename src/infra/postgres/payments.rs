//! PostgreSQL-backed payment repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgPool;
use uuid::Uuid;

use crate::domain::{EventId, Payment, PaymentId, PaymentStatus, UserId};
use crate::infra::{PaymentRepository, Result, TicketingError};

/// PostgreSQL payment repository
pub struct PgPaymentRepository {
    pool: PgPool,
}

impl PgPaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Initialize the payments table
    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS payments (
                id UUID PRIMARY KEY,
                event_id UUID NOT NULL,
                user_id UUID NOT NULL,
                amount NUMERIC(18, 7) NOT NULL,
                currency VARCHAR(12) NOT NULL DEFAULT 'XLM',
                transaction_hash VARCHAR(128),
                status VARCHAR(16) NOT NULL DEFAULT 'pending',
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_payments_event_status ON payments (event_id, status)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert a payment row (used by the payment flow and fixtures)
    pub async fn insert(&self, payment: &Payment) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO payments (id, event_id, user_id, amount, currency, transaction_hash, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(payment.id.0)
        .bind(payment.event_id.0)
        .bind(payment.user_id.0)
        .bind(payment.amount)
        .bind(&payment.currency)
        .bind(&payment.transaction_hash)
        .bind(payment.status.to_string())
        .bind(payment.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn row_to_payment(row: PaymentRow) -> Result<Payment> {
        let status = PaymentStatus::parse(&row.status).ok_or_else(|| {
            TicketingError::Internal(format!("unknown payment status: {}", row.status))
        })?;

        Ok(Payment {
            id: PaymentId::from_uuid(row.id),
            event_id: EventId::from_uuid(row.event_id),
            user_id: UserId::from_uuid(row.user_id),
            amount: row.amount,
            currency: row.currency,
            transaction_hash: row.transaction_hash,
            status,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl PaymentRepository for PgPaymentRepository {
    async fn get_payment(&self, id: &PaymentId) -> Result<Option<Payment>> {
        let row: Option<PaymentRow> = sqlx::query_as(
            r#"
            SELECT id, event_id, user_id, amount, currency, transaction_hash, status, created_at
            FROM payments
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_payment).transpose()
    }

    async fn list_confirmed_for_event(&self, event_id: &EventId) -> Result<Vec<Payment>> {
        let rows: Vec<PaymentRow> = sqlx::query_as(
            r#"
            SELECT id, event_id, user_id, amount, currency, transaction_hash, status, created_at
            FROM payments
            WHERE event_id = $1 AND status = 'confirmed'
            ORDER BY created_at ASC
            "#,
        )
        .bind(event_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_payment).collect()
    }

    async fn transition_status(
        &self,
        id: &PaymentId,
        from: PaymentStatus,
        to: PaymentStatus,
    ) -> Result<u64> {
        let result =
            sqlx::query("UPDATE payments SET status = $3 WHERE id = $1 AND status = $2")
                .bind(id.0)
                .bind(from.to_string())
                .bind(to.to_string())
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected())
    }
}

#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    event_id: Uuid,
    user_id: Uuid,
    amount: Decimal,
    currency: String,
    transaction_hash: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
}
