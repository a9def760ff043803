//! PostgreSQL-backed ticket repository
//!
//! `transaction_hash` carries a unique constraint; minting uses
//! `ON CONFLICT DO NOTHING` so concurrent issuers converge on one row.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use uuid::Uuid;

use crate::domain::{
    EventId, NewTicket, Ticket, TicketId, TicketInsert, TicketStatus, UserId,
};
use crate::infra::{Result, TicketRepository, TicketingError};

const TICKET_COLUMNS: &str =
    "id, event_id, owner_id, asset_code, transaction_hash, status, created_at, used_at";

/// PostgreSQL ticket repository
pub struct PgTicketRepository {
    pool: PgPool,
}

impl PgTicketRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Initialize the tickets table
    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tickets (
                id UUID PRIMARY KEY,
                event_id UUID NOT NULL,
                owner_id UUID NOT NULL,
                asset_code VARCHAR(12) NOT NULL,
                transaction_hash VARCHAR(128) NOT NULL UNIQUE,
                status VARCHAR(16) NOT NULL DEFAULT 'valid',
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                used_at TIMESTAMPTZ
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tickets_owner ON tickets (owner_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    fn row_to_ticket(row: TicketRow) -> Result<Ticket> {
        let status = TicketStatus::parse(&row.status).ok_or_else(|| {
            TicketingError::Internal(format!("unknown ticket status: {}", row.status))
        })?;

        Ok(Ticket {
            id: TicketId::from_uuid(row.id),
            event_id: EventId::from_uuid(row.event_id),
            owner_id: UserId::from_uuid(row.owner_id),
            asset_code: row.asset_code,
            transaction_hash: row.transaction_hash,
            status,
            created_at: row.created_at,
            used_at: row.used_at,
        })
    }
}

#[async_trait]
impl TicketRepository for PgTicketRepository {
    async fn find_by_id(&self, id: &TicketId) -> Result<Option<Ticket>> {
        let row: Option<TicketRow> =
            sqlx::query_as(&format!("SELECT {TICKET_COLUMNS} FROM tickets WHERE id = $1"))
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await?;

        row.map(Self::row_to_ticket).transpose()
    }

    async fn find_by_transaction_hash(&self, transaction_hash: &str) -> Result<Option<Ticket>> {
        let row: Option<TicketRow> = sqlx::query_as(&format!(
            "SELECT {TICKET_COLUMNS} FROM tickets WHERE transaction_hash = $1"
        ))
        .bind(transaction_hash)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_ticket).transpose()
    }

    async fn insert(&self, ticket: NewTicket) -> Result<TicketInsert> {
        let ticket = ticket.into_ticket();

        let inserted: Option<TicketRow> = sqlx::query_as(&format!(
            r#"
            INSERT INTO tickets (id, event_id, owner_id, asset_code, transaction_hash, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (transaction_hash) DO NOTHING
            RETURNING {TICKET_COLUMNS}
            "#
        ))
        .bind(ticket.id.0)
        .bind(ticket.event_id.0)
        .bind(ticket.owner_id.0)
        .bind(&ticket.asset_code)
        .bind(&ticket.transaction_hash)
        .bind(ticket.status.to_string())
        .bind(ticket.created_at)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            return Ok(TicketInsert::Created(Self::row_to_ticket(row)?));
        }

        // Lost the race to a concurrent issuer for the same transaction
        let existing = self
            .find_by_transaction_hash(&ticket.transaction_hash)
            .await?
            .ok_or_else(|| {
                TicketingError::Internal("ticket conflict without existing row".to_string())
            })?;
        Ok(TicketInsert::Existing(existing))
    }

    async fn transfer_owner(&self, id: &TicketId, from: &UserId, to: &UserId) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE tickets
            SET owner_id = $3
            WHERE id = $1 AND owner_id = $2 AND status = 'valid'
            "#,
        )
        .bind(id.0)
        .bind(from.0)
        .bind(to.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn mark_used(&self, id: &TicketId) -> Result<Option<Ticket>> {
        let row: Option<TicketRow> = sqlx::query_as(&format!(
            r#"
            UPDATE tickets
            SET status = 'used', used_at = NOW()
            WHERE id = $1 AND status = 'valid'
            RETURNING {TICKET_COLUMNS}
            "#
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_ticket).transpose()
    }
}

#[derive(sqlx::FromRow)]
struct TicketRow {
    id: Uuid,
    event_id: Uuid,
    owner_id: Uuid,
    asset_code: String,
    transaction_hash: String,
    status: String,
    created_at: DateTime<Utc>,
    used_at: Option<DateTime<Utc>>,
}
