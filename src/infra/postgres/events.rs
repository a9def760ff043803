//! PostgreSQL-backed event repository (escrow columns)

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use uuid::Uuid;

use crate::domain::{Event, EventId, EventStatus, UserId};
use crate::infra::{EventRepository, Result, TicketingError};

/// PostgreSQL event repository
pub struct PgEventRepository {
    pool: PgPool,
}

impl PgEventRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Initialize the events table
    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS events (
                id UUID PRIMARY KEY,
                title TEXT NOT NULL,
                organizer_id UUID NOT NULL,
                status VARCHAR(16) NOT NULL DEFAULT 'draft',
                escrow_public_key VARCHAR(56),
                escrow_secret_encrypted TEXT,
                escrow_release_claimed BOOLEAN NOT NULL DEFAULT FALSE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "ALTER TABLE events ADD COLUMN IF NOT EXISTS escrow_release_claimed BOOLEAN NOT NULL DEFAULT FALSE",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert an event row
    pub async fn insert(&self, event: &Event) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO events (id, title, organizer_id, status, escrow_public_key, escrow_secret_encrypted)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(event.id.0)
        .bind(&event.title)
        .bind(event.organizer_id.0)
        .bind(event.status.to_string())
        .bind(&event.escrow_public_key)
        .bind(&event.escrow_secret_encrypted)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Update the lifecycle status
    pub async fn set_status(&self, id: &EventId, status: EventStatus) -> Result<u64> {
        let result = sqlx::query("UPDATE events SET status = $2 WHERE id = $1")
            .bind(id.0)
            .bind(status.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl EventRepository for PgEventRepository {
    async fn get_event(&self, id: &EventId) -> Result<Option<Event>> {
        let row: Option<EventRow> = sqlx::query_as(
            r#"
            SELECT id, title, organizer_id, status, escrow_public_key, escrow_secret_encrypted
            FROM events
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            let status = EventStatus::parse(&row.status).ok_or_else(|| {
                TicketingError::Internal(format!("unknown event status: {}", row.status))
            })?;
            Ok(Event {
                id: EventId::from_uuid(row.id),
                title: row.title,
                organizer_id: UserId::from_uuid(row.organizer_id),
                status,
                escrow_public_key: row.escrow_public_key,
                escrow_secret_encrypted: row.escrow_secret_encrypted,
            })
        })
        .transpose()
    }

    async fn set_escrow(
        &self,
        id: &EventId,
        public_key: &str,
        secret_encrypted: &str,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE events
            SET escrow_public_key = $2, escrow_secret_encrypted = $3
            WHERE id = $1 AND escrow_public_key IS NULL
            "#,
        )
        .bind(id.0)
        .bind(public_key)
        .bind(secret_encrypted)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn claim_escrow_release(&self, id: &EventId) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE events
            SET escrow_release_claimed = TRUE
            WHERE id = $1
              AND escrow_secret_encrypted IS NOT NULL
              AND NOT escrow_release_claimed
            "#,
        )
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn abandon_escrow_release(&self, id: &EventId) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE events SET escrow_release_claimed = FALSE WHERE id = $1 AND escrow_release_claimed",
        )
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn clear_escrow_secret(&self, id: &EventId) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE events
            SET escrow_secret_encrypted = NULL, escrow_release_claimed = FALSE
            WHERE id = $1 AND escrow_secret_encrypted IS NOT NULL
            "#,
        )
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: Uuid,
    title: String,
    organizer_id: Uuid,
    status: String,
    escrow_public_key: Option<String>,
    escrow_secret_encrypted: Option<String>,
}
