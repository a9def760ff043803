//! PostgreSQL-backed user directory

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use uuid::Uuid;

use crate::domain::{User, UserId};
use crate::infra::{Result, UserDirectory};

/// PostgreSQL user directory
pub struct PgUserDirectory {
    pool: PgPool,
}

impl PgUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Initialize the users table
    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id UUID PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                stellar_public_key VARCHAR(56) UNIQUE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert a user row
    pub async fn insert(&self, user: &User) -> Result<()> {
        sqlx::query("INSERT INTO users (id, email, stellar_public_key) VALUES ($1, $2, $3)")
            .bind(user.id.0)
            .bind(&user.email)
            .bind(&user.stellar_public_key)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn get_user(&self, id: &UserId) -> Result<Option<User>> {
        let row: Option<UserRow> =
            sqlx::query_as("SELECT id, email, stellar_public_key FROM users WHERE id = $1")
                .bind(id.0)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(User::from))
    }

    async fn find_by_wallet(&self, public_key: &str) -> Result<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, email, stellar_public_key FROM users WHERE stellar_public_key = $1",
        )
        .bind(public_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(User::from))
    }

    async fn link_wallet(&self, id: &UserId, public_key: &str) -> Result<u64> {
        // The unique constraint is the final arbiter; a concurrent link
        // for the same key elsewhere surfaces as 0 rows here.
        let result = sqlx::query(
            r#"
            UPDATE users
            SET stellar_public_key = $2
            WHERE id = $1
              AND NOT EXISTS (
                  SELECT 1 FROM users WHERE stellar_public_key = $2 AND id <> $1
              )
            "#,
        )
        .bind(id.0)
        .bind(public_key)
        .execute(&self.pool)
        .await;

        match result {
            Ok(result) => Ok(result.rows_affected()),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    stellar_public_key: Option<String>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: UserId::from_uuid(row.id),
            email: row.email,
            stellar_public_key: row.stellar_public_key,
        }
    }
}
