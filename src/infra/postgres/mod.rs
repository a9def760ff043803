//! PostgreSQL implementations of the ticketing repositories
//!
//! Every store exposes an idempotent `initialize()` that creates its table.
//! Mutations that guard an invariant are single-row conditional updates and
//! report rows affected.

mod events;
mod payments;
mod tickets;
mod users;

pub use events::*;
pub use payments::*;
pub use tickets::*;
pub use users::*;

use sqlx::postgres::PgPool;

use crate::infra::{PgAuditLogger, Result};

/// Create all tables used by the ticketing core
pub async fn initialize_all(pool: &PgPool) -> Result<()> {
    PgEventRepository::new(pool.clone()).initialize().await?;
    PgPaymentRepository::new(pool.clone()).initialize().await?;
    PgTicketRepository::new(pool.clone()).initialize().await?;
    PgUserDirectory::new(pool.clone()).initialize().await?;
    PgAuditLogger::new(pool.clone()).initialize().await?;
    Ok(())
}
