//! Infrastructure layer for the ticketing core
//!
//! Contains trait definitions and implementations for:
//! - Payment, ticket, event and user storage (PostgreSQL, in-memory)
//! - Ledger client (in-memory simulation; production backends are injected)
//! - Audit logging (money-moving and custody-changing operations)
//! - Wallet challenge store and notification queue (Redis, in-memory)
//! - Retry with exponential backoff (notification delivery)
//! - Graceful shutdown (server and worker)

mod audit;
mod error;
mod graceful_shutdown;
mod memory;
pub mod postgres;
mod redis_store;
mod retry;
mod traits;

pub use audit::{
    record as record_audit, AuditAction, AuditLogBuilder, AuditLogEntry,
    InMemoryAuditSink, PgAuditLogger,
};
pub use error::*;
pub use graceful_shutdown::{shutdown_signal, ShutdownCoordinator, ShutdownSignal};
pub use memory::*;
pub use postgres::{PgEventRepository, PgPaymentRepository, PgTicketRepository, PgUserDirectory};
pub use redis_store::{connect as connect_redis, RedisNonceStore, RedisNotificationQueue};
pub use retry::{Retry, RetryConfig, RetryResult};
pub use traits::*;

