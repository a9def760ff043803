//! Audit logging for escrow, refund, ticket and wallet operations
//!
//! Every money-moving or custody-changing operation records an entry:
//! - Escrow creation, release and cancellation inspection
//! - Per-payment refunds
//! - Ticket issuance, transfer and gate verification
//! - Wallet linking

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPool;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AuditSink, Result};

/// Audit log action types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    // Escrow
    EscrowCreated,
    EscrowReleased,
    EscrowCancellationInspected,

    // Refunds
    PaymentRefunded,
    RefundFailed,

    // Tickets
    TicketIssued,
    TicketTransferred,
    TicketVerified,

    // Wallets
    WalletLinked,

    // Other
    Custom(String),
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditAction::EscrowCreated => write!(f, "escrow_created"),
            AuditAction::EscrowReleased => write!(f, "escrow_released"),
            AuditAction::EscrowCancellationInspected => {
                write!(f, "escrow_cancellation_inspected")
            }
            AuditAction::PaymentRefunded => write!(f, "payment_refunded"),
            AuditAction::RefundFailed => write!(f, "refund_failed"),
            AuditAction::TicketIssued => write!(f, "ticket_issued"),
            AuditAction::TicketTransferred => write!(f, "ticket_transferred"),
            AuditAction::TicketVerified => write!(f, "ticket_verified"),
            AuditAction::WalletLinked => write!(f, "wallet_linked"),
            AuditAction::Custom(s) => write!(f, "custom:{}", s),
        }
    }
}

/// Audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    /// Unique audit log ID
    pub id: Uuid,
    /// When the action occurred
    pub timestamp: DateTime<Utc>,
    /// The action that was performed
    pub action: AuditAction,
    /// Actor who performed the action (user ID or "system")
    pub actor: String,
    /// Resource type that was affected
    pub resource_type: Option<String>,
    /// Resource ID that was affected
    pub resource_id: Option<String>,
    /// Additional details as JSON
    pub details: Option<serde_json::Value>,
    /// Whether the action succeeded
    pub success: bool,
    /// Error message if failed
    pub error_message: Option<String>,
}

/// Builder for creating audit log entries
pub struct AuditLogBuilder {
    action: AuditAction,
    actor: String,
    resource_type: Option<String>,
    resource_id: Option<String>,
    details: Option<serde_json::Value>,
    success: bool,
    error_message: Option<String>,
}

impl AuditLogBuilder {
    /// Create a new audit log builder
    pub fn new(action: AuditAction, actor: impl Into<String>) -> Self {
        Self {
            action,
            actor: actor.into(),
            resource_type: None,
            resource_id: None,
            details: None,
            success: true,
            error_message: None,
        }
    }

    /// Builder for an action taken by the service itself
    pub fn system(action: AuditAction) -> Self {
        Self::new(action, "system")
    }

    /// Set the resource type and ID
    pub fn resource(
        mut self,
        resource_type: impl Into<String>,
        resource_id: impl ToString,
    ) -> Self {
        self.resource_type = Some(resource_type.into());
        self.resource_id = Some(resource_id.to_string());
        self
    }

    /// Set additional details
    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Mark as failed with error message
    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error_message = Some(error.into());
        self
    }

    /// Build the audit log entry
    pub fn build(self) -> AuditLogEntry {
        AuditLogEntry {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            action: self.action,
            actor: self.actor,
            resource_type: self.resource_type,
            resource_id: self.resource_id,
            details: self.details,
            success: self.success,
            error_message: self.error_message,
        }
    }
}

/// Record an entry, logging instead of propagating sink failures
pub async fn record(sink: &dyn AuditSink, entry: AuditLogEntry) {
    let action = entry.action.to_string();
    if let Err(e) = sink.log(entry).await {
        tracing::warn!(action = %action, error = %e, "Failed to write audit log entry");
    }
}

fn trace_entry(entry: &AuditLogEntry) {
    if entry.success {
        tracing::info!(
            action = %entry.action,
            actor = %entry.actor,
            resource_type = ?entry.resource_type,
            resource_id = ?entry.resource_id,
            "Audit log entry"
        );
    } else {
        tracing::warn!(
            action = %entry.action,
            actor = %entry.actor,
            resource_id = ?entry.resource_id,
            error = ?entry.error_message,
            "Audit log entry (failed)"
        );
    }
}

// ============================================================================
// PostgreSQL
// ============================================================================

/// PostgreSQL-backed audit logger
pub struct PgAuditLogger {
    pool: PgPool,
}

impl PgAuditLogger {
    /// Create a new audit logger
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Initialize the audit log table
    pub async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS audit_log (
                id UUID PRIMARY KEY,
                timestamp TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                action TEXT NOT NULL,
                actor TEXT NOT NULL,
                resource_type TEXT,
                resource_id TEXT,
                details JSONB,
                success BOOLEAN NOT NULL DEFAULT TRUE,
                error_message TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_audit_log_timestamp ON audit_log (timestamp DESC)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_audit_log_resource ON audit_log (resource_type, resource_id)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl AuditSink for PgAuditLogger {
    async fn log(&self, entry: AuditLogEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (
                id, timestamp, action, actor, resource_type, resource_id,
                details, success, error_message
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(entry.id)
        .bind(entry.timestamp)
        .bind(entry.action.to_string())
        .bind(&entry.actor)
        .bind(&entry.resource_type)
        .bind(&entry.resource_id)
        .bind(&entry.details)
        .bind(entry.success)
        .bind(&entry.error_message)
        .execute(&self.pool)
        .await?;

        trace_entry(&entry);
        Ok(())
    }
}

// ============================================================================
// In-memory
// ============================================================================

/// In-memory audit sink for development and tests
#[derive(Default)]
pub struct InMemoryAuditSink {
    entries: RwLock<Vec<AuditLogEntry>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded entries, oldest first
    pub async fn entries(&self) -> Vec<AuditLogEntry> {
        self.entries.read().await.clone()
    }

    /// Recorded entries with the given action
    pub async fn entries_for(&self, action: &AuditAction) -> Vec<AuditLogEntry> {
        self.entries
            .read()
            .await
            .iter()
            .filter(|e| &e.action == action)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn log(&self, entry: AuditLogEntry) -> Result<()> {
        trace_entry(&entry);
        self.entries.write().await.push(entry);
        Ok(())
    }
}
