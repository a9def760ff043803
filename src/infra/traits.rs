//! Trait definitions for the collaborators of the ticketing core
//!
//! Storage, ledger, audit and notification backends are reached only through
//! these traits so that services can run against PostgreSQL/Redis in
//! production and in-memory implementations in tests.

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use std::time::Duration;

use crate::domain::{
    Event, EventId, JobOptions, NewTicket, NonceChallenge, NotificationJob, Payment, PaymentId,
    PaymentStatus,
    QueuedNotification, Ticket, TicketId, TicketInsert, User, UserId,
};

use super::{AuditLogEntry, Result};

// ============================================================================
// Repositories
// ============================================================================

/// Payment lookups and the refund transitions.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn get_payment(&self, id: &PaymentId) -> Result<Option<Payment>>;

    /// Confirmed payments of an event, oldest first
    async fn list_confirmed_for_event(&self, event_id: &EventId) -> Result<Vec<Payment>>;

    /// `from -> to` where the payment is still in `from`; returns rows affected
    async fn transition_status(
        &self,
        id: &PaymentId,
        from: PaymentStatus,
        to: PaymentStatus,
    ) -> Result<u64>;
}

/// Ticket persistence.
///
/// Invariant: transaction hashes are unique and `used` is terminal. Both
/// mutating operations are single-row conditional updates.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TicketRepository: Send + Sync {
    async fn find_by_id(&self, id: &TicketId) -> Result<Option<Ticket>>;

    async fn find_by_transaction_hash(&self, transaction_hash: &str) -> Result<Option<Ticket>>;

    /// Insert unless a ticket already exists for the transaction hash
    async fn insert(&self, ticket: NewTicket) -> Result<TicketInsert>;

    /// Change owner where owner is `from` and status is valid; returns rows affected
    async fn transfer_owner(&self, id: &TicketId, from: &UserId, to: &UserId) -> Result<u64>;

    /// `valid -> used`; returns the updated ticket, or `None` if it was not valid
    async fn mark_used(&self, id: &TicketId) -> Result<Option<Ticket>>;
}

/// Event reads and escrow column updates.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait EventRepository: Send + Sync {
    async fn get_event(&self, id: &EventId) -> Result<Option<Event>>;

    /// Persist escrow keys where no escrow key is set yet; returns rows affected
    async fn set_escrow(
        &self,
        id: &EventId,
        public_key: &str,
        secret_encrypted: &str,
    ) -> Result<u64>;

    /// Claim the release of an escrow whose secret is still stored and not
    /// already claimed; returns rows affected
    async fn claim_escrow_release(&self, id: &EventId) -> Result<u64>;

    /// Drop a release claim after a failed transfer; returns rows affected
    async fn abandon_escrow_release(&self, id: &EventId) -> Result<u64>;

    /// Null the encrypted secret and any release claim, keeping the public
    /// key; returns rows affected
    async fn clear_escrow_secret(&self, id: &EventId) -> Result<u64>;
}

/// User directory: contact addresses and linked wallets.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user(&self, id: &UserId) -> Result<Option<User>>;

    async fn find_by_wallet(&self, public_key: &str) -> Result<Option<User>>;

    /// Set the user's linked wallet; returns rows affected
    async fn link_wallet(&self, id: &UserId, public_key: &str) -> Result<u64>;
}

// ============================================================================
// Ledger
// ============================================================================

/// On-chain transaction as needed for memo validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerTransaction {
    pub hash: String,
    pub memo: Option<String>,
}

/// Result of a submitted transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedTransaction {
    pub hash: String,
}

/// Account summary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerAccount {
    pub account_id: String,
    pub native_balance: String,
}

/// Freshly generated escrow keypair
#[derive(Clone, PartialEq, Eq)]
pub struct EscrowKeypair {
    pub public_key: String,
    pub secret: String,
}

impl std::fmt::Debug for EscrowKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EscrowKeypair")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

/// Ledger failures
#[derive(Debug, Clone, thiserror::Error)]
pub enum LedgerError {
    #[error("not found on ledger: {0}")]
    NotFound(String),

    #[error("transaction rejected: {0}")]
    Rejected(String),

    #[error("ledger unavailable: {0}")]
    Unavailable(String),
}

/// Stellar network client.
///
/// Calls are not retried by the services; each failure surfaces once.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn get_transaction(&self, hash: &str)
        -> std::result::Result<LedgerTransaction, LedgerError>;

    fn generate_escrow_keypair(&self) -> EscrowKeypair;

    /// Create and fund `destination` from the funder account
    async fn fund_escrow_account(
        &self,
        funder_secret: &str,
        destination: &str,
    ) -> std::result::Result<SubmittedTransaction, LedgerError>;

    /// Move the full escrow balance to `destination`
    async fn release_escrow_funds(
        &self,
        escrow_secret: &str,
        destination: &str,
    ) -> std::result::Result<SubmittedTransaction, LedgerError>;

    /// Native balance as a decimal string
    async fn get_xlm_balance(&self, public_key: &str) -> std::result::Result<String, LedgerError>;

    async fn get_account(&self, public_key: &str)
        -> std::result::Result<LedgerAccount, LedgerError>;

    /// Pay `amount` of `asset_code` from the source account
    async fn send_payment(
        &self,
        source_secret: &str,
        destination: &str,
        amount: &str,
        asset_code: &str,
    ) -> std::result::Result<SubmittedTransaction, LedgerError>;
}

// ============================================================================
// Side channels
// ============================================================================

/// Append-only audit trail. Callers log and swallow failures.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn log(&self, entry: AuditLogEntry) -> Result<()>;
}

/// Outbound notification queue. Enqueue failures are non-fatal to callers.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NotificationQueue: Send + Sync {
    async fn enqueue(&self, job: NotificationJob, options: JobOptions) -> Result<()>;

    /// Wait up to `timeout` for the next job
    async fn dequeue(&self, timeout: Duration) -> Result<Option<QueuedNotification>>;
}

/// Storage for wallet-link challenges, keyed by public key.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NonceStore: Send + Sync {
    /// Store, replacing any earlier challenge for the same key
    async fn store(&self, challenge: NonceChallenge, ttl: Duration) -> Result<()>;

    /// Atomically get and delete the challenge for a key
    async fn take(&self, public_key: &str) -> Result<Option<NonceChallenge>>;
}
