//! In-memory implementations for development and testing
//!
//! Each store serializes its mutations behind a single lock, so the
//! conditional updates behave like their single-row SQL counterparts.
//! State is process-local: do not use these across multiple instances.

use async_trait::async_trait;
use chrono::Utc;
use rand::rngs::OsRng;
use rand::RngCore;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet, VecDeque};
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::{Mutex, Notify, RwLock};

use crate::crypto::{account_id_from_seed, generate_keypair_strkeys};
use crate::domain::{
    Event, EventId, EventStatus, JobOptions, NewTicket, NonceChallenge, NotificationJob, Payment,
    PaymentId, PaymentStatus, QueuedNotification, Ticket, TicketId, TicketInsert, TicketStatus,
    User, UserId, AMOUNT_SCALE, DEFAULT_CURRENCY,
};

use super::{
    EscrowKeypair, EventRepository, LedgerAccount, LedgerClient, LedgerError, LedgerTransaction,
    NonceStore, NotificationQueue, PaymentRepository, Result, SubmittedTransaction,
    TicketRepository, UserDirectory,
};

// ============================================================================
// Payments
// ============================================================================

/// In-memory payment store
#[derive(Default)]
pub struct InMemoryPaymentRepository {
    payments: RwLock<HashMap<PaymentId, Payment>>,
}

impl InMemoryPaymentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, payment: Payment) {
        self.payments.write().await.insert(payment.id, payment);
    }
}

#[async_trait]
impl PaymentRepository for InMemoryPaymentRepository {
    async fn get_payment(&self, id: &PaymentId) -> Result<Option<Payment>> {
        Ok(self.payments.read().await.get(id).cloned())
    }

    async fn list_confirmed_for_event(&self, event_id: &EventId) -> Result<Vec<Payment>> {
        let mut payments: Vec<Payment> = self
            .payments
            .read()
            .await
            .values()
            .filter(|p| &p.event_id == event_id && p.status == PaymentStatus::Confirmed)
            .cloned()
            .collect();
        payments.sort_by_key(|p| p.created_at);
        Ok(payments)
    }

    async fn transition_status(
        &self,
        id: &PaymentId,
        from: PaymentStatus,
        to: PaymentStatus,
    ) -> Result<u64> {
        let mut payments = self.payments.write().await;
        match payments.get_mut(id) {
            Some(p) if p.status == from => {
                p.status = to;
                Ok(1)
            }
            _ => Ok(0),
        }
    }
}

// ============================================================================
// Tickets
// ============================================================================

#[derive(Default)]
struct TicketTable {
    by_id: HashMap<TicketId, Ticket>,
    by_hash: HashMap<String, TicketId>,
}

/// In-memory ticket store
#[derive(Default)]
pub struct InMemoryTicketRepository {
    table: RwLock<TicketTable>,
}

impl InMemoryTicketRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.table.read().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl TicketRepository for InMemoryTicketRepository {
    async fn find_by_id(&self, id: &TicketId) -> Result<Option<Ticket>> {
        Ok(self.table.read().await.by_id.get(id).cloned())
    }

    async fn find_by_transaction_hash(&self, transaction_hash: &str) -> Result<Option<Ticket>> {
        let table = self.table.read().await;
        Ok(table
            .by_hash
            .get(transaction_hash)
            .and_then(|id| table.by_id.get(id))
            .cloned())
    }

    async fn insert(&self, ticket: NewTicket) -> Result<TicketInsert> {
        let mut table = self.table.write().await;
        if let Some(existing) = table
            .by_hash
            .get(&ticket.transaction_hash)
            .and_then(|id| table.by_id.get(id))
        {
            return Ok(TicketInsert::Existing(existing.clone()));
        }

        let ticket = ticket.into_ticket();
        table
            .by_hash
            .insert(ticket.transaction_hash.clone(), ticket.id);
        table.by_id.insert(ticket.id, ticket.clone());
        Ok(TicketInsert::Created(ticket))
    }

    async fn transfer_owner(&self, id: &TicketId, from: &UserId, to: &UserId) -> Result<u64> {
        let mut table = self.table.write().await;
        match table.by_id.get_mut(id) {
            Some(t) if &t.owner_id == from && t.status == TicketStatus::Valid => {
                t.owner_id = *to;
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn mark_used(&self, id: &TicketId) -> Result<Option<Ticket>> {
        let mut table = self.table.write().await;
        match table.by_id.get_mut(id) {
            Some(t) if t.status == TicketStatus::Valid => {
                t.status = TicketStatus::Used;
                t.used_at = Some(Utc::now());
                Ok(Some(t.clone()))
            }
            _ => Ok(None),
        }
    }
}

// ============================================================================
// Events
// ============================================================================

/// In-memory event store
#[derive(Default)]
pub struct InMemoryEventRepository {
    events: RwLock<HashMap<EventId, Event>>,
    release_claims: RwLock<HashSet<EventId>>,
}

impl InMemoryEventRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, event: Event) {
        self.events.write().await.insert(event.id, event);
    }

    pub async fn set_status(&self, id: &EventId, status: EventStatus) -> bool {
        match self.events.write().await.get_mut(id) {
            Some(event) => {
                event.status = status;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl EventRepository for InMemoryEventRepository {
    async fn get_event(&self, id: &EventId) -> Result<Option<Event>> {
        Ok(self.events.read().await.get(id).cloned())
    }

    async fn set_escrow(
        &self,
        id: &EventId,
        public_key: &str,
        secret_encrypted: &str,
    ) -> Result<u64> {
        let mut events = self.events.write().await;
        match events.get_mut(id) {
            Some(e) if e.escrow_public_key.is_none() => {
                e.escrow_public_key = Some(public_key.to_string());
                e.escrow_secret_encrypted = Some(secret_encrypted.to_string());
                Ok(1)
            }
            _ => Ok(0),
        }
    }

    async fn claim_escrow_release(&self, id: &EventId) -> Result<u64> {
        let events = self.events.read().await;
        let has_secret = events
            .get(id)
            .is_some_and(|e| e.escrow_secret_encrypted.is_some());
        if has_secret && self.release_claims.write().await.insert(*id) {
            Ok(1)
        } else {
            Ok(0)
        }
    }

    async fn abandon_escrow_release(&self, id: &EventId) -> Result<u64> {
        Ok(u64::from(self.release_claims.write().await.remove(id)))
    }

    async fn clear_escrow_secret(&self, id: &EventId) -> Result<u64> {
        let mut events = self.events.write().await;
        self.release_claims.write().await.remove(id);
        match events.get_mut(id) {
            Some(e) if e.escrow_secret_encrypted.is_some() => {
                e.escrow_secret_encrypted = None;
                Ok(1)
            }
            _ => Ok(0),
        }
    }
}

// ============================================================================
// Users
// ============================================================================

/// In-memory user directory
#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: RwLock<HashMap<UserId, User>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put(&self, user: User) {
        self.users.write().await.insert(user.id, user);
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn get_user(&self, id: &UserId) -> Result<Option<User>> {
        Ok(self.users.read().await.get(id).cloned())
    }

    async fn find_by_wallet(&self, public_key: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .read()
            .await
            .values()
            .find(|u| u.stellar_public_key.as_deref() == Some(public_key))
            .cloned())
    }

    async fn link_wallet(&self, id: &UserId, public_key: &str) -> Result<u64> {
        let mut users = self.users.write().await;
        if users
            .values()
            .any(|u| &u.id != id && u.stellar_public_key.as_deref() == Some(public_key))
        {
            return Ok(0);
        }
        match users.get_mut(id) {
            Some(user) => {
                user.stellar_public_key = Some(public_key.to_string());
                Ok(1)
            }
            None => Ok(0),
        }
    }
}

// ============================================================================
// Notifications
// ============================================================================

/// In-memory notification queue
#[derive(Default)]
pub struct InMemoryNotificationQueue {
    jobs: Mutex<VecDeque<QueuedNotification>>,
    available: Notify,
}

impl InMemoryNotificationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of pending jobs, oldest first
    pub async fn pending(&self) -> Vec<QueuedNotification> {
        self.jobs.lock().await.iter().cloned().collect()
    }
}

#[async_trait]
impl NotificationQueue for InMemoryNotificationQueue {
    async fn enqueue(&self, job: NotificationJob, options: JobOptions) -> Result<()> {
        self.jobs
            .lock()
            .await
            .push_back(QueuedNotification::new(job, options));
        self.available.notify_one();
        Ok(())
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<QueuedNotification>> {
        if let Some(job) = self.jobs.lock().await.pop_front() {
            return Ok(Some(job));
        }
        let _ = tokio::time::timeout(timeout, self.available.notified()).await;
        Ok(self.jobs.lock().await.pop_front())
    }
}

// ============================================================================
// Nonces
// ============================================================================

/// Process-local challenge store with lazy expiry
#[derive(Default)]
pub struct InMemoryNonceStore {
    challenges: Mutex<HashMap<String, NonceChallenge>>,
}

impl InMemoryNonceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NonceStore for InMemoryNonceStore {
    async fn store(&self, challenge: NonceChallenge, _ttl: Duration) -> Result<()> {
        let mut challenges = self.challenges.lock().await;
        challenges.retain(|_, c| !c.is_expired());
        challenges.insert(challenge.public_key.clone(), challenge);
        Ok(())
    }

    async fn take(&self, public_key: &str) -> Result<Option<NonceChallenge>> {
        Ok(self.challenges.lock().await.remove(public_key))
    }
}

// ============================================================================
// Ledger
// ============================================================================

/// Starting balance given to freshly funded escrow accounts
pub const ESCROW_STARTING_BALANCE: &str = "2";

#[derive(Default)]
struct LedgerState {
    transactions: HashMap<String, LedgerTransaction>,
    balances: HashMap<(String, String), Decimal>,
    accounts: HashSet<String>,
    failing: HashSet<&'static str>,
}

impl LedgerState {
    fn check(&self, operation: &'static str) -> std::result::Result<(), LedgerError> {
        if self.failing.contains(operation) {
            return Err(LedgerError::Unavailable(format!("{operation} failed")));
        }
        Ok(())
    }

    fn credit(&mut self, account: &str, asset: &str, amount: Decimal) {
        self.accounts.insert(account.to_string());
        *self
            .balances
            .entry((account.to_string(), asset.to_string()))
            .or_default() += amount;
    }

    fn record(&mut self, memo: Option<String>) -> SubmittedTransaction {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        let hash = hex::encode(bytes);
        self.transactions.insert(
            hash.clone(),
            LedgerTransaction {
                hash: hash.clone(),
                memo,
            },
        );
        SubmittedTransaction { hash }
    }
}

fn seed_account(seed: &str) -> std::result::Result<String, LedgerError> {
    account_id_from_seed(seed).map_err(|e| LedgerError::Rejected(e.to_string()))
}

fn format_amount(mut amount: Decimal) -> String {
    amount.rescale(AMOUNT_SCALE);
    amount.to_string()
}

/// Simulated Stellar ledger for local development and tests
#[derive(Default)]
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a confirmed payment transaction with the given memo
    pub async fn record_transaction(&self, hash: impl Into<String>, memo: Option<&str>) {
        let hash = hash.into();
        self.state.lock().await.transactions.insert(
            hash.clone(),
            LedgerTransaction {
                hash,
                memo: memo.map(String::from),
            },
        );
    }

    /// Credit an account directly
    pub async fn credit(&self, account: &str, asset: &str, amount: Decimal) {
        self.state.lock().await.credit(account, asset, amount);
    }

    /// Balance of an account in the given asset
    pub async fn balance(&self, account: &str, asset: &str) -> Decimal {
        self.state
            .lock()
            .await
            .balances
            .get(&(account.to_string(), asset.to_string()))
            .copied()
            .unwrap_or_default()
    }

    /// Make every call of the named operation fail until cleared
    pub async fn fail_operation(&self, operation: &'static str) {
        self.state.lock().await.failing.insert(operation);
    }

    pub async fn clear_failures(&self) {
        self.state.lock().await.failing.clear();
    }
}

#[async_trait]
impl LedgerClient for InMemoryLedger {
    async fn get_transaction(
        &self,
        hash: &str,
    ) -> std::result::Result<LedgerTransaction, LedgerError> {
        let state = self.state.lock().await;
        state.check("get_transaction")?;
        state
            .transactions
            .get(hash)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(hash.to_string()))
    }

    fn generate_escrow_keypair(&self) -> EscrowKeypair {
        let (public_key, secret) = generate_keypair_strkeys();
        EscrowKeypair { public_key, secret }
    }

    async fn fund_escrow_account(
        &self,
        funder_secret: &str,
        destination: &str,
    ) -> std::result::Result<SubmittedTransaction, LedgerError> {
        let mut state = self.state.lock().await;
        state.check("fund_escrow_account")?;
        seed_account(funder_secret)?;

        let starting = Decimal::from_str(ESCROW_STARTING_BALANCE)
            .map_err(|e| LedgerError::Rejected(e.to_string()))?;
        state.credit(destination, DEFAULT_CURRENCY, starting);
        Ok(state.record(None))
    }

    async fn release_escrow_funds(
        &self,
        escrow_secret: &str,
        destination: &str,
    ) -> std::result::Result<SubmittedTransaction, LedgerError> {
        let mut state = self.state.lock().await;
        state.check("release_escrow_funds")?;
        let source = seed_account(escrow_secret)?;
        if !state.accounts.contains(&source) {
            return Err(LedgerError::NotFound(source));
        }

        // Account merge: every balance moves to the destination
        let held: Vec<(String, Decimal)> = state
            .balances
            .iter()
            .filter(|((account, _), _)| account == &source)
            .map(|((_, asset), amount)| (asset.clone(), *amount))
            .collect();
        for (asset, amount) in held {
            state.balances.remove(&(source.clone(), asset.clone()));
            state.credit(destination, &asset, amount);
        }
        state.accounts.remove(&source);

        Ok(state.record(None))
    }

    async fn get_xlm_balance(&self, public_key: &str) -> std::result::Result<String, LedgerError> {
        let state = self.state.lock().await;
        state.check("get_xlm_balance")?;
        if !state.accounts.contains(public_key) {
            return Err(LedgerError::NotFound(public_key.to_string()));
        }
        let balance = state
            .balances
            .get(&(public_key.to_string(), DEFAULT_CURRENCY.to_string()))
            .copied()
            .unwrap_or_default();
        Ok(format_amount(balance))
    }

    async fn get_account(
        &self,
        public_key: &str,
    ) -> std::result::Result<LedgerAccount, LedgerError> {
        let state = self.state.lock().await;
        state.check("get_account")?;
        if !state.accounts.contains(public_key) {
            return Err(LedgerError::NotFound(public_key.to_string()));
        }
        let balance = state
            .balances
            .get(&(public_key.to_string(), DEFAULT_CURRENCY.to_string()))
            .copied()
            .unwrap_or_default();
        Ok(LedgerAccount {
            account_id: public_key.to_string(),
            native_balance: format_amount(balance),
        })
    }

    async fn send_payment(
        &self,
        source_secret: &str,
        destination: &str,
        amount: &str,
        asset_code: &str,
    ) -> std::result::Result<SubmittedTransaction, LedgerError> {
        let mut state = self.state.lock().await;
        state.check("send_payment")?;
        let source = seed_account(source_secret)?;
        let amount =
            Decimal::from_str(amount).map_err(|e| LedgerError::Rejected(e.to_string()))?;

        let key = (source.clone(), asset_code.to_string());
        let available = state.balances.get(&key).copied().unwrap_or_default();
        if available < amount {
            return Err(LedgerError::Rejected(format!(
                "underfunded: {} has {} {}",
                source,
                format_amount(available),
                asset_code
            )));
        }

        state.balances.insert(key, available - amount);
        state.credit(destination, asset_code, amount);
        Ok(state.record(None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ticket_insert_is_idempotent_per_hash() {
        let repo = InMemoryTicketRepository::new();
        let new_ticket = NewTicket {
            event_id: EventId::new(),
            owner_id: UserId::new(),
            asset_code: "XLM".into(),
            transaction_hash: "tx-1".into(),
        };

        let first = repo.insert(new_ticket.clone()).await.unwrap();
        let second = repo.insert(new_ticket).await.unwrap();

        assert!(matches!(first, TicketInsert::Created(_)));
        assert!(matches!(second, TicketInsert::Existing(_)));
        assert_eq!(first.into_ticket().id, second.into_ticket().id);
        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn test_mark_used_only_once() {
        let repo = InMemoryTicketRepository::new();
        let ticket = repo
            .insert(NewTicket {
                event_id: EventId::new(),
                owner_id: UserId::new(),
                asset_code: "XLM".into(),
                transaction_hash: "tx-2".into(),
            })
            .await
            .unwrap()
            .into_ticket();

        assert!(repo.mark_used(&ticket.id).await.unwrap().is_some());
        assert!(repo.mark_used(&ticket.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_escrow_only_when_unset() {
        let repo = InMemoryEventRepository::new();
        let event = Event::new("NestFest", UserId::new(), EventStatus::Published);
        let id = event.id;
        repo.put(event).await;

        assert_eq!(repo.set_escrow(&id, "GA", "a:b:c").await.unwrap(), 1);
        assert_eq!(repo.set_escrow(&id, "GB", "d:e:f").await.unwrap(), 0);
        let stored = repo.get_event(&id).await.unwrap().unwrap();
        assert_eq!(stored.escrow_public_key.as_deref(), Some("GA"));

        assert_eq!(repo.clear_escrow_secret(&id).await.unwrap(), 1);
        assert_eq!(repo.clear_escrow_secret(&id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_escrow_release_claim_is_exclusive() {
        let repo = InMemoryEventRepository::new();
        let event = Event::new("Claimed", UserId::new(), EventStatus::Completed);
        let id = event.id;
        repo.put(event).await;

        // Nothing to release before a secret is stored
        assert_eq!(repo.claim_escrow_release(&id).await.unwrap(), 0);

        repo.set_escrow(&id, "GPUB", "iv:tag:ct").await.unwrap();
        assert_eq!(repo.claim_escrow_release(&id).await.unwrap(), 1);
        assert_eq!(repo.claim_escrow_release(&id).await.unwrap(), 0);

        assert_eq!(repo.abandon_escrow_release(&id).await.unwrap(), 1);
        assert_eq!(repo.claim_escrow_release(&id).await.unwrap(), 1);

        assert_eq!(repo.clear_escrow_secret(&id).await.unwrap(), 1);
        assert_eq!(repo.claim_escrow_release(&id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_nonce_take_is_single_use() {
        let store = InMemoryNonceStore::new();
        let challenge = NonceChallenge::generate("GKEY");
        store
            .store(challenge.clone(), Duration::from_secs(300))
            .await
            .unwrap();

        assert_eq!(store.take("GKEY").await.unwrap(), Some(challenge));
        assert_eq!(store.take("GKEY").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_queue_dequeue_times_out_when_empty() {
        let queue = InMemoryNotificationQueue::new();
        let job = queue.dequeue(Duration::from_millis(10)).await.unwrap();
        assert!(job.is_none());
    }

    #[tokio::test]
    async fn test_ledger_fund_release_cycle() {
        let ledger = InMemoryLedger::new();
        let (_, funder) = generate_keypair_strkeys();
        let escrow = ledger.generate_escrow_keypair();

        ledger
            .fund_escrow_account(&funder, &escrow.public_key)
            .await
            .unwrap();
        ledger
            .credit(&escrow.public_key, "XLM", Decimal::from(98))
            .await;
        assert_eq!(
            ledger.get_xlm_balance(&escrow.public_key).await.unwrap(),
            "100.0000000"
        );

        ledger
            .release_escrow_funds(&escrow.secret, "GORGANIZER")
            .await
            .unwrap();
        assert_eq!(ledger.balance("GORGANIZER", "XLM").await, Decimal::from(100));
        assert!(ledger.get_xlm_balance(&escrow.public_key).await.is_err());
    }

    #[tokio::test]
    async fn test_ledger_send_payment_rejects_overdraft() {
        let ledger = InMemoryLedger::new();
        let escrow = ledger.generate_escrow_keypair();
        ledger.credit(&escrow.public_key, "XLM", Decimal::from(5)).await;

        let err = ledger
            .send_payment(&escrow.secret, "GPAYER", "10", "XLM")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Rejected(_)));
    }
}
