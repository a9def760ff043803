//! Refunds for cancelled events.

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{Method, StatusCode};
use rust_decimal::Decimal;

use stellar_ticketing::auth::Role;
use stellar_ticketing::domain::{EventStatus, NotificationJob, PaymentStatus, UserId};
use stellar_ticketing::infra::{
    AuditAction, EscrowKeypair, InMemoryLedger, LedgerAccount, LedgerClient, LedgerError,
    LedgerTransaction, PaymentRepository, SubmittedTransaction, TicketingError,
};
use stellar_ticketing::service::{RefundOutcome, RefundService};

use common::*;

#[tokio::test]
async fn test_refund_cancelled_event() {
    let h = Harness::new();
    let event = h.add_event(EventStatus::Published).await;
    let escrow_key = h.escrow.create_escrow(&event.id).await.unwrap();

    let alice = h.add_user_with_wallet("alice@example.com").await;
    let bob = h.add_user_with_wallet("bob@example.com").await;
    let whale = h.add_user_with_wallet("whale@example.com").await;
    let walletless = h.add_user("nowallet@example.com").await;

    let pay_alice = h.confirmed_payment(&event, &alice, 10).await;
    let pay_bob = h.confirmed_payment(&event, &bob, 25).await;
    let pay_whale = h.confirmed_payment(&event, &whale, 100).await;
    let pay_none = h.confirmed_payment(&event, &walletless, 5).await;

    // Escrow holds the starting balance plus 35 XLM: the whale cannot be covered
    h.ledger.credit(&escrow_key, "XLM", Decimal::new(35, 0)).await;
    h.events.set_status(&event.id, EventStatus::Cancelled).await;

    let results = h.refunds.refund_event(&event.id).await.unwrap();
    assert_eq!(results.len(), 4);
    let outcome = |id| results.iter().find(|r| r.payment_id == id).unwrap().outcome;
    assert_eq!(outcome(pay_alice.id), RefundOutcome::Refunded);
    assert_eq!(outcome(pay_bob.id), RefundOutcome::Refunded);
    assert_eq!(outcome(pay_whale.id), RefundOutcome::Failed);
    assert_eq!(outcome(pay_none.id), RefundOutcome::Skipped);

    let alice_wallet = alice.stellar_public_key.clone().unwrap();
    let bob_wallet = bob.stellar_public_key.clone().unwrap();
    assert_eq!(h.ledger.balance(&alice_wallet, "XLM").await, Decimal::new(10, 0));
    assert_eq!(h.ledger.balance(&bob_wallet, "XLM").await, Decimal::new(25, 0));

    let refunded = h.payments.get_payment(&pay_alice.id).await.unwrap().unwrap();
    assert_eq!(refunded.status, PaymentStatus::Refunded);
    let untouched = h.payments.get_payment(&pay_whale.id).await.unwrap().unwrap();
    assert_eq!(untouched.status, PaymentStatus::Confirmed);

    let refund_jobs = h
        .queue
        .pending()
        .await
        .into_iter()
        .filter(|q| matches!(q.job, NotificationJob::RefundIssued { .. }))
        .count();
    assert_eq!(refund_jobs, 2);
    assert_eq!(h.audit.entries_for(&AuditAction::PaymentRefunded).await.len(), 2);
    assert_eq!(h.audit.entries_for(&AuditAction::RefundFailed).await.len(), 1);

    // Running again only retries what is still confirmed
    let again = h.refunds.refund_event(&event.id).await.unwrap();
    let ids: Vec<_> = again.iter().map(|r| r.payment_id).collect();
    assert_eq!(again.len(), 2);
    assert!(ids.contains(&pay_whale.id));
    assert!(ids.contains(&pay_none.id));
}

#[tokio::test]
async fn test_refund_refused_for_live_event() {
    let h = Harness::new();
    let event = h.add_event(EventStatus::Published).await;
    h.escrow.create_escrow(&event.id).await.unwrap();

    let err = h.refunds.refund_event(&event.id).await.unwrap_err();
    assert!(matches!(err, TicketingError::InvalidState(_)));
}

#[tokio::test]
async fn test_http_refund_is_admin_only() {
    let h = Harness::new();
    let app = h.router();
    let event = h.add_event(EventStatus::Published).await;
    h.escrow.create_escrow(&event.id).await.unwrap();
    h.events.set_status(&event.id, EventStatus::Cancelled).await;

    let uri = format!("/api/v1/refunds/event/{}", event.id);
    let organizer = h.token(&event.organizer_id, Role::Organizer);
    let (status, _, _) = send_request(&app, Method::POST, &uri, None, Some(&organizer)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = h.token(&UserId::new(), Role::Admin);
    let (status, _, body) = send_request(&app, Method::POST, &uri, None, Some(&admin)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["refunded"], 0);
    assert!(body["results"].as_array().unwrap().is_empty());
}

/// Ledger whose payments take a while to land
struct SlowPaymentLedger {
    inner: Arc<InMemoryLedger>,
    delay: Duration,
}

#[async_trait]
impl LedgerClient for SlowPaymentLedger {
    async fn get_transaction(&self, hash: &str) -> Result<LedgerTransaction, LedgerError> {
        self.inner.get_transaction(hash).await
    }

    fn generate_escrow_keypair(&self) -> EscrowKeypair {
        self.inner.generate_escrow_keypair()
    }

    async fn fund_escrow_account(
        &self,
        funder_secret: &str,
        destination: &str,
    ) -> Result<SubmittedTransaction, LedgerError> {
        self.inner.fund_escrow_account(funder_secret, destination).await
    }

    async fn release_escrow_funds(
        &self,
        escrow_secret: &str,
        destination: &str,
    ) -> Result<SubmittedTransaction, LedgerError> {
        self.inner.release_escrow_funds(escrow_secret, destination).await
    }

    async fn get_xlm_balance(&self, public_key: &str) -> Result<String, LedgerError> {
        self.inner.get_xlm_balance(public_key).await
    }

    async fn get_account(&self, public_key: &str) -> Result<LedgerAccount, LedgerError> {
        self.inner.get_account(public_key).await
    }

    async fn send_payment(
        &self,
        source_secret: &str,
        destination: &str,
        amount: &str,
        asset_code: &str,
    ) -> Result<SubmittedTransaction, LedgerError> {
        tokio::time::sleep(self.delay).await;
        self.inner
            .send_payment(source_secret, destination, amount, asset_code)
            .await
    }
}

#[tokio::test]
async fn test_overlapping_refund_runs_pay_once() {
    let h = Harness::new();
    let event = h.add_event(EventStatus::Published).await;
    let escrow_key = h.escrow.create_escrow(&event.id).await.unwrap();
    let alice = h.add_user_with_wallet("alice@example.com").await;
    let payment = h.confirmed_payment(&event, &alice, 10).await;
    h.ledger.credit(&escrow_key, "XLM", Decimal::new(50, 0)).await;
    h.events.set_status(&event.id, EventStatus::Cancelled).await;

    let slow: Arc<dyn LedgerClient> = Arc::new(SlowPaymentLedger {
        inner: h.ledger.clone(),
        delay: Duration::from_millis(50),
    });
    let refunds = RefundService::new(
        h.escrow.clone(),
        h.payments.clone(),
        h.users.clone(),
        slow,
        h.queue.clone(),
        h.audit.clone(),
    );

    let (a, b) = tokio::join!(
        refunds.refund_event(&event.id),
        refunds.refund_event(&event.id)
    );
    let outcomes: Vec<_> = a
        .unwrap()
        .into_iter()
        .chain(b.unwrap())
        .map(|r| r.outcome)
        .collect();
    assert_eq!(
        outcomes
            .iter()
            .filter(|o| **o == RefundOutcome::Refunded)
            .count(),
        1,
        "{outcomes:?}"
    );

    let wallet = alice.stellar_public_key.clone().unwrap();
    assert_eq!(h.ledger.balance(&wallet, "XLM").await, Decimal::new(10, 0));
    let stored = h.payments.get_payment(&payment.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PaymentStatus::Refunded);
}
