//! Refunds for cancelled events
//!
//! Each confirmed payment is refunded independently from the event's escrow
//! account: one failed transfer is reported and the loop moves on.
//!
//! A payment is claimed (`confirmed -> refunding`) before any funds move, so
//! overlapping runs never pay the same payment twice. A failed transfer puts
//! the claim back; a payment stuck in `refunding` needs reconciliation against
//! the ledger.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::domain::{
    EventId, JobOptions, NotificationJob, Payment, PaymentId, PaymentStatus, User,
};
use crate::infra::{
    record_audit, AuditAction, AuditLogBuilder, AuditSink, LedgerClient, NotificationQueue,
    PaymentRepository, Result, UserDirectory,
};

use super::EscrowService;

/// What happened to one payment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundOutcome {
    Refunded,
    Skipped,
    Failed,
}

/// Per-payment refund report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundResult {
    pub payment_id: PaymentId,
    pub outcome: RefundOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl RefundResult {
    fn refunded(payment_id: PaymentId, tx_hash: String) -> Self {
        Self {
            payment_id,
            outcome: RefundOutcome::Refunded,
            tx_hash: Some(tx_hash),
            reason: None,
        }
    }

    fn skipped(payment_id: PaymentId, reason: impl Into<String>) -> Self {
        Self {
            payment_id,
            outcome: RefundOutcome::Skipped,
            tx_hash: None,
            reason: Some(reason.into()),
        }
    }

    fn failed(payment_id: PaymentId, reason: impl Into<String>) -> Self {
        Self {
            payment_id,
            outcome: RefundOutcome::Failed,
            tx_hash: None,
            reason: Some(reason.into()),
        }
    }
}

/// Pays back attendees of a cancelled event
pub struct RefundService {
    escrow: Arc<EscrowService>,
    payments: Arc<dyn PaymentRepository>,
    users: Arc<dyn UserDirectory>,
    ledger: Arc<dyn LedgerClient>,
    notifications: Arc<dyn NotificationQueue>,
    audit: Arc<dyn AuditSink>,
}

impl RefundService {
    pub fn new(
        escrow: Arc<EscrowService>,
        payments: Arc<dyn PaymentRepository>,
        users: Arc<dyn UserDirectory>,
        ledger: Arc<dyn LedgerClient>,
        notifications: Arc<dyn NotificationQueue>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            escrow,
            payments,
            users,
            ledger,
            notifications,
            audit,
        }
    }

    /// Refund every confirmed payment of a cancelled event
    pub async fn refund_event(&self, event_id: &EventId) -> Result<Vec<RefundResult>> {
        let snapshot = self.escrow.handle_cancellation(event_id).await?;
        let escrow_secret = self.escrow.cancelled_escrow_secret(event_id).await?;
        let payments = self.payments.list_confirmed_for_event(event_id).await?;

        info!(
            event_id = %event_id,
            escrow_public_key = %snapshot.escrow_public_key,
            balance = %snapshot.balance,
            payments = payments.len(),
            "Refunding cancelled event"
        );

        let mut results = Vec::with_capacity(payments.len());
        for payment in payments {
            let result = self.refund_payment(&payment, &escrow_secret).await;
            if result.outcome != RefundOutcome::Refunded {
                warn!(
                    payment_id = %payment.id,
                    outcome = ?result.outcome,
                    reason = ?result.reason,
                    "Payment not refunded"
                );
            }
            results.push(result);
        }

        Ok(results)
    }

    async fn refund_payment(&self, payment: &Payment, escrow_secret: &str) -> RefundResult {
        let user = match self.users.get_user(&payment.user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => return RefundResult::skipped(payment.id, "payer not found"),
            Err(e) => return RefundResult::failed(payment.id, e.to_string()),
        };
        let Some(wallet) = user.stellar_public_key.clone() else {
            return RefundResult::skipped(payment.id, "payer has no linked wallet");
        };

        match self
            .payments
            .transition_status(&payment.id, PaymentStatus::Confirmed, PaymentStatus::Refunding)
            .await
        {
            Ok(0) => return RefundResult::skipped(payment.id, "refund already in progress"),
            Ok(_) => {}
            Err(e) => return RefundResult::failed(payment.id, e.to_string()),
        }

        let amount = payment.amount_string();
        let tx = match self
            .ledger
            .send_payment(escrow_secret, &wallet, &amount, &payment.currency)
            .await
        {
            Ok(tx) => tx,
            Err(e) => {
                self.release_claim(&payment.id).await;
                record_audit(
                    self.audit.as_ref(),
                    AuditLogBuilder::system(AuditAction::RefundFailed)
                        .resource("payment", payment.id)
                        .details(serde_json::json!({ "wallet": wallet, "amount": amount }))
                        .failed(e.to_string())
                        .build(),
                )
                .await;
                return RefundResult::failed(payment.id, e.to_string());
            }
        };

        match self
            .payments
            .transition_status(&payment.id, PaymentStatus::Refunding, PaymentStatus::Refunded)
            .await
        {
            Ok(1) => {}
            // Funds already moved: report the transfer, flag the bookkeeping gap
            Ok(_) => warn!(payment_id = %payment.id, tx_hash = %tx.hash, "Refund sent but payment was no longer refunding"),
            Err(e) => {
                warn!(payment_id = %payment.id, tx_hash = %tx.hash, error = %e, "Refund sent but payment status not updated")
            }
        }

        record_audit(
            self.audit.as_ref(),
            AuditLogBuilder::system(AuditAction::PaymentRefunded)
                .resource("payment", payment.id)
                .details(serde_json::json!({
                    "eventId": payment.event_id,
                    "wallet": wallet,
                    "amount": amount,
                    "currency": payment.currency,
                    "txHash": tx.hash,
                }))
                .build(),
        )
        .await;

        self.notify_refund(&user, payment).await;
        RefundResult::refunded(payment.id, tx.hash)
    }

    /// Return a claimed payment to `confirmed` so a later run retries it
    async fn release_claim(&self, payment_id: &PaymentId) {
        if let Err(e) = self
            .payments
            .transition_status(payment_id, PaymentStatus::Refunding, PaymentStatus::Confirmed)
            .await
        {
            warn!(payment_id = %payment_id, error = %e, "Failed to release refund claim");
        }
    }

    async fn notify_refund(&self, user: &User, payment: &Payment) {
        let job = NotificationJob::RefundIssued {
            email: user.email.clone(),
            payment_id: payment.id,
            amount: payment.amount_string(),
            currency: payment.currency.clone(),
        };
        if let Err(e) = self
            .notifications
            .enqueue(job, JobOptions::refund_email())
            .await
        {
            warn!(payment_id = %payment.id, error = %e, "Failed to queue refund email");
        }
    }
}
