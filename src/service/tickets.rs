//! Ticket issuance, transfer and gate verification
//!
//! Issuance is idempotent per on-chain transaction: the transaction hash is
//! unique on the ticket table, so a retried `issue_ticket` re-signs the
//! existing row instead of minting a second one.
//!
//! Gate verification checks the signature before touching storage, then
//! flips `valid -> used` with a conditional update. Zero rows affected means
//! another scan won the race and is reported as already used.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::crypto::TicketSigner;
use crate::domain::{
    JobOptions, NewTicket, NotificationJob, Payment, PaymentId, Ticket, TicketId, TicketInsert,
    TicketPayload, TicketStatus, UserId,
};
use crate::infra::{
    record_audit, AuditAction, AuditLogBuilder, AuditSink, EventRepository, LedgerClient,
    NotificationQueue, PaymentRepository, Result, TicketRepository, TicketingError,
    UserDirectory,
};

/// A signed ticket ready to hand to its holder
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuedTicket {
    pub ticket: Ticket,
    /// Hex Ed25519 signature over the ticket id
    pub signature: String,
    /// `{ticketId, signature}` as scanned at the gate
    pub payload: TicketPayload,
    /// Base64url rendering of `payload` for QR encoding
    pub qr_data: String,
}

/// Issues, transfers and admits tickets
pub struct TicketService {
    payments: Arc<dyn PaymentRepository>,
    tickets: Arc<dyn TicketRepository>,
    events: Arc<dyn EventRepository>,
    users: Arc<dyn UserDirectory>,
    ledger: Arc<dyn LedgerClient>,
    signer: Arc<TicketSigner>,
    notifications: Arc<dyn NotificationQueue>,
    audit: Arc<dyn AuditSink>,
}

impl TicketService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        payments: Arc<dyn PaymentRepository>,
        tickets: Arc<dyn TicketRepository>,
        events: Arc<dyn EventRepository>,
        users: Arc<dyn UserDirectory>,
        ledger: Arc<dyn LedgerClient>,
        signer: Arc<TicketSigner>,
        notifications: Arc<dyn NotificationQueue>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            payments,
            tickets,
            events,
            users,
            ledger,
            signer,
            notifications,
            audit,
        }
    }

    /// Mint (or re-sign) the ticket backed by a confirmed payment
    pub async fn issue_ticket(&self, payment_id: &PaymentId) -> Result<IssuedTicket> {
        self.issue(payment_id, None).await
    }

    /// Like [`Self::issue_ticket`], on behalf of an attendee.
    ///
    /// A new ticket is only minted for the payer; an existing one is only
    /// re-signed for its current owner.
    pub async fn issue_ticket_for(
        &self,
        payment_id: &PaymentId,
        caller: &UserId,
    ) -> Result<IssuedTicket> {
        self.issue(payment_id, Some(caller)).await
    }

    async fn issue(&self, payment_id: &PaymentId, caller: Option<&UserId>) -> Result<IssuedTicket> {
        let payment = self
            .payments
            .get_payment(payment_id)
            .await?
            .ok_or_else(|| TicketingError::not_found("payment", payment_id))?;

        let transaction_hash = payment
            .confirmed_transaction()
            .ok_or_else(|| {
                TicketingError::InvalidRequest(format!(
                    "payment {} is not confirmed or has no transaction hash (status: {})",
                    payment.id, payment.status
                ))
            })?
            .to_string();

        if let Some(existing) = self
            .tickets
            .find_by_transaction_hash(&transaction_hash)
            .await?
        {
            if caller.is_some_and(|c| *c != existing.owner_id) {
                return Err(TicketingError::Forbidden(format!(
                    "ticket {} is owned by another user",
                    existing.id
                )));
            }
            debug!(
                payment_id = %payment.id,
                ticket_id = %existing.id,
                "Ticket already issued for transaction, re-signing"
            );
            return self.sign_ticket(existing);
        }

        if caller.is_some_and(|c| *c != payment.user_id) {
            return Err(TicketingError::Forbidden(format!(
                "payment {} belongs to another user",
                payment.id
            )));
        }

        self.check_memo(&payment, &transaction_hash).await?;

        let inserted = self
            .tickets
            .insert(NewTicket {
                event_id: payment.event_id,
                owner_id: payment.user_id,
                asset_code: payment.currency.clone(),
                transaction_hash,
            })
            .await?;

        let ticket = match inserted {
            TicketInsert::Created(ticket) => {
                info!(
                    ticket_id = %ticket.id,
                    event_id = %ticket.event_id,
                    payment_id = %payment.id,
                    "Ticket issued"
                );
                record_audit(
                    self.audit.as_ref(),
                    AuditLogBuilder::new(AuditAction::TicketIssued, ticket.owner_id.to_string())
                        .resource("ticket", ticket.id)
                        .details(serde_json::json!({
                            "paymentId": payment.id,
                            "eventId": ticket.event_id,
                            "transactionHash": ticket.transaction_hash,
                        }))
                        .build(),
                )
                .await;
                self.notify_ticket_issued(&ticket).await;
                ticket
            }
            TicketInsert::Existing(ticket) => {
                debug!(ticket_id = %ticket.id, "Concurrent issuance already minted this ticket");
                ticket
            }
        };

        self.sign_ticket(ticket)
    }

    /// Hand a valid ticket to a new owner
    pub async fn transfer_ticket(
        &self,
        ticket_id: &TicketId,
        caller: &UserId,
        new_owner: &UserId,
    ) -> Result<Ticket> {
        let ticket = self
            .tickets
            .find_by_id(ticket_id)
            .await?
            .ok_or_else(|| TicketingError::not_found("ticket", ticket_id))?;

        Self::check_transferable(&ticket, caller)?;

        let rows = self
            .tickets
            .transfer_owner(ticket_id, caller, new_owner)
            .await?;
        if rows == 0 {
            // State moved between the read and the update; report what it is now
            let current = self
                .tickets
                .find_by_id(ticket_id)
                .await?
                .ok_or_else(|| TicketingError::not_found("ticket", ticket_id))?;
            Self::check_transferable(&current, caller)?;
            return Err(TicketingError::InvalidState(
                "ticket changed during transfer".to_string(),
            ));
        }

        record_audit(
            self.audit.as_ref(),
            AuditLogBuilder::new(AuditAction::TicketTransferred, caller.to_string())
                .resource("ticket", ticket_id)
                .details(serde_json::json!({
                    "from": caller,
                    "to": new_owner,
                }))
                .build(),
        )
        .await;

        Ok(Ticket {
            owner_id: *new_owner,
            ..ticket
        })
    }

    /// Gate scan: admit the ticket exactly once
    pub async fn verify_ticket(&self, ticket_id: &TicketId, signature: &str) -> Result<Ticket> {
        if !self.signer.verify(ticket_id.to_string().as_bytes(), signature) {
            return Err(TicketingError::Unauthorized(
                "invalid ticket signature".to_string(),
            ));
        }

        let ticket = self
            .tickets
            .find_by_id(ticket_id)
            .await?
            .ok_or_else(|| TicketingError::not_found("ticket", ticket_id))?;

        match ticket.status {
            TicketStatus::Used => {
                return Err(TicketingError::AlreadyUsed(ticket_id.to_string()));
            }
            TicketStatus::Valid => {}
        }

        let used = self
            .tickets
            .mark_used(ticket_id)
            .await?
            .ok_or_else(|| TicketingError::AlreadyUsed(ticket_id.to_string()))?;

        info!(ticket_id = %used.id, event_id = %used.event_id, "Ticket admitted");
        record_audit(
            self.audit.as_ref(),
            AuditLogBuilder::system(AuditAction::TicketVerified)
                .resource("ticket", used.id)
                .details(serde_json::json!({ "eventId": used.event_id }))
                .build(),
        )
        .await;

        Ok(used)
    }

    /// Gate scan from the raw QR content (JSON or base64url)
    pub async fn verify_scanned(&self, scanned: &str) -> Result<Ticket> {
        let payload = TicketPayload::parse(scanned).ok_or_else(|| {
            TicketingError::InvalidRequest("unreadable ticket payload".to_string())
        })?;
        self.verify_ticket(&payload.ticket_id, &payload.signature)
            .await
    }

    fn check_transferable(ticket: &Ticket, caller: &UserId) -> Result<()> {
        if ticket.owner_id != *caller {
            return Err(TicketingError::Forbidden(
                "only the ticket owner can transfer it".to_string(),
            ));
        }
        if !ticket.is_valid() {
            return Err(TicketingError::InvalidState(format!(
                "ticket is {} and cannot be transferred",
                ticket.status
            )));
        }
        Ok(())
    }

    async fn check_memo(&self, payment: &Payment, transaction_hash: &str) -> Result<()> {
        let transaction = self.ledger.get_transaction(transaction_hash).await?;
        let expected = payment.id.to_string();

        match transaction.memo.as_deref() {
            None => Err(TicketingError::InvalidRequest(
                "Transaction is missing memo. Cannot verify payment reference.".to_string(),
            )),
            Some(memo) if memo != expected => Err(TicketingError::InvalidRequest(format!(
                "Transaction memo does not match paymentId. Expected \"{}\", got \"{}\".",
                expected, memo
            ))),
            Some(_) => Ok(()),
        }
    }

    fn sign_ticket(&self, ticket: Ticket) -> Result<IssuedTicket> {
        let signature = self.signer.sign(ticket.id.to_string().as_bytes())?;
        let payload = TicketPayload::new(ticket.id, signature.clone());
        let qr_data = payload.to_qr_data();
        Ok(IssuedTicket {
            ticket,
            signature,
            payload,
            qr_data,
        })
    }

    async fn notify_ticket_issued(&self, ticket: &Ticket) {
        let user = match self.users.get_user(&ticket.owner_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                warn!(owner_id = %ticket.owner_id, "Ticket owner not found, skipping email");
                return;
            }
            Err(e) => {
                warn!(error = %e, "Failed to load ticket owner, skipping email");
                return;
            }
        };
        let event_name = match self.events.get_event(&ticket.event_id).await {
            Ok(Some(event)) => event.title,
            Ok(None) => "your event".to_string(),
            Err(e) => {
                warn!(error = %e, "Failed to load event, skipping email");
                return;
            }
        };

        let job = NotificationJob::TicketIssued {
            email: user.email,
            ticket_id: ticket.id,
            event_name,
        };
        if let Err(e) = self
            .notifications
            .enqueue(job, JobOptions::ticket_email())
            .await
        {
            warn!(ticket_id = %ticket.id, error = %e, "Failed to queue ticket email");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Event, EventId, EventStatus, User};
    use crate::infra::{
        LedgerError, LedgerTransaction, MockAuditSink, MockEventRepository, MockLedgerClient,
        MockNotificationQueue, MockPaymentRepository, MockTicketRepository, MockUserDirectory,
    };
    use chrono::Utc;
    use rust_decimal::Decimal;

    struct Mocks {
        payments: MockPaymentRepository,
        tickets: MockTicketRepository,
        events: MockEventRepository,
        users: MockUserDirectory,
        ledger: MockLedgerClient,
        notifications: MockNotificationQueue,
        audit: MockAuditSink,
    }

    impl Mocks {
        fn new() -> Self {
            let mut audit = MockAuditSink::new();
            audit.expect_log().returning(|_| Ok(()));
            Self {
                payments: MockPaymentRepository::new(),
                tickets: MockTicketRepository::new(),
                events: MockEventRepository::new(),
                users: MockUserDirectory::new(),
                ledger: MockLedgerClient::new(),
                notifications: MockNotificationQueue::new(),
                audit,
            }
        }

        fn into_service(self, signer: TicketSigner) -> TicketService {
            TicketService::new(
                Arc::new(self.payments),
                Arc::new(self.tickets),
                Arc::new(self.events),
                Arc::new(self.users),
                Arc::new(self.ledger),
                Arc::new(signer),
                Arc::new(self.notifications),
                Arc::new(self.audit),
            )
        }
    }

    fn confirmed_payment() -> Payment {
        Payment::pending(EventId::new(), UserId::new(), Decimal::new(250, 1)).confirmed("tx-abc")
    }

    fn ticket_for(payment: &Payment) -> Ticket {
        NewTicket {
            event_id: payment.event_id,
            owner_id: payment.user_id,
            asset_code: payment.currency.clone(),
            transaction_hash: "tx-abc".to_string(),
        }
        .into_ticket()
    }

    #[tokio::test]
    async fn test_issue_rejects_unconfirmed_payment() {
        let mut mocks = Mocks::new();
        let payment = Payment::pending(EventId::new(), UserId::new(), Decimal::ONE);
        let id = payment.id;
        mocks
            .payments
            .expect_get_payment()
            .returning(move |_| Ok(Some(payment.clone())));
        mocks.tickets.expect_insert().never();

        let service = mocks.into_service(TicketSigner::generate());
        let err = service.issue_ticket(&id).await.unwrap_err();
        assert!(matches!(err, TicketingError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_issue_rejects_memo_mismatch() {
        let mut mocks = Mocks::new();
        let payment = confirmed_payment();
        let id = payment.id;
        mocks
            .payments
            .expect_get_payment()
            .returning(move |_| Ok(Some(payment.clone())));
        mocks
            .tickets
            .expect_find_by_transaction_hash()
            .returning(|_| Ok(None));
        mocks.ledger.expect_get_transaction().returning(|hash| {
            Ok(LedgerTransaction {
                hash: hash.to_string(),
                memo: Some("pay-124".to_string()),
            })
        });
        mocks.tickets.expect_insert().never();

        let service = mocks.into_service(TicketSigner::generate());
        let err = service.issue_ticket(&id).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains(&id.to_string()));
        assert!(message.contains("pay-124"));
    }

    #[tokio::test]
    async fn test_issue_rejects_missing_memo() {
        let mut mocks = Mocks::new();
        let payment = confirmed_payment();
        let id = payment.id;
        mocks
            .payments
            .expect_get_payment()
            .returning(move |_| Ok(Some(payment.clone())));
        mocks
            .tickets
            .expect_find_by_transaction_hash()
            .returning(|_| Ok(None));
        mocks.ledger.expect_get_transaction().returning(|hash| {
            Ok(LedgerTransaction {
                hash: hash.to_string(),
                memo: None,
            })
        });

        let service = mocks.into_service(TicketSigner::generate());
        let err = service.issue_ticket(&id).await.unwrap_err();
        assert!(err.to_string().contains("missing memo"));
    }

    #[tokio::test]
    async fn test_issue_surfaces_ledger_failure_as_internal() {
        let mut mocks = Mocks::new();
        let payment = confirmed_payment();
        let id = payment.id;
        mocks
            .payments
            .expect_get_payment()
            .returning(move |_| Ok(Some(payment.clone())));
        mocks
            .tickets
            .expect_find_by_transaction_hash()
            .returning(|_| Ok(None));
        mocks
            .ledger
            .expect_get_transaction()
            .returning(|_| Err(LedgerError::Unavailable("horizon down".into())));

        let service = mocks.into_service(TicketSigner::generate());
        let err = service.issue_ticket(&id).await.unwrap_err();
        assert!(matches!(err, TicketingError::Internal(_)));
    }

    #[tokio::test]
    async fn test_issue_is_idempotent_for_existing_ticket() {
        let mut mocks = Mocks::new();
        let payment = confirmed_payment();
        let existing = ticket_for(&payment);
        let existing_id = existing.id;
        let id = payment.id;
        mocks
            .payments
            .expect_get_payment()
            .returning(move |_| Ok(Some(payment.clone())));
        mocks
            .tickets
            .expect_find_by_transaction_hash()
            .returning(move |_| Ok(Some(existing.clone())));
        mocks.ledger.expect_get_transaction().never();
        mocks.tickets.expect_insert().never();
        mocks.notifications.expect_enqueue().never();

        let signer = TicketSigner::generate();
        let service = mocks.into_service(signer);
        let issued = service.issue_ticket(&id).await.unwrap();
        assert_eq!(issued.ticket.id, existing_id);
        assert_eq!(issued.payload.ticket_id, existing_id);
    }

    #[tokio::test]
    async fn test_issue_survives_notification_failure() {
        let mut mocks = Mocks::new();
        let payment = confirmed_payment();
        let id = payment.id;
        let memo = id.to_string();
        let user = User::new("fan@example.com");
        let event = Event::new("NestFest", UserId::new(), EventStatus::Published);

        mocks
            .payments
            .expect_get_payment()
            .returning(move |_| Ok(Some(payment.clone())));
        mocks
            .tickets
            .expect_find_by_transaction_hash()
            .returning(|_| Ok(None));
        mocks.ledger.expect_get_transaction().returning(move |hash| {
            Ok(LedgerTransaction {
                hash: hash.to_string(),
                memo: Some(memo.clone()),
            })
        });
        mocks
            .tickets
            .expect_insert()
            .times(1)
            .returning(|new| Ok(TicketInsert::Created(new.into_ticket())));
        mocks
            .users
            .expect_get_user()
            .returning(move |_| Ok(Some(user.clone())));
        mocks
            .events
            .expect_get_event()
            .returning(move |_| Ok(Some(event.clone())));
        mocks
            .notifications
            .expect_enqueue()
            .times(1)
            .returning(|_, _| Err(TicketingError::Internal("queue down".into())));

        let signer = TicketSigner::generate();
        let service = mocks.into_service(signer);
        let issued = service.issue_ticket(&id).await.unwrap();
        assert!(issued.ticket.is_valid());
        assert!(service
            .signer
            .verify(issued.ticket.id.to_string().as_bytes(), &issued.signature));
    }

    #[tokio::test]
    async fn test_verify_checks_signature_before_storage() {
        // No expectations on the ticket repository: any call would panic
        let mocks = Mocks::new();
        let service = mocks.into_service(TicketSigner::generate());

        let err = service
            .verify_ticket(&TicketId::new(), &"00".repeat(64))
            .await
            .unwrap_err();
        assert!(matches!(err, TicketingError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn test_verify_lost_race_is_already_used() {
        let mut mocks = Mocks::new();
        let payment = confirmed_payment();
        let ticket = ticket_for(&payment);
        let ticket_id = ticket.id;
        mocks
            .tickets
            .expect_find_by_id()
            .returning(move |_| Ok(Some(ticket.clone())));
        mocks.tickets.expect_mark_used().returning(|_| Ok(None));

        let signer = TicketSigner::generate();
        let signature = signer.sign(ticket_id.to_string().as_bytes()).unwrap();
        let service = mocks.into_service(signer);

        let err = service
            .verify_ticket(&ticket_id, &signature)
            .await
            .unwrap_err();
        assert!(matches!(err, TicketingError::AlreadyUsed(_)));
    }

    #[tokio::test]
    async fn test_verify_used_ticket_is_already_used() {
        let mut mocks = Mocks::new();
        let payment = confirmed_payment();
        let mut ticket = ticket_for(&payment);
        ticket.status = TicketStatus::Used;
        ticket.used_at = Some(Utc::now());
        let ticket_id = ticket.id;
        mocks
            .tickets
            .expect_find_by_id()
            .returning(move |_| Ok(Some(ticket.clone())));
        mocks.tickets.expect_mark_used().never();

        let signer = TicketSigner::generate();
        let signature = signer.sign(ticket_id.to_string().as_bytes()).unwrap();
        let service = mocks.into_service(signer);

        let err = service
            .verify_ticket(&ticket_id, &signature)
            .await
            .unwrap_err();
        assert!(matches!(err, TicketingError::AlreadyUsed(_)));
    }

    #[tokio::test]
    async fn test_transfer_requires_owner() {
        let mut mocks = Mocks::new();
        let payment = confirmed_payment();
        let ticket = ticket_for(&payment);
        let ticket_id = ticket.id;
        mocks
            .tickets
            .expect_find_by_id()
            .returning(move |_| Ok(Some(ticket.clone())));
        mocks.tickets.expect_transfer_owner().never();

        let service = mocks.into_service(TicketSigner::generate());
        let err = service
            .transfer_ticket(&ticket_id, &UserId::new(), &UserId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TicketingError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_transfer_rejects_used_ticket_for_owner() {
        let mut mocks = Mocks::new();
        let payment = confirmed_payment();
        let owner = payment.user_id;
        let mut ticket = ticket_for(&payment);
        ticket.status = TicketStatus::Used;
        let ticket_id = ticket.id;
        mocks
            .tickets
            .expect_find_by_id()
            .returning(move |_| Ok(Some(ticket.clone())));
        mocks.tickets.expect_transfer_owner().never();

        let service = mocks.into_service(TicketSigner::generate());
        let err = service
            .transfer_ticket(&ticket_id, &owner, &UserId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TicketingError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_transfer_classifies_lost_race() {
        let mut mocks = Mocks::new();
        let payment = confirmed_payment();
        let owner = payment.user_id;
        let ticket = ticket_for(&payment);
        let ticket_id = ticket.id;
        let mut used = ticket.clone();
        used.status = TicketStatus::Used;

        let mut seq = mockall::Sequence::new();
        mocks
            .tickets
            .expect_find_by_id()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_| Ok(Some(ticket.clone())));
        mocks
            .tickets
            .expect_transfer_owner()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(0));
        mocks
            .tickets
            .expect_find_by_id()
            .times(1)
            .in_sequence(&mut seq)
            .returning(move |_| Ok(Some(used.clone())));

        let service = mocks.into_service(TicketSigner::generate());
        let err = service
            .transfer_ticket(&ticket_id, &owner, &UserId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TicketingError::InvalidState(_)));
    }
}
