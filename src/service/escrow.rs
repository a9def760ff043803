//! Per-event escrow accounts
//!
//! An escrow account is created and funded when an event is published. Its
//! secret seed is stored only as an AES-256-GCM envelope and is cleared once
//! the balance has been released to the organizer. Cancelled events keep the
//! secret so the refund orchestrator can pay attendees back.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::crypto::{strkey, SecretCipher};
use crate::domain::{Event, EventId, EventStatus};
use crate::infra::{
    record_audit, AuditAction, AuditLogBuilder, AuditSink, EventRepository, LedgerClient, Result,
    TicketingError,
};

/// Outcome of releasing an escrow to the organizer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EscrowRelease {
    pub tx_hash: String,
    /// Balance at release time, as reported by the ledger
    pub amount: String,
}

/// Escrow state of a cancelled event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancellationSnapshot {
    pub escrow_public_key: String,
    pub balance: String,
}

/// Escrow lifecycle: create on publish, release on completion, inspect on cancel
pub struct EscrowService {
    events: Arc<dyn EventRepository>,
    ledger: Arc<dyn LedgerClient>,
    audit: Arc<dyn AuditSink>,
    cipher: SecretCipher,
    funder_secret: String,
}

impl EscrowService {
    pub fn new(
        events: Arc<dyn EventRepository>,
        ledger: Arc<dyn LedgerClient>,
        audit: Arc<dyn AuditSink>,
        cipher: SecretCipher,
        funder_secret: impl Into<String>,
    ) -> Self {
        Self {
            events,
            ledger,
            audit,
            cipher,
            funder_secret: funder_secret.into(),
        }
    }

    /// Create and fund the escrow account of a published event.
    ///
    /// Returns the escrow public key. Calling again returns the existing key
    /// without funding a second account.
    pub async fn create_escrow(&self, event_id: &EventId) -> Result<String> {
        let event = self.load_event(event_id).await?;

        if event.status != EventStatus::Published {
            return Err(TicketingError::InvalidState(
                "event not published".to_string(),
            ));
        }

        if let Some(existing) = event.escrow_public_key {
            return Ok(existing);
        }

        let keypair = self.ledger.generate_escrow_keypair();
        let funding = self
            .ledger
            .fund_escrow_account(&self.funder_secret, &keypair.public_key)
            .await?;

        let secret_encrypted = self.cipher.encrypt_secret(&keypair.secret)?;
        let rows = self
            .events
            .set_escrow(event_id, &keypair.public_key, &secret_encrypted)
            .await?;

        if rows == 0 {
            let winner = self
                .load_event(event_id)
                .await?
                .escrow_public_key
                .ok_or_else(|| {
                    TicketingError::Internal("escrow update lost without a stored key".to_string())
                })?;
            warn!(
                event_id = %event_id,
                orphaned_account = %keypair.public_key,
                escrow_public_key = %winner,
                "Concurrent escrow creation; funded account left orphaned"
            );
            return Ok(winner);
        }

        info!(
            event_id = %event_id,
            escrow_public_key = %keypair.public_key,
            funding_tx = %funding.hash,
            "Escrow account created"
        );
        record_audit(
            self.audit.as_ref(),
            AuditLogBuilder::system(AuditAction::EscrowCreated)
                .resource("event", event_id)
                .details(serde_json::json!({
                    "escrowPublicKey": keypair.public_key,
                    "fundingTxHash": funding.hash,
                }))
                .build(),
        )
        .await;

        Ok(keypair.public_key)
    }

    /// Move the escrow balance of a completed event to the organizer
    pub async fn release_escrow(
        &self,
        event_id: &EventId,
        organizer_wallet: &str,
    ) -> Result<EscrowRelease> {
        if !strkey::is_valid_account_id(organizer_wallet) {
            return Err(TicketingError::InvalidRequest(
                "organizer wallet is not a valid Stellar account id".to_string(),
            ));
        }

        let event = self.load_event(event_id).await?;
        let escrow_public_key = match (&event.status, &event.escrow_public_key) {
            (EventStatus::Completed, Some(key)) => key.clone(),
            (EventStatus::Completed, None) => {
                return Err(TicketingError::InvalidState(
                    "event has no escrow account".to_string(),
                ))
            }
            _ => {
                return Err(TicketingError::InvalidState(
                    "event not completed".to_string(),
                ))
            }
        };

        let secret = self.decrypt_secret(&event)?;
        if self.events.claim_escrow_release(event_id).await? == 0 {
            return Err(TicketingError::InvalidState(
                "escrow already released or release in progress".to_string(),
            ));
        }

        let transfer = async {
            let amount = self.ledger.get_xlm_balance(&escrow_public_key).await?;
            let tx = self
                .ledger
                .release_escrow_funds(&secret, organizer_wallet)
                .await?;
            Ok::<_, TicketingError>((amount, tx))
        }
        .await;
        let (amount, tx) = match transfer {
            Ok(done) => done,
            Err(e) => {
                if let Err(abandon) = self.events.abandon_escrow_release(event_id).await {
                    warn!(event_id = %event_id, error = %abandon, "Failed to drop escrow release claim");
                }
                return Err(e);
            }
        };

        if self.events.clear_escrow_secret(event_id).await? == 0 {
            warn!(event_id = %event_id, "Escrow secret was already cleared");
        }

        info!(
            event_id = %event_id,
            tx_hash = %tx.hash,
            amount = %amount,
            "Escrow released to organizer"
        );
        record_audit(
            self.audit.as_ref(),
            AuditLogBuilder::system(AuditAction::EscrowReleased)
                .resource("event", event_id)
                .details(serde_json::json!({
                    "txHash": tx.hash,
                    "organizerWallet": organizer_wallet,
                    "amount": amount,
                }))
                .build(),
        )
        .await;

        Ok(EscrowRelease {
            tx_hash: tx.hash,
            amount,
        })
    }

    /// Read-only view of a cancelled event's escrow
    pub async fn handle_cancellation(&self, event_id: &EventId) -> Result<CancellationSnapshot> {
        let event = self.load_event(event_id).await?;
        let escrow_public_key = Self::cancelled_escrow_key(&event)?;
        let balance = self.ledger.get_xlm_balance(&escrow_public_key).await?;

        record_audit(
            self.audit.as_ref(),
            AuditLogBuilder::system(AuditAction::EscrowCancellationInspected)
                .resource("event", event_id)
                .details(serde_json::json!({
                    "escrowPublicKey": escrow_public_key,
                    "balance": balance,
                }))
                .build(),
        )
        .await;

        Ok(CancellationSnapshot {
            escrow_public_key,
            balance,
        })
    }

    /// Decrypted escrow seed of a cancelled event, for paying refunds
    pub(crate) async fn cancelled_escrow_secret(&self, event_id: &EventId) -> Result<String> {
        let event = self.load_event(event_id).await?;
        Self::cancelled_escrow_key(&event)?;
        self.decrypt_secret(&event)
    }

    fn cancelled_escrow_key(event: &Event) -> Result<String> {
        match (&event.status, &event.escrow_public_key) {
            (EventStatus::Cancelled, Some(key)) => Ok(key.clone()),
            (EventStatus::Cancelled, None) => Err(TicketingError::InvalidState(
                "event has no escrow account".to_string(),
            )),
            _ => Err(TicketingError::InvalidState(
                "event not cancelled".to_string(),
            )),
        }
    }

    fn decrypt_secret(&self, event: &Event) -> Result<String> {
        let envelope = event.escrow_secret_encrypted.as_deref().ok_or_else(|| {
            TicketingError::InvalidState("escrow already released".to_string())
        })?;
        Ok(self.cipher.decrypt_secret(envelope)?)
    }

    async fn load_event(&self, event_id: &EventId) -> Result<Event> {
        self.events
            .get_event(event_id)
            .await?
            .ok_or_else(|| TicketingError::not_found("event", event_id))
    }
}
