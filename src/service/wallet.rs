//! Wallet linking via signed nonce challenges
//!
//! A challenge is consumed before its signature is checked, so every
//! challenge gets exactly one verification attempt.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::crypto::{strkey, verify_detached};
use crate::domain::{NonceChallenge, User, UserId};
use crate::infra::{
    record_audit, AuditAction, AuditLogBuilder, AuditSink, LedgerClient, NonceStore, Result,
    TicketingError, UserDirectory,
};

/// Challenge handed to the wallet for signing
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletChallenge {
    pub public_key: String,
    pub nonce: String,
    /// Exact message to sign
    pub message: String,
    pub expires_at: DateTime<Utc>,
}

pub struct WalletService {
    nonces: Arc<dyn NonceStore>,
    users: Arc<dyn UserDirectory>,
    ledger: Arc<dyn LedgerClient>,
    audit: Arc<dyn AuditSink>,
}

impl WalletService {
    pub fn new(
        nonces: Arc<dyn NonceStore>,
        users: Arc<dyn UserDirectory>,
        ledger: Arc<dyn LedgerClient>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            nonces,
            users,
            ledger,
            audit,
        }
    }

    /// Issue a fresh challenge, replacing any earlier one for the key
    pub async fn request_challenge(&self, public_key: &str) -> Result<WalletChallenge> {
        Self::check_public_key(public_key)?;

        let challenge = NonceChallenge::generate(public_key);
        let response = WalletChallenge {
            public_key: challenge.public_key.clone(),
            nonce: challenge.nonce.clone(),
            message: challenge.message(),
            expires_at: challenge.created_at + NonceChallenge::ttl(),
        };

        let ttl = NonceChallenge::ttl()
            .to_std()
            .map_err(|e| TicketingError::Internal(format!("challenge ttl: {e}")))?;
        self.nonces.store(challenge, ttl).await?;

        Ok(response)
    }

    /// Verify the signed challenge and link the wallet to the user
    pub async fn verify_and_link(
        &self,
        user_id: &UserId,
        public_key: &str,
        signature: &str,
    ) -> Result<User> {
        Self::check_public_key(public_key)?;

        let challenge = self.nonces.take(public_key).await?.ok_or_else(|| {
            TicketingError::InvalidRequest("no active challenge for this wallet".to_string())
        })?;
        if challenge.is_expired() {
            return Err(TicketingError::InvalidRequest(
                "challenge expired, request a new one".to_string(),
            ));
        }

        verify_detached(public_key, challenge.message().as_bytes(), signature).map_err(|_| {
            TicketingError::Unauthorized("wallet signature verification failed".to_string())
        })?;

        if let Some(owner) = self.users.find_by_wallet(public_key).await? {
            if owner.id != *user_id {
                return Err(TicketingError::Conflict(
                    "wallet already linked to another account".to_string(),
                ));
            }
        }

        if let Err(e) = self.ledger.get_account(public_key).await {
            warn!(public_key = %public_key, error = %e, "Linking wallet not yet active on ledger");
        }

        if self.users.link_wallet(user_id, public_key).await? == 0 {
            return match self.users.get_user(user_id).await? {
                None => Err(TicketingError::not_found("user", user_id)),
                Some(_) => Err(TicketingError::Conflict(
                    "wallet already linked to another account".to_string(),
                )),
            };
        }

        info!(user_id = %user_id, public_key = %public_key, "Wallet linked");
        record_audit(
            self.audit.as_ref(),
            AuditLogBuilder::new(AuditAction::WalletLinked, user_id.to_string())
                .resource("user", user_id)
                .details(serde_json::json!({ "publicKey": public_key }))
                .build(),
        )
        .await;

        self.users
            .get_user(user_id)
            .await?
            .ok_or_else(|| TicketingError::not_found("user", user_id))
    }

    fn check_public_key(public_key: &str) -> Result<()> {
        if strkey::is_valid_account_id(public_key) {
            Ok(())
        } else {
            Err(TicketingError::InvalidRequest(
                "invalid Stellar public key".to_string(),
            ))
        }
    }
}
