//! Users and wallet-link challenges

use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use super::UserId;

/// Challenge lifetime
pub const CHALLENGE_TTL_SECS: i64 = 300;

/// Prefix of the message a wallet signs to prove key ownership
pub const CHALLENGE_MESSAGE_PREFIX: &str = "Sign this message to link wallet: ";

/// User directory entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub stellar_public_key: Option<String>,
}

impl User {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            id: UserId::new(),
            email: email.into(),
            stellar_public_key: None,
        }
    }

    pub fn with_wallet(mut self, public_key: impl Into<String>) -> Self {
        self.stellar_public_key = Some(public_key.into());
        self
    }
}

/// Single-use nonce challenge bound to a public key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NonceChallenge {
    pub public_key: String,
    pub nonce: String,
    pub created_at: DateTime<Utc>,
}

impl NonceChallenge {
    /// Fresh challenge with 32 random bytes of nonce, hex encoded
    pub fn generate(public_key: impl Into<String>) -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        Self {
            public_key: public_key.into(),
            nonce: hex::encode(bytes),
            created_at: Utc::now(),
        }
    }

    /// The exact message the wallet must sign
    pub fn message(&self) -> String {
        format!("{}{}", CHALLENGE_MESSAGE_PREFIX, self.nonce)
    }

    pub fn ttl() -> Duration {
        Duration::seconds(CHALLENGE_TTL_SECS)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at > Self::ttl()
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}
