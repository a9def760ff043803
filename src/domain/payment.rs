//! Payments made against events

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{EventId, PaymentId, UserId};

/// Default settlement currency
pub const DEFAULT_CURRENCY: &str = "XLM";

/// Fractional digits carried by payment amounts
pub const AMOUNT_SCALE: u32 = 7;

/// Payment lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Confirmed,
    Failed,
    /// Claimed by a refund run; the ledger payment is in flight
    Refunding,
    Refunded,
}

impl PaymentStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "confirmed" => Some(Self::Confirmed),
            "failed" => Some(Self::Failed),
            "refunding" => Some(Self::Refunding),
            "refunded" => Some(Self::Refunded),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Confirmed => write!(f, "confirmed"),
            Self::Failed => write!(f, "failed"),
            Self::Refunding => write!(f, "refunding"),
            Self::Refunded => write!(f, "refunded"),
        }
    }
}

/// A payment for an event ticket
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: PaymentId,
    pub event_id: EventId,
    pub user_id: UserId,
    pub amount: Decimal,
    pub currency: String,
    /// Set once the payment is confirmed on-chain
    pub transaction_hash: Option<String>,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    /// Create a pending payment
    pub fn pending(event_id: EventId, user_id: UserId, amount: Decimal) -> Self {
        Self {
            id: PaymentId::new(),
            event_id,
            user_id,
            amount: amount.round_dp(AMOUNT_SCALE),
            currency: DEFAULT_CURRENCY.to_string(),
            transaction_hash: None,
            status: PaymentStatus::Pending,
            created_at: Utc::now(),
        }
    }

    /// Mark as confirmed by the given transaction
    pub fn confirmed(mut self, transaction_hash: impl Into<String>) -> Self {
        self.transaction_hash = Some(transaction_hash.into());
        self.status = PaymentStatus::Confirmed;
        self
    }

    /// Transaction hash if the payment may back a ticket
    pub fn confirmed_transaction(&self) -> Option<&str> {
        match (self.status, self.transaction_hash.as_deref()) {
            (PaymentStatus::Confirmed, Some(hash)) if !hash.is_empty() => Some(hash),
            _ => None,
        }
    }

    /// Amount rendered with the full 7 fractional digits
    pub fn amount_string(&self) -> String {
        let mut amount = self.amount;
        amount.rescale(AMOUNT_SCALE);
        amount.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            PaymentStatus::Pending,
            PaymentStatus::Confirmed,
            PaymentStatus::Failed,
            PaymentStatus::Refunding,
            PaymentStatus::Refunded,
        ] {
            assert_eq!(PaymentStatus::parse(&status.to_string()), Some(status));
        }
        assert_eq!(PaymentStatus::parse("settled"), None);
    }

    #[test]
    fn test_confirmed_transaction_requires_status_and_hash() {
        let payment = Payment::pending(EventId::new(), UserId::new(), Decimal::ONE);
        assert!(payment.confirmed_transaction().is_none());

        let mut confirmed_without_hash = payment.clone();
        confirmed_without_hash.status = PaymentStatus::Confirmed;
        assert!(confirmed_without_hash.confirmed_transaction().is_none());

        let confirmed = payment.confirmed("abc123");
        assert_eq!(confirmed.confirmed_transaction(), Some("abc123"));
    }

    #[test]
    fn test_amount_string_has_seven_digits() {
        let payment = Payment::pending(
            EventId::new(),
            UserId::new(),
            Decimal::from_str("50.5").unwrap(),
        );
        assert_eq!(payment.amount_string(), "50.5000000");
    }
}
