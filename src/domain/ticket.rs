//! Tickets and the scannable gate payload

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{EventId, TicketId, UserId};

/// Ticket status. `Used` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    #[default]
    Valid,
    Used,
}

impl TicketStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "valid" => Some(Self::Valid),
            "used" => Some(Self::Used),
            _ => None,
        }
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Valid => write!(f, "valid"),
            Self::Used => write!(f, "used"),
        }
    }
}

/// An issued ticket
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: TicketId,
    pub event_id: EventId,
    pub owner_id: UserId,
    pub asset_code: String,
    /// Unique per ticket; makes issuance idempotent
    pub transaction_hash: String,
    pub status: TicketStatus,
    pub created_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
}

impl Ticket {
    pub fn is_valid(&self) -> bool {
        self.status == TicketStatus::Valid
    }
}

/// Fields supplied when minting a ticket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTicket {
    pub event_id: EventId,
    pub owner_id: UserId,
    pub asset_code: String,
    pub transaction_hash: String,
}

impl NewTicket {
    /// Materialize with a server-generated id
    pub fn into_ticket(self) -> Ticket {
        Ticket {
            id: TicketId::new(),
            event_id: self.event_id,
            owner_id: self.owner_id,
            asset_code: self.asset_code,
            transaction_hash: self.transaction_hash,
            status: TicketStatus::Valid,
            created_at: Utc::now(),
            used_at: None,
        }
    }
}

/// Result of an insert keyed by transaction hash
#[derive(Debug, Clone)]
pub enum TicketInsert {
    Created(Ticket),
    /// Another writer already minted a ticket for the same transaction
    Existing(Ticket),
}

impl TicketInsert {
    pub fn into_ticket(self) -> Ticket {
        match self {
            TicketInsert::Created(t) | TicketInsert::Existing(t) => t,
        }
    }
}

/// Payload encoded into the gate QR code: exactly `{ticketId, signature}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TicketPayload {
    pub ticket_id: TicketId,
    pub signature: String,
}

impl TicketPayload {
    pub fn new(ticket_id: TicketId, signature: impl Into<String>) -> Self {
        Self {
            ticket_id,
            signature: signature.into(),
        }
    }

    /// JSON form, as scanned at the gate
    pub fn to_json(&self) -> String {
        serde_json::json!({
            "ticketId": self.ticket_id,
            "signature": self.signature,
        })
        .to_string()
    }

    /// Base64url rendering of the JSON form for QR encoding
    pub fn to_qr_data(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.to_json())
    }

    /// Parse either the JSON form or its base64url rendering
    pub fn parse(scanned: &str) -> Option<Self> {
        let scanned = scanned.trim();
        if let Ok(payload) = serde_json::from_str(scanned) {
            return Some(payload);
        }
        let decoded = URL_SAFE_NO_PAD.decode(scanned).ok()?;
        serde_json::from_slice(&decoded).ok()
    }
}
