//! Events as seen by the escrow lifecycle

use serde::{Deserialize, Serialize};

use super::{EventId, UserId};

/// Event lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    #[default]
    Draft,
    Published,
    Completed,
    Cancelled,
}

impl EventStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "draft" => Some(Self::Draft),
            "published" => Some(Self::Published),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Published => write!(f, "published"),
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Escrow-relevant view of an event
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: EventId,
    pub title: String,
    pub organizer_id: UserId,
    pub status: EventStatus,
    pub escrow_public_key: Option<String>,
    /// Ciphertext envelope; cleared once funds are released
    #[serde(skip_serializing)]
    pub escrow_secret_encrypted: Option<String>,
}

impl Event {
    pub fn new(title: impl Into<String>, organizer_id: UserId, status: EventStatus) -> Self {
        Self {
            id: EventId::new(),
            title: title.into(),
            organizer_id,
            status,
            escrow_public_key: None,
            escrow_secret_encrypted: None,
        }
    }

    pub fn has_escrow(&self) -> bool {
        self.escrow_public_key.is_some()
    }
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("organizer_id", &self.organizer_id)
            .field("status", &self.status)
            .field("escrow_public_key", &self.escrow_public_key)
            .field(
                "escrow_secret_encrypted",
                &self.escrow_secret_encrypted.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}
