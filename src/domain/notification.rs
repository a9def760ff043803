//! Outbound notification jobs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use super::{PaymentId, TicketId};

/// A notification to deliver by email
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationJob {
    TicketIssued {
        email: String,
        ticket_id: TicketId,
        event_name: String,
    },
    RefundIssued {
        email: String,
        payment_id: PaymentId,
        amount: String,
        currency: String,
    },
}

impl NotificationJob {
    pub fn kind(&self) -> &'static str {
        match self {
            NotificationJob::TicketIssued { .. } => "ticket_issued",
            NotificationJob::RefundIssued { .. } => "refund_issued",
        }
    }

    pub fn recipient(&self) -> &str {
        match self {
            NotificationJob::TicketIssued { email, .. }
            | NotificationJob::RefundIssued { email, .. } => email,
        }
    }
}

/// Delivery policy attached to a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOptions {
    /// Total delivery attempts, including the first
    pub attempts: u32,
    /// Base delay for exponential backoff between attempts
    pub backoff_ms: u64,
}

impl JobOptions {
    /// Ticket emails: 3 attempts, exponential backoff from 5s
    pub fn ticket_email() -> Self {
        Self {
            attempts: 3,
            backoff_ms: 5_000,
        }
    }

    /// Refund emails: 3 attempts
    pub fn refund_email() -> Self {
        Self {
            attempts: 3,
            backoff_ms: 5_000,
        }
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

impl Default for JobOptions {
    fn default() -> Self {
        Self::ticket_email()
    }
}

/// Envelope stored on the queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedNotification {
    pub id: Uuid,
    pub job: NotificationJob,
    pub options: JobOptions,
    pub enqueued_at: DateTime<Utc>,
}

impl QueuedNotification {
    pub fn new(job: NotificationJob, options: JobOptions) -> Self {
        Self {
            id: Uuid::new_v4(),
            job,
            options,
            enqueued_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_is_tagged() {
        let job = NotificationJob::TicketIssued {
            email: "a@example.com".into(),
            ticket_id: TicketId::new(),
            event_name: "NestFest".into(),
        };
        let json = serde_json::to_value(&job).unwrap();
        assert_eq!(json["type"], "ticket_issued");
        assert_eq!(job.recipient(), "a@example.com");
    }
}
