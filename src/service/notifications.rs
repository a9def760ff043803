//! Email delivery for queued notifications
//!
//! Services enqueue jobs and move on; the [`NotificationWorker`] drains the
//! queue and delivers through a [`Mailer`], retrying with exponential backoff
//! up to the job's attempt cap.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
#[cfg(test)]
use mockall::automock;
use tracing::{error, info};

use crate::domain::{NotificationJob, QueuedNotification};
use crate::infra::{NotificationQueue, Retry, RetryConfig, ShutdownSignal};

/// Mail delivery errors
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("failed to build message: {0}")]
    Build(String),

    #[error("smtp delivery failed: {0}")]
    Transport(String),
}

/// A rendered email
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

impl OutgoingEmail {
    /// Render the email for a notification job
    pub fn render(job: &NotificationJob) -> Self {
        match job {
            NotificationJob::TicketIssued {
                email,
                ticket_id,
                event_name,
            } => Self {
                to: email.clone(),
                subject: format!("Your ticket for {event_name}"),
                body: format!(
                    "Your ticket for {event_name} is confirmed.\n\n\
                     Ticket ID: {ticket_id}\n\n\
                     Present the QR code from your account at the gate."
                ),
            },
            NotificationJob::RefundIssued {
                email,
                payment_id,
                amount,
                currency,
            } => Self {
                to: email.clone(),
                subject: "Your refund has been issued".to_string(),
                body: format!(
                    "A refund of {amount} {currency} for payment {payment_id} \
                     has been sent to your linked wallet."
                ),
            },
        }
    }
}

/// Outbound mail transport
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError>;
}

// ============================================================================
// SMTP
// ============================================================================

/// SMTP settings
#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("from", &self.from)
            .finish_non_exhaustive()
    }
}

/// SMTP mailer using lettre's async tokio transport
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, MailError> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            .map_err(|e| MailError::Transport(format!("SMTP relay error: {e}")))?
            .port(config.port)
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();

        Ok(Self {
            transport,
            from: config.from.clone(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        let message = Message::builder()
            .from(
                self.from
                    .parse()
                    .map_err(|e| MailError::InvalidAddress(format!("from: {e}")))?,
            )
            .to(email
                .to
                .parse()
                .map_err(|e| MailError::InvalidAddress(format!("to: {e}")))?)
            .subject(email.subject.clone())
            .header(ContentType::TEXT_PLAIN)
            .body(email.body.clone())
            .map_err(|e| MailError::Build(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;
        Ok(())
    }
}

/// Mailer that only logs, for local development
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), MailError> {
        info!(to = %email.to, subject = %email.subject, "Email (not sent, log mailer)");
        Ok(())
    }
}

// ============================================================================
// Worker
// ============================================================================

/// Drains the notification queue until shutdown
pub struct NotificationWorker {
    queue: Arc<dyn NotificationQueue>,
    mailer: Arc<dyn Mailer>,
    poll_timeout: Duration,
    retry_override: Option<RetryConfig>,
}

impl NotificationWorker {
    pub fn new(queue: Arc<dyn NotificationQueue>, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            queue,
            mailer,
            poll_timeout: Duration::from_secs(5),
            retry_override: None,
        }
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Replace the per-job backoff (attempt cap still comes from the job)
    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_override = Some(config);
        self
    }

    /// Run until the shutdown signal fires
    pub async fn run(self, mut shutdown: ShutdownSignal) {
        info!("Notification worker started");
        loop {
            if shutdown.is_shutdown() {
                break;
            }
            let next = tokio::select! {
                _ = shutdown.wait() => break,
                next = self.queue.dequeue(self.poll_timeout) => next,
            };
            match next {
                Ok(Some(job)) => {
                    self.deliver(&job).await;
                }
                Ok(None) => {}
                Err(e) => {
                    error!(error = %e, "Failed to read notification queue");
                    tokio::time::sleep(self.poll_timeout).await;
                }
            }
        }
        info!("Notification worker stopped");
    }

    /// Deliver one job with retries; returns whether it was sent
    pub async fn deliver(&self, queued: &QueuedNotification) -> bool {
        let email = OutgoingEmail::render(&queued.job);
        let config = match &self.retry_override {
            Some(config) => config
                .clone()
                .with_max_retries(queued.options.attempts.saturating_sub(1)),
            None => RetryConfig::for_job(&queued.options),
        };
        let context = format!("notification {} ({})", queued.id, queued.job.kind());

        let outcome = Retry::new(config)
            .run_with_context(&context, || self.mailer.send(&email))
            .await;

        match outcome.result {
            Ok(()) => {
                info!(
                    job_id = %queued.id,
                    kind = queued.job.kind(),
                    attempts = outcome.attempts,
                    "Notification delivered"
                );
                true
            }
            Err(e) => {
                error!(
                    job_id = %queued.id,
                    kind = queued.job.kind(),
                    attempts = outcome.attempts,
                    error = %e,
                    "Notification dropped after exhausting retries"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{JobOptions, PaymentId, TicketId};
    use crate::infra::{InMemoryNotificationQueue, ShutdownCoordinator};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn ticket_job() -> QueuedNotification {
        QueuedNotification::new(
            NotificationJob::TicketIssued {
                email: "fan@example.com".into(),
                ticket_id: TicketId::new(),
                event_name: "NestFest".into(),
            },
            JobOptions::ticket_email(),
        )
    }

    #[test]
    fn test_render_refund_email() {
        let email = OutgoingEmail::render(&NotificationJob::RefundIssued {
            email: "fan@example.com".into(),
            payment_id: PaymentId::new(),
            amount: "15.0000000".into(),
            currency: "XLM".into(),
        });
        assert_eq!(email.to, "fan@example.com");
        assert!(email.body.contains("15.0000000 XLM"));
    }

    #[tokio::test]
    async fn test_worker_retries_up_to_attempt_cap() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let mut mailer = MockMailer::new();
        mailer.expect_send().returning(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(MailError::Transport("connection refused".into()))
        });

        let worker = NotificationWorker::new(
            Arc::new(InMemoryNotificationQueue::new()),
            Arc::new(mailer),
        )
        .with_retry_config(RetryConfig::fast().with_initial_delay(Duration::from_millis(1)));

        assert!(!worker.deliver(&ticket_job()).await);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_worker_recovers_after_transient_failure() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let mut mailer = MockMailer::new();
        mailer.expect_send().returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(MailError::Transport("greylisted".into()))
            } else {
                Ok(())
            }
        });

        let worker = NotificationWorker::new(
            Arc::new(InMemoryNotificationQueue::new()),
            Arc::new(mailer),
        )
        .with_retry_config(RetryConfig::fast().with_initial_delay(Duration::from_millis(1)));

        assert!(worker.deliver(&ticket_job()).await);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_worker_drains_queue_and_stops() {
        let queue = Arc::new(InMemoryNotificationQueue::new());
        let job = ticket_job();
        queue.enqueue(job.job.clone(), job.options).await.unwrap();

        let mut mailer = MockMailer::new();
        mailer.expect_send().times(1).returning(|_| Ok(()));

        let coordinator = ShutdownCoordinator::new();
        let worker = NotificationWorker::new(queue.clone(), Arc::new(mailer))
            .with_poll_timeout(Duration::from_millis(10));
        let handle = tokio::spawn(worker.run(coordinator.signal()));

        for _ in 0..100 {
            if queue.pending().await.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        // Let the in-flight delivery finish before stopping
        tokio::time::sleep(Duration::from_millis(20)).await;
        coordinator.shutdown();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
