//! Redis-backed nonce store and notification queue
//!
//! Wallet challenges live under `wallet_nonce:{public_key}` with a TTL and are
//! consumed with GETDEL, so a challenge verifies at most once. Notifications
//! are JSON envelopes LPUSHed onto `notifications:pending` and BRPOPed by the
//! worker.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::time::Duration;

use crate::domain::{JobOptions, NonceChallenge, NotificationJob, QueuedNotification};

use super::{NonceStore, NotificationQueue, Result, TicketingError};

const NONCE_KEY_PREFIX: &str = "wallet_nonce:";
const NOTIFICATION_QUEUE_KEY: &str = "notifications:pending";

/// Open a managed connection shared by the Redis stores
pub async fn connect(redis_url: &str) -> Result<ConnectionManager> {
    let client = Client::open(redis_url)?;
    let conn = ConnectionManager::new(client).await?;
    Ok(conn)
}

// ============================================================================
// Nonces
// ============================================================================

/// Redis wallet-challenge store with atomic consumption
#[derive(Clone)]
pub struct RedisNonceStore {
    conn_manager: ConnectionManager,
}

impl RedisNonceStore {
    pub fn new(conn_manager: ConnectionManager) -> Self {
        Self { conn_manager }
    }

    fn nonce_key(public_key: &str) -> String {
        format!("{NONCE_KEY_PREFIX}{public_key}")
    }
}

#[async_trait]
impl NonceStore for RedisNonceStore {
    async fn store(&self, challenge: NonceChallenge, ttl: Duration) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let key = Self::nonce_key(&challenge.public_key);
        let payload = serde_json::to_string(&challenge)
            .map_err(|e| TicketingError::Internal(format!("serialize challenge: {e}")))?;
        let ttl_seconds = ttl.as_secs().max(1);

        let _: () = conn.set_ex(&key, payload, ttl_seconds).await?;

        tracing::debug!(
            public_key = %challenge.public_key,
            ttl_seconds,
            "Stored wallet challenge"
        );
        Ok(())
    }

    async fn take(&self, public_key: &str) -> Result<Option<NonceChallenge>> {
        let mut conn = self.conn_manager.clone();
        let payload: Option<String> = conn.get_del(Self::nonce_key(public_key)).await?;

        payload
            .map(|p| {
                serde_json::from_str(&p)
                    .map_err(|e| TicketingError::Internal(format!("corrupt challenge: {e}")))
            })
            .transpose()
    }
}

// ============================================================================
// Notifications
// ============================================================================

/// Redis list-backed notification queue
#[derive(Clone)]
pub struct RedisNotificationQueue {
    conn_manager: ConnectionManager,
}

impl RedisNotificationQueue {
    pub fn new(conn_manager: ConnectionManager) -> Self {
        Self { conn_manager }
    }
}

#[async_trait]
impl NotificationQueue for RedisNotificationQueue {
    async fn enqueue(&self, job: NotificationJob, options: JobOptions) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let envelope = QueuedNotification::new(job, options);
        let payload = serde_json::to_string(&envelope)
            .map_err(|e| TicketingError::Internal(format!("serialize notification: {e}")))?;

        let _: () = conn.lpush(NOTIFICATION_QUEUE_KEY, payload).await?;

        tracing::debug!(
            job_id = %envelope.id,
            kind = envelope.job.kind(),
            "Enqueued notification"
        );
        Ok(())
    }

    async fn dequeue(&self, timeout: Duration) -> Result<Option<QueuedNotification>> {
        let mut conn = self.conn_manager.clone();

        // BRPOP takes fractional seconds; 0 would block forever
        let timeout_secs = timeout.as_secs_f64().max(0.1);
        let popped: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(NOTIFICATION_QUEUE_KEY)
            .arg(timeout_secs)
            .query_async(&mut conn)
            .await?;

        match popped {
            Some((_, payload)) => match serde_json::from_str(&payload) {
                Ok(envelope) => Ok(Some(envelope)),
                Err(e) => {
                    tracing::error!(error = %e, "Dropping malformed notification payload");
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }
}
