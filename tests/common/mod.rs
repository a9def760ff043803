//! Common test utilities and fixtures for integration tests

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use chrono::Duration;
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use serde_json::json;
use tower::ServiceExt;

use stellar_ticketing::auth::{AuthMiddlewareState, Authenticator, JwtValidator, Role};
use stellar_ticketing::crypto::{generate_keypair_strkeys, SecretCipher, TicketSigner};
use stellar_ticketing::domain::{Event, EventStatus, Payment, User, UserId};
use stellar_ticketing::infra::{
    InMemoryAuditSink, InMemoryEventRepository, InMemoryLedger, InMemoryNonceStore,
    InMemoryNotificationQueue, InMemoryPaymentRepository, InMemoryTicketRepository,
    InMemoryUserDirectory,
};
use stellar_ticketing::server::{build_router, AppState};
use stellar_ticketing::service::{EscrowService, RefundService, TicketService, WalletService};

pub const ENCRYPTION_PASSPHRASE: &str = "integration-test-passphrase";
pub const JWT_SECRET: &[u8] = b"integration-test-jwt-secret";

/// Fully wired services over in-memory collaborators
pub struct Harness {
    pub ledger: Arc<InMemoryLedger>,
    pub payments: Arc<InMemoryPaymentRepository>,
    pub tickets_repo: Arc<InMemoryTicketRepository>,
    pub events: Arc<InMemoryEventRepository>,
    pub users: Arc<InMemoryUserDirectory>,
    pub audit: Arc<InMemoryAuditSink>,
    pub queue: Arc<InMemoryNotificationQueue>,
    pub nonces: Arc<InMemoryNonceStore>,
    pub signer: Arc<TicketSigner>,
    pub tickets: Arc<TicketService>,
    pub escrow: Arc<EscrowService>,
    pub refunds: Arc<RefundService>,
    pub wallets: Arc<WalletService>,
    pub jwt: Arc<JwtValidator>,
}

impl Harness {
    pub fn new() -> Self {
        let ledger = Arc::new(InMemoryLedger::new());
        let payments = Arc::new(InMemoryPaymentRepository::new());
        let tickets_repo = Arc::new(InMemoryTicketRepository::new());
        let events = Arc::new(InMemoryEventRepository::new());
        let users = Arc::new(InMemoryUserDirectory::new());
        let audit = Arc::new(InMemoryAuditSink::new());
        let queue = Arc::new(InMemoryNotificationQueue::new());
        let nonces = Arc::new(InMemoryNonceStore::new());
        let signer = Arc::new(TicketSigner::generate());
        let (_, funder_secret) = generate_keypair_strkeys();

        let tickets = Arc::new(TicketService::new(
            payments.clone(),
            tickets_repo.clone(),
            events.clone(),
            users.clone(),
            ledger.clone(),
            signer.clone(),
            queue.clone(),
            audit.clone(),
        ));
        let escrow = Arc::new(EscrowService::new(
            events.clone(),
            ledger.clone(),
            audit.clone(),
            SecretCipher::new(ENCRYPTION_PASSPHRASE),
            funder_secret,
        ));
        let refunds = Arc::new(RefundService::new(
            escrow.clone(),
            payments.clone(),
            users.clone(),
            ledger.clone(),
            queue.clone(),
            audit.clone(),
        ));
        let wallets = Arc::new(WalletService::new(
            nonces.clone(),
            users.clone(),
            ledger.clone(),
            audit.clone(),
        ));
        let jwt = Arc::new(JwtValidator::new(
            JWT_SECRET,
            "stellar-ticketing",
            "ticketing-api",
        ));

        Self {
            ledger,
            payments,
            tickets_repo,
            events,
            users,
            audit,
            queue,
            nonces,
            signer,
            tickets,
            escrow,
            refunds,
            wallets,
            jwt,
        }
    }

    /// Router with JWT auth required
    pub fn router(&self) -> axum::Router {
        let state = AppState {
            tickets: self.tickets.clone(),
            escrow: self.escrow.clone(),
            refunds: self.refunds.clone(),
            wallets: self.wallets.clone(),
            db: None,
        };
        let auth_state = AuthMiddlewareState {
            authenticator: Arc::new(Authenticator::new().with_jwt(self.jwt.clone())),
            require_auth: true,
        };
        build_router(state, auth_state, None)
    }

    pub fn token(&self, user_id: &UserId, role: Role) -> String {
        self.jwt.issue(user_id, role, Duration::hours(1)).unwrap()
    }

    pub async fn add_user(&self, email: &str) -> User {
        let user = User::new(email);
        self.users.put(user.clone()).await;
        user
    }

    pub async fn add_user_with_wallet(&self, email: &str) -> User {
        let (public_key, _) = generate_keypair_strkeys();
        let user = User::new(email).with_wallet(public_key);
        self.users.put(user.clone()).await;
        user
    }

    pub async fn add_event(&self, status: EventStatus) -> Event {
        let event = Event::new("Harbor Lights Festival", UserId::new(), status);
        self.events.put(event.clone()).await;
        event
    }

    /// Confirmed payment whose ledger transaction carries the payment id as memo
    pub async fn confirmed_payment(&self, event: &Event, user: &User, amount: i64) -> Payment {
        let pending = Payment::pending(event.id, user.id, Decimal::new(amount, 0));
        let tx_hash = format!("tx-{}", pending.id);
        self.ledger
            .record_transaction(tx_hash.clone(), Some(&pending.id.to_string()))
            .await;
        let payment = pending.confirmed(tx_hash);
        self.payments.put(payment.clone()).await;
        payment
    }
}

/// Send a request to the test router.
pub async fn send_request(
    app: &axum::Router,
    method: Method,
    uri: &str,
    body: Option<serde_json::Value>,
    token: Option<&str>,
) -> (StatusCode, Option<String>, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);

    if body.is_some() {
        builder = builder.header("content-type", "application/json");
    }

    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }

    let body = body
        .map(|v| Body::from(serde_json::to_vec(&v).unwrap()))
        .unwrap_or_else(|| Body::from(Vec::new()));

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let code = response
        .headers()
        .get("x-error-code")
        .map(|v| v.to_str().unwrap().to_string());
    let bytes = response
        .into_body()
        .collect()
        .await
        .unwrap()
        .to_bytes()
        .to_vec();

    let json = if bytes.is_empty() {
        json!({})
    } else {
        serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| json!({ "raw": String::from_utf8_lossy(&bytes) }))
    };

    (status, code, json)
}
