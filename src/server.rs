//! HTTP server bootstrap for the ticketing core.
//!
//! This module wires together:
//! - configuration
//! - database connection pool and table setup
//! - nonce store and notification queue (Redis, or in-process for dev)
//! - the ticketing services and the notification worker
//! - the Axum router

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use axum::routing::get;
use axum::Router;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tower_http::cors::AllowOrigin;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

use crate::auth::{AuthMiddlewareState, Authenticator, JwtValidator};
use crate::crypto::{SecretCipher, TicketSigner};
use crate::infra::{
    connect_redis, postgres, shutdown_signal, AuditSink, InMemoryLedger, InMemoryNonceStore,
    InMemoryNotificationQueue, LedgerClient, NonceStore, NotificationQueue, PgAuditLogger,
    PgEventRepository, PgPaymentRepository, PgTicketRepository, PgUserDirectory,
    RedisNonceStore, RedisNotificationQueue, ShutdownCoordinator,
};
use crate::service::{
    EscrowService, LogMailer, Mailer, NotificationWorker, RefundService, SmtpConfig, SmtpMailer,
    TicketService, WalletService,
};

/// JWT settings.
#[derive(Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
}

/// Server configuration.
#[derive(Clone)]
pub struct Config {
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Server listen address.
    pub listen_addr: SocketAddr,
    /// Maximum database connections.
    pub max_connections: u32,
    /// Redis URL for nonces and the mail queue; in-process stores when unset.
    pub redis_url: Option<String>,
    pub jwt: Option<JwtConfig>,
    /// `AUTH_MODE` != `disabled`.
    pub require_auth: bool,
    pub ticket_signing_secret: Option<String>,
    pub ticket_signing_public_key: Option<String>,
    /// Passphrase for escrow secrets at rest.
    pub escrow_encryption_secret: String,
    /// Platform account that funds new escrow accounts.
    pub escrow_funder_secret: String,
    pub smtp: Option<SmtpConfig>,
    pub cors_allow_origins: Option<String>,
    /// `memory` for local development; anything else needs an injected ledger.
    pub ledger_backend: String,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("listen_addr", &self.listen_addr)
            .field("max_connections", &self.max_connections)
            .field("redis", &self.redis_url.is_some())
            .field("jwt", &self.jwt.is_some())
            .field("require_auth", &self.require_auth)
            .field("ticket_signing", &self.ticket_signing_secret.is_some())
            .field("smtp", &self.smtp)
            .field("ledger_backend", &self.ledger_backend)
            .finish_non_exhaustive()
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_required(key: &str) -> anyhow::Result<String> {
    env_opt(key).with_context(|| format!("{key} must be set"))
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "postgres://localhost/stellar_ticketing".to_string());

        let port: u16 = std::env::var("PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);

        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let listen_addr: SocketAddr = format!("{host}:{port}")
            .parse()
            .with_context(|| format!("Invalid listen address {host}:{port}"))?;

        let max_connections: u32 = std::env::var("MAX_DB_CONNECTIONS")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(10);

        let jwt = env_opt("JWT_SECRET").map(|secret| JwtConfig {
            secret,
            issuer: env_opt("JWT_ISSUER").unwrap_or_else(|| "stellar-ticketing".to_string()),
            audience: env_opt("JWT_AUDIENCE").unwrap_or_else(|| "ticketing-api".to_string()),
        });

        let require_auth = std::env::var("AUTH_MODE")
            .map(|mode| mode != "disabled")
            .unwrap_or(true);

        let smtp = match env_opt("SMTP_HOST") {
            Some(host) => Some(SmtpConfig {
                host,
                port: std::env::var("SMTP_PORT")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(587),
                username: env_opt("SMTP_USER").unwrap_or_default(),
                password: env_opt("SMTP_PASS").unwrap_or_default(),
                from: env_opt("MAIL_FROM")
                    .unwrap_or_else(|| "tickets@localhost".to_string()),
            }),
            None => None,
        };

        Ok(Self {
            database_url,
            listen_addr,
            max_connections,
            redis_url: env_opt("REDIS_URL"),
            jwt,
            require_auth,
            ticket_signing_secret: env_opt("TICKET_SIGNING_SECRET"),
            ticket_signing_public_key: env_opt("TICKET_SIGNING_PUBLIC_KEY"),
            escrow_encryption_secret: env_required("ESCROW_ENCRYPTION_SECRET")?,
            escrow_funder_secret: env_required("ESCROW_FUNDER_SECRET")?,
            smtp,
            cors_allow_origins: env_opt("CORS_ALLOW_ORIGINS"),
            ledger_backend: env_opt("LEDGER_BACKEND").unwrap_or_else(|| "external".to_string()),
        })
    }
}

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub tickets: Arc<TicketService>,
    pub escrow: Arc<EscrowService>,
    pub refunds: Arc<RefundService>,
    pub wallets: Arc<WalletService>,
    /// Checked by `/ready`; absent when running on in-memory stores.
    pub db: Option<PgPool>,
}

/// Start the HTTP server with the ledger selected by `LEDGER_BACKEND`.
///
/// Only `memory` is built in; production deployments embed the crate and
/// call [`run_with_ledger`] with their ledger client.
pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Config::from_env()?;
    let ledger: Arc<dyn LedgerClient> = match config.ledger_backend.as_str() {
        "memory" => {
            warn!("LEDGER_BACKEND=memory: ledger calls are simulated in-process, do not use in production");
            Arc::new(InMemoryLedger::new())
        }
        other => anyhow::bail!(
            "LEDGER_BACKEND={other} has no built-in client; embed the crate and call server::run_with_ledger (or set LEDGER_BACKEND=memory for local dev)"
        ),
    };

    serve(config, ledger).await
}

/// Start the HTTP server with an injected ledger client.
pub async fn run_with_ledger(ledger: Arc<dyn LedgerClient>) -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = Config::from_env()?;
    serve(config, ledger).await
}

async fn serve(config: Config, ledger: Arc<dyn LedgerClient>) -> anyhow::Result<()> {
    info!("Starting Stellar Ticketing v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded");
    info!("  Listen address: {}", config.listen_addr);
    info!("  Max connections: {}", config.max_connections);

    // Auth configuration
    let jwt_validator = config.jwt.as_ref().map(|jwt| {
        Arc::new(JwtValidator::new(
            jwt.secret.as_bytes(),
            &jwt.issuer,
            &jwt.audience,
        ))
    });

    if config.require_auth && jwt_validator.is_none() {
        anyhow::bail!(
            "AUTH_MODE=required but JWT_SECRET is not set (or set AUTH_MODE=disabled for local dev)"
        );
    }

    let authenticator = match jwt_validator {
        Some(jwt) => Arc::new(Authenticator::new().with_jwt(jwt)),
        None => Arc::new(Authenticator::new()),
    };
    let auth_state = AuthMiddlewareState {
        authenticator,
        require_auth: config.require_auth,
    };

    // Connect to PostgreSQL
    info!("Connecting to PostgreSQL...");
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await?;
    info!("Connected to PostgreSQL");

    postgres::initialize_all(&pool).await?;
    info!("Database tables ready");

    let (nonces, queue): (Arc<dyn NonceStore>, Arc<dyn NotificationQueue>) =
        match &config.redis_url {
            Some(url) => {
                let conn = connect_redis(url).await?;
                info!("Connected to Redis");
                (
                    Arc::new(RedisNonceStore::new(conn.clone())),
                    Arc::new(RedisNotificationQueue::new(conn)),
                )
            }
            None => {
                warn!("REDIS_URL not set; wallet challenges and queued emails are process-local");
                (
                    Arc::new(InMemoryNonceStore::new()),
                    Arc::new(InMemoryNotificationQueue::new()),
                )
            }
        };

    let mailer: Arc<dyn Mailer> = match &config.smtp {
        Some(smtp) => Arc::new(SmtpMailer::new(smtp)?),
        None => {
            info!("SMTP_HOST not set; emails are logged instead of sent");
            Arc::new(LogMailer)
        }
    };

    // Initialize services
    let payments = Arc::new(PgPaymentRepository::new(pool.clone()));
    let tickets = Arc::new(PgTicketRepository::new(pool.clone()));
    let events = Arc::new(PgEventRepository::new(pool.clone()));
    let users = Arc::new(PgUserDirectory::new(pool.clone()));
    let audit: Arc<dyn AuditSink> = Arc::new(PgAuditLogger::new(pool.clone()));

    let signer = Arc::new(TicketSigner::from_config(
        config.ticket_signing_secret.as_deref(),
        config.ticket_signing_public_key.as_deref(),
    ));

    let escrow = Arc::new(EscrowService::new(
        events.clone(),
        ledger.clone(),
        audit.clone(),
        SecretCipher::new(&config.escrow_encryption_secret),
        config.escrow_funder_secret.clone(),
    ));

    let state = AppState {
        tickets: Arc::new(TicketService::new(
            payments.clone(),
            tickets,
            events,
            users.clone(),
            ledger.clone(),
            signer,
            queue.clone(),
            audit.clone(),
        )),
        refunds: Arc::new(RefundService::new(
            escrow.clone(),
            payments,
            users.clone(),
            ledger.clone(),
            queue.clone(),
            audit.clone(),
        )),
        wallets: Arc::new(WalletService::new(nonces, users, ledger, audit)),
        escrow,
        db: Some(pool),
    };

    // Background mail delivery
    let coordinator = ShutdownCoordinator::new();
    let worker = tokio::spawn(NotificationWorker::new(queue, mailer).run(coordinator.signal()));

    let cors = cors_layer(config.cors_allow_origins.as_deref())?;
    let app = build_router(state, auth_state, cors);

    // Start server
    info!("Starting HTTP server on {}", config.listen_addr);
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;

    info!("Stellar Ticketing is ready to accept connections");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    coordinator.shutdown();
    if let Err(e) = worker.await {
        warn!(error = %e, "Notification worker ended abnormally");
    }
    info!("Server stopped");

    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(Level::INFO.to_string()));

    // A subscriber may already be installed by an embedding binary
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();
}

/// Assemble the full router: authenticated API, public API and health probes.
pub fn build_router(
    state: AppState,
    auth_state: AuthMiddlewareState,
    cors: Option<CorsLayer>,
) -> Router {
    let api = crate::api::router()
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            crate::auth::auth_middleware,
        ))
        .merge(crate::api::public_router());

    let mut router = Router::new()
        .nest("/api", api)
        .route("/health", get(crate::api::handlers::health_check))
        .route("/ready", get(crate::api::handlers::readiness_check))
        .layer(TraceLayer::new_for_http());

    if let Some(cors_layer) = cors {
        router = router.layer(cors_layer);
    }

    router.with_state(state)
}

/// Build the CORS layer from a comma-separated origin list (`*` for any).
pub fn cors_layer(origins: Option<&str>) -> anyhow::Result<Option<CorsLayer>> {
    let origins = match origins.map(str::trim) {
        Some(v) if !v.is_empty() => v,
        _ => return Ok(None),
    };

    let allow_origin = if origins == "*" {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = origins
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<HeaderValue>()
                    .map_err(|e| anyhow::anyhow!("Invalid CORS origin {s:?}: {e}"))
            })
            .collect::<anyhow::Result<_>>()?;
        AllowOrigin::list(origins)
    };

    Ok(Some(
        CorsLayer::new()
            .allow_origin(allow_origin)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([
                axum::http::header::AUTHORIZATION,
                axum::http::header::CONTENT_TYPE,
            ]),
    ))
}
