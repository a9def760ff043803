//! REST API for the ticketing core
//!
//! Routes are split into an authenticated router (bearer JWT) and a small
//! public router for wallet challenges. Errors are rendered as [`ApiError`]
//! with stable codes.

pub mod auth_helpers;
pub mod error;
pub mod handlers;

pub use error::{ApiError, ErrorCode, ErrorDetails};

use axum::routing::{get, post};
use axum::Router;

use crate::server::AppState;

/// Build the authenticated `/api` router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/tickets/issue", post(handlers::issue_ticket))
        .route("/v1/tickets/verify", post(handlers::verify_ticket))
        .route(
            "/v1/tickets/:ticket_id/transfer",
            post(handlers::transfer_ticket),
        )
        .route("/v1/events/:event_id/escrow", post(handlers::create_escrow))
        .route(
            "/v1/events/:event_id/escrow/release",
            post(handlers::release_escrow),
        )
        .route(
            "/v1/events/:event_id/escrow/cancellation",
            get(handlers::escrow_cancellation),
        )
        .route("/v1/refunds/event/:event_id", post(handlers::refund_event))
        .route("/v1/wallet/verify", post(handlers::verify_wallet))
}

/// Build the unauthenticated `/api` router.
pub fn public_router() -> Router<AppState> {
    Router::new().route("/v1/wallet/challenge", post(handlers::request_challenge))
}
