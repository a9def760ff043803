//! Event escrow handlers.

use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::api::auth_helpers::{ensure_admin, ensure_staff};
use crate::api::error::ApiError;
use crate::auth::AuthContextExt;
use crate::domain::EventId;
use crate::server::AppState;
use crate::service::{CancellationSnapshot, EscrowRelease};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseEscrowRequest {
    pub organizer_wallet: String,
}

/// POST /api/v1/events/:event_id/escrow - Create and fund the event's escrow account.
pub async fn create_escrow(
    State(state): State<AppState>,
    Extension(AuthContextExt(auth)): Extension<AuthContextExt>,
    Path(event_id): Path<EventId>,
) -> Result<(StatusCode, Json<serde_json::Value>), ApiError> {
    ensure_staff(&auth)?;

    let public_key = state.escrow.create_escrow(&event_id).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "eventId": event_id,
            "escrowPublicKey": public_key,
        })),
    ))
}

/// POST /api/v1/events/:event_id/escrow/release - Pay out escrow to the organizer.
pub async fn release_escrow(
    State(state): State<AppState>,
    Extension(AuthContextExt(auth)): Extension<AuthContextExt>,
    Path(event_id): Path<EventId>,
    Json(request): Json<ReleaseEscrowRequest>,
) -> Result<Json<EscrowRelease>, ApiError> {
    ensure_admin(&auth)?;

    let release = state
        .escrow
        .release_escrow(&event_id, &request.organizer_wallet)
        .await?;
    Ok(Json(release))
}

/// GET /api/v1/events/:event_id/escrow/cancellation - Escrow balance of a cancelled event.
pub async fn escrow_cancellation(
    State(state): State<AppState>,
    Extension(AuthContextExt(auth)): Extension<AuthContextExt>,
    Path(event_id): Path<EventId>,
) -> Result<Json<CancellationSnapshot>, ApiError> {
    ensure_admin(&auth)?;

    Ok(Json(state.escrow.handle_cancellation(&event_id).await?))
}
