//! Refund handlers.

use axum::extract::{Extension, Path, State};
use axum::Json;

use crate::api::auth_helpers::ensure_admin;
use crate::api::error::ApiError;
use crate::auth::AuthContextExt;
use crate::domain::EventId;
use crate::server::AppState;
use crate::service::RefundOutcome;

/// POST /api/v1/refunds/event/:event_id - Refund every confirmed payment of a cancelled event.
pub async fn refund_event(
    State(state): State<AppState>,
    Extension(AuthContextExt(auth)): Extension<AuthContextExt>,
    Path(event_id): Path<EventId>,
) -> Result<Json<serde_json::Value>, ApiError> {
    ensure_admin(&auth)?;

    let results = state.refunds.refund_event(&event_id).await?;
    let count = |outcome| results.iter().filter(|r| r.outcome == outcome).count();

    Ok(Json(serde_json::json!({
        "eventId": event_id,
        "refunded": count(RefundOutcome::Refunded),
        "skipped": count(RefundOutcome::Skipped),
        "failed": count(RefundOutcome::Failed),
        "results": results,
    })))
}
