//! Ticket issuance, transfer and gate verification handlers.

use axum::extract::{Extension, Path, State};
use axum::Json;
use serde::Deserialize;

use crate::api::auth_helpers::ensure_staff;
use crate::api::error::{invalid_request, ApiError, ErrorCode};
use crate::auth::AuthContextExt;
use crate::domain::{PaymentId, Ticket, TicketId, UserId};
use crate::server::AppState;
use crate::service::IssuedTicket;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueTicketRequest {
    pub payment_id: PaymentId,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferTicketRequest {
    pub new_owner_id: UserId,
}

/// Either the decoded pair or the raw scanned QR string.
///
/// `ticket_id` stays a string so a malformed id reaches the gate as a
/// signature failure instead of a body rejection.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyTicketRequest {
    #[serde(default)]
    pub ticket_id: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,
    #[serde(default)]
    pub qr_data: Option<String>,
}

/// POST /api/v1/tickets/issue - Mint (or re-sign) the ticket for a confirmed payment.
pub async fn issue_ticket(
    State(state): State<AppState>,
    Extension(AuthContextExt(auth)): Extension<AuthContextExt>,
    Json(request): Json<IssueTicketRequest>,
) -> Result<Json<IssuedTicket>, ApiError> {
    let issued = if auth.is_staff() {
        state.tickets.issue_ticket(&request.payment_id).await?
    } else {
        state
            .tickets
            .issue_ticket_for(&request.payment_id, &auth.user_id)
            .await?
    };
    Ok(Json(issued))
}

/// POST /api/v1/tickets/:ticket_id/transfer - Hand a valid ticket to another user.
pub async fn transfer_ticket(
    State(state): State<AppState>,
    Extension(AuthContextExt(auth)): Extension<AuthContextExt>,
    Path(ticket_id): Path<TicketId>,
    Json(request): Json<TransferTicketRequest>,
) -> Result<Json<Ticket>, ApiError> {
    let ticket = state
        .tickets
        .transfer_ticket(&ticket_id, &auth.user_id, &request.new_owner_id)
        .await?;
    Ok(Json(ticket))
}

/// POST /api/v1/tickets/verify - Gate check; admits the ticket exactly once.
pub async fn verify_ticket(
    State(state): State<AppState>,
    Extension(AuthContextExt(auth)): Extension<AuthContextExt>,
    Json(request): Json<VerifyTicketRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    ensure_staff(&auth)?;

    let ticket = match (request.ticket_id, request.signature, request.qr_data) {
        (Some(ticket_id), Some(signature), _) => {
            let ticket_id: TicketId = ticket_id.parse().map_err(|_| {
                ApiError::new(ErrorCode::InvalidTicketSignature, "invalid ticket signature")
            })?;
            state.tickets.verify_ticket(&ticket_id, &signature).await?
        }
        (_, _, Some(scanned)) => state.tickets.verify_scanned(&scanned).await?,
        _ => {
            return Err(invalid_request(
                "ticketId and signature, or qrData, are required",
            ))
        }
    };

    Ok(Json(serde_json::json!({
        "valid": true,
        "ticket": ticket,
    })))
}
