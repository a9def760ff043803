//! Wallet linking handlers.

use axum::extract::{Extension, State};
use axum::Json;
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::auth::AuthContextExt;
use crate::domain::User;
use crate::server::AppState;
use crate::service::WalletChallenge;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeRequest {
    pub public_key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyWalletRequest {
    pub public_key: String,
    /// Hex-encoded Ed25519 signature over the challenge message
    pub signature: String,
}

/// POST /api/v1/wallet/challenge - Issue a nonce for the wallet to sign.
pub async fn request_challenge(
    State(state): State<AppState>,
    Json(request): Json<ChallengeRequest>,
) -> Result<Json<WalletChallenge>, ApiError> {
    Ok(Json(
        state.wallets.request_challenge(&request.public_key).await?,
    ))
}

/// POST /api/v1/wallet/verify - Link the wallet to the authenticated user.
pub async fn verify_wallet(
    State(state): State<AppState>,
    Extension(AuthContextExt(auth)): Extension<AuthContextExt>,
    Json(request): Json<VerifyWalletRequest>,
) -> Result<Json<User>, ApiError> {
    let user = state
        .wallets
        .verify_and_link(&auth.user_id, &request.public_key, &request.signature)
        .await?;
    Ok(Json(user))
}
