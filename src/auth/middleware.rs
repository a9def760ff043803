//! Authentication middleware for Axum
//!
//! Extracts the bearer token and attaches an [`AuthContext`] to the request.

use axum::{
    body::Body,
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use uuid::Uuid;

use super::{AuthContext, AuthError, JwtValidator, Role};
use crate::api::{ApiError, ErrorCode};
use crate::domain::UserId;

/// Bearer-token authenticator
pub struct Authenticator {
    jwt_validator: Option<Arc<JwtValidator>>,
}

impl Authenticator {
    pub fn new() -> Self {
        Self {
            jwt_validator: None,
        }
    }

    pub fn with_jwt(mut self, jwt_validator: Arc<JwtValidator>) -> Self {
        self.jwt_validator = Some(jwt_validator);
        self
    }

    /// Authenticate a request
    pub fn authenticate(&self, auth_header: Option<&str>) -> Result<AuthContext, AuthError> {
        let header = auth_header.ok_or(AuthError::MissingAuth)?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or(AuthError::MissingAuth)?;

        match &self.jwt_validator {
            Some(jwt) => jwt.validate(token),
            None => Err(AuthError::InvalidJwt("JWT not configured".to_string())),
        }
    }
}

impl Default for Authenticator {
    fn default() -> Self {
        Self::new()
    }
}

/// Auth context extension for request
#[derive(Clone)]
pub struct AuthContextExt(pub AuthContext);

/// Authentication middleware configuration/state.
#[derive(Clone)]
pub struct AuthMiddlewareState {
    pub authenticator: Arc<Authenticator>,
    /// If false, unauthenticated requests run as an admin (dev mode).
    pub require_auth: bool,
}

/// Authentication middleware
pub async fn auth_middleware(
    State(state): State<AuthMiddlewareState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    // Extract auth header
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let context = match state.authenticator.authenticate(auth_header) {
        Ok(context) => context,
        Err(e) if state.require_auth => return auth_error_response(e),
        Err(_) => AuthContext {
            user_id: UserId::from_uuid(Uuid::nil()),
            role: Role::Admin,
        },
    };

    // Add auth context to request extensions
    request.extensions_mut().insert(AuthContextExt(context));
    next.run(request).await
}

/// Convert auth error to HTTP response
fn auth_error_response(error: AuthError) -> Response {
    let (code, message) = match error {
        AuthError::MissingAuth => (ErrorCode::AuthRequired, "Missing authentication"),
        AuthError::InvalidJwt(_) => (ErrorCode::AuthRequired, "Invalid JWT"),
        AuthError::TokenExpired => (ErrorCode::AuthRequired, "Token expired"),
        AuthError::InsufficientPermissions => (ErrorCode::Forbidden, "Insufficient permissions"),
    };

    ApiError::new(code, message).into_response()
}
