//! Authentication and authorization for the ticketing API
//!
//! Callers present an HMAC-signed JWT as a bearer token. The subject is the
//! user id and a `role` claim selects what the caller may do.
//!
//! # Roles
//!
//! - `attendee`: issue and transfer own tickets, link a wallet
//! - `organizer`: gate verification and escrow creation
//! - `admin`: everything, including escrow release and refunds
//!
//! # Configuration
//!
//! - `AUTH_MODE`: `required` (default) or `disabled` for development
//! - `JWT_SECRET`: HMAC secret for JWT validation
//! - `JWT_ISSUER` / `JWT_AUDIENCE`: expected `iss` / `aud` claims

mod jwt;
mod middleware;

pub use jwt::*;
pub use middleware::*;

use serde::{Deserialize, Serialize};

use crate::domain::UserId;

/// Caller role carried in the token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Attendee,
    Organizer,
    Admin,
}

impl Role {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "attendee" => Some(Role::Attendee),
            "organizer" => Some(Role::Organizer),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Attendee => "attendee",
            Role::Organizer => "organizer",
            Role::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authentication context extracted from request
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// User the token was issued to
    pub user_id: UserId,

    pub role: Role,
}

impl AuthContext {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Gate staff: organizers and admins
    pub fn is_staff(&self) -> bool {
        matches!(self.role, Role::Organizer | Role::Admin)
    }
}

/// Authentication error
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing authentication")]
    MissingAuth,

    #[error("invalid JWT: {0}")]
    InvalidJwt(String),

    #[error("token expired")]
    TokenExpired,

    #[error("insufficient permissions")]
    InsufficientPermissions,
}
