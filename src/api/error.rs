//! Structured API error responses with error codes
//!
//! Gate staff and clients branch on the code, never on the message: a used
//! ticket, a ticket in the wrong state, a forged signature and an unknown
//! ticket each map to a distinct code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::infra::TicketingError;

// ============================================================================
// Error Codes
// ============================================================================

/// Error codes for API responses
///
/// These codes are stable and can be used by clients for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Authentication errors (1xxx)
    /// Missing or invalid bearer token
    AuthRequired,
    /// Caller lacks the role or ownership for this operation
    Forbidden,

    // Validation errors (3xxx)
    /// Request is malformed or a precondition on its data failed
    InvalidRequest,

    // Resource errors (4xxx)
    /// Requested resource not found
    NotFound,

    // Conflict errors (5xxx)
    /// Unique binding already taken (e.g. wallet linked elsewhere)
    Conflict,

    // Signature errors (6xxx)
    /// Signature did not verify
    InvalidTicketSignature,
    /// Server could not sign the ticket (signing key misconfigured)
    TicketSigningFailed,

    // State errors (7xxx)
    /// Entity is in the wrong lifecycle state
    InvalidState,
    /// Ticket was already admitted
    TicketAlreadyUsed,

    // Infrastructure errors (8xxx)
    /// Database operation failed
    DatabaseError,
    /// Internal server error
    InternalError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn numeric_code(&self) -> u32 {
        match self {
            ErrorCode::AuthRequired => 1001,
            ErrorCode::Forbidden => 1005,
            ErrorCode::InvalidRequest => 3001,
            ErrorCode::NotFound => 4001,
            ErrorCode::Conflict => 5001,
            ErrorCode::InvalidTicketSignature => 6001,
            ErrorCode::TicketSigningFailed => 6002,
            ErrorCode::InvalidState => 7001,
            ErrorCode::TicketAlreadyUsed => 7002,
            ErrorCode::DatabaseError => 8001,
            ErrorCode::InternalError => 8999,
        }
    }

    /// Get the HTTP status code for this error
    pub fn http_status(&self) -> StatusCode {
        match self {
            ErrorCode::AuthRequired => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::InvalidRequest => StatusCode::BAD_REQUEST,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::InvalidTicketSignature => StatusCode::UNAUTHORIZED,
            ErrorCode::TicketSigningFailed => StatusCode::BAD_REQUEST,
            ErrorCode::InvalidState => StatusCode::CONFLICT,
            ErrorCode::TicketAlreadyUsed => StatusCode::CONFLICT,
            ErrorCode::DatabaseError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code_str = match self {
            ErrorCode::AuthRequired => "AUTH_REQUIRED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::InvalidRequest => "INVALID_REQUEST",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::InvalidTicketSignature => "INVALID_TICKET_SIGNATURE",
            ErrorCode::TicketSigningFailed => "TICKET_SIGNING_FAILED",
            ErrorCode::InvalidState => "INVALID_STATE",
            ErrorCode::TicketAlreadyUsed => "TICKET_ALREADY_USED",
            ErrorCode::DatabaseError => "DATABASE_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        };
        write!(f, "{}", code_str)
    }
}

// ============================================================================
// Structured Error Response
// ============================================================================

/// Structured error response for API endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Error details
    pub error: ErrorDetails,
}

/// Detailed error information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Machine-readable error code
    pub code: ErrorCode,

    /// Numeric error code for easy categorization
    pub numeric_code: u32,

    /// Human-readable error message
    pub message: String,

    /// Related resource ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
}

impl ApiError {
    /// Create a new API error
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetails {
                code,
                numeric_code: code.numeric_code(),
                message: message.into(),
                resource_id: None,
            },
        }
    }

    /// Set related resource ID
    pub fn with_resource_id(mut self, id: impl Into<String>) -> Self {
        self.error.resource_id = Some(id.into());
        self
    }

    /// Get the HTTP status code
    pub fn status(&self) -> StatusCode {
        self.error.code.http_status()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code_str = self.error.code.to_string();
        let mut response = (status, Json(self)).into_response();

        // Add error code header for easier debugging
        if let Ok(code_value) = axum::http::HeaderValue::from_str(&code_str) {
            response.headers_mut().insert(
                axum::http::header::HeaderName::from_static("x-error-code"),
                code_value,
            );
        }

        response
    }
}

// ============================================================================
// Conversion from TicketingError
// ============================================================================

impl From<TicketingError> for ApiError {
    fn from(err: TicketingError) -> Self {
        match err {
            TicketingError::InvalidRequest(msg) => ApiError::new(ErrorCode::InvalidRequest, msg),
            TicketingError::InvalidState(msg) => ApiError::new(ErrorCode::InvalidState, msg),
            TicketingError::NotFound { resource, id } => {
                ApiError::new(ErrorCode::NotFound, format!("{} not found: {}", resource, id))
                    .with_resource_id(id)
            }
            TicketingError::Forbidden(msg) => ApiError::new(ErrorCode::Forbidden, msg),
            TicketingError::Unauthorized(msg) => {
                ApiError::new(ErrorCode::InvalidTicketSignature, msg)
            }
            TicketingError::AlreadyUsed(id) => {
                ApiError::new(ErrorCode::TicketAlreadyUsed, "Ticket has already been used")
                    .with_resource_id(id)
            }
            TicketingError::Conflict(msg) => ApiError::new(ErrorCode::Conflict, msg),
            TicketingError::Signing(e) => ApiError::new(
                ErrorCode::TicketSigningFailed,
                format!("Ticket signing failed: {}", e),
            ),
            TicketingError::Database(e) => {
                tracing::error!(error = %e, "Database error");
                ApiError::new(ErrorCode::DatabaseError, "Database error")
            }
            TicketingError::Redis(e) => {
                tracing::error!(error = %e, "Redis error");
                ApiError::new(ErrorCode::InternalError, "Internal error")
            }
            TicketingError::Configuration(msg) | TicketingError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                ApiError::new(ErrorCode::InternalError, "Internal error")
            }
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Create a forbidden error
pub fn forbidden(message: impl Into<String>) -> ApiError {
    ApiError::new(ErrorCode::Forbidden, message.into())
}

/// Create a validation error
pub fn invalid_request(message: impl Into<String>) -> ApiError {
    ApiError::new(ErrorCode::InvalidRequest, message.into())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_numeric() {
        assert_eq!(ErrorCode::AuthRequired.numeric_code(), 1001);
        assert_eq!(ErrorCode::InvalidRequest.numeric_code(), 3001);
        assert_eq!(ErrorCode::NotFound.numeric_code(), 4001);
        assert_eq!(ErrorCode::InvalidTicketSignature.numeric_code(), 6001);
        assert_eq!(ErrorCode::InvalidState.numeric_code(), 7001);
        assert_eq!(ErrorCode::TicketAlreadyUsed.numeric_code(), 7002);
        assert_eq!(ErrorCode::InternalError.numeric_code(), 8999);
    }

    #[test]
    fn test_gate_outcomes_are_distinct() {
        let codes = [
            ApiError::from(TicketingError::AlreadyUsed("t".into())).error.code,
            ApiError::from(TicketingError::InvalidState("x".into())).error.code,
            ApiError::from(TicketingError::Unauthorized("sig".into())).error.code,
            ApiError::from(TicketingError::not_found("ticket", "t")).error.code,
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in codes.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_signing_error_is_client_safe() {
        let err = ApiError::from(TicketingError::Signing(
            crate::crypto::SigningError::MissingSecretKey,
        ));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.error.code, ErrorCode::TicketSigningFailed);
    }

    #[test]
    fn test_internal_details_are_hidden() {
        let err = ApiError::from(TicketingError::Internal("escrow secret unavailable".into()));
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.error.message.contains("escrow"));
    }

    #[test]
    fn test_error_response_header() {
        let response = ApiError::from(TicketingError::AlreadyUsed("t".into())).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(
            response.headers().get("x-error-code").unwrap(),
            "TICKET_ALREADY_USED"
        );
    }

    #[test]
    fn test_error_serialization() {
        let error = ApiError::new(ErrorCode::NotFound, "ticket not found: abc");
        let json = serde_json::to_string(&error).unwrap();

        assert!(json.contains("NOT_FOUND"));
        assert!(json.contains("4001"));
    }
}
