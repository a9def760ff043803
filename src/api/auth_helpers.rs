//! Authorization helper functions for REST API handlers.

use crate::api::error::{forbidden, ApiError};
use crate::auth::AuthContext;

/// Ensure the caller is gate staff (organizer or admin).
pub fn ensure_staff(auth: &AuthContext) -> Result<(), ApiError> {
    if !auth.is_staff() {
        return Err(forbidden("Organizer or admin role required"));
    }
    Ok(())
}

/// Ensure the caller has the admin role.
pub fn ensure_admin(auth: &AuthContext) -> Result<(), ApiError> {
    if !auth.is_admin() {
        return Err(forbidden("Admin role required"));
    }
    Ok(())
}
