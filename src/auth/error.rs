//! Expected failure taxonomy for authentication and authorization.

use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

/// One field-level validation problem, surfaced as part of a 400 response.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    #[must_use]
    pub fn new(field: &str, message: &str) -> Self {
        Self {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

/// Failures the HTTP boundary translates directly to status codes.
///
/// Everything except `Internal` is an expected outcome of the request
/// itself; `Internal` wraps collaborator faults (store unavailable and the
/// like) and maps to a generic 500.
#[derive(Debug, Error)]
pub enum AuthError {
    // Same message for unknown email and wrong password so callers cannot
    // probe which accounts exist.
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Too many failed attempts, try again in {retry_after_seconds} seconds")]
    AccountLocked { retry_after_seconds: u64 },

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token has been revoked")]
    TokenRevoked,

    #[error("Email is already registered")]
    EmailTaken,

    #[error("Not found")]
    NotFound,

    #[error("Forbidden")]
    Forbidden,

    #[error("Validation failed")]
    Validation(Vec<FieldError>),

    #[error("Too many requests")]
    RateLimited,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}
