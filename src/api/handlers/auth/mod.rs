pub mod login;
pub use self::login::login;

pub mod refresh;
pub use self::refresh::{logout, refresh};

pub mod register;
pub use self::register::register;

pub mod me;
pub use self::me::me;

pub mod types;

// common error translation for the auth handlers
use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde_json::json;
use tracing::error;

use crate::auth::AuthError;

/// Map an [`AuthError`] to its HTTP response. Token and credential failures
/// all surface as 401 so the response reveals nothing beyond "not
/// authenticated".
pub fn auth_error_response(err: &AuthError) -> Response {
    let (status, body) = match err {
        AuthError::InvalidCredentials
        | AuthError::InvalidToken
        | AuthError::TokenRevoked
        | AuthError::EmailTaken => (StatusCode::UNAUTHORIZED, json!({ "message": err.to_string() })),
        AuthError::AccountLocked {
            retry_after_seconds,
        } => (
            StatusCode::UNAUTHORIZED,
            json!({
                "message": err.to_string(),
                "retryAfterSeconds": retry_after_seconds,
            }),
        ),
        AuthError::NotFound => (StatusCode::NOT_FOUND, json!({ "message": err.to_string() })),
        AuthError::Forbidden => (StatusCode::FORBIDDEN, json!({ "message": err.to_string() })),
        AuthError::RateLimited => (
            StatusCode::TOO_MANY_REQUESTS,
            json!({ "message": err.to_string() }),
        ),
        AuthError::Validation(errors) => (
            StatusCode::BAD_REQUEST,
            json!({ "message": err.to_string(), "errors": errors }),
        ),
        AuthError::Internal(source) => {
            error!("internal error: {source:?}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "message": "Internal Server Error" }),
            )
        }
    };
    (status, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::auth_error_response;
    use crate::auth::{AuthError, FieldError};
    use axum::http::StatusCode;

    #[test]
    fn credential_and_token_failures_are_unauthorized() {
        for err in [
            AuthError::InvalidCredentials,
            AuthError::InvalidToken,
            AuthError::TokenRevoked,
            AuthError::EmailTaken,
            AuthError::AccountLocked {
                retry_after_seconds: 60,
            },
        ] {
            assert_eq!(
                auth_error_response(&err).status(),
                StatusCode::UNAUTHORIZED
            );
        }
    }

    #[test]
    fn remaining_variants_keep_their_status() {
        assert_eq!(
            auth_error_response(&AuthError::NotFound).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            auth_error_response(&AuthError::Forbidden).status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            auth_error_response(&AuthError::RateLimited).status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            auth_error_response(&AuthError::Validation(vec![FieldError::new(
                "password",
                "must contain a digit"
            )]))
            .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            auth_error_response(&AuthError::Internal(anyhow::anyhow!("boom"))).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
