use axum::{extract::Extension, http::HeaderMap, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;
use tracing::info;

use crate::api::handlers::{request_context, valid_email};
use crate::api::AppState;
use crate::auth::{AuthError, FieldError, Registration};

use super::auth_error_response;
use super::types::{RegisterRequest, TokenResponse};

#[utoipa::path(
    post,
    path = "/v1/auth/register",
    request_body = RegisterRequest,
    responses (
        (status = 201, description = "User created", body = TokenResponse, content_type = "application/json"),
        (status = 400, description = "Password policy violation", body = [crate::auth::FieldError]),
        (status = 401, description = "Email already registered or not authenticated"),
        (status = 403, description = "Caller is not a superadmin"),
    ),
    security (("bearer" = [])),
    tag = "auth"
)]
pub async fn register(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    payload: Option<Json<RegisterRequest>>,
) -> impl IntoResponse {
    let request = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    if !valid_email(request.email.trim()) {
        return auth_error_response(&AuthError::Validation(vec![FieldError::new(
            "email",
            "must be a valid email address",
        )]));
    }

    let ctx = request_context(&headers);
    let role = request.role;
    let registration = Registration {
        email: request.email,
        password: request.password,
        full_name: request.full_name,
        role: request.role,
        teacher_id: request.teacher_id,
        student_id: request.student_id,
    };

    match state.engine.register(registration, &ctx).await {
        Ok(tokens) => {
            info!(role = ?role, "user registered");
            (StatusCode::CREATED, Json(TokenResponse::from(tokens))).into_response()
        }
        Err(err) => auth_error_response(&err),
    }
}
