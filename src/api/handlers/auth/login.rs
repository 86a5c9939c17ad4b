use axum::{extract::Extension, http::HeaderMap, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;
use tracing::debug;

use crate::api::handlers::request_context;
use crate::api::AppState;

use super::auth_error_response;
use super::types::{LoginRequest, TokenResponse};

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses (
        (status = 201, description = "Login successful", body = TokenResponse, content_type = "application/json"),
        (status = 401, description = "Invalid credentials or account locked"),
        (status = 429, description = "Too many requests"),
    ),
    tag = "auth"
)]
pub async fn login(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let request = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    debug!(email = %request.email, "login attempt");

    let ctx = request_context(&headers);
    match state.engine.login(&request.email, &request.password, &ctx).await {
        Ok(tokens) => (StatusCode::CREATED, Json(TokenResponse::from(tokens))).into_response(),
        Err(err) => auth_error_response(&err),
    }
}
