use axum::{extract::Extension, http::HeaderMap, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;

use crate::api::handlers::request_context;
use crate::api::AppState;

use super::auth_error_response;
use super::types::{LogoutRequest, RefreshRequest, TokenResponse};

#[utoipa::path(
    post,
    path = "/v1/auth/refresh",
    request_body = RefreshRequest,
    responses (
        (status = 201, description = "Token pair rotated", body = TokenResponse, content_type = "application/json"),
        (status = 401, description = "Invalid, expired, or revoked refresh token"),
        (status = 404, description = "Token subject no longer exists"),
        (status = 429, description = "Too many requests"),
    ),
    tag = "auth"
)]
pub async fn refresh(
    state: Extension<Arc<AppState>>,
    headers: HeaderMap,
    payload: Option<Json<RefreshRequest>>,
) -> impl IntoResponse {
    let request = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let ctx = request_context(&headers);
    match state.engine.refresh(&request.refresh_token, &ctx).await {
        Ok(tokens) => (StatusCode::CREATED, Json(TokenResponse::from(tokens))).into_response(),
        Err(err) => auth_error_response(&err),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    request_body = LogoutRequest,
    responses (
        (status = 200, description = "Refresh token revoked"),
        (status = 401, description = "Not authenticated or malformed refresh token"),
    ),
    security (("bearer" = [])),
    tag = "auth"
)]
pub async fn logout(
    state: Extension<Arc<AppState>>,
    payload: Option<Json<LogoutRequest>>,
) -> impl IntoResponse {
    let request = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    match state.engine.logout(&request.refresh_token).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "success": true }))).into_response(),
        Err(err) => auth_error_response(&err),
    }
}
