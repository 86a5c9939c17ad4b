use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;

use crate::api::AppState;
use crate::auth::AuthenticatedUser;

use super::auth_error_response;
use super::types::UserResponse;

#[utoipa::path(
    get,
    path = "/v1/auth/me",
    responses (
        (status = 200, description = "Current identity", body = UserResponse, content_type = "application/json"),
        (status = 401, description = "Not authenticated"),
        (status = 404, description = "Token subject no longer exists"),
    ),
    security (("bearer" = [])),
    tag = "auth"
)]
pub async fn me(
    state: Extension<Arc<AppState>>,
    actor: Extension<AuthenticatedUser>,
) -> impl IntoResponse {
    // Re-read instead of echoing claims so role or name changes show up
    // without waiting for the access token to expire.
    match state.engine.me(actor.id).await {
        Ok(user) => (StatusCode::OK, Json(UserResponse::from(user))).into_response(),
        Err(err) => auth_error_response(&err),
    }
}
