//! Record read endpoints behind the ownership guard.
//!
//! By the time these run, the guard chain has already authenticated the
//! caller and resolved ownership; the handlers only project the record.

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

use crate::api::AppState;

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "message": "Not found" })),
    )
        .into_response()
}

fn internal(err: &anyhow::Error) -> Response {
    error!("record lookup failed: {err:?}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "message": "Internal Server Error" })),
    )
        .into_response()
}

#[utoipa::path(
    get,
    path = "/v1/classes/{id}",
    params(("id" = Uuid, Path, description = "Class id")),
    responses (
        (status = 200, description = "Class found"),
        (status = 403, description = "Caller has no ownership path to this class"),
        (status = 404, description = "Class does not exist"),
    ),
    security (("bearer" = [])),
    tag = "records"
)]
pub async fn get_class(
    state: Extension<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.directory.class_summary(id).await {
        Ok(Some(class)) => (
            StatusCode::OK,
            Json(json!({ "id": class.id, "homeroomId": class.homeroom_id })),
        )
            .into_response(),
        Ok(None) => not_found(),
        Err(err) => internal(&err),
    }
}

#[utoipa::path(
    get,
    path = "/v1/subjects/{id}",
    params(("id" = Uuid, Path, description = "Subject id")),
    responses (
        (status = 200, description = "Subject found"),
        (status = 403, description = "Caller has no ownership path to this subject"),
        (status = 404, description = "Subject does not exist"),
    ),
    security (("bearer" = [])),
    tag = "records"
)]
pub async fn get_subject(
    state: Extension<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    // Subjects carry no ownership-relevant fields beyond their id.
    match state.directory.subject_exists(id).await {
        Ok(true) => (StatusCode::OK, Json(json!({ "id": id }))).into_response(),
        Ok(false) => not_found(),
        Err(err) => internal(&err),
    }
}

#[utoipa::path(
    get,
    path = "/v1/enrollments/{id}",
    params(("id" = Uuid, Path, description = "Enrollment id")),
    responses (
        (status = 200, description = "Enrollment found"),
        (status = 403, description = "Caller has no ownership path to this enrollment"),
        (status = 404, description = "Enrollment does not exist"),
    ),
    security (("bearer" = [])),
    tag = "records"
)]
pub async fn get_enrollment(
    state: Extension<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.directory.enrollment_class(id).await {
        Ok(Some(class_id)) => (
            StatusCode::OK,
            Json(json!({ "id": id, "classId": class_id })),
        )
            .into_response(),
        Ok(None) => not_found(),
        Err(err) => internal(&err),
    }
}

#[utoipa::path(
    get,
    path = "/v1/grades/{id}",
    params(("id" = Uuid, Path, description = "Grade id")),
    responses (
        (status = 200, description = "Grade found"),
        (status = 403, description = "Caller has no ownership path to this grade"),
        (status = 404, description = "Grade does not exist"),
    ),
    security (("bearer" = [])),
    tag = "records"
)]
pub async fn get_grade(
    state: Extension<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.directory.grade_ref(id).await {
        Ok(Some(grade)) => (
            StatusCode::OK,
            Json(json!({
                "id": id,
                "enrollmentId": grade.enrollment_id,
                "teacherId": grade.teacher_id,
            })),
        )
            .into_response(),
        Ok(None) => not_found(),
        Err(err) => internal(&err),
    }
}

#[utoipa::path(
    get,
    path = "/v1/attendance/{id}",
    params(("id" = Uuid, Path, description = "Attendance record id")),
    responses (
        (status = 200, description = "Attendance record found"),
        (status = 403, description = "Caller has no ownership path to this record"),
        (status = 404, description = "Attendance record does not exist"),
    ),
    security (("bearer" = [])),
    tag = "records"
)]
pub async fn get_attendance(
    state: Extension<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.directory.attendance_ref(id).await {
        Ok(Some(record)) => (
            StatusCode::OK,
            Json(json!({
                "id": id,
                "enrollmentId": record.enrollment_id,
                "teacherId": record.teacher_id,
            })),
        )
            .into_response(),
        Ok(None) => not_found(),
        Err(err) => internal(&err),
    }
}

#[utoipa::path(
    get,
    path = "/v1/reports/{id}",
    params(("id" = Uuid, Path, description = "Report id")),
    responses (
        (status = 200, description = "Report found"),
        (status = 403, description = "Caller has no ownership path to this report"),
        (status = 404, description = "Report does not exist"),
    ),
    security (("bearer" = [])),
    tag = "records"
)]
pub async fn get_report(
    state: Extension<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    match state.directory.report_enrollment(id).await {
        Ok(Some(enrollment_id)) => (
            StatusCode::OK,
            Json(json!({ "id": id, "enrollmentId": enrollment_id })),
        )
            .into_response(),
        Ok(None) => not_found(),
        Err(err) => internal(&err),
    }
}
