use std::sync::Arc;
use axum::{extract::{rejection::JsonRejection, State}, http::StatusCode, Json};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use crate::AppState;
use crate::attendance::{self, AttendanceError};

#[derive(Deserialize)]
pub struct CreateAttendeeReq {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Deserialize)]
pub struct MarkAttendanceReq {
    #[serde(default)]
    pub image: Option<String>,
}

fn success(message: String) -> Response {
    (StatusCode::OK, Json(serde_json::json!({
        "success": true,
        "message": message
    }))).into_response()
}

fn failure(context: &str, e: AttendanceError) -> Response {
    let status = if e.is_client_error() {
        tracing::info!("{} rejected: {}", context, e);
        StatusCode::BAD_REQUEST
    } else {
        tracing::error!("Error in {}: {:#}", context, e);
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(serde_json::json!({
        "success": false,
        "message": e.to_string()
    }))).into_response()
}

/// Bodies axum cannot decode still get the JSON envelope the pages read.
fn bad_body(context: &str, rejection: JsonRejection) -> Response {
    tracing::error!("Error in {}: unreadable request body: {}", context, rejection.body_text());
    (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({
        "success": false,
        "message": rejection.body_text()
    }))).into_response()
}

fn task_failure(context: &str, e: tokio::task::JoinError) -> Response {
    tracing::error!("Task error in {}: {}", context, e);
    (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({
        "success": false,
        "message": "Internal server error"
    }))).into_response()
}

pub async fn create_attendee(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CreateAttendeeReq>, JsonRejection>,
) -> Response {
    let req = match payload {
        Ok(Json(req)) => req,
        Err(rejection) => return bad_body("create attendee", rejection),
    };
    let name = req.name.unwrap_or_default();
    let image = req.image.unwrap_or_default();
    let result = tokio::task::spawn_blocking({
        let pool = state.pool.clone();
        let encoder = state.encoder.clone();
        move || attendance::enroll_attendee(&pool, encoder.as_ref(), &name, &image)
    }).await;

    match result {
        Ok(Ok(enrolled)) => success(format!("Attendee {} created successfully", enrolled.name)),
        Ok(Err(e)) => failure("create attendee", e),
        Err(e) => task_failure("create attendee", e),
    }
}

pub async fn mark_attendance(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<MarkAttendanceReq>, JsonRejection>,
) -> Response {
    let image = match payload {
        Ok(Json(req)) => req.image.unwrap_or_default(),
        Err(rejection) => return bad_body("mark attendance", rejection),
    };
    let now = chrono::Local::now().naive_local();
    let result = tokio::task::spawn_blocking({
        let pool = state.pool.clone();
        let encoder = state.encoder.clone();
        let matcher = state.matcher.clone();
        move || attendance::recognize_and_mark(&pool, encoder.as_ref(), &matcher, &image, now)
    }).await;

    match result {
        Ok(Ok(marked)) => success(format!("Attendance marked for {}", marked.name)),
        Ok(Err(e)) => failure("mark attendance", e),
        Err(e) => task_failure("mark attendance", e),
    }
}
