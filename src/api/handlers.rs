use std::sync::Arc;
use axum::{extract::State, http::StatusCode, Json, response::{Html, IntoResponse}};
use crate::{attendance, AppState};

pub async fn index_page() -> Html<&'static str> {
    Html(include_str!("../../static/index.html"))
}

pub async fn create_attendee_page() -> Html<&'static str> {
    Html(include_str!("../../static/create_attendee.html"))
}

pub async fn mark_attendance_page() -> Html<&'static str> {
    Html(include_str!("../../static/mark_attendance.html"))
}

pub async fn view_attendance_page() -> Html<&'static str> {
    Html(include_str!("../../static/view_attendance.html"))
}

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let v = env!("CARGO_PKG_VERSION");
    let count = tokio::task::spawn_blocking({
        let pool = state.pool.clone();
        move || attendance::attendee_count(&pool)
    }).await;
    let attendees = match count {
        Ok(Ok(n)) => n,
        Ok(Err(e)) => {
            tracing::warn!("Health check could not count attendees: {}", e);
            0
        }
        Err(e) => {
            tracing::warn!("Task error counting attendees: {}", e);
            0
        }
    };

    let body = serde_json::json!({
        "status": "ok",
        "version": v,
        "database": "SQLite",
        "face_recognition": state.encoder.ready(),
        "attendees": attendees,
        "uptime_secs": state.started_at.elapsed().as_secs()
    });
    (StatusCode::OK, Json(body))
}

pub async fn attendance_records(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let result = tokio::task::spawn_blocking({
        let pool = state.pool.clone();
        move || attendance::attendance_records(&pool)
    }).await;

    match result {
        Ok(Ok(records)) => (StatusCode::OK, Json(serde_json::json!({
            "success": true,
            "records": records
        }))).into_response(),
        Ok(Err(e)) => {
            tracing::error!("Error listing attendance records: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({
                "success": false,
                "message": e.to_string()
            }))).into_response()
        }
        Err(e) => {
            tracing::error!("Task error listing attendance records: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({
                "success": false,
                "message": "Internal server error"
            }))).into_response()
        }
    }
}
