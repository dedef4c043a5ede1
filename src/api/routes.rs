use axum::{Router, routing::{get, post}};
use axum::extract::DefaultBodyLimit;
use std::sync::Arc;
use tower_http::cors::{CorsLayer, AllowOrigin};
use tower_http::trace::TraceLayer;
use axum::http::Method;
use crate::AppState;
use crate::api::{handlers, handlers_face};

// Webcam captures arrive as base64 data URLs inside JSON.
const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::any())
        .allow_methods(vec![Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(vec![axum::http::header::CONTENT_TYPE, axum::http::header::ACCEPT]);

    Router::new()
        .route("/", get(handlers::index_page))
        .route("/create-attendee", get(handlers::create_attendee_page))
        .route("/mark-attendance", get(handlers::mark_attendance_page))
        .route("/view-attendance", get(handlers::view_attendance_page))
        .route("/health", get(handlers::health))
        .route("/api/attendance-records", get(handlers::attendance_records))
        .route("/api/create-attendee", post(handlers_face::create_attendee))
        .route("/api/mark-attendance", post(handlers_face::mark_attendance))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
