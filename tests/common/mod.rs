#![allow(dead_code)]

pub mod fixtures;

use std::net::SocketAddr;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::net::TcpListener;
use attendance_backend_sqlite::api::routes;
use attendance_backend_sqlite::db::{self, DbPool};
use attendance_backend_sqlite::pipeline::matcher::FaceMatcher;
use attendance_backend_sqlite::pipeline::FaceEncoder;
use attendance_backend_sqlite::{AppPaths, AppState};

/// Create a temporary pooled SQLite database for testing
pub fn setup_test_db() -> (TempDir, DbPool) {
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("db").join("attendance.db");
    let pool = db::create_pool(&db_path, 4).unwrap();
    (tmp, pool)
}

/// Create AppState for testing
pub fn create_test_app_state(tmp: &TempDir, pool: DbPool, encoder: Arc<dyn FaceEncoder>) -> Arc<AppState> {
    let data = tmp.path().to_path_buf();
    let paths = AppPaths {
        db_path: data.join("db").join("attendance.db"),
        models: data.join("models"),
        data,
    };
    Arc::new(AppState::new(paths, pool, encoder, FaceMatcher::default()))
}

/// Serve the router on an ephemeral port and return its base URL.
pub async fn spawn_app(state: Arc<AppState>) -> String {
    let app = routes::router(state);
    let addr = SocketAddr::from(([127, 0, 0, 1], 0));
    let listener = TcpListener::bind(&addr).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://127.0.0.1:{}", port)
}

/// Temp dir, pool and running server backed by the pixel encoder.
pub async fn start_test_server() -> (TempDir, DbPool, String) {
    let (tmp, pool) = setup_test_db();
    let state = create_test_app_state(&tmp, pool.clone(), Arc::new(fixtures::PixelEncoder));
    let base = spawn_app(state).await;
    (tmp, pool, base)
}

pub async fn post_json(base: &str, path: &str, body: serde_json::Value) -> (u16, serde_json::Value) {
    let resp = reqwest::Client::new()
        .post(format!("{}{}", base, path))
        .json(&body)
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

/// POST an arbitrary body with an explicit content type.
pub async fn post_raw(base: &str, path: &str, content_type: &str, body: &'static str) -> (u16, serde_json::Value) {
    let resp = reqwest::Client::new()
        .post(format!("{}{}", base, path))
        .header("Content-Type", content_type)
        .body(body)
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

pub async fn get_json(base: &str, path: &str) -> (u16, serde_json::Value) {
    let resp = reqwest::get(format!("{}{}", base, path)).await.unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}
