pub mod utils;
pub mod models;
pub mod db;
pub mod pipeline;
pub mod attendance;
pub mod api;

use std::path::PathBuf;
use std::sync::Arc;

use pipeline::matcher::FaceMatcher;
use pipeline::FaceEncoder;

#[derive(Clone)]
pub struct AppPaths {
    pub data: PathBuf,
    pub db_path: PathBuf,
    pub models: PathBuf,
}

/// Shared by every request handler for the lifetime of the server.
#[derive(Clone)]
pub struct AppState {
    pub started_at: std::time::Instant,
    pub paths: AppPaths,
    pub pool: db::DbPool,
    pub encoder: Arc<dyn FaceEncoder>,
    pub matcher: FaceMatcher,
}

impl AppState {
    pub fn new(paths: AppPaths, pool: db::DbPool, encoder: Arc<dyn FaceEncoder>, matcher: FaceMatcher) -> Self {
        Self {
            started_at: std::time::Instant::now(),
            paths,
            pool,
            encoder,
            matcher,
        }
    }
}
