use std::net::SocketAddr;
use std::sync::Arc;
use attendance_backend_sqlite::utils::config::Config;
use attendance_backend_sqlite::utils::logging;
use attendance_backend_sqlite::db;
use attendance_backend_sqlite::pipeline::{matcher::FaceMatcher, FaceEncoder};
use attendance_backend_sqlite::{AppPaths, AppState};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init();
    let cfg = Config::from_env();
    let db_path = cfg.db_path();
    let pool = db::create_pool(&db_path, cfg.db_pool_size)?;

    let encoder = build_encoder(&cfg).await;
    if !encoder.ready() {
        tracing::warn!("Face encoder not ready; enrollment and marking will fail until models are available");
    }
    let matcher = FaceMatcher::new(cfg.match_tolerance);
    info!(tolerance = matcher.tolerance(), "face matcher configured");

    let paths = AppPaths { data: cfg.data.clone(), db_path: db_path.clone(), models: cfg.models_dir.clone() };
    let state = Arc::new(AppState::new(paths, pool, encoder, matcher));

    let app = attendance_backend_sqlite::api::routes::router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("listening" = %addr);
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(feature = "facial-recognition")]
async fn build_encoder(cfg: &Config) -> Arc<dyn FaceEncoder> {
    use attendance_backend_sqlite::pipeline::face::FaceProcessor;

    let mut processor = FaceProcessor::new(cfg.models_dir.clone(), cfg.face_confidence_threshold);
    if let Err(e) = processor.initialize(cfg.face_auto_download).await {
        tracing::error!("Failed to initialize face processor: {}", e);
    }
    Arc::new(processor)
}

#[cfg(not(feature = "facial-recognition"))]
async fn build_encoder(_cfg: &Config) -> Arc<dyn FaceEncoder> {
    use attendance_backend_sqlite::pipeline::UnavailableEncoder;

    tracing::warn!("Built without the facial-recognition feature");
    Arc::new(UnavailableEncoder)
}
