//! Delete the attendance database so the next start creates a fresh one.

use attendance_backend_sqlite::utils::config::Config;
use attendance_backend_sqlite::utils::logging;
use tracing::info;

fn main() -> anyhow::Result<()> {
    logging::init();
    let cfg = Config::from_env();
    let db_path = cfg.db_path();

    let mut removed = false;
    for suffix in ["", "-wal", "-shm"] {
        let mut file = db_path.clone().into_os_string();
        file.push(suffix);
        let file = std::path::PathBuf::from(file);
        if file.exists() {
            std::fs::remove_file(&file)?;
            info!("Removed {:?}", file);
            removed = true;
        }
    }

    if removed {
        info!("Database reset; it will be recreated on next start");
    } else {
        info!("No database found at {:?}", db_path);
    }
    Ok(())
}
