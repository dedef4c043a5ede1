use std::env;
use std::path::PathBuf;

use crate::pipeline::matcher::DEFAULT_TOLERANCE;

const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

#[derive(Clone, Debug)]
pub struct Config {
    pub data: PathBuf,
    pub port: u16,
    pub db_pool_size: u32,
    pub match_tolerance: f32,
    pub models_dir: PathBuf,
    pub face_auto_download: bool,
    pub face_confidence_threshold: f32,
}

fn parse_flag(v: &str) -> Option<bool> {
    match v {
        "1" | "true" | "TRUE" | "yes" => Some(true),
        "0" | "false" | "FALSE" | "no" => Some(false),
        _ => None,
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| env::var(k).ok())
    }

    /// Build from an arbitrary key lookup; unparsable values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let data = PathBuf::from(lookup("ATTEND_DATA").unwrap_or_else(|| "./attendance-data".to_string()));
        let port = lookup("ATTEND_PORT").and_then(|v| v.parse().ok()).unwrap_or(5000);
        let db_pool_size = lookup("ATTEND_DB_POOL_SIZE")
            .and_then(|v| v.parse().ok())
            .filter(|n: &u32| *n > 0)
            .unwrap_or(8);
        let match_tolerance = lookup("ATTEND_MATCH_TOLERANCE")
            .and_then(|v| v.parse().ok())
            .filter(|t: &f32| t.is_finite() && *t >= 0.0)
            .unwrap_or(DEFAULT_TOLERANCE);
        let models_dir = lookup("ATTEND_MODELS_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| data.join("models"));
        let face_auto_download = lookup("ATTEND_FACE_AUTO_DOWNLOAD")
            .and_then(|v| parse_flag(&v))
            .unwrap_or(true);
        let face_confidence_threshold = lookup("ATTEND_FACE_CONFIDENCE_THRESHOLD")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD);
        Self {
            data,
            port,
            db_pool_size,
            match_tolerance,
            models_dir,
            face_auto_download,
            face_confidence_threshold,
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.data.join("db").join("attendance.db")
    }
}
