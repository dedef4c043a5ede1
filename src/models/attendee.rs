use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Timestamp layout used for `created_at` / `marked_at` columns.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Attendee {
    pub id: i64,
    pub name: String,
    #[serde(skip)]
    pub embedding: Vec<f32>,
    pub created_at: String,
}

impl AsRef<[f32]> for Attendee {
    fn as_ref(&self) -> &[f32] {
        &self.embedding
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceEvent {
    pub id: i64,
    pub attendee_id: i64,
    pub marked_at: NaiveDateTime,
}

/// Row returned by `GET /api/attendance-records`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AttendanceRecord {
    pub name: String,
    pub marked_at: String,
}
