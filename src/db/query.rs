use anyhow::Result;
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::models::attendee::{Attendee, AttendanceRecord};

pub fn decode_embedding_blob(blob: &[u8]) -> Result<Vec<f32>> {
    // Convert bytes back to f32 (little-endian)
    if blob.len() % 4 != 0 {
        anyhow::bail!("Embedding blob length is not a multiple of 4");
    }
    let mut embedding = Vec::with_capacity(blob.len() / 4);
    for chunk in blob.chunks_exact(4) {
        let bytes: [u8; 4] = [chunk[0], chunk[1], chunk[2], chunk[3]];
        embedding.push(f32::from_le_bytes(bytes));
    }
    Ok(embedding)
}

type AttendeeRow = (i64, String, Vec<u8>, String);

fn read_attendee_row(row: &Row<'_>) -> rusqlite::Result<AttendeeRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn into_attendee((id, name, blob, created_at): AttendeeRow) -> Result<Attendee> {
    let embedding = decode_embedding_blob(&blob)?;
    Ok(Attendee { id, name, embedding, created_at })
}

pub fn count_attendees(conn: &Connection) -> Result<i64> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM attendees", [], |r| r.get(0))?;
    Ok(n)
}

/// Every enrolled attendee in enrollment order (ascending id).
///
/// The matcher takes the first acceptable candidate, so this order decides
/// which attendee wins when several are within tolerance.
pub fn list_attendees(conn: &Connection) -> Result<Vec<Attendee>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, face_encoding, COALESCE(created_at, '') FROM attendees ORDER BY id ASC",
    )?;
    let rows = stmt.query_map([], read_attendee_row)?;
    let mut attendees = Vec::new();
    for row in rows {
        let row = row?;
        let id = row.0;
        match into_attendee(row) {
            Ok(attendee) => attendees.push(attendee),
            Err(e) => {
                tracing::warn!("Failed to decode embedding for attendee {}: {}", id, e);
                continue;
            }
        }
    }
    Ok(attendees)
}

pub fn get_attendee_by_name(conn: &Connection, name: &str) -> Result<Option<Attendee>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, face_encoding, COALESCE(created_at, '') FROM attendees WHERE name = ?1",
    )?;
    let row = stmt.query_row(params![name], read_attendee_row).optional()?;
    row.map(into_attendee).transpose()
}

/// Whether `attendee_id` already has an attendance event dated `day`.
pub fn has_marked_on(conn: &Connection, attendee_id: i64, day: NaiveDate) -> rusqlite::Result<bool> {
    let mut stmt = conn.prepare("SELECT 1 FROM attendance WHERE attendee_id = ?1 AND marked_on = ?2")?;
    stmt.exists(params![attendee_id, day])
}

/// All attendance events joined with the attendee name, newest first.
pub fn list_attendance_records(conn: &Connection) -> Result<Vec<AttendanceRecord>> {
    let mut stmt = conn.prepare(
        "SELECT attendees.name, attendance.marked_at
         FROM attendance
         JOIN attendees ON attendance.attendee_id = attendees.id
         ORDER BY attendance.marked_at DESC, attendance.id DESC",
    )?;
    let records = stmt
        .query_map([], |row| {
            Ok(AttendanceRecord {
                name: row.get(0)?,
                marked_at: row.get(1)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(records)
}
