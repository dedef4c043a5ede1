use chrono::{NaiveDateTime, Timelike};
use rusqlite::{ffi, params, Connection, ErrorCode, Transaction, TransactionBehavior};

use crate::db::{query, StoreError};
use crate::models::attendee::{AttendanceEvent, TIMESTAMP_FORMAT};

pub(crate) fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(embedding.len() * 4);
    for value in embedding {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

fn is_constraint(err: &rusqlite::Error, extended: i32) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::ConstraintViolation && e.extended_code == extended
    )
}

/// Enroll a new attendee. The name must not exist yet.
pub fn insert_attendee(conn: &Connection, name: &str, embedding: &[f32]) -> Result<i64, StoreError> {
    let created_at = chrono::Local::now().naive_local().format(TIMESTAMP_FORMAT).to_string();
    let blob = encode_embedding(embedding);
    match conn.execute(
        "INSERT INTO attendees (name, face_encoding, created_at) VALUES (?1, ?2, ?3)",
        params![name, blob, created_at],
    ) {
        Ok(_) => Ok(conn.last_insert_rowid()),
        Err(e) if is_constraint(&e, ffi::SQLITE_CONSTRAINT_UNIQUE) => {
            Err(StoreError::DuplicateName(name.to_string()))
        }
        Err(e) => Err(e.into()),
    }
}

/// Record attendance for `attendee_id` at `marked_at` (local wall-clock time).
///
/// The same-day check and the insert share one immediate transaction, and the
/// `(attendee_id, marked_on)` unique index rejects anything that slips past it.
pub fn mark_attendance(
    conn: &Connection,
    attendee_id: i64,
    marked_at: NaiveDateTime,
) -> Result<AttendanceEvent, StoreError> {
    let marked_at = marked_at.with_nanosecond(0).unwrap_or(marked_at);
    let day = marked_at.date();

    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    if query::has_marked_on(&tx, attendee_id, day)? {
        return Err(StoreError::AlreadyMarked { attendee_id, day });
    }

    let stamp = marked_at.format(TIMESTAMP_FORMAT).to_string();
    match tx.execute(
        "INSERT INTO attendance (attendee_id, marked_at, marked_on) VALUES (?1, ?2, ?3)",
        params![attendee_id, stamp, day],
    ) {
        Ok(_) => {}
        Err(e) if is_constraint(&e, ffi::SQLITE_CONSTRAINT_UNIQUE) => {
            return Err(StoreError::AlreadyMarked { attendee_id, day });
        }
        Err(e) if is_constraint(&e, ffi::SQLITE_CONSTRAINT_FOREIGNKEY) => {
            return Err(StoreError::UnknownAttendee(attendee_id));
        }
        Err(e) => return Err(e.into()),
    }
    let id = tx.last_insert_rowid();
    tx.commit()?;

    Ok(AttendanceEvent { id, attendee_id, marked_at })
}
