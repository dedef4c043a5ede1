use anyhow::Result;
use rusqlite::Connection;
use std::time::Duration;

pub fn apply_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(())
}

pub fn apply_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS attendees (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  name TEXT UNIQUE NOT NULL,
  face_encoding BLOB NOT NULL,
  created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS attendance (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  attendee_id INTEGER NOT NULL,
  marked_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
  marked_on TEXT,
  FOREIGN KEY (attendee_id) REFERENCES attendees (id)
);

CREATE INDEX IF NOT EXISTS idx_attendance_marked_at ON attendance(marked_at);
    "#,
    )?;

    // Databases created before the per-day column existed only carry marked_at.
    let has_marked_on = {
        let mut stmt = conn.prepare("PRAGMA table_info(attendance)")?;
        let mut found = false;
        let rows = stmt.query_map([], |row| row.get::<_, String>(1))?;
        for name in rows {
            if name.unwrap_or_default() == "marked_on" {
                found = true;
                break;
            }
        }
        found
    };
    if !has_marked_on {
        conn.execute("ALTER TABLE attendance ADD COLUMN marked_on TEXT", [])?;
    }
    let backfilled = conn.execute(
        "UPDATE attendance SET marked_on = DATE(marked_at) WHERE marked_on IS NULL",
        [],
    )?;
    if backfilled > 0 {
        tracing::info!(rows = backfilled, "backfilled attendance.marked_on");
    }

    if let Err(e) = conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_attendance_daily ON attendance(attendee_id, marked_on)",
        [],
    ) {
        // Legacy data may already hold same-day duplicates; marking still
        // checks inside an immediate transaction.
        tracing::warn!("Could not create daily attendance index: {}", e);
    }

    Ok(())
}
