pub mod schema;
pub mod writer;
pub mod query;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use std::path::Path;
use thiserror::Error;

pub type DbPool = r2d2::Pool<SqliteConnectionManager>;
pub type PooledConn = r2d2::PooledConnection<SqliteConnectionManager>;

/// Failures from the write side that callers need to tell apart.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("attendee name {0:?} already exists")]
    DuplicateName(String),
    #[error("attendee {attendee_id} already marked on {day}")]
    AlreadyMarked { attendee_id: i64, day: NaiveDate },
    #[error("attendee {0} does not exist")]
    UnknownAttendee(i64),
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

pub fn open_or_create<P: AsRef<Path>>(db_path: P) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    schema::apply_pragmas(&conn)?;
    schema::apply_schema(&conn)?;
    Ok(conn)
}

/// Build the connection pool shared by all request handlers.
///
/// Every pooled connection gets the pragmas applied on checkout creation; the
/// schema is applied once through the first connection.
pub fn create_pool<P: AsRef<Path>>(db_path: P, max_size: u32) -> Result<DbPool> {
    let db_path = db_path.as_ref();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create database directory {:?}", parent))?;
    }
    let manager = SqliteConnectionManager::file(db_path)
        .with_init(|conn| schema::apply_pragmas(conn));
    let pool = r2d2::Pool::builder()
        .max_size(max_size.max(1))
        .build(manager)
        .context("Failed to build SQLite connection pool")?;
    {
        let conn = pool.get()?;
        schema::apply_schema(&conn)?;
    }
    tracing::info!(path = ?db_path, max_size, "database pool ready");
    Ok(pool)
}
