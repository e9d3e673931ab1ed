//! Connection bootstrap utilities for SQLite.
//!
//! # Responsibility
//! - Open single file or in-memory SQLite connections.
//! - Configure pragmas and the busy timeout used as the storage deadline.
//! - Trigger schema migrations before returning a usable connection.
//!
//! # Invariants
//! - Returned connections have `foreign_keys=ON`.
//! - Returned connections have migrations fully applied.

use super::migrations::apply_migrations;
use super::{DbError, DbResult};
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

/// Busy timeout applied when the caller does not supply one.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens a SQLite database file and applies all pending migrations.
///
/// # Side effects
/// - Emits `db_open` logging events with duration and status.
pub fn open_db(path: impl AsRef<Path>) -> DbResult<Connection> {
    open_single(Some(path.as_ref()))
}

/// Opens an in-memory SQLite database and applies all pending migrations.
pub fn open_db_in_memory() -> DbResult<Connection> {
    open_single(None)
}

fn open_single(path: Option<&Path>) -> DbResult<Connection> {
    let started_at = Instant::now();
    let mode = if path.is_some() { "file" } else { "memory" };
    info!("event=db_open module=db status=start mode={mode}");

    let opened = match path {
        Some(path) => Connection::open(path),
        None => Connection::open_in_memory(),
    };
    let mut conn = match opened {
        Ok(conn) => conn,
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_open_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err.into());
        }
    };

    let bootstrapped = configure_connection(&conn, DEFAULT_BUSY_TIMEOUT)
        .map_err(DbError::from)
        .and_then(|()| apply_migrations(&mut conn));
    match bootstrapped {
        Ok(()) => {
            info!(
                "event=db_open module=db status=ok mode={mode} duration_ms={}",
                started_at.elapsed().as_millis()
            );
            Ok(conn)
        }
        Err(err) => {
            error!(
                "event=db_open module=db status=error mode={mode} duration_ms={} error_code=db_bootstrap_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

/// Per-connection pragmas shared by single connections and pooled ones.
///
/// `busy_timeout` bounds how long a statement waits on a locked database;
/// on expiry the statement fails with a plain SQLite busy error.
pub(super) fn configure_connection(
    conn: &Connection,
    busy_timeout: Duration,
) -> Result<(), rusqlite::Error> {
    conn.busy_timeout(busy_timeout)?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")
}
