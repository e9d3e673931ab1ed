//! Pooled SQLite handles shared by concurrent item requests.
//!
//! # Responsibility
//! - Build an `r2d2` pool over file or shared-cache in-memory databases.
//! - Apply per-connection pragmas through the manager's init hook.
//! - Run schema migrations once before the pool is handed out.
//!
//! # Invariants
//! - Every pooled connection has `foreign_keys=ON` and the configured busy timeout.
//! - Connections of one in-memory pool see the same database.
//! - No caller-side lock wraps a connection; SQLite's own locking
//!   serializes writers.

use super::migrations::apply_migrations;
use super::open::configure_connection;
use super::{DbError, DbResult, DEFAULT_BUSY_TIMEOUT};
use log::{error, info};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::OpenFlags;
use std::path::Path;
use std::time::{Duration, Instant};

/// Shared handle cloned into every repository.
pub type DbPool = r2d2::Pool<SqliteConnectionManager>;
/// Connection checked out of a [`DbPool`] for one repository call.
pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Pool size used when the caller does not supply one.
pub const DEFAULT_POOL_SIZE: u32 = 4;

// r2d2 rejects a zero checkout timeout.
const MIN_CHECKOUT_TIMEOUT: Duration = Duration::from_millis(100);

/// Opens a pooled file (`Some(path)`) or in-memory (`None`) database.
///
/// File databases switch to WAL so readers do not block the writer.
/// In-memory pools use a uniquely named shared-cache database.
///
/// # Side effects
/// - Emits `db_pool_open` logging events with duration and status.
pub fn open_pool(path: Option<&Path>, busy_timeout: Duration, max_size: u32) -> DbResult<DbPool> {
    let started_at = Instant::now();
    let mode = if path.is_some() { "file" } else { "memory" };
    let max_size = max_size.max(1);
    info!("event=db_pool_open module=db status=start mode={mode} max_size={max_size}");

    match build_pool(path, busy_timeout, max_size) {
        Ok(pool) => {
            info!(
                "event=db_pool_open module=db status=ok mode={mode} max_size={max_size} duration_ms={}",
                started_at.elapsed().as_millis()
            );
            Ok(pool)
        }
        Err(err) => {
            error!(
                "event=db_pool_open module=db status=error mode={mode} duration_ms={} error={}",
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

/// In-memory pool with default timeout and size, mainly for tests.
pub fn open_pool_in_memory() -> DbResult<DbPool> {
    open_pool(None, DEFAULT_BUSY_TIMEOUT, DEFAULT_POOL_SIZE)
}

fn build_pool(path: Option<&Path>, busy_timeout: Duration, max_size: u32) -> DbResult<DbPool> {
    let wal = path.is_some();
    let manager = match path {
        Some(path) => SqliteConnectionManager::file(path),
        None => SqliteConnectionManager::file(shared_memory_uri()).with_flags(
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        ),
    }
    .with_init(move |conn| {
        configure_connection(conn, busy_timeout)?;
        if wal {
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        }
        Ok(())
    });

    // In-memory databases vanish with their last connection, so pooled
    // connections are never retired by age.
    let pool = r2d2::Pool::builder()
        .max_size(max_size)
        .connection_timeout(busy_timeout.max(MIN_CHECKOUT_TIMEOUT))
        .idle_timeout(None)
        .max_lifetime(None)
        .build(manager)
        .map_err(DbError::Pool)?;

    let mut conn = pool.get().map_err(DbError::Pool)?;
    apply_migrations(&mut conn)?;
    Ok(pool)
}

fn shared_memory_uri() -> String {
    format!(
        "file:itemstore-{}?mode=memory&cache=shared",
        uuid::Uuid::new_v4().simple()
    )
}
