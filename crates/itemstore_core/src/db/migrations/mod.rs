//! Item schema migrations.
//!
//! Both repository variants live in one database file, each in its own tables:
//! - `0001_items`: relational variant. `item` holds one row per item with its
//!   `version` counter; `item_tag` holds one row per tag, keyed by
//!   `(item_id, position)` so caller order and duplicates survive.
//! - `0002_item_documents`: document variant. `item_document` holds one
//!   JSON body per item; `CHECK (json_valid(body))` rejects torn writes.
//!
//! # Invariants
//! - `version` values must remain monotonic.
//! - Every pending step runs in one transaction; a failure applies none.
//! - Applied migration version is mirrored to `PRAGMA user_version`.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::Connection;

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "items",
        sql: include_str!("0001_items.sql"),
    },
    Migration {
        version: 2,
        name: "item_documents",
        sql: include_str!("0002_item_documents.sql"),
    },
];

/// Returns the latest migration version known by this binary.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Brings the item schema up to [`latest_version`].
///
/// # Errors
/// - `UnsupportedSchemaVersion` when the file was written by a newer binary.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let current_version = current_user_version(conn)?;
    let latest = latest_version();

    if current_version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: current_version,
            latest_supported: latest,
        });
    }

    if current_version == latest {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for migration in MIGRATIONS
        .iter()
        .filter(|migration| migration.version > current_version)
    {
        tx.execute_batch(migration.sql)?;
        tx.pragma_update(None, "user_version", migration.version)?;
        info!(
            "event=db_migrate module=db status=applied version={} name={}",
            migration.version, migration.name
        );
    }
    tx.commit()?;

    Ok(())
}

fn current_user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}
