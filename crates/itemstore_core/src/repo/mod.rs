//! Repository port for item persistence and its SQLite-backed variants.
//!
//! # Responsibility
//! - Define the storage-agnostic `ItemRepository` contract.
//! - Provide a relational variant (`item` + `item_tag` join table) and a
//!   document variant (one JSON document per item, tags embedded).
//!
//! # Invariants
//! - Absence of an item is `Ok(None)`, never an error.
//! - Tag searches return an empty `Vec` when nothing matches.
//! - A conditional update that touches nothing is `RepoError::ZeroAffected`
//!   in every variant.
//! - Write paths call `Item::validate()` before SQL mutations.

pub mod document_item_repo;
pub mod factory;
pub mod sql_item_repo;

use crate::db::DbError;
use crate::model::item::{Item, ItemId, SpecValidationError};
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for item persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    /// Transport/engine failure, passed through unchanged.
    Db(DbError),
    /// Conditional update matched no row/document.
    ZeroAffected(ItemId),
    /// Document could not be encoded or decoded.
    Codec(serde_json::Error),
    InvalidData(String),
    Validation(SpecValidationError),
    MissingRequiredTable(&'static str),
    MissingRequiredColumn {
        table: &'static str,
        column: &'static str,
    },
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::ZeroAffected(id) => write!(f, "no record affected for item {id}"),
            Self::Codec(err) => write!(f, "item document codec failure: {err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted item data: {message}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::MissingRequiredTable(table) => write!(f, "missing required table `{table}`"),
            Self::MissingRequiredColumn { table, column } => {
                write!(f, "missing required column `{table}.{column}`")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Codec(err) => Some(err),
            Self::Validation(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<r2d2::Error> for RepoError {
    fn from(value: r2d2::Error) -> Self {
        Self::Db(DbError::Pool(value))
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(value: serde_json::Error) -> Self {
        Self::Codec(value)
    }
}

impl From<SpecValidationError> for RepoError {
    fn from(value: SpecValidationError) -> Self {
        Self::Validation(value)
    }
}

/// Storage port consumed by `ItemService`.
pub trait ItemRepository {
    /// Mints a fresh id in this backend's native format.
    fn next_id(&self) -> ItemId;
    /// Returns `Ok(None)` when no item matches.
    fn find_by_id(&self, id: &str) -> RepoResult<Option<Item>>;
    /// Returns every item carrying `tag`; empty when none match.
    fn find_all_by_tag(&self, tag: &str) -> RepoResult<Vec<Item>>;
    /// Persists a new item atomically, tags included.
    fn insert(&self, item: &Item) -> RepoResult<()>;
    /// Replaces the stored item only if its version still equals
    /// `expected_version`; otherwise fails with `ZeroAffected`.
    fn update(&self, item: &Item, expected_version: i64) -> RepoResult<()>;
}

impl<R: ItemRepository + ?Sized> ItemRepository for Box<R> {
    fn next_id(&self) -> ItemId {
        (**self).next_id()
    }

    fn find_by_id(&self, id: &str) -> RepoResult<Option<Item>> {
        (**self).find_by_id(id)
    }

    fn find_all_by_tag(&self, tag: &str) -> RepoResult<Vec<Item>> {
        (**self).find_all_by_tag(tag)
    }

    fn insert(&self, item: &Item) -> RepoResult<()> {
        (**self).insert(item)
    }

    fn update(&self, item: &Item, expected_version: i64) -> RepoResult<()> {
        (**self).update(item, expected_version)
    }
}

impl<R: ItemRepository + ?Sized> ItemRepository for Arc<R> {
    fn next_id(&self) -> ItemId {
        (**self).next_id()
    }

    fn find_by_id(&self, id: &str) -> RepoResult<Option<Item>> {
        (**self).find_by_id(id)
    }

    fn find_all_by_tag(&self, tag: &str) -> RepoResult<Vec<Item>> {
        (**self).find_all_by_tag(tag)
    }

    fn insert(&self, item: &Item) -> RepoResult<()> {
        (**self).insert(item)
    }

    fn update(&self, item: &Item, expected_version: i64) -> RepoResult<()> {
        (**self).update(item, expected_version)
    }
}

/// Fails when `table` or any of `columns` is absent from the schema.
pub(crate) fn ensure_table_ready(
    conn: &Connection,
    table: &'static str,
    columns: &[&'static str],
) -> RepoResult<()> {
    if !table_exists(conn, table)? {
        return Err(RepoError::MissingRequiredTable(table));
    }

    for &column in columns {
        if !table_has_column(conn, table, column)? {
            return Err(RepoError::MissingRequiredColumn { table, column });
        }
    }

    Ok(())
}

fn table_exists(conn: &Connection, table: &str) -> RepoResult<bool> {
    let exists: i64 = conn.query_row(
        "SELECT EXISTS(
            SELECT 1
            FROM sqlite_master
            WHERE type = 'table' AND name = ?1
        );",
        [table],
        |row| row.get(0),
    )?;
    Ok(exists == 1)
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> RepoResult<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table});"))?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let current: String = row.get(1)?;
        if current == column {
            return Ok(true);
        }
    }
    Ok(false)
}
