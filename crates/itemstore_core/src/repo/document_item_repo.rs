//! Document item repository: one JSON document per item.
//!
//! # Responsibility
//! - Store each item as a single self-contained document with an embedded
//!   tag array in `item_document.body`.
//! - Mint 24-hex-character document ids.
//!
//! # Invariants
//! - Every write is one single-statement document operation; no
//!   multi-document transaction is used.
//! - An id that is not a valid document id is treated as not found.
//! - Tag search is array containment, not full-array equality.

use crate::db::{DbPool, PooledConnection};
use crate::model::item::{Item, ItemId};
use crate::repo::{ensure_table_ready, ItemRepository, RepoError, RepoResult};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

static DOCUMENT_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9a-fA-F]{24}$").expect("valid document id regex"));

/// Persisted document shape. Field names are the stored wire names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct ItemDocument {
    #[serde(rename = "_id")]
    id: String,
    name: String,
    description: String,
    tags: Vec<String>,
    created_at: i64,
    created_by: String,
    modified_at: i64,
    modified_by: String,
    version: i64,
}

impl From<&Item> for ItemDocument {
    fn from(item: &Item) -> Self {
        Self {
            id: item.id.clone(),
            name: item.name.clone(),
            description: item.description.clone(),
            tags: item.tags.clone(),
            created_at: item.created_at,
            created_by: item.created_by.clone(),
            modified_at: item.modified_at,
            modified_by: item.modified_by.clone(),
            version: item.version,
        }
    }
}

impl From<ItemDocument> for Item {
    fn from(document: ItemDocument) -> Self {
        Self {
            id: document.id,
            name: document.name,
            description: document.description,
            tags: document.tags,
            created_at: document.created_at,
            created_by: document.created_by,
            modified_at: document.modified_at,
            modified_by: document.modified_by,
            version: document.version,
        }
    }
}

/// SQLite JSON-document item repository.
pub struct DocumentItemRepository {
    pool: DbPool,
}

impl DocumentItemRepository {
    /// Constructs a repository over a pool whose schema is migrated.
    pub fn try_new(pool: DbPool) -> RepoResult<Self> {
        let conn = pool.get()?;
        ensure_table_ready(&conn, "item_document", &["id", "body"])?;
        drop(conn);
        Ok(Self { pool })
    }

    fn conn(&self) -> RepoResult<PooledConnection> {
        Ok(self.pool.get()?)
    }
}

impl ItemRepository for DocumentItemRepository {
    fn next_id(&self) -> ItemId {
        new_document_id()
    }

    fn find_by_id(&self, id: &str) -> RepoResult<Option<Item>> {
        let Some(document_id) = parse_document_id(id) else {
            return Ok(None);
        };

        let conn = self.conn()?;
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM item_document WHERE id = ?1;",
                [document_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        body.map(|body| decode_document(&body)).transpose()
    }

    fn find_all_by_tag(&self, tag: &str) -> RepoResult<Vec<Item>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT d.body
             FROM item_document d
             WHERE EXISTS (
                SELECT 1
                FROM json_each(d.body, '$.tags') AS t
                WHERE t.value = ?1
             )
             ORDER BY json_extract(d.body, '$.created_at') ASC, d.id ASC;",
        )?;
        let mut rows = stmt.query([tag])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            let body: String = row.get(0)?;
            items.push(decode_document(&body)?);
        }

        Ok(items)
    }

    fn insert(&self, item: &Item) -> RepoResult<()> {
        item.validate()?;
        let document_id = parse_document_id(&item.id).ok_or_else(|| {
            RepoError::InvalidData(format!("`{}` is not a document id", item.id))
        })?;
        let body = serde_json::to_string(&ItemDocument::from(item))?;

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO item_document (id, body) VALUES (?1, ?2);",
            params![document_id, body],
        )?;

        Ok(())
    }

    fn update(&self, item: &Item, expected_version: i64) -> RepoResult<()> {
        item.validate()?;
        let Some(document_id) = parse_document_id(&item.id) else {
            return Err(RepoError::ZeroAffected(item.id.clone()));
        };
        let body = serde_json::to_string(&ItemDocument::from(item))?;

        let conn = self.conn()?;
        let changed = replace_document(&conn, &document_id, expected_version, &body)?;
        if changed == 0 {
            return Err(RepoError::ZeroAffected(item.id.clone()));
        }

        Ok(())
    }
}

/// Conditional replace filtered by id and stored version.
///
/// Returns the number of documents replaced (0 or 1).
fn replace_document(
    conn: &Connection,
    document_id: &str,
    expected_version: i64,
    body: &str,
) -> RepoResult<usize> {
    let changed = conn.execute(
        "UPDATE item_document
         SET body = ?3
         WHERE id = ?1
           AND json_extract(body, '$.version') = ?2;",
        params![document_id, expected_version, body],
    )?;
    Ok(changed)
}

fn decode_document(body: &str) -> RepoResult<Item> {
    let document: ItemDocument = serde_json::from_str(body)?;
    Ok(document.into())
}

/// Returns the canonical (lowercase) form when `id` is a document id.
pub fn parse_document_id(id: &str) -> Option<String> {
    if DOCUMENT_ID_RE.is_match(id) {
        Some(id.to_ascii_lowercase())
    } else {
        None
    }
}

/// Generates a 12-byte id rendered as 24 lowercase hex characters:
/// 4 bytes of big-endian Unix seconds, then 8 random bytes.
pub fn new_document_id() -> ItemId {
    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u32::try_from(elapsed.as_secs()).unwrap_or(u32::MAX))
        .unwrap_or(0);
    let random = Uuid::new_v4();

    let mut bytes = [0_u8; 12];
    bytes[..4].copy_from_slice(&seconds.to_be_bytes());
    bytes[4..].copy_from_slice(&random.as_bytes()[..8]);
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}
