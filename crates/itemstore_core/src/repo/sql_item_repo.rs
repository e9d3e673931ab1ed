//! Relational item repository over `item` and `item_tag`.
//!
//! # Responsibility
//! - Rebuild the tag sequence with one grouped join per read.
//! - Wrap `insert`/`update` in one immediate transaction each.
//!
//! # Invariants
//! - Tag rows are fully replaced on update, never diffed.
//! - A failure at any step leaves no partial tag rows behind: the
//!   transaction is dropped uncommitted, which rolls it back.
//! - `update` is conditional on `id = ? AND version = ?`.

use crate::db::{DbPool, PooledConnection};
use crate::model::item::{Item, ItemId};
use crate::repo::{ensure_table_ready, ItemRepository, RepoError, RepoResult};
use rusqlite::{params, Row, Transaction, TransactionBehavior};
use uuid::Uuid;

const ITEM_SELECT_SQL: &str = "SELECT
    i.id,
    i.name,
    i.description,
    i.created_at,
    i.created_by,
    i.modified_at,
    i.modified_by,
    i.version,
    COALESCE(it.tags, '[]') AS tags
FROM item i
LEFT JOIN (
    SELECT item_id, json_group_array(tag ORDER BY position ASC) AS tags
    FROM item_tag
    GROUP BY item_id
) AS it ON it.item_id = i.id";

/// SQLite-backed relational item repository.
pub struct SqliteItemRepository {
    pool: DbPool,
}

impl SqliteItemRepository {
    /// Constructs a repository over a pool whose schema is migrated.
    pub fn try_new(pool: DbPool) -> RepoResult<Self> {
        let conn = pool.get()?;
        ensure_table_ready(
            &conn,
            "item",
            &[
                "id",
                "name",
                "description",
                "created_at",
                "created_by",
                "modified_at",
                "modified_by",
                "version",
            ],
        )?;
        ensure_table_ready(&conn, "item_tag", &["item_id", "position", "tag"])?;
        drop(conn);
        Ok(Self { pool })
    }

    fn conn(&self) -> RepoResult<PooledConnection> {
        Ok(self.pool.get()?)
    }
}

impl ItemRepository for SqliteItemRepository {
    fn next_id(&self) -> ItemId {
        Uuid::new_v4().to_string()
    }

    fn find_by_id(&self, id: &str) -> RepoResult<Option<Item>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!("{ITEM_SELECT_SQL} WHERE i.id = ?1;"))?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_item_row(row)?));
        }

        Ok(None)
    }

    fn find_all_by_tag(&self, tag: &str) -> RepoResult<Vec<Item>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "{ITEM_SELECT_SQL}
             WHERE i.id IN (
                SELECT item_id
                FROM item_tag
                WHERE tag = ?1
             )
             ORDER BY i.created_at ASC, i.id ASC;"
        ))?;
        let mut rows = stmt.query([tag])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_item_row(row)?);
        }

        Ok(items)
    }

    fn insert(&self, item: &Item) -> RepoResult<()> {
        item.validate()?;

        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO item (
                id,
                name,
                description,
                created_at,
                created_by,
                modified_at,
                modified_by,
                version
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8);",
            params![
                item.id.as_str(),
                item.name.as_str(),
                item.description.as_str(),
                item.created_at,
                item.created_by.as_str(),
                item.modified_at,
                item.modified_by.as_str(),
                item.version,
            ],
        )?;
        insert_tags(&tx, &item.id, &item.tags)?;
        tx.commit()?;

        Ok(())
    }

    fn update(&self, item: &Item, expected_version: i64) -> RepoResult<()> {
        item.validate()?;

        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let changed = tx.execute(
            "UPDATE item
             SET
                name = ?1,
                description = ?2,
                modified_at = ?3,
                modified_by = ?4,
                version = ?5
             WHERE id = ?6
               AND version = ?7;",
            params![
                item.name.as_str(),
                item.description.as_str(),
                item.modified_at,
                item.modified_by.as_str(),
                item.version,
                item.id.as_str(),
                expected_version,
            ],
        )?;

        if changed == 0 {
            return Err(RepoError::ZeroAffected(item.id.clone()));
        }

        tx.execute(
            "DELETE FROM item_tag WHERE item_id = ?1;",
            [item.id.as_str()],
        )?;
        insert_tags(&tx, &item.id, &item.tags)?;
        tx.commit()?;

        Ok(())
    }
}

fn insert_tags(tx: &Transaction<'_>, item_id: &str, tags: &[String]) -> RepoResult<()> {
    let mut stmt =
        tx.prepare("INSERT INTO item_tag (item_id, position, tag) VALUES (?1, ?2, ?3);")?;
    for (position, tag) in tags.iter().enumerate() {
        let position = i64::try_from(position)
            .map_err(|_| RepoError::InvalidData(format!("tag position {position} overflows")))?;
        stmt.execute(params![item_id, position, tag.as_str()])?;
    }
    Ok(())
}

fn parse_item_row(row: &Row<'_>) -> RepoResult<Item> {
    let id: String = row.get("id")?;
    let tags_json: String = row.get("tags")?;
    let tags: Vec<String> = serde_json::from_str(&tags_json).map_err(|err| {
        RepoError::InvalidData(format!("invalid tag aggregate for item `{id}`: {err}"))
    })?;

    Ok(Item {
        id,
        name: row.get("name")?,
        description: row.get("description")?,
        tags,
        created_at: row.get("created_at")?,
        created_by: row.get("created_by")?,
        modified_at: row.get("modified_at")?,
        modified_by: row.get("modified_by")?,
        version: row.get("version")?,
    })
}
