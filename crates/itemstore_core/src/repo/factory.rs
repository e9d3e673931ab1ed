//! Startup-time selection of the item repository variant.

use crate::config::{DatabaseDriver, StoreConfig};
use crate::db::open_pool;
use crate::repo::document_item_repo::DocumentItemRepository;
use crate::repo::sql_item_repo::SqliteItemRepository;
use crate::repo::{ItemRepository, RepoResult};
use log::{error, info};

/// Boxed repository handed to `ItemService` at construction.
pub type DynItemRepository = Box<dyn ItemRepository + Send + Sync>;

/// Opens the configured database pool and builds the matching repository.
pub fn open_item_repository(config: &StoreConfig) -> RepoResult<DynItemRepository> {
    let driver = config.driver.as_str();
    let result = open_variant(config);
    match &result {
        Ok(_) => info!(
            "event=item_repo_open module=repo status=ok driver={driver} pool_size={}",
            config.pool_size
        ),
        Err(err) => error!(
            "event=item_repo_open module=repo status=error driver={driver} error={err}"
        ),
    }
    result
}

fn open_variant(config: &StoreConfig) -> RepoResult<DynItemRepository> {
    let pool = open_pool(
        config.path.as_deref(),
        config.busy_timeout(),
        config.pool_size,
    )?;
    let repo: DynItemRepository = match config.driver {
        DatabaseDriver::Relational => Box::new(SqliteItemRepository::try_new(pool)?),
        DatabaseDriver::Document => Box::new(DocumentItemRepository::try_new(pool)?),
    };
    Ok(repo)
}
