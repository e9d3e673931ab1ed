//! Persistence and optimistic concurrency core for versioned items.
//! This crate is the single source of truth for item invariants.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ConfigError, DatabaseDriver, LogConfig, StoreConfig};
pub use logging::{default_log_level, init_logging, logging_status, LogLevel, LoggingError};
pub use model::item::{Item, ItemId, SpecValidationError, UpsertItemSpec};
pub use repo::document_item_repo::DocumentItemRepository;
pub use repo::factory::{open_item_repository, DynItemRepository};
pub use repo::sql_item_repo::SqliteItemRepository;
pub use repo::{ItemRepository, RepoError, RepoResult};
pub use service::item_service::{ItemService, ItemServiceError, ServiceResult};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
