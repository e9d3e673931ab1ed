//! Item use-case service with optimistic concurrency control.
//!
//! # Responsibility
//! - Validate upsert input before any id is minted or storage is touched.
//! - Assign ids, versions and audit fields on create.
//! - Run read, compare, then conditional write on update.
//!
//! # Invariants
//! - The in-memory version check is advisory. The repository's conditional
//!   write is the authoritative guard; zero affected becomes `Conflict`.
//! - Backend failures are returned unchanged inside `ItemServiceError::Repo`.
//! - Nothing is retried.

use crate::model::item::{now_epoch_ms, Item, ItemId, SpecValidationError, UpsertItemSpec};
use crate::repo::{ItemRepository, RepoError};
use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Service error for item use-cases.
#[derive(Debug)]
pub enum ItemServiceError {
    /// Upsert input or target id failed validation.
    InvalidSpec(SpecValidationError),
    /// No item exists for the id.
    NotFound(ItemId),
    /// Stored version differs from the caller's expected version.
    Conflict { id: ItemId, expected_version: i64 },
    /// Persistence-layer failure.
    Repo(RepoError),
}

impl Display for ItemServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidSpec(err) => write!(f, "invalid item spec: {err}"),
            Self::NotFound(id) => write!(f, "item not found: {id}"),
            Self::Conflict {
                id,
                expected_version,
            } => write!(
                f,
                "item {id} has been modified since version {expected_version}"
            ),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ItemServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidSpec(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<SpecValidationError> for ItemServiceError {
    fn from(value: SpecValidationError) -> Self {
        Self::InvalidSpec(value)
    }
}

impl From<RepoError> for ItemServiceError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

pub type ServiceResult<T> = Result<T, ItemServiceError>;

/// Item service facade over one repository variant.
pub struct ItemService<R: ItemRepository> {
    repo: R,
}

impl<R: ItemRepository> ItemService<R> {
    /// Creates a service using the provided repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Gets one item by id. Absence is `Ok(None)`.
    pub fn get_item_by_id(&self, id: &str) -> ServiceResult<Option<Item>> {
        Ok(self.repo.find_by_id(id)?)
    }

    /// Gets all items carrying `tag`. Never absent; empty when no match.
    pub fn get_items_by_tag(&self, tag: &str) -> ServiceResult<Vec<Item>> {
        Ok(self.repo.find_all_by_tag(tag)?)
    }

    /// Creates a new item at version 1 and returns its id.
    pub fn create_item(&self, spec: &UpsertItemSpec, created_by: &str) -> ServiceResult<ItemId> {
        if let Err(err) = spec.validate() {
            warn!("event=item_create module=service status=invalid reason={err}");
            return Err(err.into());
        }

        let item = Item::new(self.repo.next_id(), spec, created_by, now_epoch_ms());
        match self.repo.insert(&item) {
            Ok(()) => {
                info!(
                    "event=item_create module=service status=ok item_id={} version={}",
                    item.id, item.version
                );
                Ok(item.id)
            }
            Err(err) => {
                error!(
                    "event=item_create module=service status=error item_id={} error={}",
                    item.id, err
                );
                Err(err.into())
            }
        }
    }

    /// Replaces name, description and tags of an existing item.
    ///
    /// # Contract
    /// - `InvalidSpec` for bad input or an empty `id`; nothing is read.
    /// - `NotFound` when no item exists for `id`.
    /// - `Conflict` when the stored version is not `expected_version`,
    ///   either on the read (no write attempted) or on the conditional write.
    pub fn update_item(
        &self,
        id: &str,
        spec: &UpsertItemSpec,
        expected_version: i64,
        modified_by: &str,
    ) -> ServiceResult<()> {
        let validated = if id.is_empty() {
            Err(SpecValidationError::EmptyId)
        } else {
            spec.validate()
        };
        if let Err(err) = validated {
            warn!("event=item_update module=service status=invalid reason={err}");
            return Err(err.into());
        }

        let current = match self.repo.find_by_id(id) {
            Ok(Some(item)) => item,
            Ok(None) => {
                info!("event=item_update module=service status=not_found item_id={id}");
                return Err(ItemServiceError::NotFound(id.to_string()));
            }
            Err(err) => {
                error!("event=item_update module=service status=error item_id={id} error={err}");
                return Err(err.into());
            }
        };

        if current.version != expected_version {
            info!(
                "event=item_update module=service status=conflict stage=read item_id={id} expected_version={expected_version} stored_version={}",
                current.version
            );
            return Err(conflict(id, expected_version));
        }

        let next = current.modify(spec, modified_by, now_epoch_ms());
        match self.repo.update(&next, expected_version) {
            Ok(()) => {
                info!(
                    "event=item_update module=service status=ok item_id={id} version={}",
                    next.version
                );
                Ok(())
            }
            Err(RepoError::ZeroAffected(_)) => {
                info!(
                    "event=item_update module=service status=conflict stage=write item_id={id} expected_version={expected_version}"
                );
                Err(conflict(id, expected_version))
            }
            Err(err) => {
                error!("event=item_update module=service status=error item_id={id} error={err}");
                Err(err.into())
            }
        }
    }
}

fn conflict(id: &str, expected_version: i64) -> ItemServiceError {
    ItemServiceError::Conflict {
        id: id.to_string(),
        expected_version,
    }
}
