//! Item aggregate and upsert input contract.
//!
//! # Responsibility
//! - Build new items (`Item::new`) and next snapshots (`Item::modify`).
//! - Validate `UpsertItemSpec` before any id is minted or storage is touched.
//!
//! # Invariants
//! - `id`, `created_at` and `created_by` never change after creation.
//! - `modify` always yields `version + 1`; it never mutates in place.
//! - Tags keep caller order and duplicates.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, UNIX_EPOCH};

/// Minimum number of characters accepted for `description`.
pub const DESCRIPTION_MIN_CHARS: usize = 3;

/// Opaque item identifier. Format depends on the storage backend.
pub type ItemId = String;

/// Validation failure for upsert input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecValidationError {
    /// `name` is empty.
    EmptyName,
    /// `description` is empty.
    EmptyDescription,
    /// `description` is shorter than `min` characters.
    DescriptionTooShort { min: usize, actual: usize },
    /// Update target id is empty.
    EmptyId,
}

impl Display for SpecValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyName => write!(f, "name must not be empty"),
            Self::EmptyDescription => write!(f, "description must not be empty"),
            Self::DescriptionTooShort { min, actual } => write!(
                f,
                "description must be at least {min} characters, got {actual}"
            ),
            Self::EmptyId => write!(f, "item id must not be empty"),
        }
    }
}

impl Error for SpecValidationError {}

/// Caller input shared by create and update.
///
/// Never carries id, version or audit fields. `tags` has no `serde(default)`,
/// so a payload without a tag array is rejected at deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertItemSpec {
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
}

impl UpsertItemSpec {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        tags: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            tags,
        }
    }

    /// Checks the upsert contract. Pure; no side effects.
    pub fn validate(&self) -> Result<(), SpecValidationError> {
        validate_fields(&self.name, &self.description)
    }
}

/// Versioned item aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    /// Unix epoch milliseconds.
    pub created_at: i64,
    pub created_by: String,
    /// Unix epoch milliseconds.
    pub modified_at: i64,
    pub modified_by: String,
    /// Optimistic-concurrency token.
    pub version: i64,
}

impl Item {
    /// Builds a freshly created item at version 1.
    ///
    /// # Invariants
    /// - `modified_at == created_at` and `modified_by == created_by`.
    pub fn new(id: ItemId, spec: &UpsertItemSpec, creator: &str, created_at: i64) -> Self {
        Self {
            id,
            name: spec.name.clone(),
            description: spec.description.clone(),
            tags: spec.tags.clone(),
            created_at,
            created_by: creator.to_string(),
            modified_at: created_at,
            modified_by: creator.to_string(),
            version: 1,
        }
    }

    /// Builds the next snapshot from this one.
    ///
    /// Content fields are replaced from `spec`; identity and creation audit
    /// fields are carried over; `version` advances by one.
    pub fn modify(&self, spec: &UpsertItemSpec, updater: &str, modified_at: i64) -> Self {
        Self {
            id: self.id.clone(),
            name: spec.name.clone(),
            description: spec.description.clone(),
            tags: spec.tags.clone(),
            created_at: self.created_at,
            created_by: self.created_by.clone(),
            modified_at,
            modified_by: updater.to_string(),
            version: self.version + 1,
        }
    }

    /// Validates entity-level rules enforced by repositories before writes.
    pub fn validate(&self) -> Result<(), SpecValidationError> {
        if self.id.is_empty() {
            return Err(SpecValidationError::EmptyId);
        }
        validate_fields(&self.name, &self.description)
    }
}

/// Current wall-clock time in Unix epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

fn validate_fields(name: &str, description: &str) -> Result<(), SpecValidationError> {
    if name.is_empty() {
        return Err(SpecValidationError::EmptyName);
    }
    if description.is_empty() {
        return Err(SpecValidationError::EmptyDescription);
    }
    let actual = description.chars().count();
    if actual < DESCRIPTION_MIN_CHARS {
        return Err(SpecValidationError::DescriptionTooShort {
            min: DESCRIPTION_MIN_CHARS,
            actual,
        });
    }
    Ok(())
}
