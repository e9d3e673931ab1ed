//! Domain model for the versioned item aggregate.
//!
//! # Responsibility
//! - Define the `Item` aggregate and the transient `UpsertItemSpec` input.
//! - Keep construction and mutation rules next to the data they guard.
//!
//! # Invariants
//! - Every item is identified by an opaque `ItemId` assigned at creation.
//! - `version` starts at 1 and grows by exactly one per committed update.
//! - Items are never deleted by core.

pub mod item;
