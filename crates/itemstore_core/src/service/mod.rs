//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate validation, id minting and repository calls.
//! - Keep callers decoupled from the configured storage variant.

pub mod item_service;
