//! Storage contracts and implementations.
//!
//! # Responsibility
//! - Define the authoritative document store the engine writes through.
//! - Persist parameter templates in SQLite.
//!
//! # Invariants
//! - Template writes enforce `Template::validate()` before persistence.
//! - Repository APIs return semantic errors (`NotFound`) in addition to
//!   transport errors.

pub mod document_store;
pub mod template_repo;
