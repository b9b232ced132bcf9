//! Sync engine services.
//!
//! # Responsibility
//! - Track confirmed document state and staged edits per surface.
//! - Turn local intent into minimal write batches and reconcile results.
//! - Orchestrate template storage for the host.

pub mod baseline;
pub mod edit_session;
pub mod parameter_session;
pub mod pending_changes;
pub mod surface;
pub mod template_service;
