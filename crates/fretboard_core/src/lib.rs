//! Core sync engine for the fretboard designer.
//! This crate is the single source of truth for document synchronization
//! invariants: parameter diffing, undo history and timeline suppression.

pub mod bridge;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod timeline;

pub use bridge::{BridgeClient, BridgeError, BridgeHost, InboundMessage, ModelState, OutboundMessage};
pub use config::{ConfigError, EngineConfig};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::parameter::{Parameter, UnitKind};
pub use model::schema::ParameterSchema;
pub use model::template::Template;
pub use model::timeline::{TimelineChange, TimelineItem, TimelineItemKind};
pub use repo::document_store::{DocumentStore, InMemoryDocumentStore, StoreError};
pub use repo::template_repo::{SqliteTemplateRepository, TemplateRepository};
pub use service::edit_session::{EditSession, ScaleMode};
pub use service::parameter_session::{DocumentMode, ParameterSession};
pub use service::surface::{Notice, SessionId, SurfaceSession};
pub use service::template_service::TemplateService;
pub use timeline::{CascadeEngine, NameMatch, TimelineError, TimelineSummary, TimelineTree};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
