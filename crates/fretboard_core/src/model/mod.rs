//! Domain model for parametric design synchronization.
//!
//! # Responsibility
//! - Define canonical shapes for parameters, timeline items, schema and
//!   templates shared by every engine component.
//!
//! # Invariants
//! - Parameter and timeline item names are unique within one snapshot.
//! - Timeline trees are two-level: groups contain features only.

pub mod parameter;
pub mod schema;
pub mod template;
pub mod timeline;
