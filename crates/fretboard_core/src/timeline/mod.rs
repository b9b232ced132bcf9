//! Construction-history tree and suppression cascade.
//!
//! # Responsibility
//! - Build the two-level `Feature | Group` tree from a store enumeration.
//! - Resolve names and patterns against that tree.
//! - Decode/encode the wire item shape.
//!
//! # Invariants
//! - Every fallible operation returns a typed [`TimelineError`].
//! - Engine code never reorders items; document order is the index order.

pub mod cascade;
pub mod codec;
pub mod tree;

use crate::model::timeline::TimelineItemKind;
use crate::repo::document_store::StoreError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub use cascade::{CascadeEngine, CascadeReport, ChangeBatchReport, ItemFailure, NameMatch};
pub use codec::{DecodeError, TimelineItemPayload};
pub use tree::{TimelineMatch, TimelineSummary, TimelineTree};

pub type TimelineResult<T> = Result<T, TimelineError>;

/// Errors for timeline resolution, tree building and cascades.
#[derive(Debug, Clone, PartialEq)]
pub enum TimelineError {
    /// Name resolved to zero items.
    NotFound(String),
    /// Non-exact resolution yielded more than one candidate.
    Ambiguous {
        query: String,
        candidates: Vec<String>,
    },
    /// Group-only operation targeted a feature.
    NotAGroup(String),
    InvalidPattern {
        pattern: String,
        message: String,
    },
    /// Some batch members failed; the rest were applied.
    PartialBatchFailure {
        affected: usize,
        failures: Vec<ItemFailure>,
    },
    DuplicateName(String),
    UnknownParent {
        item: String,
        parent: String,
    },
    ParentNotAGroup {
        item: String,
        parent: String,
    },
    NestedGroup {
        group: String,
        parent: String,
    },
    NonIncreasingIndex {
        item: String,
        index: u32,
        previous: u32,
    },
    Store(StoreError),
}

impl Display for TimelineError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(name) => write!(f, "timeline item not found: {name}"),
            Self::Ambiguous { query, candidates } => write!(
                f,
                "`{query}` matches {} items: {}",
                candidates.len(),
                candidates.join(", ")
            ),
            Self::NotAGroup(name) => write!(f, "`{name}` is a feature, not a group"),
            Self::InvalidPattern { pattern, message } => {
                write!(f, "invalid pattern `{pattern}`: {message}")
            }
            Self::PartialBatchFailure { affected, failures } => write!(
                f,
                "applied {affected} change(s), {} failed",
                failures.len()
            ),
            Self::DuplicateName(name) => write!(f, "duplicate timeline name: {name}"),
            Self::UnknownParent { item, parent } => {
                write!(f, "`{item}` references unknown group `{parent}`")
            }
            Self::ParentNotAGroup { item, parent } => {
                write!(f, "`{item}` declares feature `{parent}` as its group")
            }
            Self::NestedGroup { group, parent } => {
                write!(f, "group `{group}` is nested in group `{parent}`")
            }
            Self::NonIncreasingIndex {
                item,
                index,
                previous,
            } => write!(
                f,
                "`{item}` has index {index}, not after previous index {previous}"
            ),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for TimelineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for TimelineError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl TimelineError {
    /// Stable short code used in wire results and logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Ambiguous { .. } => "ambiguous",
            Self::NotAGroup(_) => "not_a_group",
            Self::InvalidPattern { .. } => "invalid_pattern",
            Self::PartialBatchFailure { .. } => "partial_batch_failure",
            Self::DuplicateName(_)
            | Self::UnknownParent { .. }
            | Self::ParentNotAGroup { .. }
            | Self::NestedGroup { .. }
            | Self::NonIncreasingIndex { .. } => "invalid_timeline",
            Self::Store(_) => "store_error",
        }
    }
}

/// Verb used in log lines and result messages.
pub(crate) fn verb(suppressed: bool) -> &'static str {
    if suppressed {
        "suppress"
    } else {
        "unsuppress"
    }
}

/// Lowercase kind label used in result messages.
pub(crate) fn kind_label(kind: TimelineItemKind) -> &'static str {
    match kind {
        TimelineItemKind::Feature => "feature",
        TimelineItemKind::Group => "group",
    }
}
