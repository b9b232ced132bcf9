//! Construction-history (timeline) domain model.
//!
//! # Responsibility
//! - Define the flat enumeration row reported by a document store.
//! - Define the two-level `Feature | Group` tree shape used by the engine.
//!
//! # Invariants
//! - A `Group` only ever contains `Feature` children (two-level tree).
//! - `index` is the store's rollup index; it is never rewritten by the engine.

use serde::{Deserialize, Serialize};

/// Type tag of a timeline item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TimelineItemKind {
    Feature,
    Group,
}

impl TimelineItemKind {
    /// Stable wire tag.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Feature => "Feature",
            Self::Group => "Group",
        }
    }

    /// Parses a wire tag; unknown tags yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Feature" => Some(Self::Feature),
            "Group" => Some(Self::Group),
            _ => None,
        }
    }
}

/// One row of the store's flat timeline enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub name: String,
    pub kind: TimelineItemKind,
    pub suppressed: bool,
    pub index: u32,
    /// Owning group name; only meaningful for features.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

impl TimelineEntry {
    pub fn feature(name: impl Into<String>, index: u32, suppressed: bool) -> Self {
        Self {
            name: name.into(),
            kind: TimelineItemKind::Feature,
            suppressed,
            index,
            parent: None,
        }
    }

    pub fn group(name: impl Into<String>, index: u32, suppressed: bool) -> Self {
        Self {
            name: name.into(),
            kind: TimelineItemKind::Group,
            suppressed,
            index,
            parent: None,
        }
    }

    /// Places this entry inside `group`.
    pub fn in_group(mut self, group: impl Into<String>) -> Self {
        self.parent = Some(group.into());
        self
    }
}

/// A single construction feature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feature {
    pub name: String,
    pub suppressed: bool,
    pub index: u32,
    pub parent: Option<String>,
}

/// A named group of features, children kept in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub name: String,
    pub suppressed: bool,
    pub index: u32,
    pub children: Vec<Feature>,
}

/// Top-level timeline item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimelineItem {
    Feature(Feature),
    Group(Group),
}

impl TimelineItem {
    pub fn name(&self) -> &str {
        match self {
            Self::Feature(feature) => &feature.name,
            Self::Group(group) => &group.name,
        }
    }

    pub fn kind(&self) -> TimelineItemKind {
        match self {
            Self::Feature(_) => TimelineItemKind::Feature,
            Self::Group(_) => TimelineItemKind::Group,
        }
    }

    pub fn suppressed(&self) -> bool {
        match self {
            Self::Feature(feature) => feature.suppressed,
            Self::Group(group) => group.suppressed,
        }
    }

    pub fn index(&self) -> u32 {
        match self {
            Self::Feature(feature) => feature.index,
            Self::Group(group) => group.index,
        }
    }

    /// Children of a group; empty for features.
    pub fn children(&self) -> &[Feature] {
        match self {
            Self::Feature(_) => &[],
            Self::Group(group) => &group.children,
        }
    }
}

/// Key used for local suppression overrides (`type:name`).
pub fn override_key(kind: TimelineItemKind, name: &str) -> String {
    format!("{}:{name}", kind.as_str())
}

/// One requested suppression change, as carried by `APPLY_TIMELINE_CHANGES`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineChange {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: TimelineItemKind,
    pub suppressed: bool,
}
