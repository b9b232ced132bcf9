//! Wire shape of timeline items.
//!
//! `{name, type: "Feature"|"Group", suppressed, index, children?}`; the
//! `type` tag is carried as a plain string so unknown tags surface as a
//! typed [`DecodeError`] instead of a generic JSON failure.

use crate::model::timeline::{Feature, Group, TimelineItem, TimelineItemKind};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors decoding store payloads into the tagged model.
#[derive(Debug)]
pub enum DecodeError {
    Json(serde_json::Error),
    UnknownItemType { name: String, tag: String },
    NestedGroup { group: String, parent: String },
    /// A feature payload carried a `children` list.
    FeatureWithChildren(String),
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json(err) => write!(f, "malformed payload: {err}"),
            Self::UnknownItemType { name, tag } => {
                write!(f, "timeline item `{name}` has unknown type `{tag}`")
            }
            Self::NestedGroup { group, parent } => {
                write!(f, "group `{group}` is nested in group `{parent}`")
            }
            Self::FeatureWithChildren(name) => {
                write!(f, "feature `{name}` must not carry children")
            }
        }
    }
}

impl Error for DecodeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for DecodeError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

/// Loosely-typed item as it crosses the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineItemPayload {
    pub name: String,
    #[serde(rename = "type")]
    pub item_type: String,
    pub suppressed: bool,
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<TimelineItemPayload>>,
}

impl From<&Feature> for TimelineItemPayload {
    fn from(feature: &Feature) -> Self {
        Self {
            name: feature.name.clone(),
            item_type: TimelineItemKind::Feature.as_str().to_string(),
            suppressed: feature.suppressed,
            index: feature.index,
            children: None,
        }
    }
}

impl From<&TimelineItem> for TimelineItemPayload {
    fn from(item: &TimelineItem) -> Self {
        match item {
            TimelineItem::Feature(feature) => feature.into(),
            TimelineItem::Group(group) => Self {
                name: group.name.clone(),
                item_type: TimelineItemKind::Group.as_str().to_string(),
                suppressed: group.suppressed,
                index: group.index,
                children: Some(group.children.iter().map(Self::from).collect()),
            },
        }
    }
}

impl TryFrom<TimelineItemPayload> for TimelineItem {
    type Error = DecodeError;

    fn try_from(payload: TimelineItemPayload) -> Result<Self, Self::Error> {
        match parse_kind(&payload)? {
            TimelineItemKind::Feature => {
                if payload.children.as_ref().is_some_and(|children| !children.is_empty()) {
                    return Err(DecodeError::FeatureWithChildren(payload.name));
                }
                Ok(Self::Feature(Feature {
                    name: payload.name,
                    suppressed: payload.suppressed,
                    index: payload.index,
                    parent: None,
                }))
            }
            TimelineItemKind::Group => {
                let mut children = Vec::new();
                for child in payload.children.unwrap_or_default() {
                    match parse_kind(&child)? {
                        TimelineItemKind::Group => {
                            return Err(DecodeError::NestedGroup {
                                group: child.name,
                                parent: payload.name,
                            });
                        }
                        TimelineItemKind::Feature => children.push(Feature {
                            name: child.name,
                            suppressed: child.suppressed,
                            index: child.index,
                            parent: Some(payload.name.clone()),
                        }),
                    }
                }
                Ok(Self::Group(Group {
                    name: payload.name,
                    suppressed: payload.suppressed,
                    index: payload.index,
                    children,
                }))
            }
        }
    }
}

/// Encodes items for `PUSH_TIMELINE_ITEMS`.
pub fn encode_items(items: &[TimelineItem]) -> Vec<TimelineItemPayload> {
    items.iter().map(TimelineItemPayload::from).collect()
}

/// Decodes a list of wire items, failing on the first bad entry.
pub fn decode_items(payloads: Vec<TimelineItemPayload>) -> Result<Vec<TimelineItem>, DecodeError> {
    payloads.into_iter().map(TimelineItem::try_from).collect()
}

fn parse_kind(payload: &TimelineItemPayload) -> Result<TimelineItemKind, DecodeError> {
    TimelineItemKind::parse(&payload.item_type).ok_or_else(|| DecodeError::UnknownItemType {
        name: payload.name.clone(),
        tag: payload.item_type.clone(),
    })
}
