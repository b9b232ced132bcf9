//! Wire contract between the editing surface and the document host.
//!
//! Every message is an envelope `{"action": "<NAME>", "data": {...}}`.
//! Action names are stable and must not be renamed.

use super::BridgeError;
use crate::model::parameter::{Parameter, UnitKind};
use crate::model::template::Template;
use crate::model::timeline::{TimelineChange, TimelineItemKind};
use crate::service::parameter_session::DocumentMode;
use crate::timeline::{TimelineItemPayload, TimelineMatch, TimelineSummary};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const GET_MODEL_STATE: &str = "GET_MODEL_STATE";
pub const APPLY_PARAMS: &str = "APPLY_PARAMS";
pub const GET_TIMELINE_ITEMS: &str = "GET_TIMELINE_ITEMS";
pub const GET_TIMELINE_SUMMARY: &str = "GET_TIMELINE_SUMMARY";
pub const APPLY_TIMELINE_CHANGES: &str = "APPLY_TIMELINE_CHANGES";
pub const GET_TEMPLATES: &str = "GET_TEMPLATES";
pub const LOAD_TEMPLATE: &str = "LOAD_TEMPLATE";
pub const SAVE_TEMPLATE: &str = "SAVE_TEMPLATE";
pub const DELETE_TEMPLATE: &str = "DELETE_TEMPLATE";
pub const GET_ITEM_STATE: &str = "GET_ITEM_STATE";

pub const PUSH_MODEL_STATE: &str = "PUSH_MODEL_STATE";
pub const PUSH_TIMELINE_ITEMS: &str = "PUSH_TIMELINE_ITEMS";
pub const PUSH_TIMELINE_SUMMARY: &str = "PUSH_TIMELINE_SUMMARY";
pub const TIMELINE_OPERATION_RESULT: &str = "TIMELINE_OPERATION_RESULT";
pub const PUSH_TEMPLATES: &str = "PUSH_TEMPLATES";
pub const APPLY_PARAMS_RESULT: &str = "APPLY_PARAMS_RESULT";
pub const COMPUTING: &str = "COMPUTING";
pub const REQUEST_FAILED: &str = "REQUEST_FAILED";
pub const PUSH_ITEM_STATE: &str = "PUSH_ITEM_STATE";

/// Surface -> host requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "data")]
pub enum OutboundMessage {
    #[serde(rename = "GET_MODEL_STATE")]
    GetModelState {},
    /// `name -> expression`.
    #[serde(rename = "APPLY_PARAMS")]
    ApplyParams(BTreeMap<String, String>),
    #[serde(rename = "GET_TIMELINE_ITEMS")]
    GetTimelineItems {},
    #[serde(rename = "GET_TIMELINE_SUMMARY")]
    GetTimelineSummary {},
    #[serde(rename = "APPLY_TIMELINE_CHANGES")]
    ApplyTimelineChanges { changes: Vec<TimelineChange> },
    #[serde(rename = "GET_TEMPLATES")]
    GetTemplates {},
    #[serde(rename = "LOAD_TEMPLATE")]
    LoadTemplate {
        id: String,
        #[serde(default)]
        readonly: bool,
    },
    #[serde(rename = "SAVE_TEMPLATE", rename_all = "camelCase")]
    SaveTemplate {
        name: String,
        #[serde(default)]
        description: String,
        #[serde(default)]
        schema_version: Option<String>,
        #[serde(default)]
        parameters: BTreeMap<String, String>,
    },
    #[serde(rename = "DELETE_TEMPLATE")]
    DeleteTemplate { id: String },
    /// Exact-name lookup of one timeline item.
    #[serde(rename = "GET_ITEM_STATE")]
    GetItemState { name: String },
}

impl OutboundMessage {
    pub fn action(&self) -> &'static str {
        match self {
            Self::GetModelState {} => GET_MODEL_STATE,
            Self::ApplyParams(_) => APPLY_PARAMS,
            Self::GetTimelineItems {} => GET_TIMELINE_ITEMS,
            Self::GetTimelineSummary {} => GET_TIMELINE_SUMMARY,
            Self::ApplyTimelineChanges { .. } => APPLY_TIMELINE_CHANGES,
            Self::GetTemplates {} => GET_TEMPLATES,
            Self::LoadTemplate { .. } => LOAD_TEMPLATE,
            Self::SaveTemplate { .. } => SAVE_TEMPLATE,
            Self::DeleteTemplate { .. } => DELETE_TEMPLATE,
            Self::GetItemState { .. } => GET_ITEM_STATE,
        }
    }

    /// Writes to the document; at most one may be in flight per session.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Self::ApplyParams(_) | Self::ApplyTimelineChanges { .. }
        )
    }

    /// Inbound action that answers this request.
    pub fn response_action(&self) -> &'static str {
        match self {
            Self::GetModelState {} | Self::LoadTemplate { .. } => PUSH_MODEL_STATE,
            Self::ApplyParams(_) => APPLY_PARAMS_RESULT,
            Self::GetTimelineItems {} => PUSH_TIMELINE_ITEMS,
            Self::GetTimelineSummary {} => PUSH_TIMELINE_SUMMARY,
            Self::ApplyTimelineChanges { .. } => TIMELINE_OPERATION_RESULT,
            Self::GetTemplates {} | Self::SaveTemplate { .. } | Self::DeleteTemplate { .. } => {
                PUSH_TEMPLATES
            }
            Self::GetItemState { .. } => PUSH_ITEM_STATE,
        }
    }

    pub fn to_json(&self) -> Result<String, BridgeError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self, BridgeError> {
        decode_envelope(raw, OUTBOUND_ACTIONS)
    }
}

/// Host -> surface messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "data")]
pub enum InboundMessage {
    #[serde(rename = "PUSH_MODEL_STATE")]
    PushModelState(ModelState),
    #[serde(rename = "PUSH_TIMELINE_ITEMS")]
    PushTimelineItems { items: Vec<TimelineItemPayload> },
    #[serde(rename = "PUSH_TIMELINE_SUMMARY")]
    PushTimelineSummary(TimelineSummary),
    #[serde(rename = "TIMELINE_OPERATION_RESULT")]
    TimelineOperationResult(TimelineOperationResult),
    #[serde(rename = "PUSH_TEMPLATES", rename_all = "camelCase")]
    PushTemplates {
        presets: Vec<Template>,
        user_templates: Vec<Template>,
    },
    #[serde(rename = "APPLY_PARAMS_RESULT")]
    ApplyParamsResult(ApplyParamsResult),
    /// Host accepted a parameter batch and is recomputing.
    #[serde(rename = "COMPUTING")]
    Computing {},
    /// Host could not serve `action`.
    #[serde(rename = "REQUEST_FAILED")]
    RequestFailed { action: String, message: String },
    #[serde(rename = "PUSH_ITEM_STATE")]
    PushItemState(ItemState),
}

impl InboundMessage {
    pub fn action(&self) -> &'static str {
        match self {
            Self::PushModelState(_) => PUSH_MODEL_STATE,
            Self::PushTimelineItems { .. } => PUSH_TIMELINE_ITEMS,
            Self::PushTimelineSummary(_) => PUSH_TIMELINE_SUMMARY,
            Self::TimelineOperationResult(_) => TIMELINE_OPERATION_RESULT,
            Self::PushTemplates { .. } => PUSH_TEMPLATES,
            Self::ApplyParamsResult(_) => APPLY_PARAMS_RESULT,
            Self::Computing {} => COMPUTING,
            Self::RequestFailed { .. } => REQUEST_FAILED,
            Self::PushItemState(_) => PUSH_ITEM_STATE,
        }
    }

    pub fn to_json(&self) -> Result<String, BridgeError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self, BridgeError> {
        decode_envelope(raw, INBOUND_ACTIONS)
    }
}

/// `PUSH_MODEL_STATE` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelState {
    pub schema_version: String,
    pub template_version: String,
    pub groups: Vec<GroupPayload>,
    /// Editable schema fields absent from the document.
    #[serde(default)]
    pub missing: Vec<String>,
    /// Document fields the schema does not declare.
    #[serde(default)]
    pub extra: Vec<String>,
    #[serde(default)]
    pub extra_params: Vec<ParameterPayload>,
    pub mode: DocumentMode,
    #[serde(default)]
    pub fingerprint: Option<String>,
    #[serde(default)]
    pub has_fingerprint: bool,
    pub document_unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_name: Option<String>,
}

impl ModelState {
    /// Parameters in display order: groups by order key, then declared order.
    pub fn parameters(&self) -> Vec<Parameter> {
        let mut groups = self.groups.iter().collect::<Vec<_>>();
        groups.sort_by_key(|group| group.order);
        groups
            .into_iter()
            .flat_map(|group| {
                group
                    .parameters
                    .iter()
                    .map(move |parameter| parameter.to_parameter(&group.id))
            })
            .collect()
    }

    /// Schema default expression per field.
    pub fn defaults(&self) -> BTreeMap<String, String> {
        self.groups
            .iter()
            .flat_map(|group| group.parameters.iter())
            .map(|parameter| (parameter.name.clone(), parameter.default.clone()))
            .collect()
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterPayload> {
        self.groups
            .iter()
            .flat_map(|group| group.parameters.iter())
            .find(|parameter| parameter.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupPayload {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub order: i64,
    pub parameters: Vec<ParameterPayload>,
}

/// One field as shown by the surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterPayload {
    pub name: String,
    pub label: String,
    #[serde(default)]
    pub unit_kind: UnitKind,
    #[serde(default = "default_control_type")]
    pub control_type: String,
    #[serde(default)]
    pub default: String,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub step: Option<f64>,
    #[serde(default)]
    pub description: String,
    pub expression: String,
    #[serde(default)]
    pub value: Option<f64>,
    #[serde(default)]
    pub unit: String,
    #[serde(default = "default_editable")]
    pub editable: bool,
}

impl ParameterPayload {
    pub fn to_parameter(&self, group_id: &str) -> Parameter {
        Parameter {
            name: self.name.clone(),
            expression: self.expression.clone(),
            value: self.value,
            unit_kind: self.unit_kind,
            group_id: group_id.to_string(),
            editable: self.editable,
        }
    }
}

/// `APPLY_PARAMS_RESULT` payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyParamsResult {
    pub success: bool,
    pub message: String,
    pub updated: usize,
    /// Formula-driven or undeclared names that were ignored.
    #[serde(default)]
    pub protected: usize,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// `TIMELINE_OPERATION_RESULT` payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineOperationResult {
    pub success: bool,
    pub message: String,
    /// Target state when every change in the batch shares one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_state: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items_affected: Option<usize>,
    #[serde(default)]
    pub success_count: usize,
    /// Requested names that could not be applied.
    #[serde(default)]
    pub failed: Vec<String>,
    /// Children of an applied group change that refused the write.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub child_failures: Vec<String>,
}

/// `PUSH_ITEM_STATE` payload. `found` is false when no item carries the
/// requested name; the other fields are then absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemState {
    pub name: String,
    pub found: bool,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<TimelineItemKind>,
    #[serde(default)]
    pub suppressed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    /// Enclosing group of a nested feature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_size: Option<usize>,
}

impl ItemState {
    pub fn from_lookup(name: &str, item: Option<TimelineMatch>) -> Self {
        match item {
            None => Self {
                name: name.to_string(),
                ..Self::default()
            },
            Some(item) => Self {
                group_size: (item.kind == TimelineItemKind::Group).then_some(item.child_count),
                name: item.name,
                found: true,
                kind: Some(item.kind),
                suppressed: item.suppressed,
                index: Some(item.index),
                parent: item.parent,
            },
        }
    }
}

const OUTBOUND_ACTIONS: &[&str] = &[
    GET_MODEL_STATE,
    APPLY_PARAMS,
    GET_TIMELINE_ITEMS,
    GET_TIMELINE_SUMMARY,
    APPLY_TIMELINE_CHANGES,
    GET_TEMPLATES,
    LOAD_TEMPLATE,
    SAVE_TEMPLATE,
    DELETE_TEMPLATE,
    GET_ITEM_STATE,
];

const INBOUND_ACTIONS: &[&str] = &[
    PUSH_MODEL_STATE,
    PUSH_TIMELINE_ITEMS,
    PUSH_TIMELINE_SUMMARY,
    TIMELINE_OPERATION_RESULT,
    PUSH_TEMPLATES,
    APPLY_PARAMS_RESULT,
    COMPUTING,
    REQUEST_FAILED,
    PUSH_ITEM_STATE,
];

/// Decodes an envelope, tolerating a missing or `null` `data` field.
fn decode_envelope<T: serde::de::DeserializeOwned>(
    raw: &str,
    known: &[&str],
) -> Result<T, BridgeError> {
    let mut envelope: Map<String, Value> = serde_json::from_str(raw)?;
    let action = match envelope.get("action") {
        Some(Value::String(action)) => action.clone(),
        _ => return Err(BridgeError::MissingAction),
    };
    if !known.contains(&action.as_str()) {
        return Err(BridgeError::UnknownAction(action));
    }
    match envelope.get("data") {
        None | Some(Value::Null) => {
            envelope.insert("data".to_string(), Value::Object(Map::new()));
        }
        Some(_) => {}
    }
    Ok(serde_json::from_value(Value::Object(envelope))?)
}

fn default_control_type() -> String {
    "number".to_string()
}

fn default_editable() -> bool {
    true
}
