//! Host-side request dispatcher.
//!
//! Serves [`OutboundMessage`] requests against a [`DocumentStore`], the
//! parameter schema and (optionally) SQLite template storage. Failures never
//! escape as `Err`: each becomes a `REQUEST_FAILED` or a failed result so
//! the surface always receives exactly one answer.

use super::messages::{
    ApplyParamsResult, GroupPayload, InboundMessage, ItemState, ModelState, OutboundMessage,
    ParameterPayload, TimelineOperationResult,
};
use super::{BridgeError, BridgeResult};
use crate::config::EngineConfig;
use crate::logging::sanitize_message;
use crate::model::parameter::leading_numeric_token;
use crate::model::schema::{ParameterSchema, SchemaParameter};
use crate::model::template::Template;
use crate::model::timeline::TimelineChange;
use crate::repo::document_store::{DocumentStore, StoredParameter, StoreError};
use crate::repo::template_repo::SqliteTemplateRepository;
use crate::service::parameter_session::DocumentMode;
use crate::service::template_service::{TemplateList, TemplateService};
use crate::timeline::codec::encode_items;
use crate::timeline::{CascadeEngine, TimelineTree};
use log::{error, info, warn};
use rusqlite::Connection;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

const MAX_LOGGED_MESSAGE_CHARS: usize = 200;

/// Document host serving one store.
pub struct BridgeHost<S: DocumentStore> {
    store: S,
    schema: ParameterSchema,
    config: EngineConfig,
    templates: Option<Connection>,
}

impl<S: DocumentStore> BridgeHost<S> {
    pub fn new(store: S, schema: ParameterSchema, config: EngineConfig) -> Self {
        Self {
            store,
            schema,
            config,
            templates: None,
        }
    }

    /// Enables template requests over a migrated connection.
    pub fn with_templates(mut self, conn: Connection) -> Self {
        self.templates = Some(conn);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Decodes one envelope and serves it.
    pub fn handle_json(&mut self, raw: &str) -> Vec<InboundMessage> {
        match OutboundMessage::from_json(raw) {
            Ok(message) => self.handle(message),
            Err(err) => {
                warn!(
                    "event=host_decode module=bridge status=error error={}",
                    sanitize_message(&err.to_string(), MAX_LOGGED_MESSAGE_CHARS)
                );
                vec![InboundMessage::RequestFailed {
                    action: action_of(raw),
                    message: err.to_string(),
                }]
            }
        }
    }

    /// Serves one request; the returned messages are sent in order.
    pub fn handle(&mut self, message: OutboundMessage) -> Vec<InboundMessage> {
        let action = message.action();
        let outcome = match message {
            OutboundMessage::GetModelState {} => self.model_state().map(|state| {
                vec![InboundMessage::PushModelState(state)]
            }),
            OutboundMessage::ApplyParams(values) => Ok(self.apply_params(&values)),
            OutboundMessage::GetTimelineItems {} => self.tree().map(|tree| {
                vec![InboundMessage::PushTimelineItems {
                    items: encode_items(tree.items()),
                }]
            }),
            OutboundMessage::GetTimelineSummary {} => self
                .tree()
                .map(|tree| vec![InboundMessage::PushTimelineSummary(tree.summarize())]),
            OutboundMessage::ApplyTimelineChanges { changes } => {
                Ok(vec![InboundMessage::TimelineOperationResult(
                    self.apply_timeline_changes(&changes),
                )])
            }
            OutboundMessage::GetTemplates {} => self.push_templates(|_| Ok(())),
            OutboundMessage::LoadTemplate { id, readonly } => self.load_template(&id, readonly),
            OutboundMessage::SaveTemplate {
                name,
                description,
                schema_version,
                parameters,
            } => {
                let parameters = if parameters.is_empty() {
                    self.current_editable_values()
                } else {
                    Ok(parameters)
                };
                let schema_version =
                    schema_version.unwrap_or_else(|| self.schema.schema_version.clone());
                match parameters {
                    Ok(parameters) => self.push_templates(|service| {
                        service
                            .save(&name, &description, &schema_version, parameters)
                            .map(|_| ())
                            .map_err(|err| err.to_string())
                    }),
                    Err(err) => Err(err.to_string()),
                }
            }
            OutboundMessage::DeleteTemplate { id } => self.push_templates(|service| {
                service.delete(&id).map_err(|err| err.to_string())
            }),
            OutboundMessage::GetItemState { name } => self.tree().map(|tree| {
                vec![InboundMessage::PushItemState(ItemState::from_lookup(
                    &name,
                    tree.get(&name),
                ))]
            }),
        };

        match outcome {
            Ok(messages) => messages,
            Err(message) => {
                error!(
                    "event=host_request module=bridge status=error action={} error={}",
                    action,
                    sanitize_message(&message, MAX_LOGGED_MESSAGE_CHARS)
                );
                vec![InboundMessage::RequestFailed {
                    action: action.to_string(),
                    message,
                }]
            }
        }
    }

    /// Live state when the document carries a fingerprint, initial otherwise.
    pub fn model_state(&self) -> Result<ModelState, String> {
        let fingerprint = self
            .store
            .fingerprint(&self.config.fingerprint.parameter_name)
            .map_err(|err| err.to_string())?;
        match fingerprint {
            Some(fingerprint) => self.live_state(fingerprint).map_err(|err| err.to_string()),
            None => Ok(self.schema_state(DocumentMode::Initial, &BTreeMap::new(), None)),
        }
    }

    fn live_state(&self, fingerprint: String) -> BridgeResult<ModelState> {
        let stored = self.store.user_parameters()?;
        let by_name = stored
            .iter()
            .map(|parameter| (parameter.name.as_str(), parameter))
            .collect::<BTreeMap<_, _>>();

        let mut missing = Vec::new();
        let groups = self
            .schema
            .sorted_groups()
            .into_iter()
            .map(|group| GroupPayload {
                id: group.id.clone(),
                label: group.label.clone(),
                order: group.order,
                parameters: group
                    .parameters
                    .iter()
                    .filter(|parameter| parameter.editable)
                    .filter_map(|parameter| match by_name.get(parameter.name.as_str()) {
                        Some(live) => Some(payload_from_live(parameter, live)),
                        None => {
                            missing.push(parameter.name.clone());
                            None
                        }
                    })
                    .collect(),
            })
            .collect::<Vec<_>>();

        let declared = self.schema.all_names();
        let extra_params = stored
            .iter()
            .filter(|parameter| {
                !declared.contains(parameter.name.as_str())
                    && parameter.name != self.config.fingerprint.parameter_name
            })
            .map(extra_payload)
            .collect::<Vec<_>>();

        info!(
            "event=model_state module=bridge status=ok mode=live params={} missing={} extra={}",
            groups.iter().map(|group| group.parameters.len()).sum::<usize>(),
            missing.len(),
            extra_params.len()
        );

        Ok(ModelState {
            schema_version: self.schema.schema_version.clone(),
            template_version: self.schema.template_version.clone(),
            groups,
            missing,
            extra: extra_params.iter().map(|p| p.name.clone()).collect(),
            extra_params,
            mode: DocumentMode::Live,
            fingerprint: Some(fingerprint),
            has_fingerprint: true,
            document_unit: self.store.document_unit(),
            template_name: None,
        })
    }

    /// Editable schema fields with defaults overlaid by `values`.
    fn schema_state(
        &self,
        mode: DocumentMode,
        values: &BTreeMap<String, String>,
        template_name: Option<String>,
    ) -> ModelState {
        let document_unit = self.store.document_unit();
        let groups = self
            .schema
            .sorted_groups()
            .into_iter()
            .map(|group| GroupPayload {
                id: group.id.clone(),
                label: group.label.clone(),
                order: group.order,
                parameters: group
                    .parameters
                    .iter()
                    .filter(|parameter| parameter.editable)
                    .map(|parameter| {
                        let expression = values
                            .get(&parameter.name)
                            .cloned()
                            .unwrap_or_else(|| parameter.default.clone());
                        let unit = match mode {
                            DocumentMode::Template => parameter
                                .unit_kind
                                .suffix(&document_unit, &self.config.angle_unit)
                                .unwrap_or_default()
                                .to_string(),
                            _ => String::new(),
                        };
                        let mut payload = payload_from_schema(parameter, expression);
                        payload.unit = unit;
                        payload
                    })
                    .collect(),
            })
            .collect();

        ModelState {
            schema_version: self.schema.schema_version.clone(),
            template_version: self.schema.template_version.clone(),
            groups,
            missing: Vec::new(),
            extra: Vec::new(),
            extra_params: Vec::new(),
            mode,
            fingerprint: None,
            has_fingerprint: false,
            document_unit,
            template_name,
        }
    }

    fn apply_params(&mut self, values: &BTreeMap<String, String>) -> Vec<InboundMessage> {
        let result = self.write_params(values);
        let mut messages = vec![
            InboundMessage::Computing {},
            InboundMessage::ApplyParamsResult(result),
        ];
        match self.model_state() {
            Ok(state) => messages.push(InboundMessage::PushModelState(state)),
            Err(err) => warn!(
                "event=model_state module=bridge status=error after=apply error={}",
                sanitize_message(&err, MAX_LOGGED_MESSAGE_CHARS)
            ),
        }
        messages
    }

    fn write_params(&mut self, values: &BTreeMap<String, String>) -> ApplyParamsResult {
        let fingerprint_name = self.config.fingerprint.parameter_name.clone();
        let mut errors = Vec::new();
        if !values.is_empty() {
            let has_fingerprint = matches!(self.store.fingerprint(&fingerprint_name), Ok(Some(_)));
            if !has_fingerprint {
                if let Err(err) = self
                    .store
                    .set_fingerprint(&fingerprint_name, &self.config.fingerprint.value)
                {
                    errors.push(format!("Failed to add fingerprint: {err}"));
                }
            }
        }

        let editable = self.schema.editable_names();
        let current = match self.store.user_parameters() {
            Ok(parameters) => parameters
                .into_iter()
                .map(|parameter| (parameter.name, parameter.expression))
                .collect::<BTreeMap<_, _>>(),
            Err(err) => {
                errors.push(err.to_string());
                BTreeMap::new()
            }
        };

        let mut updated = 0;
        let mut protected = 0;
        for (name, expression) in values {
            let expression = expression.trim();
            if expression.is_empty() {
                continue;
            }
            if !editable.contains(name.as_str()) {
                protected += 1;
                warn!(
                    "event=params_write module=bridge status=protected name={}",
                    name
                );
                continue;
            }
            match current.get(name) {
                None => {
                    errors.push(StoreError::ParameterNotFound(name.clone()).to_string());
                    continue;
                }
                Some(existing) if existing == expression => continue,
                Some(_) => {}
            }
            match self.store.set_parameter_expression(name, expression) {
                Ok(()) => updated += 1,
                Err(err) => errors.push(format!("Failed to set {name} = \"{expression}\": {err}")),
            }
        }

        info!(
            "event=params_write module=bridge status={} updated={} protected={} errors={}",
            if errors.is_empty() { "ok" } else { "error" },
            updated,
            protected,
            errors.len()
        );
        ApplyParamsResult {
            success: errors.is_empty(),
            message: if errors.is_empty() {
                format!("Applied {updated} parameter(s)")
            } else {
                format!("Applied {updated} parameter(s), {} error(s)", errors.len())
            },
            updated,
            protected,
            errors,
        }
    }

    fn apply_timeline_changes(&mut self, changes: &[TimelineChange]) -> TimelineOperationResult {
        let batch = CascadeEngine::new(&mut self.store).apply_changes(changes);
        let failed = batch
            .failed
            .iter()
            .map(|failure| failure.name.clone())
            .collect::<Vec<_>>();
        let child_failures = batch
            .child_failures
            .iter()
            .map(|failure| failure.name.clone())
            .collect::<Vec<_>>();
        let targets = changes
            .iter()
            .map(|change| change.suppressed)
            .collect::<BTreeSet<_>>();
        let success_count = batch.applied.len();

        let mut message = format!("Applied {success_count} change(s)");
        if !failed.is_empty() {
            message.push_str(&format!(" ({} failed)", failed.len()));
        }
        if !child_failures.is_empty() {
            message.push_str(&format!(
                "; {} grouped item(s) not updated",
                child_failures.len()
            ));
        }

        TimelineOperationResult {
            success: failed.is_empty(),
            message,
            new_state: if targets.len() == 1 {
                targets.into_iter().next()
            } else {
                None
            },
            items_affected: Some(batch.affected.len()),
            success_count,
            failed,
            child_failures,
        }
    }

    fn tree(&self) -> Result<TimelineTree, String> {
        TimelineTree::load(&self.store).map_err(|err| err.to_string())
    }

    fn load_template(&self, id: &str, readonly: bool) -> Result<Vec<InboundMessage>, String> {
        let template = self.with_template_service(|service| {
            service.load(id, readonly).map_err(|err| err.to_string())
        })?;
        info!(
            "event=template_load module=bridge status=ok id={} params={}",
            template.id,
            template.parameters.len()
        );
        Ok(vec![InboundMessage::PushModelState(self.template_state(
            &template,
        ))])
    }

    fn template_state(&self, template: &Template) -> ModelState {
        self.schema_state(
            DocumentMode::Template,
            &template.parameters,
            Some(template.name.clone()),
        )
    }

    /// Runs `action` and answers with the refreshed template list.
    fn push_templates(
        &self,
        action: impl FnOnce(&TemplateService<SqliteTemplateRepository<'_>>) -> Result<(), String>,
    ) -> Result<Vec<InboundMessage>, String> {
        let list = self.with_template_service(|service| {
            action(service)?;
            service.list().map_err(|err| err.to_string())
        })?;
        let TemplateList {
            presets,
            user_templates,
        } = list;
        Ok(vec![InboundMessage::PushTemplates {
            presets,
            user_templates,
        }])
    }

    fn with_template_service<T>(
        &self,
        action: impl FnOnce(&TemplateService<SqliteTemplateRepository<'_>>) -> Result<T, String>,
    ) -> Result<T, String> {
        let conn = self
            .templates
            .as_ref()
            .ok_or_else(|| "template storage is not configured".to_string())?;
        let repo = SqliteTemplateRepository::try_new(conn).map_err(|err| err.to_string())?;
        action(&TemplateService::new(repo))
    }

    /// Editable schema parameters present in the document, `name -> expression`.
    fn current_editable_values(&self) -> Result<BTreeMap<String, String>, BridgeError> {
        let editable = self.schema.editable_names();
        Ok(self
            .store
            .user_parameters()?
            .into_iter()
            .filter(|parameter| editable.contains(parameter.name.as_str()))
            .map(|parameter| (parameter.name, parameter.expression))
            .collect())
    }
}

fn payload_from_schema(parameter: &SchemaParameter, expression: String) -> ParameterPayload {
    ParameterPayload {
        name: parameter.name.clone(),
        label: parameter.display_label().to_string(),
        unit_kind: parameter.unit_kind,
        control_type: parameter.control_type.clone(),
        default: parameter.default.clone(),
        min: parameter.min,
        max: parameter.max,
        step: parameter.step,
        description: parameter.description.clone(),
        value: numeric_value(&expression),
        expression,
        unit: String::new(),
        editable: parameter.editable,
    }
}

fn payload_from_live(parameter: &SchemaParameter, live: &StoredParameter) -> ParameterPayload {
    let mut payload = payload_from_schema(parameter, live.expression.clone());
    payload.value = live.value;
    payload.unit = live.unit.clone();
    payload
}

fn extra_payload(parameter: &StoredParameter) -> ParameterPayload {
    ParameterPayload {
        name: parameter.name.clone(),
        label: parameter.name.clone(),
        unit_kind: crate::model::parameter::UnitKind::Unitless,
        control_type: "number".to_string(),
        default: String::new(),
        min: None,
        max: None,
        step: None,
        description: parameter.comment.clone(),
        expression: parameter.expression.clone(),
        value: parameter.value,
        unit: parameter.unit.clone(),
        editable: false,
    }
}

/// Numeric value of an expression that is exactly a number.
fn numeric_value(expression: &str) -> Option<f64> {
    let trimmed = expression.trim();
    leading_numeric_token(trimmed)
        .filter(|token| *token == trimmed)
        .and_then(|token| token.parse().ok())
}

/// Best-effort action name of an undecodable envelope.
fn action_of(raw: &str) -> String {
    serde_json::from_str::<Value>(raw)
        .ok()
        .and_then(|value| value.get("action").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::BridgeHost;
    use crate::bridge::messages::{InboundMessage, OutboundMessage};
    use crate::config::EngineConfig;
    use crate::db::open_db_in_memory;
    use crate::model::schema::ParameterSchema;
    use crate::model::timeline::{TimelineChange, TimelineEntry, TimelineItemKind};
    use crate::repo::document_store::{DocumentStore, InMemoryDocumentStore};
    use crate::service::parameter_session::DocumentMode;
    use std::collections::BTreeMap;

    const SCHEMA: &str = r#"{
        "schemaVersion": "0.3.0",
        "templateVersion": "7",
        "groups": [
            {"id": "neck", "label": "Neck", "order": 1, "parameters": [
                {"name": "FretCount", "unitKind": "unitless", "default": "22"},
                {"name": "ScaleLengthBass", "default": "25.5"},
                {"name": "FretSpacing", "default": "ScaleLengthBass / 17.817", "editable": false}
            ]}
        ]
    }"#;

    fn host(store: InMemoryDocumentStore) -> BridgeHost<InMemoryDocumentStore> {
        let schema = ParameterSchema::from_json(SCHEMA).expect("schema");
        BridgeHost::new(store, schema, EngineConfig::default())
    }

    fn live_store() -> InMemoryDocumentStore {
        InMemoryDocumentStore::new("in")
            .with_parameter("FretboardFingerPrint", "'FretboardMaker'")
            .with_parameter("FretCount", "22")
            .with_parameter("FretSpacing", "ScaleLengthBass / 17.817")
            .with_parameter("BodyDepth", "1.75 in")
            .with_timeline(vec![
                TimelineEntry::group("Fret Slot Cuts", 0, false),
                TimelineEntry::feature("Slot A", 1, false).in_group("Fret Slot Cuts"),
                TimelineEntry::feature("Slot B", 2, false).in_group("Fret Slot Cuts"),
            ])
    }

    fn only_model_state(messages: Vec<InboundMessage>) -> crate::bridge::ModelState {
        match messages.into_iter().next() {
            Some(InboundMessage::PushModelState(state)) => state,
            other => panic!("expected model state, got {other:?}"),
        }
    }

    #[test]
    fn document_without_fingerprint_gets_initial_defaults() {
        let mut host = host(InMemoryDocumentStore::new("mm"));
        let state = only_model_state(host.handle(OutboundMessage::GetModelState {}));
        assert_eq!(state.mode, DocumentMode::Initial);
        assert!(!state.has_fingerprint);
        assert_eq!(state.document_unit, "mm");
        assert_eq!(state.parameter("FretCount").expect("declared").expression, "22");
        assert!(state.parameter("FretSpacing").is_none());
    }

    #[test]
    fn live_state_reports_drift() {
        let mut host = host(live_store());
        let state = only_model_state(host.handle(OutboundMessage::GetModelState {}));
        assert_eq!(state.mode, DocumentMode::Live);
        assert_eq!(state.missing, vec!["ScaleLengthBass".to_string()]);
        assert_eq!(state.extra, vec!["BodyDepth".to_string()]);
        assert_eq!(state.fingerprint.as_deref(), Some("'FretboardMaker'"));
    }

    #[test]
    fn first_apply_adds_fingerprint_and_pushes_fresh_state() {
        let mut host = host(InMemoryDocumentStore::new("in").with_parameter("FretCount", "22"));
        let messages = host.handle(OutboundMessage::ApplyParams(BTreeMap::from([
            ("FretCount".to_string(), "24".to_string()),
            ("FretSpacing".to_string(), "3".to_string()),
        ])));
        assert!(matches!(messages[0], InboundMessage::Computing {}));
        match &messages[1] {
            InboundMessage::ApplyParamsResult(result) => {
                assert!(result.success);
                assert_eq!(result.updated, 1);
                assert_eq!(result.protected, 1);
            }
            other => panic!("unexpected {other:?}"),
        }
        match &messages[2] {
            InboundMessage::PushModelState(state) => assert_eq!(state.mode, DocumentMode::Live),
            other => panic!("unexpected {other:?}"),
        }
        assert!(host
            .store()
            .fingerprint("FretboardFingerPrint")
            .expect("read")
            .is_some());
    }

    #[test]
    fn apply_reports_parameters_missing_from_document() {
        let mut host = host(live_store());
        let messages = host.handle(OutboundMessage::ApplyParams(BTreeMap::from([(
            "ScaleLengthBass".to_string(),
            "26 in".to_string(),
        )])));
        match &messages[1] {
            InboundMessage::ApplyParamsResult(result) => {
                assert!(!result.success);
                assert_eq!(result.errors.len(), 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn timeline_batch_cascades_groups_and_lists_failures() {
        let mut host = host(live_store());
        let messages = host.handle(OutboundMessage::ApplyTimelineChanges {
            changes: vec![
                TimelineChange {
                    name: "Fret Slot Cuts".to_string(),
                    kind: TimelineItemKind::Group,
                    suppressed: true,
                },
                TimelineChange {
                    name: "Deleted Feature".to_string(),
                    kind: TimelineItemKind::Feature,
                    suppressed: true,
                },
            ],
        });
        match &messages[0] {
            InboundMessage::TimelineOperationResult(result) => {
                assert!(!result.success);
                assert_eq!(result.success_count, 1);
                assert_eq!(result.items_affected, Some(3));
                assert_eq!(result.failed, vec!["Deleted Feature".to_string()]);
                assert_eq!(result.new_state, Some(true));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(host.store().timeline_entry("Slot B").expect("child").suppressed);
    }

    #[test]
    fn refused_group_child_is_reported_apart_from_requested_changes() {
        let mut store = live_store();
        store.reject_writes_to("Slot A");
        let mut host = host(store);
        let messages = host.handle(OutboundMessage::ApplyTimelineChanges {
            changes: vec![TimelineChange {
                name: "Fret Slot Cuts".to_string(),
                kind: TimelineItemKind::Group,
                suppressed: true,
            }],
        });
        match &messages[0] {
            InboundMessage::TimelineOperationResult(result) => {
                assert!(result.success);
                assert_eq!(result.success_count, 1);
                assert!(result.failed.is_empty());
                assert_eq!(result.child_failures, vec!["Slot A".to_string()]);
                assert_eq!(result.message, "Applied 1 change(s); 1 grouped item(s) not updated");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(host.store().timeline_entry("Fret Slot Cuts").expect("group").suppressed);
    }

    #[test]
    fn item_state_reports_group_size_and_misses() {
        let mut host = host(live_store());
        let messages = host.handle(OutboundMessage::GetItemState {
            name: "Fret Slot Cuts".to_string(),
        });
        match &messages[0] {
            InboundMessage::PushItemState(state) => {
                assert!(state.found);
                assert_eq!(state.kind, Some(TimelineItemKind::Group));
                assert_eq!(state.group_size, Some(2));
                assert_eq!(state.parent, None);
            }
            other => panic!("unexpected {other:?}"),
        }

        let messages = host.handle_json(r#"{"action": "GET_ITEM_STATE", "data": {"name": "fret slot cuts"}}"#);
        assert!(matches!(
            &messages[0],
            InboundMessage::PushItemState(state) if !state.found && state.kind.is_none()
        ));
    }

    #[test]
    fn template_requests_without_storage_fail_with_request_failed() {
        let mut host = host(live_store());
        let messages = host.handle_json(r#"{"action": "GET_TEMPLATES"}"#);
        assert!(matches!(
            &messages[0],
            InboundMessage::RequestFailed { action, .. } if action == "GET_TEMPLATES"
        ));
    }

    #[test]
    fn templates_round_trip_through_the_host() {
        let conn = open_db_in_memory().expect("db");
        let mut host = host(live_store()).with_templates(conn);

        let messages = host.handle(OutboundMessage::SaveTemplate {
            name: "Jumbo".to_string(),
            description: String::new(),
            schema_version: None,
            parameters: BTreeMap::new(),
        });
        let saved = match &messages[0] {
            InboundMessage::PushTemplates { user_templates, .. } => user_templates[0].clone(),
            other => panic!("unexpected {other:?}"),
        };
        assert_eq!(saved.schema_version, "0.3.0");
        assert_eq!(saved.parameters.get("FretCount").map(String::as_str), Some("22"));
        assert!(!saved.parameters.contains_key("FretSpacing"));

        let state = only_model_state(host.handle(OutboundMessage::LoadTemplate {
            id: saved.id.clone(),
            readonly: false,
        }));
        assert_eq!(state.mode, DocumentMode::Template);
        assert_eq!(state.template_name.as_deref(), Some("Jumbo"));
        assert_eq!(
            state.parameter("ScaleLengthBass").expect("declared").unit,
            "in"
        );

        let messages = host.handle(OutboundMessage::DeleteTemplate { id: saved.id });
        assert!(matches!(
            &messages[0],
            InboundMessage::PushTemplates { user_templates, .. } if user_templates.is_empty()
        ));
    }

    #[test]
    fn undecodable_request_names_its_action() {
        let mut host = host(live_store());
        let messages = host.handle_json(r#"{"action": "APPLY_TIMELINE_CHANGES", "data": {"changes": [{"name": "X", "type": "Sketch", "suppressed": true}]}}"#);
        assert!(matches!(
            &messages[0],
            InboundMessage::RequestFailed { action, .. } if action == "APPLY_TIMELINE_CHANGES"
        ));
        assert!(host.store().writes().is_empty());
        assert!(host.store().document_unit() == "in");
    }
}
