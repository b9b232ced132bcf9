//! Surface-side session: one editing surface attached to one document host.
//!
//! # Responsibility
//! - Own the parameter session, the optimistic timeline overrides and the
//!   request correlator for a single surface.
//! - Turn user intents into outbound requests and fold inbound messages back
//!   into local state.
//! - Keep transient notices for results and failures.
//!
//! # Invariants
//! - Parameter and timeline submissions never overlap (one mutation in
//!   flight).
//! - Pending timeline overrides are cleared only by a successful batch, and
//!   cannot be toggled while a batch is in flight.
//! - Every mutation result is followed by a re-fetch of the state it touched,
//!   whatever its outcome.

use crate::bridge::messages::{
    InboundMessage, ItemState, OutboundMessage, APPLY_PARAMS, APPLY_TIMELINE_CHANGES, DELETE_TEMPLATE,
    LOAD_TEMPLATE, SAVE_TEMPLATE,
};
use crate::bridge::{BridgeClient, BridgeError, BridgeResult, Delivery};
use crate::config::EngineConfig;
use crate::model::parameter::compose_expression;
use crate::service::edit_session::{EditSession, ScaleMode, SessionResult};
use crate::service::parameter_session::ParameterSession;
use crate::service::pending_changes::PendingTimelineChanges;
use crate::service::template_service::TemplateList;
use crate::timeline::codec::decode_items;
use crate::timeline::{TimelineMatch, TimelineSummary, TimelineTree};
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Identity of one open surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Uuid::parse_str(raw.trim()).ok().map(Self)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for SessionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Auto-dismissing status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub message: String,
    pub is_error: bool,
    pub expires_at: Instant,
}

pub struct SurfaceSession {
    id: SessionId,
    params: ParameterSession,
    pending: PendingTimelineChanges,
    summary: TimelineSummary,
    templates: TemplateList,
    item_state: Option<ItemState>,
    client: BridgeClient,
    notices: Vec<Notice>,
    computing: bool,
    dismiss_after: Duration,
    refetch_delay: Duration,
}

impl SurfaceSession {
    pub fn new(config: EngineConfig) -> Self {
        let dismiss_after = config.notice_dismiss();
        let refetch_delay = config.refetch_delay();
        Self {
            id: SessionId::new(),
            params: ParameterSession::new(config),
            pending: PendingTimelineChanges::default(),
            summary: TimelineSummary::default(),
            templates: TemplateList::default(),
            item_state: None,
            client: BridgeClient::new(),
            notices: Vec::new(),
            computing: false,
            dismiss_after,
            refetch_delay,
        }
    }

    /// Initial fetches, in send order.
    pub fn open(&mut self) -> BridgeResult<Vec<OutboundMessage>> {
        info!("event=surface_open module=surface status=ok session={}", self.id);
        [
            OutboundMessage::GetModelState {},
            OutboundMessage::GetTimelineItems {},
            OutboundMessage::GetTimelineSummary {},
            OutboundMessage::GetTemplates {},
        ]
        .into_iter()
        .map(|message| self.client.send(message))
        .collect()
    }

    pub fn stage_edit(&mut self, name: &str, value: &str) -> SessionResult<Arc<EditSession>> {
        self.params.stage_edit(name, value)
    }

    pub fn undo(&mut self) -> Arc<EditSession> {
        self.params.undo()
    }

    pub fn redo(&mut self) -> Arc<EditSession> {
        self.params.redo()
    }

    pub fn set_scale_mode(&mut self, mode: ScaleMode) -> Arc<EditSession> {
        self.params.set_scale_mode(mode)
    }

    /// `APPLY_PARAMS` for the modified fields, or `None` when nothing changed.
    pub fn submit_params(&mut self) -> BridgeResult<Option<OutboundMessage>> {
        if let Some(pending) = self.client.in_flight_mutation() {
            return Err(BridgeError::Busy { pending });
        }
        let Some(batch) = self.params.begin_apply() else {
            return Ok(None);
        };
        match self.client.send(OutboundMessage::ApplyParams(batch.to_map())) {
            Ok(message) => Ok(Some(message)),
            Err(err) => {
                self.params.on_apply_result(false);
                Err(err)
            }
        }
    }

    /// Flips one item locally and returns its effective flag.
    ///
    /// Rejected with `Busy` while a timeline batch is in flight, since its
    /// result clears every override.
    pub fn toggle_timeline_item(&mut self, name: &str) -> BridgeResult<bool> {
        if let Some(pending @ APPLY_TIMELINE_CHANGES) = self.client.in_flight_mutation() {
            return Err(BridgeError::Busy { pending });
        }
        Ok(self.pending.toggle(self.params.baseline().timeline(), name)?)
    }

    /// Confirmed items with local overrides applied.
    pub fn timeline_items(&self) -> Vec<TimelineMatch> {
        self.pending.merged(self.params.baseline().timeline())
    }

    /// `APPLY_TIMELINE_CHANGES` for the overridden items, or `None`.
    pub fn submit_timeline_changes(&mut self) -> BridgeResult<Option<OutboundMessage>> {
        let changes = self.pending.changes(self.params.baseline().timeline());
        if changes.is_empty() {
            debug!("event=timeline_submit module=surface status=skipped changes=0");
            return Ok(None);
        }
        info!(
            "event=timeline_submit module=surface status=start changes={}",
            changes.len()
        );
        self.client
            .send(OutboundMessage::ApplyTimelineChanges { changes })
            .map(Some)
    }

    /// Asks the host for the current state of one item, by exact name.
    pub fn request_item_state(&mut self, name: &str) -> BridgeResult<OutboundMessage> {
        self.client.send(OutboundMessage::GetItemState {
            name: name.to_string(),
        })
    }

    pub fn refresh_templates(&mut self) -> BridgeResult<OutboundMessage> {
        self.client.send(OutboundMessage::GetTemplates {})
    }

    pub fn load_template(&mut self, id: &str, readonly: bool) -> BridgeResult<OutboundMessage> {
        self.client.send(OutboundMessage::LoadTemplate {
            id: id.to_string(),
            readonly,
        })
    }

    /// Saves the displayed values, composed with their unit suffixes.
    pub fn save_template(
        &mut self,
        name: &str,
        description: &str,
    ) -> BridgeResult<OutboundMessage> {
        let parameters = self.composed_values();
        self.client.send(OutboundMessage::SaveTemplate {
            name: name.to_string(),
            description: description.to_string(),
            schema_version: None,
            parameters,
        })
    }

    pub fn delete_template(&mut self, id: &str) -> BridgeResult<OutboundMessage> {
        self.client.send(OutboundMessage::DeleteTemplate { id: id.to_string() })
    }

    /// Applies one inbound envelope; returns follow-up requests to send.
    ///
    /// Follow-ups after a timeline batch should be sent once
    /// [`SurfaceSession::refetch_delay`] has elapsed.
    pub fn receive(&mut self, raw: &str) -> BridgeResult<Vec<OutboundMessage>> {
        let delivery = self.client.receive(raw)?;
        self.apply(delivery, Instant::now())
    }

    fn apply(&mut self, delivery: Delivery, now: Instant) -> BridgeResult<Vec<OutboundMessage>> {
        let mut follow_ups = Vec::new();
        match delivery.message {
            InboundMessage::PushModelState(state) => self.params.on_model_state(&state),
            InboundMessage::PushTimelineItems { items } => {
                let tree = TimelineTree::from_items(decode_items(items)?)?;
                self.params.reseed_timeline(tree);
            }
            InboundMessage::PushTimelineSummary(summary) => self.summary = summary,
            InboundMessage::TimelineOperationResult(result) => {
                if result.success {
                    self.pending.clear();
                }
                let is_error = !result.success || !result.child_failures.is_empty();
                self.notify(result.message, is_error, now);
                follow_ups.extend(self.refetch_timeline()?);
            }
            InboundMessage::PushTemplates {
                presets,
                user_templates,
            } => {
                self.templates = TemplateList {
                    presets,
                    user_templates,
                };
            }
            InboundMessage::ApplyParamsResult(result) => {
                self.computing = false;
                self.params.on_apply_result(result.success);
                let message = match result.errors.first() {
                    Some(first) if !result.success => format!("{}: {first}", result.message),
                    _ => result.message,
                };
                self.notify(message, !result.success, now);
            }
            InboundMessage::Computing {} => self.computing = true,
            InboundMessage::PushItemState(state) => self.item_state = Some(state),
            InboundMessage::RequestFailed { action, message } => {
                warn!(
                    "event=request_failed module=surface status=error action={}",
                    action
                );
                match delivery.request {
                    Some(APPLY_PARAMS) => {
                        self.computing = false;
                        self.params.on_apply_result(false);
                        follow_ups.push(self.client.send(OutboundMessage::GetModelState {})?);
                    }
                    Some(APPLY_TIMELINE_CHANGES) => follow_ups.extend(self.refetch_timeline()?),
                    Some(LOAD_TEMPLATE) => {
                        follow_ups.push(self.client.send(OutboundMessage::GetModelState {})?);
                    }
                    Some(SAVE_TEMPLATE | DELETE_TEMPLATE) => {
                        follow_ups.push(self.client.send(OutboundMessage::GetModelState {})?);
                        follow_ups.push(self.client.send(OutboundMessage::GetTemplates {})?);
                    }
                    _ => {}
                }
                self.notify(message, true, now);
            }
        }
        Ok(follow_ups)
    }

    fn refetch_timeline(&mut self) -> BridgeResult<Vec<OutboundMessage>> {
        Ok(vec![
            self.client.send(OutboundMessage::GetTimelineItems {})?,
            self.client.send(OutboundMessage::GetTimelineSummary {})?,
        ])
    }

    fn composed_values(&self) -> BTreeMap<String, String> {
        let snapshot = self.params.snapshot();
        self.params
            .baseline()
            .fields()
            .iter()
            .filter(|field| field.editable)
            .filter_map(|field| {
                let display = snapshot.value(&field.name)?;
                let expression = compose_expression(
                    display,
                    field.unit_kind,
                    self.params.document_unit(),
                    &self.params.config().angle_unit,
                );
                Some((field.name.clone(), expression))
            })
            .collect()
    }

    fn notify(&mut self, message: String, is_error: bool, now: Instant) {
        self.prune_notices(now);
        self.notices.push(Notice {
            message,
            is_error,
            expires_at: now + self.dismiss_after,
        });
    }

    /// Notices not yet dismissed at `now`, oldest first.
    pub fn active_notices(&self, now: Instant) -> Vec<&Notice> {
        self.notices
            .iter()
            .filter(|notice| notice.expires_at > now)
            .collect()
    }

    pub fn prune_notices(&mut self, now: Instant) {
        self.notices.retain(|notice| notice.expires_at > now);
    }

    /// Stops listening. A request already sent still runs on the host.
    pub fn close(&mut self) {
        self.client.close();
        info!(
            "event=surface_close module=surface status=ok session={} pending_overrides={}",
            self.id,
            self.pending.len()
        );
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn params(&self) -> &ParameterSession {
        &self.params
    }

    pub fn pending(&self) -> &PendingTimelineChanges {
        &self.pending
    }

    pub fn summary(&self) -> TimelineSummary {
        self.summary
    }

    pub fn templates(&self) -> &TemplateList {
        &self.templates
    }

    /// Last item looked up with [`SurfaceSession::request_item_state`].
    pub fn item_state(&self) -> Option<&ItemState> {
        self.item_state.as_ref()
    }

    pub fn is_busy(&self) -> bool {
        self.client.is_busy()
    }

    pub fn is_computing(&self) -> bool {
        self.computing
    }

    pub fn refetch_delay(&self) -> Duration {
        self.refetch_delay
    }
}

#[cfg(test)]
mod tests {
    use super::{SessionId, SurfaceSession};
    use crate::bridge::messages::OutboundMessage;
    use crate::bridge::BridgeError;
    use crate::config::EngineConfig;
    use crate::model::timeline::TimelineItemKind;
    use std::time::{Duration, Instant};

    const MODEL_STATE: &str = r#"{"action": "PUSH_MODEL_STATE", "data": {
        "schemaVersion": "0.3.0", "templateVersion": "7", "mode": "live",
        "hasFingerprint": true, "documentUnit": "in",
        "groups": [{"id": "neck", "label": "Neck", "order": 0, "parameters": [
            {"name": "FretCount", "label": "Frets", "unitKind": "unitless", "default": "22", "expression": "22"},
            {"name": "ScaleLengthBass", "label": "Bass", "default": "25.5", "expression": "25.5 in"}
        ]}]
    }}"#;

    const TIMELINE_ITEMS: &str = r#"{"action": "PUSH_TIMELINE_ITEMS", "data": {"items": [
        {"name": "Neck Blank", "type": "Feature", "suppressed": false, "index": 0},
        {"name": "Fret Slot Cuts", "type": "Group", "suppressed": false, "index": 1, "children": [
            {"name": "Slot A", "type": "Feature", "suppressed": false, "index": 2}
        ]}
    ]}}"#;

    fn opened() -> SurfaceSession {
        let mut surface = SurfaceSession::new(EngineConfig::default());
        surface.open().expect("open");
        surface.receive(MODEL_STATE).expect("model state");
        surface.receive(TIMELINE_ITEMS).expect("items");
        surface
    }

    #[test]
    fn session_ids_parse_back() {
        let id = SessionId::new();
        assert_eq!(SessionId::parse(&id.to_string()), Some(id));
        assert_eq!(SessionId::parse("not-a-uuid"), None);
    }

    #[test]
    fn unchanged_fields_submit_nothing() {
        let mut surface = opened();
        assert_eq!(surface.submit_params().expect("submit"), None);
        assert!(!surface.is_busy());
    }

    #[test]
    fn parameter_submission_blocks_timeline_submission() {
        let mut surface = opened();
        surface.stage_edit("FretCount", "24").expect("stage");
        let sent = surface.submit_params().expect("submit").expect("batch");
        assert!(matches!(sent, OutboundMessage::ApplyParams(ref values) if values["FretCount"] == "24"));

        surface.toggle_timeline_item("Slot A").expect("toggle");
        assert!(matches!(
            surface.submit_timeline_changes(),
            Err(BridgeError::Busy { pending: "APPLY_PARAMS" })
        ));

        surface
            .receive(r#"{"action": "COMPUTING", "data": {}}"#)
            .expect("computing");
        assert!(surface.is_computing());
        surface
            .receive(r#"{"action": "APPLY_PARAMS_RESULT", "data": {"success": true, "message": "Applied 1 parameter(s)", "updated": 1}}"#)
            .expect("result");
        assert!(!surface.is_busy());
        assert!(!surface.params().is_modified("FretCount"));
        assert!(surface.submit_timeline_changes().expect("submit").is_some());
    }

    #[test]
    fn failed_timeline_batch_keeps_overrides_and_refetches() {
        let mut surface = opened();
        assert!(surface.toggle_timeline_item("Fret Slot Cuts").expect("toggle"));
        surface.submit_timeline_changes().expect("submit");

        let follow_ups = surface
            .receive(r#"{"action": "TIMELINE_OPERATION_RESULT", "data": {"success": false, "message": "Applied 0 change(s) (1 failed)", "failed": ["Fret Slot Cuts"]}}"#)
            .expect("result");
        assert_eq!(
            follow_ups,
            vec![
                OutboundMessage::GetTimelineItems {},
                OutboundMessage::GetTimelineSummary {}
            ]
        );
        assert_eq!(surface.pending().len(), 1);

        let now = Instant::now();
        let notices = surface.active_notices(now);
        assert_eq!(notices.len(), 1);
        assert!(notices[0].is_error);
        assert!(surface
            .active_notices(now + Duration::from_secs(10))
            .is_empty());
    }

    #[test]
    fn successful_timeline_batch_clears_overrides() {
        let mut surface = opened();
        surface.toggle_timeline_item("Slot A").expect("toggle");
        assert!(surface.timeline_items()[2].suppressed);
        surface.submit_timeline_changes().expect("submit");
        surface
            .receive(r#"{"action": "TIMELINE_OPERATION_RESULT", "data": {"success": true, "message": "Applied 1 change(s)", "newState": true, "successCount": 1}}"#)
            .expect("result");
        assert!(surface.pending().is_empty());
    }

    #[test]
    fn request_failed_for_apply_keeps_edits_and_refetches_state() {
        let mut surface = opened();
        surface.stage_edit("FretCount", "24").expect("stage");
        surface.submit_params().expect("submit");
        let follow_ups = surface
            .receive(r#"{"action": "REQUEST_FAILED", "data": {"action": "APPLY_PARAMS", "message": "document closed"}}"#)
            .expect("failure");
        assert_eq!(follow_ups, vec![OutboundMessage::GetModelState {}]);
        assert!(!surface.is_busy());
        assert!(surface.params().is_modified("FretCount"));
        assert_eq!(surface.active_notices(Instant::now())[0].message, "document closed");

        surface.receive(MODEL_STATE).expect("refetched state");
        assert!(surface.params().is_modified("FretCount"));
    }

    #[test]
    fn failed_template_requests_refetch_what_they_touched() {
        let mut surface = opened();
        surface.load_template("missing", true).expect("send load");
        let follow_ups = surface
            .receive(r#"{"action": "REQUEST_FAILED", "data": {"action": "LOAD_TEMPLATE", "message": "template not found: missing"}}"#)
            .expect("load failure");
        assert_eq!(follow_ups, vec![OutboundMessage::GetModelState {}]);

        surface.save_template("Baritone", "").expect("send save");
        let follow_ups = surface
            .receive(r#"{"action": "REQUEST_FAILED", "data": {"action": "SAVE_TEMPLATE", "message": "storage unavailable"}}"#)
            .expect("save failure");
        assert_eq!(
            follow_ups,
            vec![OutboundMessage::GetModelState {}, OutboundMessage::GetTemplates {}]
        );

        surface.delete_template("factory").expect("send delete");
        let follow_ups = surface
            .receive(r#"{"action": "REQUEST_FAILED", "data": {"action": "DELETE_TEMPLATE", "message": "presets are read-only"}}"#)
            .expect("delete failure");
        assert_eq!(
            follow_ups,
            vec![OutboundMessage::GetModelState {}, OutboundMessage::GetTemplates {}]
        );
    }

    #[test]
    fn toggles_wait_for_the_timeline_batch_in_flight() {
        let mut surface = opened();
        surface.toggle_timeline_item("Slot A").expect("toggle");
        surface.submit_timeline_changes().expect("submit");

        assert!(matches!(
            surface.toggle_timeline_item("Neck Blank"),
            Err(BridgeError::Busy { pending: "APPLY_TIMELINE_CHANGES" })
        ));
        assert!(!surface.pending().is_overridden(TimelineItemKind::Feature, "Neck Blank"));

        surface
            .receive(r#"{"action": "TIMELINE_OPERATION_RESULT", "data": {"success": true, "message": "Applied 1 change(s)", "newState": true, "successCount": 1}}"#)
            .expect("result");
        assert!(surface.toggle_timeline_item("Neck Blank").expect("toggle after result"));
        assert_eq!(surface.pending().len(), 1);
    }

    #[test]
    fn item_state_lookup_is_kept() {
        let mut surface = opened();
        assert_eq!(
            surface.request_item_state("Slot A").expect("send"),
            OutboundMessage::GetItemState {
                name: "Slot A".to_string()
            }
        );
        surface
            .receive(r#"{"action": "PUSH_ITEM_STATE", "data": {"name": "Slot A", "found": true, "type": "Feature", "suppressed": false, "index": 2, "parent": "Fret Slot Cuts"}}"#)
            .expect("item state");
        let state = surface.item_state().expect("stored");
        assert!(state.found);
        assert_eq!(state.parent.as_deref(), Some("Fret Slot Cuts"));
    }

    #[test]
    fn template_save_sends_composed_expressions() {
        let mut surface = opened();
        surface.stage_edit("ScaleLengthBass", "26").expect("stage");
        match surface.save_template("Baritone", "").expect("send") {
            OutboundMessage::SaveTemplate { parameters, .. } => {
                assert_eq!(parameters["ScaleLengthBass"], "26 in");
                assert_eq!(parameters["FretCount"], "22");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
