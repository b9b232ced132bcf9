use fretboard_core::db::open_db_in_memory;
use fretboard_core::model::timeline::TimelineEntry;
use fretboard_core::repo::document_store::StoreWrite;
use fretboard_core::{
    BridgeHost, DocumentMode, DocumentStore, EngineConfig, InMemoryDocumentStore,
    OutboundMessage, ParameterSchema, SurfaceSession,
};
use std::collections::VecDeque;

const SCHEMA: &str = r#"{
    "schemaVersion": "0.3.0",
    "templateVersion": "7",
    "groups": [
        {"id": "neck", "label": "Neck", "order": 1, "parameters": [
            {"name": "FretCount", "unitKind": "unitless", "default": "22"},
            {"name": "ScaleLengthBass", "default": "25.5"},
            {"name": "ScaleLengthTreble", "default": "25.5"},
            {"name": "FretSpacing", "default": "ScaleLengthBass / 17.817", "editable": false}
        ]}
    ]
}"#;

fn document(with_fingerprint: bool) -> InMemoryDocumentStore {
    let store = InMemoryDocumentStore::new("in");
    let store = if with_fingerprint {
        store.with_parameter("FretboardFingerPrint", "'FretboardMaker'")
    } else {
        store
    };
    store
        .with_parameter("FretCount", "22")
        .with_parameter("ScaleLengthBass", "25.5 in")
        .with_parameter("ScaleLengthTreble", "25.5 in")
        .with_parameter("FretSpacing", "ScaleLengthBass / 17.817")
        .with_timeline(vec![
            TimelineEntry::feature("Neck Blank", 0, false),
            TimelineEntry::group("Fret Slot Cuts", 1, false),
            TimelineEntry::feature("Slot A", 2, false).in_group("Fret Slot Cuts"),
            TimelineEntry::feature("Slot B", 3, false).in_group("Fret Slot Cuts"),
        ])
}

fn host(store: InMemoryDocumentStore) -> BridgeHost<InMemoryDocumentStore> {
    let schema = ParameterSchema::from_json(SCHEMA).unwrap();
    BridgeHost::new(store, schema, EngineConfig::default())
        .with_templates(open_db_in_memory().unwrap())
}

/// Delivers requests to the host and responses back until both sides idle.
fn pump(
    surface: &mut SurfaceSession,
    host: &mut BridgeHost<InMemoryDocumentStore>,
    requests: Vec<OutboundMessage>,
) {
    let mut queue = VecDeque::from(requests);
    while let Some(request) = queue.pop_front() {
        let raw_request = request.to_json().unwrap();
        for response in host.handle_json(&raw_request) {
            let raw_response = response.to_json().unwrap();
            queue.extend(surface.receive(&raw_response).unwrap());
        }
    }
}

fn opened(store: InMemoryDocumentStore) -> (SurfaceSession, BridgeHost<InMemoryDocumentStore>) {
    let mut surface = SurfaceSession::new(EngineConfig::default());
    let mut host = host(store);
    let requests = surface.open().unwrap();
    pump(&mut surface, &mut host, requests);
    (surface, host)
}

#[test]
fn open_loads_state_timeline_and_summary() {
    let (surface, _host) = opened(document(true));
    assert_eq!(surface.params().mode(), DocumentMode::Live);
    assert_eq!(surface.timeline_items().len(), 4);
    assert_eq!(surface.summary().active_count, 3);
    assert!(!surface.is_busy());
}

#[test]
fn zero_change_submission_never_contacts_the_store() {
    let (mut surface, host) = opened(document(true));
    surface.stage_edit("FretCount", "24").unwrap();
    surface.stage_edit("FretCount", "22").unwrap();
    assert_eq!(surface.submit_params().unwrap(), None);
    assert_eq!(surface.submit_timeline_changes().unwrap(), None);
    assert!(host.store().writes().is_empty());
}

#[test]
fn linked_scale_edit_reaches_the_document_with_units() {
    let (mut surface, mut host) = opened(document(true));
    surface.stage_edit("ScaleLengthBass", "25").unwrap();
    let request = surface.submit_params().unwrap().unwrap();
    pump(&mut surface, &mut host, vec![request]);

    let store = host.store();
    assert_eq!(store.parameter("ScaleLengthBass").unwrap().expression, "25 in");
    assert_eq!(store.parameter("ScaleLengthTreble").unwrap().expression, "25 in");
    assert!(!surface.params().is_modified("ScaleLengthBass"));
    assert!(!surface.is_busy());
}

#[test]
fn first_apply_from_initial_fingerprints_the_document() {
    let (mut surface, mut host) = opened(document(false));
    assert_eq!(surface.params().mode(), DocumentMode::Initial);

    surface.stage_edit("FretCount", "24").unwrap();
    let request = surface.submit_params().unwrap().unwrap();
    pump(&mut surface, &mut host, vec![request]);

    assert_eq!(surface.params().mode(), DocumentMode::Live);
    assert!(host
        .store()
        .writes()
        .iter()
        .any(|write| *write == StoreWrite::Fingerprint));
    assert!(host.store().fingerprint("FretboardFingerPrint").unwrap().is_some());
}

#[test]
fn failed_apply_keeps_edits_across_the_pushed_state() {
    let (mut surface, mut host) = opened(document(true));
    host.store_mut().reject_writes_to("FretCount");
    surface.stage_edit("FretCount", "24").unwrap();
    let request = surface.submit_params().unwrap().unwrap();
    pump(&mut surface, &mut host, vec![request]);

    assert!(surface.params().is_modified("FretCount"));
    assert_eq!(surface.params().snapshot().value("FretCount"), Some("24"));
    assert!(!surface.is_busy());
}

#[test]
fn timeline_batch_applies_and_refreshes() {
    let (mut surface, mut host) = opened(document(true));
    surface.toggle_timeline_item("Fret Slot Cuts").unwrap();
    surface.toggle_timeline_item("Neck Blank").unwrap();
    let request = surface.submit_timeline_changes().unwrap().unwrap();
    pump(&mut surface, &mut host, vec![request]);

    assert!(surface.pending().is_empty());
    assert_eq!(surface.summary().active_count, 0);
    assert_eq!(surface.summary().suppressed_count, 3);
    assert!(surface
        .timeline_items()
        .iter()
        .all(|item| item.suppressed));
    assert!(host.store().timeline_entry("Slot B").unwrap().suppressed);
}

#[test]
fn vanished_items_fail_but_the_rest_of_the_batch_applies() {
    let (mut surface, mut host) = opened(document(true));
    surface.toggle_timeline_item("Slot A").unwrap();
    surface.toggle_timeline_item("Neck Blank").unwrap();
    host.store_mut().remove_timeline_item("Slot A");
    let request = surface.submit_timeline_changes().unwrap().unwrap();
    pump(&mut surface, &mut host, vec![request]);

    assert!(host.store().timeline_entry("Neck Blank").unwrap().suppressed);
    assert_eq!(surface.pending().len(), 2);
    assert_eq!(surface.timeline_items().len(), 3);
    let now = std::time::Instant::now();
    assert!(surface.active_notices(now).iter().any(|notice| notice.is_error));
}

#[test]
fn refused_group_child_does_not_fail_the_group_change() {
    let (mut surface, mut host) = opened(document(true));
    host.store_mut().reject_writes_to("Slot A");
    surface.toggle_timeline_item("Fret Slot Cuts").unwrap();
    let request = surface.submit_timeline_changes().unwrap().unwrap();
    pump(&mut surface, &mut host, vec![request]);

    assert!(surface.pending().is_empty());
    assert!(host.store().timeline_entry("Fret Slot Cuts").unwrap().suppressed);
    assert!(!host.store().timeline_entry("Slot A").unwrap().suppressed);
    let now = std::time::Instant::now();
    let notices = surface.active_notices(now);
    let notice = notices.last().unwrap();
    assert!(notice.is_error);
    assert!(notice.message.starts_with("Applied 1 change(s)"));
}

#[test]
fn template_save_load_and_delete_round_trip() {
    let (mut surface, mut host) = opened(document(true));
    surface.stage_edit("FretCount", "24").unwrap();
    let save = surface.save_template("Jumbo Frets", "").unwrap();
    pump(&mut surface, &mut host, vec![save]);

    let saved = surface.templates().user_templates[0].clone();
    assert_eq!(saved.id, "jumbo_frets");
    assert_eq!(saved.parameters["FretCount"], "24");
    assert_eq!(saved.parameters["ScaleLengthBass"], "25.5 in");

    let undo = surface.undo();
    assert_eq!(undo.value("FretCount"), Some("22"));
    let load = surface.load_template(&saved.id, false).unwrap();
    pump(&mut surface, &mut host, vec![load]);
    assert_eq!(surface.params().mode(), DocumentMode::Template);
    assert_eq!(surface.params().template_name(), Some("Jumbo Frets"));
    assert_eq!(surface.params().baseline().value("FretCount"), Some("22"));
    assert!(surface.params().is_modified("FretCount"));

    let delete = surface.delete_template(&saved.id).unwrap();
    pump(&mut surface, &mut host, vec![delete]);
    assert!(surface.templates().user_templates.is_empty());
}
