use fretboard_core::model::timeline::TimelineEntry;
use fretboard_core::{
    CascadeEngine, DocumentStore, InMemoryDocumentStore, NameMatch, TimelineError, TimelineTree,
};

fn neck_document() -> InMemoryDocumentStore {
    InMemoryDocumentStore::new("in").with_timeline(vec![
        TimelineEntry::feature("Neck Blank", 0, false),
        TimelineEntry::feature("Neck Profile", 1, false),
        TimelineEntry::group("Fret Slot Cuts", 2, false),
        TimelineEntry::feature("Fret Slot 1", 3, false).in_group("Fret Slot Cuts"),
        TimelineEntry::feature("Fret Slot 2", 4, true).in_group("Fret Slot Cuts"),
        TimelineEntry::feature("Fret Slot 3", 5, false).in_group("Fret Slot Cuts"),
        TimelineEntry::feature("Inlay Pockets", 6, false),
    ])
}

fn flags(store: &InMemoryDocumentStore) -> Vec<bool> {
    store
        .timeline_entries()
        .unwrap()
        .into_iter()
        .map(|entry| entry.suppressed)
        .collect()
}

#[test]
fn suppressing_fret_slot_cuts_reduces_active_features_by_two() {
    let mut store = neck_document();
    let before = TimelineTree::load(&store).unwrap().summarize();
    assert_eq!(before.active_count, 5);
    assert_eq!(before.suppressed_count, 1);
    assert_eq!(before.total_items, 7);

    CascadeEngine::new(&mut store)
        .suppress_group_with_contents("Fret Slot Cuts")
        .unwrap();

    let after = TimelineTree::load(&store).unwrap().summarize();
    assert_eq!(before.active_count - after.active_count, 2);
    assert_eq!(after.group_count, 1);
    assert_eq!(after.feature_count, 6);
}

#[test]
fn group_suppress_then_unsuppress_restores_active_children() {
    let mut store = neck_document();
    CascadeEngine::new(&mut store)
        .unsuppress("Fret Slot 2", NameMatch::Exact)
        .unwrap();
    let before = flags(&store);

    let mut engine = CascadeEngine::new(&mut store);
    let suppressed = engine.suppress_group_with_contents("Fret Slot Cuts").unwrap();
    assert_eq!(
        suppressed.affected,
        vec!["Fret Slot Cuts", "Fret Slot 1", "Fret Slot 2", "Fret Slot 3"]
    );
    engine
        .unsuppress_group_with_contents("Fret Slot Cuts")
        .unwrap();

    assert_eq!(flags(&store), before);
}

#[test]
fn group_unsuppress_clears_every_child() {
    let mut store = neck_document();
    assert!(store.timeline_entries().unwrap()[4].suppressed);

    let mut engine = CascadeEngine::new(&mut store);
    engine.suppress_group_with_contents("Fret Slot Cuts").unwrap();
    engine
        .unsuppress_group_with_contents("Fret Slot Cuts")
        .unwrap();

    // "Fret Slot 2" started suppressed and comes back active.
    assert_eq!(flags(&store), vec![false; 7]);
}

#[test]
fn toggling_twice_restores_the_original_flag() {
    let mut store = neck_document();
    let original = flags(&store);
    let mut engine = CascadeEngine::new(&mut store);
    let first = engine.toggle("Fret Slot 2", NameMatch::Exact).unwrap();
    assert_eq!(first.new_state, Some(false));
    engine.toggle("Fret Slot 2", NameMatch::Exact).unwrap();
    assert_eq!(flags(&store), original);
}

#[test]
fn invalid_pattern_is_reported_without_writes() {
    let mut store = neck_document();
    let err = CascadeEngine::new(&mut store)
        .suppress_by_pattern("Fret Slot [")
        .unwrap_err();
    assert!(matches!(err, TimelineError::InvalidPattern { .. }));
    assert!(store.writes().is_empty());
}

#[test]
fn contains_match_is_ambiguous_when_several_items_match() {
    let mut store = neck_document();
    let err = CascadeEngine::new(&mut store)
        .suppress("fret slot", NameMatch::Contains)
        .unwrap_err();
    match err {
        TimelineError::Ambiguous { candidates, .. } => assert_eq!(candidates.len(), 4),
        other => panic!("unexpected error: {other}"),
    }
    let err = CascadeEngine::new(&mut store)
        .suppress("neck blank", NameMatch::Exact)
        .unwrap_err();
    assert_eq!(err, TimelineError::NotFound("neck blank".to_string()));
}

#[test]
fn pattern_batch_collects_failures_without_aborting() {
    let mut store = neck_document();
    store.reject_writes_to("Fret Slot 1");
    let report = CascadeEngine::new(&mut store)
        .suppress_by_pattern(r"^fret slot \d$")
        .unwrap();
    assert!(!report.is_complete());
    let err = report.into_result().unwrap_err();
    match err {
        TimelineError::PartialBatchFailure { affected, failures } => {
            assert_eq!(affected, 2);
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].name, "Fret Slot 1");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(store.timeline_entry("Fret Slot 3").unwrap().suppressed);
    assert!(!store.timeline_entry("Fret Slot Cuts").unwrap().suppressed);
}

#[test]
fn group_only_operations_reject_features() {
    let mut store = neck_document();
    assert_eq!(
        CascadeEngine::new(&mut store).suppress_group_contents("Neck Blank"),
        Err(TimelineError::NotAGroup("Neck Blank".to_string()))
    );
}
