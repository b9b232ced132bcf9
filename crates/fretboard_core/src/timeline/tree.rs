//! Two-level timeline tree built from the store's flat enumeration.

use super::{TimelineError, TimelineResult};
use crate::model::timeline::{Feature, Group, TimelineEntry, TimelineItem, TimelineItemKind};
use crate::repo::document_store::DocumentStore;
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Counts reported by `PUSH_TIMELINE_SUMMARY`.
///
/// `active_count` and `suppressed_count` count features only, so
/// `active_count + suppressed_count == feature_count`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineSummary {
    pub total_items: usize,
    pub active_count: usize,
    pub suppressed_count: usize,
    pub group_count: usize,
    pub feature_count: usize,
}

/// One resolved item, top-level or nested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelineMatch {
    pub name: String,
    pub kind: TimelineItemKind,
    pub suppressed: bool,
    pub index: u32,
    pub parent: Option<String>,
    /// Number of children; zero for features.
    pub child_count: usize,
}

/// Ordered timeline snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimelineTree {
    items: Vec<TimelineItem>,
}

impl TimelineTree {
    /// Builds the tree from a flat enumeration using its parent relation.
    ///
    /// # Errors
    /// - `DuplicateName` when two entries share a name.
    /// - `NonIncreasingIndex` when indices are not strictly increasing.
    /// - `UnknownParent`, `ParentNotAGroup` or `NestedGroup` for a broken
    ///   parent relation.
    pub fn build(entries: &[TimelineEntry]) -> TimelineResult<Self> {
        let mut kinds = BTreeMap::new();
        let mut previous: Option<u32> = None;
        for entry in entries {
            if kinds.insert(entry.name.as_str(), entry.kind).is_some() {
                return Err(TimelineError::DuplicateName(entry.name.clone()));
            }
            if let Some(previous) = previous {
                if entry.index <= previous {
                    return Err(TimelineError::NonIncreasingIndex {
                        item: entry.name.clone(),
                        index: entry.index,
                        previous,
                    });
                }
            }
            previous = Some(entry.index);
        }

        let mut children: BTreeMap<&str, Vec<Feature>> = BTreeMap::new();
        for entry in entries {
            let Some(parent) = entry.parent.as_deref() else {
                continue;
            };
            match (entry.kind, kinds.get(parent)) {
                (TimelineItemKind::Group, _) => {
                    return Err(TimelineError::NestedGroup {
                        group: entry.name.clone(),
                        parent: parent.to_string(),
                    });
                }
                (_, None) => {
                    return Err(TimelineError::UnknownParent {
                        item: entry.name.clone(),
                        parent: parent.to_string(),
                    });
                }
                (_, Some(TimelineItemKind::Feature)) => {
                    return Err(TimelineError::ParentNotAGroup {
                        item: entry.name.clone(),
                        parent: parent.to_string(),
                    });
                }
                (TimelineItemKind::Feature, Some(TimelineItemKind::Group)) => {
                    children.entry(parent).or_default().push(Feature {
                        name: entry.name.clone(),
                        suppressed: entry.suppressed,
                        index: entry.index,
                        parent: Some(parent.to_string()),
                    });
                }
            }
        }

        let items = entries
            .iter()
            .filter(|entry| entry.parent.is_none())
            .map(|entry| match entry.kind {
                TimelineItemKind::Feature => TimelineItem::Feature(Feature {
                    name: entry.name.clone(),
                    suppressed: entry.suppressed,
                    index: entry.index,
                    parent: None,
                }),
                TimelineItemKind::Group => TimelineItem::Group(Group {
                    name: entry.name.clone(),
                    suppressed: entry.suppressed,
                    index: entry.index,
                    children: children.remove(entry.name.as_str()).unwrap_or_default(),
                }),
            })
            .collect();

        Ok(Self { items })
    }

    /// Wraps already-shaped items (e.g. decoded from the wire).
    ///
    /// Checks name uniqueness and that each child names its group.
    pub fn from_items(items: Vec<TimelineItem>) -> TimelineResult<Self> {
        let mut seen = BTreeSet::new();
        for item in &items {
            if !seen.insert(item.name().to_string()) {
                return Err(TimelineError::DuplicateName(item.name().to_string()));
            }
            for child in item.children() {
                if !seen.insert(child.name.clone()) {
                    return Err(TimelineError::DuplicateName(child.name.clone()));
                }
            }
        }

        let mut items = items;
        for item in &mut items {
            if let TimelineItem::Group(group) = item {
                for child in &mut group.children {
                    child.parent = Some(group.name.clone());
                }
            }
        }
        Ok(Self { items })
    }

    /// Reads and builds the current tree from a store.
    pub fn load(store: &impl DocumentStore) -> TimelineResult<Self> {
        let entries = store.timeline_entries()?;
        Self::build(&entries)
    }

    pub fn items(&self) -> &[TimelineItem] {
        &self.items
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Every item in document order, groups before their children.
    pub fn flatten(&self) -> Vec<TimelineMatch> {
        let mut out = Vec::new();
        for item in &self.items {
            out.push(TimelineMatch {
                name: item.name().to_string(),
                kind: item.kind(),
                suppressed: item.suppressed(),
                index: item.index(),
                parent: None,
                child_count: item.children().len(),
            });
            out.extend(item.children().iter().map(feature_match));
        }
        out
    }

    /// Exact lookup of one item, nested or not.
    pub fn get(&self, name: &str) -> Option<TimelineMatch> {
        self.flatten().into_iter().find(|item| item.name == name)
    }

    /// Group by exact name.
    pub fn group(&self, name: &str) -> Option<&Group> {
        self.items.iter().find_map(|item| match item {
            TimelineItem::Group(group) if group.name == name => Some(group),
            _ => None,
        })
    }

    /// Resolves `name` to items.
    ///
    /// `exact` compares case-sensitively and yields at most one match;
    /// otherwise every item whose name contains `name`, ignoring case.
    pub fn find_by_name(&self, name: &str, exact: bool) -> Vec<TimelineMatch> {
        if exact {
            return self.get(name).into_iter().collect();
        }
        let needle = name.to_lowercase();
        self.flatten()
            .into_iter()
            .filter(|item| item.name.to_lowercase().contains(&needle))
            .collect()
    }

    /// Case-insensitive regex search over top-level and nested names.
    pub fn find_by_pattern(&self, pattern: &str) -> TimelineResult<Vec<TimelineMatch>> {
        let regex = RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|err| TimelineError::InvalidPattern {
                pattern: pattern.to_string(),
                message: err.to_string(),
            })?;
        Ok(self
            .flatten()
            .into_iter()
            .filter(|item| regex.is_match(&item.name))
            .collect())
    }

    pub fn summarize(&self) -> TimelineSummary {
        let mut summary = TimelineSummary::default();
        for item in self.flatten() {
            match item.kind {
                TimelineItemKind::Group => summary.group_count += 1,
                TimelineItemKind::Feature => {
                    summary.feature_count += 1;
                    if item.suppressed {
                        summary.suppressed_count += 1;
                    } else {
                        summary.active_count += 1;
                    }
                }
            }
        }
        summary.total_items = summary.group_count + summary.feature_count;
        summary
    }
}

fn feature_match(feature: &Feature) -> TimelineMatch {
    TimelineMatch {
        name: feature.name.clone(),
        kind: TimelineItemKind::Feature,
        suppressed: feature.suppressed,
        index: feature.index,
        parent: feature.parent.clone(),
        child_count: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::TimelineTree;
    use crate::model::timeline::{TimelineEntry, TimelineItemKind};
    use crate::timeline::TimelineError;

    fn entries() -> Vec<TimelineEntry> {
        vec![
            TimelineEntry::feature("Base Sketch", 0, false),
            TimelineEntry::group("Fret Slot Cuts", 1, false),
            TimelineEntry::feature("Slot Cut A", 2, false).in_group("Fret Slot Cuts"),
            TimelineEntry::feature("Slot Cut B", 3, false).in_group("Fret Slot Cuts"),
            TimelineEntry::feature("Inlay Pocket", 4, true),
        ]
    }

    #[test]
    fn build_nests_children_in_document_order() {
        let tree = TimelineTree::build(&entries()).expect("tree builds");
        assert_eq!(tree.items().len(), 3);
        let group = tree.group("Fret Slot Cuts").expect("group present");
        let names = group
            .children
            .iter()
            .map(|child| child.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["Slot Cut A", "Slot Cut B"]);
        assert_eq!(group.children[0].parent.as_deref(), Some("Fret Slot Cuts"));
    }

    #[test]
    fn build_rejects_broken_enumerations() {
        let mut duplicate = entries();
        duplicate.push(TimelineEntry::feature("Base Sketch", 9, false));
        assert_eq!(
            TimelineTree::build(&duplicate),
            Err(TimelineError::DuplicateName("Base Sketch".to_string()))
        );

        let orphan = vec![TimelineEntry::feature("Lost", 0, false).in_group("Nowhere")];
        assert!(matches!(
            TimelineTree::build(&orphan),
            Err(TimelineError::UnknownParent { .. })
        ));

        let feature_parent = vec![
            TimelineEntry::feature("Host", 0, false),
            TimelineEntry::feature("Guest", 1, false).in_group("Host"),
        ];
        assert!(matches!(
            TimelineTree::build(&feature_parent),
            Err(TimelineError::ParentNotAGroup { .. })
        ));

        let nested = vec![
            TimelineEntry::group("Outer", 0, false),
            TimelineEntry::group("Inner", 1, false).in_group("Outer"),
        ];
        assert!(matches!(
            TimelineTree::build(&nested),
            Err(TimelineError::NestedGroup { .. })
        ));

        let unordered = vec![
            TimelineEntry::feature("First", 3, false),
            TimelineEntry::feature("Second", 3, false),
        ];
        assert!(matches!(
            TimelineTree::build(&unordered),
            Err(TimelineError::NonIncreasingIndex { .. })
        ));
    }

    #[test]
    fn exact_lookup_is_case_sensitive() {
        let tree = TimelineTree::build(&entries()).expect("tree builds");
        assert_eq!(tree.find_by_name("Slot Cut A", true).len(), 1);
        assert!(tree.find_by_name("slot cut a", true).is_empty());
    }

    #[test]
    fn substring_lookup_spans_nested_items() {
        let tree = TimelineTree::build(&entries()).expect("tree builds");
        let names = tree
            .find_by_name("slot", false)
            .into_iter()
            .map(|item| item.name)
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["Fret Slot Cuts", "Slot Cut A", "Slot Cut B"]);
    }

    #[test]
    fn pattern_search_is_case_insensitive_and_typed_on_error() {
        let tree = TimelineTree::build(&entries()).expect("tree builds");
        let matches = tree.find_by_pattern("^slot cut [ab]$").expect("valid pattern");
        assert_eq!(matches.len(), 2);
        assert!(matches
            .iter()
            .all(|item| item.kind == TimelineItemKind::Feature));

        assert!(matches!(
            tree.find_by_pattern("Slot(("),
            Err(TimelineError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn summary_counts_features_and_groups_separately() {
        let tree = TimelineTree::build(&entries()).expect("tree builds");
        let summary = tree.summarize();
        assert_eq!(summary.group_count, 1);
        assert_eq!(summary.feature_count, 4);
        assert_eq!(summary.total_items, 5);
        assert_eq!(summary.active_count, 3);
        assert_eq!(summary.suppressed_count, 1);
    }

    #[test]
    fn suppressed_group_does_not_flip_child_states() {
        let mut raw = entries();
        raw[1].suppressed = true;
        let tree = TimelineTree::build(&raw).expect("tree builds");
        let summary = tree.summarize();
        assert_eq!(summary.active_count, 3);
        assert!(!tree.get("Slot Cut A").expect("child present").suppressed);
    }
}
