//! Optimistic timeline override queue.
//!
//! Overrides are keyed by `type:name` and always expressed against the last
//! confirmed timeline, never against the previous local value.

use crate::model::timeline::{override_key, TimelineChange, TimelineItemKind};
use crate::timeline::{TimelineError, TimelineMatch, TimelineResult, TimelineTree};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingOverride {
    name: String,
    kind: TimelineItemKind,
    suppressed: bool,
}

/// Local-only suppression toggles awaiting submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingTimelineChanges {
    overrides: BTreeMap<String, PendingOverride>,
}

impl PendingTimelineChanges {
    /// Toggles `name` relative to `confirmed` and returns its effective flag.
    ///
    /// Toggling an overridden item removes the override.
    pub fn toggle(&mut self, confirmed: &TimelineTree, name: &str) -> TimelineResult<bool> {
        let item = confirmed
            .get(name)
            .ok_or_else(|| TimelineError::NotFound(name.to_string()))?;
        let key = override_key(item.kind, &item.name);
        if self.overrides.remove(&key).is_some() {
            return Ok(item.suppressed);
        }
        self.overrides.insert(
            key,
            PendingOverride {
                name: item.name.clone(),
                kind: item.kind,
                suppressed: !item.suppressed,
            },
        );
        Ok(!item.suppressed)
    }

    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }

    pub fn len(&self) -> usize {
        self.overrides.len()
    }

    pub fn is_overridden(&self, kind: TimelineItemKind, name: &str) -> bool {
        self.overrides.contains_key(&override_key(kind, name))
    }

    /// Confirmed items with overrides applied, in document order.
    pub fn merged(&self, confirmed: &TimelineTree) -> Vec<TimelineMatch> {
        confirmed
            .flatten()
            .into_iter()
            .map(|mut item| {
                if let Some(pending) = self.overrides.get(&override_key(item.kind, &item.name)) {
                    item.suppressed = pending.suppressed;
                }
                item
            })
            .collect()
    }

    /// Changed items in document order.
    ///
    /// Overrides whose item vanished from `confirmed` are dropped.
    pub fn changes(&self, confirmed: &TimelineTree) -> Vec<TimelineChange> {
        confirmed
            .flatten()
            .into_iter()
            .filter_map(|item| {
                self.overrides
                    .get(&override_key(item.kind, &item.name))
                    .filter(|pending| pending.suppressed != item.suppressed)
                    .map(|pending| TimelineChange {
                        name: pending.name.clone(),
                        kind: pending.kind,
                        suppressed: pending.suppressed,
                    })
            })
            .collect()
    }

    /// Drops every override; called only after a successful batch.
    pub fn clear(&mut self) {
        self.overrides.clear();
    }
}
