//! Suppression cascade over a document store.
//!
//! # Invariants
//! - Children are always written in their existing timeline order.
//! - Pattern batches apply to direct matches only; a matched group does not
//!   cascade into its children.
//! - Batch operations never abort on a member failure; failures are
//!   collected into the [`CascadeReport`].

use super::tree::{TimelineMatch, TimelineTree};
use super::{kind_label, verb, TimelineError, TimelineResult};
use crate::model::timeline::{Group, TimelineChange, TimelineItemKind};
use crate::repo::document_store::DocumentStore;
use log::{info, warn};

/// How a single-item name is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NameMatch {
    /// Case-sensitive equality.
    #[default]
    Exact,
    /// Case-insensitive substring; must resolve to exactly one item.
    Contains,
}

/// One member of a batch that could not be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub name: String,
    pub message: String,
}

/// Outcome of one cascade operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadeReport {
    /// Names written, in write order.
    pub affected: Vec<String>,
    pub failures: Vec<ItemFailure>,
    /// Resulting flag of a single-item operation.
    pub new_state: Option<bool>,
}

impl CascadeReport {
    pub fn affected_count(&self) -> usize {
        self.affected.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Converts a report with failures into `PartialBatchFailure`.
    pub fn into_result(self) -> TimelineResult<Self> {
        if self.failures.is_empty() {
            Ok(self)
        } else {
            Err(TimelineError::PartialBatchFailure {
                affected: self.affected.len(),
                failures: self.failures,
            })
        }
    }
}

/// Outcome of [`CascadeEngine::apply_changes`], per requested change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeBatchReport {
    /// Requested names that applied, in request order.
    pub applied: Vec<String>,
    /// Requested changes that could not be applied.
    pub failed: Vec<ItemFailure>,
    /// Every name written, cascaded children included.
    pub affected: Vec<String>,
    /// Cascaded children that refused the write.
    pub child_failures: Vec<ItemFailure>,
}

impl ChangeBatchReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty() && self.child_failures.is_empty()
    }
}

/// Cascade operations bound to one store.
pub struct CascadeEngine<'s, S: DocumentStore> {
    store: &'s mut S,
}

impl<'s, S: DocumentStore> CascadeEngine<'s, S> {
    pub fn new(store: &'s mut S) -> Self {
        Self { store }
    }

    /// Fresh tree from the store.
    pub fn tree(&self) -> TimelineResult<TimelineTree> {
        TimelineTree::load(&*self.store)
    }

    pub fn suppress(&mut self, name: &str, matching: NameMatch) -> TimelineResult<CascadeReport> {
        let target = self.resolve_one(name, matching)?;
        self.write_single(&target.name, target.kind, true)
    }

    pub fn unsuppress(&mut self, name: &str, matching: NameMatch) -> TimelineResult<CascadeReport> {
        let target = self.resolve_one(name, matching)?;
        self.write_single(&target.name, target.kind, false)
    }

    /// Flips the item's current flag.
    pub fn toggle(&mut self, name: &str, matching: NameMatch) -> TimelineResult<CascadeReport> {
        let target = self.resolve_one(name, matching)?;
        self.write_single(&target.name, target.kind, !target.suppressed)
    }

    pub fn suppress_group_with_contents(&mut self, group: &str) -> TimelineResult<CascadeReport> {
        self.set_group(group, true, true)
    }

    pub fn unsuppress_group_with_contents(&mut self, group: &str) -> TimelineResult<CascadeReport> {
        self.set_group(group, false, true)
    }

    /// Suppresses every child while the group's own flag stays untouched.
    pub fn suppress_group_contents(&mut self, group: &str) -> TimelineResult<CascadeReport> {
        self.set_group(group, true, false)
    }

    pub fn unsuppress_group_contents(&mut self, group: &str) -> TimelineResult<CascadeReport> {
        self.set_group(group, false, false)
    }

    pub fn suppress_by_pattern(&mut self, pattern: &str) -> TimelineResult<CascadeReport> {
        self.set_by_pattern(pattern, true)
    }

    pub fn unsuppress_by_pattern(&mut self, pattern: &str) -> TimelineResult<CascadeReport> {
        self.set_by_pattern(pattern, false)
    }

    /// Applies a submitted change list in order.
    ///
    /// A `Group` change cascades to its contents. The change itself fails
    /// only when it cannot be resolved or its own flag cannot be written;
    /// children that refuse the write are listed apart and do not fail it.
    pub fn apply_changes(&mut self, changes: &[TimelineChange]) -> ChangeBatchReport {
        let mut batch = ChangeBatchReport::default();
        for change in changes {
            let outcome = match change.kind {
                TimelineItemKind::Group => self.set_group(&change.name, change.suppressed, true),
                TimelineItemKind::Feature => self
                    .resolve_one(&change.name, NameMatch::Exact)
                    .and_then(|target| {
                        self.write_single(&target.name, target.kind, change.suppressed)
                    }),
            };
            match outcome {
                Ok(done) => {
                    batch.applied.push(change.name.clone());
                    batch.affected.extend(done.affected);
                    batch.child_failures.extend(done.failures);
                }
                Err(err) => {
                    warn!(
                        "event=timeline_change module=timeline status=error op={} kind={} code={}",
                        verb(change.suppressed),
                        kind_label(change.kind),
                        err.code()
                    );
                    batch.failed.push(ItemFailure {
                        name: change.name.clone(),
                        message: err.to_string(),
                    });
                }
            }
        }
        info!(
            "event=timeline_batch module=timeline status={} changes={} applied={} affected={} failed={} child_failed={}",
            if batch.is_complete() { "ok" } else { "partial" },
            changes.len(),
            batch.applied.len(),
            batch.affected.len(),
            batch.failed.len(),
            batch.child_failures.len()
        );
        batch
    }

    fn resolve_one(&self, name: &str, matching: NameMatch) -> TimelineResult<TimelineMatch> {
        let tree = self.tree()?;
        let mut matches = tree.find_by_name(name, matching == NameMatch::Exact);
        match matches.len() {
            0 => Err(TimelineError::NotFound(name.to_string())),
            1 => Ok(matches.remove(0)),
            _ => Err(TimelineError::Ambiguous {
                query: name.to_string(),
                candidates: matches.into_iter().map(|item| item.name).collect(),
            }),
        }
    }

    fn resolve_group(&self, name: &str) -> TimelineResult<Group> {
        let tree = self.tree()?;
        if let Some(group) = tree.group(name) {
            return Ok(group.clone());
        }
        match tree.get(name) {
            Some(_) => Err(TimelineError::NotAGroup(name.to_string())),
            None => Err(TimelineError::NotFound(name.to_string())),
        }
    }

    fn write_single(
        &mut self,
        name: &str,
        kind: TimelineItemKind,
        suppressed: bool,
    ) -> TimelineResult<CascadeReport> {
        self.store.set_suppressed(name, suppressed)?;
        info!(
            "event=timeline_set module=timeline status=ok op={} kind={}",
            verb(suppressed),
            kind_label(kind)
        );
        Ok(CascadeReport {
            affected: vec![name.to_string()],
            failures: Vec::new(),
            new_state: Some(suppressed),
        })
    }

    fn set_group(
        &mut self,
        name: &str,
        suppressed: bool,
        include_group: bool,
    ) -> TimelineResult<CascadeReport> {
        let group = self.resolve_group(name)?;
        let mut report = CascadeReport::default();

        if include_group {
            self.store.set_suppressed(&group.name, suppressed)?;
            report.affected.push(group.name.clone());
            report.new_state = Some(suppressed);
        }

        let mut children = group.children.iter().collect::<Vec<_>>();
        children.sort_by_key(|child| child.index);
        for child in children {
            match self.store.set_suppressed(&child.name, suppressed) {
                Ok(()) => report.affected.push(child.name.clone()),
                Err(err) => report.failures.push(ItemFailure {
                    name: child.name.clone(),
                    message: err.to_string(),
                }),
            }
        }

        info!(
            "event=timeline_group module=timeline status={} op={} with_group={} affected={} failed={}",
            if report.is_complete() { "ok" } else { "partial" },
            verb(suppressed),
            include_group,
            report.affected_count(),
            report.failures.len()
        );
        Ok(report)
    }

    fn set_by_pattern(&mut self, pattern: &str, suppressed: bool) -> TimelineResult<CascadeReport> {
        let matches = self.tree()?.find_by_pattern(pattern)?;
        let mut report = CascadeReport::default();
        for target in matches {
            match self.store.set_suppressed(&target.name, suppressed) {
                Ok(()) => report.affected.push(target.name),
                Err(err) => report.failures.push(ItemFailure {
                    name: target.name,
                    message: err.to_string(),
                }),
            }
        }
        info!(
            "event=timeline_pattern module=timeline status={} op={} affected={} failed={}",
            if report.is_complete() { "ok" } else { "partial" },
            verb(suppressed),
            report.affected_count(),
            report.failures.len()
        );
        Ok(report)
    }
}
