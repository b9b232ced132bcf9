//! Display values with bounded undo/redo history.
//!
//! `EditSession` is an immutable snapshot: [`EditSession::reduce`] returns the
//! next snapshot and leaves the receiver untouched, so observers holding an
//! `Arc<EditSession>` never see a value change under them.
//!
//! # Invariants
//! - `values` is total over the baseline's fields.
//! - Total history entries never exceed `history_cap`; whole transactions are
//!   dropped from the oldest end.
//! - A new edit discards every transaction past the cursor.

use crate::config::{EngineConfig, LinkedFields};
use crate::model::parameter::values_equivalent;
use crate::service::baseline::Baseline;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Whether the bass and treble scale lengths move together.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleMode {
    #[default]
    Single,
    Multi,
}

/// One field change inside a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub field: String,
    pub old: String,
    pub new: String,
}

/// Input to [`EditSession::reduce`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditAction {
    Stage { name: String, value: String },
    Undo,
    Redo,
    SetScaleMode(ScaleMode),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    UnknownField(String),
    /// Formula-driven fields cannot be staged.
    NotEditable(String),
}

impl Display for SessionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownField(name) => write!(f, "unknown field: {name}"),
            Self::NotEditable(name) => write!(f, "field is formula-driven: {name}"),
        }
    }
}

impl Error for SessionError {}

pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug, Clone, PartialEq)]
pub struct EditSession {
    values: BTreeMap<String, String>,
    editable: BTreeMap<String, bool>,
    history: VecDeque<Vec<HistoryEntry>>,
    cursor: usize,
    scale_mode: ScaleMode,
    history_cap: usize,
    linked: LinkedFields,
}

impl EditSession {
    /// Fresh session showing the baseline values.
    pub fn new(baseline: &Baseline, scale_mode: ScaleMode, config: &EngineConfig) -> Self {
        Self {
            values: baseline.values(),
            editable: baseline
                .fields()
                .iter()
                .map(|field| (field.name.clone(), field.editable))
                .collect(),
            history: VecDeque::new(),
            cursor: 0,
            scale_mode,
            history_cap: config.history_cap,
            linked: config.linked_fields.clone(),
        }
    }

    /// Fresh session showing `overrides` on top of the baseline values.
    ///
    /// Used for template loads, which change the display without reseeding.
    pub fn with_values(
        baseline: &Baseline,
        overrides: &BTreeMap<String, String>,
        scale_mode: ScaleMode,
        config: &EngineConfig,
    ) -> Self {
        let mut session = Self::new(baseline, scale_mode, config);
        for (name, value) in overrides {
            if let Some(slot) = session.values.get_mut(name) {
                *slot = value.clone();
            }
        }
        session
    }

    /// Infers single mode when both linked fields hold the same value.
    pub fn infer_scale_mode(baseline: &Baseline, linked: &LinkedFields) -> ScaleMode {
        match (baseline.value(&linked.primary), baseline.value(&linked.secondary)) {
            (Some(primary), Some(secondary)) if !values_equivalent(primary, secondary) => {
                ScaleMode::Multi
            }
            _ => ScaleMode::Single,
        }
    }

    /// Returns the next snapshot.
    ///
    /// Staging an unchanged value, undo at the oldest position and redo at
    /// the newest position all return an identical snapshot.
    pub fn reduce(&self, action: EditAction) -> SessionResult<Self> {
        let mut next = self.clone();
        match action {
            EditAction::Stage { name, value } => next.stage(&name, value)?,
            EditAction::Undo => next.undo(),
            EditAction::Redo => next.redo(),
            EditAction::SetScaleMode(mode) => next.scale_mode = mode,
        }
        Ok(next)
    }

    pub fn value(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn values(&self) -> &BTreeMap<String, String> {
        &self.values
    }

    pub fn scale_mode(&self) -> ScaleMode {
        self.scale_mode
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor < self.history.len()
    }

    /// Number of history entries currently retained.
    pub fn history_len(&self) -> usize {
        self.history.iter().map(Vec::len).sum()
    }

    /// Number of undoable transactions.
    pub fn undo_depth(&self) -> usize {
        self.cursor
    }

    fn stage(&mut self, name: &str, value: String) -> SessionResult<()> {
        let current = self
            .values
            .get(name)
            .ok_or_else(|| SessionError::UnknownField(name.to_string()))?;
        if !self.editable.get(name).copied().unwrap_or(false) {
            return Err(SessionError::NotEditable(name.to_string()));
        }
        if *current == value {
            return Ok(());
        }

        let mut transaction = vec![HistoryEntry {
            field: name.to_string(),
            old: current.clone(),
            new: value.clone(),
        }];
        if self.scale_mode == ScaleMode::Single && name == self.linked.primary {
            if let Some(twin) = self.values.get(&self.linked.secondary) {
                if *twin != value {
                    transaction.push(HistoryEntry {
                        field: self.linked.secondary.clone(),
                        old: twin.clone(),
                        new: value.clone(),
                    });
                }
            }
        }

        for entry in &transaction {
            self.values.insert(entry.field.clone(), entry.new.clone());
        }
        self.push_transaction(transaction);
        Ok(())
    }

    fn push_transaction(&mut self, transaction: Vec<HistoryEntry>) {
        self.history.truncate(self.cursor);
        self.history.push_back(transaction);
        while self.history_len() > self.history_cap && self.history.len() > 1 {
            self.history.pop_front();
        }
        self.cursor = self.history.len();
    }

    fn undo(&mut self) {
        if self.cursor == 0 {
            return;
        }
        self.cursor -= 1;
        for entry in self.history[self.cursor].iter().rev() {
            self.values.insert(entry.field.clone(), entry.old.clone());
        }
    }

    fn redo(&mut self) {
        let Some(transaction) = self.history.get(self.cursor) else {
            return;
        };
        for entry in transaction {
            self.values.insert(entry.field.clone(), entry.new.clone());
        }
        self.cursor += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::{EditAction, EditSession, ScaleMode, SessionError};
    use crate::config::EngineConfig;
    use crate::model::parameter::{Parameter, UnitKind};
    use crate::service::baseline::Baseline;

    fn parameter(name: &str, expression: &str, editable: bool) -> Parameter {
        Parameter {
            name: name.to_string(),
            expression: expression.to_string(),
            value: None,
            unit_kind: UnitKind::Length,
            group_id: "scale".to_string(),
            editable,
        }
    }

    fn baseline() -> Baseline {
        Baseline::from_parameters(&[
            parameter("ScaleLengthBass", "25.5 in", true),
            parameter("ScaleLengthTreble", "25.5 in", true),
            parameter("FretCount", "22", true),
            parameter("FretSpacing", "ScaleLengthBass / 17.817", false),
        ])
    }

    fn stage(session: &EditSession, name: &str, value: &str) -> EditSession {
        session
            .reduce(EditAction::Stage {
                name: name.to_string(),
                value: value.to_string(),
            })
            .expect("stage succeeds")
    }

    #[test]
    fn reduce_leaves_previous_snapshot_untouched() {
        let config = EngineConfig::default();
        let first = EditSession::new(&baseline(), ScaleMode::Multi, &config);
        let second = stage(&first, "FretCount", "24");
        assert_eq!(first.value("FretCount"), Some("22"));
        assert_eq!(second.value("FretCount"), Some("24"));
    }

    #[test]
    fn unknown_and_formula_fields_are_rejected() {
        let session = EditSession::new(&baseline(), ScaleMode::Multi, &EngineConfig::default());
        assert_eq!(
            session.reduce(EditAction::Stage {
                name: "Nut".to_string(),
                value: "1".to_string()
            }),
            Err(SessionError::UnknownField("Nut".to_string()))
        );
        assert_eq!(
            session.reduce(EditAction::Stage {
                name: "FretSpacing".to_string(),
                value: "1".to_string()
            }),
            Err(SessionError::NotEditable("FretSpacing".to_string()))
        );
    }

    #[test]
    fn unchanged_stage_records_nothing() {
        let session = EditSession::new(&baseline(), ScaleMode::Multi, &EngineConfig::default());
        let next = stage(&session, "FretCount", "22");
        assert_eq!(next, session);
    }

    #[test]
    fn undo_and_redo_are_inverses_and_idempotent_at_edges() {
        let config = EngineConfig::default();
        let start = EditSession::new(&baseline(), ScaleMode::Multi, &config);
        assert_eq!(start.reduce(EditAction::Undo).expect("undo"), start);

        let edited = stage(&stage(&start, "FretCount", "24"), "FretCount", "21");
        let undone = edited.reduce(EditAction::Undo).expect("undo");
        assert_eq!(undone.value("FretCount"), Some("24"));
        assert_eq!(undone.reduce(EditAction::Redo).expect("redo"), edited);
        assert_eq!(edited.reduce(EditAction::Redo).expect("redo at edge"), edited);

        let redone = undone.reduce(EditAction::Redo).expect("redo");
        assert_eq!(redone.reduce(EditAction::Undo).expect("undo"), undone);
    }

    #[test]
    fn new_edit_discards_redo_tail() {
        let config = EngineConfig::default();
        let start = EditSession::new(&baseline(), ScaleMode::Multi, &config);
        let edited = stage(&stage(&start, "FretCount", "24"), "FretCount", "21");
        let branched = stage(&edited.reduce(EditAction::Undo).expect("undo"), "FretCount", "20");
        assert!(!branched.can_redo());
        assert_eq!(branched.undo_depth(), 2);
    }

    #[test]
    fn single_scale_mode_mirrors_primary_in_one_transaction() {
        let config = EngineConfig::default();
        let start = EditSession::new(&baseline(), ScaleMode::Single, &config);
        let edited = stage(&start, "ScaleLengthBass", "26");
        assert_eq!(edited.value("ScaleLengthTreble"), Some("26"));
        assert_eq!(edited.history_len(), 2);
        assert_eq!(edited.undo_depth(), 1);

        let undone = edited.reduce(EditAction::Undo).expect("undo");
        assert_eq!(undone.value("ScaleLengthBass"), Some("25.5"));
        assert_eq!(undone.value("ScaleLengthTreble"), Some("25.5"));
    }

    #[test]
    fn multi_scale_mode_edits_fields_independently() {
        let start = EditSession::new(&baseline(), ScaleMode::Multi, &EngineConfig::default());
        let edited = stage(&start, "ScaleLengthBass", "26");
        assert_eq!(edited.value("ScaleLengthTreble"), Some("25.5"));
    }

    #[test]
    fn history_cap_drops_oldest_permanently() {
        let config = EngineConfig {
            history_cap: 3,
            ..EngineConfig::default()
        };
        let mut session = EditSession::new(&baseline(), ScaleMode::Multi, &config);
        for value in ["23", "24", "25", "26"] {
            session = stage(&session, "FretCount", value);
        }
        assert_eq!(session.history_len(), 3);
        for _ in 0..10 {
            session = session.reduce(EditAction::Undo).expect("undo");
        }
        assert_eq!(session.value("FretCount"), Some("23"));
        assert!(!session.can_undo());
    }

    #[test]
    fn inferred_scale_mode_follows_linked_values() {
        let linked = EngineConfig::default().linked_fields;
        assert_eq!(
            EditSession::infer_scale_mode(&baseline(), &linked),
            ScaleMode::Single
        );
        let split = Baseline::from_parameters(&[
            parameter("ScaleLengthBass", "27 in", true),
            parameter("ScaleLengthTreble", "25.5 in", true),
        ]);
        assert_eq!(
            EditSession::infer_scale_mode(&split, &linked),
            ScaleMode::Multi
        );
    }
}
