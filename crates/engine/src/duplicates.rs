//! Human-in-the-loop duplicate resolution.
//!
//! The runner walks duplicate groups one at a time. For each group it sends a
//! [`DecisionRequest`] over a channel the caller owns and suspends until the
//! request's reply slot is answered. Per group the flow is
//!
//! ```text
//! Scanning -> AwaitingDecision -> Applying  (reply received, next group)
//!                              \-> Aborted   (reply slot dropped / channel closed)
//! ```
//!
//! and after the last group the run is `Completed`: rows scheduled for
//! deletion are removed from a clone that becomes a new step.
//!
//! Only one request is ever outstanding. The runner does not ask the finder
//! for the next group until the current reply slot has been consumed.

use rustc_hash::{FxHashMap, FxHashSet};
use smol::channel::{self, Receiver, Sender};

use crate::runner::ReferenceTable;
use crate::strategy::{DuplicateFinder, StrategyFailure};
use crate::table::{RowId, Table};
use crate::value::Value;

/// A row in a reference table carrying the same value as a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReferenceMatch {
    pub reference: usize,
    pub row: RowId,
}

/// Rows of the main table sharing one value, in table order.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateGroup {
    pub column: String,
    pub value: Value,
    pub rows: Vec<RowId>,
    /// Read-only context: matching rows in the selected reference tables.
    pub reference_matches: Vec<ReferenceMatch>,
}

impl DuplicateGroup {
    pub fn contains(&self, row: RowId) -> bool {
        self.rows.contains(&row)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DuplicateDecision {
    /// Keep exactly this row (single-select).
    KeepOne(RowId),
    /// Keep these rows (multi-select). An empty set discards the whole group.
    KeepMany(Vec<RowId>),
}

impl DuplicateDecision {
    /// Rows of `group` this decision keeps.
    ///
    /// Ids outside the group are ignored. A single-select naming a row
    /// outside the group keeps the whole group rather than deleting it all.
    pub fn kept_rows(&self, group: &DuplicateGroup) -> Vec<RowId> {
        match self {
            DuplicateDecision::KeepOne(id) => {
                if group.contains(*id) {
                    vec![*id]
                } else {
                    log::warn!("duplicate decision keeps {id}, which is not in the group; keeping all");
                    group.rows.clone()
                }
            }
            DuplicateDecision::KeepMany(ids) => {
                let keep: FxHashSet<RowId> = ids.iter().copied().collect();
                let strays = keep.iter().filter(|id| !group.contains(**id)).count();
                if strays > 0 {
                    log::warn!("duplicate decision names {strays} row(s) outside the group, ignored");
                }
                group.rows.iter().copied().filter(|id| keep.contains(id)).collect()
            }
        }
    }
}

/// One group awaiting an answer. Consuming methods answer it; dropping it
/// unanswered cancels the whole resolution.
#[derive(Debug)]
pub struct DecisionRequest {
    group: DuplicateGroup,
    reply: Sender<DuplicateDecision>,
}

impl DecisionRequest {
    pub(crate) fn new(group: DuplicateGroup) -> (Self, Receiver<DuplicateDecision>) {
        let (reply, rx) = channel::bounded(1);
        (Self { group, reply }, rx)
    }

    pub fn group(&self) -> &DuplicateGroup {
        &self.group
    }

    /// Answer the request. Returns false if the runner stopped waiting.
    pub fn respond(self, decision: DuplicateDecision) -> bool {
        self.reply.try_send(decision).is_ok()
    }

    pub fn keep_one(self, row: RowId) -> bool {
        self.respond(DuplicateDecision::KeepOne(row))
    }

    pub fn keep_many(self, rows: Vec<RowId>) -> bool {
        self.respond(DuplicateDecision::KeepMany(rows))
    }

    /// Decline to answer; the runner aborts and commits nothing.
    pub fn cancel(self) {
        self.reply.close();
    }
}

pub type DecisionSender = Sender<DecisionRequest>;
pub type DecisionReceiver = Receiver<DecisionRequest>;

/// Channel the runner posts decision requests on.
pub fn decision_channel() -> (DecisionSender, DecisionReceiver) {
    channel::unbounded()
}

/// Outcome of a completed resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveReport {
    /// Groups offered to the decision-maker.
    pub groups: usize,
    /// Grouped rows kept.
    pub kept: usize,
    /// Grouped rows deleted.
    pub deleted: usize,
    /// Whether a new step was committed.
    pub committed: bool,
}

// =============================================================================
// Built-in finder
// =============================================================================

/// Groups rows with equal values in one column.
///
/// A value forms a group when it appears in two or more main rows, or in one
/// main row and any of the selected reference tables. Nulls never group.
#[derive(Debug, Clone)]
pub struct ValueDuplicateFinder {
    column: String,
}

impl ValueDuplicateFinder {
    pub fn new(column: impl Into<String>) -> Self {
        Self { column: column.into() }
    }
}

impl DuplicateFinder for ValueDuplicateFinder {
    fn find<'a>(
        &'a self,
        table: &'a Table,
        references: &'a [&'a ReferenceTable],
    ) -> Result<Box<dyn Iterator<Item = DuplicateGroup> + 'a>, StrategyFailure> {
        if !table.has_column(&self.column) {
            return Err(StrategyFailure::new(format!("unknown column '{}'", self.column)));
        }

        let mut positions: FxHashMap<String, Vec<usize>> = FxHashMap::default();
        for (pos, row) in table.rows().iter().enumerate() {
            if let Some(key) = row.get(&self.column).and_then(Value::group_key) {
                positions.entry(key).or_default().push(pos);
            }
        }

        let mut in_references: FxHashMap<String, Vec<ReferenceMatch>> = FxHashMap::default();
        for reference in references {
            if !reference.table.has_column(&self.column) {
                return Err(StrategyFailure::new(format!(
                    "reference '{}' has no column '{}'",
                    reference.name, self.column
                )));
            }
            for row in reference.table.rows() {
                if let Some(key) = row.get(&self.column).and_then(Value::group_key) {
                    in_references.entry(key).or_default().push(ReferenceMatch {
                        reference: reference.id,
                        row: row.id(),
                    });
                }
            }
        }

        Ok(Box::new(ValueGroups {
            column: &self.column,
            table,
            positions,
            in_references,
            cursor: 0,
            grouped: FxHashSet::default(),
        }))
    }
}

/// Lazy group iterator: yields the next group only when asked.
struct ValueGroups<'a> {
    column: &'a str,
    table: &'a Table,
    positions: FxHashMap<String, Vec<usize>>,
    in_references: FxHashMap<String, Vec<ReferenceMatch>>,
    cursor: usize,
    grouped: FxHashSet<RowId>,
}

impl Iterator for ValueGroups<'_> {
    type Item = DuplicateGroup;

    fn next(&mut self) -> Option<DuplicateGroup> {
        let table = self.table;
        let rows = table.rows();
        while self.cursor < rows.len() {
            let row = &rows[self.cursor];
            self.cursor += 1;

            if self.grouped.contains(&row.id()) {
                continue;
            }
            let Some(value) = row.get(self.column) else { continue };
            let Some(key) = value.group_key() else { continue };

            let members: Vec<RowId> = self.positions[&key]
                .iter()
                .map(|&pos| rows[pos].id())
                .filter(|id| !self.grouped.contains(id))
                .collect();
            let reference_matches = self.in_references.get(&key).cloned().unwrap_or_default();

            if members.len() < 2 && reference_matches.is_empty() {
                continue;
            }

            self.grouped.extend(members.iter().copied());
            return Some(DuplicateGroup {
                column: self.column.to_string(),
                value: value.clone(),
                rows: members,
                reference_matches,
            });
        }
        None
    }
}
