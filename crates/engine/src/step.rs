use std::collections::BTreeSet;

use rustc_hash::FxHashMap;

use crate::edit::{EditEffect, ReversibleEdit};
use crate::error::TableError;
use crate::table::{RowId, Table};

/// One committed position in the timeline: a table snapshot plus its own
/// edit log.
///
/// `current_edit` points at the last applied edit (`None` = none applied).
/// The table only changes through the log, so replaying `undo_edit` down to
/// `None` returns the table as it was committed, unless an explicit
/// `max_edits` cap has dropped the oldest edits.
#[derive(Debug, Clone)]
pub struct Step {
    table: Table,
    column_names: Vec<String>,
    known_tags: BTreeSet<String>,
    edits: Vec<ReversibleEdit>,
    current_edit: Option<usize>,
    original_positions: FxHashMap<RowId, usize>,
    max_edits: Option<usize>,
}

impl Step {
    /// Wrap a committed table. The header is re-derived from the rows in case
    /// a strategy reshaped them.
    pub fn new(table: Table, max_edits: Option<usize>) -> Self {
        Self::with_origin(table, max_edits, None)
    }

    /// Like [`new`](Self::new), but rows already known to `previous` keep the
    /// original index they had there. Rows new to this step are ordered after
    /// all inherited ones, in table order.
    pub fn with_origin(mut table: Table, max_edits: Option<usize>, previous: Option<&Step>) -> Self {
        table.reconcile_columns();

        let inherited = previous.map(|s| &s.original_positions);
        let base = inherited
            .and_then(|m| m.values().max())
            .map_or(0, |max| max + 1);
        let original_positions = table
            .rows()
            .iter()
            .enumerate()
            .map(|(pos, row)| {
                let index = inherited
                    .and_then(|m| m.get(&row.id()).copied())
                    .unwrap_or(base + pos);
                (row.id(), index)
            })
            .collect();

        Self {
            column_names: table.column_names().to_vec(),
            known_tags: table.known_tags(),
            table,
            edits: Vec::new(),
            current_edit: None,
            original_positions,
            max_edits: max_edits.map(|max| max.max(1)),
        }
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    /// In-place access for column strategies. Anything written here must be
    /// recorded with [`record`](Self::record) or reverted by the caller.
    pub(crate) fn table_mut(&mut self) -> &mut Table {
        &mut self.table
    }

    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    pub fn known_tags(&self) -> &BTreeSet<String> {
        &self.known_tags
    }

    pub fn edits(&self) -> &[ReversibleEdit] {
        &self.edits
    }

    pub fn edit_count(&self) -> usize {
        self.edits.len()
    }

    pub fn current_edit_index(&self) -> Option<usize> {
        self.current_edit
    }

    pub fn can_undo(&self) -> bool {
        self.current_edit.is_some()
    }

    pub fn can_redo(&self) -> bool {
        self.next_edit() < self.edits.len()
    }

    /// Index a row held when its lineage first entered the timeline.
    pub fn original_position(&self, row: RowId) -> Option<usize> {
        self.original_positions.get(&row).copied()
    }

    /// Current rows sorted back to their original order. Rows without an
    /// original index (added inside this step) follow, in current order.
    pub fn original_order(&self) -> Vec<RowId> {
        let mut ids = self.table.row_ids();
        ids.sort_by_key(|id| self.original_position(*id).unwrap_or(usize::MAX));
        ids
    }

    fn next_edit(&self) -> usize {
        self.current_edit.map_or(0, |i| i + 1)
    }

    // =========================================================================
    // Edit log
    // =========================================================================

    /// Append an edit that has already been applied to the table. Any undone
    /// edits after the current one are discarded. No-op edits are dropped.
    ///
    /// Returns whether the edit was appended.
    pub(crate) fn record(&mut self, edit: ReversibleEdit, effect: EditEffect) -> bool {
        if edit.is_noop() {
            return false;
        }
        self.edits.truncate(self.next_edit());
        self.edits.push(edit);
        if let Some(max) = self.max_edits {
            if self.edits.len() > max {
                let excess = self.edits.len() - max;
                self.edits.drain(..excess);
                log::debug!("edit log full, dropped {excess} oldest edit(s)");
            }
        }
        self.current_edit = Some(self.edits.len() - 1);
        self.refresh(effect);
        true
    }

    /// Apply `edit` to the table and append it to the log.
    pub fn execute(&mut self, edit: ReversibleEdit) -> Result<bool, TableError> {
        if edit.is_noop() {
            return Ok(false);
        }
        let effect = edit.apply(&mut self.table)?;
        Ok(self.record(edit, effect))
    }

    /// Undo the current edit. `Ok(false)` when nothing is applied.
    pub fn undo_edit(&mut self) -> Result<bool, TableError> {
        let Some(index) = self.current_edit else {
            return Ok(false);
        };
        let effect = self.edits[index].undo(&mut self.table)?;
        self.current_edit = index.checked_sub(1);
        self.refresh(effect);
        Ok(true)
    }

    /// Re-apply the edit after the current one. `Ok(false)` at the tail.
    pub fn redo_edit(&mut self) -> Result<bool, TableError> {
        let index = self.next_edit();
        let Some(edit) = self.edits.get(index) else {
            return Ok(false);
        };
        let effect = edit.apply(&mut self.table)?;
        self.current_edit = Some(index);
        self.refresh(effect);
        Ok(true)
    }

    fn refresh(&mut self, effect: EditEffect) {
        if effect.shape_changed {
            self.column_names = self.table.column_names().to_vec();
        }
        if effect.tags_changed {
            self.known_tags = self.table.known_tags();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edit::{CellEdits, MarkerOp};
    use crate::value::Value;

    fn step() -> Step {
        let table = Table::from_records(
            ["x"],
            vec![vec![Value::from("1")], vec![Value::from("2")], vec![Value::from("3")]],
        )
        .unwrap();
        Step::new(table, None)
    }

    fn rename(from: &str, to: &str) -> ReversibleEdit {
        ReversibleEdit::RenameColumn {
            from: from.into(),
            to: to.into(),
        }
    }

    #[test]
    fn test_new_step_has_empty_log() {
        let s = step();
        assert_eq!(s.current_edit_index(), None);
        assert_eq!(s.edit_count(), 0);
        assert_eq!(s.column_names(), ["x"]);
        assert!(!s.can_undo());
        assert!(!s.can_redo());
    }

    #[test]
    fn test_execute_undo_redo() {
        let mut s = step();
        assert!(s.execute(rename("x", "y")).unwrap());
        assert_eq!(s.column_names(), ["y"]);
        assert_eq!(s.current_edit_index(), Some(0));

        assert!(s.undo_edit().unwrap());
        assert_eq!(s.column_names(), ["x"]);
        assert_eq!(s.current_edit_index(), None);
        assert!(!s.undo_edit().unwrap());

        assert!(s.redo_edit().unwrap());
        assert_eq!(s.column_names(), ["y"]);
        assert!(!s.redo_edit().unwrap());
    }

    #[test]
    fn test_new_edit_discards_undone_tail() {
        let mut s = step();
        s.execute(rename("x", "y")).unwrap();
        s.execute(rename("y", "z")).unwrap();
        s.undo_edit().unwrap();
        s.execute(rename("y", "w")).unwrap();
        assert_eq!(s.edit_count(), 2);
        assert_eq!(s.column_names(), ["w"]);
        assert!(!s.can_redo());
    }

    #[test]
    fn test_noop_edit_is_not_recorded() {
        let mut s = step();
        assert!(!s.execute(ReversibleEdit::Cells(CellEdits::new("x"))).unwrap());
        assert_eq!(s.edit_count(), 0);
    }

    #[test]
    fn test_failed_edit_leaves_log_alone() {
        let mut s = step();
        assert!(s.execute(rename("missing", "y")).is_err());
        assert_eq!(s.edit_count(), 0);
        assert_eq!(s.current_edit_index(), None);
    }

    #[test]
    fn test_log_cap_drops_oldest() {
        let table = Table::from_records(["c0"], vec![vec![Value::Null]]).unwrap();
        let mut s = Step::new(table, Some(3));
        for i in 0..5 {
            s.execute(rename(&format!("c{i}"), &format!("c{}", i + 1))).unwrap();
        }
        assert_eq!(s.edit_count(), 3);
        assert_eq!(s.current_edit_index(), Some(2));
        while s.undo_edit().unwrap() {}
        // the two oldest renames are gone for good
        assert_eq!(s.column_names(), ["c2"]);
    }

    #[test]
    fn test_tag_edit_refreshes_known_tags() {
        let mut s = step();
        let id = s.table().rows()[0].id();
        s.execute(ReversibleEdit::Tag {
            row: id,
            tag: "check".into(),
            op: MarkerOp::Add,
        })
        .unwrap();
        assert!(s.known_tags().contains("check"));
        s.undo_edit().unwrap();
        assert!(s.known_tags().is_empty());
    }

    #[test]
    fn test_original_positions_are_inherited() {
        let first = step();
        let mut table = first.table().clone();
        let mut reversed = table.row_ids();
        reversed.reverse();
        table.reorder(&reversed).unwrap();
        table.push_row(vec![Value::from("4")]);

        let second = Step::with_origin(table, None, Some(&first));
        let ids = second.table().row_ids();
        assert_eq!(second.original_position(ids[0]), Some(2));
        assert!(second.original_position(ids[3]) > Some(2));

        let order = second.original_order();
        let values: Vec<_> = order
            .iter()
            .map(|id| second.table().row(*id).unwrap().get("x").unwrap().text())
            .collect();
        assert_eq!(values, ["1", "2", "3", "4"]);
    }
}
