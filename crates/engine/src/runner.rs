//! Timeline runner: executes strategies against the current step and keeps
//! two positions consistent, the step index (coarse undo/redo between
//! committed snapshots) and each step's edit index (fine undo/redo inside one
//! snapshot).
//!
//! Row, table and reference strategies run on a clone and commit a new step
//! only on success. Column strategies and delete evaluations touch the
//! current step in place and append one edit to its log. A failed call never
//! commits a step or appends an edit.

use std::collections::BTreeSet;

use rustc_hash::FxHashSet;

use crate::cell_view::CellView;
use crate::config::{ColumnFailureMode, RunnerSettings};
use crate::duplicates::{
    decision_channel, DecisionRequest, DecisionSender, DuplicateDecision, DuplicateGroup, ResolveReport,
};
use crate::edit::{CellEdits, MarkerOp, ReversibleEdit};
use crate::error::{RunnerError, TableError};
use crate::step::Step;
use crate::strategy::{
    ColumnDeleteEvaluator, ColumnProcessor, DuplicateFinder, ReferenceProcessor, RowDeleteEvaluator,
    RowProcessor, RowSelection, StrategyFailure, TableProcessor,
};
use crate::table::{RowId, RowLink, Table};
use crate::value::Value;

/// A read-only secondary table registered for cross-table strategies.
/// `id` is its position in the registry.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceTable {
    pub id: usize,
    pub name: String,
    pub table: Table,
}

/// Outcome of a successful column strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ColumnReport {
    /// Cells whose view reported a change.
    pub changed: usize,
    /// Whether an edit was appended to the current step's log.
    pub recorded: bool,
}

/// Outcome of a delete evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteReport {
    pub deleted: usize,
}

#[derive(Debug, Default)]
pub struct Runner {
    steps: Vec<Step>,
    current: Option<usize>,
    references: Vec<ReferenceTable>,
    settings: RunnerSettings,
}

impl Runner {
    /// Start a timeline from a copy of `table`, committed as step 0.
    pub fn new(table: &Table) -> Self {
        Self::with_settings(table, RunnerSettings::default())
    }

    pub fn with_settings(table: &Table, settings: RunnerSettings) -> Self {
        let mut runner = Self {
            settings,
            ..Self::default()
        };
        runner.commit_step(table.clone());
        runner
    }

    pub fn settings(&self) -> &RunnerSettings {
        &self.settings
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn table(&self) -> Option<&Table> {
        self.current_step().ok().map(Step::table)
    }

    /// Column names of the current table; empty before initialization.
    pub fn column_names(&self) -> &[String] {
        self.current_step().map(Step::column_names).unwrap_or(&[])
    }

    pub fn known_tags(&self) -> Option<&BTreeSet<String>> {
        self.current_step().ok().map(Step::known_tags)
    }

    pub fn current_step_index(&self) -> Option<usize> {
        self.current
    }

    /// Last applied edit in the current step, `None` when none is applied.
    pub fn current_edit_index(&self) -> Option<usize> {
        self.current_step().ok().and_then(Step::current_edit_index)
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn current_step(&self) -> Result<&Step, RunnerError> {
        self.current
            .and_then(|i| self.steps.get(i))
            .ok_or(RunnerError::NotInitialized)
    }

    fn current_step_mut(&mut self) -> Result<&mut Step, RunnerError> {
        self.current
            .and_then(|i| self.steps.get_mut(i))
            .ok_or(RunnerError::NotInitialized)
    }

    pub fn references(&self) -> &[ReferenceTable] {
        &self.references
    }

    pub fn reference(&self, id: usize) -> Result<&ReferenceTable, RunnerError> {
        self.references.get(id).ok_or(RunnerError::UnknownReference(id))
    }

    /// Register a copy of `table` under `name`. Returns its id, or `None`
    /// (and registers nothing) when the name is blank.
    pub fn add_reference(&mut self, table: &Table, name: &str) -> Option<usize> {
        if name.trim().is_empty() {
            log::warn!("reference table with empty name ignored");
            return None;
        }
        let id = self.references.len();
        self.references.push(ReferenceTable {
            id,
            name: name.to_string(),
            table: table.clone(),
        });
        log::debug!("registered reference table {id} '{name}'");
        Some(id)
    }

    // =========================================================================
    // Commit
    // =========================================================================

    /// Commit `table` as a new step after the current one. Steps after the
    /// current one are discarded first. Also initializes an empty runner.
    ///
    /// Returns the index of the new (now current) step.
    pub fn commit_step(&mut self, table: Table) -> usize {
        match self.current {
            Some(i) => self.steps.truncate(i + 1),
            None => self.steps.clear(),
        }
        let step = Step::with_origin(table, self.settings.max_edits_per_step, self.steps.last());
        self.steps.push(step);

        if let Some(max) = self.settings.max_steps {
            if self.steps.len() > max {
                let excess = self.steps.len() - max;
                self.steps.drain(..excess);
                log::debug!("timeline full, dropped {excess} oldest step(s)");
            }
        }

        let index = self.steps.len() - 1;
        self.current = Some(index);
        log::debug!("committed step {index} ({} steps)", self.steps.len());
        index
    }

    // =========================================================================
    // Strategies
    // =========================================================================

    /// Run a column processor over the selected rows of the current table,
    /// in place. Changed cells become one edit in the current step's log.
    ///
    /// The call stops at the first failure. Cells changed before it are
    /// restored or kept according to [`RunnerSettings::column_failure`]; no
    /// edit is recorded either way.
    pub fn run_column_strategy(
        &mut self,
        processor: &mut dyn ColumnProcessor,
        selection: &RowSelection,
    ) -> Result<ColumnReport, RunnerError> {
        let mode = self.settings.column_failure;
        let step = self.current_step_mut()?;
        let column = processor.column_name().to_string();
        if !step.table().has_column(&column) {
            return Err(StrategyFailure::new(format!("unknown column '{column}'")).into());
        }

        let table = step.table_mut();
        let positions = selection.positions(table.len());
        let mut cells = CellEdits::new(&column);

        for pos in positions {
            let row = &mut table.rows_mut()[pos];
            let before = row.get(&column).cloned().unwrap_or_default();
            let mut view = CellView::new(row.id(), column.as_str(), before.clone());

            let outcome = processor.process(&mut view);
            if view.is_changed() {
                let after = view.into_value();
                row.set(&column, after.clone());
                cells.push(row.id(), before, after);
            }

            if let Err(failure) = outcome {
                match mode {
                    ColumnFailureMode::Rollback => {
                        for change in cells.changes.iter().rev() {
                            if let Some(row) = table.row_mut(change.row) {
                                row.set(&column, change.before.clone());
                            }
                        }
                    }
                    ColumnFailureMode::KeepApplied => {
                        log::warn!(
                            "column strategy on '{column}' failed, {} changed cell(s) left unrecorded",
                            cells.len()
                        );
                    }
                }
                return Err(failure.into());
            }
        }

        let changed = cells.len();
        let recorded = step.record(ReversibleEdit::Cells(cells), Default::default());
        if recorded {
            log::debug!("column strategy on '{column}' changed {changed} cell(s)");
        }
        Ok(ColumnReport { changed, recorded })
    }

    /// Run a row processor over the selected rows of a clone; commit it.
    pub fn run_row_strategy(
        &mut self,
        processor: &mut dyn RowProcessor,
        selection: &RowSelection,
    ) -> Result<usize, RunnerError> {
        let mut table = self.current_step()?.table().clone();
        for pos in selection.positions(table.len()) {
            processor.process(&mut table.rows_mut()[pos])?;
        }
        Ok(self.commit_step(table))
    }

    /// Run a whole-table processor on a clone; commit it.
    pub fn run_table_strategy(
        &mut self,
        processor: &mut dyn TableProcessor,
        selection: &RowSelection,
    ) -> Result<usize, RunnerError> {
        let mut table = self.current_step()?.table().clone();
        let positions = selection.positions(table.len());
        processor.process(&mut table, &positions)?;
        Ok(self.commit_step(table))
    }

    /// Run a reference processor on a clone, reading the registered reference
    /// table it names; commit the clone.
    pub fn run_reference_strategy(
        &mut self,
        processor: &mut dyn ReferenceProcessor,
        selection: &RowSelection,
    ) -> Result<usize, RunnerError> {
        let mut table = self.current_step()?.table().clone();
        let reference = self.reference(processor.reference_id())?;
        let positions = selection.positions(table.len());
        processor.process(&mut table, &positions, reference)?;
        Ok(self.commit_step(table))
    }

    /// Delete the selected rows whose cell in the evaluator's column is marked.
    pub fn perform_column_evaluate_delete(
        &mut self,
        evaluator: &mut dyn ColumnDeleteEvaluator,
        selection: &RowSelection,
    ) -> Result<DeleteReport, RunnerError> {
        let table = self.current_step()?.table();
        let column = evaluator.column_name().to_string();
        if !table.has_column(&column) {
            return Err(StrategyFailure::new(format!("unknown column '{column}'")).into());
        }

        let mut marked = FxHashSet::default();
        for pos in selection.positions(table.len()) {
            let row = &table.rows()[pos];
            let view = CellView::new(row.id(), column.as_str(), row.get(&column).cloned().unwrap_or_default());
            if evaluator.evaluate(&view)? {
                marked.insert(row.id());
            }
        }
        self.delete_marked(marked)
    }

    /// Delete the selected rows the evaluator marks.
    pub fn perform_row_evaluate_delete(
        &mut self,
        evaluator: &mut dyn RowDeleteEvaluator,
        selection: &RowSelection,
    ) -> Result<DeleteReport, RunnerError> {
        let table = self.current_step()?.table();
        let mut marked = FxHashSet::default();
        for pos in selection.positions(table.len()) {
            let row = &table.rows()[pos];
            if evaluator.evaluate(row)? {
                marked.insert(row.id());
            }
        }
        self.delete_marked(marked)
    }

    fn delete_marked(&mut self, marked: FxHashSet<RowId>) -> Result<DeleteReport, RunnerError> {
        if marked.is_empty() {
            return Ok(DeleteReport::default());
        }
        let step = self.current_step_mut()?;
        let edit = ReversibleEdit::delete_rows(step.table(), &marked);
        step.execute(edit)?;
        log::debug!("deleted {} row(s)", marked.len());
        Ok(DeleteReport { deleted: marked.len() })
    }

    // =========================================================================
    // Duplicate resolution
    // =========================================================================

    /// Walk the finder's groups, asking for a decision on each through
    /// `decisions`, then commit a clone without the rows not kept.
    ///
    /// Exactly one request is outstanding at a time. A closed request channel
    /// or an unanswered request aborts with [`RunnerError::Cancelled`] and
    /// discards every decision made so far.
    pub async fn resolve_duplicates(
        &mut self,
        finder: &dyn DuplicateFinder,
        reference_ids: &[usize],
        decisions: &DecisionSender,
    ) -> Result<ResolveReport, RunnerError> {
        let table = self.current_step()?.table();
        let references = reference_ids
            .iter()
            .map(|&id| self.reference(id))
            .collect::<Result<Vec<_>, _>>()?;

        let mut report = ResolveReport::default();
        let mut doomed: FxHashSet<RowId> = FxHashSet::default();

        for group in finder.find(table, &references)? {
            report.groups += 1;
            let (request, reply) = DecisionRequest::new(group.clone());
            if decisions.send(request).await.is_err() {
                log::debug!("duplicate resolution cancelled: no decision-maker listening");
                return Err(RunnerError::Cancelled);
            }
            let Ok(decision) = reply.recv().await else {
                log::debug!("duplicate resolution cancelled on group '{}'", group.value);
                return Err(RunnerError::Cancelled);
            };

            let kept = decision.kept_rows(&group);
            report.kept += kept.len();
            for id in group.rows.iter().filter(|id| !kept.contains(*id)) {
                doomed.insert(*id);
                report.deleted += 1;
            }
        }

        if doomed.is_empty() {
            return Ok(report);
        }
        let mut resolved = table.clone();
        resolved.remove_rows(&doomed);
        self.commit_step(resolved);
        report.committed = true;
        Ok(report)
    }

    /// Synchronous form of [`resolve_duplicates`](Self::resolve_duplicates).
    /// `decide` answers each group; returning `None` cancels.
    pub fn resolve_duplicates_with<F>(
        &mut self,
        finder: &dyn DuplicateFinder,
        reference_ids: &[usize],
        mut decide: F,
    ) -> Result<ResolveReport, RunnerError>
    where
        F: FnMut(&DuplicateGroup) -> Option<DuplicateDecision>,
    {
        let (tx, rx) = decision_channel();

        let resolve = async move {
            let result = self.resolve_duplicates(finder, reference_ids, &tx).await;
            drop(tx);
            result
        };
        let answer = async move {
            while let Ok(request) = rx.recv().await {
                match decide(request.group()) {
                    Some(decision) => {
                        request.respond(decision);
                    }
                    None => {
                        request.cancel();
                        break;
                    }
                }
            }
        };

        let (result, ()) = smol::block_on(smol::future::zip(resolve, answer));
        result
    }

    // =========================================================================
    // Navigation
    // =========================================================================

    pub fn go_back_step(&mut self) -> bool {
        match self.current {
            Some(i) if i > 0 => {
                self.current = Some(i - 1);
                log::debug!("step {} -> {}", i, i - 1);
                true
            }
            _ => false,
        }
    }

    pub fn go_forward_step(&mut self) -> bool {
        match self.current {
            Some(i) if i + 1 < self.steps.len() => {
                self.current = Some(i + 1);
                log::debug!("step {} -> {}", i, i + 1);
                true
            }
            _ => false,
        }
    }

    pub fn go_back_edit(&mut self) -> bool {
        let Ok(step) = self.current_step_mut() else {
            return false;
        };
        match step.undo_edit() {
            Ok(moved) => moved,
            Err(err) => {
                log::warn!("undo failed: {err}");
                false
            }
        }
    }

    pub fn go_forward_edit(&mut self) -> bool {
        let Ok(step) = self.current_step_mut() else {
            return false;
        };
        match step.redo_edit() {
            Ok(moved) => moved,
            Err(err) => {
                log::warn!("redo failed: {err}");
                false
            }
        }
    }

    // =========================================================================
    // Direct edits
    // =========================================================================

    /// Apply `edit` to the current table and append it to the step's log.
    /// Returns false for an edit that changes nothing.
    pub fn apply_edit(&mut self, edit: ReversibleEdit) -> Result<bool, RunnerError> {
        let description = edit.description();
        let recorded = self.current_step_mut()?.execute(edit)?;
        if recorded {
            log::debug!("edit: {description}");
        }
        Ok(recorded)
    }

    /// Add a column at `index` (or at the end) filled with `default`.
    pub fn add_column(&mut self, name: &str, index: Option<usize>, default: Value) -> Result<bool, RunnerError> {
        let index = index.unwrap_or(self.current_step()?.table().column_names().len());
        self.apply_edit(ReversibleEdit::AddColumn {
            name: name.to_string(),
            index,
            default,
        })
    }

    pub fn remove_column(&mut self, name: &str) -> Result<bool, RunnerError> {
        let edit = ReversibleEdit::remove_column(self.current_step()?.table(), name)?;
        self.apply_edit(edit)
    }

    pub fn move_column(&mut self, name: &str, to: usize) -> Result<bool, RunnerError> {
        let from = self
            .current_step()?
            .table()
            .column_index(name)
            .ok_or_else(|| TableError::UnknownColumn(name.to_string()))?;
        self.apply_edit(ReversibleEdit::MoveColumn {
            name: name.to_string(),
            from,
            to,
        })
    }

    pub fn rename_column(&mut self, from: &str, to: &str) -> Result<bool, RunnerError> {
        self.apply_edit(ReversibleEdit::RenameColumn {
            from: from.to_string(),
            to: to.to_string(),
        })
    }

    pub fn swap_columns(&mut self, a: &str, b: &str) -> Result<bool, RunnerError> {
        self.apply_edit(ReversibleEdit::SwapColumns {
            a: a.to_string(),
            b: b.to_string(),
        })
    }

    /// Append rows built from positional values. Returns their new ids.
    pub fn add_rows(&mut self, records: Vec<Vec<Value>>) -> Result<Vec<RowId>, RunnerError> {
        let step = self.current_step_mut()?;
        let table = step.table_mut();
        let columns = table.column_names().to_vec();
        let rows: Vec<_> = records
            .into_iter()
            .map(|values| {
                let mut row = table.new_row();
                for (name, value) in columns.iter().zip(values) {
                    row.set(name, value);
                }
                row
            })
            .collect();
        let ids = rows.iter().map(|r| r.id()).collect();
        let len = table.len();
        self.apply_edit(ReversibleEdit::insert_rows(len, rows))?;
        Ok(ids)
    }

    /// Tag a row. Returns false (and records nothing) if it already has the tag.
    pub fn tag_row(&mut self, row: RowId, tag: &str) -> Result<bool, RunnerError> {
        self.mark_tag(row, tag, MarkerOp::Add)
    }

    pub fn untag_row(&mut self, row: RowId, tag: &str) -> Result<bool, RunnerError> {
        self.mark_tag(row, tag, MarkerOp::Remove)
    }

    fn mark_tag(&mut self, id: RowId, tag: &str, op: MarkerOp) -> Result<bool, RunnerError> {
        let row = self
            .current_step()?
            .table()
            .row(id)
            .ok_or(TableError::UnknownRow(id))?;
        let present = row.has_tag(tag);
        if present == (op == MarkerOp::Add) {
            return Ok(false);
        }
        self.apply_edit(ReversibleEdit::Tag {
            row: id,
            tag: tag.to_string(),
            op,
        })
    }

    /// Link a row to a row of a registered reference table.
    pub fn link_row(&mut self, row: RowId, link: RowLink) -> Result<bool, RunnerError> {
        self.reference(link.reference)?;
        self.mark_link(row, link, MarkerOp::Add)
    }

    pub fn unlink_row(&mut self, row: RowId, link: RowLink) -> Result<bool, RunnerError> {
        self.mark_link(row, link, MarkerOp::Remove)
    }

    fn mark_link(&mut self, id: RowId, link: RowLink, op: MarkerOp) -> Result<bool, RunnerError> {
        let row = self
            .current_step()?
            .table()
            .row(id)
            .ok_or(TableError::UnknownRow(id))?;
        let present = row.links().contains(&link);
        if present == (op == MarkerOp::Add) {
            return Ok(false);
        }
        self.apply_edit(ReversibleEdit::Link { row: id, link, op })
    }

    /// Replace `source` with new columns `into`, placed where it stood and
    /// filled from `split`. Missing parts are null, extra parts dropped.
    /// Recorded as a single edit.
    pub fn split_column<F>(&mut self, source: &str, into: &[&str], mut split: F) -> Result<bool, RunnerError>
    where
        F: FnMut(&Value) -> Vec<Value>,
    {
        let table = self.current_step()?.table();
        let index = table
            .column_index(source)
            .ok_or_else(|| TableError::UnknownColumn(source.to_string()))?;

        let mut fills: Vec<CellEdits> = into.iter().map(|name| CellEdits::new(*name)).collect();
        for row in table.rows() {
            let parts = split(row.get(source).unwrap_or(&Value::Null));
            for (fill, part) in fills.iter_mut().zip(parts) {
                if !part.is_null() {
                    fill.push(row.id(), Value::Null, part);
                }
            }
        }

        let mut edits: Vec<ReversibleEdit> = into
            .iter()
            .enumerate()
            .map(|(k, name)| ReversibleEdit::AddColumn {
                name: name.to_string(),
                index: index + 1 + k,
                default: Value::Null,
            })
            .collect();
        edits.extend(fills.into_iter().map(ReversibleEdit::Cells));
        edits.push(ReversibleEdit::remove_column(table, source)?);

        self.apply_edit(ReversibleEdit::Compound {
            description: format!("Split '{source}' into {} column(s)", into.len()),
            edits,
        })
    }

    /// Put rows back in the order they had when they first entered the
    /// timeline. Recorded as an edit; false if already in that order.
    pub fn restore_original_order(&mut self) -> Result<bool, RunnerError> {
        let step = self.current_step()?;
        let before = step.table().row_ids();
        let after = step.original_order();
        self.apply_edit(ReversibleEdit::Reorder { before, after })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::duplicates::ValueDuplicateFinder;
    use crate::strategy::{column_delete_fn, column_fn, row_delete_fn, row_fn, table_fn};

    fn xs(values: &[&str]) -> Table {
        Table::from_records(["x"], values.iter().map(|v| vec![Value::from(*v)])).unwrap()
    }

    fn column(runner: &Runner, name: &str) -> Vec<String> {
        runner
            .table()
            .unwrap()
            .rows()
            .iter()
            .map(|r| r.get(name).map(Value::text).unwrap_or_default())
            .collect()
    }

    fn double_x() -> impl ColumnProcessor {
        column_fn("x", |cell| {
            let doubled = cell.text().repeat(2);
            cell.set_value(doubled);
            Ok(())
        })
    }

    #[test]
    fn test_uninitialized_runner() {
        let mut runner = Runner::default();
        assert_eq!(runner.current_step_index(), None);
        assert!(runner.table().is_none());
        assert!(runner.column_names().is_empty());
        assert_eq!(
            runner.run_column_strategy(&mut double_x(), &RowSelection::All),
            Err(RunnerError::NotInitialized)
        );
        assert_eq!(
            runner.run_table_strategy(&mut table_fn(|_, _| Ok(())), &RowSelection::All),
            Err(RunnerError::NotInitialized)
        );
        assert!(!runner.go_back_edit());
        assert!(!runner.go_forward_step());
    }

    #[test]
    fn test_runner_does_not_alias_caller_table() {
        let mut source = xs(&["1"]);
        let runner = Runner::new(&source);
        source.push_row(vec![Value::from("2")]);
        assert_eq!(runner.table().unwrap().len(), 1);
    }

    #[test]
    fn test_column_strategy_appends_one_edit() {
        let mut runner = Runner::new(&xs(&["1", "2"]));
        let report = runner.run_column_strategy(&mut double_x(), &RowSelection::All).unwrap();
        assert_eq!(report, ColumnReport { changed: 2, recorded: true });
        assert_eq!(column(&runner, "x"), ["11", "22"]);
        assert_eq!(runner.current_step().unwrap().edit_count(), 1);
        assert_eq!(runner.step_count(), 1);
    }

    #[test]
    fn test_column_strategy_respects_selection() {
        let mut runner = Runner::new(&xs(&["1", "2", "3"]));
        runner
            .run_column_strategy(&mut double_x(), &RowSelection::from(vec![2, 0]))
            .unwrap();
        assert_eq!(column(&runner, "x"), ["11", "2", "33"]);
    }

    #[test]
    fn test_unchanged_column_strategy_records_nothing() {
        let mut runner = Runner::new(&xs(&["1", "2"]));
        let mut noop = column_fn("x", |_| Ok(()));
        let report = runner.run_column_strategy(&mut noop, &RowSelection::All).unwrap();
        assert!(!report.recorded);
        assert_eq!(runner.current_step().unwrap().edit_count(), 0);
    }

    #[test]
    fn test_column_strategy_failure_rolls_back() {
        let mut runner = Runner::new(&xs(&["1", "2", "3"]));
        let before = runner.table().unwrap().clone();
        let mut failing = column_fn("x", |cell| {
            if cell.text() == "3" {
                return Err(StrategyFailure::new("bad value"));
            }
            cell.set_value("changed");
            Ok(())
        });
        let err = runner.run_column_strategy(&mut failing, &RowSelection::All).unwrap_err();
        assert_eq!(err.to_string(), "bad value");
        assert_eq!(runner.table().unwrap(), &before);
        assert_eq!(runner.current_step().unwrap().edit_count(), 0);
    }

    #[test]
    fn test_column_strategy_failure_keep_applied() {
        let settings = RunnerSettings {
            column_failure: ColumnFailureMode::KeepApplied,
            ..RunnerSettings::default()
        };
        let mut runner = Runner::with_settings(&xs(&["1", "2"]), settings);
        let mut failing = column_fn("x", |cell| {
            if cell.text() == "2" {
                return Err(StrategyFailure::silent());
            }
            cell.set_value("changed");
            Ok(())
        });
        assert!(runner.run_column_strategy(&mut failing, &RowSelection::All).is_err());
        assert_eq!(column(&runner, "x"), ["changed", "2"]);
        assert_eq!(runner.current_step().unwrap().edit_count(), 0);
    }

    #[test]
    fn test_column_strategy_unknown_column() {
        let mut runner = Runner::new(&xs(&["1"]));
        let mut p = column_fn("nope", |_| Ok(()));
        assert!(matches!(
            runner.run_column_strategy(&mut p, &RowSelection::All),
            Err(RunnerError::Strategy(_))
        ));
    }

    #[test]
    fn test_column_edit_undo_redo() {
        let mut runner = Runner::new(&xs(&["1", "2"]));
        runner.run_column_strategy(&mut double_x(), &RowSelection::All).unwrap();
        assert!(runner.go_back_edit());
        assert_eq!(column(&runner, "x"), ["1", "2"]);
        assert_eq!(runner.current_edit_index(), None);
        assert!(!runner.go_back_edit());
        assert!(runner.go_forward_edit());
        assert_eq!(column(&runner, "x"), ["11", "22"]);
        assert!(!runner.go_forward_edit());
    }

    #[test]
    fn test_row_strategy_commits_step() {
        let mut runner = Runner::new(&xs(&["a", "b"]));
        let mut upper = row_fn(|row| {
            let text = row.get("x").map(Value::text).unwrap_or_default();
            row.set("x", text.to_uppercase());
            Ok(())
        });
        assert_eq!(runner.run_row_strategy(&mut upper, &RowSelection::All), Ok(1));
        assert_eq!(column(&runner, "x"), ["A", "B"]);
        assert_eq!(runner.step_count(), 2);

        assert!(runner.go_back_step());
        assert_eq!(column(&runner, "x"), ["a", "b"]);
        assert!(!runner.go_back_step());
        assert!(runner.go_forward_step());
        assert!(!runner.go_forward_step());
    }

    #[test]
    fn test_failed_table_strategy_leaves_timeline_alone() {
        let mut runner = Runner::new(&xs(&["a"]));
        let mut broken = table_fn(|table, _| {
            table.push_row(vec![Value::from("stray")]);
            Err(StrategyFailure::new("join failed"))
        });
        let err = runner.run_table_strategy(&mut broken, &RowSelection::All).unwrap_err();
        assert_eq!(err, RunnerError::Strategy(StrategyFailure::new("join failed")));
        assert_eq!(runner.step_count(), 1);
        assert_eq!(column(&runner, "x"), ["a"]);
    }

    #[test]
    fn test_commit_mid_history_discards_later_steps() {
        let mut runner = Runner::new(&xs(&["a"]));
        let mut add = table_fn(|table, _| {
            table.push_row(vec![Value::from("more")]);
            Ok(())
        });
        runner.run_table_strategy(&mut add, &RowSelection::All).unwrap();
        runner.run_table_strategy(&mut add, &RowSelection::All).unwrap();
        assert_eq!(runner.step_count(), 3);

        runner.go_back_step();
        runner.go_back_step();
        runner.run_table_strategy(&mut add, &RowSelection::All).unwrap();
        assert_eq!(runner.step_count(), 2);
        assert_eq!(runner.current_step_index(), Some(1));
        assert!(!runner.go_forward_step());
    }

    #[test]
    fn test_max_steps_drops_oldest() {
        let settings = RunnerSettings {
            max_steps: Some(3),
            ..RunnerSettings::default()
        };
        let mut runner = Runner::with_settings(&xs(&["a"]), settings);
        let mut add = table_fn(|table, _| {
            table.push_row(vec![Value::Null]);
            Ok(())
        });
        for _ in 0..5 {
            runner.run_table_strategy(&mut add, &RowSelection::All).unwrap();
        }
        assert_eq!(runner.step_count(), 3);
        assert_eq!(runner.current_step_index(), Some(2));
        assert_eq!(runner.table().unwrap().len(), 6);
    }

    #[test]
    fn test_reference_strategy() {
        let mut runner = Runner::new(&xs(&["a", "b"]));
        let id = runner.add_reference(&xs(&["b"]), "known").unwrap();
        assert_eq!(runner.add_reference(&xs(&[]), "  "), None);
        assert_eq!(runner.references().len(), 1);

        struct TagKnown(usize);
        impl ReferenceProcessor for TagKnown {
            fn reference_id(&self) -> usize {
                self.0
            }
            fn process(&mut self, table: &mut Table, rows: &[usize], reference: &ReferenceTable) -> crate::strategy::StrategyResult {
                for &pos in rows {
                    let row = &mut table.rows_mut()[pos];
                    let hit = reference.table.rows().iter().any(|r| r.get("x") == row.get("x"));
                    if hit {
                        row.add_tag("known");
                    }
                }
                Ok(())
            }
        }

        runner
            .run_reference_strategy(&mut TagKnown(id), &RowSelection::All)
            .unwrap();
        assert!(runner.known_tags().unwrap().contains("known"));
        assert!(runner.table().unwrap().rows()[1].has_tag("known"));

        assert_eq!(
            runner.run_reference_strategy(&mut TagKnown(9), &RowSelection::All),
            Err(RunnerError::UnknownReference(9))
        );
    }

    #[test]
    fn test_row_delete_appends_edit() {
        let mut runner = Runner::new(&xs(&["1", "2"]));
        let mut twos = row_delete_fn(|row| Ok(row.get("x") == Some(&Value::from("2"))));
        let report = runner.perform_row_evaluate_delete(&mut twos, &RowSelection::All).unwrap();
        assert_eq!(report.deleted, 1);
        assert_eq!(column(&runner, "x"), ["1"]);
        assert_eq!(runner.step_count(), 1);

        assert!(runner.go_back_edit());
        assert_eq!(column(&runner, "x"), ["1", "2"]);
    }

    #[test]
    fn test_delete_evaluator_failure_deletes_nothing() {
        let mut runner = Runner::new(&xs(&["1", "2", "3"]));
        let mut failing = column_delete_fn("x", |cell| {
            if cell.text() == "3" {
                Err(StrategyFailure::silent())
            } else {
                Ok(true)
            }
        });
        assert!(runner
            .perform_column_evaluate_delete(&mut failing, &RowSelection::All)
            .is_err());
        assert_eq!(runner.table().unwrap().len(), 3);
        assert_eq!(runner.current_step().unwrap().edit_count(), 0);
    }

    #[test]
    fn test_zero_deletions_record_nothing() {
        let mut runner = Runner::new(&xs(&["1"]));
        let mut never = column_delete_fn("x", |_| Ok(false));
        let report = runner
            .perform_column_evaluate_delete(&mut never, &RowSelection::All)
            .unwrap();
        assert_eq!(report.deleted, 0);
        assert_eq!(runner.current_step().unwrap().edit_count(), 0);
    }

    #[test]
    fn test_resolve_duplicates_keep_first() {
        let mut runner = Runner::new(&xs(&["a", "b", "a", "a"]));
        let report = runner
            .resolve_duplicates_with(&ValueDuplicateFinder::new("x"), &[], |group| {
                Some(DuplicateDecision::KeepOne(group.rows[0]))
            })
            .unwrap();
        assert_eq!(report.groups, 1);
        assert_eq!(report.kept, 1);
        assert_eq!(report.deleted, 2);
        assert!(report.committed);
        assert_eq!(runner.step_count(), 2);
        assert_eq!(column(&runner, "x"), ["a", "b"]);
    }

    #[test]
    fn test_resolve_duplicates_cancel() {
        let mut runner = Runner::new(&xs(&["a", "a"]));
        let before = runner.table().unwrap().clone();
        let result = runner.resolve_duplicates_with(&ValueDuplicateFinder::new("x"), &[], |_| None);
        assert_eq!(result, Err(RunnerError::Cancelled));
        assert_eq!(runner.step_count(), 1);
        assert_eq!(runner.table().unwrap(), &before);
    }

    #[test]
    fn test_resolve_duplicates_async_protocol() {
        let mut runner = Runner::new(&xs(&["a", "b", "a", "b"]));
        let (tx, rx) = decision_channel();

        let answer = async move {
            let mut seen = Vec::new();
            while let Ok(request) = rx.recv().await {
                seen.push(request.group().value.text());
                let keep = request.group().rows.clone();
                request.keep_many(keep);
            }
            seen
        };
        let resolve = async {
            let result = runner
                .resolve_duplicates(&ValueDuplicateFinder::new("x"), &[], &tx)
                .await;
            drop(tx);
            result
        };

        let (result, seen) = smol::block_on(smol::future::zip(resolve, answer));
        let report = result.unwrap();
        assert_eq!(seen, ["a", "b"]);
        assert_eq!(report.kept, 4);
        assert!(!report.committed);
        assert_eq!(runner.step_count(), 1);
    }

    #[test]
    fn test_dropped_request_cancels() {
        let mut runner = Runner::new(&xs(&["a", "a"]));
        let (tx, rx) = decision_channel();
        let answer = async move {
            if let Ok(request) = rx.recv().await {
                drop(request);
            }
        };
        let resolve = async {
            runner
                .resolve_duplicates(&ValueDuplicateFinder::new("x"), &[], &tx)
                .await
        };
        let (result, ()) = smol::block_on(smol::future::zip(resolve, answer));
        assert_eq!(result, Err(RunnerError::Cancelled));
        assert_eq!(runner.step_count(), 1);
    }

    #[test]
    fn test_resolve_unknown_reference() {
        let mut runner = Runner::new(&xs(&["a"]));
        let result = runner.resolve_duplicates_with(&ValueDuplicateFinder::new("x"), &[3], |_| None);
        assert_eq!(result, Err(RunnerError::UnknownReference(3)));
    }

    #[test]
    fn test_structural_edits_refresh_column_names() {
        let mut runner = Runner::new(&xs(&["1"]));
        runner.add_column("y", None, Value::from("-")).unwrap();
        runner.rename_column("x", "id").unwrap();
        runner.move_column("y", 0).unwrap();
        assert_eq!(runner.column_names(), ["y", "id"]);
        runner.swap_columns("y", "id").unwrap();
        assert_eq!(runner.column_names(), ["id", "y"]);
        runner.remove_column("y").unwrap();
        assert_eq!(runner.column_names(), ["id"]);

        while runner.go_back_edit() {}
        assert_eq!(runner.column_names(), ["x"]);
        assert_eq!(runner.current_step().unwrap().edit_count(), 5);
    }

    #[test]
    fn test_failed_edit_is_not_recorded() {
        let mut runner = Runner::new(&xs(&["1"]));
        assert_eq!(
            runner.rename_column("missing", "y"),
            Err(RunnerError::Edit(TableError::UnknownColumn("missing".into())))
        );
        assert_eq!(runner.current_step().unwrap().edit_count(), 0);
    }

    #[test]
    fn test_add_rows_and_undo() {
        let mut runner = Runner::new(&xs(&["1"]));
        let ids = runner
            .add_rows(vec![vec![Value::from("2")], vec![Value::from("3")]])
            .unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(column(&runner, "x"), ["1", "2", "3"]);
        runner.go_back_edit();
        assert_eq!(column(&runner, "x"), ["1"]);
    }

    #[test]
    fn test_tag_and_link_rows() {
        let mut runner = Runner::new(&xs(&["1"]));
        let reference = runner.add_reference(&xs(&["1"]), "ledger").unwrap();
        let row = runner.table().unwrap().rows()[0].id();

        assert_eq!(runner.tag_row(row, "paid"), Ok(true));
        assert_eq!(runner.tag_row(row, "paid"), Ok(false));
        assert!(runner.known_tags().unwrap().contains("paid"));

        let target = runner.references()[reference].table.rows()[0].id();
        let link = RowLink { reference, row: target };
        assert_eq!(runner.link_row(row, link), Ok(true));
        assert_eq!(runner.table().unwrap().rows()[0].links(), [link]);
        assert_eq!(
            runner.link_row(row, RowLink { reference: 4, row: target }),
            Err(RunnerError::UnknownReference(4))
        );

        assert_eq!(runner.untag_row(row, "paid"), Ok(true));
        assert!(runner.known_tags().unwrap().is_empty());
        assert_eq!(runner.unlink_row(row, link), Ok(true));
        assert_eq!(runner.current_step().unwrap().edit_count(), 4);

        runner.go_back_edit();
        runner.go_back_edit();
        assert!(runner.table().unwrap().rows()[0].has_tag("paid"));
    }

    #[test]
    fn test_split_column_is_one_edit() {
        let table = Table::from_records(
            ["name", "age"],
            vec![
                vec![Value::from("Ada Lovelace"), Value::from(36i64)],
                vec![Value::from("Plato"), Value::from(80i64)],
            ],
        )
        .unwrap();
        let mut runner = Runner::new(&table);
        runner
            .split_column("name", &["first", "last"], |v| {
                v.text().splitn(2, ' ').map(Value::from).collect()
            })
            .unwrap();
        assert_eq!(runner.column_names(), ["first", "last", "age"]);
        assert_eq!(column(&runner, "last"), ["Lovelace", ""]);
        assert_eq!(runner.current_step().unwrap().edit_count(), 1);

        assert!(runner.go_back_edit());
        assert_eq!(runner.column_names(), ["name", "age"]);
        assert_eq!(column(&runner, "name"), ["Ada Lovelace", "Plato"]);
    }

    #[test]
    fn test_restore_original_order_after_sort_step() {
        let mut runner = Runner::new(&xs(&["b", "c", "a"]));
        let mut sort = table_fn(|table, _| {
            let mut ids: Vec<_> = table.rows().iter().map(|r| (r.get("x").cloned(), r.id())).collect();
            ids.sort_by(|a, b| a.0.clone().unwrap_or_default().sort_cmp(&b.0.clone().unwrap_or_default()));
            let order: Vec<_> = ids.into_iter().map(|(_, id)| id).collect();
            table.reorder(&order).map_err(|e| StrategyFailure::new(e.to_string()))
        });
        runner.run_table_strategy(&mut sort, &RowSelection::All).unwrap();
        assert_eq!(column(&runner, "x"), ["a", "b", "c"]);

        assert_eq!(runner.restore_original_order(), Ok(true));
        assert_eq!(column(&runner, "x"), ["b", "c", "a"]);
        assert_eq!(runner.restore_original_order(), Ok(false));

        runner.go_back_edit();
        assert_eq!(column(&runner, "x"), ["a", "b", "c"]);
    }
}
