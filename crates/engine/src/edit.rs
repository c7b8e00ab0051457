//! Reversible edits (Command pattern as a closed enum).
//!
//! Each [`ReversibleEdit`] stores enough pre-state to both apply and exactly
//! invert one change. The invariant every variant keeps:
//! `undo(apply(S)) == S` for the rows and columns the edit declares, and an
//! edit never touches anything outside them.
//!
//! Edits report structural side effects through [`EditEffect`] so the owning
//! step can refresh its cached column names and tag set.

use rustc_hash::FxHashSet;

use crate::error::TableError;
use crate::table::{RemovedColumn, Row, RowId, RowLink, Table};
use crate::value::Value;

/// What an applied or undone edit invalidated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EditEffect {
    pub shape_changed: bool,
    pub tags_changed: bool,
}

impl EditEffect {
    const NONE: Self = Self { shape_changed: false, tags_changed: false };
    const SHAPE: Self = Self { shape_changed: true, tags_changed: false };
    const TAGS: Self = Self { shape_changed: false, tags_changed: true };

    fn merge(self, other: Self) -> Self {
        Self {
            shape_changed: self.shape_changed || other.shape_changed,
            tags_changed: self.tags_changed || other.tags_changed,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CellChange {
    pub row: RowId,
    pub before: Value,
    pub after: Value,
}

/// Value changes in a single column.
#[derive(Debug, Clone, PartialEq)]
pub struct CellEdits {
    pub column: String,
    pub changes: Vec<CellChange>,
}

impl CellEdits {
    pub fn new(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            changes: Vec::new(),
        }
    }

    pub fn push(&mut self, row: RowId, before: Value, after: Value) {
        self.changes.push(CellChange { row, before, after });
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    fn write(&self, table: &mut Table, forward: bool) -> Result<(), TableError> {
        if !table.has_column(&self.column) {
            return Err(TableError::UnknownColumn(self.column.clone()));
        }
        if let Some(missing) = self.changes.iter().find(|c| table.row(c.row).is_none()) {
            return Err(TableError::UnknownRow(missing.row));
        }
        for change in &self.changes {
            let value = if forward { &change.after } else { &change.before };
            if let Some(row) = table.row_mut(change.row) {
                row.set(&self.column, value.clone());
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowSetKind {
    Insert,
    Delete,
}

/// A set of rows added to or removed from the table. Each row keeps the
/// position it occupies when present, so re-insertion restores order.
#[derive(Debug, Clone, PartialEq)]
pub struct RowSetEdit {
    pub kind: RowSetKind,
    pub rows: Vec<(usize, Row)>,
}

impl RowSetEdit {
    fn ids(&self) -> FxHashSet<RowId> {
        self.rows.iter().map(|(_, r)| r.id()).collect()
    }

    fn insert(&self, table: &mut Table) -> Result<(), TableError> {
        table.insert_rows(self.rows.clone())
    }

    fn remove(&self, table: &mut Table) -> Result<(), TableError> {
        if let Some((_, missing)) = self.rows.iter().find(|(_, r)| table.row(r.id()).is_none()) {
            return Err(TableError::UnknownRow(missing.id()));
        }
        table.remove_rows(&self.ids());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerOp {
    Add,
    Remove,
}

impl MarkerOp {
    fn inverse(self) -> Self {
        match self {
            MarkerOp::Add => MarkerOp::Remove,
            MarkerOp::Remove => MarkerOp::Add,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReversibleEdit {
    Cells(CellEdits),
    RowSet(RowSetEdit),
    AddColumn { name: String, index: usize, default: Value },
    RemoveColumn { name: String, removed: RemovedColumn },
    MoveColumn { name: String, from: usize, to: usize },
    RenameColumn { from: String, to: String },
    SwapColumns { a: String, b: String },
    Tag { row: RowId, tag: String, op: MarkerOp },
    Link { row: RowId, link: RowLink, op: MarkerOp },
    Reorder { before: Vec<RowId>, after: Vec<RowId> },
    /// Children apply in order and undo in reverse, as one log entry.
    Compound { description: String, edits: Vec<ReversibleEdit> },
}

impl ReversibleEdit {
    /// Rows appended at the end of a table currently holding `len` rows.
    pub fn insert_rows(len: usize, rows: Vec<Row>) -> Self {
        let rows = rows.into_iter().enumerate().map(|(i, r)| (len + i, r)).collect();
        ReversibleEdit::RowSet(RowSetEdit {
            kind: RowSetKind::Insert,
            rows,
        })
    }

    /// Rows about to be deleted, snapshotted from `table` with their current
    /// positions. Ids not in the table are skipped.
    pub fn delete_rows(table: &Table, ids: &FxHashSet<RowId>) -> Self {
        let rows = table
            .rows()
            .iter()
            .enumerate()
            .filter(|(_, r)| ids.contains(&r.id()))
            .map(|(pos, r)| (pos, r.clone()))
            .collect();
        ReversibleEdit::RowSet(RowSetEdit {
            kind: RowSetKind::Delete,
            rows,
        })
    }

    /// Snapshot a column about to be removed from `table`.
    pub fn remove_column(table: &Table, name: &str) -> Result<Self, TableError> {
        let index = table
            .column_index(name)
            .ok_or_else(|| TableError::UnknownColumn(name.to_string()))?;
        let values = table
            .rows()
            .iter()
            .map(|r| (r.id(), r.get(name).cloned().unwrap_or_default()))
            .collect();
        Ok(ReversibleEdit::RemoveColumn {
            name: name.to_string(),
            removed: RemovedColumn { index, values },
        })
    }

    /// True when applying the edit would change nothing.
    pub fn is_noop(&self) -> bool {
        match self {
            ReversibleEdit::Cells(cells) => cells.is_empty(),
            ReversibleEdit::RowSet(set) => set.rows.is_empty(),
            ReversibleEdit::MoveColumn { from, to, .. } => from == to,
            ReversibleEdit::RenameColumn { from, to } => from == to,
            ReversibleEdit::SwapColumns { a, b } => a == b,
            ReversibleEdit::Reorder { before, after } => before == after,
            ReversibleEdit::Compound { edits, .. } => edits.iter().all(ReversibleEdit::is_noop),
            _ => false,
        }
    }

    pub fn description(&self) -> String {
        match self {
            ReversibleEdit::Cells(cells) => {
                format!("Edit {} cell(s) in '{}'", cells.len(), cells.column)
            }
            ReversibleEdit::RowSet(set) => match set.kind {
                RowSetKind::Insert => format!("Add {} row(s)", set.rows.len()),
                RowSetKind::Delete => format!("Delete {} row(s)", set.rows.len()),
            },
            ReversibleEdit::AddColumn { name, .. } => format!("Add column '{name}'"),
            ReversibleEdit::RemoveColumn { name, .. } => format!("Remove column '{name}'"),
            ReversibleEdit::MoveColumn { name, .. } => format!("Move column '{name}'"),
            ReversibleEdit::RenameColumn { from, to } => format!("Rename '{from}' to '{to}'"),
            ReversibleEdit::SwapColumns { a, b } => format!("Swap '{a}' and '{b}'"),
            ReversibleEdit::Tag { tag, op, .. } => match op {
                MarkerOp::Add => format!("Tag '{tag}'"),
                MarkerOp::Remove => format!("Untag '{tag}'"),
            },
            ReversibleEdit::Link { op, .. } => match op {
                MarkerOp::Add => "Link reference".to_string(),
                MarkerOp::Remove => "Unlink reference".to_string(),
            },
            ReversibleEdit::Reorder { .. } => "Reorder rows".to_string(),
            ReversibleEdit::Compound { description, .. } => description.clone(),
        }
    }

    /// Apply the edit (forward / redo direction).
    pub fn apply(&self, table: &mut Table) -> Result<EditEffect, TableError> {
        match self {
            ReversibleEdit::Cells(cells) => {
                cells.write(table, true)?;
                Ok(EditEffect::NONE)
            }
            ReversibleEdit::RowSet(set) => {
                match set.kind {
                    RowSetKind::Insert => set.insert(table)?,
                    RowSetKind::Delete => set.remove(table)?,
                }
                Ok(EditEffect::TAGS)
            }
            ReversibleEdit::AddColumn { name, index, default } => {
                table.add_column(name, Some(*index), default.clone())?;
                Ok(EditEffect::SHAPE)
            }
            ReversibleEdit::RemoveColumn { name, .. } => {
                table.remove_column(name)?;
                Ok(EditEffect::SHAPE)
            }
            ReversibleEdit::MoveColumn { name, to, .. } => {
                table.move_column(name, *to)?;
                Ok(EditEffect::SHAPE)
            }
            ReversibleEdit::RenameColumn { from, to } => {
                table.rename_column(from, to)?;
                Ok(EditEffect::SHAPE)
            }
            ReversibleEdit::SwapColumns { a, b } => {
                table.swap_columns(a, b)?;
                Ok(EditEffect::SHAPE)
            }
            ReversibleEdit::Tag { row, tag, op } => {
                mark_tag(table, *row, tag, *op)?;
                Ok(EditEffect::TAGS)
            }
            ReversibleEdit::Link { row, link, op } => {
                mark_link(table, *row, link, *op)?;
                Ok(EditEffect::NONE)
            }
            ReversibleEdit::Reorder { after, .. } => {
                table.reorder(after)?;
                Ok(EditEffect::NONE)
            }
            ReversibleEdit::Compound { edits, .. } => apply_all(edits, table),
        }
    }

    /// Reverse the edit. Must restore the table to its state before
    /// [`apply`](Self::apply).
    pub fn undo(&self, table: &mut Table) -> Result<EditEffect, TableError> {
        match self {
            ReversibleEdit::Cells(cells) => {
                cells.write(table, false)?;
                Ok(EditEffect::NONE)
            }
            ReversibleEdit::RowSet(set) => {
                match set.kind {
                    RowSetKind::Insert => set.remove(table)?,
                    RowSetKind::Delete => set.insert(table)?,
                }
                Ok(EditEffect::TAGS)
            }
            ReversibleEdit::AddColumn { name, .. } => {
                table.remove_column(name)?;
                Ok(EditEffect::SHAPE)
            }
            ReversibleEdit::RemoveColumn { name, removed } => {
                table.restore_column(name, removed)?;
                Ok(EditEffect::SHAPE)
            }
            ReversibleEdit::MoveColumn { name, from, .. } => {
                table.move_column(name, *from)?;
                Ok(EditEffect::SHAPE)
            }
            ReversibleEdit::RenameColumn { from, to } => {
                table.rename_column(to, from)?;
                Ok(EditEffect::SHAPE)
            }
            ReversibleEdit::SwapColumns { a, b } => {
                table.swap_columns(a, b)?;
                Ok(EditEffect::SHAPE)
            }
            ReversibleEdit::Tag { row, tag, op } => {
                mark_tag(table, *row, tag, op.inverse())?;
                Ok(EditEffect::TAGS)
            }
            ReversibleEdit::Link { row, link, op } => {
                mark_link(table, *row, link, op.inverse())?;
                Ok(EditEffect::NONE)
            }
            ReversibleEdit::Reorder { before, .. } => {
                table.reorder(before)?;
                Ok(EditEffect::NONE)
            }
            ReversibleEdit::Compound { edits, .. } => undo_all(edits, table),
        }
    }
}

fn mark_tag(table: &mut Table, id: RowId, tag: &str, op: MarkerOp) -> Result<(), TableError> {
    let row = table.row_mut(id).ok_or(TableError::UnknownRow(id))?;
    match op {
        MarkerOp::Add => row.add_tag(tag),
        MarkerOp::Remove => row.remove_tag(tag),
    };
    Ok(())
}

fn mark_link(table: &mut Table, id: RowId, link: &RowLink, op: MarkerOp) -> Result<(), TableError> {
    let row = table.row_mut(id).ok_or(TableError::UnknownRow(id))?;
    match op {
        MarkerOp::Add => row.add_link(*link),
        MarkerOp::Remove => row.remove_link(link),
    };
    Ok(())
}

/// Apply children in order. A failing child rolls back the ones before it.
fn apply_all(edits: &[ReversibleEdit], table: &mut Table) -> Result<EditEffect, TableError> {
    let mut effect = EditEffect::NONE;
    for (i, edit) in edits.iter().enumerate() {
        match edit.apply(table) {
            Ok(e) => effect = effect.merge(e),
            Err(err) => {
                for done in edits[..i].iter().rev() {
                    if let Err(rollback) = done.undo(table) {
                        log::error!("compound rollback failed at '{}': {rollback}", done.description());
                    }
                }
                return Err(err);
            }
        }
    }
    Ok(effect)
}

/// Undo children in reverse. A failing child re-applies the ones already undone.
fn undo_all(edits: &[ReversibleEdit], table: &mut Table) -> Result<EditEffect, TableError> {
    let mut effect = EditEffect::NONE;
    for (i, edit) in edits.iter().enumerate().rev() {
        match edit.undo(table) {
            Ok(e) => effect = effect.merge(e),
            Err(err) => {
                for done in &edits[i + 1..] {
                    if let Err(rollback) = done.apply(table) {
                        log::error!("compound rollback failed at '{}': {rollback}", done.description());
                    }
                }
                return Err(err);
            }
        }
    }
    Ok(effect)
}
