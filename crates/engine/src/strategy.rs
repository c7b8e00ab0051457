//! Strategy contracts: the pluggable units of work the runner executes.
//!
//! | contract                | touches                      | runner commits            |
//! |-------------------------|------------------------------|---------------------------|
//! | [`ColumnProcessor`]     | one cell per selected row    | cell edit in current step |
//! | [`RowProcessor`]        | a whole row, on a clone      | new step                  |
//! | [`TableProcessor`]      | the whole table, on a clone  | new step                  |
//! | [`ReferenceProcessor`]  | the table + a reference      | new step                  |
//! | [`ColumnDeleteEvaluator`] / [`RowDeleteEvaluator`] | nothing (decides) | row delete edit |
//! | [`DuplicateFinder`]     | nothing (groups)             | new step after decisions  |
//!
//! Every contract reports failure as a value. A failed call never commits a
//! step or records an edit.

use std::fmt;

use rustc_hash::FxHashSet;

use crate::cell_view::CellView;
use crate::duplicates::DuplicateGroup;
use crate::runner::ReferenceTable;
use crate::table::{Row, Table};

/// A strategy declined to finish. The message is for display only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StrategyFailure {
    pub message: Option<String>,
}

impl StrategyFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
        }
    }

    /// Failure without an explanation.
    pub fn silent() -> Self {
        Self { message: None }
    }
}

impl fmt::Display for StrategyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(msg) => write!(f, "{msg}"),
            None => write!(f, "strategy failed"),
        }
    }
}

impl std::error::Error for StrategyFailure {}

pub type StrategyResult = Result<(), StrategyFailure>;

/// `Ok(true)` marks the row for deletion.
pub type DeleteResult = Result<bool, StrategyFailure>;

/// Which rows a strategy runs over.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RowSelection {
    #[default]
    All,
    /// Row positions in the current table, processed in the given order.
    Positions(Vec<usize>),
}

impl RowSelection {
    /// Resolve against a table of `len` rows. Out-of-range and repeated
    /// positions are dropped.
    pub fn positions(&self, len: usize) -> Vec<usize> {
        match self {
            RowSelection::All => (0..len).collect(),
            RowSelection::Positions(positions) => {
                let mut seen = FxHashSet::default();
                let mut resolved = Vec::with_capacity(positions.len());
                for &pos in positions {
                    if pos >= len {
                        log::warn!("row selection: position {pos} out of range ({len} rows), skipped");
                        continue;
                    }
                    if seen.insert(pos) {
                        resolved.push(pos);
                    }
                }
                resolved
            }
        }
    }
}

impl From<Vec<usize>> for RowSelection {
    fn from(positions: Vec<usize>) -> Self {
        RowSelection::Positions(positions)
    }
}

pub trait ColumnProcessor {
    /// Column whose cells are handed to [`process`](Self::process).
    fn column_name(&self) -> &str;

    fn process(&mut self, cell: &mut CellView) -> StrategyResult;
}

pub trait RowProcessor {
    fn process(&mut self, row: &mut Row) -> StrategyResult;
}

/// Whole-table strategy (joins, splits, tagging, sorting). `rows` holds the
/// selected positions; a processor is free to ignore it when the operation
/// is inherently table-wide.
pub trait TableProcessor {
    fn process(&mut self, table: &mut Table, rows: &[usize]) -> StrategyResult;
}

/// Strategy that reads a registered reference table to annotate the main one.
pub trait ReferenceProcessor {
    /// Registry id of the reference table to read.
    fn reference_id(&self) -> usize;

    fn process(&mut self, table: &mut Table, rows: &[usize], reference: &ReferenceTable) -> StrategyResult;
}

pub trait ColumnDeleteEvaluator {
    fn column_name(&self) -> &str;

    fn evaluate(&mut self, cell: &CellView) -> DeleteResult;
}

pub trait RowDeleteEvaluator {
    fn evaluate(&mut self, row: &Row) -> DeleteResult;
}

/// Produces groups of rows sharing a value, lazily and without mutating.
///
/// Implementations walk rows in table order and must not place a row in more
/// than one group per call.
pub trait DuplicateFinder {
    fn find<'a>(
        &'a self,
        table: &'a Table,
        references: &'a [&'a ReferenceTable],
    ) -> Result<Box<dyn Iterator<Item = DuplicateGroup> + 'a>, StrategyFailure>;
}

// =============================================================================
// Closure adapters
// =============================================================================

pub struct ColumnFn<F> {
    column: String,
    f: F,
}

/// Column processor from a closure.
pub fn column_fn<F>(column: impl Into<String>, f: F) -> ColumnFn<F>
where
    F: FnMut(&mut CellView) -> StrategyResult,
{
    ColumnFn {
        column: column.into(),
        f,
    }
}

impl<F> ColumnProcessor for ColumnFn<F>
where
    F: FnMut(&mut CellView) -> StrategyResult,
{
    fn column_name(&self) -> &str {
        &self.column
    }

    fn process(&mut self, cell: &mut CellView) -> StrategyResult {
        (self.f)(cell)
    }
}

pub struct RowFn<F>(F);

pub fn row_fn<F>(f: F) -> RowFn<F>
where
    F: FnMut(&mut Row) -> StrategyResult,
{
    RowFn(f)
}

impl<F> RowProcessor for RowFn<F>
where
    F: FnMut(&mut Row) -> StrategyResult,
{
    fn process(&mut self, row: &mut Row) -> StrategyResult {
        (self.0)(row)
    }
}

pub struct TableFn<F>(F);

pub fn table_fn<F>(f: F) -> TableFn<F>
where
    F: FnMut(&mut Table, &[usize]) -> StrategyResult,
{
    TableFn(f)
}

impl<F> TableProcessor for TableFn<F>
where
    F: FnMut(&mut Table, &[usize]) -> StrategyResult,
{
    fn process(&mut self, table: &mut Table, rows: &[usize]) -> StrategyResult {
        (self.0)(table, rows)
    }
}

pub struct ColumnDeleteFn<F> {
    column: String,
    f: F,
}

pub fn column_delete_fn<F>(column: impl Into<String>, f: F) -> ColumnDeleteFn<F>
where
    F: FnMut(&CellView) -> DeleteResult,
{
    ColumnDeleteFn {
        column: column.into(),
        f,
    }
}

impl<F> ColumnDeleteEvaluator for ColumnDeleteFn<F>
where
    F: FnMut(&CellView) -> DeleteResult,
{
    fn column_name(&self) -> &str {
        &self.column
    }

    fn evaluate(&mut self, cell: &CellView) -> DeleteResult {
        (self.f)(cell)
    }
}

pub struct RowDeleteFn<F>(F);

pub fn row_delete_fn<F>(f: F) -> RowDeleteFn<F>
where
    F: FnMut(&Row) -> DeleteResult,
{
    RowDeleteFn(f)
}

impl<F> RowDeleteEvaluator for RowDeleteFn<F>
where
    F: FnMut(&Row) -> DeleteResult,
{
    fn evaluate(&mut self, row: &Row) -> DeleteResult {
        (self.0)(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::RowId;
    use crate::value::Value;

    #[test]
    fn test_selection_all() {
        assert_eq!(RowSelection::All.positions(3), vec![0, 1, 2]);
        assert!(RowSelection::All.positions(0).is_empty());
    }

    #[test]
    fn test_selection_preserves_order_and_drops_invalid() {
        let sel = RowSelection::from(vec![2, 0, 7, 2]);
        assert_eq!(sel.positions(3), vec![2, 0]);
    }

    #[test]
    fn test_failure_display() {
        assert_eq!(StrategyFailure::new("no such date").to_string(), "no such date");
        assert_eq!(StrategyFailure::silent().to_string(), "strategy failed");
    }

    #[test]
    fn test_column_fn_adapter() {
        let mut upper = column_fn("name", |cell| {
            let text = cell.text().to_uppercase();
            cell.set_value(text);
            Ok(())
        });
        assert_eq!(upper.column_name(), "name");

        let mut cell = CellView::new(RowId::from_raw(1), "name", Value::from("ada"));
        upper.process(&mut cell).unwrap();
        assert_eq!(cell.value(), &Value::from("ADA"));
        assert!(cell.is_changed());
    }

    #[test]
    fn test_delete_fn_adapter() {
        let mut blank = column_delete_fn("name", |cell| Ok(cell.value().is_null()));
        let cell = CellView::new(RowId::from_raw(1), "name", Value::Null);
        assert_eq!(blank.evaluate(&cell), Ok(true));
    }
}
