//! Stock strategies used by the CLI and handy for callers.

use rustc_hash::FxHashMap;

use crate::cell_view::CellView;
use crate::runner::ReferenceTable;
use crate::strategy::{
    ColumnDeleteEvaluator, ColumnProcessor, DeleteResult, ReferenceProcessor, RowDeleteEvaluator,
    StrategyFailure, StrategyResult, TableProcessor,
};
use crate::table::{Row, RowId, RowLink, Table};
use crate::value::Value;

fn require_column(table: &Table, column: &str) -> StrategyResult {
    if table.has_column(column) {
        Ok(())
    } else {
        Err(StrategyFailure::new(format!("unknown column '{column}'")))
    }
}

// =============================================================================
// Column processors
// =============================================================================

/// Trim surrounding whitespace from text cells. Cells left empty become null.
#[derive(Debug, Clone)]
pub struct TrimWhitespace {
    column: String,
}

impl TrimWhitespace {
    pub fn new(column: impl Into<String>) -> Self {
        Self { column: column.into() }
    }
}

impl ColumnProcessor for TrimWhitespace {
    fn column_name(&self) -> &str {
        &self.column
    }

    fn process(&mut self, cell: &mut CellView) -> StrategyResult {
        if let Some(text) = cell.value().as_str() {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                cell.set_value(Value::Null);
            } else if trimmed.len() != text.len() {
                let trimmed = trimmed.to_string();
                cell.set_value(trimmed);
            }
        }
        Ok(())
    }
}

/// Replace every occurrence of `from` in text cells. `from` is never empty.
#[derive(Debug, Clone)]
pub struct ReplaceText {
    column: String,
    from: String,
    to: String,
}

impl ReplaceText {
    pub fn new(
        column: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Result<Self, StrategyFailure> {
        let from = from.into();
        if from.is_empty() {
            return Err(StrategyFailure::new("replace: search text is empty"));
        }
        Ok(Self {
            column: column.into(),
            from,
            to: to.into(),
        })
    }
}

impl ColumnProcessor for ReplaceText {
    fn column_name(&self) -> &str {
        &self.column
    }

    fn process(&mut self, cell: &mut CellView) -> StrategyResult {
        if let Some(text) = cell.value().as_str() {
            if text.contains(&self.from) {
                let replaced = text.replace(&self.from, &self.to);
                cell.set_value(replaced);
            }
        }
        Ok(())
    }
}

/// Write `value` into null cells.
#[derive(Debug, Clone)]
pub struct FillEmpty {
    column: String,
    value: Value,
}

impl FillEmpty {
    pub fn new(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }
}

impl ColumnProcessor for FillEmpty {
    fn column_name(&self) -> &str {
        &self.column
    }

    fn process(&mut self, cell: &mut CellView) -> StrategyResult {
        if cell.value().is_null() {
            cell.set_value(self.value.clone());
        }
        Ok(())
    }
}

// =============================================================================
// Delete evaluators
// =============================================================================

/// Delete rows whose cell reads as `value` (compared by display text).
#[derive(Debug, Clone)]
pub struct DeleteMatching {
    column: String,
    value: String,
}

impl DeleteMatching {
    pub fn new(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }
}

impl ColumnDeleteEvaluator for DeleteMatching {
    fn column_name(&self) -> &str {
        &self.column
    }

    fn evaluate(&mut self, cell: &CellView) -> DeleteResult {
        Ok(cell.text() == self.value)
    }
}

/// Delete rows with no non-blank value.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteBlankRows;

impl RowDeleteEvaluator for DeleteBlankRows {
    fn evaluate(&mut self, row: &Row) -> DeleteResult {
        Ok(row.values().all(|v| v.text().trim().is_empty()))
    }
}

// =============================================================================
// Table processors
// =============================================================================

/// Stable sort of the selected rows by one column. Unselected rows keep
/// their positions.
#[derive(Debug, Clone)]
pub struct SortRows {
    column: String,
    descending: bool,
}

impl SortRows {
    pub fn ascending(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: false,
        }
    }

    pub fn descending(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: true,
        }
    }
}

impl TableProcessor for SortRows {
    fn process(&mut self, table: &mut Table, rows: &[usize]) -> StrategyResult {
        require_column(table, &self.column)?;

        let mut slots: Vec<usize> = rows.to_vec();
        slots.sort_unstable();

        let null = Value::Null;
        let mut sorted: Vec<(RowId, &Value)> = slots
            .iter()
            .map(|&pos| {
                let row = &table.rows()[pos];
                (row.id(), row.get(&self.column).unwrap_or(&null))
            })
            .collect();
        sorted.sort_by(|a, b| {
            let ord = a.1.sort_cmp(b.1);
            if self.descending {
                ord.reverse()
            } else {
                ord
            }
        });

        let mut order = table.row_ids();
        for (slot, (id, _)) in slots.iter().zip(&sorted) {
            order[*slot] = *id;
        }
        table
            .reorder(&order)
            .map_err(|e| StrategyFailure::new(e.to_string()))
    }
}

/// Tag selected rows whose cell reads as `value`.
#[derive(Debug, Clone)]
pub struct TagWhere {
    column: String,
    value: String,
    tag: String,
}

impl TagWhere {
    pub fn new(column: impl Into<String>, value: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
            tag: tag.into(),
        }
    }
}

impl TableProcessor for TagWhere {
    fn process(&mut self, table: &mut Table, rows: &[usize]) -> StrategyResult {
        require_column(table, &self.column)?;
        for &pos in rows {
            let row = &mut table.rows_mut()[pos];
            if row.get(&self.column).map(Value::text).as_deref() == Some(self.value.as_str()) {
                row.add_tag(&self.tag);
            }
        }
        Ok(())
    }
}

// =============================================================================
// Reference processors
// =============================================================================

/// Link each selected row to every reference row with the same value in
/// `column`, and tag linked rows with `tag` when one is given.
#[derive(Debug, Clone)]
pub struct LinkMatches {
    reference: usize,
    column: String,
    tag: Option<String>,
}

impl LinkMatches {
    pub fn new(reference: usize, column: impl Into<String>) -> Self {
        Self {
            reference,
            column: column.into(),
            tag: None,
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }
}

impl ReferenceProcessor for LinkMatches {
    fn reference_id(&self) -> usize {
        self.reference
    }

    fn process(&mut self, table: &mut Table, rows: &[usize], reference: &ReferenceTable) -> StrategyResult {
        require_column(table, &self.column)?;
        if !reference.table.has_column(&self.column) {
            return Err(StrategyFailure::new(format!(
                "reference '{}' has no column '{}'",
                reference.name, self.column
            )));
        }

        let mut index: FxHashMap<String, Vec<RowId>> = FxHashMap::default();
        for row in reference.table.rows() {
            if let Some(key) = row.get(&self.column).and_then(Value::group_key) {
                index.entry(key).or_default().push(row.id());
            }
        }

        let mut linked = 0usize;
        for &pos in rows {
            let row = &mut table.rows_mut()[pos];
            let Some(key) = row.get(&self.column).and_then(Value::group_key) else {
                continue;
            };
            let Some(matches) = index.get(&key) else { continue };
            for &target in matches {
                row.add_link(RowLink {
                    reference: reference.id,
                    row: target,
                });
            }
            if let Some(tag) = &self.tag {
                row.add_tag(tag);
            }
            linked += 1;
        }
        log::debug!("linked {linked} row(s) against '{}'", reference.name);
        Ok(())
    }
}
