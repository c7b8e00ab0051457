// Cleaning passes behind the CLI subcommands. Each one drives the runner
// through the built-in strategies so the CLI and library share one code path.

use tabstep_engine::builtin::{DeleteBlankRows, DeleteMatching, FillEmpty, SortRows, TrimWhitespace};
use tabstep_engine::duplicates::{DuplicateDecision, DuplicateGroup, ResolveReport, ValueDuplicateFinder};
use tabstep_engine::error::RunnerError;
use tabstep_engine::runner::Runner;
use tabstep_engine::strategy::RowSelection;

/// Which row of a duplicate group survives without asking.
///
/// A group formed by one main row and reference matches always keeps that
/// row under either policy, so reference-only duplicates need a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepPolicy {
    First,
    Last,
}

impl KeepPolicy {
    pub fn decide(self, group: &DuplicateGroup) -> Option<DuplicateDecision> {
        let row = match self {
            KeepPolicy::First => group.rows.first(),
            KeepPolicy::Last => group.rows.last(),
        };
        row.map(|id| DuplicateDecision::KeepOne(*id))
    }
}

/// Parse a `column=value` filter.
pub fn parse_where(clause: &str) -> Result<(String, String), String> {
    let (column, value) = clause
        .split_once('=')
        .ok_or_else(|| format!("invalid filter '{clause}': expected column=value"))?;
    let column = column.trim();
    if column.is_empty() {
        return Err(format!("invalid filter '{clause}': empty column name"));
    }
    Ok((column.to_string(), value.to_string()))
}

/// Trim whitespace in the named columns (every column when empty).
/// Returns the number of cells changed.
pub fn trim_columns(runner: &mut Runner, columns: &[String]) -> Result<usize, RunnerError> {
    let targets: Vec<String> = if columns.is_empty() {
        runner.column_names().to_vec()
    } else {
        columns.to_vec()
    };

    let mut changed = 0;
    for column in &targets {
        let report = runner.run_column_strategy(&mut TrimWhitespace::new(column.as_str()), &RowSelection::All)?;
        changed += report.changed;
    }
    Ok(changed)
}

/// Fill empty cells of one column. Returns the number of cells changed.
pub fn fill_column(runner: &mut Runner, column: &str, value: &str) -> Result<usize, RunnerError> {
    let report = runner.run_column_strategy(&mut FillEmpty::new(column, value), &RowSelection::All)?;
    Ok(report.changed)
}

/// Delete blank rows and rows matching any `column=value` filter.
/// Returns the number of rows deleted.
pub fn drop_rows(runner: &mut Runner, blank: bool, filters: &[(String, String)]) -> Result<usize, RunnerError> {
    let mut deleted = 0;
    if blank {
        deleted += runner
            .perform_row_evaluate_delete(&mut DeleteBlankRows, &RowSelection::All)?
            .deleted;
    }
    for (column, value) in filters {
        deleted += runner
            .perform_column_evaluate_delete(&mut DeleteMatching::new(column.as_str(), value.as_str()), &RowSelection::All)?
            .deleted;
    }
    Ok(deleted)
}

/// Stable sort of all rows by one column, committed as a new step.
pub fn sort_rows(runner: &mut Runner, column: &str, descending: bool) -> Result<(), RunnerError> {
    let mut sort = if descending {
        SortRows::descending(column)
    } else {
        SortRows::ascending(column)
    };
    runner.run_table_strategy(&mut sort, &RowSelection::All)?;
    Ok(())
}

/// Group rows by `column` (main table plus the given references) and keep
/// whatever `decide` picks for each group.
pub fn dedupe<F>(
    runner: &mut Runner,
    column: &str,
    references: &[usize],
    decide: F,
) -> Result<ResolveReport, RunnerError>
where
    F: FnMut(&DuplicateGroup) -> Option<DuplicateDecision>,
{
    let finder = ValueDuplicateFinder::new(column);
    runner.resolve_duplicates_with(&finder, references, decide)
}
