use std::fmt;

use crate::strategy::StrategyFailure;
use crate::table::RowId;

/// Structural failures raised by [`Table`](crate::table::Table) operations
/// and by reversible edits replayed against a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableError {
    /// No column with this name exists.
    UnknownColumn(String),
    /// A column with this name already exists.
    DuplicateColumn(String),
    /// Column index past the end of the header.
    ColumnIndexOutOfRange { index: usize, len: usize },
    /// No row with this id exists.
    UnknownRow(RowId),
    /// A row with this id is already present.
    DuplicateRow(RowId),
    /// A reorder did not name every row exactly once.
    NotAPermutation { expected: usize, found: usize },
}

impl fmt::Display for TableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownColumn(name) => write!(f, "unknown column '{name}'"),
            Self::DuplicateColumn(name) => write!(f, "column '{name}' already exists"),
            Self::ColumnIndexOutOfRange { index, len } => {
                write!(f, "column index {index} out of range (table has {len} columns)")
            }
            Self::UnknownRow(id) => write!(f, "unknown row {id}"),
            Self::DuplicateRow(id) => write!(f, "row {id} is already in the table"),
            Self::NotAPermutation { expected, found } => {
                write!(f, "row order names {found} rows, table has {expected}")
            }
        }
    }
}

impl std::error::Error for TableError {}

/// Failures returned by [`Runner`](crate::runner::Runner) operations.
///
/// Strategy failures are values, not panics: the runner never commits a step
/// or records an edit for a call that returns one of these.
#[derive(Debug, Clone, PartialEq)]
pub enum RunnerError {
    /// No current step exists.
    NotInitialized,
    /// A strategy, evaluator or finder reported failure.
    Strategy(StrategyFailure),
    /// The duplicate decision-maker declined to answer.
    Cancelled,
    /// No reference table is registered under this id.
    UnknownReference(usize),
    /// An edit could not be applied to the current table.
    Edit(TableError),
}

impl RunnerError {
    /// Short machine-readable code, stable across releases.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotInitialized => "not_initialized",
            Self::Strategy(_) => "strategy_failure",
            Self::Cancelled => "cancelled",
            Self::UnknownReference(_) => "unknown_reference",
            Self::Edit(_) => "edit_failed",
        }
    }
}

impl fmt::Display for RunnerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInitialized => write!(f, "no table loaded"),
            Self::Strategy(failure) => write!(f, "{failure}"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::UnknownReference(id) => write!(f, "unknown reference table {id}"),
            Self::Edit(err) => write!(f, "edit failed: {err}"),
        }
    }
}

impl std::error::Error for RunnerError {}

impl From<StrategyFailure> for RunnerError {
    fn from(failure: StrategyFailure) -> Self {
        Self::Strategy(failure)
    }
}

impl From<TableError> for RunnerError {
    fn from(err: TableError) -> Self {
        Self::Edit(err)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    /// TOML parse / deserialization error.
    Parse(String),
    /// A setting is out of its allowed range.
    Validation(String),
    /// IO error reading the settings file.
    Io(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parse(msg) => write!(f, "config parse error: {msg}"),
            Self::Validation(msg) => write!(f, "config validation error: {msg}"),
            Self::Io(msg) => write!(f, "IO error: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}
