use crate::table::RowId;
use crate::value::Value;

/// Accessor to one (row, column) value with change tracking.
///
/// Column strategies receive `&mut CellView`, delete evaluators `&CellView`.
/// `changed` flips the first time a different value is written and never
/// resets, even if a later write restores the original.
#[derive(Debug, Clone, PartialEq)]
pub struct CellView {
    row: RowId,
    column: String,
    value: Value,
    changed: bool,
}

impl CellView {
    pub fn new(row: RowId, column: impl Into<String>, value: Value) -> Self {
        Self {
            row,
            column: column.into(),
            value,
            changed: false,
        }
    }

    pub fn row(&self) -> RowId {
        self.row
    }

    pub fn column_name(&self) -> &str {
        &self.column
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Current value rendered as text (null is empty).
    pub fn text(&self) -> String {
        self.value.text()
    }

    pub fn set_value(&mut self, value: impl Into<Value>) {
        let value = value.into();
        if value != self.value {
            self.changed = true;
            self.value = value;
        }
    }

    pub fn is_changed(&self) -> bool {
        self.changed
    }

    pub fn into_value(self) -> Value {
        self.value
    }
}
