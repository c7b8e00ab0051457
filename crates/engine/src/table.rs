//! In-memory table: ordered rows of ordered, string-keyed fields.
//!
//! Rows carry a [`RowId`] issued by the owning table. The id survives
//! `clone()`, sorting and re-insertion, so edits can find "the same" row
//! after intervening structural changes without relying on positions.
//!
//! Shape invariant: after any completed operation the header and every row
//! hold the same field names in the same order. Structural operations here
//! keep it; strategies that reshape rows by hand are responsible for it.

use std::collections::BTreeSet;
use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::error::TableError;
use crate::value::Value;

/// Stable row handle, unique within a table and its clones.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowId(u64);

impl RowId {
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Cross-table reference marker: this row matched `row` in reference table
/// `reference` (an index into the runner's reference registry).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowLink {
    pub reference: usize,
    pub row: RowId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    id: RowId,
    fields: Vec<(String, Value)>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    links: Vec<RowLink>,
}

impl Row {
    fn new(id: RowId, fields: Vec<(String, Value)>) -> Self {
        Self {
            id,
            fields,
            tags: BTreeSet::new(),
            links: Vec::new(),
        }
    }

    pub fn id(&self) -> RowId {
        self.id
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields.iter().find(|(name, _)| name == column).map(|(_, v)| v)
    }

    /// Set a field, returning the previous value. A missing field is
    /// appended at the end of the row.
    pub fn set(&mut self, column: &str, value: impl Into<Value>) -> Option<Value> {
        let value = value.into();
        match self.fields.iter_mut().find(|(name, _)| name == column) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.fields.push((column.to_string(), value));
                None
            }
        }
    }

    pub fn fields(&self) -> &[(String, Value)] {
        &self.fields
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.fields.iter().map(|(_, v)| v)
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Returns false if the tag was already present.
    pub fn add_tag(&mut self, tag: &str) -> bool {
        self.tags.insert(tag.to_string())
    }

    /// Returns false if the tag was not present.
    pub fn remove_tag(&mut self, tag: &str) -> bool {
        self.tags.remove(tag)
    }

    pub fn links(&self) -> &[RowLink] {
        &self.links
    }

    /// Returns false if an identical link already exists.
    pub fn add_link(&mut self, link: RowLink) -> bool {
        if self.links.contains(&link) {
            return false;
        }
        self.links.push(link);
        true
    }

    /// Returns false if no such link exists.
    pub fn remove_link(&mut self, link: &RowLink) -> bool {
        match self.links.iter().position(|l| l == link) {
            Some(idx) => {
                self.links.remove(idx);
                true
            }
            None => false,
        }
    }

    fn insert_field(&mut self, index: usize, column: &str, value: Value) {
        let index = index.min(self.fields.len());
        self.fields.insert(index, (column.to_string(), value));
    }

    fn remove_field(&mut self, column: &str) -> Option<Value> {
        let idx = self.fields.iter().position(|(name, _)| name == column)?;
        Some(self.fields.remove(idx).1)
    }

    fn rename_field(&mut self, from: &str, to: &str) {
        if let Some((name, _)) = self.fields.iter_mut().find(|(name, _)| name == from) {
            *name = to.to_string();
        }
    }

    fn move_field(&mut self, column: &str, to: usize) {
        if let Some(idx) = self.fields.iter().position(|(name, _)| name == column) {
            let field = self.fields.remove(idx);
            let to = to.min(self.fields.len());
            self.fields.insert(to, field);
        }
    }

    fn swap_fields(&mut self, a: &str, b: &str) {
        let ia = self.fields.iter().position(|(name, _)| name == a);
        let ib = self.fields.iter().position(|(name, _)| name == b);
        if let (Some(ia), Some(ib)) = (ia, ib) {
            self.fields.swap(ia, ib);
        }
    }
}

/// Values removed together with a column, keyed by row.
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedColumn {
    pub index: usize,
    pub values: Vec<(RowId, Value)>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Row>,
    next_row_id: u64,
}

impl Table {
    /// Create an empty table with the given header.
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Result<Self, TableError> {
        let mut header: Vec<String> = Vec::new();
        for name in columns {
            let name = name.into();
            if header.contains(&name) {
                return Err(TableError::DuplicateColumn(name));
            }
            header.push(name);
        }
        Ok(Self {
            columns: header,
            rows: Vec::new(),
            next_row_id: 0,
        })
    }

    /// Build a table from a header and positional records. Short records are
    /// padded with nulls, long ones truncated to the header width.
    pub fn from_records<S, R>(columns: impl IntoIterator<Item = S>, records: R) -> Result<Self, TableError>
    where
        S: Into<String>,
        R: IntoIterator<Item = Vec<Value>>,
    {
        let mut table = Self::new(columns)?;
        for record in records {
            table.push_row(record);
        }
        Ok(table)
    }

    fn issue_id(&mut self) -> RowId {
        let id = RowId(self.next_row_id);
        self.next_row_id += 1;
        id
    }

    /// Append a row built from positional values.
    pub fn push_row(&mut self, values: Vec<Value>) -> RowId {
        let row = self.new_row_from(values);
        let id = row.id;
        self.rows.push(row);
        id
    }

    /// Create a detached row with a fresh id and every column set to null.
    /// The row is not part of the table until appended or inserted.
    pub fn new_row(&mut self) -> Row {
        self.new_row_from(Vec::new())
    }

    fn new_row_from(&mut self, values: Vec<Value>) -> Row {
        let id = self.issue_id();
        let mut values = values.into_iter();
        let fields = self
            .columns
            .iter()
            .map(|name| (name.clone(), values.next().unwrap_or_default()))
            .collect();
        Row::new(id, fields)
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Mutable access to rows in place. The row list itself (count and order)
    /// only changes through the row operations below.
    pub fn rows_mut(&mut self) -> &mut [Row] {
        &mut self.rows
    }

    pub fn row_at(&self, position: usize) -> Option<&Row> {
        self.rows.get(position)
    }

    pub fn row(&self, id: RowId) -> Option<&Row> {
        self.rows.iter().find(|r| r.id == id)
    }

    pub fn row_mut(&mut self, id: RowId) -> Option<&mut Row> {
        self.rows.iter_mut().find(|r| r.id == id)
    }

    pub fn position(&self, id: RowId) -> Option<usize> {
        self.rows.iter().position(|r| r.id == id)
    }

    pub fn row_ids(&self) -> Vec<RowId> {
        self.rows.iter().map(|r| r.id).collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Union of tags across all rows.
    pub fn known_tags(&self) -> BTreeSet<String> {
        self.rows.iter().flat_map(|r| r.tags.iter().cloned()).collect()
    }

    /// Re-derive the header from the first row, after a strategy reshaped
    /// rows directly. An empty table keeps its header.
    pub fn reconcile_columns(&mut self) {
        if let Some(first) = self.rows.first() {
            self.columns = first.field_names().map(str::to_string).collect();
        }
    }

    // =========================================================================
    // Column structure
    // =========================================================================

    /// Insert a column at `index` (or at the end), filling every row with
    /// `default`. Returns the index it landed at.
    pub fn add_column(&mut self, name: &str, index: Option<usize>, default: Value) -> Result<usize, TableError> {
        if self.has_column(name) {
            return Err(TableError::DuplicateColumn(name.to_string()));
        }
        let index = index.unwrap_or(self.columns.len());
        if index > self.columns.len() {
            return Err(TableError::ColumnIndexOutOfRange {
                index,
                len: self.columns.len(),
            });
        }
        self.columns.insert(index, name.to_string());
        for row in &mut self.rows {
            row.insert_field(index, name, default.clone());
        }
        Ok(index)
    }

    /// Remove a column, returning its former index and every row's value.
    pub fn remove_column(&mut self, name: &str) -> Result<RemovedColumn, TableError> {
        let index = self
            .column_index(name)
            .ok_or_else(|| TableError::UnknownColumn(name.to_string()))?;
        self.columns.remove(index);
        let values = self
            .rows
            .iter_mut()
            .map(|row| (row.id, row.remove_field(name).unwrap_or_default()))
            .collect();
        Ok(RemovedColumn { index, values })
    }

    /// Inverse of [`remove_column`](Self::remove_column).
    pub fn restore_column(&mut self, name: &str, removed: &RemovedColumn) -> Result<(), TableError> {
        self.add_column(name, Some(removed.index), Value::Null)?;
        let by_row: FxHashMap<RowId, &Value> = removed.values.iter().map(|(id, v)| (*id, v)).collect();
        for row in &mut self.rows {
            if let Some(value) = by_row.get(&row.id) {
                row.set(name, (*value).clone());
            }
        }
        Ok(())
    }

    /// Move a column to `to`, returning the index it came from.
    pub fn move_column(&mut self, name: &str, to: usize) -> Result<usize, TableError> {
        let from = self
            .column_index(name)
            .ok_or_else(|| TableError::UnknownColumn(name.to_string()))?;
        if to >= self.columns.len() {
            return Err(TableError::ColumnIndexOutOfRange {
                index: to,
                len: self.columns.len(),
            });
        }
        let column = self.columns.remove(from);
        self.columns.insert(to, column);
        for row in &mut self.rows {
            row.move_field(name, to);
        }
        Ok(from)
    }

    pub fn rename_column(&mut self, from: &str, to: &str) -> Result<(), TableError> {
        let index = self
            .column_index(from)
            .ok_or_else(|| TableError::UnknownColumn(from.to_string()))?;
        if from == to {
            return Ok(());
        }
        if self.has_column(to) {
            return Err(TableError::DuplicateColumn(to.to_string()));
        }
        self.columns[index] = to.to_string();
        for row in &mut self.rows {
            row.rename_field(from, to);
        }
        Ok(())
    }

    pub fn swap_columns(&mut self, a: &str, b: &str) -> Result<(), TableError> {
        let ia = self
            .column_index(a)
            .ok_or_else(|| TableError::UnknownColumn(a.to_string()))?;
        let ib = self
            .column_index(b)
            .ok_or_else(|| TableError::UnknownColumn(b.to_string()))?;
        self.columns.swap(ia, ib);
        for row in &mut self.rows {
            row.swap_fields(a, b);
        }
        Ok(())
    }

    // =========================================================================
    // Row list
    // =========================================================================

    fn check_new_ids<'a>(&self, incoming: impl Iterator<Item = &'a Row>) -> Result<(), TableError> {
        let mut seen: FxHashSet<RowId> = self.rows.iter().map(|r| r.id).collect();
        for row in incoming {
            if !seen.insert(row.id) {
                return Err(TableError::DuplicateRow(row.id));
            }
        }
        Ok(())
    }

    fn observe_ids<'a>(&mut self, rows: impl Iterator<Item = &'a Row>) {
        for row in rows {
            self.next_row_id = self.next_row_id.max(row.id.0 + 1);
        }
    }

    pub fn append_rows(&mut self, rows: Vec<Row>) -> Result<(), TableError> {
        self.check_new_ids(rows.iter())?;
        self.observe_ids(rows.iter());
        self.rows.extend(rows);
        Ok(())
    }

    /// Insert rows at the given positions. Positions are applied in ascending
    /// order, so they refer to the final layout; anything past the end is
    /// appended.
    pub fn insert_rows(&mut self, rows: Vec<(usize, Row)>) -> Result<(), TableError> {
        self.check_new_ids(rows.iter().map(|(_, r)| r))?;
        let mut rows = rows;
        rows.sort_by_key(|(pos, _)| *pos);
        self.observe_ids(rows.iter().map(|(_, r)| r));
        for (pos, row) in rows {
            let pos = pos.min(self.rows.len());
            self.rows.insert(pos, row);
        }
        Ok(())
    }

    /// Remove every row whose id is in `ids`, returning them with the
    /// positions they occupied. Unknown ids are ignored.
    pub fn remove_rows(&mut self, ids: &FxHashSet<RowId>) -> Vec<(usize, Row)> {
        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(self.rows.len());
        for (pos, row) in std::mem::take(&mut self.rows).into_iter().enumerate() {
            if ids.contains(&row.id) {
                removed.push((pos, row));
            } else {
                kept.push(row);
            }
        }
        self.rows = kept;
        removed
    }

    /// Swap in an entirely new row list, returning the old one.
    pub fn replace_rows(&mut self, rows: Vec<Row>) -> Result<Vec<Row>, TableError> {
        let mut seen = FxHashSet::default();
        for row in &rows {
            if !seen.insert(row.id) {
                return Err(TableError::DuplicateRow(row.id));
            }
        }
        self.observe_ids(rows.iter());
        Ok(std::mem::replace(&mut self.rows, rows))
    }

    /// Reorder rows to match `order`, which must name every row exactly once.
    pub fn reorder(&mut self, order: &[RowId]) -> Result<(), TableError> {
        if order.len() != self.rows.len() {
            return Err(TableError::NotAPermutation {
                expected: self.rows.len(),
                found: order.len(),
            });
        }
        let positions: FxHashMap<RowId, usize> =
            self.rows.iter().enumerate().map(|(pos, r)| (r.id, pos)).collect();
        let mut seen = FxHashSet::default();
        for id in order {
            if !positions.contains_key(id) {
                return Err(TableError::UnknownRow(*id));
            }
            if !seen.insert(*id) {
                return Err(TableError::DuplicateRow(*id));
            }
        }

        let mut slots: Vec<Option<Row>> = std::mem::take(&mut self.rows).into_iter().map(Some).collect();
        self.rows = order
            .iter()
            .filter_map(|id| slots[positions[id]].take())
            .collect();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table::from_records(
            ["name", "qty"],
            vec![
                vec![Value::from("apple"), Value::from("3")],
                vec![Value::from("pear"), Value::from("5")],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_new_rejects_duplicate_header() {
        assert_eq!(
            Table::new(["a", "a"]).unwrap_err(),
            TableError::DuplicateColumn("a".into())
        );
    }

    #[test]
    fn test_push_row_pads_and_truncates() {
        let mut table = Table::new(["a", "b"]).unwrap();
        table.push_row(vec![Value::from("1")]);
        table.push_row(vec![Value::from("1"), Value::from("2"), Value::from("3")]);
        assert_eq!(table.rows()[0].get("b"), Some(&Value::Null));
        assert_eq!(table.rows()[1].fields().len(), 2);
    }

    #[test]
    fn test_ids_survive_clone() {
        let table = sample();
        let clone = table.clone();
        assert_eq!(table.row_ids(), clone.row_ids());
        let mut clone = clone;
        let fresh = clone.new_row();
        assert!(!table.row_ids().contains(&fresh.id()));
    }

    #[test]
    fn test_add_and_remove_column_roundtrip() {
        let mut table = sample();
        let before = table.clone();

        assert_eq!(table.add_column("price", Some(1), Value::from("0")).unwrap(), 1);
        assert_eq!(table.column_names(), ["name", "price", "qty"]);
        assert_eq!(
            table.rows()[0].field_names().collect::<Vec<_>>(),
            vec!["name", "price", "qty"]
        );

        let removed = table.remove_column("name").unwrap();
        assert_eq!(removed.index, 0);
        assert_eq!(removed.values[1].1, Value::from("pear"));

        table.restore_column("name", &removed).unwrap();
        table.remove_column("price").unwrap();
        assert_eq!(table, before);
    }

    #[test]
    fn test_add_column_errors() {
        let mut table = sample();
        assert_eq!(
            table.add_column("qty", None, Value::Null).unwrap_err(),
            TableError::DuplicateColumn("qty".into())
        );
        assert_eq!(
            table.add_column("x", Some(9), Value::Null).unwrap_err(),
            TableError::ColumnIndexOutOfRange { index: 9, len: 2 }
        );
    }

    #[test]
    fn test_move_rename_swap() {
        let mut table = sample();
        table.add_column("note", None, Value::Null).unwrap();

        assert_eq!(table.move_column("note", 0).unwrap(), 2);
        assert_eq!(table.column_names(), ["note", "name", "qty"]);

        table.rename_column("qty", "count").unwrap();
        assert_eq!(table.rows()[1].get("count"), Some(&Value::from("5")));
        assert!(table.rows()[1].get("qty").is_none());

        table.swap_columns("note", "count").unwrap();
        assert_eq!(table.column_names(), ["count", "name", "note"]);
        assert_eq!(
            table.rows()[0].field_names().collect::<Vec<_>>(),
            vec!["count", "name", "note"]
        );

        assert_eq!(
            table.rename_column("name", "count").unwrap_err(),
            TableError::DuplicateColumn("count".into())
        );
    }

    #[test]
    fn test_remove_and_insert_rows_restores_order() {
        let mut table = sample();
        table.push_row(vec![Value::from("plum"), Value::from("1")]);
        let before = table.clone();

        let ids: FxHashSet<RowId> = [table.rows()[0].id(), table.rows()[2].id()].into_iter().collect();
        let removed = table.remove_rows(&ids);
        assert_eq!(removed.iter().map(|(p, _)| *p).collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(table.len(), 1);

        table.insert_rows(removed).unwrap();
        assert_eq!(table, before);
    }

    #[test]
    fn test_append_rejects_duplicate_ids() {
        let mut table = sample();
        let existing = table.rows()[0].clone();
        assert_eq!(
            table.append_rows(vec![existing.clone()]).unwrap_err(),
            TableError::DuplicateRow(existing.id())
        );
    }

    #[test]
    fn test_reorder() {
        let mut table = sample();
        let mut order = table.row_ids();
        order.reverse();
        table.reorder(&order).unwrap();
        assert_eq!(table.row_ids(), order);

        let err = table.reorder(&order[..1]).unwrap_err();
        assert_eq!(err, TableError::NotAPermutation { expected: 2, found: 1 });
    }

    #[test]
    fn test_reconcile_columns_follows_first_row() {
        let mut table = sample();
        for row in table.rows_mut() {
            row.set("extra", "x");
        }
        assert_eq!(table.column_names(), ["name", "qty"]);
        table.reconcile_columns();
        assert_eq!(table.column_names(), ["name", "qty", "extra"]);
    }

    #[test]
    fn test_tags_and_links() {
        let mut table = sample();
        let row = &mut table.rows_mut()[0];
        assert!(row.add_tag("fruit"));
        assert!(!row.add_tag("fruit"));
        let link = RowLink { reference: 0, row: RowId::from_raw(4) };
        assert!(row.add_link(link));
        assert!(!row.add_link(link));
        assert!(row.remove_link(&link));
        assert!(!row.remove_link(&link));
        assert_eq!(table.known_tags().into_iter().collect::<Vec<_>>(), vec!["fruit"]);
    }
}
