// JSON export

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use tabstep_engine::table::{Row, Table};

/// Export table as a JSON array of objects, one per row, keys in column order.
pub fn export(table: &Table, path: &Path) -> Result<(), String> {
    let file = File::create(path).map_err(|e| e.to_string())?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, &Rows(table)).map_err(|e| e.to_string())?;
    Ok(())
}

pub fn export_to_string(table: &Table) -> Result<String, String> {
    serde_json::to_string_pretty(&Rows(table)).map_err(|e| e.to_string())
}

struct Rows<'a>(&'a Table);

struct RowObject<'a> {
    columns: &'a [String],
    row: &'a Row,
}

impl Serialize for Rows<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let table = self.0;
        let mut seq = serializer.serialize_seq(Some(table.len()))?;
        for row in table.rows() {
            seq.serialize_element(&RowObject {
                columns: table.column_names(),
                row,
            })?;
        }
        seq.end()
    }
}

impl Serialize for RowObject<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for name in self.columns {
            map.serialize_entry(name, &self.row.get(name))?;
        }
        map.end()
    }
}
