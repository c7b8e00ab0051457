// CSV/TSV import/export

use std::io::Read;
use std::path::Path;

use tabstep_engine::table::Table;
use tabstep_engine::value::Value;

/// How a delimited file is read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CsvOptions {
    /// Field delimiter; sniffed from the content when `None`.
    pub delimiter: Option<u8>,
    /// Parse numbers and booleans instead of keeping every field as text.
    pub infer_types: bool,
}

pub fn import(path: &Path) -> Result<Table, String> {
    import_with_options(path, &CsvOptions::default())
}

pub fn import_tsv(path: &Path) -> Result<Table, String> {
    import_with_delimiter(path, b'\t')
}

pub fn import_with_delimiter(path: &Path, delimiter: u8) -> Result<Table, String> {
    let options = CsvOptions {
        delimiter: Some(delimiter),
        ..CsvOptions::default()
    };
    import_with_options(path, &options)
}

pub fn import_with_options(path: &Path, options: &CsvOptions) -> Result<Table, String> {
    let content = read_file_as_utf8(path)?;
    let table = import_from_str(&content, options)?;
    log::debug!(
        "imported {} ({} rows, {} columns)",
        path.display(),
        table.len(),
        table.column_names().len()
    );
    Ok(table)
}

/// Detect the most likely field delimiter by checking consistency across the first few lines.
///
/// For each candidate (tab, semicolon, comma, pipe), count fields per line. The delimiter
/// that produces the most consistent field count (>1 field) wins.
pub fn sniff_delimiter(content: &str) -> u8 {
    let candidates: &[u8] = &[b'\t', b';', b',', b'|'];
    let sample_lines: Vec<&str> = content.lines().take(10).collect();

    if sample_lines.is_empty() {
        return b',';
    }

    let mut best = b',';
    let mut best_score = 0u64;

    for &delim in candidates {
        let counts: Vec<usize> = sample_lines
            .iter()
            .map(|line| {
                csv::ReaderBuilder::new()
                    .delimiter(delim)
                    .has_headers(false)
                    .flexible(true)
                    .from_reader(line.as_bytes())
                    .records()
                    .next()
                    .and_then(|r| r.ok())
                    .map(|r| r.len())
                    .unwrap_or(1)
            })
            .collect();

        // Must produce >1 field on the first line to be viable
        if counts.first().copied().unwrap_or(0) <= 1 {
            continue;
        }

        // More consistent lines and more columns both point at the real delimiter
        let target = counts[0];
        let consistent = counts.iter().filter(|&&c| c == target).count() as u64;
        let score = consistent * target as u64;

        if score > best_score {
            best_score = score;
            best = delim;
        }
    }

    best
}

/// Read file and convert to UTF-8 if needed (handles Windows-1252, Latin-1, etc.)
pub fn read_file_as_utf8(path: &Path) -> Result<String, String> {
    let mut file = std::fs::File::open(path).map_err(|e| format!("{}: {e}", path.display()))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).map_err(|e| e.to_string())?;

    match String::from_utf8(bytes) {
        Ok(s) => Ok(s),
        Err(e) => {
            let bytes = e.into_bytes();
            // Excel-exported CSVs are commonly Windows-1252
            log::debug!("{} is not UTF-8, decoding as Windows-1252", path.display());
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            Ok(decoded.into_owned())
        }
    }
}

/// Parse delimited text. The first record is the header; blank header cells
/// are named `column_N` and repeated names get a numeric suffix.
pub fn import_from_str(content: &str, options: &CsvOptions) -> Result<Table, String> {
    let content = content.strip_prefix('\u{feff}').unwrap_or(content);
    let delimiter = options.delimiter.unwrap_or_else(|| sniff_delimiter(content));

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(content.as_bytes());
    let mut records = reader.records();

    let header = match records.next() {
        Some(record) => record.map_err(|e| e.to_string())?,
        None => return Err("no header row".to_string()),
    };
    let mut table = Table::new(header_names(&header)).map_err(|e| e.to_string())?;

    for result in records {
        let record = result.map_err(|e| e.to_string())?;
        if record.iter().all(str::is_empty) && record.len() <= 1 {
            continue;
        }
        let values = record
            .iter()
            .map(|field| {
                if options.infer_types {
                    Value::from_input(field)
                } else if field.is_empty() {
                    Value::Null
                } else {
                    Value::from(field)
                }
            })
            .collect();
        table.push_row(values);
    }

    Ok(table)
}

fn header_names(record: &csv::StringRecord) -> Vec<String> {
    let mut names: Vec<String> = Vec::with_capacity(record.len());
    for (i, raw) in record.iter().enumerate() {
        let base = match raw.trim() {
            "" => format!("column_{}", i + 1),
            name => name.to_string(),
        };
        let mut name = base.clone();
        let mut n = 2;
        while names.contains(&name) {
            name = format!("{base}_{n}");
            n += 1;
        }
        names.push(name);
    }
    names
}

pub fn export(table: &Table, path: &Path) -> Result<(), String> {
    export_with_delimiter(table, path, b',')
}

pub fn export_tsv(table: &Table, path: &Path) -> Result<(), String> {
    export_with_delimiter(table, path, b'\t')
}

pub fn export_with_delimiter(table: &Table, path: &Path, delimiter: u8) -> Result<(), String> {
    let writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_path(path)
        .map_err(|e| e.to_string())?;
    write_table(table, writer)
}

/// Serialize to a string (header row first).
pub fn export_to_string(table: &Table, delimiter: u8) -> Result<String, String> {
    let mut buf = Vec::new();
    let writer = csv::WriterBuilder::new().delimiter(delimiter).from_writer(&mut buf);
    write_table(table, writer)?;
    String::from_utf8(buf).map_err(|e| e.to_string())
}

fn write_table<W: std::io::Write>(table: &Table, mut writer: csv::Writer<W>) -> Result<(), String> {
    writer
        .write_record(table.column_names())
        .map_err(|e| e.to_string())?;
    for row in table.rows() {
        let record: Vec<String> = table
            .column_names()
            .iter()
            .map(|name| row.get(name).map(Value::text).unwrap_or_default())
            .collect();
        writer.write_record(&record).map_err(|e| e.to_string())?;
    }
    writer.flush().map_err(|e| e.to_string())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn cell(table: &Table, row: usize, column: &str) -> String {
        table.rows()[row].get(column).map(Value::text).unwrap_or_default()
    }

    #[test]
    fn test_sniff_semicolon_delimiter() {
        let content = "Name;Age;City\nAlice;30;Paris\nBob;25;London\n";
        assert_eq!(sniff_delimiter(content), b';');
    }

    #[test]
    fn test_sniff_comma_delimiter() {
        let content = "Name,Age,City\nAlice,30,Paris\nBob,25,London\n";
        assert_eq!(sniff_delimiter(content), b',');
    }

    #[test]
    fn test_sniff_tab_delimiter() {
        let content = "Name\tAge\tCity\nAlice\t30\tParis\nBob\t25\tLondon\n";
        assert_eq!(sniff_delimiter(content), b'\t');
    }

    #[test]
    fn test_sniff_pipe_delimiter() {
        let content = "Name|Age|City\nAlice|30|Paris\nBob|25|London\n";
        assert_eq!(sniff_delimiter(content), b'|');
    }

    #[test]
    fn test_sniff_semicolon_with_commas_in_values() {
        let content = "Name;Address;City\n\"Doe, Jane\";\"123 Main St, Apt 4\";Paris\nBob;\"456 Elm\";London\n";
        assert_eq!(sniff_delimiter(content), b';');
    }

    #[test]
    fn test_import_keeps_text_by_default() {
        let table = import_from_str("id,qty\n007,3\n", &CsvOptions::default()).unwrap();
        assert_eq!(table.column_names(), ["id", "qty"]);
        assert_eq!(table.rows()[0].get("id"), Some(&Value::from("007")));
    }

    #[test]
    fn test_import_infers_types_on_request() {
        let options = CsvOptions {
            infer_types: true,
            ..CsvOptions::default()
        };
        let table = import_from_str("qty,ok,note\n3,true,\n", &options).unwrap();
        let row = &table.rows()[0];
        assert_eq!(row.get("qty"), Some(&Value::Number(3.0)));
        assert_eq!(row.get("ok"), Some(&Value::Bool(true)));
        assert_eq!(row.get("note"), Some(&Value::Null));
    }

    #[test]
    fn test_import_pads_short_records() {
        let table = import_from_str("a,b,c\n1\n1,2,3,4\n", &CsvOptions::default()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(cell(&table, 0, "c"), "");
        assert_eq!(cell(&table, 1, "c"), "3");
    }

    #[test]
    fn test_import_fixes_header_names() {
        let table = import_from_str("\u{feff}name,,name\nx,y,z\n", &CsvOptions::default()).unwrap();
        assert_eq!(table.column_names(), ["name", "column_2", "name_2"]);
    }

    #[test]
    fn test_import_empty_content_fails() {
        assert!(import_from_str("", &CsvOptions::default()).is_err());
    }

    #[test]
    fn test_semicolon_csv_import() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.csv");
        fs::write(&path, "Name;Age;City\nAlice;30;Paris\nBob;25;London\n").unwrap();

        let table = import(&path).unwrap();
        assert_eq!(table.column_names(), ["Name", "Age", "City"]);
        assert_eq!(cell(&table, 0, "Name"), "Alice");
        assert_eq!(cell(&table, 1, "City"), "London");
    }

    #[test]
    fn test_windows_1252_fallback() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("latin.csv");
        // "Café" with é as 0xE9
        fs::write(&path, b"name\nCaf\xe9\n").unwrap();

        let table = import(&path).unwrap();
        assert_eq!(cell(&table, 0, "name"), "Café");
    }

    #[test]
    fn test_tsv_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.tsv");

        let table = Table::from_records(
            ["Name", "Value"],
            vec![
                vec![Value::from("Alice"), Value::from("42")],
                vec![Value::from("Bob, Jr."), Value::Null],
            ],
        )
        .unwrap();
        export_tsv(&table, &path).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains('\t'), "TSV should contain tab characters");

        let imported = import_tsv(&path).unwrap();
        assert_eq!(imported.column_names(), ["Name", "Value"]);
        assert_eq!(cell(&imported, 0, "Value"), "42");
        assert_eq!(cell(&imported, 1, "Name"), "Bob, Jr.");
        assert_eq!(imported.rows()[1].get("Value"), Some(&Value::Null));
    }

    #[test]
    fn test_export_to_string_quotes_fields() {
        let table = Table::from_records(["a"], vec![vec![Value::from("x,y")]]).unwrap();
        assert_eq!(export_to_string(&table, b',').unwrap(), "a\n\"x,y\"\n");
    }
}
