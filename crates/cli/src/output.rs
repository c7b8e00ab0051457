// Writing the cleaned table: file format follows the output extension,
// stdout always gets CSV.

use std::io::Write;
use std::path::Path;

use tabstep_engine::table::Table;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Tsv,
    Json,
}

impl OutputFormat {
    /// Infer from the file extension; anything unrecognized is CSV.
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("tsv") | Some("tab") => OutputFormat::Tsv,
            Some("json") => OutputFormat::Json,
            _ => OutputFormat::Csv,
        }
    }
}

pub fn write_table(table: &Table, path: &Path) -> Result<(), String> {
    match OutputFormat::from_path(path) {
        OutputFormat::Csv => tabstep_io::csv::export(table, path),
        OutputFormat::Tsv => tabstep_io::csv::export_tsv(table, path),
        OutputFormat::Json => tabstep_io::json::export(table, path),
    }
    .map_err(|e| format!("{}: {e}", path.display()))
}

pub fn write_stdout(table: &Table) -> Result<(), String> {
    let text = tabstep_io::csv::export_to_string(table, b',')?;
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(text.as_bytes()).map_err(|e| e.to_string())?;
    stdout.flush().map_err(|e| e.to_string())
}

/// Read any supported input. `.tsv`/`.tab` files default to tabs; other
/// files use the given delimiter or sniff one.
pub fn read_table(path: &Path, options: &tabstep_io::csv::CsvOptions) -> Result<Table, String> {
    let mut options = *options;
    if options.delimiter.is_none() && OutputFormat::from_path(path) == OutputFormat::Tsv {
        options.delimiter = Some(b'\t');
    }
    tabstep_io::csv::import_with_options(path, &options)
}
