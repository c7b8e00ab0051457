// tabstep CLI - step-wise table cleaning from the shell

use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};

use tabstep_cli::clean::{self, KeepPolicy};
use tabstep_cli::exit_codes::{
    runner_exit_code, EXIT_CONFIG, EXIT_IO, EXIT_PARSE, EXIT_SUCCESS, EXIT_USAGE,
};
use tabstep_cli::{output, prompt, settings};
use tabstep_engine::error::{ConfigError, RunnerError};
use tabstep_engine::runner::Runner;
use tabstep_engine::table::Table;
use tabstep_io::csv::CsvOptions;

#[derive(Parser)]
#[command(name = "tabstep")]
#[command(about = "Clean tabular data in undoable steps")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// Settings file (default: ~/.config/tabstep/settings.toml)
    #[arg(long, global = true, env = "TABSTEP_CONFIG")]
    config: Option<PathBuf>,

    /// Input field delimiter (sniffed when omitted)
    #[arg(long, short = 'd', global = true)]
    delimiter: Option<char>,

    /// Parse numbers and booleans instead of keeping text
    #[arg(long, global = true)]
    infer_types: bool,

    /// Suppress the summary line on stderr
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show columns and row counts
    #[command(after_help = "\
Examples:
  tabstep info customers.csv
  tabstep info export.tsv --json | jq '.rows'")]
    Info {
        input: PathBuf,

        /// Machine-readable output
        #[arg(long)]
        json: bool,
    },

    /// Trim surrounding whitespace; whitespace-only cells become empty
    #[command(after_help = "\
Examples:
  tabstep trim customers.csv -o clean.csv
  tabstep trim customers.csv --column name --column email > clean.csv")]
    Trim {
        input: PathBuf,

        /// Column to trim (repeatable; default: all columns)
        #[arg(long, short = 'c')]
        column: Vec<String>,

        /// Output file (.csv, .tsv or .json); stdout gets CSV
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Write a value into empty cells of one column
    #[command(after_help = "\
Examples:
  tabstep fill orders.csv --column status --value pending -o orders.csv")]
    Fill {
        input: PathBuf,

        #[arg(long, short = 'c')]
        column: String,

        #[arg(long)]
        value: String,

        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Delete blank rows or rows matching a filter
    #[command(after_help = "\
Examples:
  tabstep drop export.csv --blank -o export.csv
  tabstep drop orders.csv --where status=cancelled --where status=void")]
    Drop {
        input: PathBuf,

        /// Delete rows where every cell is empty
        #[arg(long)]
        blank: bool,

        /// Delete rows where column=value (repeatable)
        #[arg(long = "where", short = 'w')]
        filters: Vec<String>,

        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Stable sort by one column
    #[command(after_help = "\
Examples:
  tabstep sort people.csv --by last_name
  tabstep sort sales.csv --by amount --desc --infer-types -o sorted.csv")]
    Sort {
        input: PathBuf,

        #[arg(long)]
        by: String,

        #[arg(long)]
        desc: bool,

        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Resolve rows sharing a value in one column
    #[command(after_help = "\
Examples:
  tabstep dedupe contacts.csv --column email -o contacts.csv
  tabstep dedupe contacts.csv --column email --keep last
  tabstep dedupe new.csv --column email --reference crm.csv --keep ask

With --keep ask, each group is shown on stderr and answered on stdin:
  Enter=first  2=row 2  1,3=rows 1 and 3  all  none  q=cancel

--reference needs --keep ask: a value found once in the input and again in
a reference table has a single input row, which first/last would always keep.")]
    Dedupe {
        input: PathBuf,

        #[arg(long, short = 'c')]
        column: String,

        /// Reference table whose matching values also form groups (repeatable, read-only)
        #[arg(long = "reference", short = 'r')]
        references: Vec<PathBuf>,

        #[arg(long, value_enum, default_value = "first")]
        keep: Keep,

        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Keep {
    First,
    Last,
    Ask,
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("GIT_COMMIT_HASH"), ")",
        "\nengine:  tabstep-engine ", env!("CARGO_PKG_VERSION"),
        "\ntarget:  ", env!("TARGET"),
    )
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let result = run(cli);

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(e) => {
            eprintln!("error: {}", e.message);
            if let Some(hint) = &e.hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(e.code)
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let options = csv_options(cli.delimiter, cli.infer_types)?;
    let quiet = cli.quiet;

    match cli.command {
        Commands::Info { input, json } => cmd_info(&input, &options, json),
        Commands::Trim { input, column, output } => {
            let mut runner = open(&input, &options, cli.config.as_deref())?;
            let changed = clean::trim_columns(&mut runner, &column).map_err(CliError::runner)?;
            summary(quiet, format!("trimmed {changed} cell(s)"));
            finish(&runner, output.as_deref())
        }
        Commands::Fill { input, column, value, output } => {
            let mut runner = open(&input, &options, cli.config.as_deref())?;
            let changed = clean::fill_column(&mut runner, &column, &value).map_err(CliError::runner)?;
            summary(quiet, format!("filled {changed} cell(s)"));
            finish(&runner, output.as_deref())
        }
        Commands::Drop { input, blank, filters, output } => {
            if !blank && filters.is_empty() {
                return Err(CliError::args("nothing to drop").with_hint("pass --blank or --where column=value"));
            }
            let filters = filters
                .iter()
                .map(|f| clean::parse_where(f))
                .collect::<Result<Vec<_>, _>>()
                .map_err(CliError::args)?;
            let mut runner = open(&input, &options, cli.config.as_deref())?;
            let deleted = clean::drop_rows(&mut runner, blank, &filters).map_err(CliError::runner)?;
            summary(quiet, format!("dropped {deleted} row(s)"));
            finish(&runner, output.as_deref())
        }
        Commands::Sort { input, by, desc, output } => {
            let mut runner = open(&input, &options, cli.config.as_deref())?;
            clean::sort_rows(&mut runner, &by, desc).map_err(CliError::runner)?;
            finish(&runner, output.as_deref())
        }
        Commands::Dedupe { input, column, references, keep, output } => {
            if !references.is_empty() && !matches!(keep, Keep::Ask) {
                return Err(CliError::args("--reference requires --keep ask")
                    .with_hint("first/last never delete a row matched only by a reference table"));
            }
            let mut runner = open(&input, &options, cli.config.as_deref())?;
            let mut reference_ids = Vec::with_capacity(references.len());
            for path in &references {
                let table = output::read_table(path, &options).map_err(CliError::parse)?;
                let name = path
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                if let Some(id) = runner.add_reference(&table, &name) {
                    reference_ids.push(id);
                }
            }

            let report = match keep {
                Keep::First => clean::dedupe(&mut runner, &column, &reference_ids, |g| KeepPolicy::First.decide(g)),
                Keep::Last => clean::dedupe(&mut runner, &column, &reference_ids, |g| KeepPolicy::Last.decide(g)),
                Keep::Ask => {
                    let snapshot: Table = runner.table().cloned().unwrap_or_default();
                    let stdin = io::stdin();
                    let mut answers = stdin.lock();
                    let mut out = io::stderr();
                    clean::dedupe(&mut runner, &column, &reference_ids, |group| {
                        match prompt::ask(group, &snapshot, &mut answers, &mut out) {
                            Ok(decision) => decision,
                            Err(e) => {
                                log::warn!("reading answer failed: {e}");
                                None
                            }
                        }
                    })
                }
            }
            .map_err(CliError::runner)?;

            summary(
                quiet,
                format!("{} group(s), kept {} row(s), deleted {}", report.groups, report.kept, report.deleted),
            );
            finish(&runner, output.as_deref())
        }
    }
}

fn csv_options(delimiter: Option<char>, infer_types: bool) -> Result<CsvOptions, CliError> {
    let delimiter = match delimiter {
        Some(c) if c.is_ascii() => Some(c as u8),
        Some(c) => return Err(CliError::args(format!("delimiter '{c}' is not a single-byte character"))),
        None => None,
    };
    Ok(CsvOptions { delimiter, infer_types })
}

fn open(input: &Path, options: &CsvOptions, config: Option<&Path>) -> Result<Runner, CliError> {
    let settings = settings::load_settings(config).map_err(CliError::config)?;
    let table = read_input(input, options)?;
    Ok(Runner::with_settings(&table, settings))
}

fn read_input(input: &Path, options: &CsvOptions) -> Result<Table, CliError> {
    if !input.exists() {
        return Err(CliError::io(format!("{}: no such file", input.display())));
    }
    output::read_table(input, options).map_err(CliError::parse)
}

fn finish(runner: &Runner, path: Option<&Path>) -> Result<(), CliError> {
    let table = runner
        .table()
        .ok_or_else(|| CliError::runner(RunnerError::NotInitialized))?;
    match path {
        Some(path) => output::write_table(table, path).map_err(CliError::io),
        None => output::write_stdout(table).map_err(CliError::io),
    }
}

fn summary(quiet: bool, line: String) {
    if !quiet {
        eprintln!("{line}");
    }
}

// ============================================================================
// info
// ============================================================================

fn cmd_info(input: &Path, options: &CsvOptions, json: bool) -> Result<(), CliError> {
    let table = read_input(input, options)?;
    let filled: Vec<(&str, usize)> = table
        .column_names()
        .iter()
        .map(|name| {
            let count = table
                .rows()
                .iter()
                .filter(|row| row.get(name).is_some_and(|v| !v.is_null()))
                .count();
            (name.as_str(), count)
        })
        .collect();

    if json {
        let columns: Vec<serde_json::Value> = filled
            .iter()
            .map(|(name, count)| serde_json::json!({ "name": name, "filled": count }))
            .collect();
        let doc = serde_json::json!({
            "file": input.display().to_string(),
            "rows": table.len(),
            "columns": columns,
        });
        let text = serde_json::to_string_pretty(&doc).map_err(|e| CliError::io(e.to_string()))?;
        println!("{text}");
    } else {
        println!("{}: {} row(s), {} column(s)", input.display(), table.len(), filled.len());
        let width = filled.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
        for (name, count) in &filled {
            println!("  {:<width$}  {} filled", name, count, width = width);
        }
    }
    Ok(())
}

// ============================================================================
// Errors
// ============================================================================

pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn args(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_IO, message: msg.into(), hint: None }
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self { code: EXIT_PARSE, message: msg.into(), hint: None }
    }

    pub fn config(err: ConfigError) -> Self {
        Self { code: EXIT_CONFIG, message: err.to_string(), hint: None }
            .with_hint("check settings.toml or the --config path")
    }

    /// Create error from runner error with proper exit code.
    pub fn runner(err: RunnerError) -> Self {
        let code = runner_exit_code(&err);
        let hint = match &err {
            RunnerError::Cancelled => Some("no changes were written".to_string()),
            RunnerError::Strategy(_) => Some("run `tabstep info <file>` to list columns".to_string()),
            _ => None,
        };
        Self { code, message: err.to_string(), hint }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}
