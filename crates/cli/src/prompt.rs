//! Interactive duplicate decisions.
//!
//! Each group is printed with its rows numbered from 1. The answer is one of:
//!
//! | input        | effect                              |
//! |--------------|-------------------------------------|
//! | *(empty)*    | keep the first row                  |
//! | `2`          | keep row 2 only                     |
//! | `1,3`        | keep rows 1 and 3                   |
//! | `all`        | keep every row                      |
//! | `none`       | delete the whole group              |
//! | `q` / `quit` | cancel; nothing is committed        |

use std::io::{self, BufRead, Write};

use tabstep_engine::duplicates::{DuplicateDecision, DuplicateGroup};
use tabstep_engine::table::Table;
use tabstep_engine::value::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    Decide(DuplicateDecision),
    Quit,
    Invalid(String),
}

pub fn parse_answer(input: &str, group: &DuplicateGroup) -> Answer {
    let input = input.trim();
    match input.to_ascii_lowercase().as_str() {
        "" => {
            return match group.rows.first() {
                Some(id) => Answer::Decide(DuplicateDecision::KeepOne(*id)),
                None => Answer::Decide(DuplicateDecision::KeepMany(Vec::new())),
            }
        }
        "all" => return Answer::Decide(DuplicateDecision::KeepMany(group.rows.clone())),
        "none" => return Answer::Decide(DuplicateDecision::KeepMany(Vec::new())),
        "q" | "quit" => return Answer::Quit,
        _ => {}
    }

    let mut keep = Vec::new();
    for part in input.split(',') {
        let part = part.trim();
        let n: usize = match part.parse() {
            Ok(n) => n,
            Err(_) => return Answer::Invalid(format!("'{part}' is not a row number")),
        };
        match n.checked_sub(1).and_then(|i| group.rows.get(i)) {
            Some(id) if !keep.contains(id) => keep.push(*id),
            Some(_) => {}
            None => {
                return Answer::Invalid(format!("row {n} is out of range (1-{})", group.rows.len()))
            }
        }
    }

    if keep.len() == 1 {
        Answer::Decide(DuplicateDecision::KeepOne(keep[0]))
    } else {
        Answer::Decide(DuplicateDecision::KeepMany(keep))
    }
}

/// Show `group` and read answers until one parses. End of input cancels.
pub fn ask<R: BufRead, W: Write>(
    group: &DuplicateGroup,
    table: &Table,
    input: &mut R,
    out: &mut W,
) -> io::Result<Option<DuplicateDecision>> {
    writeln!(out, "{} = '{}' ({} rows)", group.column, group.value, group.rows.len())?;
    for (i, id) in group.rows.iter().enumerate() {
        let line = table
            .row(*id)
            .map(|row| row.values().map(Value::text).collect::<Vec<_>>().join(", "))
            .unwrap_or_default();
        writeln!(out, "  {:>3}  {}", i + 1, line)?;
    }
    if !group.reference_matches.is_empty() {
        writeln!(out, "  also in reference tables: {} row(s)", group.reference_matches.len())?;
    }

    loop {
        write!(out, "keep [1]: ")?;
        out.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        match parse_answer(&line, group) {
            Answer::Decide(decision) => return Ok(Some(decision)),
            Answer::Quit => return Ok(None),
            Answer::Invalid(msg) => writeln!(out, "  {msg}")?,
        }
    }
}
