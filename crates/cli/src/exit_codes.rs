//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract; scripts rely on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain           | Description                              |
//! |---------|------------------|------------------------------------------|
//! | 0       | Universal        | Success                                  |
//! | 1       | Universal        | General error (unspecified)              |
//! | 2       | Universal        | CLI usage error (bad args, missing file) |
//! | 3-9     | io               | Reading and writing tables               |
//! | 10-19   | runner           | Strategy and duplicate-resolution codes  |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into the relevant command's error handling

use tabstep_engine::error::RunnerError;

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing required options.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// IO (3-9)
// =============================================================================

/// Cannot read or write a file.
pub const EXIT_IO: u8 = 3;

/// Input could not be parsed as a table.
pub const EXIT_PARSE: u8 = 4;

/// Settings file is unreadable or invalid.
pub const EXIT_CONFIG: u8 = 5;

// =============================================================================
// Runner (10-19)
// =============================================================================

/// A strategy reported failure; nothing was changed.
pub const EXIT_STRATEGY: u8 = 10;

/// Duplicate resolution was cancelled by the user.
pub const EXIT_CANCELLED: u8 = 11;

/// An edit could not be applied (unknown column, unknown row).
pub const EXIT_EDIT: u8 = 12;

/// Map a runner error to its exit code.
pub fn runner_exit_code(err: &RunnerError) -> u8 {
    match err {
        RunnerError::Strategy(_) => EXIT_STRATEGY,
        RunnerError::Cancelled => EXIT_CANCELLED,
        RunnerError::Edit(_) => EXIT_EDIT,
        RunnerError::UnknownReference(_) => EXIT_USAGE,
        RunnerError::NotInitialized => EXIT_ERROR,
    }
}
