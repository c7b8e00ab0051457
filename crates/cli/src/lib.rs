// tabstep CLI library: the pieces of the command-line tool that are worth
// testing without spawning the binary.

pub mod clean;
pub mod exit_codes;
pub mod output;
pub mod prompt;
pub mod settings;
