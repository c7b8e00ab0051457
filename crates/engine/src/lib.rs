pub mod builtin;
pub mod cell_view;
pub mod config;
pub mod duplicates;
pub mod edit;
pub mod error;
pub mod runner;
pub mod step;
pub mod strategy;
pub mod table;
pub mod value;
