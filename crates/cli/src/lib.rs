//! `impactscan` command-line front end.

pub mod commands;
pub mod output;
pub mod progress;
pub mod report;

pub use commands::{Cli, Commands};
