//! Command-line interface for dpoforge.
//!
//! Provides commands for generating DPO datasets and inspecting tool
//! catalogs.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
