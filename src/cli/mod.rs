//! Command-line interface for switchyard
//!
//! - `args`: clap argument definitions
//! - `run`: entry point, runtime setup, and error rendering
//! - `commands`: command implementations and output formatting

pub mod args;
mod commands;
mod run;

pub use args::{Cli, Commands};
pub use run::run;
