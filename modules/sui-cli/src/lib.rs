//! Scan registry publishing through the `sui` command-line client.

mod backend;
pub mod command;
pub mod config;
pub mod output;
pub mod runner;

pub use backend::SuiCliBackend;
pub use config::SuiConfig;
pub use runner::{CommandOutput, CommandRunner, ProcessRunner, RunError};
