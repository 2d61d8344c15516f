//! agentplan CLI module
//!
//! # Commands
//!
//! - `render` - Render a template against the built-in functions
//! - `plan` - Create a sequential plan for a goal and run it
//! - `ask` - Answer a question with the stepwise planner
//! - `config` - Configuration (show, validate)

pub mod commands;
pub mod context;
pub mod output;

pub use context::CliContext;
pub use output::{OutputFormat, OutputFormatter};

/// Parses a `key=value` pair given on the command line.
pub fn parse_key_value(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}
