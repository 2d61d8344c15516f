//! agentplan CLI
//!
//! # Usage
//!
//! ```bash
//! # Render a template
//! agentplan render "{{text.uppercase $name}}" --var name=world
//!
//! # Create and run a plan
//! agentplan plan run "add 3 and 4, then uppercase the result"
//! agentplan plan create "..." --save plan.json
//! agentplan plan execute plan.json --var KEY=VALUE
//!
//! # Answer a question step by step
//! agentplan ask "what year is it?" --show-steps
//!
//! # Configuration
//! agentplan config show
//! agentplan config validate
//! ```

use agentplan::cli::commands::{
    ask::AskArgs, config::ConfigCommand, plan::PlanCommand, render::RenderArgs,
};
use agentplan::cli::{commands, CliContext, OutputFormat};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "agentplan")]
#[command(version)]
#[command(about = "Template rendering and LLM planning over native functions", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE", env = "AGENTPLAN_CONFIG")]
    config: Option<PathBuf>,

    /// Output format (text, json)
    #[arg(short, long, global = true, default_value = "text")]
    output_format: String,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a template
    Render(RenderArgs),

    /// Sequential planning
    Plan {
        #[command(subcommand)]
        command: PlanCommand,
    },

    /// Answer a question with the stepwise planner
    Ask(AskArgs),

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let output_format: OutputFormat = cli.output_format.parse().unwrap_or_else(|e| {
        eprintln!("Warning: {}. Using text format.", e);
        OutputFormat::Text
    });

    let mut ctx = match cli.config {
        Some(path) => match CliContext::new(path) {
            Ok(ctx) => ctx,
            Err(e) => {
                eprintln!("Error loading configuration: {}", e);
                std::process::exit(1);
            }
        },
        None => match CliContext::with_defaults() {
            Ok(ctx) => ctx,
            Err(e) => {
                eprintln!("Error initializing context: {}", e);
                std::process::exit(1);
            }
        },
    };
    ctx.output_format = output_format;
    ctx.verbose = cli.verbose;

    let result = match cli.command {
        Commands::Render(args) => commands::render::execute(&ctx, args).await,
        Commands::Plan { command } => commands::plan::execute(&ctx, command).await,
        Commands::Ask(args) => commands::ask::execute(&ctx, args).await,
        Commands::Config { command } => commands::config::execute(&ctx, command).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
