//! Config command - configuration management

use clap::Subcommand;

use crate::cli::{CliContext, OutputFormat, OutputFormatter};

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show,

    /// Validate configuration
    Validate,
}

pub async fn execute(ctx: &CliContext, command: ConfigCommand) -> anyhow::Result<()> {
    let formatter = OutputFormatter::new(ctx.output_format);
    match command {
        ConfigCommand::Show => show_config(ctx, &formatter),
        ConfigCommand::Validate => validate_config(ctx, &formatter),
    }
}

fn show_config(ctx: &CliContext, formatter: &OutputFormatter) -> anyhow::Result<()> {
    let mut config = ctx.config.clone();
    if config.llm.api_key.is_some() {
        config.llm.api_key = Some("***".to_string());
    }

    if formatter.format() == OutputFormat::Json {
        formatter.json(&config);
        return Ok(());
    }

    formatter.section("Configuration");
    formatter.kv(
        "Config file",
        &ctx.config_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(defaults)".to_string()),
    );
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn validate_config(ctx: &CliContext, formatter: &OutputFormatter) -> anyhow::Result<()> {
    match ctx.config.validate() {
        Ok(()) => {
            formatter.success("Configuration is valid");
            Ok(())
        }
        Err(errors) => {
            for error in &errors {
                formatter.error(error);
            }
            anyhow::bail!("{} configuration error(s)", errors.len())
        }
    }
}
