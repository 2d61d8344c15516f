use anyhow::Context;
use clap::Args;
use promptlang::{ContextVariables, PromptTemplate};
use std::path::PathBuf;

use crate::cli::{parse_key_value, CliContext, OutputFormatter};

#[derive(Debug, Args)]
pub struct RenderArgs {
    /// Template text; read from --file when omitted
    template: Option<String>,

    /// Read the template from a file
    #[arg(short, long, value_name = "FILE", conflicts_with = "template")]
    file: Option<PathBuf>,

    /// Value of $input
    #[arg(short, long, default_value = "")]
    input: String,

    /// Template variables (KEY=VALUE)
    #[arg(long = "var", value_parser = parse_key_value)]
    vars: Vec<(String, String)>,

    /// List the template's blocks instead of rendering it
    #[arg(long)]
    blocks: bool,
}

pub async fn execute(ctx: &CliContext, args: RenderArgs) -> anyhow::Result<()> {
    let formatter = OutputFormatter::new(ctx.output_format);

    let source = match (args.template, args.file) {
        (Some(template), _) => template,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read template {}", path.display()))?,
        (None, None) => anyhow::bail!("a template or --file is required"),
    };

    if args.blocks {
        let template = PromptTemplate::new(source)?;
        for block in template.blocks() {
            formatter.kv(&format!("{:?}", block.block_type()), block.content());
        }
        return Ok(());
    }

    let mut variables = ContextVariables::with_input(args.input);
    for (key, value) in args.vars {
        variables.set(key, value);
    }

    let kernel = ctx.kernel()?;
    let rendered = kernel
        .render(&source, &variables, ctx.cancellation_on_interrupt())
        .await?;
    formatter.text(&rendered);
    Ok(())
}
