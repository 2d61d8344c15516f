use clap::Args;

use crate::cli::{CliContext, OutputFormat, OutputFormatter};
use crate::planner::stepwise::StepwisePlanner;

#[derive(Debug, Args)]
pub struct AskArgs {
    /// Question to answer
    question: String,

    /// Override the configured iteration cap
    #[arg(long)]
    max_iterations: Option<usize>,

    /// Print every thought, action and observation
    #[arg(long)]
    show_steps: bool,
}

pub async fn execute(ctx: &CliContext, args: AskArgs) -> anyhow::Result<()> {
    let formatter = OutputFormatter::new(ctx.output_format);
    let kernel = ctx.kernel()?;

    let mut config = kernel.config().stepwise.clone();
    if let Some(max) = args.max_iterations {
        config.max_iterations = max;
    }
    let planner = StepwisePlanner::with_config(&kernel, config);
    let outcome = planner
        .execute(&args.question, ctx.cancellation_on_interrupt())
        .await?;

    if formatter.format() == OutputFormat::Json {
        formatter.json(&serde_json::json!({
            "answer": outcome.answer,
            "found": outcome.found,
            "steps": outcome.steps,
            "iterations": outcome.stats.iterations,
            "function_count": outcome.stats.function_count(),
        }));
        return Ok(());
    }

    if args.show_steps {
        formatter.section("Steps");
        for (i, step) in outcome.steps.iter().enumerate() {
            if !step.thought.is_empty() {
                formatter.kv(&format!("{} thought", i + 1), &step.thought);
            }
            if step.has_action() {
                formatter.kv(&format!("{} action", i + 1), &step.action);
            }
            if !step.observation.is_empty() {
                formatter.kv(&format!("{} observation", i + 1), &step.observation);
            }
        }
    }

    formatter.section("Answer");
    if outcome.found {
        formatter.text(&outcome.answer);
    } else {
        formatter.warning(&outcome.answer);
    }
    formatter.kv("Iterations", &outcome.stats.iterations.to_string());
    formatter.kv("Function calls", &outcome.stats.function_count());
    Ok(())
}
