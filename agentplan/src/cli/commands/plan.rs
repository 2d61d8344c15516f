use anyhow::Context;
use clap::Subcommand;
use promptlang::ContextVariables;
use std::path::PathBuf;

use crate::cli::{parse_key_value, CliContext, OutputFormat, OutputFormatter};
use crate::kernel::Kernel;
use crate::plan::{Plan, PLAN_RESULT_KEY};
use crate::planner::sequential::SequentialPlanner;

#[derive(Debug, Subcommand)]
pub enum PlanCommand {
    /// Create a plan for a goal with the sequential planner
    Create {
        /// Goal description
        goal: String,

        /// Write the plan as JSON to this file
        #[arg(short = 'f', long, value_name = "FILE")]
        save: Option<PathBuf>,
    },

    /// Execute a plan saved as JSON
    Execute {
        /// Path of the plan file
        plan: PathBuf,

        /// Initial input
        #[arg(short, long, default_value = "")]
        input: String,

        /// Context variables (KEY=VALUE)
        #[arg(long = "var", value_parser = parse_key_value)]
        vars: Vec<(String, String)>,
    },

    /// Create a plan for a goal and execute it immediately
    Run {
        goal: String,

        #[arg(long = "var", value_parser = parse_key_value)]
        vars: Vec<(String, String)>,
    },

    /// Show the outline of a saved plan and any functions it is missing
    Show {
        plan: PathBuf,
    },
}

pub async fn execute(ctx: &CliContext, command: PlanCommand) -> anyhow::Result<()> {
    let formatter = OutputFormatter::new(ctx.output_format);
    let kernel = ctx.kernel()?;

    match command {
        PlanCommand::Create { goal, save } => {
            let plan = create_plan(ctx, &kernel, &goal).await?;
            print_plan(&formatter, &plan)?;
            if let Some(path) = save {
                std::fs::write(&path, plan.to_json()?)
                    .with_context(|| format!("failed to write plan to {}", path.display()))?;
                formatter.success(&format!("Plan saved to {}", path.display()));
            }
            Ok(())
        }
        PlanCommand::Execute { plan, input, vars } => {
            let mut plan = load_plan(&plan)?;
            let mut variables = ContextVariables::with_input(input);
            for (key, value) in vars {
                variables.set(key, value);
            }
            run_plan(ctx, &kernel, &mut plan, variables, &formatter).await
        }
        PlanCommand::Run { goal, vars } => {
            let mut plan = create_plan(ctx, &kernel, &goal).await?;
            print_plan(&formatter, &plan)?;
            let mut variables = ContextVariables::with_input(goal);
            for (key, value) in vars {
                variables.set(key, value);
            }
            run_plan(ctx, &kernel, &mut plan, variables, &formatter).await
        }
        PlanCommand::Show { plan } => {
            let plan = load_plan(&plan)?;
            print_plan(&formatter, &plan)?;
            for missing in plan.missing_functions(kernel.functions()) {
                formatter.warning(&format!("function {} is not registered", missing));
            }
            Ok(())
        }
    }
}

async fn create_plan(ctx: &CliContext, kernel: &Kernel, goal: &str) -> anyhow::Result<Plan> {
    let planner = SequentialPlanner::new(kernel);
    let plan = planner
        .create_plan(goal, ctx.cancellation_on_interrupt())
        .await?;
    Ok(plan)
}

fn load_plan(path: &PathBuf) -> anyhow::Result<Plan> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read plan {}", path.display()))?;
    Ok(Plan::from_json(&json)?)
}

fn print_plan(formatter: &OutputFormatter, plan: &Plan) -> anyhow::Result<()> {
    match formatter.format() {
        OutputFormat::Json => println!("{}", plan.to_json()?),
        OutputFormat::Text => {
            formatter.section("Plan");
            println!("{}", plan.outline());
        }
    }
    Ok(())
}

async fn run_plan(
    ctx: &CliContext,
    kernel: &Kernel,
    plan: &mut Plan,
    variables: ContextVariables,
    formatter: &OutputFormatter,
) -> anyhow::Result<()> {
    let result = kernel
        .run_plan(plan, variables, ctx.cancellation_on_interrupt())
        .await?;
    let output = result
        .get(PLAN_RESULT_KEY)
        .filter(|r| !r.is_empty())
        .unwrap_or_else(|| result.input());
    formatter.section("Result");
    formatter.text(output);
    Ok(())
}
