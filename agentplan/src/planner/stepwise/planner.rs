use once_cell::sync::Lazy;
use promptlang::{
    ContextVariables, ExecutionContext, FunctionRegistry, FunctionView, PromptTemplate,
    TemplateError, GLOBAL_PLUGIN,
};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::history::fit_history;
use super::parser::{parse_step, ACTION_MARKER, OBSERVATION_MARKER, THOUGHT_MARKER};
use super::types::{DiagnosticKind, ExecutionStats, StepwiseOutcome, SystemStep};
use crate::completion::{ChatHistory, CompletionError, CompletionSettings};
use crate::config::StepwiseConfig;
use crate::kernel::Kernel;
use crate::planner::{function_manual, FunctionFilter};

const QUESTION_MARKER: &str = "[QUESTION]";
const NO_RESULT: &str = "Got no result from action";

/// Answer reported when the iteration cap is reached.
pub const NOT_FOUND_MESSAGE: &str = "Result not found, review 'steps_taken' to see what happened.";

/// System prompt for the reasoning loop.
pub const STEP_PROMPT: &str = r#"[INSTRUCTION]
Answer the question as accurately as possible, using the available functions when they help.

[AVAILABLE FUNCTIONS]
Each function is listed with its description and inputs:

{{$function_descriptions}}
[END AVAILABLE FUNCTIONS]

[USAGE]
To use a function, write an [ACTION] followed by a single JSON object with two keys:
"action" holds the function name as listed above, and "action_variables" holds an object of string values for its inputs.
Always include an "input" key in "action_variables", even when it is empty.
Only one action per reply, and only functions from [AVAILABLE FUNCTIONS].

Example:
[ACTION]
{
  "action": "plugin.function",
  "action_variables": {"input": "some value"}
}
[END USAGE]

[PROCESS]
Every reply is one [THOUGHT] followed by at most one [ACTION]:
[THOUGHT]
Reason about the question and repeat any facts found so far.
[ACTION]
The JSON object for the function to call.
The result of the action is then given to you as an [OBSERVATION]. Never write an [OBSERVATION] yourself.
When you know the answer, reply with [FINAL ANSWER] followed by the answer in plain language.
[END PROCESS]
{{$suffix}}
Begin!
"#;

static STEP_TEMPLATE: Lazy<PromptTemplate> =
    Lazy::new(|| PromptTemplate::new(STEP_PROMPT).unwrap());

/// Time left to wait so that an iteration lasts at least `min`.
fn pacing_delay(min: Duration, elapsed: Duration) -> Duration {
    min.saturating_sub(elapsed)
}

#[derive(Debug, Error)]
pub enum StepwiseError {
    #[error("the question is empty")]
    EmptyQuestion,
    #[error("the transcript needs {tokens} prompt tokens but only {budget} are available; reduce the number of available functions")]
    BudgetExceeded { tokens: usize, budget: usize },
    #[error("failed to render the system prompt: {0}")]
    Template(TemplateError),
    #[error("completion failed: {0}")]
    Completion(CompletionError),
    #[error("failed to serialize steps: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("stepwise execution cancelled")]
    Cancelled,
}

impl From<CompletionError> for StepwiseError {
    fn from(err: CompletionError) -> Self {
        match err {
            CompletionError::Cancelled => StepwiseError::Cancelled,
            other => StepwiseError::Completion(other),
        }
    }
}

impl From<TemplateError> for StepwiseError {
    fn from(err: TemplateError) -> Self {
        if err.is_cancelled() {
            StepwiseError::Cancelled
        } else {
            StepwiseError::Template(err)
        }
    }
}

/// ReAct-style planner: thought, action and observation until a final answer.
pub struct StepwisePlanner<'k> {
    kernel: &'k Kernel,
    config: StepwiseConfig,
    prompt: PromptTemplate,
}

fn same_plugin(a: &str, b: &str) -> bool {
    let norm = |p: &str| if p.is_empty() { GLOBAL_PLUGIN.to_string() } else { p.to_lowercase() };
    norm(a) == norm(b)
}

fn action_message(step: &SystemStep) -> Result<String, serde_json::Error> {
    let blob = serde_json::json!({
        "action": step.action,
        "action_variables": step.action_variables,
    });
    let action = format!("{}\n{}", ACTION_MARKER, serde_json::to_string_pretty(&blob)?);
    if step.thought.is_empty() {
        Ok(action)
    } else {
        Ok(format!("{} {}\n{}", THOUGHT_MARKER, step.thought, action))
    }
}

impl<'k> StepwisePlanner<'k> {
    pub fn new(kernel: &'k Kernel) -> Self {
        Self::with_config(kernel, kernel.config().stepwise.clone())
    }

    pub fn with_config(kernel: &'k Kernel, config: StepwiseConfig) -> Self {
        Self {
            kernel,
            config,
            prompt: STEP_TEMPLATE.clone(),
        }
    }

    /// Replaces the system prompt. The template receives `$input` (the
    /// question), `$function_descriptions` and `$suffix`.
    pub fn with_prompt(mut self, template: &str) -> Result<Self, TemplateError> {
        self.prompt = PromptTemplate::new(template)?;
        Ok(self)
    }

    pub fn config(&self) -> &StepwiseConfig {
        &self.config
    }

    pub async fn execute(
        &self,
        question: &str,
        cancellation: CancellationToken,
    ) -> Result<StepwiseOutcome, StepwiseError> {
        self.execute_with_variables(question, ContextVariables::new(), cancellation)
            .await
    }

    /// Runs the loop; `variables` are returned in the outcome with the answer
    /// as input and the execution stats added.
    pub async fn execute_with_variables(
        &self,
        question: &str,
        variables: ContextVariables,
        cancellation: CancellationToken,
    ) -> Result<StepwiseOutcome, StepwiseError> {
        if question.trim().is_empty() {
            return Err(StepwiseError::EmptyQuestion);
        }

        let functions = FunctionFilter::from(&self.config).available_functions(self.kernel.functions());
        let ctx = self.kernel.execution_context(cancellation.clone());

        let mut prompt_variables = ContextVariables::with_input(question);
        prompt_variables.set("function_descriptions", function_manual(&functions));
        prompt_variables.set("suffix", self.config.suffix.clone().unwrap_or_default());
        let system_prompt = self.prompt.render(&ctx, &prompt_variables).await?;

        let mut history = ChatHistory::with_system(system_prompt);
        history.add_user(format!("{}\n{}", QUESTION_MARKER, question));
        let protected = history.len();

        let budget = self.config.max_prompt_tokens();
        let settings = CompletionSettings::default()
            .with_max_tokens(self.config.max_completion_tokens() as u32)
            .with_stop_sequence(OBSERVATION_MARKER);

        let mut steps: Vec<SystemStep> = Vec::new();
        let mut stats = ExecutionStats::default();

        let min_iteration_time = Duration::from_millis(self.config.min_iteration_time_ms);
        let mut iteration_started: Option<Instant> = None;

        for iteration in 0..self.config.max_iterations {
            let wait = iteration_started
                .map(|started| pacing_delay(min_iteration_time, started.elapsed()))
                .unwrap_or_default();
            if !wait.is_zero() {
                tokio::select! {
                    _ = cancellation.cancelled() => return Err(StepwiseError::Cancelled),
                    _ = tokio::time::sleep(wait) => {}
                }
            }
            iteration_started = Some(Instant::now());
            if cancellation.is_cancelled() {
                return Err(StepwiseError::Cancelled);
            }
            stats.iterations = iteration + 1;

            let first_thought = steps
                .iter()
                .map(|s| s.thought.as_str())
                .find(|t| !t.is_empty());
            let request = fit_history(&history, first_thought, protected, budget)
                .map_err(|tokens| StepwiseError::BudgetExceeded { tokens, budget })?;

            let reply = self
                .kernel
                .completion()
                .complete_chat(&request, &settings, &cancellation)
                .await?;
            log::debug!("iteration {} reply:\n{}", iteration + 1, reply);

            let step = match parse_step(&reply) {
                Ok(step) => step,
                Err(diagnostic) => {
                    log::warn!("unusable reply on iteration {}: {}", iteration + 1, diagnostic);
                    if !reply.trim().is_empty() {
                        history.add_assistant(reply.trim());
                    }
                    match diagnostic.kind {
                        DiagnosticKind::MissingThoughtAndAction => history.add_user(THOUGHT_MARKER),
                        _ => history.add_user(format!("{} {}", OBSERVATION_MARKER, diagnostic.message)),
                    }
                    let mut step = diagnostic.partial;
                    step.observation = diagnostic.message;
                    steps.push(step);
                    continue;
                }
            };

            if step.has_final_answer() {
                log::info!("final answer after {} iterations", iteration + 1);
                let answer = step.final_answer.clone();
                steps.push(step);
                return Self::finish(answer, true, steps, stats, variables);
            }

            let mut step = self.merge_with_previous(step, &mut steps, &mut history, protected);

            if step.has_action() {
                history.add_assistant(action_message(&step)?);
                let observation = self.invoke_action(&ctx, &step, &functions, &mut stats).await?;
                log::info!("action {} -> {}", step.action, observation);
                history.add_user(format!("{} {}", OBSERVATION_MARKER, observation));
                step.observation = observation;
            } else {
                history.add_assistant(format!("{} {}", THOUGHT_MARKER, step.thought));
                history.add_user(ACTION_MARKER);
            }
            steps.push(step);
        }

        log::warn!(
            "no final answer after {} iterations",
            self.config.max_iterations
        );
        Self::finish(NOT_FOUND_MESSAGE.to_string(), false, steps, stats, variables)
    }

    /// An action without a thought completes a preceding thought-only step.
    fn merge_with_previous(
        &self,
        step: SystemStep,
        steps: &mut Vec<SystemStep>,
        history: &mut ChatHistory,
        protected: usize,
    ) -> SystemStep {
        let mergeable = step.thought.is_empty()
            && step.has_action()
            && steps.last().map_or(false, |prev| {
                !prev.thought.is_empty() && !prev.has_action() && prev.observation.is_empty()
            });
        if !mergeable {
            return step;
        }
        let Some(mut previous) = steps.pop() else {
            return step;
        };

        if history.len() > protected
            && history.last().map_or(false, |m| m.content == ACTION_MARKER)
        {
            history.pop();
        }
        if history.len() > protected
            && history
                .last()
                .map_or(false, |m| m.content.starts_with(THOUGHT_MARKER))
        {
            history.pop();
        }

        previous.action = step.action;
        previous.action_variables = step.action_variables;
        previous.original_response.push('\n');
        previous.original_response.push_str(&step.original_response);
        previous
    }

    /// Runs the step's action and returns the observation shown to the model.
    async fn invoke_action(
        &self,
        ctx: &ExecutionContext<'_>,
        step: &SystemStep,
        functions: &[FunctionView],
        stats: &mut ExecutionStats,
    ) -> Result<String, StepwiseError> {
        let (plugin, name) = match step.action.split_once('.') {
            Some((plugin, name)) => (plugin, name),
            None => (GLOBAL_PLUGIN, step.action.as_str()),
        };
        if plugin.is_empty() || name.is_empty() || name.contains('.') {
            return Ok(format!(
                "Unable to resolve action '{}'. Use a function name from [AVAILABLE FUNCTIONS].",
                step.action
            ));
        }

        let offered = functions
            .iter()
            .any(|v| same_plugin(&v.plugin_name, plugin) && v.name.eq_ignore_ascii_case(name));
        let function = if offered {
            self.kernel.functions().resolve(plugin, name)
        } else {
            None
        };
        let Some(function) = function else {
            return Ok(format!(
                "Function '{}' is not available. Use a function from [AVAILABLE FUNCTIONS].",
                step.action
            ));
        };

        stats.record_call(&function.view().qualified_name());

        let mut variables = ContextVariables::new();
        for (key, value) in &step.action_variables {
            variables.set(key, value.clone());
        }

        match function.invoke(ctx, variables).await {
            Ok(result) => {
                let output = result.input().trim();
                if output.is_empty() {
                    Ok(NO_RESULT.to_string())
                } else {
                    Ok(output.to_string())
                }
            }
            Err(e) if e.is_cancelled() => Err(StepwiseError::Cancelled),
            Err(e) => {
                log::warn!("action {} failed: {}", step.action, e);
                Ok(format!("Error invoking action {}: {}", step.action, e))
            }
        }
    }

    fn finish(
        answer: String,
        found: bool,
        steps: Vec<SystemStep>,
        stats: ExecutionStats,
        mut variables: ContextVariables,
    ) -> Result<StepwiseOutcome, StepwiseError> {
        variables.update(answer.clone());
        variables.set("step_count", steps.len().to_string());
        variables.set("steps_taken", serde_json::to_string(&steps)?);
        variables.set("iterations", stats.iterations.to_string());
        variables.set("function_count", stats.function_count());
        Ok(StepwiseOutcome {
            answer,
            found,
            steps,
            stats,
            variables,
        })
    }
}
