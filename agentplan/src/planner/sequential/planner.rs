use once_cell::sync::Lazy;
use promptlang::{ContextVariables, PromptTemplate, TemplateError};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::parser::{parse_plan, PlanParseError};
use crate::completion::{CompletionError, CompletionSettings};
use crate::config::SequentialConfig;
use crate::kernel::Kernel;
use crate::plan::Plan;
use crate::planner::{function_manual, FunctionFilter};

const STOP_SEQUENCE: &str = "<!-- END -->";

/// Prompt asking the model for an XML plan.
pub const PLAN_PROMPT: &str = r#"Write an XML plan that achieves the goal below using only the available functions.

[AVAILABLE FUNCTIONS]

{{$available_functions}}

[END AVAILABLE FUNCTIONS]

Rules for the plan:
- Keep the plan as short as possible and use only functions listed in [AVAILABLE FUNCTIONS].
- The plan is a <plan> element whose children are <function.PLUGIN.NAME .../> elements, run in order.
- Every function takes named string parameters as XML attributes and produces a single string output.
- The variable INPUT holds the goal text when the plan starts.
- To keep an output for a later step, add setContextVariable="SOME_NAME" and reference it as $SOME_NAME.
- To return an output as part of the result, add appendToResult="RESULT__SOME_NAME".
- Reference variables only by name. Variables are plain strings, not arrays or objects.
- Attribute values must be XML escaped, for example &quot; and &lt;.
- If no plan can be written with these functions, answer <plan />.
- Finish with <!-- END --> after the closing </plan> tag.

Example:
<plan>
    <!-- get the first number -->
    <function.example.Lookup input="first" setContextVariable="FIRST"/>
    <!-- format it for the answer -->
    <function.example.Format input="$FIRST" style="short" appendToResult="RESULT__ANSWER"/>
</plan>
<!-- END -->

<goal>{{$input}}</goal>
"#;

static PLAN_TEMPLATE: Lazy<PromptTemplate> = Lazy::new(|| PromptTemplate::new(PLAN_PROMPT).unwrap());

#[derive(Debug, Error)]
pub enum SequentialPlannerError {
    #[error("the goal is empty")]
    EmptyGoal,
    #[error("failed to render the planner prompt: {0}")]
    Template(#[from] TemplateError),
    #[error("plan completion failed: {0}")]
    Completion(#[from] CompletionError),
    #[error("could not create a plan: {0}")]
    Parse(#[from] PlanParseError),
}

/// Creates multi-step [`Plan`]s from a goal with a single model call.
pub struct SequentialPlanner<'k> {
    kernel: &'k Kernel,
    config: SequentialConfig,
    prompt: PromptTemplate,
}

impl<'k> SequentialPlanner<'k> {
    pub fn new(kernel: &'k Kernel) -> Self {
        Self::with_config(kernel, kernel.config().sequential.clone())
    }

    pub fn with_config(kernel: &'k Kernel, config: SequentialConfig) -> Self {
        Self {
            kernel,
            config,
            prompt: PLAN_TEMPLATE.clone(),
        }
    }

    /// Replaces the built-in prompt. The template receives `$input` (the goal)
    /// and `$available_functions`.
    pub fn with_prompt(mut self, template: &str) -> Result<Self, TemplateError> {
        self.prompt = PromptTemplate::new(template)?;
        Ok(self)
    }

    pub fn config(&self) -> &SequentialConfig {
        &self.config
    }

    /// The function manual shown to the model.
    pub fn available_functions_manual(&self) -> String {
        let filter = FunctionFilter::from(&self.config);
        function_manual(&filter.available_functions(self.kernel.functions()))
    }

    pub async fn create_plan(
        &self,
        goal: &str,
        cancellation: CancellationToken,
    ) -> Result<Plan, SequentialPlannerError> {
        if goal.trim().is_empty() {
            return Err(SequentialPlannerError::EmptyGoal);
        }

        let mut variables = ContextVariables::with_input(goal);
        variables.set("available_functions", self.available_functions_manual());

        let ctx = self.kernel.execution_context(cancellation.clone());
        let prompt = self.prompt.render(&ctx, &variables).await?;

        let settings = CompletionSettings::default()
            .with_max_tokens(self.config.max_tokens)
            .with_stop_sequence(STOP_SEQUENCE);
        let completion = self
            .kernel
            .completion()
            .complete_text(&prompt, &settings, &cancellation)
            .await?;
        log::debug!("sequential plan document:\n{}", completion);

        let plan = parse_plan(
            &completion,
            goal,
            self.kernel.functions(),
            self.config.allow_missing_functions,
        )?;
        log::info!(
            "created plan with {} steps for goal: {}",
            plan.steps().len(),
            goal
        );
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::ScriptedCompletionClient;
    use crate::config::KernelConfig;
    use std::sync::Arc;

    #[test]
    fn test_builtin_prompt_parses() {
        let template = PromptTemplate::new(PLAN_PROMPT).unwrap();
        assert_eq!(
            template.variable_names(),
            vec!["available_functions".to_string(), "input".to_string()]
        );
    }

    #[tokio::test]
    async fn test_prompt_contains_manual_and_goal() {
        let client = Arc::new(ScriptedCompletionClient::new([
            r#"<plan><function.text.uppercase input="hello"/></plan>"#,
        ]));
        let mut kernel = Kernel::new(client.clone(), KernelConfig::default());
        kernel.register_builtin_plugins();

        let config = SequentialConfig {
            excluded_plugins: vec!["wait".to_string()],
            ..SequentialConfig::default()
        };
        let planner = SequentialPlanner::with_config(&kernel, config);
        let plan = planner
            .create_plan("shout hello", CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(plan.steps().len(), 1);

        let prompt = client.requests()[0].last_text().to_string();
        assert!(prompt.contains("text.uppercase:"));
        assert!(!prompt.contains("wait.seconds"));
        assert!(prompt.contains("<goal>shout hello</goal>"));
    }

    #[tokio::test]
    async fn test_empty_goal_is_rejected() {
        let kernel = Kernel::new(
            Arc::new(ScriptedCompletionClient::echo()),
            KernelConfig::default(),
        );
        let err = SequentialPlanner::new(&kernel)
            .create_plan("  ", CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SequentialPlannerError::EmptyGoal));
    }
}
