//! Semantic functions: a prompt template sent to the completion client.

use async_trait::async_trait;
use promptlang::{
    ContextVariables, ExecutionContext, Function, FunctionError, FunctionView, ParameterView,
    PromptTemplate, TemplateError,
};
use std::sync::Arc;

use crate::completion::{CompletionClient, CompletionError, CompletionSettings};

pub struct SemanticFunction {
    view: FunctionView,
    template: PromptTemplate,
    client: Arc<dyn CompletionClient>,
    settings: CompletionSettings,
}

impl SemanticFunction {
    /// Parses `template`; the function's parameters are the variables it reads.
    pub fn new(
        plugin: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        template: &str,
        client: Arc<dyn CompletionClient>,
    ) -> Result<Self, TemplateError> {
        let template = PromptTemplate::new(template)?;
        let mut view = FunctionView::new(plugin, name);
        view.description = description.into();
        view.is_semantic = true;
        view.parameters = template
            .variable_names()
            .into_iter()
            .map(|name| ParameterView::new(name, ""))
            .collect();
        Ok(Self {
            view,
            template,
            client,
            settings: CompletionSettings::default(),
        })
    }

    pub fn with_settings(mut self, settings: CompletionSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Sets the description of a parameter read by the template.
    pub fn describe_parameter(mut self, name: &str, description: impl Into<String>) -> Self {
        if let Some(p) = self
            .view
            .parameters
            .iter_mut()
            .find(|p| p.name.eq_ignore_ascii_case(name))
        {
            p.description = description.into();
        }
        self
    }

    pub fn template(&self) -> &PromptTemplate {
        &self.template
    }
}

#[async_trait]
impl Function for SemanticFunction {
    fn view(&self) -> &FunctionView {
        &self.view
    }

    async fn invoke(
        &self,
        ctx: &ExecutionContext<'_>,
        mut variables: ContextVariables,
    ) -> Result<ContextVariables, FunctionError> {
        let prompt = self.template.render(ctx, &variables).await?;
        log::debug!(
            "semantic {} rendered prompt ({} chars)",
            self.view.qualified_name(),
            prompt.len()
        );
        let completion = self
            .client
            .complete_text(&prompt, &self.settings, &ctx.cancellation)
            .await
            .map_err(|e| match e {
                CompletionError::Cancelled => FunctionError::Cancelled,
                other => FunctionError::Completion(other.to_string()),
            })?;
        variables.update(completion);
        Ok(variables)
    }
}
