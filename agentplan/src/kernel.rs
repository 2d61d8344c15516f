use promptlang::{ContextVariables, ExecutionContext, PromptTemplate, TemplateError};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::completion::{CompletionClient, CompletionClientFactory, CompletionError};
use crate::config::KernelConfig;
use crate::functions::builtin::register_builtin_plugins;
use crate::functions::{FunctionCatalog, NativeFunction, SemanticFunction};
use crate::plan::{Plan, PlanError};

#[derive(Debug, Error)]
pub enum KernelError {
    #[error("invalid configuration: {}", .0.join("; "))]
    InvalidConfig(Vec<String>),
    #[error(transparent)]
    Completion(#[from] CompletionError),
}

/// Function catalog, completion client and configuration shared by planners.
pub struct Kernel {
    functions: FunctionCatalog,
    completion: Arc<dyn CompletionClient>,
    config: KernelConfig,
}

impl Kernel {
    /// Kernel with an explicit completion client and no functions.
    pub fn new(completion: Arc<dyn CompletionClient>, config: KernelConfig) -> Self {
        Self {
            functions: FunctionCatalog::new(),
            completion,
            config,
        }
    }

    /// Validates `config`, creates its completion client and registers the built-in plugins.
    pub fn from_config(config: KernelConfig) -> Result<Self, KernelError> {
        config.validate().map_err(KernelError::InvalidConfig)?;
        let completion = CompletionClientFactory::create(&config.llm)?;
        let mut kernel = Self::new(completion, config);
        kernel.register_builtin_plugins();
        Ok(kernel)
    }

    pub fn register_builtin_plugins(&mut self) {
        register_builtin_plugins(&mut self.functions);
    }

    pub fn functions(&self) -> &FunctionCatalog {
        &self.functions
    }

    pub fn functions_mut(&mut self) -> &mut FunctionCatalog {
        &mut self.functions
    }

    pub fn completion(&self) -> &Arc<dyn CompletionClient> {
        &self.completion
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn execution_context(&self, cancellation: CancellationToken) -> ExecutionContext<'_> {
        ExecutionContext::new(&self.functions).with_cancellation(cancellation)
    }

    pub fn register_native_function(&mut self, function: NativeFunction) {
        self.functions.register_native(function);
    }

    /// Registers `template` as a function completed by the kernel's client.
    pub fn register_semantic_function(
        &mut self,
        plugin: &str,
        name: &str,
        description: &str,
        template: &str,
    ) -> Result<(), TemplateError> {
        let function =
            SemanticFunction::new(plugin, name, description, template, self.completion.clone())?;
        self.functions.register_semantic(function);
        Ok(())
    }

    /// Renders a template against the kernel's functions.
    pub async fn render(
        &self,
        template: &str,
        variables: &ContextVariables,
        cancellation: CancellationToken,
    ) -> Result<String, TemplateError> {
        let template = PromptTemplate::new(template)?;
        template
            .render(&self.execution_context(cancellation), variables)
            .await
    }

    /// Runs every remaining step of `plan`.
    pub async fn run_plan(
        &self,
        plan: &mut Plan,
        variables: ContextVariables,
        cancellation: CancellationToken,
    ) -> Result<ContextVariables, PlanError> {
        let ctx = self.execution_context(cancellation);
        plan.invoke(&ctx, variables).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::ScriptedCompletionClient;
    use promptlang::FunctionRegistry;

    #[test]
    fn test_from_config_registers_builtins() {
        let kernel = Kernel::from_config(KernelConfig::default()).unwrap();
        assert!(kernel.functions().contains("math", "Add"));
        assert!(kernel.functions().contains("text", "uppercase"));
    }

    #[test]
    fn test_from_config_rejects_invalid() {
        let mut config = KernelConfig::default();
        config.stepwise.max_iterations = 0;
        assert!(matches!(
            Kernel::from_config(config),
            Err(KernelError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_render_with_semantic_function() {
        let client = Arc::new(ScriptedCompletionClient::new(["a haiku"]));
        let mut kernel = Kernel::new(client.clone(), KernelConfig::default());
        kernel.register_builtin_plugins();
        kernel
            .register_semantic_function("writer", "poem", "Write a poem", "Poem about {{$input}}")
            .unwrap();

        let rendered = kernel
            .render(
                "{{text.uppercase $topic}}: {{writer.poem $topic}}",
                &[("topic", "rain")].into_iter().collect(),
                CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(rendered, "RAIN: a haiku");
        assert_eq!(client.requests()[0].last_text(), "Poem about rain");
    }
}
