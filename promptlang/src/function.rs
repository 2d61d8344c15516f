//! Contracts between the renderer and the functions it invokes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::error::FunctionError;
use crate::variables::ContextVariables;

/// Plugin name used for functions referenced without a `plugin.` prefix.
pub const GLOBAL_PLUGIN: &str = "_GLOBAL_FUNCTIONS_";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ParameterView {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
}

impl ParameterView {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            default_value: None,
        }
    }

    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }
}

/// Description of a registered function, as shown to planners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionView {
    pub plugin_name: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: Vec<ParameterView>,
    #[serde(default)]
    pub is_semantic: bool,
}

impl FunctionView {
    pub fn new(plugin_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            plugin_name: plugin_name.into(),
            name: name.into(),
            description: String::new(),
            parameters: Vec::new(),
            is_semantic: false,
        }
    }

    /// `plugin.name`, or just `name` for global functions.
    pub fn qualified_name(&self) -> String {
        if self.plugin_name.is_empty() || self.plugin_name == GLOBAL_PLUGIN {
            self.name.clone()
        } else {
            format!("{}.{}", self.plugin_name, self.name)
        }
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterView> {
        self.parameters
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for FunctionView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified_name())
    }
}

/// An invocable function.
///
/// Implementations receive a private copy of the caller's variables and return
/// the variables after execution; the new `input` is the function result.
#[async_trait]
pub trait Function: Send + Sync {
    fn view(&self) -> &FunctionView;

    async fn invoke(
        &self,
        ctx: &ExecutionContext<'_>,
        variables: ContextVariables,
    ) -> Result<ContextVariables, FunctionError>;
}

/// Lookup of functions by plugin and name, case-insensitive.
pub trait FunctionRegistry: Send + Sync {
    fn resolve(&self, plugin: &str, name: &str) -> Option<Arc<dyn Function>>;

    fn views(&self) -> Vec<FunctionView>;

    fn contains(&self, plugin: &str, name: &str) -> bool {
        self.resolve(plugin, name).is_some()
    }
}

/// Everything a render or an invocation needs from its caller.
#[derive(Clone)]
pub struct ExecutionContext<'a> {
    pub functions: &'a dyn FunctionRegistry,
    pub cancellation: CancellationToken,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(functions: &'a dyn FunctionRegistry) -> Self {
        Self {
            functions,
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Resolves `plugin` or the global plugin when it is `None`.
    pub fn resolve(&self, plugin: Option<&str>, name: &str) -> Option<Arc<dyn Function>> {
        self.functions.resolve(plugin.unwrap_or(GLOBAL_PLUGIN), name)
    }
}

impl fmt::Debug for ExecutionContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("functions", &self.functions.views().len())
            .field("cancelled", &self.cancellation.is_cancelled())
            .finish()
    }
}

/// Registry with no functions, for templates without code blocks.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFunctions;

impl FunctionRegistry for NoFunctions {
    fn resolve(&self, _plugin: &str, _name: &str) -> Option<Arc<dyn Function>> {
        None
    }

    fn views(&self) -> Vec<FunctionView> {
        Vec::new()
    }
}
