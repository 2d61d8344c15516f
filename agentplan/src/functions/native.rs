//! Native functions: an explicit table of typed parameters and an async invoker.

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use indexmap::IndexMap;
use promptlang::{
    ContextVariables, ExecutionContext, Function, FunctionError, FunctionView, ParameterView,
    INPUT_VAR,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterType {
    String,
    Integer,
    Number,
    Boolean,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    String(String),
    Integer(i64),
    Number(f64),
    Boolean(bool),
}

impl ParameterType {
    /// Coerces a raw variable value to this type.
    pub fn parse(&self, raw: &str) -> Result<TypedValue, String> {
        let trimmed = raw.trim();
        match self {
            ParameterType::String => Ok(TypedValue::String(raw.to_string())),
            ParameterType::Integer => trimmed
                .parse::<i64>()
                .map(TypedValue::Integer)
                .map_err(|_| format!("'{}' is not an integer", raw)),
            ParameterType::Number => trimmed
                .parse::<f64>()
                .map(TypedValue::Number)
                .map_err(|_| format!("'{}' is not a number", raw)),
            ParameterType::Boolean => match trimmed.to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Ok(TypedValue::Boolean(true)),
                "false" | "no" | "0" => Ok(TypedValue::Boolean(false)),
                _ => Err(format!("'{}' is not a boolean", raw)),
            },
        }
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypedValue::String(s) => f.write_str(s),
            TypedValue::Integer(i) => write!(f, "{}", i),
            TypedValue::Number(n) => write!(f, "{}", n),
            TypedValue::Boolean(b) => write!(f, "{}", b),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSchema {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub ty: ParameterType,
    #[serde(default)]
    pub default: Option<String>,
}

impl ParameterSchema {
    pub fn new(name: impl Into<String>, ty: ParameterType) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            ty,
            default: None,
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, ParameterType::String)
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default = Some(value.into());
        self
    }

    fn view(&self) -> ParameterView {
        ParameterView {
            name: self.name.clone(),
            description: self.description.clone(),
            default_value: self.default.clone(),
        }
    }
}

/// Arguments bound and coerced for one native invocation.
#[derive(Debug, Clone)]
pub struct NativeArgs {
    function: String,
    values: IndexMap<String, TypedValue>,
    variables: ContextVariables,
    cancellation: CancellationToken,
}

impl NativeArgs {
    fn missing(&self, name: &str) -> FunctionError {
        FunctionError::MissingArgument {
            function: self.function.clone(),
            parameter: name.to_string(),
        }
    }

    fn mismatch(&self, name: &str, expected: &str) -> FunctionError {
        FunctionError::InvalidArgument {
            function: self.function.clone(),
            parameter: name.to_string(),
            message: format!("expected {}", expected),
        }
    }

    pub fn get(&self, name: &str) -> Option<&TypedValue> {
        self.values.get(&name.to_lowercase())
    }

    pub fn str(&self, name: &str) -> Result<&str, FunctionError> {
        match self.get(name) {
            Some(TypedValue::String(s)) => Ok(s),
            Some(_) => Err(self.mismatch(name, "a string")),
            None => Err(self.missing(name)),
        }
    }

    pub fn int(&self, name: &str) -> Result<i64, FunctionError> {
        match self.get(name) {
            Some(TypedValue::Integer(i)) => Ok(*i),
            Some(_) => Err(self.mismatch(name, "an integer")),
            None => Err(self.missing(name)),
        }
    }

    pub fn number(&self, name: &str) -> Result<f64, FunctionError> {
        match self.get(name) {
            Some(TypedValue::Number(n)) => Ok(*n),
            Some(TypedValue::Integer(i)) => Ok(*i as f64),
            Some(_) => Err(self.mismatch(name, "a number")),
            None => Err(self.missing(name)),
        }
    }

    pub fn boolean(&self, name: &str) -> Result<bool, FunctionError> {
        match self.get(name) {
            Some(TypedValue::Boolean(b)) => Ok(*b),
            Some(_) => Err(self.mismatch(name, "a boolean")),
            None => Err(self.missing(name)),
        }
    }

    pub fn input(&self) -> &str {
        self.variables.input()
    }

    /// All variables visible to the call, including those not declared as parameters.
    pub fn variables(&self) -> &ContextVariables {
        &self.variables
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }
}

pub type NativeInvoker =
    Arc<dyn Fn(NativeArgs) -> BoxFuture<'static, Result<String, FunctionError>> + Send + Sync>;

/// A function implemented in Rust, described by a parameter table.
#[derive(Clone)]
pub struct NativeFunction {
    view: FunctionView,
    parameters: Vec<ParameterSchema>,
    invoker: NativeInvoker,
}

impl fmt::Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeFunction")
            .field("view", &self.view)
            .field("parameters", &self.parameters)
            .finish()
    }
}

impl NativeFunction {
    pub fn builder(plugin: impl Into<String>, name: impl Into<String>) -> NativeFunctionBuilder {
        NativeFunctionBuilder {
            view: FunctionView::new(plugin, name),
            parameters: Vec::new(),
        }
    }

    pub fn parameters(&self) -> &[ParameterSchema] {
        &self.parameters
    }

    fn bind(
        &self,
        variables: &ContextVariables,
        cancellation: CancellationToken,
    ) -> Result<NativeArgs, FunctionError> {
        let function = self.view.qualified_name();
        let mut values = IndexMap::new();
        for schema in &self.parameters {
            let raw = if schema.name.eq_ignore_ascii_case(INPUT_VAR) {
                let input = variables.input();
                if input.is_empty() {
                    schema.default.as_deref().or(Some(input))
                } else {
                    Some(input)
                }
            } else {
                variables.get(&schema.name).or(schema.default.as_deref())
            };
            let Some(raw) = raw else {
                return Err(FunctionError::MissingArgument {
                    function,
                    parameter: schema.name.clone(),
                });
            };
            let value = schema
                .ty
                .parse(raw)
                .map_err(|message| FunctionError::InvalidArgument {
                    function: function.clone(),
                    parameter: schema.name.clone(),
                    message,
                })?;
            values.insert(schema.name.to_lowercase(), value);
        }
        Ok(NativeArgs {
            function,
            values,
            variables: variables.clone(),
            cancellation,
        })
    }
}

#[async_trait]
impl Function for NativeFunction {
    fn view(&self) -> &FunctionView {
        &self.view
    }

    async fn invoke(
        &self,
        ctx: &ExecutionContext<'_>,
        mut variables: ContextVariables,
    ) -> Result<ContextVariables, FunctionError> {
        let args = self.bind(&variables, ctx.cancellation.clone())?;
        log::debug!("native {} invoked", self.view.qualified_name());
        let result = tokio::select! {
            _ = ctx.cancellation.cancelled() => return Err(FunctionError::Cancelled),
            result = (self.invoker)(args) => result?,
        };
        variables.update(result);
        Ok(variables)
    }
}

pub struct NativeFunctionBuilder {
    view: FunctionView,
    parameters: Vec<ParameterSchema>,
}

impl NativeFunctionBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.view.description = description.into();
        self
    }

    pub fn parameter(mut self, schema: ParameterSchema) -> Self {
        self.parameters.push(schema);
        self
    }

    /// Finishes the function with an async body.
    pub fn build<F, Fut>(self, body: F) -> NativeFunction
    where
        F: Fn(NativeArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String, FunctionError>> + Send + 'static,
    {
        let invoker: NativeInvoker = Arc::new(move |args| body(args).boxed());
        self.finish(invoker)
    }

    /// Finishes the function with a synchronous body.
    pub fn build_sync<F>(self, body: F) -> NativeFunction
    where
        F: Fn(&NativeArgs) -> Result<String, FunctionError> + Send + Sync + 'static,
    {
        let body = Arc::new(body);
        let invoker: NativeInvoker = Arc::new(move |args: NativeArgs| {
            let body = body.clone();
            async move { body(&args) }.boxed()
        });
        self.finish(invoker)
    }

    fn finish(mut self, invoker: NativeInvoker) -> NativeFunction {
        self.view.parameters = self.parameters.iter().map(ParameterSchema::view).collect();
        self.view.is_semantic = false;
        NativeFunction {
            view: self.view,
            parameters: self.parameters,
            invoker,
        }
    }
}
