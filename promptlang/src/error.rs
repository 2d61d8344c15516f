//! Error types for template parsing, rendering and function invocation.

use thiserror::Error;

/// Errors raised while tokenizing or rendering a template.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// The template or code text could not be tokenized. `text` holds the raw input.
    #[error("syntax error: {message} (in `{text}`)")]
    Syntax { message: String, text: String },

    /// A block failed validation at render time.
    #[error("invalid block `{content}`: {message}")]
    InvalidBlock { message: String, content: String },

    #[error("function not found: {0}")]
    FunctionNotFound(String),

    #[error("function `{function}` failed: {source}")]
    FunctionFailed {
        function: String,
        #[source]
        source: FunctionError,
    },

    #[error("rendering cancelled")]
    Cancelled,

    #[error("internal template error: {0}")]
    Internal(String),
}

impl TemplateError {
    pub(crate) fn syntax(message: impl Into<String>, text: &str) -> Self {
        TemplateError::Syntax {
            message: message.into(),
            text: text.to_string(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        match self {
            TemplateError::Cancelled => true,
            TemplateError::FunctionFailed { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}

/// Errors raised by a function invocation.
#[derive(Debug, Error)]
pub enum FunctionError {
    #[error("missing argument `{parameter}` for {function}")]
    MissingArgument { function: String, parameter: String },

    #[error("invalid argument `{parameter}` for {function}: {message}")]
    InvalidArgument {
        function: String,
        parameter: String,
        message: String,
    },

    #[error("execution failed: {0}")]
    Execution(String),

    #[error("template error: {0}")]
    Template(#[from] Box<TemplateError>),

    #[error("completion failed: {0}")]
    Completion(String),

    #[error("function cancelled")]
    Cancelled,
}

impl FunctionError {
    pub fn is_cancelled(&self) -> bool {
        match self {
            FunctionError::Cancelled => true,
            FunctionError::Template(inner) => inner.is_cancelled(),
            _ => false,
        }
    }
}

impl From<TemplateError> for FunctionError {
    fn from(err: TemplateError) -> Self {
        if matches!(err, TemplateError::Cancelled) {
            FunctionError::Cancelled
        } else {
            FunctionError::Template(Box::new(err))
        }
    }
}
