//! Prompt template language.
//!
//! Templates are plain text with `{{ ... }}` markers:
//!
//! - `{{ $name }}` substitutes a variable (empty when missing)
//! - `{{ 'literal' }}` renders a quoted value
//! - `{{ plugin.function $arg name='value' }}` invokes a function and renders its result
//!
//! Rendering needs an [`ExecutionContext`] carrying the function registry and a
//! cancellation token; there is no ambient global state.

pub mod blocks;
pub mod error;
pub mod function;
pub mod template;
pub mod tokenizer;
pub mod variables;

pub use blocks::{Block, BlockType};
pub use error::{FunctionError, TemplateError};
pub use function::{
    ExecutionContext, Function, FunctionRegistry, FunctionView, NoFunctions, ParameterView,
    GLOBAL_PLUGIN,
};
pub use template::{extract_blocks, render_blocks, render_variables, PromptTemplate};
pub use tokenizer::{CodeTokenizer, TemplateTokenizer};
pub use variables::{ContextVariables, INPUT_VAR};
