//! Prompt templates and the block renderer.

use crate::blocks::{Block, CodeBlock};
use crate::error::TemplateError;
use crate::function::ExecutionContext;
use crate::tokenizer::TemplateTokenizer;
use crate::variables::ContextVariables;

/// A parsed template, ready to render any number of times.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    source: String,
    blocks: Vec<Block>,
}

impl PromptTemplate {
    /// Tokenizes and validates `source`.
    pub fn new(source: impl Into<String>) -> Result<Self, TemplateError> {
        let source = source.into();
        let blocks = extract_blocks(&source, true)?;
        Ok(Self { source, blocks })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Names of the variables the template reads, in order of first use.
    pub fn variable_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        let mut push = |name: &str| {
            if !name.is_empty() && !names.iter().any(|n| n.eq_ignore_ascii_case(name)) {
                names.push(name.to_string());
            }
        };
        for block in &self.blocks {
            match block {
                Block::Variable(var) => push(var.name()),
                Block::Code(code) => {
                    for token in code.tokens() {
                        match token {
                            Block::Variable(var) => push(var.name()),
                            Block::NamedArg(arg) => {
                                if let Some(name) = arg.variable_name() {
                                    push(name)
                                }
                            }
                            _ => {}
                        }
                    }
                }
                _ => {}
            }
        }
        names
    }

    pub async fn render(
        &self,
        ctx: &ExecutionContext<'_>,
        variables: &ContextVariables,
    ) -> Result<String, TemplateError> {
        render_blocks(&self.blocks, ctx, variables).await
    }
}

/// Tokenizes `text`, optionally checking every block.
pub fn extract_blocks(text: &str, validate: bool) -> Result<Vec<Block>, TemplateError> {
    log::trace!("extracting blocks from template: {}", text);
    let blocks = TemplateTokenizer::new().tokenize(text)?;
    if validate {
        for block in &blocks {
            block
                .validate()
                .map_err(|message| TemplateError::syntax(message, text))?;
        }
    }
    Ok(blocks)
}

/// Renders blocks in order and concatenates the results.
pub async fn render_blocks(
    blocks: &[Block],
    ctx: &ExecutionContext<'_>,
    variables: &ContextVariables,
) -> Result<String, TemplateError> {
    let mut out = String::new();
    for block in blocks {
        match block {
            Block::Text(text) => out.push_str(text.content()),
            Block::Value(val) => out.push_str(val.value()),
            Block::Variable(var) => out.push_str(&var.render(variables)),
            Block::Code(code) => out.push_str(&render_code(code, ctx, variables).await?),
            Block::FunctionId(_) | Block::NamedArg(_) => {
                return Err(TemplateError::Internal(format!(
                    "unexpected block at template level: {:?}",
                    block.block_type()
                )))
            }
        }
    }
    Ok(out)
}

/// Renders only the text, variable and value blocks, leaving code blocks as written.
pub fn render_variables(blocks: &[Block], variables: &ContextVariables) -> String {
    let mut out = String::new();
    for block in blocks {
        match block {
            Block::Text(text) => out.push_str(text.content()),
            Block::Value(val) => out.push_str(val.value()),
            Block::Variable(var) => out.push_str(&var.render(variables)),
            Block::Code(code) => {
                out.push_str("{{");
                out.push_str(code.content());
                out.push_str("}}");
            }
            other => out.push_str(other.content()),
        }
    }
    out
}

async fn render_code(
    code: &CodeBlock,
    ctx: &ExecutionContext<'_>,
    variables: &ContextVariables,
) -> Result<String, TemplateError> {
    code.validate().map_err(|message| TemplateError::InvalidBlock {
        message,
        content: code.content().to_string(),
    })?;

    let tokens = code.tokens();
    let function_id = match tokens.first() {
        Some(Block::Variable(var)) => return Ok(var.render(variables)),
        Some(Block::Value(val)) => return Ok(val.value().to_string()),
        Some(Block::FunctionId(id)) => id,
        _ => {
            return Err(TemplateError::InvalidBlock {
                message: "a code block must start with a function name".to_string(),
                content: code.content().to_string(),
            })
        }
    };

    let function = ctx
        .resolve(function_id.plugin_name(), function_id.function_name())
        .ok_or_else(|| TemplateError::FunctionNotFound(function_id.content().to_string()))?;

    let mut arguments = variables.clone();
    match code.positional_arg() {
        Some(Block::Variable(var)) => {
            arguments.update(var.render(variables));
        }
        Some(Block::Value(val)) => {
            arguments.update(val.value());
        }
        _ => {}
    }
    for arg in code.named_args() {
        arguments.set(arg.name(), arg.value(variables));
    }

    if ctx.is_cancelled() {
        return Err(TemplateError::Cancelled);
    }

    log::debug!("invoking {} from template", function.view());
    let result = function
        .invoke(ctx, arguments)
        .await
        .map_err(|source| {
            if source.is_cancelled() {
                TemplateError::Cancelled
            } else {
                TemplateError::FunctionFailed {
                    function: function_id.content().to_string(),
                    source,
                }
            }
        })?;
    Ok(result.input().to_string())
}
