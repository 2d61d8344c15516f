use super::{Block, BlockType, FunctionIdBlock};

/// A `{{ function arg name='value' }}` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    content: String,
    tokens: Vec<Block>,
}

impl CodeBlock {
    pub fn new(tokens: Vec<Block>, content: impl Into<String>) -> Self {
        Self {
            content: content.into().trim().to_string(),
            tokens,
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn tokens(&self) -> &[Block] {
        &self.tokens
    }

    pub fn function_id(&self) -> Option<&FunctionIdBlock> {
        match self.tokens.first() {
            Some(Block::FunctionId(id)) => Some(id),
            _ => None,
        }
    }

    /// Positional argument bound to `input`, if any.
    pub fn positional_arg(&self) -> Option<&Block> {
        self.tokens
            .get(1)
            .filter(|b| b.block_type() != BlockType::NamedArg)
    }

    pub fn named_args(&self) -> impl Iterator<Item = &super::NamedArgBlock> {
        self.tokens.iter().skip(1).filter_map(|b| match b {
            Block::NamedArg(arg) => Some(arg),
            _ => None,
        })
    }

    pub fn validate(&self) -> Result<(), String> {
        for token in &self.tokens {
            token.validate()?;
        }
        let Some(first) = self.tokens.first() else {
            return Err("the code block is empty".to_string());
        };
        if first.block_type() == BlockType::NamedArg {
            return Err(format!(
                "unexpected named argument found, expected a function name: '{}'",
                first.content()
            ));
        }
        if self.tokens.len() > 1 {
            if first.block_type() != BlockType::FunctionId {
                return Err(format!(
                    "unexpected second token found: '{}'",
                    self.tokens[1].content()
                ));
            }
            let second = &self.tokens[1];
            if !matches!(
                second.block_type(),
                BlockType::Value | BlockType::Variable | BlockType::NamedArg
            ) {
                return Err(
                    "the first argument must be a quoted value, a variable or a named argument"
                        .to_string(),
                );
            }
            for token in &self.tokens[2..] {
                if token.block_type() != BlockType::NamedArg {
                    return Err(format!(
                        "functions accept only named arguments after the first argument, found '{}'",
                        token.content()
                    ));
                }
            }
        }
        Ok(())
    }
}
