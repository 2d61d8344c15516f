//! Lexical blocks produced by the tokenizers.
//!
//! A block is an immutable view over a slice of template text. Blocks are
//! created once by [`crate::tokenizer`] and only validated and rendered
//! afterwards.

mod code;
mod function_id;
mod named_arg;
mod text;
mod val;
mod var;

pub use code::CodeBlock;
pub use function_id::FunctionIdBlock;
pub use named_arg::NamedArgBlock;
pub use text::TextBlock;
pub use val::ValBlock;
pub use var::VarBlock;

use serde::{Deserialize, Serialize};

pub(crate) mod symbols {
    pub const BLOCK_STARTER: char = '{';
    pub const BLOCK_ENDER: char = '}';
    pub const VAR_PREFIX: char = '$';
    pub const DBL_QUOTE: char = '"';
    pub const SGL_QUOTE: char = '\'';
    pub const ESCAPE_CHAR: char = '\\';
    pub const NAMED_ARG_SEPARATOR: char = '=';
    pub const PLUGIN_SEPARATOR: char = '.';

    pub fn is_quote(c: char) -> bool {
        c == DBL_QUOTE || c == SGL_QUOTE
    }

    pub fn is_blank(c: char) -> bool {
        matches!(c, ' ' | '\t' | '\r' | '\n')
    }

    pub fn is_name_char(c: char) -> bool {
        c.is_ascii_alphanumeric() || c == '_'
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockType {
    Undefined,
    Text,
    Code,
    Variable,
    Value,
    FunctionId,
    NamedArg,
}

/// A single lexical block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Text(TextBlock),
    Code(CodeBlock),
    Variable(VarBlock),
    Value(ValBlock),
    FunctionId(FunctionIdBlock),
    NamedArg(NamedArgBlock),
}

impl Block {
    pub fn block_type(&self) -> BlockType {
        match self {
            Block::Text(_) => BlockType::Text,
            Block::Code(_) => BlockType::Code,
            Block::Variable(_) => BlockType::Variable,
            Block::Value(_) => BlockType::Value,
            Block::FunctionId(_) => BlockType::FunctionId,
            Block::NamedArg(_) => BlockType::NamedArg,
        }
    }

    /// Raw content of the block. Quoted values keep their quotes.
    pub fn content(&self) -> &str {
        match self {
            Block::Text(b) => b.content(),
            Block::Code(b) => b.content(),
            Block::Variable(b) => b.content(),
            Block::Value(b) => b.content(),
            Block::FunctionId(b) => b.content(),
            Block::NamedArg(b) => b.content(),
        }
    }

    /// Returns an error message when the block is not well formed.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Block::Text(_) => Ok(()),
            Block::Code(b) => b.validate(),
            Block::Variable(b) => b.validate(),
            Block::Value(b) => b.validate(),
            Block::FunctionId(b) => b.validate(),
            Block::NamedArg(b) => b.validate(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

impl From<TextBlock> for Block {
    fn from(b: TextBlock) -> Self {
        Block::Text(b)
    }
}

impl From<CodeBlock> for Block {
    fn from(b: CodeBlock) -> Self {
        Block::Code(b)
    }
}

impl From<VarBlock> for Block {
    fn from(b: VarBlock) -> Self {
        Block::Variable(b)
    }
}

impl From<ValBlock> for Block {
    fn from(b: ValBlock) -> Self {
        Block::Value(b)
    }
}

impl From<FunctionIdBlock> for Block {
    fn from(b: FunctionIdBlock) -> Self {
        Block::FunctionId(b)
    }
}

impl From<NamedArgBlock> for Block {
    fn from(b: NamedArgBlock) -> Self {
        Block::NamedArg(b)
    }
}
