//! Tokenizer for the content of a `{{ ... }}` marker.

use crate::blocks::symbols::{
    is_blank, is_quote, ESCAPE_CHAR, NAMED_ARG_SEPARATOR, VAR_PREFIX,
};
use crate::blocks::{Block, FunctionIdBlock, NamedArgBlock, ValBlock, VarBlock};
use crate::error::TemplateError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenState {
    None,
    Variable,
    Value,
    FunctionId,
    NamedArg,
}

const SEPARATION_ERROR: &str = "tokens must be separated by at least one space";

/// Splits code such as `plugin.fn $input name='value'` into blocks.
///
/// Single left to right scan. Quoted values may contain spaces and use `\` to
/// escape either quote character or a backslash.
#[derive(Debug, Default, Clone, Copy)]
pub struct CodeTokenizer;

struct Scan<'a> {
    text: &'a str,
    blocks: Vec<Block>,
    current: String,
    state: TokenState,
    quote: char,
    in_quote: bool,
    separator_seen: bool,
    separated: bool,
}

impl<'a> Scan<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            blocks: Vec::new(),
            current: String::new(),
            state: TokenState::None,
            quote: '"',
            in_quote: false,
            separator_seen: false,
            separated: true,
        }
    }

    fn error(&self, message: &str) -> TemplateError {
        TemplateError::syntax(message, self.text)
    }

    fn emit(&mut self) {
        let content = std::mem::take(&mut self.current);
        let block: Block = match self.state {
            TokenState::None => return,
            TokenState::Variable => VarBlock::new(content).into(),
            TokenState::Value => ValBlock::new(content).into(),
            TokenState::FunctionId => FunctionIdBlock::new(content).into(),
            TokenState::NamedArg => NamedArgBlock::new(content).into(),
        };
        self.blocks.push(block);
        self.state = TokenState::None;
        self.in_quote = false;
        self.separator_seen = false;
    }

    fn start(&mut self, c: char) -> Result<(), TemplateError> {
        if !self.separated {
            return Err(self.error(SEPARATION_ERROR));
        }
        self.state = if c == VAR_PREFIX {
            TokenState::Variable
        } else if is_quote(c) {
            self.quote = c;
            self.in_quote = true;
            TokenState::Value
        } else if self.blocks.is_empty() {
            TokenState::FunctionId
        } else {
            TokenState::NamedArg
        };
        self.current.push(c);
        self.separated = false;
        Ok(())
    }

    /// Handles one char inside a quoted literal. Returns how many chars were consumed.
    fn quoted(&mut self, c: char, next: Option<char>) -> usize {
        if c == ESCAPE_CHAR {
            if let Some(n) = next.filter(|n| is_quote(*n) || *n == ESCAPE_CHAR) {
                self.current.push(n);
                return 2;
            }
        }
        self.current.push(c);
        if c == self.quote {
            self.in_quote = false;
            self.emit();
        }
        1
    }

    fn separator(&mut self, next: Option<char>) -> Result<usize, TemplateError> {
        self.current.push(NAMED_ARG_SEPARATOR);
        self.separator_seen = true;
        self.state = TokenState::NamedArg;
        match next {
            Some(n) if is_quote(n) => {
                self.quote = n;
                self.in_quote = true;
                self.current.push(n);
                Ok(2)
            }
            Some(n) if n == VAR_PREFIX => {
                self.current.push(n);
                Ok(2)
            }
            _ => Err(self.error(
                "the value of a named argument must start with a quote or the variable prefix $",
            )),
        }
    }
}

impl CodeTokenizer {
    pub fn new() -> Self {
        Self
    }

    pub fn tokenize(&self, text: &str) -> Result<Vec<Block>, TemplateError> {
        let text = text.trim();
        let chars: Vec<char> = text.chars().collect();

        match chars.as_slice() {
            [] => return Ok(Vec::new()),
            [c] => {
                let block: Block = if *c == VAR_PREFIX {
                    VarBlock::new(text).into()
                } else if is_quote(*c) {
                    ValBlock::new(text).into()
                } else {
                    FunctionIdBlock::new(text).into()
                };
                return Ok(vec![block]);
            }
            _ => {}
        }

        let mut scan = Scan::new(text);
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            let next = chars.get(i + 1).copied();

            if scan.in_quote {
                i += scan.quoted(c, next);
                continue;
            }

            if is_blank(c) {
                scan.emit();
                scan.separated = true;
                i += 1;
                continue;
            }

            match scan.state {
                TokenState::None => {
                    scan.start(c)?;
                    i += 1;
                }
                TokenState::FunctionId | TokenState::NamedArg
                    if c == NAMED_ARG_SEPARATOR && !scan.separator_seen =>
                {
                    i += scan.separator(next)?;
                }
                _ if is_quote(c) || c == VAR_PREFIX => {
                    return Err(scan.error(SEPARATION_ERROR));
                }
                _ => {
                    scan.current.push(c);
                    i += 1;
                }
            }
        }

        if scan.in_quote {
            return Err(scan.error("unterminated quoted value"));
        }
        scan.emit();
        Ok(scan.blocks)
    }
}
