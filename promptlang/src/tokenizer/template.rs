//! Tokenizer splitting a template into text and `{{ ... }}` blocks.

use super::CodeTokenizer;
use crate::blocks::symbols::{is_quote, BLOCK_ENDER, BLOCK_STARTER, ESCAPE_CHAR};
use crate::blocks::{Block, CodeBlock, TextBlock};
use crate::error::TemplateError;

/// Shortest text that can contain a non-empty block, `{{x}}`.
const MIN_CODE_BLOCK_LENGTH: usize = 5;

#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateTokenizer {
    code: CodeTokenizer,
}

impl TemplateTokenizer {
    pub fn new() -> Self {
        Self {
            code: CodeTokenizer::new(),
        }
    }

    /// Splits `text` into blocks, in source order.
    ///
    /// An unterminated `{{` is kept as text. Quotes are only tracked inside a
    /// block so that `}}` inside a quoted literal does not close it.
    pub fn tokenize(&self, text: &str) -> Result<Vec<Block>, TemplateError> {
        if text.is_empty() {
            return Ok(vec![TextBlock::new("").into()]);
        }
        if text.len() < MIN_CODE_BLOCK_LENGTH {
            return Ok(vec![TextBlock::new(text).into()]);
        }

        let chars: Vec<(usize, char)> = text.char_indices().collect();
        let mut blocks = Vec::new();
        let mut end_of_last_block = 0;
        let mut block_start = 0;
        let mut block_start_found = false;
        let mut inside_value = false;
        let mut delimiter = '"';
        let mut skip_next = false;

        for cursor in 0..chars.len().saturating_sub(1) {
            if skip_next {
                skip_next = false;
                continue;
            }
            let (pos, current) = chars[cursor];
            let next = chars[cursor + 1].1;

            if !inside_value && current == BLOCK_STARTER && next == BLOCK_STARTER {
                block_start = pos;
                block_start_found = true;
            }
            if !block_start_found {
                continue;
            }

            if inside_value {
                if current == ESCAPE_CHAR && (is_quote(next) || next == ESCAPE_CHAR) {
                    skip_next = true;
                    continue;
                }
                if current == delimiter {
                    inside_value = false;
                }
            } else if is_quote(current) {
                inside_value = true;
                delimiter = current;
            } else if current == BLOCK_ENDER && next == BLOCK_ENDER {
                if block_start > end_of_last_block {
                    blocks.push(TextBlock::from_span(text, end_of_last_block, block_start).into());
                }
                let block_end = pos + 2;
                let with_delimiters = &text[block_start..block_end];
                let inner = with_delimiters[2..with_delimiters.len() - 2].trim();
                if inner.is_empty() {
                    blocks.push(TextBlock::new(with_delimiters).into());
                } else {
                    blocks.push(self.code_block(inner)?);
                }
                end_of_last_block = block_end;
                block_start_found = false;
            }
        }

        if end_of_last_block < text.len() {
            blocks.push(TextBlock::from_span(text, end_of_last_block, text.len()).into());
        }
        Ok(blocks)
    }

    fn code_block(&self, inner: &str) -> Result<Block, TemplateError> {
        let mut tokens = self.code.tokenize(inner)?;
        match tokens.first() {
            Some(Block::Variable(_)) | Some(Block::Value(_)) => {
                if tokens.len() > 1 {
                    return Err(TemplateError::syntax(
                        "invalid token detected after the variable/value",
                        inner,
                    ));
                }
                Ok(tokens.remove(0))
            }
            Some(Block::FunctionId(_)) => Ok(CodeBlock::new(tokens, inner).into()),
            Some(other) => Err(TemplateError::Internal(format!(
                "code tokenizer returned an unexpected first token {:?} for `{}`",
                other.block_type(),
                inner
            ))),
            None => Err(TemplateError::Internal(format!(
                "code tokenizer returned no tokens for `{}`",
                inner
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::BlockType;
    use pretty_assertions::assert_eq;

    fn kinds(text: &str) -> Vec<(BlockType, String)> {
        TemplateTokenizer::new()
            .tokenize(text)
            .unwrap()
            .iter()
            .map(|b| (b.block_type(), b.content().to_string()))
            .collect()
    }

    #[test]
    fn test_empty_and_short_text() {
        assert_eq!(kinds(""), vec![(BlockType::Text, "".into())]);
        assert_eq!(kinds("{{x"), vec![(BlockType::Text, "{{x".into())]);
        assert_eq!(kinds("{{}}"), vec![(BlockType::Text, "{{}}".into())]);
    }

    #[test]
    fn test_mixed_text_and_blocks() {
        assert_eq!(
            kinds("Hello {{ $name }}, today is {{time.today}}!"),
            vec![
                (BlockType::Text, "Hello ".into()),
                (BlockType::Variable, "$name".into()),
                (BlockType::Text, ", today is ".into()),
                (BlockType::Code, "time.today".into()),
                (BlockType::Text, "!".into()),
            ]
        );
    }

    #[test]
    fn test_empty_block_is_text() {
        assert_eq!(
            kinds("a {{  }} b"),
            vec![
                (BlockType::Text, "a ".into()),
                (BlockType::Text, "{{  }}".into()),
                (BlockType::Text, " b".into()),
            ]
        );
    }

    #[test]
    fn test_nested_opener_restarts_block() {
        assert_eq!(
            kinds("{{ {{x}}"),
            vec![
                (BlockType::Text, "{{ ".into()),
                (BlockType::Code, "x".into()),
            ]
        );
    }

    #[test]
    fn test_closer_inside_quotes_does_not_close() {
        assert_eq!(
            kinds("{{ f '}}' }} end"),
            vec![
                (BlockType::Code, "f '}}'".into()),
                (BlockType::Text, " end".into()),
            ]
        );
        assert_eq!(
            kinds(r#"{{ 'a\'}}' }}"#),
            vec![(BlockType::Value, "'a'}}'".into())]
        );
    }

    #[test]
    fn test_unterminated_block_is_text() {
        assert_eq!(kinds("abc {{ $x"), vec![(BlockType::Text, "abc {{ $x".into())]);
        assert_eq!(
            kinds("{{$a}} {{ $x"),
            vec![
                (BlockType::Variable, "$a".into()),
                (BlockType::Text, " {{ $x".into()),
            ]
        );
    }

    #[test]
    fn test_extra_tokens_after_variable_fail() {
        let err = TemplateTokenizer::new().tokenize("{{ $a $b }}").unwrap_err();
        assert!(matches!(err, TemplateError::Syntax { .. }));
    }

    #[test]
    fn test_named_arg_first_is_internal_error() {
        let err = TemplateTokenizer::new().tokenize("{{ a='b' }}").unwrap_err();
        assert!(matches!(err, TemplateError::Internal(_)));
    }
}
