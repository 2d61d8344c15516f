use super::symbols::is_quote;

/// A quoted literal, `'text'` or `"text"`.
///
/// `content()` keeps the delimiting quotes; `value()` is the text between them.
/// Escapes are resolved by the tokenizer before the block is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValBlock {
    content: String,
}

impl ValBlock {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into().trim().to_string(),
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn value(&self) -> &str {
        let mut chars = self.content.chars();
        match (chars.next(), chars.next_back()) {
            (Some(first), Some(last)) if is_quote(first) => {
                let start = first.len_utf8();
                let end = self.content.len() - last.len_utf8();
                if start <= end {
                    &self.content[start..end]
                } else {
                    ""
                }
            }
            _ => "",
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        let mut chars = self.content.chars();
        let (first, last) = match (chars.next(), chars.next_back()) {
            (Some(f), Some(l)) => (f, l),
            _ => return Err("a value must have single quotes or double quotes on both sides".into()),
        };
        if !is_quote(first) {
            return Err("a value must be wrapped in single quotes or double quotes".into());
        }
        if first != last {
            return Err(format!(
                "a value must be defined using either single quotes or double quotes, not both ({}...{})",
                first, last
            ));
        }
        Ok(())
    }
}
