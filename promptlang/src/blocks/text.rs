/// Literal text outside of `{{ }}` markers, rendered verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextBlock {
    content: String,
}

impl TextBlock {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }

    /// Text block over `text[start..end]`, clamped to the string bounds.
    pub fn from_span(text: &str, start: usize, end: usize) -> Self {
        let end = end.min(text.len());
        let start = start.min(end);
        Self::new(&text[start..end])
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}
