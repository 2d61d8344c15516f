//! Two-level tokenizer: [`TemplateTokenizer`] finds `{{ }}` spans and hands
//! their content to [`CodeTokenizer`].

mod code;
mod template;

pub use code::CodeTokenizer;
pub use template::TemplateTokenizer;
