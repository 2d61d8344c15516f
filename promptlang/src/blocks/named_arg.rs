use super::symbols::{is_name_char, is_quote, NAMED_ARG_SEPARATOR, VAR_PREFIX};
use super::{ValBlock, VarBlock};
use crate::variables::ContextVariables;

#[derive(Debug, Clone, PartialEq, Eq)]
enum ArgValue {
    Literal(ValBlock),
    Variable(VarBlock),
    Invalid(String),
}

/// A `name=value` argument inside a code block. The value is either a quoted
/// literal or a `$variable`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedArgBlock {
    content: String,
    name: String,
    value: ArgValue,
}

impl NamedArgBlock {
    pub fn new(content: impl Into<String>) -> Self {
        let content = content.into().trim().to_string();
        let (name, raw_value) = match content.split_once(NAMED_ARG_SEPARATOR) {
            Some((name, value)) => (name.to_string(), value.to_string()),
            None => (content.clone(), String::new()),
        };
        let value = match raw_value.chars().next() {
            Some(c) if c == VAR_PREFIX => ArgValue::Variable(VarBlock::new(raw_value)),
            Some(c) if is_quote(c) => ArgValue::Literal(ValBlock::new(raw_value)),
            _ => ArgValue::Invalid(raw_value),
        };
        Self {
            content,
            name,
            value,
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the referenced variable when the value is `$name`.
    pub fn variable_name(&self) -> Option<&str> {
        match &self.value {
            ArgValue::Variable(var) => Some(var.name()),
            _ => None,
        }
    }

    /// Resolved argument value.
    pub fn value(&self, variables: &ContextVariables) -> String {
        match &self.value {
            ArgValue::Literal(val) => val.value().to_string(),
            ArgValue::Variable(var) => var.render(variables),
            ArgValue::Invalid(_) => String::new(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err(format!("a named argument must have a name: '{}'", self.content));
        }
        if !self.name.chars().all(is_name_char) {
            return Err(format!(
                "the argument name '{}' contains invalid characters, only alphanumeric chars and underscore are allowed",
                self.name
            ));
        }
        match &self.value {
            ArgValue::Literal(val) => val.validate(),
            ArgValue::Variable(var) => var.validate(),
            ArgValue::Invalid(raw) => Err(format!(
                "the value of argument '{}' must be a quoted literal or a variable, found '{}'",
                self.name, raw
            )),
        }
    }
}
