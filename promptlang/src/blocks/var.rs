use super::symbols::{is_name_char, VAR_PREFIX};
use crate::variables::ContextVariables;

/// A `$name` reference to a context variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarBlock {
    content: String,
}

impl VarBlock {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into().trim().to_string(),
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Variable name without the `$` prefix.
    pub fn name(&self) -> &str {
        self.content.strip_prefix(VAR_PREFIX).unwrap_or("")
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.content.starts_with(VAR_PREFIX) {
            return Err(format!(
                "a variable must start with the symbol {} and have a name",
                VAR_PREFIX
            ));
        }
        let name = self.name();
        if name.is_empty() {
            return Err("the variable name is empty".to_string());
        }
        if !name.chars().all(is_name_char) {
            return Err(format!(
                "the variable name '{}' contains invalid characters, only alphanumeric chars and underscore are allowed",
                name
            ));
        }
        Ok(())
    }

    /// Value of the variable, or an empty string when it is not defined.
    pub fn render(&self, variables: &ContextVariables) -> String {
        match variables.get(self.name()) {
            Some(value) => value.to_string(),
            None => {
                log::warn!("variable `{}` not found, rendering empty string", self.name());
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validates_names() {
        assert!(VarBlock::new("$name_1").validate().is_ok());
        assert!(VarBlock::new(" $x ").validate().is_ok());
        assert!(VarBlock::new("$").validate().is_err());
        assert!(VarBlock::new("name").validate().is_err());
        assert!(VarBlock::new("$a-b").validate().is_err());
    }

    #[test]
    fn test_missing_variable_renders_empty() {
        let mut vars = ContextVariables::new();
        vars.set("City", "Paris");
        assert_eq!(VarBlock::new("$city").render(&vars), "Paris");
        assert_eq!(VarBlock::new("$country").render(&vars), "");
    }
}
