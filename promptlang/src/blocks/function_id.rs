use super::symbols::{is_name_char, PLUGIN_SEPARATOR};

/// A function reference, `name` or `plugin.name`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionIdBlock {
    content: String,
}

impl FunctionIdBlock {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into().trim().to_string(),
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Plugin part of the reference, `None` for global functions.
    pub fn plugin_name(&self) -> Option<&str> {
        self.content
            .split_once(PLUGIN_SEPARATOR)
            .map(|(plugin, _)| plugin)
    }

    pub fn function_name(&self) -> &str {
        match self.content.split_once(PLUGIN_SEPARATOR) {
            Some((_, name)) => name,
            None => &self.content,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.content.is_empty() {
            return Err("the function identifier is empty".to_string());
        }
        if !self
            .content
            .chars()
            .all(|c| is_name_char(c) || c == PLUGIN_SEPARATOR)
        {
            return Err(format!(
                "the function identifier '{}' contains invalid characters, only alphanumeric chars, underscore and a single dot are allowed",
                self.content
            ));
        }
        if self.content.matches(PLUGIN_SEPARATOR).count() > 1 {
            return Err(format!(
                "the function identifier '{}' can contain at most one dot separating the plugin name from the function name",
                self.content
            ));
        }
        if self.function_name().is_empty() || self.plugin_name() == Some("") {
            return Err(format!("the function identifier '{}' is incomplete", self.content));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splits_plugin_and_function() {
        let id = FunctionIdBlock::new("math.Add");
        assert_eq!(id.plugin_name(), Some("math"));
        assert_eq!(id.function_name(), "Add");
        let global = FunctionIdBlock::new("echo");
        assert_eq!(global.plugin_name(), None);
        assert_eq!(global.function_name(), "echo");
    }

    #[test]
    fn test_rejects_invalid_ids() {
        assert!(FunctionIdBlock::new("a.b.c").validate().is_err());
        assert!(FunctionIdBlock::new("a-b").validate().is_err());
        assert!(FunctionIdBlock::new(".b").validate().is_err());
        assert!(FunctionIdBlock::new("a.").validate().is_err());
        assert!(FunctionIdBlock::new("plugin_1.fn_2").validate().is_ok());
    }
}
