//! Planners: turn a goal into work over the kernel's functions.
//!
//! The sequential planner asks the model for a whole XML plan up front; the
//! stepwise planner runs a ReAct loop, one action per model turn.

pub mod sequential;
pub mod stepwise;

use promptlang::{FunctionRegistry, FunctionView};
use std::fmt::Write;

use crate::config::{SequentialConfig, StepwiseConfig};

/// Which functions a planner offers to the model.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionFilter {
    pub excluded_plugins: Vec<String>,
    pub excluded_functions: Vec<String>,
    /// When non-empty, only these functions are offered
    pub included_functions: Vec<String>,
}

fn matches_function(pattern: &str, view: &FunctionView) -> bool {
    pattern.eq_ignore_ascii_case(&view.name)
        || pattern.eq_ignore_ascii_case(&view.qualified_name())
}

impl FunctionFilter {
    pub fn allows(&self, view: &FunctionView) -> bool {
        if self
            .excluded_plugins
            .iter()
            .any(|p| p.eq_ignore_ascii_case(&view.plugin_name))
        {
            return false;
        }
        if self
            .excluded_functions
            .iter()
            .any(|f| matches_function(f, view))
        {
            return false;
        }
        self.included_functions.is_empty()
            || self
                .included_functions
                .iter()
                .any(|f| matches_function(f, view))
    }

    /// Views of every allowed function, sorted by qualified name.
    pub fn available_functions(&self, registry: &dyn FunctionRegistry) -> Vec<FunctionView> {
        let mut views: Vec<FunctionView> = registry
            .views()
            .into_iter()
            .filter(|v| self.allows(v))
            .collect();
        views.sort_by_key(|v| v.qualified_name().to_lowercase());
        views
    }
}

impl From<&SequentialConfig> for FunctionFilter {
    fn from(config: &SequentialConfig) -> Self {
        Self {
            excluded_plugins: config.excluded_plugins.clone(),
            excluded_functions: config.excluded_functions.clone(),
            included_functions: config.included_functions.clone(),
        }
    }
}

impl From<&StepwiseConfig> for FunctionFilter {
    fn from(config: &StepwiseConfig) -> Self {
        Self {
            excluded_plugins: config.excluded_plugins.clone(),
            excluded_functions: config.excluded_functions.clone(),
            included_functions: config.included_functions.clone(),
        }
    }
}

/// Manual entry for one function, as shown to the model.
pub fn function_manual_entry(view: &FunctionView) -> String {
    let mut entry = format!(
        "{}:\n  description: {}\n  inputs:\n",
        view.qualified_name(),
        view.description
    );
    for parameter in &view.parameters {
        let _ = write!(entry, "    - {}: {}", parameter.name, parameter.description);
        match parameter.default_value.as_deref() {
            Some(default) if !default.is_empty() => {
                let _ = write!(entry, " (default value: {})", default);
            }
            _ => {}
        }
        entry.push('\n');
    }
    entry
}

/// Manual of every function in `views`, separated by blank lines.
pub fn function_manual(views: &[FunctionView]) -> String {
    views
        .iter()
        .map(function_manual_entry)
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::{FunctionCatalog, NativeFunction, ParameterSchema};
    use pretty_assertions::assert_eq;
    use promptlang::GLOBAL_PLUGIN;

    fn catalog() -> FunctionCatalog {
        let mut catalog = FunctionCatalog::new();
        for (plugin, name) in [("math", "Add"), ("text", "trim"), ("wait", "seconds"), (GLOBAL_PLUGIN, "hello")] {
            catalog.register_native(
                NativeFunction::builder(plugin, name)
                    .description(format!("{} function", name))
                    .build_sync(|_| Ok(String::new())),
            );
        }
        catalog
    }

    #[test]
    fn test_filter_excludes_and_includes() {
        let catalog = catalog();
        let filter = FunctionFilter {
            excluded_plugins: vec!["WAIT".to_string()],
            excluded_functions: vec!["text.trim".to_string()],
            included_functions: vec![],
        };
        let names: Vec<String> = filter
            .available_functions(&catalog)
            .iter()
            .map(|v| v.qualified_name())
            .collect();
        assert_eq!(names, vec!["hello", "math.Add"]);

        let only = FunctionFilter {
            included_functions: vec!["trim".to_string()],
            ..FunctionFilter::default()
        };
        assert_eq!(only.available_functions(&catalog).len(), 1);
    }

    #[test]
    fn test_manual_lists_defaults() {
        let function = NativeFunction::builder("math", "Add")
            .description("Adds two numbers")
            .parameter(ParameterSchema::string("input").describe("First number"))
            .parameter(
                ParameterSchema::string("amount")
                    .describe("Second number")
                    .default_value("1"),
            )
            .build_sync(|_| Ok(String::new()));
        let mut catalog = FunctionCatalog::new();
        catalog.register_native(function);

        assert_eq!(
            function_manual(&catalog.views()),
            "math.Add:\n  description: Adds two numbers\n  inputs:\n    - input: First number\n    - amount: Second number (default value: 1)\n"
        );
    }
}
