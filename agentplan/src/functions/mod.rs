//! Function catalog: registration of native and semantic functions.

pub mod builtin;
mod native;
mod semantic;

pub use native::{
    NativeArgs, NativeFunction, NativeFunctionBuilder, NativeInvoker, ParameterSchema,
    ParameterType, TypedValue,
};
pub use semantic::SemanticFunction;

use indexmap::IndexMap;
use promptlang::{Function, FunctionRegistry, FunctionView, GLOBAL_PLUGIN};
use std::sync::Arc;

fn catalog_key(plugin: &str, name: &str) -> (String, String) {
    let plugin = if plugin.is_empty() { GLOBAL_PLUGIN } else { plugin };
    (plugin.to_lowercase(), name.to_lowercase())
}

/// Case-insensitive registry of functions keyed by plugin and name.
#[derive(Default, Clone)]
pub struct FunctionCatalog {
    functions: IndexMap<(String, String), Arc<dyn Function>>,
}

impl FunctionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a function, replacing any function with the same name.
    pub fn register(&mut self, function: Arc<dyn Function>) {
        let view = function.view();
        let key = catalog_key(&view.plugin_name, &view.name);
        if self.functions.contains_key(&key) {
            log::warn!("replacing registered function {}", view.qualified_name());
        } else {
            log::debug!("registered function {}", view.qualified_name());
        }
        self.functions.insert(key, function);
    }

    pub fn register_native(&mut self, function: NativeFunction) {
        self.register(Arc::new(function));
    }

    pub fn register_semantic(&mut self, function: SemanticFunction) {
        self.register(Arc::new(function));
    }

    pub fn get(&self, plugin: &str, name: &str) -> Option<&Arc<dyn Function>> {
        self.functions.get(&catalog_key(plugin, name))
    }

    /// Distinct plugin names, in registration order.
    pub fn plugins(&self) -> Vec<String> {
        let mut plugins: Vec<String> = Vec::new();
        for function in self.functions.values() {
            let plugin = &function.view().plugin_name;
            if !plugins.iter().any(|p| p.eq_ignore_ascii_case(plugin)) {
                plugins.push(plugin.clone());
            }
        }
        plugins
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl FunctionRegistry for FunctionCatalog {
    fn resolve(&self, plugin: &str, name: &str) -> Option<Arc<dyn Function>> {
        self.get(plugin, name).cloned()
    }

    fn views(&self) -> Vec<FunctionView> {
        self.functions.values().map(|f| f.view().clone()).collect()
    }
}

impl std::fmt::Debug for FunctionCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.functions.values().map(|func| func.view().qualified_name()))
            .finish()
    }
}
