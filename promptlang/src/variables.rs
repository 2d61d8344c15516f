//! Ordered, case-insensitive variable store passed between templates and functions.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reserved variable holding the main input/output of a function.
pub const INPUT_VAR: &str = "input";

/// String to string mapping with case-insensitive keys.
///
/// The `input` entry is always present. Keys keep the casing and position of
/// their first insertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    into = "IndexMap<String, String>",
    from = "IndexMap<String, String>"
)]
pub struct ContextVariables {
    // lowercased key -> (original key, value)
    entries: IndexMap<String, (String, String)>,
}

fn fold(key: &str) -> String {
    key.to_lowercase()
}

impl ContextVariables {
    pub fn new() -> Self {
        Self::with_input("")
    }

    pub fn with_input(input: impl Into<String>) -> Self {
        let mut entries = IndexMap::new();
        entries.insert(INPUT_VAR.to_string(), (INPUT_VAR.to_string(), input.into()));
        Self { entries }
    }

    pub fn input(&self) -> &str {
        self.get(INPUT_VAR).unwrap_or("")
    }

    /// Replace the `input` value.
    pub fn update(&mut self, input: impl Into<String>) -> &mut Self {
        self.set(INPUT_VAR, input);
        self
    }

    pub fn set(&mut self, key: impl AsRef<str>, value: impl Into<String>) {
        let key = key.as_ref();
        let value = value.into();
        match self.entries.get_mut(&fold(key)) {
            Some(slot) => slot.1 = value,
            None => {
                self.entries.insert(fold(key), (key.to_string(), value));
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(&fold(key)).map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(&fold(key))
    }

    /// Remove a variable. Removing `input` resets it to an empty string.
    pub fn remove(&mut self, key: &str) -> Option<String> {
        if fold(key) == INPUT_VAR {
            let previous = self.input().to_string();
            self.update("");
            return Some(previous);
        }
        self.entries.shift_remove(&fold(key)).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.values().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy every entry of `other` whose key is not already present.
    pub fn merge_missing(&mut self, other: &ContextVariables) {
        for (key, value) in other.iter() {
            if !self.contains(key) {
                self.set(key, value);
            }
        }
    }

    /// Copy every entry of `other`, overwriting existing values.
    pub fn extend_from(&mut self, other: &ContextVariables) {
        for (key, value) in other.iter() {
            self.set(key, value);
        }
    }
}

impl Default for ContextVariables {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContextVariables {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.input())
    }
}

impl From<IndexMap<String, String>> for ContextVariables {
    fn from(map: IndexMap<String, String>) -> Self {
        let mut vars = ContextVariables::new();
        for (k, v) in map {
            vars.set(k, v);
        }
        vars
    }
}

impl From<ContextVariables> for IndexMap<String, String> {
    fn from(vars: ContextVariables) -> Self {
        vars.entries.into_values().collect()
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for ContextVariables {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut vars = ContextVariables::new();
        for (k, v) in iter {
            vars.set(k, v);
        }
        vars
    }
}
