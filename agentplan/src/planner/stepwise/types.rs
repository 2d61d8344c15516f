use indexmap::IndexMap;
use promptlang::ContextVariables;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One turn of the reasoning loop.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemStep {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub thought: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub action: String,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub action_variables: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub observation: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub final_answer: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub original_response: String,
}

impl SystemStep {
    pub fn has_action(&self) -> bool {
        !self.action.is_empty()
    }

    pub fn has_final_answer(&self) -> bool {
        !self.final_answer.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// The reply had neither a thought nor an action.
    MissingThoughtAndAction,
    /// `[ACTION]` was present but no JSON object followed it.
    MissingActionJson,
    /// The action JSON did not parse.
    InvalidActionJson,
}

/// A reply that could not be turned into a usable step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepDiagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    /// Whatever was recovered before the failure.
    pub partial: SystemStep,
}

impl fmt::Display for StepDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for StepDiagnostic {}

/// Counters reported with every finished session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionStats {
    pub iterations: usize,
    /// Invocation counts keyed by qualified function name, in first-call order.
    pub function_calls: IndexMap<String, usize>,
}

impl ExecutionStats {
    pub fn record_call(&mut self, function: &str) {
        *self.function_calls.entry(function.to_string()).or_insert(0) += 1;
    }

    pub fn total_calls(&self) -> usize {
        self.function_calls.values().sum()
    }

    /// `"N (plugin.fn(k), ...)"`, or `"0"` when nothing was called.
    pub fn function_count(&self) -> String {
        if self.function_calls.is_empty() {
            return "0".to_string();
        }
        let calls: Vec<String> = self
            .function_calls
            .iter()
            .map(|(name, count)| format!("{}({})", name, count))
            .collect();
        format!("{} ({})", self.total_calls(), calls.join(", "))
    }
}

/// Result of a stepwise session.
#[derive(Debug, Clone)]
pub struct StepwiseOutcome {
    pub answer: String,
    /// False when the iteration cap was hit without a final answer.
    pub found: bool,
    pub steps: Vec<SystemStep>,
    pub stats: ExecutionStats,
    /// Caller variables with the answer as input plus `step_count`,
    /// `steps_taken`, `iterations` and `function_count`.
    pub variables: ContextVariables,
}
