//! Plans: trees of function invocations with variable propagation.
//!
//! A [`Plan`] is an arena of [`PlanNode`]s addressed by [`PlanNodeId`]; the
//! root is always [`PlanNodeId::ROOT`]. Each node owns a state slot in the
//! arena. A composite node runs its children one at a time: every child result
//! becomes the node's state `input`, declared outputs are mirrored into the
//! state and, when they are also outputs of the node, appended to
//! [`PLAN_RESULT_KEY`].

use async_recursion::async_recursion;
use once_cell::sync::Lazy;
use promptlang::{
    ContextVariables, ExecutionContext, FunctionError, FunctionView, INPUT_VAR,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// State key accumulating the results of steps whose outputs are plan outputs.
pub const PLAN_RESULT_KEY: &str = "PLAN.RESULT";

static VARIABLE_REF: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$(\w+)").unwrap());

#[derive(Debug, Error)]
pub enum PlanError {
    #[error("function not found: {0}")]
    FunctionNotFound(String),

    #[error("step `{step}` failed: {source}")]
    StepFailed {
        step: String,
        #[source]
        source: FunctionError,
    },

    #[error("plan execution cancelled")]
    Cancelled,

    #[error("invalid plan: {0}")]
    Invalid(String),

    #[error("plan serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlanNodeId(usize);

impl PlanNodeId {
    pub const ROOT: PlanNodeId = PlanNodeId(0);

    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for PlanNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Reference to a registered function, resolved at run time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionRef {
    pub plugin: String,
    pub name: String,
}

impl fmt::Display for FunctionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.plugin, self.name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanNode {
    pub name: String,
    pub plugin_name: String,
    pub description: String,
    /// Parameter values, possibly containing `$variable` references.
    pub parameters: ContextVariables,
    /// Variables this node publishes to its parent's state.
    pub outputs: Vec<String>,
    pub steps: Vec<PlanNodeId>,
    pub next_step_index: usize,
    /// `None` for composite nodes and for placeholders of missing functions.
    pub function: Option<FunctionRef>,
    /// Parameter names of the bound function.
    pub declared_parameters: Vec<String>,
}

impl PlanNode {
    fn composite(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            plugin_name: String::new(),
            description: description.into(),
            parameters: ContextVariables::new(),
            outputs: Vec::new(),
            steps: Vec::new(),
            next_step_index: 0,
            function: None,
            declared_parameters: Vec::new(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.function.is_none() && self.steps.is_empty()
    }

    fn label(&self) -> String {
        if self.plugin_name.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.plugin_name, self.name)
        }
    }
}

/// Variables a step reads from and writes to its parent's state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepIo {
    pub reads: Vec<String>,
    pub writes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    nodes: Vec<PlanNode>,
    states: Vec<ContextVariables>,
}

fn push_unique(list: &mut Vec<String>, name: &str) {
    if !list.iter().any(|n| n.eq_ignore_ascii_case(name)) {
        list.push(name.to_string());
    }
}

impl Plan {
    /// Empty composite plan for `goal`.
    pub fn new(goal: impl Into<String>) -> Self {
        Self {
            nodes: vec![PlanNode::composite("plan", goal)],
            states: vec![ContextVariables::new()],
        }
    }

    /// Single-node plan invoking `function`.
    pub fn from_function(function: &FunctionView) -> Self {
        let mut node = PlanNode::composite(function.name.clone(), function.description.clone());
        node.plugin_name = function.plugin_name.clone();
        node.function = Some(FunctionRef {
            plugin: function.plugin_name.clone(),
            name: function.name.clone(),
        });
        node.declared_parameters = function.parameters.iter().map(|p| p.name.clone()).collect();
        Self {
            nodes: vec![node],
            states: vec![ContextVariables::new()],
        }
    }

    /// Single-node placeholder for a function that is not registered.
    pub fn missing_function(plugin: impl Into<String>, name: impl Into<String>) -> Self {
        let mut node = PlanNode::composite(name, "");
        node.plugin_name = plugin.into();
        Self {
            nodes: vec![node],
            states: vec![ContextVariables::new()],
        }
    }

    pub fn root(&self) -> &PlanNode {
        &self.nodes[0]
    }

    pub fn root_mut(&mut self) -> &mut PlanNode {
        &mut self.nodes[0]
    }

    pub fn node(&self, id: PlanNodeId) -> Option<&PlanNode> {
        self.nodes.get(id.0)
    }

    pub fn node_mut(&mut self, id: PlanNodeId) -> Option<&mut PlanNode> {
        self.nodes.get_mut(id.0)
    }

    pub fn state(&self, id: PlanNodeId) -> Option<&ContextVariables> {
        self.states.get(id.0)
    }

    pub fn state_mut(&mut self, id: PlanNodeId) -> Option<&mut ContextVariables> {
        self.states.get_mut(id.0)
    }

    /// State of the root node.
    pub fn root_state(&self) -> &ContextVariables {
        &self.states[0]
    }

    pub fn description(&self) -> &str {
        &self.root().description
    }

    pub fn steps(&self) -> &[PlanNodeId] {
        &self.root().steps
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn has_next_step(&self) -> bool {
        self.node_has_next_step(PlanNodeId::ROOT)
    }

    fn node_has_next_step(&self, id: PlanNodeId) -> bool {
        self.nodes[id.0].next_step_index < self.nodes[id.0].steps.len()
    }

    /// Appends `step` as the last child of the root.
    pub fn add_step(&mut self, step: Plan) -> PlanNodeId {
        self.graft(PlanNodeId::ROOT, step)
    }

    /// Appends `step` as the last child of `parent`.
    pub fn add_step_to(&mut self, parent: PlanNodeId, step: Plan) -> Result<PlanNodeId, PlanError> {
        if parent.0 >= self.nodes.len() {
            return Err(PlanError::Invalid(format!("no node {}", parent)));
        }
        Ok(self.graft(parent, step))
    }

    fn graft(&mut self, parent: PlanNodeId, step: Plan) -> PlanNodeId {
        let offset = self.nodes.len();
        for (mut node, state) in step.nodes.into_iter().zip(step.states) {
            for child in node.steps.iter_mut() {
                child.0 += offset;
            }
            self.nodes.push(node);
            self.states.push(state);
        }
        let id = PlanNodeId(offset);
        self.nodes[parent.0].steps.push(id);
        id
    }

    pub fn add_output(&mut self, name: impl AsRef<str>) {
        push_unique(&mut self.root_mut().outputs, name.as_ref());
    }

    fn declared_parameter_names(&self, id: PlanNodeId) -> Vec<String> {
        let node = &self.nodes[id.0];
        if node.function.is_some() {
            node.declared_parameters.clone()
        } else {
            node.parameters.iter().map(|(k, _)| k.to_string()).collect()
        }
    }

    /// Variables `step` reads and writes, as named by its declaration.
    pub fn step_io(&self, step: PlanNodeId) -> Option<StepIo> {
        let node = self.nodes.get(step.0)?;
        let mut reads = Vec::new();
        for name in self.declared_parameter_names(step) {
            if !name.eq_ignore_ascii_case(INPUT_VAR) {
                push_unique(&mut reads, &name);
            }
        }
        for (_, value) in node.parameters.iter() {
            for cap in VARIABLE_REF.captures_iter(value) {
                push_unique(&mut reads, &cap[1]);
            }
        }
        Some(StepIo {
            reads,
            writes: node.outputs.clone(),
        })
    }

    /// Replaces `$name` references with caller values, then state values of `parent`.
    fn expand_from_variables(
        &self,
        parent: PlanNodeId,
        variables: &ContextVariables,
        text: &str,
    ) -> String {
        let mut names: Vec<&str> = Vec::new();
        for cap in VARIABLE_REF.captures_iter(text) {
            let name = cap.get(1).map(|m| m.as_str()).unwrap_or("");
            if !name.is_empty() && !names.contains(&name) {
                names.push(name);
            }
        }
        names.sort_by(|a, b| b.len().cmp(&a.len()));

        let state = &self.states[parent.0];
        let mut result = text.to_string();
        for name in names {
            if let Some(value) = variables.get(name).or_else(|| state.get(name)) {
                result = result.replace(&format!("${}", name), value);
            }
        }
        result
    }

    /// Variables passed to `step` when `parent` runs it with caller `variables`.
    pub fn resolve_step_variables(
        &self,
        parent: PlanNodeId,
        variables: &ContextVariables,
        step: PlanNodeId,
    ) -> ContextVariables {
        let node = &self.nodes[step.0];
        let parent_node = &self.nodes[parent.0];
        let state = &self.states[parent.0];

        let own_input = node.parameters.input();
        let input = if !own_input.is_empty() {
            self.expand_from_variables(parent, variables, own_input)
        } else if !variables.input().is_empty() {
            variables.input().to_string()
        } else if !state.input().is_empty() {
            state.input().to_string()
        } else if !node.steps.is_empty() {
            String::new()
        } else {
            parent_node.description.clone()
        };

        let mut step_variables = ContextVariables::with_input(input);

        for name in self.declared_parameter_names(step) {
            if name.eq_ignore_ascii_case(INPUT_VAR) {
                continue;
            }
            if let Some(value) = variables.get(&name) {
                step_variables.set(&name, value);
            } else if let Some(value) = state.get(&name).filter(|v| !v.is_empty()) {
                step_variables.set(&name, value);
            }
        }

        for (key, value) in node.parameters.iter() {
            if step_variables.contains(key) {
                continue;
            }
            let expanded = self.expand_from_variables(parent, variables, value);
            if !expanded.to_lowercase().eq(&value.to_lowercase()) {
                step_variables.set(key, expanded);
            } else if let Some(v) = variables.get(key) {
                step_variables.set(key, v);
            } else if let Some(v) = state.get(key) {
                step_variables.set(key, v);
            } else {
                step_variables.set(key, expanded);
            }
        }

        step_variables.merge_missing(variables);
        step_variables
    }

    /// Runs the next child of the root and returns the root state.
    pub async fn run_next_step(
        &mut self,
        ctx: &ExecutionContext<'_>,
        variables: ContextVariables,
    ) -> Result<ContextVariables, PlanError> {
        self.run_next_step_of(PlanNodeId::ROOT, ctx, variables).await?;
        Ok(self.states[0].clone())
    }

    #[async_recursion]
    async fn run_next_step_of<'c>(
        &mut self,
        parent: PlanNodeId,
        ctx: &ExecutionContext<'c>,
        variables: ContextVariables,
    ) -> Result<(), PlanError> {
        if !self.node_has_next_step(parent) {
            return Ok(());
        }
        if ctx.is_cancelled() {
            return Err(PlanError::Cancelled);
        }
        let step = self.nodes[parent.0].steps[self.nodes[parent.0].next_step_index];
        let step_variables = self.resolve_step_variables(parent, &variables, step);
        log::info!(
            "plan step {}/{}: {}",
            self.nodes[parent.0].next_step_index + 1,
            self.nodes[parent.0].steps.len(),
            self.nodes[step.0].label()
        );

        let result = self.invoke_node(step, ctx, step_variables).await?;
        let result_value = result.input().trim().to_string();

        let step_outputs = self.nodes[step.0].outputs.clone();
        let publishes_result = self.nodes[parent.0]
            .outputs
            .iter()
            .any(|o| step_outputs.iter().any(|s| s.eq_ignore_ascii_case(o)));

        let state = &mut self.states[parent.0];
        state.update(result_value.clone());
        for output in &step_outputs {
            match result.get(output) {
                Some(value) => state.set(output, value),
                None => state.set(output, result_value.clone()),
            }
        }
        if publishes_result {
            let accumulated = match state.get(PLAN_RESULT_KEY) {
                Some(current) => format!("{}\n{}", current, result_value),
                None => result_value.clone(),
            };
            state.set(PLAN_RESULT_KEY, accumulated);
        }

        self.nodes[parent.0].next_step_index += 1;
        Ok(())
    }

    /// Runs the whole plan (all remaining steps) with caller `variables`.
    pub async fn invoke(
        &mut self,
        ctx: &ExecutionContext<'_>,
        variables: ContextVariables,
    ) -> Result<ContextVariables, PlanError> {
        self.invoke_node(PlanNodeId::ROOT, ctx, variables).await
    }

    #[async_recursion]
    async fn invoke_node<'c>(
        &mut self,
        id: PlanNodeId,
        ctx: &ExecutionContext<'c>,
        mut variables: ContextVariables,
    ) -> Result<ContextVariables, PlanError> {
        if let Some(function_ref) = self.nodes[id.0].function.clone() {
            let function = ctx
                .resolve(Some(&function_ref.plugin), &function_ref.name)
                .ok_or_else(|| PlanError::FunctionNotFound(function_ref.to_string()))?;
            variables.merge_missing(&self.states[id.0]);
            log::debug!("invoking {} with {} variables", function_ref, variables.len());
            return function.invoke(ctx, variables).await.map_err(|source| {
                if source.is_cancelled() {
                    PlanError::Cancelled
                } else {
                    PlanError::StepFailed {
                        step: function_ref.to_string(),
                        source,
                    }
                }
            });
        }

        if self.nodes[id.0].steps.is_empty() {
            log::warn!(
                "skipping step {} without a registered function",
                self.nodes[id.0].label()
            );
            return Ok(variables);
        }

        while self.node_has_next_step(id) {
            let mut step_context = variables.clone();
            step_context.merge_missing(&self.states[id.0]);
            self.run_next_step_of(id, ctx, step_context).await?;
            self.update_context_with_outputs(id, &mut variables);
        }
        Ok(variables)
    }

    fn update_context_with_outputs(&self, id: PlanNodeId, variables: &mut ContextVariables) {
        let node = &self.nodes[id.0];
        let state = &self.states[id.0];
        let result = state
            .get(PLAN_RESULT_KEY)
            .unwrap_or_else(|| state.input())
            .to_string();
        variables.update(result.clone());

        let Some(last) = node
            .next_step_index
            .checked_sub(1)
            .and_then(|i| node.steps.get(i))
        else {
            return;
        };
        for output in &self.nodes[last.0].outputs {
            match state.get(output) {
                Some(value) => variables.set(output, value),
                None => variables.set(output, result.clone()),
            }
        }
    }

    /// Multi-line outline of the plan tree.
    pub fn outline(&self) -> String {
        let mut out = String::new();
        self.outline_node(PlanNodeId::ROOT, 0, &mut out);
        out
    }

    fn outline_node(&self, id: PlanNodeId, depth: usize, out: &mut String) {
        let node = &self.nodes[id.0];
        let indent = "  ".repeat(depth);
        if depth == 0 {
            out.push_str(&format!("{}{}\n", indent, node.description));
        } else {
            let params: Vec<String> = node
                .parameters
                .iter()
                .filter(|(_, v)| !v.is_empty())
                .map(|(k, v)| format!("{}={:?}", k, v))
                .collect();
            let marker = if node.is_placeholder() { " (missing)" } else { "" };
            out.push_str(&format!("{}- {}{} {}", indent, node.label(), marker, params.join(" ")));
            if !node.outputs.is_empty() {
                out.push_str(&format!(" -> {}", node.outputs.join(", ")));
            }
            out.push('\n');
        }
        for child in &node.steps {
            self.outline_node(*child, depth + 1, out);
        }
    }

    pub fn to_json(&self) -> Result<String, PlanError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserializes a plan and checks that every node id is in range.
    pub fn from_json(json: &str) -> Result<Self, PlanError> {
        let plan: Plan = serde_json::from_str(json)?;
        plan.check_structure()?;
        Ok(plan)
    }

    fn check_structure(&self) -> Result<(), PlanError> {
        if self.nodes.is_empty() {
            return Err(PlanError::Invalid("plan has no root node".to_string()));
        }
        if self.nodes.len() != self.states.len() {
            return Err(PlanError::Invalid(format!(
                "{} nodes but {} states",
                self.nodes.len(),
                self.states.len()
            )));
        }
        for (index, node) in self.nodes.iter().enumerate() {
            if node.next_step_index > node.steps.len() {
                return Err(PlanError::Invalid(format!(
                    "node #{} has cursor {} past its {} steps",
                    index,
                    node.next_step_index,
                    node.steps.len()
                )));
            }
            for child in &node.steps {
                if child.0 <= index || child.0 >= self.nodes.len() {
                    return Err(PlanError::Invalid(format!(
                        "node #{} references invalid step {}",
                        index, child
                    )));
                }
            }
        }
        Ok(())
    }

    /// Function references that `registry` cannot resolve.
    pub fn missing_functions(&self, registry: &dyn promptlang::FunctionRegistry) -> Vec<FunctionRef> {
        self.nodes
            .iter()
            .filter_map(|n| n.function.as_ref())
            .filter(|f| !registry.contains(&f.plugin, &f.name))
            .cloned()
            .collect()
    }
}
