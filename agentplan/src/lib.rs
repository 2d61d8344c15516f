//! Plan execution over promptlang templates.
//!
//! A [`Kernel`] holds the function catalog and the completion client. Plans are
//! trees of function steps run with [`Plan::invoke`]; the sequential planner
//! builds them from an XML document written by the model, and the stepwise
//! planner answers a question one action at a time.

pub mod completion;
pub mod config;
pub mod functions;
pub mod kernel;
pub mod plan;
pub mod planner;

#[cfg(feature = "cli")]
pub mod cli;

pub use completion::{
    ChatHistory, CompletionClient, CompletionClientFactory, CompletionError, CompletionSettings,
    ScriptedCompletionClient,
};
pub use config::{KernelConfig, LlmConfig, LlmProviderType, SequentialConfig, StepwiseConfig};
pub use functions::{FunctionCatalog, NativeFunction, ParameterSchema, ParameterType, SemanticFunction};
pub use kernel::{Kernel, KernelError};
pub use plan::{Plan, PlanError, PlanNode, PlanNodeId, PLAN_RESULT_KEY};
pub use planner::sequential::{SequentialPlanner, SequentialPlannerError};
pub use planner::stepwise::{StepwiseError, StepwiseOutcome, StepwisePlanner, SystemStep};

pub use promptlang;
