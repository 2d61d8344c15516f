//! Stepwise planner: a ReAct loop over chat completions.
//!
//! Each model turn yields a [`SystemStep`]. Actions are invoked against the
//! kernel's functions and their results fed back as observations until the
//! model gives a final answer or the iteration cap is reached.

mod history;
mod parser;
mod planner;
mod types;

pub use history::{estimate_message_tokens, estimate_tokens, fit_history};
pub use parser::{
    parse_step, ACTION_MARKER, FINAL_ANSWER_MARKER, OBSERVATION_MARKER, THOUGHT_MARKER,
};
pub use planner::{StepwiseError, StepwisePlanner, NOT_FOUND_MESSAGE, STEP_PROMPT};
pub use types::{DiagnosticKind, ExecutionStats, StepDiagnostic, StepwiseOutcome, SystemStep};
