//! Sequential planner: asks the model for a complete XML plan in one completion.

mod parser;
mod planner;

pub use parser::{parse_plan, PlanParseError};
pub use planner::{SequentialPlanner, SequentialPlannerError, PLAN_PROMPT};
