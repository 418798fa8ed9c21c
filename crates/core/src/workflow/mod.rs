pub mod engine;
pub mod evaluate;

pub use engine::{DecisionOutcome, SubmissionOutcome, WorkflowEngine, WorkflowError};
pub use evaluate::{evaluate_step, StepEvaluation};
