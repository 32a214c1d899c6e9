//! Sequential analysis pipeline: step definitions, the per-step executor, and the engine.

mod agent;
pub mod definition;
mod delegation;
mod engine;
pub mod types;

pub use agent::StepAgent;
pub use definition::{Pipeline, financial_pipeline};
pub use delegation::DelegateTool;
pub use engine::PipelineEngine;
pub use types::{
    AgentProfile, PipelineError, PipelineRequest, PipelineRun, RunState, StepDefinition, StepId,
    StepOutput, Verdict,
};
