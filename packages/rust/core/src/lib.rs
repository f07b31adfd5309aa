//! Core pipeline orchestration for Penflow.
//!
//! Ties the Prompt Builder, a generation service, and the Schema Validator
//! into the Plan → Generate × N → Review workflow (`Orchestrator::run`).

pub mod aggregate;
pub mod batch;
pub mod executor;
pub mod orchestrator;

#[cfg(test)]
mod test_support;

pub use aggregate::aggregate;
pub use batch::RunFailure;
pub use executor::{StageExecutor, StageOutput};
pub use orchestrator::{
    Orchestrator, OrchestratorConfig, PipelineRequest, ProgressReporter, RunState, SilentProgress,
};
