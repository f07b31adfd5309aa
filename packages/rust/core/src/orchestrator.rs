//! Pipeline Orchestrator: the per-run state machine.
//!
//! ```text
//! Start → Planning → Generating(0) → … → Generating(N-1) → Reviewing → Done
//!    any non-terminal state ──────────────────────────────→ Failed(stage)
//! ```
//!
//! Stages run strictly one after another. Section *i+1*'s prompt embeds the
//! validated output of sections *0..=i*, so a run never has more than one
//! generation call outstanding and a failed section ends the run.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{Span, debug, info, instrument, warn};

use penflow_generation::GenerationService;
use penflow_prompts::{PromptTemplates, generate_variables, plan_variables, review_variables};
use penflow_shared::{
    AppConfig, FailedStage, GeneratedSection, PenflowError, PipelineError, PipelineResult, Plan,
    Result, ReviewVerdict, RunId, RunMetrics, SectionMap, StageError, StageKind,
};

use crate::aggregate::aggregate;
use crate::executor::StageExecutor;

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Start,
    Planning,
    /// Generating the section for the task at this zero-based index.
    Generating(usize),
    Reviewing,
    Done,
    Failed(FailedStage),
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed(_))
    }

    /// The failure label for this state, if it can fail.
    fn failed_stage(&self) -> Option<FailedStage> {
        match self {
            Self::Planning => Some(FailedStage::Planning),
            Self::Generating(i) => Some(FailedStage::Generating(*i)),
            Self::Reviewing => Some(FailedStage::Reviewing),
            Self::Start | Self::Done | Self::Failed(_) => None,
        }
    }

    /// Whether `next` is a legal successor for a plan of `task_count` tasks.
    pub fn can_advance_to(&self, next: &RunState, task_count: usize) -> bool {
        match (self, next) {
            (Self::Start, Self::Planning) => true,
            (Self::Planning, Self::Generating(0)) => true,
            (Self::Generating(i), Self::Generating(j)) => *j == i + 1 && *j < task_count,
            (Self::Generating(i), Self::Reviewing) => i + 1 == task_count,
            (Self::Reviewing, Self::Done) => true,
            (from, Self::Failed(stage)) => from.failed_stage() == Some(*stage),
            _ => false,
        }
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Start => f.write_str("start"),
            Self::Planning => f.write_str("planning"),
            Self::Generating(i) => write!(f, "generating({i})"),
            Self::Reviewing => f.write_str("reviewing"),
            Self::Done => f.write_str("done"),
            Self::Failed(stage) => write!(f, "failed({stage})"),
        }
    }
}

// ---------------------------------------------------------------------------
// Requests and progress
// ---------------------------------------------------------------------------

/// Parameters of one run, validated on construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineRequest {
    topic: String,
    target_length: u32,
    style: String,
}

impl PipelineRequest {
    pub fn new(topic: impl Into<String>, target_length: u32, style: impl Into<String>) -> Result<Self> {
        let topic = topic.into().trim().to_string();
        if topic.is_empty() {
            return Err(PenflowError::validation("topic must not be empty"));
        }
        if target_length == 0 {
            return Err(PenflowError::validation("target length must be positive"));
        }
        Ok(Self {
            topic,
            target_length,
            style: style.into(),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn target_length(&self) -> u32 {
        self.target_length
    }

    pub fn style(&self) -> &str {
        &self.style
    }
}

/// Progress callback for reporting run status.
pub trait ProgressReporter: Send + Sync {
    /// Called on every state transition.
    fn state_changed(&self, topic: &str, state: &RunState);
    /// Called when a section passes validation.
    fn section_completed(&self, topic: &str, kind: &str, completed: usize, total: usize);
    /// Called when a run succeeds.
    fn done(&self, result: &PipelineResult);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn state_changed(&self, _topic: &str, _state: &RunState) {}
    fn section_completed(&self, _topic: &str, _kind: &str, _completed: usize, _total: usize) {}
    fn done(&self, _result: &PipelineResult) {}
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Everything an orchestrator needs besides the generation service.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub templates: PromptTemplates,
    /// Bound for [`Orchestrator::run_many`].
    pub max_concurrent_runs: usize,
    /// Caller-level limit applied by [`Orchestrator::run_with_timeout`].
    pub run_timeout: Option<Duration>,
}

impl OrchestratorConfig {
    /// Build from the app config. Prompt overrides are parsed and validated here.
    pub fn from_app_config(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            templates: PromptTemplates::from_config(&config.prompts)?,
            max_concurrent_runs: config.pipeline.max_concurrent_runs.max(1),
            run_timeout: config.pipeline.run_timeout_secs.map(Duration::from_secs),
        })
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            templates: PromptTemplates::defaults(),
            max_concurrent_runs: 2,
            run_timeout: None,
        }
    }
}

/// Runs pipelines against one generation service.
///
/// Holds no per-run state, so one instance can drive many concurrent runs.
pub struct Orchestrator {
    pub(crate) service: Arc<dyn GenerationService>,
    pub(crate) config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(service: Arc<dyn GenerationService>, config: OrchestratorConfig) -> Self {
        Self { service, config }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run one pipeline without progress reporting.
    pub async fn run_pipeline(
        &self,
        request: &PipelineRequest,
    ) -> std::result::Result<PipelineResult, PipelineError> {
        self.run(request, &SilentProgress).await
    }

    /// Run one pipeline to completion or to its first failed stage.
    ///
    /// On failure, sections produced so far are dropped; only their count is
    /// reported in the error.
    #[instrument(skip_all, fields(run_id = tracing::field::Empty, topic = %request.topic()))]
    pub async fn run(
        &self,
        request: &PipelineRequest,
        progress: &dyn ProgressReporter,
    ) -> std::result::Result<PipelineResult, PipelineError> {
        let run_id = RunId::new();
        Span::current().record("run_id", tracing::field::display(&run_id));

        let started_at = Utc::now();
        info!(
            target_length = request.target_length(),
            style = %request.style(),
            model = %self.service.model_name(),
            "starting pipeline run"
        );

        let mut run = Run {
            topic: request.topic(),
            progress,
            state: RunState::Start,
            task_count: 0,
            sections: SectionMap::new(),
        };
        let mut executor = StageExecutor::new(self.service.as_ref(), &self.config.templates);

        // --- Plan ---
        run.enter(RunState::Planning);
        let plan: Plan = run
            .stage(
                executor
                    .execute(
                        StageKind::Plan,
                        &plan_variables(request.topic(), request.target_length(), request.style()),
                    )
                    .await,
            )?;
        run.task_count = plan.tasks.len();

        // --- Generate, in plan order ---
        for (i, task) in plan.tasks.iter().enumerate() {
            run.enter(RunState::Generating(i));
            let vars = generate_variables(request.topic(), task, &run.sections);
            let section: GeneratedSection =
                run.stage(executor.execute(StageKind::Generate, &vars).await)?;

            let appended = run.sections.append(task.kind.as_str(), section);
            debug_assert!(appended, "plan validation guarantees unique task kinds");
            progress.section_completed(request.topic(), &task.kind, i + 1, run.task_count);
        }

        // --- Review ---
        run.enter(RunState::Reviewing);
        let vars = review_variables(request.topic(), &plan, &run.sections);
        let review: ReviewVerdict = run.stage(executor.execute(StageKind::Review, &vars).await)?;

        run.enter(RunState::Done);
        let metrics = RunMetrics {
            run_id,
            model: self.service.model_name().to_string(),
            started_at,
            finished_at: Utc::now(),
            generation_calls: executor.calls(),
        };
        let result = aggregate(metrics, plan, run.sections, review);

        info!(
            sections = result.sections.len(),
            cohesion_score = result.review.cohesion_score,
            generation_calls = result.run.generation_calls,
            "pipeline run complete"
        );
        progress.done(&result);

        Ok(result)
    }
}

/// Mutable state owned by a single run.
struct Run<'a> {
    topic: &'a str,
    progress: &'a dyn ProgressReporter,
    state: RunState,
    task_count: usize,
    sections: SectionMap,
}

impl Run<'_> {
    fn enter(&mut self, next: RunState) {
        debug_assert!(
            self.state.can_advance_to(&next, self.task_count),
            "illegal transition {} -> {next}",
            self.state
        );
        debug!(from = %self.state, to = %next, "state transition");
        self.state = next;
        self.progress.state_changed(self.topic, &self.state);
    }

    /// Pass a stage result through, moving to `Failed` on error.
    fn stage<T>(
        &mut self,
        outcome: std::result::Result<T, StageError>,
    ) -> std::result::Result<T, PipelineError> {
        outcome.map_err(|cause| {
            let stage = self
                .state
                .failed_stage()
                .unwrap_or(FailedStage::Planning);
            warn!(
                %stage,
                kind = cause.kind(),
                sections_completed = self.sections.len(),
                "pipeline run failed"
            );
            self.enter(RunState::Failed(stage));
            PipelineError {
                stage,
                cause,
                sections_completed: self.sections.len(),
            }
        })
    }
}
