//! Independent runs side by side, plus the caller-level run timeout.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};

use penflow_shared::{PipelineError, PipelineResult};

use crate::orchestrator::{Orchestrator, PipelineRequest, ProgressReporter};

/// Why a run produced no result.
#[derive(Debug, thiserror::Error)]
pub enum RunFailure {
    /// A stage failed.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// The run exceeded the configured time limit and was abandoned.
    #[error("run timed out after {secs}s")]
    RunTimedOut { secs: u64 },

    /// The run's task panicked or was cancelled.
    #[error("run aborted: {0}")]
    Aborted(String),
}

impl Orchestrator {
    /// [`run`](Orchestrator::run) under the configured time limit, if any.
    ///
    /// An elapsed run is dropped mid-stage; its state is discarded, not resumed.
    pub async fn run_with_timeout(
        &self,
        request: &PipelineRequest,
        progress: &dyn ProgressReporter,
    ) -> Result<PipelineResult, RunFailure> {
        let Some(limit) = self.config.run_timeout else {
            return Ok(self.run(request, progress).await?);
        };

        match tokio::time::timeout(limit, self.run(request, progress)).await {
            Ok(outcome) => Ok(outcome?),
            Err(_) => {
                warn!(topic = %request.topic(), limit_secs = limit.as_secs(), "run timed out");
                Err(RunFailure::RunTimedOut {
                    secs: limit.as_secs(),
                })
            }
        }
    }

    /// Run every request, at most `max_concurrent_runs` at a time.
    ///
    /// Each run is still strictly sequential internally. Outcomes are returned
    /// in input order.
    #[instrument(skip_all, fields(runs = requests.len()))]
    pub async fn run_many(
        self: &Arc<Self>,
        requests: Vec<PipelineRequest>,
        progress: Arc<dyn ProgressReporter>,
    ) -> Vec<Result<PipelineResult, RunFailure>> {
        let slots = Arc::new(Semaphore::new(self.config.max_concurrent_runs.max(1)));
        let mut tasks = JoinSet::new();

        for (index, request) in requests.into_iter().enumerate() {
            let orchestrator = Arc::clone(self);
            let slots = Arc::clone(&slots);
            let progress = Arc::clone(&progress);

            tasks.spawn(async move {
                let outcome = match slots.acquire_owned().await {
                    Ok(_permit) => {
                        orchestrator
                            .run_with_timeout(&request, progress.as_ref())
                            .await
                    }
                    Err(e) => Err(RunFailure::Aborted(e.to_string())),
                };
                (index, outcome)
            });
        }

        let mut outcomes: Vec<Option<Result<PipelineResult, RunFailure>>> =
            std::iter::repeat_with(|| None).take(tasks.len()).collect();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => outcomes[index] = Some(outcome),
                Err(e) => warn!(error = %e, "run task failed to join"),
            }
        }

        let outcomes: Vec<_> = outcomes
            .into_iter()
            .map(|slot| slot.unwrap_or_else(|| Err(RunFailure::Aborted("run task panicked".into()))))
            .collect();

        let succeeded = outcomes.iter().filter(|o| o.is_ok()).count();
        info!(succeeded, failed = outcomes.len() - succeeded, "batch complete");

        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::orchestrator::{OrchestratorConfig, SilentProgress};
    use crate::test_support::*;
    use penflow_shared::{FailedStage, ServiceError};

    /// Answers by stage, echoing the topic so runs can be told apart.
    fn topic_echo_service() -> ScriptedService {
        ScriptedService::respond_with(|prompt| {
            let topic = topic_of(prompt);
            if prompt.starts_with("Analyze") {
                if topic == "broken" {
                    return Err(ServiceError::Status {
                        status: 500,
                        body: "down".into(),
                    });
                }
                Ok(plan_json(&["introduction", "conclusion"]))
            } else if prompt.starts_with("Write a blog section") {
                Ok(section_json(&format!("About {topic}.")))
            } else {
                Ok(review_json(0.8, &format!("Final post on {topic}.")))
            }
        })
    }

    fn orchestrator(service: Arc<ScriptedService>, config: OrchestratorConfig) -> Arc<Orchestrator> {
        Arc::new(Orchestrator::new(service, config))
    }

    fn requests(topics: &[&str]) -> Vec<PipelineRequest> {
        topics
            .iter()
            .map(|t| PipelineRequest::new(*t, 400, "informative").unwrap())
            .collect()
    }

    #[tokio::test]
    async fn outcomes_follow_input_order() {
        let service = Arc::new(topic_echo_service().with_delay(Duration::from_millis(5)));
        let orch = orchestrator(service, OrchestratorConfig::default());

        let outcomes = orch
            .run_many(requests(&["alpha", "broken", "gamma"]), Arc::new(SilentProgress))
            .await;

        assert_eq!(outcomes.len(), 3);
        assert_eq!(
            outcomes[0].as_ref().unwrap().review.final_version,
            "Final post on alpha."
        );
        match &outcomes[1] {
            Err(RunFailure::Pipeline(err)) => assert_eq!(err.stage, FailedStage::Planning),
            other => panic!("expected pipeline failure, got {other:?}"),
        }
        assert_eq!(
            outcomes[2].as_ref().unwrap().review.final_version,
            "Final post on gamma."
        );
    }

    #[tokio::test]
    async fn runs_do_not_share_sections() {
        let service = Arc::new(topic_echo_service());
        let orch = orchestrator(service, OrchestratorConfig::default());

        let outcomes = orch
            .run_many(requests(&["alpha", "beta"]), Arc::new(SilentProgress))
            .await;

        for (outcome, topic) in outcomes.iter().zip(["alpha", "beta"]) {
            let result = outcome.as_ref().unwrap();
            for (_, section) in result.sections.iter() {
                assert_eq!(section.content, format!("About {topic}."));
            }
        }
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let service = Arc::new(topic_echo_service().with_delay(Duration::from_millis(10)));
        let config = OrchestratorConfig {
            max_concurrent_runs: 1,
            ..OrchestratorConfig::default()
        };
        let orch = orchestrator(service.clone(), config);

        let outcomes = orch
            .run_many(requests(&["a", "b", "c"]), Arc::new(SilentProgress))
            .await;

        assert!(outcomes.iter().all(|o| o.is_ok()));
        assert_eq!(service.max_in_flight(), 1);
        // 3 runs x (plan + 2 sections + review)
        assert_eq!(service.call_count(), 12);
    }

    #[tokio::test]
    async fn concurrent_runs_overlap_up_to_limit() {
        let service = Arc::new(topic_echo_service().with_delay(Duration::from_millis(20)));
        let config = OrchestratorConfig {
            max_concurrent_runs: 2,
            ..OrchestratorConfig::default()
        };
        let orch = orchestrator(service.clone(), config);

        orch.run_many(requests(&["a", "b", "c", "d"]), Arc::new(SilentProgress))
            .await;

        assert!(service.max_in_flight() <= 2);
    }

    #[tokio::test]
    async fn slow_run_times_out() {
        let service = Arc::new(topic_echo_service().with_delay(Duration::from_millis(500)));
        let config = OrchestratorConfig {
            run_timeout: Some(Duration::from_millis(50)),
            ..OrchestratorConfig::default()
        };
        let orch = orchestrator(service.clone(), config);

        let request = PipelineRequest::new("slow", 400, "informative").unwrap();
        let err = orch
            .run_with_timeout(&request, &SilentProgress)
            .await
            .unwrap_err();

        assert!(matches!(err, RunFailure::RunTimedOut { .. }));
        assert_eq!(service.call_count(), 1);
    }

    #[tokio::test]
    async fn no_timeout_configured_runs_to_completion() {
        let service = Arc::new(topic_echo_service());
        let orch = orchestrator(service, OrchestratorConfig::default());

        let request = PipelineRequest::new("alpha", 400, "informative").unwrap();
        let result = orch.run_with_timeout(&request, &SilentProgress).await.unwrap();
        assert_eq!(result.sections.len(), 2);
    }
}
