//! Stage Executor: render → generate → validate, for one stage call.
//!
//! No retry happens here. A service failure is surfaced as-is; retry policy
//! belongs to the generation adapter. Every call is logged with its prompt
//! hash, raw response, and normalized text so malformed output can be
//! diagnosed after the fact.

use sha2::{Digest, Sha256};
use tracing::{debug, error, info, instrument};

use penflow_generation::GenerationService;
use penflow_prompts::{PromptTemplates, Variables};
use penflow_schema::{Schema, Validated, normalize, validate};
use penflow_shared::{GeneratedSection, Plan, ReviewVerdict, StageError, StageKind};

/// A validated stage record that knows how to log itself.
pub trait StageOutput: Schema + Send {
    fn log_parsed(&self);
}

impl StageOutput for Plan {
    fn log_parsed(&self) {
        info!(
            tasks = self.tasks.len(),
            audience = %self.target_audience,
            kinds = ?self.kinds().collect::<Vec<_>>(),
            "plan accepted"
        );
    }
}

impl StageOutput for GeneratedSection {
    fn log_parsed(&self) {
        info!(
            content_len = self.content.len(),
            key_points = self.key_points.len(),
            "section accepted"
        );
    }
}

impl StageOutput for ReviewVerdict {
    fn log_parsed(&self) {
        info!(
            cohesion_score = self.cohesion_score,
            suggested_edits = self.suggested_edits.len(),
            final_len = self.final_version.len(),
            "review accepted"
        );
    }
}

/// Executes stages for a single run and counts its generation calls.
pub struct StageExecutor<'a> {
    service: &'a dyn GenerationService,
    templates: &'a PromptTemplates,
    calls: u32,
}

impl<'a> StageExecutor<'a> {
    pub fn new(service: &'a dyn GenerationService, templates: &'a PromptTemplates) -> Self {
        Self {
            service,
            templates,
            calls: 0,
        }
    }

    /// Generation calls issued so far, successful or not.
    pub fn calls(&self) -> u32 {
        self.calls
    }

    /// Run one stage and return its validated record.
    #[instrument(skip_all, fields(%stage, schema = T::NAME))]
    pub async fn execute<T: StageOutput>(
        &mut self,
        stage: StageKind,
        vars: &Variables,
    ) -> Result<T, StageError> {
        let prompt = self.templates.render(stage, vars).inspect_err(|e| {
            error!(error = %e, "prompt rendering failed");
        })?;

        debug!(
            prompt_len = prompt.len(),
            prompt_hash = %prompt_hash(stage, &prompt),
            "rendered prompt"
        );

        self.calls += 1;
        let raw = match self.service.generate(&prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                error!(error = %e, retryable = e.is_retryable(), "generation service failed");
                return Err(e.into());
            }
        };
        debug!(raw_len = raw.len(), %raw, "raw response");

        match validate::<T>(&raw) {
            Ok(Validated { record, normalized }) => {
                debug!(%normalized, "normalized response");
                record.log_parsed();
                Ok(record)
            }
            Err(err) => {
                error!(
                    kind = err.kind(),
                    error = %err,
                    %raw,
                    normalized = %normalize(&raw),
                    "response failed validation"
                );
                Err(err)
            }
        }
    }
}

/// Stable fingerprint of a rendered prompt, for correlating log records.
fn prompt_hash(stage: StageKind, prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(stage.as_str().as_bytes());
    hasher.update(prompt.as_bytes());
    format!("{:x}", hasher.finalize())
}
