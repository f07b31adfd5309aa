//! In-memory generation service and canned responses for pipeline tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use penflow_generation::GenerationService;
use penflow_shared::ServiceError;

type Responder = Box<dyn Fn(&str) -> Result<String, ServiceError> + Send + Sync>;

enum Script {
    Queue(Mutex<VecDeque<Result<String, ServiceError>>>),
    Respond(Responder),
}

/// Records every prompt and answers from a script.
pub struct ScriptedService {
    script: Script,
    prompts: Mutex<Vec<String>>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedService {
    /// Replay `responses` in order; calls past the end fail with a transport error.
    pub fn queue(responses: Vec<Result<String, ServiceError>>) -> Self {
        Self::with_script(Script::Queue(Mutex::new(responses.into())))
    }

    /// Answer each prompt with `respond(prompt)`.
    pub fn respond_with(
        respond: impl Fn(&str) -> Result<String, ServiceError> + Send + Sync + 'static,
    ) -> Self {
        Self::with_script(Script::Respond(Box::new(respond)))
    }

    fn with_script(script: Script) -> Self {
        Self {
            script,
            prompts: Mutex::new(Vec::new()),
            delay: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Hold every call open for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    /// Highest number of calls that were outstanding at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationService for ScriptedService {
    async fn generate(&self, instruction: &str) -> Result<String, ServiceError> {
        self.prompts.lock().unwrap().push(instruction.to_string());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let response = match &self.script {
            Script::Queue(queue) => queue
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ServiceError::Transport("script exhausted".into()))),
            Script::Respond(respond) => respond(instruction),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        response
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

// ---------------------------------------------------------------------------
// Canned responses
// ---------------------------------------------------------------------------

pub fn plan_json(kinds: &[&str]) -> String {
    let sections: Vec<_> = kinds
        .iter()
        .map(|kind| {
            json!({
                "section_type": kind,
                "description": format!("Cover the {kind}"),
                "style_guide": "clear and direct",
                "target_length": 200
            })
        })
        .collect();
    json!({
        "topic_analysis": "A practical look at the topic.",
        "target_audience": "Backend engineers",
        "sections": sections
    })
    .to_string()
}

pub fn section_json(content: &str) -> String {
    json!({
        "content": content,
        "key_points": ["first point", "second point"]
    })
    .to_string()
}

pub fn review_json(score: f64, final_version: &str) -> String {
    json!({
        "cohesion_score": score,
        "suggested_edits": [
            {"section_name": "introduction", "suggested_edit": "Open with a concrete example."}
        ],
        "final_version": final_version
    })
    .to_string()
}

/// Value of the `Topic: ...` line in a rendered prompt.
pub fn topic_of(prompt: &str) -> &str {
    prompt
        .lines()
        .find_map(|line| line.strip_prefix("Topic: "))
        .unwrap_or_default()
}
