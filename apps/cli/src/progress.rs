//! Terminal progress for pipeline runs.

use std::collections::HashMap;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use penflow_core::{ProgressReporter, RunState};
use penflow_shared::PipelineResult;

/// One spinner per topic, stacked when several runs are in flight.
pub(crate) struct CliProgress {
    _multi: MultiProgress,
    bars: HashMap<String, ProgressBar>,
}

impl CliProgress {
    pub(crate) fn new<'a>(topics: impl IntoIterator<Item = &'a str>) -> Self {
        let multi = MultiProgress::new();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);

        let bars = topics
            .into_iter()
            .map(|topic| {
                let bar = multi.add(ProgressBar::new_spinner());
                bar.set_style(style.clone());
                bar.set_prefix(topic.to_string());
                bar.set_message("queued");
                bar.enable_steady_tick(Duration::from_millis(80));
                (topic.to_string(), bar)
            })
            .collect();

        Self {
            _multi: multi,
            bars,
        }
    }

    /// Clear every spinner still on screen.
    pub(crate) fn finish(&self) {
        for bar in self.bars.values() {
            bar.finish_and_clear();
        }
    }

    fn message(&self, topic: &str, message: String) {
        if let Some(bar) = self.bars.get(topic) {
            bar.set_message(message);
        }
    }
}

impl ProgressReporter for CliProgress {
    fn state_changed(&self, topic: &str, state: &RunState) {
        let message = match state {
            RunState::Start => "starting".to_string(),
            RunState::Planning => "planning sections".to_string(),
            RunState::Generating(i) => format!("writing section {}", i + 1),
            RunState::Reviewing => "reviewing draft".to_string(),
            RunState::Done => "done".to_string(),
            RunState::Failed(stage) => format!("failed during {stage}"),
        };
        self.message(topic, message);
    }

    fn section_completed(&self, topic: &str, kind: &str, completed: usize, total: usize) {
        self.message(topic, format!("[{completed}/{total}] wrote {kind}"));
    }

    fn done(&self, result: &PipelineResult) {
        tracing::debug!(run_id = %result.run.run_id, "run finished");
    }
}
