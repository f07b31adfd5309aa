//! Result Aggregator.

use penflow_shared::{PipelineResult, Plan, ReviewVerdict, RunMetrics, SectionMap};

/// Assemble the terminal artifact of a successful run.
///
/// # Panics
///
/// If `sections` does not hold exactly one entry per planned task, in plan
/// order. The orchestrator never reaches review otherwise, so this is an
/// internal consistency failure.
pub fn aggregate(
    run: RunMetrics,
    plan: Plan,
    sections: SectionMap,
    review: ReviewVerdict,
) -> PipelineResult {
    assert_eq!(
        sections.len(),
        plan.tasks.len(),
        "section map must hold one entry per planned task"
    );
    for (task, kind) in plan.tasks.iter().zip(sections.kinds()) {
        assert_eq!(task.kind, kind, "sections out of plan order");
    }

    PipelineResult {
        run,
        plan,
        sections,
        review,
    }
}
