//! Variable sets for each stage, and the text renderings of prior output
//! that later stages receive as context.

use penflow_shared::{Plan, SectionMap, StageKind, Task};

use crate::template::Variables;

/// Names the orchestrator supplies for `stage`. Templates may use any subset.
pub fn stage_variables(stage: StageKind) -> &'static [&'static str] {
    match stage {
        StageKind::Plan => &["topic", "target_length", "style"],
        StageKind::Generate => &[
            "topic",
            "section_type",
            "description",
            "style_guide",
            "target_length",
            "previous_sections",
        ],
        StageKind::Review => &["topic", "audience", "plan", "sections"],
    }
}

pub fn plan_variables(topic: &str, target_length: u32, style: &str) -> Variables {
    Variables::new()
        .with("topic", topic)
        .with("target_length", target_length.to_string())
        .with("style", style)
}

/// Variables for generating `task`, with every section completed so far.
pub fn generate_variables(topic: &str, task: &Task, completed: &SectionMap) -> Variables {
    Variables::new()
        .with("topic", topic)
        .with("section_type", task.kind.as_str())
        .with("description", task.goal.as_str())
        .with("style_guide", task.style.as_str())
        .with("target_length", task.target_length.to_string())
        .with("previous_sections", render_sections(completed))
}

pub fn review_variables(topic: &str, plan: &Plan, sections: &SectionMap) -> Variables {
    Variables::new()
        .with("topic", topic)
        .with("audience", plan.target_audience.as_str())
        .with("plan", render_plan(plan))
        .with("sections", render_sections(sections))
}

/// `=== kind ===` headed blocks in production order, separated by a blank line.
///
/// Content is embedded verbatim. An empty map renders as an empty string.
pub fn render_sections(sections: &SectionMap) -> String {
    sections
        .iter()
        .map(|(kind, section)| format!("=== {kind} ===\n{}", section.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Pretty-printed JSON of the plan, using the wire field names.
pub fn render_plan(plan: &Plan) -> String {
    // Plan holds only strings and integers, so serialization cannot fail.
    serde_json::to_string_pretty(plan).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use penflow_shared::GeneratedSection;

    fn section(content: &str) -> GeneratedSection {
        GeneratedSection {
            content: content.into(),
            key_points: vec!["point".into()],
        }
    }

    fn task(kind: &str) -> Task {
        Task {
            kind: kind.into(),
            goal: format!("{kind} goal"),
            style: "plain".into(),
            target_length: 120,
        }
    }

    fn sample_plan() -> Plan {
        Plan {
            topic_analysis: "analysis".into(),
            target_audience: "engineers".into(),
            tasks: vec![task("introduction"), task("conclusion")],
        }
    }

    #[test]
    fn sections_render_in_order() {
        let mut map = SectionMap::new();
        map.append("introduction", section("Hello."));
        map.append("body", section("Details\nacross lines."));
        assert_eq!(
            render_sections(&map),
            "=== introduction ===\nHello.\n\n=== body ===\nDetails\nacross lines."
        );
    }

    #[test]
    fn empty_sections_render_empty() {
        assert_eq!(render_sections(&SectionMap::new()), "");
    }

    #[test]
    fn plan_renders_with_wire_names() {
        let rendered = render_plan(&sample_plan());
        assert!(rendered.contains("\"section_type\": \"introduction\""));
        assert!(rendered.contains("\"target_audience\": \"engineers\""));
        assert!(rendered.contains('\n'));
    }

    #[test]
    fn builders_supply_exactly_the_stage_variables() {
        let plan = sample_plan();
        let sections = SectionMap::new();
        let cases = [
            (StageKind::Plan, plan_variables("t", 600, "informative")),
            (
                StageKind::Generate,
                generate_variables("t", &plan.tasks[0], &sections),
            ),
            (StageKind::Review, review_variables("t", &plan, &sections)),
        ];
        for (stage, vars) in cases {
            let mut expected: Vec<_> = stage_variables(stage).to_vec();
            expected.sort_unstable();
            assert_eq!(vars.names().collect::<Vec<_>>(), expected, "{stage}");
        }
    }

    #[test]
    fn generate_variables_carry_task_fields() {
        let mut done = SectionMap::new();
        done.append("introduction", section("Intro text."));
        let vars = generate_variables("caching", &task("comparison"), &done);
        assert_eq!(vars.get("section_type"), Some("comparison"));
        assert_eq!(vars.get("description"), Some("comparison goal"));
        assert_eq!(vars.get("target_length"), Some("120"));
        assert_eq!(
            vars.get("previous_sections"),
            Some("=== introduction ===\nIntro text.")
        );
    }
}
