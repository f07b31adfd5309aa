//! Prompt Builder for the Penflow pipeline.
//!
//! Renders a stage's instruction by substituting named variables into that
//! stage's template. Rendering is pure; a placeholder without a value fails
//! with [`StageError::MissingVariable`] before any generation call is made.

pub mod context;
pub mod defaults;
pub mod template;

use tracing::{debug, warn};

use penflow_shared::{PenflowError, PromptsConfig, Result, StageError, StageKind};

pub use context::{
    generate_variables, plan_variables, render_plan, render_sections, review_variables,
    stage_variables,
};
pub use template::{Template, Variables};

/// The effective template for each stage.
#[derive(Debug, Clone)]
pub struct PromptTemplates {
    plan: Template,
    generate: Template,
    review: Template,
}

impl PromptTemplates {
    /// Built-in templates, without config overrides.
    pub fn defaults() -> Self {
        Self {
            plan: Template::parse(defaults::PLAN).expect("built-in plan template parses"),
            generate: Template::parse(defaults::GENERATE)
                .expect("built-in generate template parses"),
            review: Template::parse(defaults::REVIEW).expect("built-in review template parses"),
        }
    }

    /// Built-in templates with any `[prompts]` overrides applied, then validated.
    pub fn from_config(config: &PromptsConfig) -> Result<Self> {
        let mut templates = Self::defaults();

        for (stage, source) in [
            (StageKind::Plan, &config.plan),
            (StageKind::Generate, &config.generate),
            (StageKind::Review, &config.review),
        ] {
            if let Some(source) = source {
                let template = Template::parse(source).map_err(|e| {
                    PenflowError::template(format!("{stage} template override: {e}"))
                })?;
                debug!(%stage, "using prompt template override");
                *templates.slot_mut(stage) = template;
            }
        }

        templates.validate()?;
        Ok(templates)
    }

    /// Check that every template only references variables its stage supplies.
    pub fn validate(&self) -> Result<()> {
        for stage in StageKind::ALL {
            let available = stage_variables(stage);
            let template = self.get(stage);

            if let Some(unknown) = template
                .variables()
                .into_iter()
                .find(|name| !available.contains(name))
            {
                return Err(PenflowError::template(format!(
                    "{stage} template references `{{{unknown}}}`, which is never supplied \
                     (available: {})",
                    available.join(", ")
                )));
            }
        }

        if !self.generate.variables().contains("previous_sections") {
            warn!("generate template omits {{previous_sections}}; sections will not see earlier output");
        }

        Ok(())
    }

    pub fn get(&self, stage: StageKind) -> &Template {
        match stage {
            StageKind::Plan => &self.plan,
            StageKind::Generate => &self.generate,
            StageKind::Review => &self.review,
        }
    }

    fn slot_mut(&mut self, stage: StageKind) -> &mut Template {
        match stage {
            StageKind::Plan => &mut self.plan,
            StageKind::Generate => &mut self.generate,
            StageKind::Review => &mut self.review,
        }
    }

    /// Render the instruction for `stage`.
    pub fn render(
        &self,
        stage: StageKind,
        vars: &Variables,
    ) -> std::result::Result<String, StageError> {
        self.get(stage).render(stage, vars)
    }
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self::defaults()
    }
}
