//! `{name}` placeholder templates.
//!
//! `{{` and `}}` render as literal braces so templates can carry JSON
//! examples. A template is parsed once into segments and rendered many times.

use std::collections::{BTreeMap, BTreeSet};

use penflow_shared::{PenflowError, Result, StageError, StageKind};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Var(String),
}

/// A parsed prompt template.
#[derive(Debug, Clone)]
pub struct Template {
    source: String,
    segments: Vec<Segment>,
}

impl Template {
    /// Parse template text. Fails on unbalanced braces or invalid names.
    pub fn parse(source: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.char_indices().peekable();

        while let Some((pos, c)) = chars.next() {
            match c {
                '{' if matches!(chars.peek(), Some((_, '{'))) => {
                    chars.next();
                    literal.push('{');
                }
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for (_, c) in chars.by_ref() {
                        if c == '}' {
                            closed = true;
                            break;
                        }
                        name.push(c);
                    }
                    if !closed {
                        return Err(PenflowError::template(format!(
                            "unclosed `{{` at byte {pos}"
                        )));
                    }
                    if !is_identifier(&name) {
                        return Err(PenflowError::template(format!(
                            "invalid placeholder `{{{name}}}` at byte {pos}"
                        )));
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Var(name));
                }
                '}' if matches!(chars.peek(), Some((_, '}'))) => {
                    chars.next();
                    literal.push('}');
                }
                '}' => {
                    return Err(PenflowError::template(format!(
                        "unmatched `}}` at byte {pos} (use `}}}}` for a literal brace)"
                    )));
                }
                c => literal.push(c),
            }
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    /// The unparsed template text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Distinct placeholder names, sorted.
    pub fn variables(&self) -> BTreeSet<&str> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Var(name) => Some(name.as_str()),
                Segment::Literal(_) => None,
            })
            .collect()
    }

    /// Substitute every placeholder. Fails on the first one without a value.
    pub fn render(&self, stage: StageKind, vars: &Variables) -> std::result::Result<String, StageError> {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Var(name) => {
                    let value = vars.get(name).ok_or_else(|| StageError::MissingVariable {
                        stage,
                        name: name.clone(),
                    })?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Named values substituted into a template.
#[derive(Debug, Clone, Default)]
pub struct Variables {
    values: BTreeMap<String, String>,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    /// Builder-style [`set`](Self::set).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_placeholders() {
        let t = Template::parse("Topic: {topic}, {target_length} words").unwrap();
        let vars = Variables::new()
            .with("topic", "caching")
            .with("target_length", "600");
        assert_eq!(
            t.render(StageKind::Plan, &vars).unwrap(),
            "Topic: caching, 600 words"
        );
    }

    #[test]
    fn doubled_braces_are_literal() {
        let t = Template::parse("{{\n  \"topic\": \"{topic}\"\n}}").unwrap();
        let vars = Variables::new().with("topic", "x");
        assert_eq!(
            t.render(StageKind::Plan, &vars).unwrap(),
            "{\n  \"topic\": \"x\"\n}"
        );
        assert_eq!(t.variables().into_iter().collect::<Vec<_>>(), vec!["topic"]);
    }

    #[test]
    fn missing_variable_names_stage_and_placeholder() {
        let t = Template::parse("{topic} / {style}").unwrap();
        let vars = Variables::new().with("topic", "x");
        let err = t.render(StageKind::Plan, &vars).unwrap_err();
        assert_eq!(
            err,
            StageError::MissingVariable {
                stage: StageKind::Plan,
                name: "style".into()
            }
        );
    }

    #[test]
    fn substituted_values_are_not_reparsed() {
        let t = Template::parse("{a}").unwrap();
        let vars = Variables::new().with("a", "{b} }}");
        assert_eq!(t.render(StageKind::Review, &vars).unwrap(), "{b} }}");
    }

    #[test]
    fn variables_are_deduplicated() {
        let t = Template::parse("{topic} {style} {topic}").unwrap();
        let names: Vec<_> = t.variables().into_iter().collect();
        assert_eq!(names, vec!["style", "topic"]);
    }

    #[test]
    fn unclosed_placeholder_rejected() {
        let err = Template::parse("Topic: {topic").unwrap_err();
        assert!(err.to_string().contains("unclosed"));
    }

    #[test]
    fn stray_closing_brace_rejected() {
        let err = Template::parse("a } b").unwrap_err();
        assert!(err.to_string().contains("unmatched"));
    }

    #[test]
    fn invalid_placeholder_names_rejected() {
        for source in ["{}", "{two words}", "{\"key\": 1}"] {
            assert!(Template::parse(source).is_err(), "{source} should fail");
        }
    }
}
