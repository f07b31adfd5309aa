//! Schema validation for generation output.
//!
//! [`validate`] turns raw model text into a typed stage record:
//! 1. [`normalize`] the text (trim, unwrap code fence, collapse line breaks)
//! 2. parse it as JSON → [`StageError::MalformedPayload`] on failure
//! 3. check the record's structural [`FieldSpec`]s, coercing numbers
//! 4. deserialize and run the record's semantic checks
//!
//! Failures in steps 3–4 are [`StageError::SchemaMismatch`] naming the field.

pub mod fields;
mod normalize;

use std::collections::HashSet;

use serde::Serialize;
use serde::de::DeserializeOwned;

use penflow_shared::{GeneratedSection, Plan, ReviewVerdict, StageError};

pub use fields::{FieldError, FieldKind, FieldSpec};
pub use normalize::normalize;

/// A stage record that can be validated from raw generation output.
pub trait Schema: Serialize + DeserializeOwned {
    /// Schema name used in log records.
    const NAME: &'static str;

    /// Required top-level fields and their shapes.
    fn fields() -> &'static [FieldSpec];

    /// Checks that need the typed record (ranges, uniqueness).
    fn check(&self) -> Result<(), FieldError> {
        Ok(())
    }
}

/// A successfully validated record plus the text it was parsed from.
#[derive(Debug, Clone)]
pub struct Validated<T> {
    pub record: T,
    pub normalized: String,
}

/// Validate raw generation output against schema `T`.
pub fn validate<T: Schema>(raw: &str) -> Result<Validated<T>, StageError> {
    let normalized = normalize(raw);

    let mut value: serde_json::Value =
        serde_json::from_str(&normalized).map_err(|e| StageError::MalformedPayload {
            reason: e.to_string(),
            normalized: normalized.clone(),
            original: raw.to_string(),
        })?;

    let mismatch = |err: FieldError| StageError::SchemaMismatch {
        field: err.field,
        reason: err.reason,
        raw: raw.to_string(),
    };

    fields::check_object(&mut value, T::fields(), "").map_err(mismatch)?;

    // Structural checks passed, so this only fails on shapes the field specs
    // cannot express.
    let record: T = serde_json::from_value(value)
        .map_err(|e| mismatch(FieldError::new("<root>", e.to_string())))?;

    record.check().map_err(mismatch)?;

    Ok(Validated { record, normalized })
}

// ---------------------------------------------------------------------------
// Stage schemas
// ---------------------------------------------------------------------------

const TASK_FIELDS: &[FieldSpec] = &[
    FieldSpec::required("section_type", FieldKind::String),
    FieldSpec::required("description", FieldKind::String),
    FieldSpec::required("style_guide", FieldKind::String),
    FieldSpec::required("target_length", FieldKind::PositiveInteger),
];

const PLAN_FIELDS: &[FieldSpec] = &[
    FieldSpec::required("topic_analysis", FieldKind::String),
    FieldSpec::required("target_audience", FieldKind::String),
    FieldSpec::required("sections", FieldKind::ObjectList(TASK_FIELDS)),
];

const SECTION_FIELDS: &[FieldSpec] = &[
    FieldSpec::required("content", FieldKind::String),
    FieldSpec::required("key_points", FieldKind::StringList),
];

const EDIT_FIELDS: &[FieldSpec] = &[
    FieldSpec::required("section_name", FieldKind::String),
    FieldSpec::required("suggested_edit", FieldKind::String),
];

const REVIEW_FIELDS: &[FieldSpec] = &[
    FieldSpec::required("cohesion_score", FieldKind::Number),
    FieldSpec::required("suggested_edits", FieldKind::ObjectList(EDIT_FIELDS)),
    FieldSpec::required("final_version", FieldKind::String),
];

impl Schema for Plan {
    const NAME: &'static str = "plan";

    fn fields() -> &'static [FieldSpec] {
        PLAN_FIELDS
    }

    fn check(&self) -> Result<(), FieldError> {
        if self.tasks.is_empty() {
            return Err(FieldError::new("sections", "plan must contain at least one section"));
        }

        let mut seen = HashSet::new();
        for (i, task) in self.tasks.iter().enumerate() {
            if task.kind.trim().is_empty() {
                return Err(FieldError::new(
                    format!("sections[{i}].section_type"),
                    "section type must not be blank",
                ));
            }
            if !seen.insert(task.kind.as_str()) {
                return Err(FieldError::new(
                    format!("sections[{i}].section_type"),
                    format!("duplicate section type `{}`", task.kind),
                ));
            }
        }
        Ok(())
    }
}

impl Schema for GeneratedSection {
    const NAME: &'static str = "generated_section";

    fn fields() -> &'static [FieldSpec] {
        SECTION_FIELDS
    }

    fn check(&self) -> Result<(), FieldError> {
        if self.content.trim().is_empty() {
            return Err(FieldError::new("content", "section content must not be blank"));
        }
        Ok(())
    }
}

impl Schema for ReviewVerdict {
    const NAME: &'static str = "review_verdict";

    fn fields() -> &'static [FieldSpec] {
        REVIEW_FIELDS
    }

    fn check(&self) -> Result<(), FieldError> {
        if !(0.0..=1.0).contains(&self.cohesion_score) {
            return Err(FieldError::new(
                "cohesion_score",
                format!("must be within 0.0..=1.0, found {}", self.cohesion_score),
            ));
        }
        if self.final_version.trim().is_empty() {
            return Err(FieldError::new("final_version", "final version must not be blank"));
        }
        Ok(())
    }
}
