//! Error types for Penflow.
//!
//! Library crates use these enums via `thiserror`.
//! The CLI wraps them with `color-eyre` for rich diagnostics.
//!
//! Two families live here:
//! - [`PenflowError`] covers everything outside a pipeline run: configuration,
//!   I/O, and request validation.
//! - [`StageError`] (and its [`ServiceError`] cause) classifies why a single
//!   stage failed; [`PipelineError`] pairs it with the stage that failed.

use std::path::PathBuf;

use crate::types::StageKind;

/// Top-level error type for non-stage Penflow operations.
#[derive(Debug, thiserror::Error)]
pub enum PenflowError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Prompt template could not be parsed or references unknown variables.
    #[error("template error: {message}")]
    Template { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Invalid run parameters (empty topic, zero target length, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PenflowError>;

impl PenflowError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a template error from any displayable message.
    pub fn template(msg: impl Into<String>) -> Self {
        Self::Template {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// Generation service failures
// ---------------------------------------------------------------------------

/// Failure reported by a generation service adapter.
///
/// The pipeline treats every variant the same way (the run fails); the
/// distinction only matters to adapters deciding whether to retry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// Connection refused, DNS failure, TLS error, broken body stream.
    #[error("transport error: {0}")]
    Transport(String),

    /// The request did not complete within the adapter's timeout.
    #[error("request timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The service answered with a non-success HTTP status.
    #[error("service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response envelope was fine but carried no text.
    #[error("service returned an empty response")]
    EmptyResponse,

    /// The response envelope itself could not be decoded.
    #[error("malformed response body: {0}")]
    MalformedBody(String),
}

impl ServiceError {
    /// Whether an adapter may reasonably retry the same request.
    ///
    /// Rate limiting, server-side errors, and timeouts qualify.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Status { status, .. } => *status == 429 || (500..600).contains(status),
            Self::Transport(_) | Self::EmptyResponse | Self::MalformedBody(_) => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Stage failures
// ---------------------------------------------------------------------------

/// Why a single pipeline stage failed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StageError {
    /// The stage template references a variable that was not supplied.
    #[error("{stage} prompt needs variable `{name}` but no value was supplied")]
    MissingVariable { stage: StageKind, name: String },

    /// The generation service call failed.
    #[error("generation service failed: {0}")]
    Service(#[from] ServiceError),

    /// The response could not be parsed as JSON, even after normalization.
    #[error("response is not valid JSON: {reason}")]
    MalformedPayload {
        reason: String,
        normalized: String,
        original: String,
    },

    /// The response parsed but does not match the stage schema.
    #[error("schema mismatch at `{field}`: {reason}")]
    SchemaMismatch {
        field: String,
        reason: String,
        raw: String,
    },
}

impl StageError {
    /// Short machine-readable name used in log records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingVariable { .. } => "missing_variable",
            Self::Service(_) => "service_error",
            Self::MalformedPayload { .. } => "malformed_payload",
            Self::SchemaMismatch { .. } => "schema_mismatch",
        }
    }

    /// Raw response text, when the failure happened after the service answered.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Self::MalformedPayload { original, .. } => Some(original),
            Self::SchemaMismatch { raw, .. } => Some(raw),
            Self::MissingVariable { .. } | Self::Service(_) => None,
        }
    }
}

/// Pipeline stage at which a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailedStage {
    Planning,
    /// Zero-based index of the task whose section could not be generated.
    Generating(usize),
    Reviewing,
}

impl std::fmt::Display for FailedStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Planning => f.write_str("planning"),
            Self::Generating(i) => write!(f, "generating({i})"),
            Self::Reviewing => f.write_str("reviewing"),
        }
    }
}

/// A failed pipeline run: the stage that failed and why.
///
/// Sections completed before the failure are discarded; only their count
/// survives for diagnostics.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("pipeline failed during {stage}: {cause}")]
pub struct PipelineError {
    pub stage: FailedStage,
    #[source]
    pub cause: StageError,
    pub sections_completed: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = PenflowError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = PenflowError::validation("target length must be positive");
        assert!(err.to_string().contains("target length"));
    }

    #[test]
    fn retryable_service_errors() {
        assert!(ServiceError::Timeout { secs: 30 }.is_retryable());
        assert!(
            ServiceError::Status {
                status: 429,
                body: "rate limited".into()
            }
            .is_retryable()
        );
        assert!(
            ServiceError::Status {
                status: 503,
                body: String::new()
            }
            .is_retryable()
        );
        assert!(
            !ServiceError::Status {
                status: 401,
                body: "unauthorized".into()
            }
            .is_retryable()
        );
        assert!(!ServiceError::EmptyResponse.is_retryable());
        assert!(!ServiceError::Transport("connection refused".into()).is_retryable());
    }

    #[test]
    fn stage_error_exposes_raw_text() {
        let err = StageError::MalformedPayload {
            reason: "EOF while parsing".into(),
            normalized: "{\"a\":".into(),
            original: "{\n\"a\":".into(),
        };
        assert_eq!(err.kind(), "malformed_payload");
        assert_eq!(err.raw_response(), Some("{\n\"a\":"));

        let err = StageError::from(ServiceError::EmptyResponse);
        assert_eq!(err.kind(), "service_error");
        assert!(err.raw_response().is_none());
    }

    #[test]
    fn pipeline_error_names_stage_and_cause() {
        let err = PipelineError {
            stage: FailedStage::Generating(2),
            cause: StageError::Service(ServiceError::Timeout { secs: 60 }),
            sections_completed: 2,
        };
        let msg = err.to_string();
        assert!(msg.contains("generating(2)"));
        assert!(msg.contains("timed out"));
    }

    #[test]
    fn missing_variable_names_stage() {
        let err = StageError::MissingVariable {
            stage: StageKind::Generate,
            name: "previous_sections".into(),
        };
        assert_eq!(
            err.to_string(),
            "generate prompt needs variable `previous_sections` but no value was supplied"
        );
    }
}
