//! Shared types, error model, and configuration for Penflow.
//!
//! This crate is the foundation depended on by all other Penflow crates.
//! It provides:
//! - [`PenflowError`]: the error type for configuration and request problems
//! - The stage error taxonomy ([`StageError`], [`ServiceError`], [`PipelineError`])
//! - Domain types ([`Plan`], [`Task`], [`SectionMap`], [`ReviewVerdict`], [`PipelineResult`])
//! - Configuration ([`AppConfig`], [`GenerationConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, GenerationConfig, PipelineDefaults, PromptsConfig, config_dir, config_file_path,
    init_config, load_config, load_config_from, validate_api_key,
};
pub use error::{FailedStage, PenflowError, PipelineError, Result, ServiceError, StageError};
pub use types::{
    GeneratedSection, PipelineResult, Plan, ReviewVerdict, RunId, RunMetrics, SectionMap,
    StageKind, SuggestedEdit, Task,
};
