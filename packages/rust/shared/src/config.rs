//! Application configuration for Penflow.
//!
//! User config lives at `~/.penflow/penflow.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{PenflowError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "penflow.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".penflow";

// ---------------------------------------------------------------------------
// Config structs (matching penflow.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Generation service settings.
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Pipeline run defaults.
    #[serde(default)]
    pub pipeline: PipelineDefaults,

    /// Per-stage prompt template overrides.
    #[serde(default)]
    pub prompts: PromptsConfig,
}

/// `[generation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Base URL of an OpenAI-compatible chat completions API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model identifier sent with every request.
    #[serde(default = "default_model")]
    pub model: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Adapter-level retries for rate limits, 5xx responses and timeouts.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// First retry delay; doubles on each further attempt.
    #[serde(default = "default_retry_initial_delay_ms")]
    pub retry_initial_delay_ms: u64,

    /// Sampling temperature, if the provider default is not wanted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Upper bound on in-flight requests across all runs.
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            retry_initial_delay_ms: default_retry_initial_delay_ms(),
            temperature: None,
            max_concurrent_requests: default_max_concurrent_requests(),
        }
    }
}

fn default_base_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_model() -> String {
    "openai/gpt-4o".into()
}
fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_max_retries() -> u32 {
    2
}
fn default_retry_initial_delay_ms() -> u64 {
    500
}
fn default_max_concurrent_requests() -> usize {
    4
}

/// `[pipeline]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDefaults {
    /// Target length in words when `--length` is not given.
    #[serde(default = "default_target_length")]
    pub default_target_length: u32,

    /// Style directive when `--style` is not given.
    #[serde(default = "default_style")]
    pub default_style: String,

    /// How many independent runs may execute at once.
    #[serde(default = "default_max_concurrent_runs")]
    pub max_concurrent_runs: usize,

    /// Abort a whole run after this many seconds. `None` disables the limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_timeout_secs: Option<u64>,
}

impl Default for PipelineDefaults {
    fn default() -> Self {
        Self {
            default_target_length: default_target_length(),
            default_style: default_style(),
            max_concurrent_runs: default_max_concurrent_runs(),
            run_timeout_secs: None,
        }
    }
}

fn default_target_length() -> u32 {
    1000
}
fn default_style() -> String {
    "informative".into()
}
fn default_max_concurrent_runs() -> usize {
    2
}

/// `[prompts]` section. Unset stages use the built-in templates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generate: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review: Option<String>,
}

impl AppConfig {
    /// Check values that deserialize fine but cannot work at runtime.
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.generation.base_url).map_err(|e| {
            PenflowError::config(format!(
                "generation.base_url `{}` is not a valid URL: {e}",
                self.generation.base_url
            ))
        })?;

        if self.generation.max_concurrent_requests == 0 {
            return Err(PenflowError::config(
                "generation.max_concurrent_requests must be at least 1",
            ));
        }
        if self.pipeline.max_concurrent_runs == 0 {
            return Err(PenflowError::config(
                "pipeline.max_concurrent_runs must be at least 1",
            ));
        }
        if self.pipeline.default_target_length == 0 {
            return Err(PenflowError::config(
                "pipeline.default_target_length must be positive",
            ));
        }
        if let Some(t) = self.generation.temperature {
            if !(0.0..=2.0).contains(&t) {
                return Err(PenflowError::config(format!(
                    "generation.temperature {t} is outside 0.0..=2.0"
                )));
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.penflow/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| PenflowError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.penflow/penflow.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| PenflowError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        PenflowError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    config.validate()?;

    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| PenflowError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| PenflowError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| PenflowError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Check that the API key env var is set and non-empty.
pub fn validate_api_key(config: &AppConfig) -> Result<()> {
    let var_name = &config.generation.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(()),
        _ => Err(PenflowError::config(format!(
            "generation API key not found. Set the {var_name} environment variable."
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("base_url"));
        assert!(toml_str.contains("OPENROUTER_API_KEY"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.generation.max_retries, 2);
        assert_eq!(parsed.pipeline.default_style, "informative");
        assert!(parsed.prompts.plan.is_none());
    }

    #[test]
    fn config_with_overrides() {
        let toml_str = r#"
[generation]
base_url = "http://localhost:11434/v1"
model = "llama3"
temperature = 0.4

[pipeline]
default_target_length = 600
run_timeout_secs = 300

[prompts]
plan = "Plan {topic} in {target_length} words, {style}."
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.generation.model, "llama3");
        assert_eq!(config.generation.temperature, Some(0.4));
        // unspecified keys fall back to defaults
        assert_eq!(config.generation.api_key_env, "OPENROUTER_API_KEY");
        assert_eq!(config.pipeline.default_target_length, 600);
        assert_eq!(config.pipeline.run_timeout_secs, Some(300));
        assert!(config.prompts.plan.is_some());
        assert!(config.prompts.review.is_none());
        config.validate().expect("valid config");
    }

    #[test]
    fn invalid_base_url_rejected() {
        let mut config = AppConfig::default();
        config.generation.base_url = "not a url".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("base_url"));
    }

    #[test]
    fn zero_concurrency_rejected() {
        let mut config = AppConfig::default();
        config.pipeline.max_concurrent_runs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn api_key_validation() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.generation.api_key_env = "PENFLOW_TEST_NONEXISTENT_KEY_12345".into();
        let result = validate_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }
}
