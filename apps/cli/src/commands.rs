//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use tracing::{info, warn};

use penflow_core::{Orchestrator, OrchestratorConfig, PipelineRequest, RunFailure};
use penflow_generation::HttpGenerationService;
use penflow_prompts::{PromptTemplates, stage_variables};
use penflow_shared::{
    AppConfig, PipelineResult, StageKind, init_config, load_config, load_config_from,
    validate_api_key,
};

use crate::progress::CliProgress;

/// Raw responses longer than this are cut when printed to the terminal.
const RAW_PREVIEW_CHARS: usize = 400;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Penflow: plan, write, and review content with a text generation service.
#[derive(Parser)]
#[command(
    name = "penflow",
    version,
    about = "Plan, write, and review long-form content with a text generation service.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.penflow/penflow.toml.
    #[arg(long, global = true, env = "PENFLOW_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Result output format.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the pipeline for one or more topics.
    Write {
        /// Topic(s) to write about. Several topics run concurrently.
        #[arg(required = true)]
        topics: Vec<String>,

        /// Target length in words (defaults to pipeline.default_target_length).
        #[arg(short, long)]
        length: Option<u32>,

        /// Style directive (defaults to pipeline.default_style).
        #[arg(short, long)]
        style: Option<String>,

        /// Write the full JSON result to this file.
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Output format for stdout.
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },

    /// Inspect prompt templates.
    Prompts {
        #[command(subcommand)]
        action: PromptsAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Prompt subcommands.
#[derive(Subcommand)]
pub(crate) enum PromptsAction {
    /// Validate the effective templates (built-in plus config overrides).
    Check,
    /// Print the effective template for a stage.
    Show {
        /// Stage: plan, generate, or review.
        stage: StageKind,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs go to stderr.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "penflow=info",
        1 => "penflow=debug",
        _ => "penflow=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Write {
            topics,
            length,
            style,
            out,
            format,
        } => {
            let config = resolve_config(config_path)?;
            cmd_write(&config, &topics, length, style, out.as_deref(), format).await
        }
        Command::Prompts { action } => {
            let config = resolve_config(config_path)?;
            match action {
                PromptsAction::Check => cmd_prompts_check(&config),
                PromptsAction::Show { stage } => cmd_prompts_show(&config, stage),
            }
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    Ok(match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    })
}

// ---------------------------------------------------------------------------
// write
// ---------------------------------------------------------------------------

async fn cmd_write(
    config: &AppConfig,
    topics: &[String],
    length: Option<u32>,
    style: Option<String>,
    out: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    // Local OpenAI-compatible servers often need no key.
    if let Err(e) = validate_api_key(config) {
        warn!("{e} Continuing without authorization.");
    }

    let target_length = length.unwrap_or(config.pipeline.default_target_length);
    let style = style.unwrap_or_else(|| config.pipeline.default_style.clone());

    let requests = topics
        .iter()
        .map(|topic| PipelineRequest::new(topic.as_str(), target_length, style.as_str()))
        .collect::<penflow_shared::Result<Vec<_>>>()?;

    let service = Arc::new(HttpGenerationService::from_config(&config.generation)?);
    let orchestrator = Arc::new(Orchestrator::new(
        service,
        OrchestratorConfig::from_app_config(config)?,
    ));

    info!(
        runs = requests.len(),
        target_length,
        style = %style,
        model = %config.generation.model,
        "starting write"
    );

    let progress = Arc::new(CliProgress::new(requests.iter().map(|r| r.topic())));
    let outcomes = if requests.len() == 1 {
        vec![
            orchestrator
                .run_with_timeout(&requests[0], progress.as_ref())
                .await,
        ]
    } else {
        orchestrator.run_many(requests.clone(), progress.clone()).await
    };
    progress.finish();

    let mut results = Vec::new();
    let mut failed = 0;
    for (request, outcome) in requests.iter().zip(outcomes) {
        match outcome {
            Ok(result) => results.push(result),
            Err(failure) => {
                failed += 1;
                report_failure(request.topic(), &failure);
            }
        }
    }

    if let Some(path) = out {
        let json = if results.len() == 1 {
            serde_json::to_string_pretty(&results[0])?
        } else {
            serde_json::to_string_pretty(&results)?
        };
        std::fs::write(path, json).map_err(|e| eyre!("cannot write {}: {e}", path.display()))?;
        info!(path = %path.display(), "wrote result");
    }

    match format {
        OutputFormat::Text => {
            for result in &results {
                print_result(result);
            }
        }
        OutputFormat::Json if results.len() == 1 => {
            println!("{}", serde_json::to_string_pretty(&results[0])?);
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&results)?),
    }

    if failed > 0 {
        return Err(eyre!("{failed} of {} run(s) failed", topics.len()));
    }
    Ok(())
}

fn print_result(result: &PipelineResult) {
    println!();
    println!("{}", result.review.final_version);
    println!();
    println!("  Cohesion:  {:.2}", result.review.cohesion_score);
    println!(
        "  Sections:  {}",
        result.sections.kinds().collect::<Vec<_>>().join(", ")
    );
    if !result.review.suggested_edits.is_empty() {
        println!("  Suggested edits:");
        for edit in &result.review.suggested_edits {
            println!("    - [{}] {}", edit.section_kind, edit.suggested_edit);
        }
    }
    let elapsed = result.run.finished_at - result.run.started_at;
    println!(
        "  Run:       {} ({} calls, {:.1}s)",
        result.run.run_id,
        result.run.generation_calls,
        elapsed.num_milliseconds() as f64 / 1000.0
    );
    println!();
}

fn report_failure(topic: &str, failure: &RunFailure) {
    eprintln!();
    eprintln!("  Run for \"{topic}\" failed: {failure}");
    if let RunFailure::Pipeline(err) = failure {
        eprintln!("  Sections completed before failure: {}", err.sections_completed);
        if let Some(raw) = err.cause.raw_response() {
            eprintln!("  Raw response: {}", preview(raw));
        }
    }
}

fn preview(text: &str) -> String {
    match text.char_indices().nth(RAW_PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}... ({} bytes total)", &text[..cut], text.len()),
        None => text.to_string(),
    }
}

// ---------------------------------------------------------------------------
// prompts
// ---------------------------------------------------------------------------

fn cmd_prompts_check(config: &AppConfig) -> Result<()> {
    let templates = PromptTemplates::from_config(&config.prompts)?;

    for stage in StageKind::ALL {
        let overridden = match stage {
            StageKind::Plan => config.prompts.plan.is_some(),
            StageKind::Generate => config.prompts.generate.is_some(),
            StageKind::Review => config.prompts.review.is_some(),
        };
        let used: Vec<&str> = templates.get(stage).variables().into_iter().collect();
        println!(
            "  {:<9} ok  ({})  uses: {}",
            stage.as_str(),
            if overridden { "override" } else { "built-in" },
            used.join(", ")
        );
    }
    Ok(())
}

fn cmd_prompts_show(config: &AppConfig, stage: StageKind) -> Result<()> {
    let templates = PromptTemplates::from_config(&config.prompts)?;
    println!("{}", templates.get(stage).source());
    eprintln!("  available variables: {}", stage_variables(stage).join(", "));
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config = resolve_config(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_write_with_several_topics() {
        let cli = Cli::try_parse_from([
            "penflow", "-vv", "write", "caching", "queues", "--length", "600", "--format", "json",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Command::Write {
                topics,
                length,
                style,
                format,
                ..
            } => {
                assert_eq!(topics, vec!["caching", "queues"]);
                assert_eq!(length, Some(600));
                assert!(style.is_none());
                assert!(matches!(format, OutputFormat::Json));
            }
            _ => panic!("expected write"),
        }
    }

    #[test]
    fn write_requires_a_topic() {
        assert!(Cli::try_parse_from(["penflow", "write"]).is_err());
    }

    #[test]
    fn parses_prompts_show_stage() {
        let cli = Cli::try_parse_from(["penflow", "prompts", "show", "review"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Prompts {
                action: PromptsAction::Show {
                    stage: StageKind::Review
                }
            }
        ));
        assert!(Cli::try_parse_from(["penflow", "prompts", "show", "draft"]).is_err());
    }

    #[test]
    fn global_config_flag_after_subcommand() {
        let cli =
            Cli::try_parse_from(["penflow", "config", "show", "--config", "/tmp/p.toml"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/p.toml")));
    }

    #[test]
    fn preview_cuts_long_text() {
        let long = "x".repeat(RAW_PREVIEW_CHARS + 10);
        let shown = preview(&long);
        assert!(shown.contains("bytes total"));
        assert_eq!(preview("short"), "short");
    }
}
