//! CLI command definitions for dpoforge.
//!
//! The `generate` command runs the full pipeline in one shot: load a tool
//! catalog, generate tasks, synthesize and validate preference pairs with
//! bounded concurrency, and export the results. The `tools` command inspects
//! a catalog without making any API calls.

use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use crate::config::GenerationConfig;
use crate::engine::{CancelToken, ProgressSnapshot, RunState, Scheduler};
use crate::error::EngineError;
use crate::export::JsonlExporter;
use crate::gateway::OpenAiGateway;
use crate::synthesizer::{RejectedStrategy, SampleSynthesizer};
use crate::tasks::{TaskGenerator, ToolCount, ToolRegistry};
use crate::validator::{SampleValidator, ValidatorConfig};

/// Default model to use for generation.
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Default output directory for generated datasets.
const DEFAULT_OUTPUT_DIR: &str = "./output";

/// DPO preference-pair dataset generator for tool-calling agents.
#[derive(Parser)]
#[command(name = "dpoforge")]
#[command(about = "Generate DPO training data for tool-calling agents")]
#[command(version)]
#[command(
    long_about = "dpoforge prompts a language model to produce chosen/rejected tool-invocation pairs, validates them, and exports batched JSONL datasets.\n\nExample usage:\n  dpoforge generate --tools ./tools.json --count 100 --concurrency 5 --output ./output"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Generate a DPO dataset from a tool catalog.
    #[command(alias = "gen")]
    Generate(GenerateArgs),

    /// Inspect a tool catalog without making any API calls.
    Tools(ToolsArgs),
}

/// Arguments for `dpoforge generate`.
#[derive(Parser, Debug)]
pub struct GenerateArgs {
    /// Path to the tool catalog JSON file.
    #[arg(short, long)]
    pub tools: String,

    /// Number of tasks to generate.
    #[arg(short = 'n', long, default_value = "100")]
    pub count: usize,

    /// Maximum task pipelines issuing API calls at once.
    #[arg(short = 'k', long, default_value = "5")]
    pub concurrency: usize,

    /// Fraction (0.0-1.0) of tasks that are multi-turn.
    #[arg(long, default_value = "0.3")]
    pub multi_turn_ratio: f64,

    /// Tools sampled into each task's tool set.
    #[arg(long, default_value = "3")]
    pub tools_per_task: usize,

    /// RNG seed for a reproducible task set.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Base URL of the OpenAI-compatible API.
    #[arg(long, env = "DPOFORGE_API_BASE", default_value = "https://api.openai.com/v1")]
    pub api_base: String,

    /// API key (can also be set via DPOFORGE_API_KEY).
    #[arg(long, env = "DPOFORGE_API_KEY")]
    pub api_key: String,

    /// Model identifier.
    #[arg(short = 'm', long, default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Run a self-evaluation call after each pair and attach scores.
    #[arg(long)]
    pub self_evaluate: bool,

    /// Use the naive regenerate-hotter rejected strategy instead of the
    /// smart contrastive one.
    #[arg(long)]
    pub naive_rejected: bool,

    /// Accept chosen responses that contain no tool invocation.
    #[arg(long)]
    pub allow_no_invocation: bool,

    /// Output directory for the exported dataset.
    #[arg(short = 'o', long, default_value = DEFAULT_OUTPUT_DIR)]
    pub output: String,

    /// Samples per exported JSONL file.
    #[arg(long, default_value = "1000")]
    pub batch_size: usize,

    /// Dataset name used in dataset_info.json.
    #[arg(long, default_value = "tool_dpo_dataset")]
    pub dataset_name: String,
}

/// Arguments for `dpoforge tools`.
#[derive(Parser, Debug)]
pub struct ToolsArgs {
    /// Path to the tool catalog JSON file.
    #[arg(short, long)]
    pub tools: String,
}

/// Parse CLI arguments without running a command.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI by parsing arguments and executing the command.
///
/// For more control over logging initialization, use `parse_cli()` and
/// `run_with_cli()`.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Generate(args) => run_generate_command(args).await,
        Commands::Tools(args) => run_tools_command(args).await,
    }
}

async fn run_generate_command(args: GenerateArgs) -> anyhow::Result<()> {
    let config = GenerationConfig::default()
        .with_api(args.api_base, args.api_key, args.model)
        .with_num_tasks(args.count)
        .with_concurrency(args.concurrency)
        .with_multi_turn_ratio(args.multi_turn_ratio)
        .with_output_dir(&args.output);
    let config = GenerationConfig {
        tools_per_task: args.tools_per_task,
        seed: args.seed,
        self_evaluate: args.self_evaluate,
        naive_rejected: args.naive_rejected,
        require_chosen_invocation: !args.allow_no_invocation,
        batch_size: args.batch_size,
        dataset_name: args.dataset_name,
        ..config
    };
    config.validate()?;

    let registry = ToolRegistry::load(&args.tools)?;
    if registry.is_empty() {
        anyhow::bail!("Tool catalog {} contains no usable tools", args.tools);
    }

    let gateway = Arc::new(OpenAiGateway::new(
        config.api_base.clone(),
        config.api_key.clone(),
        config.model.clone(),
    ));
    info!(
        api_base = %gateway.api_base(),
        model = %gateway.model(),
        api_key = %gateway.api_key_masked(),
        "Configured model gateway"
    );

    let generator = TaskGenerator::new(&registry);
    let tasks = generator.generate(
        config.num_tasks,
        config.multi_turn_ratio,
        ToolCount::Fixed(config.tools_per_task),
        config.seed,
    );
    if tasks.is_empty() {
        anyhow::bail!("No tasks could be generated from the catalog");
    }

    let strategy = if config.naive_rejected {
        RejectedStrategy::Naive
    } else {
        RejectedStrategy::Smart
    };
    let synthesizer = Arc::new(
        SampleSynthesizer::new(gateway)
            .with_strategy(strategy)
            .with_self_evaluation(config.self_evaluate),
    );
    let validator = SampleValidator::new(ValidatorConfig {
        require_chosen_invocation: config.require_chosen_invocation,
        require_rejected_invocation: false,
        thresholds: None,
    });

    let scheduler = Scheduler::new(synthesizer, validator, config.concurrency)?
        .with_progress_sink(Arc::new(print_progress));

    let cancel = CancelToken::new();
    install_ctrlc_handler(cancel.clone());

    let report = scheduler.run(tasks, cancel).await;

    if let Some(message) = &report.auth_failure {
        return Err(EngineError::Authentication(message.clone()).into());
    }
    if report.state == RunState::Aborted {
        warn!("Run aborted, exporting the samples resolved so far");
    }

    let exporter = JsonlExporter::new(&config.output_dir, config.batch_size)?;

    let valid = report.valid_samples();
    match exporter.export_samples(&valid) {
        Ok(paths) => info!(files = paths.len(), samples = valid.len(), "Dataset exported"),
        Err(crate::error::ExportError::NoSamples) => {
            warn!("No valid samples were produced, nothing to export")
        }
        Err(e) => return Err(e.into()),
    }

    exporter.export_invalid_samples(&report.invalid_samples())?;
    exporter.export_statistics(&report.snapshot)?;
    exporter.export_dataset_info(&config.dataset_name)?;

    info!(
        state = %report.state,
        valid = report.snapshot.succeeded_valid,
        invalid = report.snapshot.succeeded_invalid,
        failed = report.snapshot.failed,
        output = %exporter.output_dir().display(),
        "Generation finished"
    );
    Ok(())
}

async fn run_tools_command(args: ToolsArgs) -> anyhow::Result<()> {
    let registry = ToolRegistry::load(&args.tools)?;

    println!("Catalog: {} ({} tools)", args.tools, registry.len());
    for tool in registry.all() {
        let category = tool.category.as_deref().unwrap_or("-");
        println!("  {:<30} [{}] {}", tool.qualified_name(), category, tool.description);
    }
    Ok(())
}

fn print_progress(snapshot: ProgressSnapshot) {
    info!(
        completed = snapshot.completed,
        total = snapshot.total,
        valid = snapshot.succeeded_valid,
        invalid = snapshot.succeeded_invalid,
        failed = snapshot.failed,
        rate = %format!("{:.2}/s", snapshot.rate),
        validation_rate = %format!("{:.1}%", snapshot.validation_success_rate),
        "Progress"
    );
    if let Some(last_error) = snapshot.recent_errors.last() {
        if snapshot.failed > 0 {
            warn!(error = %last_error, "Most recent task failure");
        }
    }
}

fn install_ctrlc_handler(cancel: CancelToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing in-flight tasks then stopping");
            cancel.cancel();
        }
    });
}
