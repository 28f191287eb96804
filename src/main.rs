// ABOUTME: Command-line entry point for the agent ensemble.
// ABOUTME: Runs one flow against the simulated backend and prints the rendered conversation entry.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};

use agent_ensemble_lib::config::EnsembleConfig;
use agent_ensemble_lib::orchestrator::service::{Flow, Orchestrator};
use agent_ensemble_lib::orchestrator::types::{ContextFile, MergeStrategy, RoundPlan};
use agent_ensemble_lib::orchestrator::worker::SimulatedBackend;
use agent_ensemble_lib::verification::assessor::QualityAssessor;
use agent_ensemble_lib::verification::autofix::AutoFixPipeline;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Single classify, dispatch and merge cycle
    Respond,
    /// Fixed-length multi-round refinement
    Refine,
    /// Refinement with round count chosen from prompt complexity
    Adaptive,
    /// Three concurrent refinement tracks
    Tracks,
}

/// Agent Ensemble - route a task to a pool of workers and merge what they produce
#[derive(Parser, Debug)]
#[command(name = "agent-ensemble")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (defaults to the platform config dir, then built-in defaults)
    #[arg(long, env = "AGENT_ENSEMBLE_CONFIG")]
    config: Option<PathBuf>,

    /// Merge strategy: democratic, expert or balanced
    #[arg(long, default_value = "balanced")]
    strategy: String,

    #[arg(long, value_enum, default_value_t = Mode::Respond)]
    mode: Mode,

    /// Round count for refine mode (defaults to the configured value; ignored by other modes)
    #[arg(long)]
    rounds: Option<usize>,

    /// Files passed to every worker as context
    #[arg(long = "context", num_args = 1..)]
    context: Vec<PathBuf>,

    /// Repair and score the final artifact after the flow completes
    #[arg(long)]
    verify: bool,

    /// Print the entry as JSON instead of text
    #[arg(long)]
    json: bool,

    /// The task to run
    prompt: String,
}

fn read_context_files(paths: &[PathBuf]) -> anyhow::Result<Vec<ContextFile>> {
    paths
        .iter()
        .map(|path| {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read context file {}", path.display()))?;
            Ok(ContextFile::new(path.display().to_string(), content))
        })
        .collect()
}

/// Map the CLI mode to a flow. `--rounds` only shapes refine mode; elsewhere it is
/// dropped with a warning.
fn flow_for(mode: Mode, rounds: Option<usize>, default_rounds: usize) -> Flow {
    if rounds.is_some() && mode != Mode::Refine {
        log::warn!(
            "[Main] --rounds only applies to refine mode; ignoring it for {:?}",
            mode
        );
    }

    match mode {
        Mode::Respond => Flow::Respond,
        Mode::Refine => Flow::Refine(RoundPlan::Fixed(rounds.unwrap_or(default_rounds))),
        Mode::Adaptive => Flow::Refine(RoundPlan::Adaptive),
        Mode::Tracks => Flow::Tracks,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = EnsembleConfig::load_or_default(cli.config.as_deref())?;
    let context_files = read_context_files(&cli.context)?;
    let strategy = MergeStrategy::from_name(&cli.strategy);

    let flow = flow_for(cli.mode, cli.rounds, config.refinement.default_rounds);

    let backend = SimulatedBackend::new(Duration::from_millis(config.simulation.base_latency_ms));
    let orchestrator = Orchestrator::new(config, Arc::new(backend))?;

    log::info!("[Main] Running {:?} with {} strategy", cli.mode, strategy.as_str());
    let entry = orchestrator
        .execute(flow, &cli.prompt, &context_files, strategy)
        .await;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
    } else {
        println!("{}\n\n{}", entry.title, entry.body);
    }

    if cli.verify {
        let Some(artifact) = entry.final_artifact.as_deref() else {
            log::warn!("[Main] --verify needs a refine or adaptive run; nothing to verify");
            return Ok(());
        };

        let fixer = AutoFixPipeline::new(Arc::clone(orchestrator.pool()));
        let fixed = fixer.run(artifact).await;
        println!("\n{}", fixed.message);

        let assessment = QualityAssessor::new(Arc::clone(orchestrator.pool()))
            .assess(&fixed.code)
            .await;
        println!("\n{}", assessment.report());
    }

    Ok(())
}
