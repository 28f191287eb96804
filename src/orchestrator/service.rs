// ABOUTME: Orchestrator facade that owns the worker pool and exposes one entry point per flow.
// ABOUTME: Renders merge, refinement and track results into a single conversation entry.

use std::sync::Arc;

use thiserror::Error;

use crate::config::{ConfigError, EnsembleConfig};

use super::classifier::TaskClassifier;
use super::merger::ResponseMerger;
use super::pool::{PoolError, WorkerPool};
use super::refinement::{RefinementEngine, successful_or_all};
use super::tracks::ParallelTracks;
use super::types::{
    ContextFile, ConversationEntry, MergeResult, MergeStrategy, RefinementOutcome, RoundPlan,
    TrackOutcome, WorkerResponse,
};
use super::worker::WorkerBackend;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Which flow a request runs through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// One classify, dispatch, merge cycle.
    Respond,
    Refine(RoundPlan),
    Tracks,
}

/// Result of a single respond cycle.
///
/// `responses` holds every dispatched worker in request order, failed ones
/// included; `merged` only draws on the successful ones when any succeeded.
#[derive(Debug, Clone)]
pub struct RespondOutcome {
    pub category: String,
    pub responses: Vec<WorkerResponse>,
    pub merged: MergeResult,
}

pub struct Orchestrator {
    config: EnsembleConfig,
    pool: Arc<WorkerPool>,
    classifier: TaskClassifier,
    merger: ResponseMerger,
    tracks: ParallelTracks,
}

impl Orchestrator {
    pub fn new(
        config: EnsembleConfig,
        backend: Arc<dyn WorkerBackend>,
    ) -> Result<Self, OrchestratorError> {
        config.validate()?;
        let pool = Arc::new(WorkerPool::from_config(&config, backend)?);
        let tracks = ParallelTracks::new(Arc::clone(&pool), &config)?;

        Ok(Self {
            classifier: TaskClassifier::from_config(&config),
            merger: ResponseMerger::from_config(&config),
            pool,
            tracks,
            config,
        })
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    pub fn config(&self) -> &EnsembleConfig {
        &self.config
    }

    // =========================================================================
    // Flows
    // =========================================================================

    /// Classify, dispatch to the round-one budget of best-fit workers, merge once.
    pub async fn respond(
        &self,
        prompt: &str,
        context_files: &[ContextFile],
        strategy: MergeStrategy,
    ) -> RespondOutcome {
        let classification = self.classifier.classify(prompt);
        let count = self.config.refinement.worker_budgets.first().copied().unwrap_or(1);
        let selected = self
            .classifier
            .select_workers(&classification, self.pool.workers(), count);

        log::info!(
            "[Orchestrator] Responding to {} task with {}",
            classification.primary_category,
            selected.join(", ")
        );

        let responses = self.pool.dispatch(prompt, &selected, context_files).await;
        let merged = self.merger.merge(
            &successful_or_all(&responses),
            &classification.primary_category,
            strategy,
        );
        RespondOutcome {
            category: classification.primary_category,
            responses,
            merged,
        }
    }

    pub async fn refine(
        &self,
        prompt: &str,
        context_files: &[ContextFile],
        plan: RoundPlan,
        strategy: MergeStrategy,
    ) -> RefinementOutcome {
        RefinementEngine::new(Arc::clone(&self.pool), &self.config)
            .with_strategy(strategy)
            .run(prompt, context_files, plan)
            .await
    }

    pub async fn explore(&self, prompt: &str, context_files: &[ContextFile]) -> [TrackOutcome; 3] {
        self.tracks.run(prompt, context_files).await
    }

    /// Run `flow` and render its result for the conversation view.
    pub async fn execute(
        &self,
        flow: Flow,
        prompt: &str,
        context_files: &[ContextFile],
        strategy: MergeStrategy,
    ) -> ConversationEntry {
        match flow {
            Flow::Respond => {
                let outcome = self.respond(prompt, context_files, strategy).await;
                render_merge(&outcome)
            }
            Flow::Refine(plan) => {
                let outcome = self.refine(prompt, context_files, plan, strategy).await;
                render_refinement(&outcome, strategy)
            }
            Flow::Tracks => {
                let outcomes = self.explore(prompt, context_files).await;
                render_tracks(&outcomes)
            }
        }
    }
}

// =============================================================================
// Rendering
// =============================================================================

pub fn render_merge(outcome: &RespondOutcome) -> ConversationEntry {
    let merged = &outcome.merged;
    let sources: Vec<String> = outcome
        .responses
        .iter()
        .map(|r| {
            let status = if r.succeeded { "ok" } else { "failed" };
            format!("{} ({}, {}ms)", r.worker_name, status, r.elapsed_ms)
        })
        .collect();

    let mut body = merged.content.clone();
    if !sources.is_empty() {
        body.push_str(&format!("\n\nSources: {}", sources.join(", ")));
    }

    // Failures stay visible even when a sibling's answer carried the merge.
    let failures: Vec<String> = outcome
        .responses
        .iter()
        .filter(|r| !r.succeeded)
        .map(|r| format!("- {}: {}", r.worker_name, r.content))
        .collect();
    if !failures.is_empty() && merged.sources.iter().any(|r| r.succeeded) {
        body.push_str(&format!("\n\nFailed workers:\n{}", failures.join("\n")));
    }

    ConversationEntry {
        title: format!("Ensemble response ({})", outcome.category),
        body,
        strategy: merged.strategy_used().to_string(),
        round_history: Vec::new(),
        final_artifact: None,
        created_at: jiff::Timestamp::now(),
    }
}

pub fn render_refinement(
    outcome: &RefinementOutcome,
    strategy: MergeStrategy,
) -> ConversationEntry {
    let mut title = format!(
        "Refinement: {} of {} rounds",
        outcome.total_rounds_executed, outcome.planned_rounds
    );
    if outcome.terminated_early {
        title.push_str(", stopped early on quality");
    }

    let mut body = outcome.round_history.join("\n");
    if let Some(report) = &outcome.complexity {
        body = format!(
            "Complexity {}/10 ({:?}) planned {} rounds.\n{}",
            report.score, report.tier, report.round_count, body
        );
    }
    body.push_str(&format!("\n\nFinal artifact:\n```\n{}\n```", outcome.final_artifact));

    ConversationEntry {
        title,
        body,
        strategy: strategy.as_str().to_string(),
        round_history: outcome.round_history.clone(),
        final_artifact: Some(outcome.final_artifact.clone()),
        created_at: jiff::Timestamp::now(),
    }
}

pub fn render_tracks(outcomes: &[TrackOutcome; 3]) -> ConversationEntry {
    let mut sections = Vec::with_capacity(outcomes.len());
    let mut round_history = Vec::new();

    for outcome in outcomes {
        sections.push(format!(
            "## {}\n{}\nWorkers: {}\n\n```\n{}\n```",
            outcome.track_name,
            outcome.focus,
            outcome.assigned_workers.join(", "),
            outcome.final_artifact
        ));
        for round in &outcome.history {
            round_history.push(format!(
                "{} round {}: {} merge, {} chars",
                outcome.track_name,
                round.round_index,
                round.merged.strategy_used(),
                round.extracted_artifact.chars().count()
            ));
        }
    }

    ConversationEntry {
        title: format!("Parallel exploration: {} tracks", outcomes.len()),
        body: sections.join("\n\n"),
        strategy: MergeStrategy::Balanced.as_str().to_string(),
        round_history,
        final_artifact: None,
        created_at: jiff::Timestamp::now(),
    }
}
