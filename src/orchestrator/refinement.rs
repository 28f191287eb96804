// ABOUTME: Multi-round refinement: each round classifies, dispatches, merges and extracts an artifact.
// ABOUTME: Round k's artifact feeds round k+1's prompt; a quality gate can end the run early.

use std::sync::Arc;

use crate::config::{EnsembleConfig, RefinementSettings};

use super::classifier::TaskClassifier;
use super::complexity::ComplexityAnalyzer;
use super::extract::{ArtifactExtractor, FencedBlockExtractor};
use super::merger::ResponseMerger;
use super::pool::WorkerPool;
use super::quality::{ArtifactScorer, HeuristicArtifactScorer};
use super::types::{
    ContextFile, MergeStrategy, RefinementOutcome, RefinementRound, RoundPlan, WorkerResponse,
};

// =============================================================================
// Round Definitions
// =============================================================================

/// Purpose of each round by 1-based index. Later rounds reuse the last entry.
const ROUND_PURPOSES: [&str; 5] = [
    "Generate an initial solution",
    "Critique the current solution",
    "Apply the critique",
    "Validate correctness",
    "Final polish",
];

pub fn purpose_for(round_index: usize) -> &'static str {
    let slot = round_index.clamp(1, ROUND_PURPOSES.len()) - 1;
    ROUND_PURPOSES[slot]
}

/// Prompt for a round. Round 1 is the user's prompt; later rounds embed the prior artifact.
pub fn round_prompt(round_index: usize, user_prompt: &str, artifact: &str) -> String {
    match round_index {
        0 | 1 => user_prompt.to_string(),
        2 => format!(
            "Review this solution to the task \"{user_prompt}\".\n\n```\n{artifact}\n```\n\n\
             List the weaknesses, edge cases and design problems you find, then give an improved version in a code block."
        ),
        3 => format!(
            "Apply the review feedback to this solution for \"{user_prompt}\".\n\n```\n{artifact}\n```\n\n\
             Return the corrected code in a single code block."
        ),
        4 => format!(
            "Validate that this code fully solves \"{user_prompt}\". Check inputs, outputs and failure paths.\n\n\
             ```\n{artifact}\n```\n\nReturn the validated code in a code block, corrected where needed."
        ),
        _ => format!(
            "Polish this code for \"{user_prompt}\": naming, comments and consistency only, no behaviour changes.\n\n\
             ```\n{artifact}\n```\n\nReturn the final code in a code block."
        ),
    }
}

// =============================================================================
// Engine
// =============================================================================

/// Sequential round state machine over a shared worker pool.
pub struct RefinementEngine {
    pool: Arc<WorkerPool>,
    classifier: TaskClassifier,
    merger: ResponseMerger,
    analyzer: ComplexityAnalyzer,
    extractor: Arc<dyn ArtifactExtractor>,
    scorer: Arc<dyn ArtifactScorer>,
    settings: RefinementSettings,
}

impl RefinementEngine {
    pub fn new(pool: Arc<WorkerPool>, config: &EnsembleConfig) -> Self {
        Self {
            pool,
            classifier: TaskClassifier::from_config(config),
            merger: ResponseMerger::from_config(config),
            analyzer: ComplexityAnalyzer::from_config(config),
            extractor: Arc::new(FencedBlockExtractor::new(
                config.refinement.artifact_prefix_chars,
            )),
            scorer: Arc::new(HeuristicArtifactScorer),
            settings: config.refinement.clone(),
        }
    }

    pub fn with_scorer(mut self, scorer: Arc<dyn ArtifactScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn ArtifactExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_strategy(mut self, strategy: MergeStrategy) -> Self {
        self.settings.strategy = strategy;
        self
    }

    /// Worker count for a 1-based round index.
    pub fn worker_budget(&self, round_index: usize) -> usize {
        let budgets = &self.settings.worker_budgets;
        let slot = round_index.saturating_sub(1).min(budgets.len().saturating_sub(1));
        budgets.get(slot).copied().unwrap_or(1)
    }

    pub async fn run(
        &self,
        prompt: &str,
        context_files: &[ContextFile],
        plan: RoundPlan,
    ) -> RefinementOutcome {
        let (planned_rounds, complexity) = match plan {
            RoundPlan::Fixed(n) => (n.max(1), None),
            RoundPlan::Adaptive => {
                let report = self.analyzer.analyze(prompt);
                (report.round_count, Some(report))
            }
        };

        log::info!(
            "[Refinement] Starting {} rounds with {} strategy",
            planned_rounds,
            self.settings.strategy.as_str()
        );

        let mut rounds: Vec<RefinementRound> = Vec::with_capacity(planned_rounds);
        let mut round_history = Vec::with_capacity(planned_rounds);
        let mut artifact = String::new();
        let mut terminated_early = false;

        for round_index in 1..=planned_rounds {
            let round = self
                .execute_round(round_index, planned_rounds, prompt, &artifact, context_files)
                .await;

            round_history.push(summarize(&round));
            artifact = round.extracted_artifact.clone();
            let gate = round.quality_score;
            rounds.push(round);

            if let Some(score) = gate {
                if score >= self.settings.early_exit_threshold {
                    log::info!(
                        "[Refinement] Quality {:.2} reached threshold after round {}/{}",
                        score,
                        round_index,
                        planned_rounds
                    );
                    terminated_early = true;
                    break;
                }
            }
        }

        RefinementOutcome {
            final_artifact: artifact,
            total_rounds_executed: rounds.len(),
            planned_rounds,
            round_history,
            rounds,
            terminated_early,
            complexity,
        }
    }

    async fn execute_round(
        &self,
        round_index: usize,
        planned_rounds: usize,
        user_prompt: &str,
        previous_artifact: &str,
        context_files: &[ContextFile],
    ) -> RefinementRound {
        let prompt_used = round_prompt(round_index, user_prompt, previous_artifact);
        let classification = self.classifier.classify(&prompt_used);
        let budget = self.worker_budget(round_index);
        let selected = self
            .classifier
            .select_workers(&classification, self.pool.workers(), budget);

        log::debug!(
            "[Refinement] Round {}/{} ({}): category={} workers={}",
            round_index,
            planned_rounds,
            purpose_for(round_index),
            classification.primary_category,
            selected.join(", ")
        );

        let responses = self
            .pool
            .dispatch(&prompt_used, &selected, context_files)
            .await;

        let mergeable = successful_or_all(&responses);
        let merged = self.merger.merge(
            &mergeable,
            &classification.primary_category,
            self.settings.strategy,
        );

        let mut extracted_artifact = self.extractor.extract(&merged.content);
        if extracted_artifact.is_empty() && !previous_artifact.is_empty() {
            log::warn!(
                "[Refinement] Round {} produced no artifact, keeping the previous one",
                round_index
            );
            extracted_artifact = previous_artifact.to_string();
        }

        let quality_score =
            (round_index < planned_rounds).then(|| self.scorer.score(&extracted_artifact));

        RefinementRound {
            round_index,
            purpose: purpose_for(round_index).to_string(),
            prompt_used,
            responses,
            merged,
            extracted_artifact,
            quality_score,
        }
    }
}

/// Successful responses, or every response when none succeeded so failures stay visible.
pub(crate) fn successful_or_all(responses: &[WorkerResponse]) -> Vec<WorkerResponse> {
    let succeeded: Vec<WorkerResponse> =
        responses.iter().filter(|r| r.succeeded).cloned().collect();
    if succeeded.is_empty() {
        responses.to_vec()
    } else {
        succeeded
    }
}

fn summarize(round: &RefinementRound) -> String {
    let succeeded = round.responses.iter().filter(|r| r.succeeded).count();
    let quality = match round.quality_score {
        Some(score) => format!(", quality {:.1}/10", score),
        None => String::new(),
    };
    format!(
        "Round {} ({}): {}/{} workers succeeded, {} merge, {} chars{}",
        round.round_index,
        round.purpose,
        succeeded,
        round.responses.len(),
        round.merged.strategy_used(),
        round.extracted_artifact.chars().count(),
        quality
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::types::BackendError;
    use crate::orchestrator::worker::{ScriptedBackend, SimulatedBackend, WorkerBackend};

    struct FixedScorer(f64);

    impl ArtifactScorer for FixedScorer {
        fn score(&self, _artifact: &str) -> f64 {
            self.0
        }
    }

    struct UppercaseExtractor;

    impl ArtifactExtractor for UppercaseExtractor {
        fn extract(&self, text: &str) -> String {
            text.trim().to_uppercase()
        }
    }

    const PROSE_REPLY: &str = "Consider handling the null case before using the value.";

    fn good_code_reply() -> String {
        let mut code = String::from("Here is the result:\n```javascript\n");
        for i in 0..5 {
            code.push_str(&format!(
                "// Step {i} validates and transforms its input\nfunction step{i}(input) {{\n  return input + {i};\n}}\n\n"
            ));
        }
        code.push_str("```\n");
        code
    }

    fn engine_with(backend: impl WorkerBackend + 'static) -> RefinementEngine {
        let config = EnsembleConfig::default();
        let pool = WorkerPool::from_config(&config, Arc::new(backend)).unwrap();
        RefinementEngine::new(Arc::new(pool), &config)
    }

    #[test]
    fn budgets_follow_round_index_and_reuse_last() {
        let engine = engine_with(SimulatedBackend::instant());
        let budgets: Vec<usize> = (1..=7).map(|i| engine.worker_budget(i)).collect();
        assert_eq!(budgets, vec![5, 3, 3, 1, 2, 2, 2]);
    }

    #[test]
    fn templates_embed_prior_artifact_after_round_one() {
        assert_eq!(round_prompt(1, "make a parser", "ignored"), "make a parser");
        for index in 2..=6 {
            let prompt = round_prompt(index, "make a parser", "let x = 1;");
            assert!(prompt.contains("let x = 1;"));
            assert!(prompt.contains("make a parser"));
        }
        assert_eq!(purpose_for(1), "Generate an initial solution");
        assert_eq!(purpose_for(9), "Final polish");
    }

    #[tokio::test]
    async fn runs_all_rounds_when_quality_stays_low() {
        let backend = ScriptedBackend::constant(PROSE_REPLY);
        let engine = engine_with(backend.clone());
        let outcome = engine.run("refactor my module", &[], RoundPlan::Fixed(5)).await;

        assert_eq!(outcome.total_rounds_executed, 5);
        assert_eq!(outcome.planned_rounds, 5);
        assert!(!outcome.terminated_early);
        assert_eq!(outcome.round_history.len(), 5);
        assert!(outcome.complexity.is_none());

        let sizes: Vec<usize> = outcome.rounds.iter().map(|r| r.responses.len()).collect();
        assert_eq!(sizes, vec![5, 3, 3, 1, 2]);
        assert_eq!(backend.call_count(), 14);

        assert_eq!(outcome.rounds[3].merged.strategy_used(), "single");
        assert!(outcome.rounds[..4].iter().all(|r| r.quality_score.is_some()));
        assert!(outcome.rounds[4].quality_score.is_none());
        assert_eq!(outcome.rounds[3].extracted_artifact, PROSE_REPLY);
        assert_eq!(outcome.final_artifact, outcome.rounds[4].extracted_artifact);
    }

    #[tokio::test]
    async fn stops_after_first_round_with_high_quality_artifact() {
        let engine = engine_with(ScriptedBackend::constant(good_code_reply()));
        let outcome = engine.run("write a helper", &[], RoundPlan::Fixed(5)).await;

        assert_eq!(outcome.total_rounds_executed, 1);
        assert!(outcome.terminated_early);
        assert!(outcome.rounds[0].quality_score.unwrap() >= 9.5);
        assert!(outcome.final_artifact.starts_with("// Step 0"));
    }

    #[tokio::test]
    async fn stops_at_the_round_where_quality_first_passes() {
        let good = good_code_reply();
        let backend = ScriptedBackend::new(move |_, request| {
            if request.prompt.starts_with("Apply the review feedback") {
                Ok(good.clone())
            } else {
                Ok(PROSE_REPLY.to_string())
            }
        });
        let engine = engine_with(backend);
        let outcome = engine.run("write a helper", &[], RoundPlan::Fixed(5)).await;

        assert_eq!(outcome.total_rounds_executed, 3);
        assert!(outcome.terminated_early);
        assert!(outcome.rounds[1].prompt_used.contains(PROSE_REPLY));
        assert_eq!(outcome.rounds[2].purpose, "Apply the critique");
    }

    #[tokio::test]
    async fn score_at_threshold_stops_early() {
        let engine = engine_with(ScriptedBackend::constant(PROSE_REPLY))
            .with_scorer(Arc::new(FixedScorer(9.5)));
        let outcome = engine.run("write a helper", &[], RoundPlan::Fixed(5)).await;

        assert_eq!(outcome.total_rounds_executed, 1);
        assert!(outcome.terminated_early);
        assert_eq!(outcome.rounds[0].quality_score, Some(9.5));
    }

    #[tokio::test]
    async fn score_just_below_threshold_runs_every_round() {
        let engine = engine_with(ScriptedBackend::constant(PROSE_REPLY))
            .with_scorer(Arc::new(FixedScorer(9.49)));
        let outcome = engine.run("write a helper", &[], RoundPlan::Fixed(5)).await;

        assert_eq!(outcome.total_rounds_executed, 5);
        assert!(!outcome.terminated_early);
        assert_eq!(outcome.rounds[3].quality_score, Some(9.49));
    }

    #[tokio::test]
    async fn injected_extractor_shapes_the_carried_artifact() {
        let engine = engine_with(ScriptedBackend::constant(PROSE_REPLY))
            .with_extractor(Arc::new(UppercaseExtractor));
        let outcome = engine.run("refactor my module", &[], RoundPlan::Fixed(2)).await;

        let first = &outcome.rounds[0];
        let carried = first.merged.content.trim().to_uppercase();
        assert_eq!(first.extracted_artifact, carried);
        assert!(carried.contains("CONSIDER HANDLING THE NULL CASE"));
        assert!(outcome.rounds[1].prompt_used.contains(&carried));
    }

    #[tokio::test]
    async fn final_round_is_never_gated() {
        let engine = engine_with(ScriptedBackend::constant(good_code_reply()));
        let outcome = engine.run("write a helper", &[], RoundPlan::Fixed(1)).await;

        assert_eq!(outcome.total_rounds_executed, 1);
        assert!(!outcome.terminated_early);
        assert!(outcome.rounds[0].quality_score.is_none());
    }

    #[tokio::test]
    async fn adaptive_plan_uses_complexity_round_count() {
        let engine = engine_with(ScriptedBackend::constant(PROSE_REPLY));
        let outcome = engine
            .run("a simple hello world example", &[], RoundPlan::Adaptive)
            .await;

        let complexity = outcome.complexity.unwrap();
        assert_eq!(complexity.round_count, 2);
        assert_eq!(outcome.planned_rounds, 2);
        assert_eq!(outcome.total_rounds_executed, 2);
    }

    #[tokio::test]
    async fn failures_are_merged_when_nothing_succeeds() {
        let engine = engine_with(ScriptedBackend::new(|_, _| {
            Err(BackendError::Unavailable("offline".to_string()))
        }));
        let outcome = engine.run("fix the crash", &[], RoundPlan::Fixed(2)).await;

        assert_eq!(outcome.total_rounds_executed, 2);
        let first = &outcome.rounds[0];
        assert_eq!(first.merged.sources.len(), 5);
        assert!(first.merged.sources.iter().all(|r| !r.succeeded));
        assert!(first.merged.content.contains("offline"));
        assert!(!first.extracted_artifact.is_empty());
    }

    #[tokio::test]
    async fn only_successful_responses_are_merged() {
        let engine = engine_with(ScriptedBackend::new(|worker, _| {
            if worker.display_name == "Qwen" {
                Err(BackendError::Failed("timeout upstream".to_string()))
            } else {
                Ok(format!("{} says hello", worker.display_name))
            }
        }));
        let outcome = engine.run("fix this bug in my function", &[], RoundPlan::Fixed(1)).await;

        let round = &outcome.rounds[0];
        assert_eq!(round.responses.len(), 5);
        assert_eq!(round.merged.sources.len(), 4);
        assert!(round.merged.sources.iter().all(|r| r.worker_name != "Qwen"));
    }

    #[tokio::test]
    async fn debug_prompt_scenario() {
        let engine = engine_with(SimulatedBackend::instant());
        let outcome = engine
            .run("fix this bug in my function", &[], RoundPlan::Fixed(5))
            .await;

        let first = &outcome.rounds[0];
        let names: Vec<&str> = first.responses.iter().map(|r| r.worker_name.as_str()).collect();
        assert_eq!(&names[..3], &["Qwen", "Phi", "DeepSeek"]);
        assert!(!first.extracted_artifact.is_empty());
        assert_eq!(first.merged.strategy_used(), "balanced");
        assert!(first.merged.content.contains("### Expert Recommendation"));
        assert!(first.merged.content.contains("### Consensus View"));
        assert!(outcome.total_rounds_executed >= 1);
    }
}
