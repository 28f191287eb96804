// ABOUTME: Reduces N worker responses to one via democratic, expert or balanced merging.
// ABOUTME: Democratic detects shared 3-word phrases; expert weighs responses by category expertise.

use std::collections::{HashMap, HashSet};

use crate::config::EnsembleConfig;

use super::extract::three_word_phrases;
use super::types::{
    AgreementLevel, ConsensusSummary, ExpertPick, MergeOutcome, MergeResult, MergeStrategy,
    WorkerResponse,
};

const EMPTY_MERGE_PLACEHOLDER: &str = "No worker responses were available to merge.";
const EXPERT_HEADER: &str = "### Expert Recommendation";
const CONSENSUS_HEADER: &str = "### Consensus View";
/// Phrases shown inline in a consensus annotation. The summary keeps all of them.
const MAX_LISTED_PHRASES: usize = 10;

#[derive(Debug, Clone, Default)]
pub struct ResponseMerger {
    /// category -> worker name -> weight
    expert_weights: HashMap<String, HashMap<String, f64>>,
}

impl ResponseMerger {
    pub fn new(expert_weights: HashMap<String, HashMap<String, f64>>) -> Self {
        Self { expert_weights }
    }

    pub fn from_config(config: &EnsembleConfig) -> Self {
        Self::new(config.expert_weights.clone())
    }

    /// Weight of a worker within a category; unlisted workers weigh 1.
    pub fn weight(&self, category: &str, worker: &str) -> f64 {
        self.expert_weights
            .get(category)
            .and_then(|table| table.get(worker))
            .copied()
            .unwrap_or(1.0)
    }

    pub fn merge(
        &self,
        responses: &[WorkerResponse],
        category: &str,
        strategy: MergeStrategy,
    ) -> MergeResult {
        match responses {
            [] => {
                return MergeResult {
                    content: EMPTY_MERGE_PLACEHOLDER.to_string(),
                    sources: Vec::new(),
                    outcome: MergeOutcome::None,
                };
            }
            [only] => {
                return MergeResult {
                    content: only.content.clone(),
                    sources: responses.to_vec(),
                    outcome: MergeOutcome::Single {
                        worker_name: only.worker_name.clone(),
                    },
                };
            }
            _ => {}
        }

        let (content, outcome) = match strategy {
            MergeStrategy::Democratic => {
                let (content, summary) = self.democratic(responses);
                (content, MergeOutcome::Democratic(summary))
            }
            MergeStrategy::Expert => {
                let (content, pick) = self.expert(responses, category);
                (content, MergeOutcome::Expert(pick))
            }
            MergeStrategy::Balanced => {
                let (expert_content, expert) = self.expert(responses, category);
                let (consensus_content, consensus) = self.democratic(responses);
                let content = format!(
                    "{}\n\n{}\n\n{}\n\n{}",
                    EXPERT_HEADER, expert_content, CONSENSUS_HEADER, consensus_content
                );
                (content, MergeOutcome::Balanced { expert, consensus })
            }
        };

        log::debug!(
            "[Merger] Merged {} responses with {} strategy for '{}'",
            responses.len(),
            outcome.kind(),
            category
        );

        MergeResult {
            content,
            sources: responses.to_vec(),
            outcome,
        }
    }

    // =========================================================================
    // Democratic
    // =========================================================================

    fn democratic(&self, responses: &[WorkerResponse]) -> (String, ConsensusSummary) {
        let common_phrases = common_phrases(responses);
        let agreement = AgreementLevel::from_common_count(common_phrases.len());

        // Longest by characters; max_by_key would keep the last on ties.
        let mut base = &responses[0];
        for response in &responses[1..] {
            if response.content.chars().count() > base.content.chars().count() {
                base = response;
            }
        }

        let listed = if common_phrases.is_empty() {
            "none detected".to_string()
        } else {
            common_phrases
                .iter()
                .take(MAX_LISTED_PHRASES)
                .map(|p| format!("\"{}\"", p))
                .collect::<Vec<_>>()
                .join(", ")
        };

        let content = format!(
            "{}\n\n---\nConsensus: {} agreement across {} responses (base: {}).\nCommon phrases: {}",
            base.content,
            agreement.as_str(),
            responses.len(),
            base.worker_name,
            listed
        );

        let summary = ConsensusSummary {
            common_phrases,
            agreement,
            base_worker: base.worker_name.clone(),
        };
        (content, summary)
    }

    // =========================================================================
    // Expert
    // =========================================================================

    fn expert(&self, responses: &[WorkerResponse], category: &str) -> (String, ExpertPick) {
        let score_of = |r: &WorkerResponse| {
            self.weight(category, &r.worker_name)
                * (1.0 + r.content.chars().count() as f64 / 1000.0)
        };

        let mut best = &responses[0];
        let mut best_score = score_of(best);
        for response in &responses[1..] {
            let score = score_of(response);
            if score > best_score {
                best = response;
                best_score = score;
            }
        }

        let content = format!(
            "Selected expert: {} (score {:.2})\n\n{}",
            best.worker_name, best_score, best.content
        );
        let pick = ExpertPick {
            expert: best.worker_name.clone(),
            score: best_score,
        };
        (content, pick)
    }
}

/// Phrases that recur in at least half (rounded up) of the other responses.
///
/// Unique, in first-seen order across the input.
fn common_phrases(responses: &[WorkerResponse]) -> Vec<String> {
    let per_response: Vec<Vec<String>> = responses
        .iter()
        .map(|r| three_word_phrases(&r.content))
        .collect();
    let sets: Vec<HashSet<&str>> = per_response
        .iter()
        .map(|phrases| phrases.iter().map(String::as_str).collect())
        .collect();

    let others = responses.len().saturating_sub(1);
    let required = others.div_ceil(2).max(1);

    let mut seen = HashSet::new();
    let mut common = Vec::new();
    for (i, phrases) in per_response.iter().enumerate() {
        for phrase in phrases {
            if seen.contains(phrase.as_str()) {
                continue;
            }
            let hits = sets
                .iter()
                .enumerate()
                .filter(|(j, set)| *j != i && set.contains(phrase.as_str()))
                .count();
            if hits >= required {
                seen.insert(phrase.as_str());
                common.push(phrase.clone());
            }
        }
    }
    common
}
