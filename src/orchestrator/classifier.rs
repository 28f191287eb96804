// ABOUTME: Task classifier using heuristic keyword matching.
// ABOUTME: Scores prompts per category and ranks workers by specialty fit.

use std::cmp::Ordering;

use crate::config::{CategoryRule, EnsembleConfig};

use super::types::{CategoryScore, TaskClassification, Worker};

// =============================================================================
// Selection Weights
// =============================================================================

const PRIMARY_SPECIALTY_WEIGHT: f64 = 3.0;
const RELEVANT_COVER_WEIGHT: f64 = 1.0;
const GENERIC_COVER_WEIGHT: f64 = 0.5;

/// Keyword classifier over a declared, ordered set of categories.
#[derive(Debug, Clone)]
pub struct TaskClassifier {
    categories: Vec<CategoryRule>,
    generic_category: String,
}

impl TaskClassifier {
    /// `categories` must be non-empty; declaration order breaks ties.
    pub fn new(categories: Vec<CategoryRule>, generic_category: impl Into<String>) -> Self {
        Self {
            categories,
            generic_category: generic_category.into(),
        }
    }

    pub fn from_config(config: &EnsembleConfig) -> Self {
        Self::new(config.categories.clone(), config.generic_category.clone())
    }

    // =========================================================================
    // Task Classification
    // =========================================================================

    /// Classify a prompt by keyword presence.
    ///
    /// Each keyword counts at most once no matter how often it occurs. The
    /// primary category is the highest score; the first declared category wins
    /// ties, including the all-zero case.
    pub fn classify(&self, prompt: &str) -> TaskClassification {
        let prompt_lower = prompt.to_lowercase();

        let scores: Vec<CategoryScore> = self
            .categories
            .iter()
            .map(|rule| CategoryScore {
                category: rule.name.clone(),
                score: rule
                    .keywords
                    .iter()
                    .filter(|kw| prompt_lower.contains(&kw.to_lowercase()))
                    .count() as u32,
            })
            .collect();

        let mut primary: Option<&CategoryScore> = None;
        for score in &scores {
            if primary.is_none_or(|best| score.score > best.score) {
                primary = Some(score);
            }
        }
        let primary_category = primary.map(|s| s.category.clone()).unwrap_or_default();

        let matched_categories = scores
            .iter()
            .filter(|s| s.score > 0)
            .map(|s| s.category.clone())
            .collect();

        TaskClassification {
            primary_category,
            scores,
            matched_categories,
        }
    }

    // =========================================================================
    // Worker Selection
    // =========================================================================

    /// Fit of one worker for a classification.
    ///
    /// `3 x [specialty is primary] + 1 x |relevant categories covered| + 0.5 x [covers generic]`.
    /// With no matched categories the primary category alone is relevant.
    pub fn worker_score(&self, classification: &TaskClassification, worker: &Worker) -> f64 {
        let mut score = 0.0;

        if worker.specialty == classification.primary_category {
            score += PRIMARY_SPECIALTY_WEIGHT;
        }

        let relevant_covered = if classification.matched_categories.is_empty() {
            usize::from(worker.covers(&classification.primary_category))
        } else {
            classification
                .matched_categories
                .iter()
                .filter(|c| worker.covers(c))
                .count()
        };
        score += RELEVANT_COVER_WEIGHT * relevant_covered as f64;

        if worker.covers(&self.generic_category) {
            score += GENERIC_COVER_WEIGHT;
        }

        score
    }

    /// Names of the `count` best-fitting workers, best first.
    ///
    /// Equal scores keep registration order. Returns `min(count, workers.len())` names.
    pub fn select_workers(
        &self,
        classification: &TaskClassification,
        workers: &[Worker],
        count: usize,
    ) -> Vec<String> {
        let mut ranked: Vec<(f64, &Worker)> = workers
            .iter()
            .map(|w| (self.worker_score(classification, w), w))
            .collect();

        // Stable sort: ties stay in registration order.
        ranked.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

        ranked
            .into_iter()
            .take(count)
            .map(|(_, w)| w.display_name.clone())
            .collect()
    }
}

impl Default for TaskClassifier {
    fn default() -> Self {
        Self::from_config(&EnsembleConfig::default())
    }
}
