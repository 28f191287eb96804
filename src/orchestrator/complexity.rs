// ABOUTME: Heuristic complexity analyzer that plans how many refinement rounds a prompt gets.
// ABOUTME: Scores keyword hits from a neutral midpoint and maps the score to rounds and a tier.

use crate::config::{ComplexityKeywords, EnsembleConfig};

use super::types::{ComplexityReport, DifficultyTier};

const BASE_SCORE: u8 = 5;
const MIN_SCORE: u8 = 1;
const MAX_SCORE: u8 = 10;

#[derive(Debug, Clone)]
pub struct ComplexityAnalyzer {
    keywords: ComplexityKeywords,
}

impl ComplexityAnalyzer {
    pub fn new(keywords: ComplexityKeywords) -> Self {
        Self { keywords }
    }

    pub fn from_config(config: &EnsembleConfig) -> Self {
        Self::new(config.complexity.clone())
    }

    /// Score a prompt in [1, 10].
    ///
    /// Starts at 5. Each complex keyword present adds 2 and each medium keyword
    /// adds 1, both capped at 10; each simple keyword subtracts 1, floored at 1.
    pub fn analyze(&self, prompt: &str) -> ComplexityReport {
        let lower = prompt.to_lowercase();
        let hits = |list: &[String]| {
            list.iter()
                .filter(|kw| lower.contains(&kw.to_lowercase()))
                .count()
        };

        let mut score = BASE_SCORE;
        for _ in 0..hits(&self.keywords.complex) {
            score = (score + 2).min(MAX_SCORE);
        }
        for _ in 0..hits(&self.keywords.medium) {
            score = (score + 1).min(MAX_SCORE);
        }
        for _ in 0..hits(&self.keywords.simple) {
            score = score.saturating_sub(1).max(MIN_SCORE);
        }
        let score = score.clamp(MIN_SCORE, MAX_SCORE);

        let report = ComplexityReport {
            score,
            round_count: round_count_for(score),
            tier: tier_for(score),
        };
        log::debug!(
            "[Complexity] score={} rounds={} tier={:?}",
            report.score,
            report.round_count,
            report.tier
        );
        report
    }
}

impl Default for ComplexityAnalyzer {
    fn default() -> Self {
        Self::new(ComplexityKeywords::default())
    }
}

pub fn round_count_for(score: u8) -> usize {
    if score <= 3 {
        2
    } else if score >= 8 {
        5
    } else {
        3
    }
}

pub fn tier_for(score: u8) -> DifficultyTier {
    if score <= 3 {
        DifficultyTier::Simple
    } else if score <= 7 {
        DifficultyTier::Medium
    } else {
        DifficultyTier::Complex
    }
}
