// ABOUTME: Pluggable artifact scoring for the refinement early-exit gate.
// ABOUTME: The heuristic scorer blends length, structure, comment density and bracket balance.

use regex::Regex;

use crate::verification::syntax::brackets_balanced;

lazy_static::lazy_static! {
    static ref STRUCTURE_KEYWORD: Regex =
        Regex::new(r"\b(fn|function|class|def|struct|impl)\b").expect("structure regex is valid");
}

/// Scores an extracted artifact in [0, 10].
pub trait ArtifactScorer: Send + Sync {
    fn score(&self, artifact: &str) -> f64;
}

const EMPTY_ARTIFACT_SCORE: f64 = 3.0;
const FULL_LENGTH_CHARS: f64 = 400.0;
const FULL_STRUCTURE_COUNT: f64 = 2.0;
const FULL_COMMENT_DENSITY: f64 = 0.2;

const LENGTH_WEIGHT: f64 = 0.2;
const STRUCTURE_WEIGHT: f64 = 0.3;
const COMMENT_WEIGHT: f64 = 0.2;
const BALANCE_WEIGHT: f64 = 0.3;

#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicArtifactScorer;

impl HeuristicArtifactScorer {
    fn comment_density(artifact: &str) -> f64 {
        let mut non_empty = 0usize;
        let mut comments = 0usize;
        for line in artifact.lines().map(str::trim).filter(|l| !l.is_empty()) {
            non_empty += 1;
            if line.starts_with("//")
                || line.starts_with('#')
                || line.starts_with("/*")
                || line.starts_with('*')
            {
                comments += 1;
            }
        }
        if non_empty == 0 {
            0.0
        } else {
            comments as f64 / non_empty as f64
        }
    }
}

impl ArtifactScorer for HeuristicArtifactScorer {
    fn score(&self, artifact: &str) -> f64 {
        if artifact.trim().is_empty() {
            return EMPTY_ARTIFACT_SCORE;
        }

        let length = (artifact.chars().count() as f64 / FULL_LENGTH_CHARS).min(1.0);
        let structure =
            (STRUCTURE_KEYWORD.find_iter(artifact).count() as f64 / FULL_STRUCTURE_COUNT).min(1.0);
        let comments = (Self::comment_density(artifact) / FULL_COMMENT_DENSITY).min(1.0);
        let balance = if brackets_balanced(artifact) { 1.0 } else { 0.0 };

        let weighted = LENGTH_WEIGHT * length
            + STRUCTURE_WEIGHT * structure
            + COMMENT_WEIGHT * comments
            + BALANCE_WEIGHT * balance;
        (weighted * 10.0).clamp(0.0, 10.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn well_formed_artifact() -> String {
        let mut code = String::new();
        for i in 0..5 {
            code.push_str(&format!(
                "// Helper number {i} keeps the pipeline readable\nfunction step{i}(input) {{\n  return input + {i};\n}}\n\n"
            ));
        }
        code
    }

    #[test]
    fn empty_artifact_gets_floor_score() {
        assert_eq!(HeuristicArtifactScorer.score(""), 3.0);
        assert_eq!(HeuristicArtifactScorer.score("  \n "), 3.0);
    }

    #[test]
    fn well_formed_code_reaches_full_marks() {
        let artifact = well_formed_artifact();
        assert!(artifact.len() > 400);
        assert!((HeuristicArtifactScorer.score(&artifact) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn prose_scores_low() {
        // Short, no structure, no comments, balanced: 0.2*len + 0.3.
        let score = HeuristicArtifactScorer.score("just some words");
        assert!(score > 3.0 && score < 4.0, "score was {}", score);
    }

    #[test]
    fn unbalanced_code_loses_balance_weight() {
        let mut artifact = well_formed_artifact();
        artifact.push_str("function broken() {\n");
        let score = HeuristicArtifactScorer.score(&artifact);
        assert!((score - 7.0).abs() < 1e-9, "score was {}", score);
    }

    #[test]
    fn comment_density_counts_comment_lines() {
        let density = HeuristicArtifactScorer::comment_density("// a\ncode\n\n# b\ncode");
        assert!((density - 0.5).abs() < 1e-9);
    }
}
