// ABOUTME: Core types for the ensemble: prompts, classifications, workers, responses and merges.
// ABOUTME: Defines the data structures that flow between classifier, pool, merger and refinement.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Prompt Input
// =============================================================================

/// A file supplied by the editor as context for a prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextFile {
    pub path: String,
    pub content: String,
}

impl ContextFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// The unit handed to a worker backend: prompt text plus context files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptRequest {
    pub prompt: String,
    pub context_files: Vec<ContextFile>,
}

// =============================================================================
// Classification
// =============================================================================

/// Score of a single category for one prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryScore {
    pub category: String,
    pub score: u32,
}

/// Task classification produced by the keyword classifier.
///
/// `scores` keeps the declared category order so ties and zero-hit prompts
/// resolve deterministically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskClassification {
    pub primary_category: String,
    pub scores: Vec<CategoryScore>,
    pub matched_categories: Vec<String>,
}

impl TaskClassification {
    pub fn score_of(&self, category: &str) -> u32 {
        self.scores
            .iter()
            .find(|s| s.category == category)
            .map(|s| s.score)
            .unwrap_or(0)
    }
}

// =============================================================================
// Workers
// =============================================================================

/// A registered worker. Immutable once the pool is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worker {
    pub id: String,
    pub display_name: String,
    pub specialty: String,
    /// Categories this worker can handle. Always contains `specialty`.
    pub covers: Vec<String>,
    /// Scales simulated response time only.
    pub latency_factor: f64,
}

impl Worker {
    pub fn covers(&self, category: &str) -> bool {
        self.covers.iter().any(|c| c == category)
    }
}

/// One worker's answer to one dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerResponse {
    pub worker_name: String,
    pub content: String,
    /// Milliseconds since the dispatch started, from a monotonic clock.
    pub elapsed_ms: u64,
    pub specialty: String,
    pub succeeded: bool,
}

/// What a backend hands back for a single prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendReply {
    pub content: String,
    pub succeeded: bool,
}

impl BackendReply {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            succeeded: true,
        }
    }
}

/// Errors a worker backend can report. Always converted into a failed
/// `WorkerResponse` by the pool.
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
pub enum BackendError {
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    #[error("Request failed: {0}")]
    Failed(String),
}

// =============================================================================
// Merging
// =============================================================================

/// Strategy requested for reducing N responses to one.
///
/// Deserializes leniently through `from_name`, so unknown names become `Balanced`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", from = "String")]
pub enum MergeStrategy {
    Democratic,
    Expert,
    #[default]
    Balanced,
}

impl MergeStrategy {
    /// Parse a strategy name. Unknown names fall back to `Balanced`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_lowercase().as_str() {
            "democratic" | "consensus" => Self::Democratic,
            "expert" => Self::Expert,
            _ => Self::Balanced,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Democratic => "democratic",
            Self::Expert => "expert",
            Self::Balanced => "balanced",
        }
    }
}

impl From<String> for MergeStrategy {
    fn from(name: String) -> Self {
        Self::from_name(&name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgreementLevel {
    High,
    Medium,
    Low,
}

impl AgreementLevel {
    /// More than 5 shared phrases is high, more than 2 is medium.
    pub fn from_common_count(count: usize) -> Self {
        if count > 5 {
            Self::High
        } else if count > 2 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// Result of a democratic merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusSummary {
    pub common_phrases: Vec<String>,
    pub agreement: AgreementLevel,
    /// Worker whose (longest) response forms the merged body.
    pub base_worker: String,
}

/// Result of an expert merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpertPick {
    pub expert: String,
    pub score: f64,
}

/// Strategy-specific payload of a merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MergeOutcome {
    None,
    Single {
        worker_name: String,
    },
    Democratic(ConsensusSummary),
    Expert(ExpertPick),
    Balanced {
        expert: ExpertPick,
        consensus: ConsensusSummary,
    },
}

impl MergeOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Single { .. } => "single",
            Self::Democratic(_) => "democratic",
            Self::Expert(_) => "expert",
            Self::Balanced { .. } => "balanced",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeResult {
    pub content: String,
    pub sources: Vec<WorkerResponse>,
    pub outcome: MergeOutcome,
}

impl MergeResult {
    pub fn strategy_used(&self) -> &'static str {
        self.outcome.kind()
    }
}

// =============================================================================
// Complexity
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyTier {
    Simple,
    Medium,
    Complex,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplexityReport {
    pub score: u8,
    pub round_count: usize,
    pub tier: DifficultyTier,
}

// =============================================================================
// Refinement
// =============================================================================

/// How many rounds a refinement run should plan for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "rounds", rename_all = "snake_case")]
pub enum RoundPlan {
    Fixed(usize),
    Adaptive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementRound {
    pub round_index: usize,
    pub purpose: String,
    pub prompt_used: String,
    pub responses: Vec<WorkerResponse>,
    pub merged: MergeResult,
    pub extracted_artifact: String,
    /// Gate score; `None` for the final round, which is never gated.
    pub quality_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementOutcome {
    pub final_artifact: String,
    pub total_rounds_executed: usize,
    pub planned_rounds: usize,
    pub round_history: Vec<String>,
    pub rounds: Vec<RefinementRound>,
    pub terminated_early: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complexity: Option<ComplexityReport>,
}

// =============================================================================
// Parallel Tracks
// =============================================================================

/// Static description of a track: which workers it uses and what it optimizes for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackSpec {
    pub name: String,
    pub focus: String,
    pub workers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackRound {
    pub round_index: usize,
    pub prompt_used: String,
    pub merged: MergeResult,
    pub extracted_artifact: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackOutcome {
    pub track_name: String,
    pub focus: String,
    pub assigned_workers: Vec<String>,
    pub history: Vec<TrackRound>,
    pub final_artifact: String,
}

// =============================================================================
// Conversation Output
// =============================================================================

/// Rendered message handed to the conversation UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationEntry {
    pub title: String,
    pub body: String,
    pub strategy: String,
    pub round_history: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_artifact: Option<String>,
    pub created_at: jiff::Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_outcome_serializes_with_kind_tag() {
        let outcome = MergeOutcome::Expert(ExpertPick {
            expert: "Qwen".to_string(),
            score: 3.5,
        });
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["kind"], "expert");
        assert_eq!(json["expert"], "Qwen");
        assert_eq!(json["score"], 3.5);

        let json = serde_json::to_value(MergeOutcome::None).unwrap();
        assert_eq!(json["kind"], "none");

        let json = serde_json::to_value(MergeOutcome::Single {
            worker_name: "Claude".to_string(),
        })
        .unwrap();
        assert_eq!(json["kind"], "single");
        assert_eq!(json["worker_name"], "Claude");
    }

    #[test]
    fn balanced_outcome_carries_both_payloads() {
        let outcome = MergeOutcome::Balanced {
            expert: ExpertPick {
                expert: "Claude".to_string(),
                score: 1.2,
            },
            consensus: ConsensusSummary {
                common_phrases: vec!["fix the bug".to_string()],
                agreement: AgreementLevel::Low,
                base_worker: "Qwen".to_string(),
            },
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["kind"], "balanced");
        assert_eq!(json["expert"]["expert"], "Claude");
        assert_eq!(json["consensus"]["agreement"], "low");
        assert_eq!(outcome.kind(), "balanced");
    }

    #[test]
    fn strategy_names_parse_with_balanced_fallback() {
        assert_eq!(MergeStrategy::from_name("democratic"), MergeStrategy::Democratic);
        assert_eq!(MergeStrategy::from_name("Expert"), MergeStrategy::Expert);
        assert_eq!(MergeStrategy::from_name("balanced"), MergeStrategy::Balanced);
        assert_eq!(MergeStrategy::from_name("weighted-vote"), MergeStrategy::Balanced);
        assert_eq!(MergeStrategy::from_name(""), MergeStrategy::Balanced);
    }

    #[test]
    fn agreement_thresholds() {
        assert_eq!(AgreementLevel::from_common_count(0), AgreementLevel::Low);
        assert_eq!(AgreementLevel::from_common_count(2), AgreementLevel::Low);
        assert_eq!(AgreementLevel::from_common_count(3), AgreementLevel::Medium);
        assert_eq!(AgreementLevel::from_common_count(5), AgreementLevel::Medium);
        assert_eq!(AgreementLevel::from_common_count(6), AgreementLevel::High);
    }

    #[test]
    fn round_plan_round_trips_through_serde() {
        let plan = RoundPlan::Fixed(5);
        let json = serde_json::to_string(&plan).unwrap();
        let back: RoundPlan = serde_json::from_str(&json).unwrap();
        assert_eq!(back, RoundPlan::Fixed(5));

        let json = serde_json::to_value(RoundPlan::Adaptive).unwrap();
        assert_eq!(json["type"], "adaptive");
    }

    #[test]
    fn classification_score_lookup_defaults_to_zero() {
        let classification = TaskClassification {
            primary_category: "debug".to_string(),
            scores: vec![CategoryScore {
                category: "debug".to_string(),
                score: 2,
            }],
            matched_categories: vec!["debug".to_string()],
        };
        assert_eq!(classification.score_of("debug"), 2);
        assert_eq!(classification.score_of("refactor"), 0);
    }

    #[test]
    fn context_file_deserializes_from_editor_json() {
        let json = r#"{"path": "/main.js", "content": "console.log(1);"}"#;
        let file: ContextFile = serde_json::from_str(json).unwrap();
        assert_eq!(file, ContextFile::new("/main.js", "console.log(1);"));
    }
}
