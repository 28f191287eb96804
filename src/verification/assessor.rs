// ABOUTME: Multi-dimension code quality assessment: readability, performance, security, best practices.
// ABOUTME: Each dimension asks a named worker for a JSON score and falls back to a local heuristic.

use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::orchestrator::extract::truncate_chars;
use crate::orchestrator::pool::WorkerPool;

lazy_static::lazy_static! {
    static ref CAMEL_BOUNDARY: Regex = Regex::new(r"[a-z][A-Z]").expect("camel regex is valid");
    static ref NESTED_LOOP: Regex = Regex::new(r"for.*for|while.*while").expect("loop regex is valid");
    static ref METHOD_CALL: Regex = Regex::new(r"\.\w+\(").expect("call regex is valid");
    static ref SENSITIVE_LOG: Regex =
        Regex::new(r"(?i)console\.log.*(password|token|secret)").expect("log regex is valid");
    static ref FUNCTION_DECL: Regex =
        Regex::new(r"(?:function|const|let|var)\s+\w+\s*=?\s*(?:function)?\s*\(")
            .expect("function regex is valid");
}

/// Characters of code included in each worker prompt.
const PROMPT_CODE_CHARS: usize = 1000;
/// Score assumed when a worker returns JSON without a score.
const DEFAULT_WORKER_SCORE: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityDimension {
    Readability,
    Performance,
    Security,
    BestPractices,
}

impl QualityDimension {
    pub const ALL: [QualityDimension; 4] = [
        Self::Readability,
        Self::Performance,
        Self::Security,
        Self::BestPractices,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Readability => "Readability",
            Self::Performance => "Performance",
            Self::Security => "Security",
            Self::BestPractices => "Best Practices",
        }
    }

    fn default_worker(&self) -> &'static str {
        match self {
            Self::Readability => "GPT-4o",
            Self::Performance => "DeepSeek",
            Self::Security => "Qwen",
            Self::BestPractices => "Gemini",
        }
    }

    fn criteria(&self) -> &'static str {
        match self {
            Self::Readability => {
                "- Naming clarity\n- Organization and structure\n- Comments\n- Complexity"
            }
            Self::Performance => {
                "- Algorithmic efficiency\n- Memory usage\n- Unnecessary loops\n- DOM manipulation cost"
            }
            Self::Security => {
                "- Input validation\n- Injection risks\n- XSS\n- eval() usage\n- Exposed secrets"
            }
            Self::BestPractices => {
                "- DRY\n- SOLID\n- Error handling\n- Async usage\n- Testability\n- Modularity"
            }
        }
    }
}

/// Where a dimension score came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "worker", rename_all = "snake_case")]
pub enum ScoreSource {
    Worker(String),
    Heuristic,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionScore {
    pub dimension: QualityDimension,
    pub score: f64,
    pub source: ScoreSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
}

impl DimensionScore {
    fn heuristic(dimension: QualityDimension, score: f64) -> Self {
        Self {
            dimension,
            score: score.clamp(0.0, 10.0),
            source: ScoreSource::Heuristic,
            reason: None,
            issues: Vec::new(),
            suggestions: Vec::new(),
        }
    }

    fn flag(&mut self, penalty: f64, issue: &str, suggestion: &str) {
        self.score = (self.score - penalty).clamp(0.0, 10.0);
        self.issues.push(issue.to_string());
        self.suggestions.push(suggestion.to_string());
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityAssessment {
    /// Mean of the four dimensions, rounded to one decimal.
    pub aggregate: f64,
    pub rating: String,
    pub breakdown: Vec<DimensionScore>,
    pub code_length: usize,
    pub assessed_at: jiff::Timestamp,
}

impl QualityAssessment {
    pub fn dimension(&self, dimension: QualityDimension) -> Option<&DimensionScore> {
        self.breakdown.iter().find(|d| d.dimension == dimension)
    }

    /// Plain-text summary for the conversation view.
    pub fn report(&self) -> String {
        let mut out = format!(
            "Code Quality: {:.1}/10 ({})\n\nBreakdown:\n",
            self.aggregate, self.rating
        );
        for dim in &self.breakdown {
            out.push_str(&format!("- {}: {:.1}/10", dim.dimension.label(), dim.score));
            if let Some(reason) = &dim.reason {
                out.push_str(&format!(" ({})", reason));
            }
            out.push('\n');
            for issue in dim.issues.iter().take(2) {
                out.push_str(&format!("  * {}\n", issue));
            }
        }

        let suggestions: Vec<&String> = self
            .breakdown
            .iter()
            .filter_map(|d| d.suggestions.first())
            .collect();
        if !suggestions.is_empty() {
            out.push_str("\nTop Suggestions:\n");
            for suggestion in suggestions {
                out.push_str(&format!("- {}\n", suggestion));
            }
        }
        out
    }
}

pub fn rating_for(score: f64) -> &'static str {
    if score >= 9.0 {
        "Excellent"
    } else if score >= 8.0 {
        "Very Good"
    } else if score >= 7.0 {
        "Good"
    } else if score >= 6.0 {
        "Fair"
    } else if score >= 5.0 {
        "Acceptable"
    } else {
        "Needs Improvement"
    }
}

/// JSON a worker is asked to return. Dimension-specific list names are accepted as aliases.
#[derive(Debug, Deserialize)]
struct WorkerScore {
    score: Option<f64>,
    reason: Option<String>,
    #[serde(default, alias = "vulnerabilities")]
    issues: Vec<String>,
    #[serde(default, alias = "recommendations", alias = "improvements")]
    suggestions: Vec<String>,
}

// =============================================================================
// Assessor
// =============================================================================

pub struct QualityAssessor {
    pool: Arc<WorkerPool>,
}

impl QualityAssessor {
    pub fn new(pool: Arc<WorkerPool>) -> Self {
        Self { pool }
    }

    pub async fn assess(&self, code: &str) -> QualityAssessment {
        let (readability, performance, security, best_practices) = tokio::join!(
            self.evaluate(QualityDimension::Readability, code),
            self.evaluate(QualityDimension::Performance, code),
            self.evaluate(QualityDimension::Security, code),
            self.evaluate(QualityDimension::BestPractices, code),
        );
        let breakdown = vec![readability, performance, security, best_practices];

        let mean = breakdown.iter().map(|d| d.score).sum::<f64>() / breakdown.len() as f64;
        let aggregate = (mean * 10.0).round() / 10.0;

        log::info!(
            "[Quality] Assessed {} chars: {:.1}/10 ({})",
            code.len(),
            aggregate,
            rating_for(aggregate)
        );

        QualityAssessment {
            aggregate,
            rating: rating_for(aggregate).to_string(),
            breakdown,
            code_length: code.chars().count(),
            assessed_at: jiff::Timestamp::now(),
        }
    }

    async fn evaluate(&self, dimension: QualityDimension, code: &str) -> DimensionScore {
        let worker = dimension.default_worker();
        let prompt = format!(
            "Rate this code's {} on a scale of 1-10. Consider:\n{}\n\nCode:\n```javascript\n{}\n```\n\n\
             Respond with ONLY a JSON object: {{\"score\": <number>, \"reason\": \"<brief>\", \"issues\": [], \"suggestions\": []}}",
            dimension.label().to_lowercase(),
            dimension.criteria(),
            truncate_chars(code, PROMPT_CODE_CHARS)
        );

        let responses = self
            .pool
            .dispatch(&prompt, &[worker.to_string()], &[])
            .await;

        match responses.into_iter().next() {
            Some(response) if response.succeeded => {
                match parse_worker_score(&response.content) {
                    Some(parsed) => DimensionScore {
                        dimension,
                        score: parsed.score.unwrap_or(DEFAULT_WORKER_SCORE).clamp(0.0, 10.0),
                        source: ScoreSource::Worker(worker.to_string()),
                        reason: parsed.reason,
                        issues: parsed.issues,
                        suggestions: parsed.suggestions,
                    },
                    None => {
                        log::debug!(
                            "[Quality] {} reply from {} was not JSON, using heuristic",
                            dimension.label(),
                            worker
                        );
                        estimate(dimension, code)
                    }
                }
            }
            _ => {
                log::warn!(
                    "[Quality] {} evaluation by {} failed, using heuristic",
                    dimension.label(),
                    worker
                );
                estimate(dimension, code)
            }
        }
    }
}

/// Outermost `{...}` span of a reply parsed as a worker score.
fn parse_worker_score(content: &str) -> Option<WorkerScore> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&content[start..=end]).ok()
}

// =============================================================================
// Heuristics
// =============================================================================

pub fn estimate(dimension: QualityDimension, code: &str) -> DimensionScore {
    match dimension {
        QualityDimension::Readability => estimate_readability(code),
        QualityDimension::Performance => estimate_performance(code),
        QualityDimension::Security => estimate_security(code),
        QualityDimension::BestPractices => estimate_best_practices(code),
    }
}

fn estimate_readability(code: &str) -> DimensionScore {
    let mut score: f64 = 7.0;
    let length = code.chars().count();
    if length > 2000 {
        score -= 1.0;
    }
    if length < 200 {
        score += 1.0;
    }

    let lines = code.split('\n').count().max(1);
    let comment_ratio = code.matches("//").count() as f64 / lines as f64;
    if comment_ratio < 0.05 {
        score -= 1.0;
    }
    if comment_ratio > 0.15 {
        score += 0.5;
    }

    let tokens = code.split_whitespace().count().max(1);
    let camel_ratio = CAMEL_BOUNDARY.find_iter(code).count() as f64 / tokens as f64;
    if camel_ratio > 0.1 {
        score += 0.5;
    }

    let mut result = DimensionScore::heuristic(QualityDimension::Readability, score);
    result.reason = Some("Heuristic estimation based on code structure".to_string());
    result
}

fn estimate_performance(code: &str) -> DimensionScore {
    let mut result = DimensionScore::heuristic(QualityDimension::Performance, 7.0);
    if NESTED_LOOP.is_match(code) {
        result.flag(
            2.0,
            "Nested loops detected, potential quadratic complexity",
            "Flatten loops or use a more efficient algorithm",
        );
    }
    if METHOD_CALL.find_iter(code).count() > 10 {
        result.flag(
            1.0,
            "Many method calls, consider caching results",
            "Cache repeated computations",
        );
    }
    result
}

fn estimate_security(code: &str) -> DimensionScore {
    let mut result = DimensionScore::heuristic(QualityDimension::Security, 8.0);
    if code.contains("eval(") {
        result.flag(3.0, "eval() detected", "Avoid eval(); use safer alternatives");
    }
    if code.contains("innerHTML") {
        result.flag(
            1.0,
            "innerHTML usage, potential XSS",
            "Use textContent or DOM APIs instead",
        );
    }
    if SENSITIVE_LOG.is_match(code) {
        result.flag(
            2.0,
            "Potential sensitive data exposure in logs",
            "Remove sensitive data from console output",
        );
    }
    result
}

fn estimate_best_practices(code: &str) -> DimensionScore {
    let mut result = DimensionScore::heuristic(QualityDimension::BestPractices, 7.0);
    if code.contains(" var ") {
        result.flag(1.0, "var keyword usage", "Replace var with const or let");
    }
    if !code.contains("try") && !code.contains("catch") {
        result.flag(1.0, "No error handling detected", "Add try/catch around fallible calls");
    }
    let functions = FUNCTION_DECL.find_iter(code).count();
    if functions > 0 && code.chars().count() as f64 / functions as f64 > 500.0 {
        result.flag(
            1.0,
            "Functions are large",
            "Break large functions into smaller ones",
        );
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnsembleConfig;
    use crate::orchestrator::types::BackendError;
    use crate::orchestrator::worker::{ScriptedBackend, SimulatedBackend, WorkerBackend};

    fn assessor_with(backend: impl WorkerBackend + 'static) -> QualityAssessor {
        let pool = WorkerPool::from_config(&EnsembleConfig::default(), Arc::new(backend)).unwrap();
        QualityAssessor::new(Arc::new(pool))
    }

    #[tokio::test]
    async fn worker_scores_are_used_and_clamped() {
        let backend = ScriptedBackend::new(|worker, _| match worker.display_name.as_str() {
            "GPT-4o" => Ok(r#"Sure: {"score": 9, "reason": "clear naming"}"#.to_string()),
            "Qwen" => Ok(r#"{"score": 15, "vulnerabilities": ["none really"]}"#.to_string()),
            "DeepSeek" => Ok("I think it is fine.".to_string()),
            _ => Err(BackendError::Unavailable("down".to_string())),
        });
        let code = "const total = items.length;";
        let assessment = assessor_with(backend).assess(code).await;

        let readability = assessment.dimension(QualityDimension::Readability).unwrap();
        assert_eq!(readability.score, 9.0);
        assert_eq!(readability.source, ScoreSource::Worker("GPT-4o".to_string()));
        assert_eq!(readability.reason.as_deref(), Some("clear naming"));

        let security = assessment.dimension(QualityDimension::Security).unwrap();
        assert_eq!(security.score, 10.0);
        assert_eq!(security.issues, vec!["none really"]);

        let performance = assessment.dimension(QualityDimension::Performance).unwrap();
        assert_eq!(performance.source, ScoreSource::Heuristic);
        assert_eq!(performance.score, 7.0);

        let best = assessment.dimension(QualityDimension::BestPractices).unwrap();
        assert_eq!(best.source, ScoreSource::Heuristic);
        // No try/catch: 7 - 1.
        assert_eq!(best.score, 6.0);

        // (9 + 7 + 10 + 6) / 4 = 8.0
        assert_eq!(assessment.aggregate, 8.0);
        assert_eq!(assessment.rating, "Very Good");
    }

    #[tokio::test]
    async fn missing_score_field_defaults_to_five() {
        let backend = ScriptedBackend::constant(r#"{"reason": "unsure"}"#);
        let assessment = assessor_with(backend).assess("let a = 1;").await;
        assert!(assessment.breakdown.iter().all(|d| d.score == 5.0));
        assert_eq!(assessment.rating, "Acceptable");
    }

    #[tokio::test]
    async fn simulated_code_replies_fall_back_to_heuristics() {
        let assessment = assessor_with(SimulatedBackend::instant())
            .assess("function f() { return 1; }")
            .await;
        assert_eq!(assessment.breakdown.len(), 4);
        assert!(assessment
            .breakdown
            .iter()
            .all(|d| d.source == ScoreSource::Heuristic));
        assert!(assessment.report().starts_with("Code Quality:"));
    }

    #[test]
    fn security_heuristic_penalizes_dangerous_calls() {
        let code = "eval(input);\nel.innerHTML = html;\nconsole.log('token', token);";
        let score = estimate(QualityDimension::Security, code);
        assert_eq!(score.score, 2.0);
        assert_eq!(score.issues.len(), 3);
    }

    #[test]
    fn performance_heuristic_flags_nested_loops() {
        let code = "for (const a of xs) for (const b of ys) total += a * b;";
        let score = estimate(QualityDimension::Performance, code);
        assert_eq!(score.score, 5.0);
    }

    #[test]
    fn readability_heuristic_rewards_short_commented_code() {
        let code = "// sum\nfunction addNumbers(firstValue, b) {\n  return firstValue + b;\n}";
        // +1 short, comment ratio 0.25 gives +0.5, camel ratio 3/11 gives +0.5.
        let score = estimate(QualityDimension::Readability, code);
        assert_eq!(score.score, 9.0);
    }

    #[test]
    fn best_practices_heuristic_flags_var_and_missing_error_handling() {
        let code = "function f() { var x = 1; return x; }";
        let score = estimate(QualityDimension::BestPractices, code);
        assert_eq!(score.score, 5.0);
    }

    #[test]
    fn rating_bands() {
        assert_eq!(rating_for(9.0), "Excellent");
        assert_eq!(rating_for(8.5), "Very Good");
        assert_eq!(rating_for(7.0), "Good");
        assert_eq!(rating_for(6.2), "Fair");
        assert_eq!(rating_for(5.0), "Acceptable");
        assert_eq!(rating_for(4.9), "Needs Improvement");
    }

    #[test]
    fn report_lists_dimensions_and_suggestions() {
        let assessment = QualityAssessment {
            aggregate: 6.5,
            rating: rating_for(6.5).to_string(),
            breakdown: QualityDimension::ALL
                .iter()
                .map(|d| estimate(*d, "eval(x)"))
                .collect(),
            code_length: 7,
            assessed_at: jiff::Timestamp::UNIX_EPOCH,
        };
        let report = assessment.report();
        assert!(report.contains("Code Quality: 6.5/10 (Fair)"));
        assert!(report.contains("- Best Practices:"));
        assert!(report.contains("Top Suggestions:"));
        assert!(report.contains("Avoid eval()"));
    }
}
