// ABOUTME: Iterative auto-fix loop that routes syntax problems to the best-performing specialist worker.
// ABOUTME: Tracks per-error-type success rates so later fixes prefer workers that have worked before.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::orchestrator::extract::first_fenced_block;
use crate::orchestrator::pool::WorkerPool;

use super::syntax::{SyntaxChecker, SyntaxIssue, SyntaxReport};

const MAX_ATTEMPTS: usize = 3;
const MAX_ISSUES_IN_PROMPT: usize = 5;
const FALLBACK_WORKER: &str = "GPT-4o";
const INITIAL_SUCCESS_RATE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    Syntax,
    Type,
    Logic,
    Performance,
    Style,
    Security,
}

impl ErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Syntax => "syntax",
            Self::Type => "type",
            Self::Logic => "logic",
            Self::Performance => "performance",
            Self::Style => "style",
            Self::Security => "security",
        }
    }
}

/// Map an issue to the error family used for specialist routing. Defaults to logic.
pub fn classify_issue(issue: &SyntaxIssue) -> ErrorType {
    let kind = issue.kind.as_str();
    let message = issue.message.to_lowercase();

    if kind == "syntax" || message.contains("syntax") || message.contains("unexpected") {
        ErrorType::Syntax
    } else if kind == "typescript"
        || message.contains("type")
        || message.contains("is not assignable")
    {
        ErrorType::Type
    } else if kind == "runtime"
        || message.contains("undefined")
        || message.contains("is not a function")
    {
        ErrorType::Logic
    } else if message.contains("performance") || message.contains("slow") {
        ErrorType::Performance
    } else if kind == "eslint" || message.contains("unused") || message.contains("semicolon") {
        ErrorType::Style
    } else if message.contains("security") || message.contains("vulnerability") {
        ErrorType::Security
    } else {
        ErrorType::Logic
    }
}

// =============================================================================
// Learning Statistics
// =============================================================================

/// A worker that fixes one family of errors, with its running track record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixSpecialist {
    pub worker: String,
    pub specialties: Vec<String>,
    pub attempts: u32,
    pub successes: u32,
}

impl FixSpecialist {
    fn new(worker: &str, specialties: &[&str]) -> Self {
        Self {
            worker: worker.to_string(),
            specialties: specialties.iter().map(|s| s.to_string()).collect(),
            attempts: 0,
            successes: 0,
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.attempts == 0 {
            INITIAL_SUCCESS_RATE
        } else {
            self.successes as f64 / self.attempts as f64
        }
    }

    pub fn handles(&self, error_type: ErrorType) -> bool {
        self.specialties.iter().any(|s| s == error_type.as_str())
    }

    fn record(&mut self, success: bool) {
        self.attempts += 1;
        if success {
            self.successes += 1;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecialistStats {
    pub error_type: ErrorType,
    pub worker: String,
    pub success_rate: f64,
    pub attempts: u32,
    pub successes: u32,
}

fn default_specialists() -> BTreeMap<ErrorType, FixSpecialist> {
    BTreeMap::from([
        (ErrorType::Syntax, FixSpecialist::new("Qwen", &["syntax"])),
        (ErrorType::Type, FixSpecialist::new("GPT-4o", &["type", "typescript"])),
        (ErrorType::Logic, FixSpecialist::new("DeepSeek", &["logic", "runtime"])),
        (
            ErrorType::Performance,
            FixSpecialist::new("DeepSeek", &["performance", "optimize"]),
        ),
        (ErrorType::Style, FixSpecialist::new("Qwen", &["style", "formatting"])),
        (
            ErrorType::Security,
            FixSpecialist::new("Qwen", &["security", "vulnerability"]),
        ),
    ])
}

// =============================================================================
// Pipeline
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixAttempt {
    pub attempt: usize,
    pub code: String,
    pub report: SyntaxReport,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixOutcome {
    pub success: bool,
    pub code: String,
    pub attempts: usize,
    pub history: Vec<FixAttempt>,
    pub remaining_issues: Vec<SyntaxIssue>,
    pub message: String,
}

pub struct AutoFixPipeline {
    pool: Arc<WorkerPool>,
    checker: SyntaxChecker,
    specialists: Mutex<BTreeMap<ErrorType, FixSpecialist>>,
}

impl AutoFixPipeline {
    pub fn new(pool: Arc<WorkerPool>) -> Self {
        Self {
            pool,
            checker: SyntaxChecker::new(),
            specialists: Mutex::new(default_specialists()),
        }
    }

    /// Check `code` and ask specialists to repair it until it passes or attempts run out.
    ///
    /// Never fails: a backend error ends the loop with the best code so far.
    pub async fn run(&self, initial_code: &str) -> FixOutcome {
        let mut code = initial_code.to_string();
        let mut history = Vec::new();
        let mut attempts = 0;

        while attempts < MAX_ATTEMPTS {
            attempts += 1;
            let report = self.checker.check(&code);
            history.push(FixAttempt {
                attempt: attempts,
                code: code.clone(),
                report: report.clone(),
            });

            if report.is_valid {
                log::info!("[AutoFix] Code valid after {} attempt(s)", attempts);
                return FixOutcome {
                    success: true,
                    code,
                    attempts,
                    history,
                    remaining_issues: Vec::new(),
                    message: format!("Code fixed in {} attempt(s)", attempts),
                };
            }

            if attempts >= MAX_ATTEMPTS {
                return FixOutcome {
                    success: false,
                    code,
                    attempts,
                    history,
                    remaining_issues: report.issues,
                    message: format!("Could not fix all errors after {} attempts", MAX_ATTEMPTS),
                };
            }

            let Some(primary) = report.issues.first() else {
                break;
            };
            let error_type = classify_issue(primary);
            let worker = self.select_worker(error_type).await;
            let issues = &report.issues[..report.issues.len().min(MAX_ISSUES_IN_PROMPT)];
            let prompt = fix_prompt(&code, issues);

            log::debug!(
                "[AutoFix] Attempt {}: routing {} error to {}",
                attempts,
                error_type.as_str(),
                worker
            );

            let responses = self.pool.dispatch(&prompt, &[worker.clone()], &[]).await;
            let reply = match responses.into_iter().next() {
                Some(response) if response.succeeded => response.content,
                _ => {
                    log::warn!("[AutoFix] {} could not provide a fix, stopping", worker);
                    break;
                }
            };

            code = extract_fixed_code(&reply);
            let fixed = self.checker.check(&code).is_valid;
            self.record(error_type, fixed).await;
        }

        let remaining_issues = self.checker.check(&code).issues;
        FixOutcome {
            success: false,
            code,
            attempts,
            history,
            remaining_issues,
            message: format!("Could not achieve valid code after {} attempt(s)", attempts),
        }
    }

    /// Specialist with the best success rate for `error_type`, else the fallback worker.
    async fn select_worker(&self, error_type: ErrorType) -> String {
        let specialists = self.specialists.lock().await;
        let mut best: Option<&FixSpecialist> = None;
        for candidate in specialists.values().filter(|s| s.handles(error_type)) {
            if best.is_none_or(|b| candidate.success_rate() > b.success_rate()) {
                best = Some(candidate);
            }
        }
        best.map(|s| s.worker.clone())
            .unwrap_or_else(|| FALLBACK_WORKER.to_string())
    }

    async fn record(&self, error_type: ErrorType, success: bool) {
        let mut specialists = self.specialists.lock().await;
        if let Some(specialist) = specialists.get_mut(&error_type) {
            specialist.record(success);
        }
    }

    pub async fn statistics(&self) -> Vec<SpecialistStats> {
        self.specialists
            .lock()
            .await
            .iter()
            .map(|(error_type, s)| SpecialistStats {
                error_type: *error_type,
                worker: s.worker.clone(),
                success_rate: s.success_rate(),
                attempts: s.attempts,
                successes: s.successes,
            })
            .collect()
    }

    pub async fn reset_statistics(&self) {
        *self.specialists.lock().await = default_specialists();
        log::info!("[AutoFix] Statistics reset");
    }
}

fn fix_prompt(code: &str, issues: &[SyntaxIssue]) -> String {
    let described: Vec<String> = issues
        .iter()
        .map(|i| format!("- {}: {}", i.kind, i.message))
        .collect();
    format!(
        "Fix the following errors in this code:\n\n{}\n\nOriginal code:\n```javascript\n{}\n```\n\n\
         Return ONLY the fixed code in a code block, with no explanation.",
        described.join("\n"),
        code
    )
}

fn extract_fixed_code(reply: &str) -> String {
    first_fenced_block(reply)
        .unwrap_or(reply)
        .trim()
        .to_string()
}
