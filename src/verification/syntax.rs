// ABOUTME: Static syntax checks for generated JavaScript-like code.
// ABOUTME: Detects unbalanced brackets, dangling final statements and common keyword typos.

use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static::lazy_static! {
    static ref KEYWORD_TYPOS: Vec<(&'static str, &'static str, Regex)> = [
        ("funciton", "function"),
        ("lte", "let"),
        ("vat", "var"),
        ("retrun", "return"),
        ("whlie", "while"),
        ("elif", "else if"),
    ]
    .into_iter()
    .map(|(typo, correct)| {
        let re = Regex::new(&format!(r"\b{}\b", typo)).expect("typo regex is valid");
        (typo, correct, re)
    })
    .collect();
}

const UNMATCHED_BRACKETS: &str = "Unmatched brackets detected";
const INCOMPLETE_STATEMENT: &str = "Incomplete statement detected";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyntaxIssue {
    /// Error family, e.g. "syntax". Used by the auto-fix classifier.
    pub kind: String,
    pub message: String,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occurrences: Option<usize>,
}

impl SyntaxIssue {
    fn syntax(message: impl Into<String>, severity: Severity) -> Self {
        Self {
            kind: "syntax".to_string(),
            message: message.into(),
            severity,
            occurrences: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntaxReport {
    /// False only when at least one error-severity issue exists.
    pub is_valid: bool,
    pub issues: Vec<SyntaxIssue>,
    pub checked_at: jiff::Timestamp,
}

impl SyntaxReport {
    pub fn errors(&self) -> impl Iterator<Item = &SyntaxIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SyntaxChecker;

impl SyntaxChecker {
    pub fn new() -> Self {
        Self
    }

    pub fn check(&self, code: &str) -> SyntaxReport {
        let mut issues = Vec::new();

        if !brackets_balanced(code) {
            issues.push(SyntaxIssue::syntax(UNMATCHED_BRACKETS, Severity::Error));
        }

        if has_incomplete_statement(code) {
            issues.push(SyntaxIssue::syntax(INCOMPLETE_STATEMENT, Severity::Warning));
        }

        for (typo, correct, re) in KEYWORD_TYPOS.iter() {
            let count = re.find_iter(code).count();
            if count > 0 {
                issues.push(SyntaxIssue {
                    occurrences: Some(count),
                    ..SyntaxIssue::syntax(
                        format!("Possible keyword typo: \"{}\" should be \"{}\"", typo, correct),
                        Severity::Warning,
                    )
                });
            }
        }

        let is_valid = !issues.iter().any(|i| i.severity == Severity::Error);
        log::debug!(
            "[Syntax] Checked {} chars: valid={} issues={}",
            code.len(),
            is_valid,
            issues.len()
        );

        SyntaxReport {
            is_valid,
            issues,
            checked_at: jiff::Timestamp::now(),
        }
    }
}

/// Whether `()`, `[]` and `{}` nest correctly, ignoring string literals and comments.
pub fn brackets_balanced(code: &str) -> bool {
    let chars: Vec<char> = code.chars().collect();
    let mut stack = Vec::new();
    let mut in_string: Option<char> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if let Some(quote) = in_string {
            if c == '\\' {
                i += 2;
                continue;
            }
            if c == quote {
                in_string = None;
            }
            i += 1;
            continue;
        }

        match c {
            '"' | '\'' | '`' => in_string = Some(c),
            '/' if chars.get(i + 1) == Some(&'/') => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
                continue;
            }
            '/' if chars.get(i + 1) == Some(&'*') => {
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    i += 1;
                }
                i += 2;
                continue;
            }
            '(' | '[' | '{' => stack.push(c),
            ')' | ']' | '}' => {
                let open = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                if stack.pop() != Some(open) {
                    return false;
                }
            }
            _ => {}
        }
        i += 1;
    }

    stack.is_empty()
}

/// Last non-empty line ends mid-expression: an operator, comma, open brace or a dangling dot.
pub fn has_incomplete_statement(code: &str) -> bool {
    let Some(last) = code.lines().map(str::trim).rfind(|l| !l.is_empty()) else {
        return false;
    };

    if last.ends_with("*/") || last.ends_with("++") || last.ends_with("--") {
        return false;
    }

    last.ends_with([',', '{', '\\', '|', '&', '+', '-', '*', '/', '.'])
}
