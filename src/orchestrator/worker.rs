// ABOUTME: WorkerBackend trait that every prompt transport implements, plus the built-in backends.
// ABOUTME: SimulatedBackend fakes latency for demos; ScriptedBackend gives tests deterministic replies.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use super::extract::truncate_chars;
use super::types::{BackendError, BackendReply, PromptRequest, Worker};

/// The single contract between the pool and whatever answers prompts.
///
/// A backend may be a simulated delay, an HTTP call to a model API, or a local
/// stub. Errors never escape the pool; they become failed responses.
#[async_trait]
pub trait WorkerBackend: Send + Sync {
    async fn send_prompt(
        &self,
        worker: &Worker,
        request: &PromptRequest,
    ) -> Result<BackendReply, BackendError>;
}

// =============================================================================
// Simulated Backend
// =============================================================================

/// Offline backend producing a specialty-flavoured reply after a jittered delay.
///
/// Content depends only on the worker and the prompt; randomness affects timing.
#[derive(Debug, Clone)]
pub struct SimulatedBackend {
    base_latency: Duration,
    failure_rate: f64,
}

impl SimulatedBackend {
    pub fn new(base_latency: Duration) -> Self {
        Self {
            base_latency,
            failure_rate: 0.0,
        }
    }

    /// Fraction of calls, in [0, 1], that fail with `BackendError::Unavailable`.
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// No delay at all. Handy for tests and benchmarks.
    pub fn instant() -> Self {
        Self::new(Duration::ZERO)
    }

    fn delay_for(&self, worker: &Worker) -> Duration {
        if self.base_latency.is_zero() {
            return Duration::ZERO;
        }
        let jitter: f64 = rand::random_range(0.5..1.5);
        self.base_latency
            .mul_f64((worker.latency_factor * jitter).max(0.0))
    }

    fn render_reply(worker: &Worker, request: &PromptRequest) -> String {
        let topic = truncate_chars(request.prompt.lines().next().unwrap_or("").trim(), 80);
        let ident = topic_identifier(topic);
        let context_note = if request.context_files.is_empty() {
            String::new()
        } else {
            let paths: Vec<&str> = request
                .context_files
                .iter()
                .map(|f| f.path.as_str())
                .collect();
            format!("\nContext reviewed: {}.", paths.join(", "))
        };

        let (approach, body) = match worker.specialty.as_str() {
            "debug" => (
                "I traced the failure path and guarded the inputs that trigger it.",
                format!(
                    "function {ident}(input) {{\n  // Guard against missing input before use\n  if (input == null) {{\n    throw new Error('input is required');\n  }}\n  return input;\n}}"
                ),
            ),
            "optimize" => (
                "I removed redundant work and cached the repeated lookup.",
                format!(
                    "const cache = new Map();\n\nfunction {ident}(key, compute) {{\n  // Reuse previously computed results\n  if (!cache.has(key)) {{\n    cache.set(key, compute(key));\n  }}\n  return cache.get(key);\n}}"
                ),
            ),
            "refactor" => (
                "I split the logic into small named steps with clear responsibilities.",
                format!(
                    "function validate(input) {{\n  return input != null;\n}}\n\nfunction {ident}(input) {{\n  // Each step has a single responsibility\n  if (!validate(input)) {{\n    return null;\n  }}\n  return input;\n}}"
                ),
            ),
            "architecture" => (
                "I separated the interface from the implementation so modules stay replaceable.",
                format!(
                    "class {ident}Service {{\n  // Dependencies are injected, not constructed here\n  constructor(store) {{\n    this.store = store;\n  }}\n\n  handle(request) {{\n    return this.store.save(request);\n  }}\n}}"
                ),
            ),
            "explain" => (
                "I annotated each step so the intent is explicit.",
                format!(
                    "// {ident}: returns the input unchanged after validation\nfunction {ident}(input) {{\n  // Validation happens first\n  return input;\n}}"
                ),
            ),
            _ => (
                "I implemented the requested behaviour directly.",
                format!("function {ident}(input) {{\n  // Straightforward implementation\n  return input;\n}}"),
            ),
        };

        format!(
            "{name} ({specialty}) on \"{topic}\": {approach}{context_note}\n\n```javascript\n{body}\n```\n",
            name = worker.display_name,
            specialty = worker.specialty,
        )
    }
}

impl Default for SimulatedBackend {
    fn default() -> Self {
        Self::new(Duration::from_millis(400))
    }
}

#[async_trait]
impl WorkerBackend for SimulatedBackend {
    async fn send_prompt(
        &self,
        worker: &Worker,
        request: &PromptRequest,
    ) -> Result<BackendReply, BackendError> {
        let delay = self.delay_for(worker);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.failure_rate > 0.0 && rand::random_range(0.0..1.0) < self.failure_rate {
            return Err(BackendError::Unavailable(format!(
                "{} did not answer",
                worker.display_name
            )));
        }
        Ok(BackendReply::ok(Self::render_reply(worker, request)))
    }
}

/// camelCase identifier built from the first few words of a prompt.
fn topic_identifier(topic: &str) -> String {
    let mut ident = String::new();
    for word in topic
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .take(3)
    {
        let lower = word.to_ascii_lowercase();
        if ident.is_empty() {
            ident.push_str(&lower);
        } else {
            let mut chars = lower.chars();
            if let Some(first) = chars.next() {
                ident.push(first.to_ascii_uppercase());
                ident.extend(chars);
            }
        }
    }

    match ident.chars().next() {
        None => "solution".to_string(),
        Some(c) if c.is_ascii_digit() => format!("task{}", ident),
        Some(_) => ident,
    }
}

// =============================================================================
// Scripted Backend
// =============================================================================

type ScriptFn = dyn Fn(&Worker, &PromptRequest) -> Result<String, BackendError> + Send + Sync;

/// Backend whose replies come from a closure. Counts calls.
#[derive(Clone)]
pub struct ScriptedBackend {
    script: Arc<ScriptFn>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedBackend {
    pub fn new<F>(script: F) -> Self
    where
        F: Fn(&Worker, &PromptRequest) -> Result<String, BackendError> + Send + Sync + 'static,
    {
        Self {
            script: Arc::new(script),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Every worker answers with the same text.
    pub fn constant(reply: impl Into<String>) -> Self {
        let reply = reply.into();
        Self::new(move |_, _| Ok(reply.clone()))
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for ScriptedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedBackend")
            .field("calls", &self.call_count())
            .finish()
    }
}

#[async_trait]
impl WorkerBackend for ScriptedBackend {
    async fn send_prompt(
        &self,
        worker: &Worker,
        request: &PromptRequest,
    ) -> Result<BackendReply, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.script)(worker, request).map(BackendReply::ok)
    }
}
