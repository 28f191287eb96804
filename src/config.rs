// ABOUTME: Configuration for the ensemble: category keywords, worker roster, expert weights and tracks.
// ABOUTME: Loaded from JSON with serde defaults so a partial file overrides only what it names.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::orchestrator::types::{MergeStrategy, TrackSpec};

const CONFIG_DIR_NAME: &str = "agent-ensemble";
const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

// =============================================================================
// Sections
// =============================================================================

/// A task category and the keywords whose presence votes for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub name: String,
    pub keywords: Vec<String>,
}

/// A worker entry in the roster. The pool assigns ids at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSpec {
    pub name: String,
    pub specialty: String,
    #[serde(default)]
    pub covers: Vec<String>,
    #[serde(default = "default_latency_factor")]
    pub latency_factor: f64,
}

fn default_latency_factor() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplexityKeywords {
    pub complex: Vec<String>,
    pub medium: Vec<String>,
    pub simple: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefinementSettings {
    /// Quality score at or above which a refinement run stops before its last round.
    pub early_exit_threshold: f64,
    /// Worker count per round index (1-based); rounds past the end reuse the last entry.
    pub worker_budgets: Vec<usize>,
    /// Round count used when a caller asks for a fixed plan without a number.
    pub default_rounds: usize,
    /// Characters kept when a merged reply has no fenced block.
    pub artifact_prefix_chars: usize,
    pub strategy: MergeStrategy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    /// Base delay before a simulated reply, scaled by each worker's latency factor.
    pub base_latency_ms: u64,
}

// =============================================================================
// Root Config
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    /// Declared order matters: it breaks classification ties.
    pub categories: Vec<CategoryRule>,
    /// Category every generalist worker covers; earns a small selection bonus.
    pub generic_category: String,
    pub workers: Vec<WorkerSpec>,
    /// category -> worker name -> weight. Unlisted workers weigh 1.
    pub expert_weights: HashMap<String, HashMap<String, f64>>,
    pub complexity: ComplexityKeywords,
    pub tracks: Vec<TrackSpec>,
    pub refinement: RefinementSettings,
    pub simulation: SimulationSettings,
}

impl EnsembleConfig {
    /// Platform config location, e.g. `~/.config/agent-ensemble/config.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        log::info!("[Config] Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Load from an explicit path, else the platform path if it exists, else built-in defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }

        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => {
                log::debug!("[Config] No config file found, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.categories.is_empty() {
            return Err(ConfigError::Invalid("at least one category is required".into()));
        }
        if self.workers.is_empty() {
            return Err(ConfigError::Invalid("at least one worker is required".into()));
        }

        let mut names = HashSet::new();
        for worker in &self.workers {
            if !names.insert(worker.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate worker name '{}'",
                    worker.name
                )));
            }
            if worker.latency_factor < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "worker '{}' has a negative latency factor",
                    worker.name
                )));
            }
        }

        if self.tracks.len() != 3 {
            return Err(ConfigError::Invalid(format!(
                "exactly 3 tracks are required, found {}",
                self.tracks.len()
            )));
        }
        for track in &self.tracks {
            if track.workers.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "track '{}' has no workers",
                    track.name
                )));
            }
            if let Some(unknown) = track.workers.iter().find(|w| !names.contains(w.as_str())) {
                return Err(ConfigError::Invalid(format!(
                    "track '{}' references unknown worker '{}'",
                    track.name, unknown
                )));
            }
        }

        if self.refinement.worker_budgets.is_empty()
            || self.refinement.worker_budgets.contains(&0)
        {
            return Err(ConfigError::Invalid(
                "worker budgets must be non-empty and positive".into(),
            ));
        }

        Ok(())
    }
}

// =============================================================================
// Defaults
// =============================================================================

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn category(name: &str, keywords: &[&str]) -> CategoryRule {
    CategoryRule {
        name: name.to_string(),
        keywords: words(keywords),
    }
}

fn worker(name: &str, specialty: &str, covers: &[&str], latency_factor: f64) -> WorkerSpec {
    WorkerSpec {
        name: name.to_string(),
        specialty: specialty.to_string(),
        covers: words(covers),
        latency_factor,
    }
}

fn weights(entries: &[(&str, f64)]) -> HashMap<String, f64> {
    entries
        .iter()
        .map(|(name, weight)| (name.to_string(), *weight))
        .collect()
}

fn default_categories() -> Vec<CategoryRule> {
    vec![
        category(
            "refactor",
            &[
                "refactor",
                "clean up",
                "restructure",
                "rename",
                "simplify",
                "readab",
                "reorganize",
                "extract",
            ],
        ),
        category(
            "debug",
            &[
                "fix",
                "bug",
                "error",
                "debug",
                "broken",
                "crash",
                "exception",
                "not working",
                "issue",
            ],
        ),
        category(
            "create",
            &["create", "build", "implement", "generate", "write", "add", "new", "make"],
        ),
        category(
            "optimize",
            &[
                "optimiz",
                "performance",
                "faster",
                "speed",
                "efficient",
                "memory",
                "slow",
                "latency",
            ],
        ),
        category(
            "explain",
            &["explain", "what does", "how does", "why", "understand", "describe", "document"],
        ),
        category(
            "architecture",
            &[
                "architecture",
                "design",
                "structure",
                "pattern",
                "scalab",
                "system",
                "module",
                "microservice",
            ],
        ),
    ]
}

fn default_workers() -> Vec<WorkerSpec> {
    vec![
        worker("GPT-4o", "architecture", &["architecture", "explain", "create", "general"], 1.0),
        worker("Claude", "refactor", &["refactor", "explain", "architecture", "general"], 1.1),
        worker("DeepSeek", "optimize", &["optimize", "debug"], 0.9),
        worker("Qwen", "debug", &["debug", "refactor"], 0.8),
        worker("Gemini", "create", &["create", "explain", "general"], 0.9),
        worker("Codestral", "create", &["create", "refactor"], 0.7),
        worker("Llama", "explain", &["explain", "general"], 1.2),
        worker("Mistral", "refactor", &["refactor", "optimize"], 0.8),
        worker("Phi", "debug", &["debug", "optimize"], 0.6),
        worker("Grok", "architecture", &["architecture", "create"], 1.0),
    ]
}

fn default_expert_weights() -> HashMap<String, HashMap<String, f64>> {
    HashMap::from([
        (
            "refactor".to_string(),
            weights(&[("Claude", 3.0), ("Mistral", 2.5), ("Qwen", 1.5)]),
        ),
        (
            "debug".to_string(),
            weights(&[("Qwen", 3.0), ("Phi", 2.5), ("DeepSeek", 2.0)]),
        ),
        (
            "create".to_string(),
            weights(&[("Gemini", 3.0), ("Codestral", 2.5), ("GPT-4o", 2.0)]),
        ),
        (
            "optimize".to_string(),
            weights(&[("DeepSeek", 3.0), ("Mistral", 2.0), ("Phi", 2.0)]),
        ),
        (
            "explain".to_string(),
            weights(&[("Llama", 3.0), ("GPT-4o", 2.5), ("Claude", 2.0)]),
        ),
        (
            "architecture".to_string(),
            weights(&[("GPT-4o", 3.0), ("Grok", 2.5), ("Claude", 2.0)]),
        ),
    ])
}

fn default_tracks() -> Vec<TrackSpec> {
    vec![
        TrackSpec {
            name: "Performance".to_string(),
            focus: "Optimize for runtime performance and memory efficiency.".to_string(),
            workers: words(&["DeepSeek", "Mistral", "Phi"]),
        },
        TrackSpec {
            name: "Readability".to_string(),
            focus: "Optimize for readability, clear naming and maintainability.".to_string(),
            workers: words(&["Claude", "Llama", "Gemini"]),
        },
        TrackSpec {
            name: "Balanced".to_string(),
            focus: "Balance correctness, performance and readability.".to_string(),
            workers: words(&["GPT-4o", "Qwen", "Codestral"]),
        },
    ]
}

impl Default for ComplexityKeywords {
    fn default() -> Self {
        Self {
            complex: words(&[
                "architecture",
                "distributed",
                "scalable",
                "microservice",
                "concurrent",
                "security",
                "authentication",
                "database",
                "real-time",
                "full-stack",
            ]),
            medium: words(&[
                "api",
                "component",
                "refactor",
                "optimize",
                "integrate",
                "validation",
                "state",
                "async",
                "test",
            ]),
            simple: words(&[
                "simple", "basic", "quick", "small", "hello world", "typo", "rename", "example",
            ]),
        }
    }
}

impl Default for RefinementSettings {
    fn default() -> Self {
        Self {
            early_exit_threshold: 9.5,
            worker_budgets: vec![5, 3, 3, 1, 2],
            default_rounds: 5,
            artifact_prefix_chars: 2000,
            strategy: MergeStrategy::Balanced,
        }
    }
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            base_latency_ms: 400,
        }
    }
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            categories: default_categories(),
            generic_category: "general".to_string(),
            workers: default_workers(),
            expert_weights: default_expert_weights(),
            complexity: ComplexityKeywords::default(),
            tracks: default_tracks(),
            refinement: RefinementSettings::default(),
            simulation: SimulationSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = EnsembleConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.workers.len(), 10);
        assert_eq!(config.categories[0].name, "refactor");
        assert_eq!(config.refinement.early_exit_threshold, 9.5);
    }

    #[test]
    fn partial_file_overrides_only_named_sections() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"refinement": {{"early_exit_threshold": 8.0}}, "simulation": {{"base_latency_ms": 0}}}}"#
        )
        .unwrap();

        let config = EnsembleConfig::load(file.path()).unwrap();
        assert_eq!(config.refinement.early_exit_threshold, 8.0);
        assert_eq!(config.refinement.worker_budgets, vec![5, 3, 3, 1, 2]);
        assert_eq!(config.simulation.base_latency_ms, 0);
        assert_eq!(config.workers.len(), 10);
    }

    #[test]
    fn unknown_strategy_in_file_falls_back_to_balanced() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"refinement": {{"strategy": "weighted"}}}}"#).unwrap();
        let config = EnsembleConfig::load(file.path()).unwrap();
        assert_eq!(config.refinement.strategy, MergeStrategy::Balanced);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"refinement": {{"strategy": "Expert"}}}}"#).unwrap();
        let config = EnsembleConfig::load(file.path()).unwrap();
        assert_eq!(config.refinement.strategy, MergeStrategy::Expert);
    }

    #[test]
    fn load_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();

        let err = EnsembleConfig::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = EnsembleConfig::load(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn validate_rejects_duplicate_workers() {
        let mut config = EnsembleConfig::default();
        config.workers.push(worker("Qwen", "debug", &["debug"], 1.0));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate worker name 'Qwen'"));
    }

    #[test]
    fn validate_rejects_tracks_with_unknown_workers() {
        let mut config = EnsembleConfig::default();
        config.tracks[0].workers.push("Nobody".to_string());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("unknown worker 'Nobody'"));
    }

    #[test]
    fn validate_rejects_wrong_track_count() {
        let mut config = EnsembleConfig::default();
        config.tracks.pop();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_categories() {
        let config = EnsembleConfig {
            categories: vec![],
            ..EnsembleConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
