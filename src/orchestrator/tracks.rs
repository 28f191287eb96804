// ABOUTME: Three independent refinement tracks run concurrently, each with its own focus and workers.
// ABOUTME: Every track runs exactly three sequential rounds; results are never merged across tracks.

use std::sync::Arc;

use crate::config::{ConfigError, EnsembleConfig};

use super::classifier::TaskClassifier;
use super::extract::{ArtifactExtractor, FencedBlockExtractor};
use super::merger::ResponseMerger;
use super::pool::WorkerPool;
use super::refinement::successful_or_all;
use super::types::{ContextFile, MergeStrategy, TrackOutcome, TrackRound, TrackSpec};

pub const ROUNDS_PER_TRACK: usize = 3;

pub fn track_prompt(round_index: usize, user_prompt: &str, focus: &str, artifact: &str) -> String {
    match round_index {
        0 | 1 => format!("{user_prompt}\n\nFocus: {focus}"),
        2 => format!(
            "Improve this solution to \"{user_prompt}\".\nFocus: {focus}\n\n```\n{artifact}\n```\n\n\
             Return the improved code in a code block."
        ),
        _ => format!(
            "Finalize this solution to \"{user_prompt}\".\nFocus: {focus}\n\n```\n{artifact}\n```\n\n\
             Return the final code in a code block."
        ),
    }
}

pub struct ParallelTracks {
    pool: Arc<WorkerPool>,
    classifier: TaskClassifier,
    merger: ResponseMerger,
    extractor: Arc<dyn ArtifactExtractor>,
    tracks: [TrackSpec; 3],
}

impl ParallelTracks {
    pub fn new(pool: Arc<WorkerPool>, config: &EnsembleConfig) -> Result<Self, ConfigError> {
        let tracks: [TrackSpec; 3] = config.tracks.clone().try_into().map_err(|t: Vec<TrackSpec>| {
            ConfigError::Invalid(format!("exactly 3 tracks are required, found {}", t.len()))
        })?;

        Ok(Self {
            pool,
            classifier: TaskClassifier::from_config(config),
            merger: ResponseMerger::from_config(config),
            extractor: Arc::new(FencedBlockExtractor::new(
                config.refinement.artifact_prefix_chars,
            )),
            tracks,
        })
    }

    pub fn tracks(&self) -> &[TrackSpec; 3] {
        &self.tracks
    }

    /// Run all three tracks at once and wait for every one of them.
    pub async fn run(&self, prompt: &str, context_files: &[ContextFile]) -> [TrackOutcome; 3] {
        log::info!(
            "[Tracks] Starting {}, {} and {}",
            self.tracks[0].name,
            self.tracks[1].name,
            self.tracks[2].name
        );

        let (a, b, c) = tokio::join!(
            self.run_track(&self.tracks[0], prompt, context_files),
            self.run_track(&self.tracks[1], prompt, context_files),
            self.run_track(&self.tracks[2], prompt, context_files),
        );
        [a, b, c]
    }

    async fn run_track(
        &self,
        spec: &TrackSpec,
        prompt: &str,
        context_files: &[ContextFile],
    ) -> TrackOutcome {
        let mut history = Vec::with_capacity(ROUNDS_PER_TRACK);
        let mut artifact = String::new();

        for round_index in 1..=ROUNDS_PER_TRACK {
            let prompt_used = track_prompt(round_index, prompt, &spec.focus, &artifact);
            let category = self.classifier.classify(&prompt_used).primary_category;
            let responses = self
                .pool
                .dispatch(&prompt_used, &spec.workers, context_files)
                .await;
            let merged = self.merger.merge(
                &successful_or_all(&responses),
                &category,
                MergeStrategy::Balanced,
            );

            let extracted = self.extractor.extract(&merged.content);
            if !extracted.is_empty() || artifact.is_empty() {
                artifact = extracted;
            }

            log::debug!(
                "[Tracks] {} round {}/{}: {} chars",
                spec.name,
                round_index,
                ROUNDS_PER_TRACK,
                artifact.chars().count()
            );

            history.push(TrackRound {
                round_index,
                prompt_used,
                merged,
                extracted_artifact: artifact.clone(),
            });
        }

        log::info!("[Tracks] {} finished", spec.name);

        TrackOutcome {
            track_name: spec.name.clone(),
            focus: spec.focus.clone(),
            assigned_workers: spec.workers.clone(),
            history,
            final_artifact: artifact,
        }
    }
}
