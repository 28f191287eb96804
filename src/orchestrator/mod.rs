// ABOUTME: Orchestrator module for routing tasks to an ensemble of workers.
// ABOUTME: Contains types, classifier, pool, merger, refinement engine and parallel tracks.

pub mod classifier;
pub mod complexity;
pub mod extract;
pub mod merger;
pub mod pool;
pub mod quality;
pub mod refinement;
pub mod service;
pub mod tracks;
pub mod types;
pub mod worker;
