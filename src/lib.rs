// ABOUTME: Core library for the agent ensemble.
// ABOUTME: Exposes configuration, the orchestrator flows and the verification layer.

pub mod config;
pub mod orchestrator;
pub mod verification;
