// ABOUTME: Verification layer for generated code: syntax checks, quality assessment and auto-fix.
// ABOUTME: Built on the orchestrator's worker pool; never fails, degrading to heuristics instead.

pub mod assessor;
pub mod autofix;
pub mod syntax;
