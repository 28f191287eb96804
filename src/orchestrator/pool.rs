// ABOUTME: Fixed registry of workers and concurrent fan-out/fan-in dispatch to a named subset.
// ABOUTME: Every failure mode becomes a failed WorkerResponse; dispatch itself never fails.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use thiserror::Error;

use crate::config::{EnsembleConfig, WorkerSpec};

use super::types::{ContextFile, PromptRequest, Worker, WorkerResponse};
use super::worker::WorkerBackend;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("Worker pool needs at least one worker")]
    Empty,

    #[error("Duplicate worker name: {0}")]
    DuplicateWorker(String),
}

/// Read-only worker registry plus the backend that answers for all of them.
///
/// Built once and shared through `Arc`; nothing in here mutates after construction.
pub struct WorkerPool {
    workers: Vec<Worker>,
    backend: Arc<dyn WorkerBackend>,
}

impl WorkerPool {
    /// Register workers in the given order. Names must be unique.
    pub fn new(
        specs: Vec<WorkerSpec>,
        backend: Arc<dyn WorkerBackend>,
    ) -> Result<Self, PoolError> {
        if specs.is_empty() {
            return Err(PoolError::Empty);
        }

        let mut seen = HashSet::new();
        let mut workers = Vec::with_capacity(specs.len());
        for spec in specs {
            if !seen.insert(spec.name.clone()) {
                return Err(PoolError::DuplicateWorker(spec.name));
            }
            let mut covers = spec.covers;
            if !covers.contains(&spec.specialty) {
                covers.insert(0, spec.specialty.clone());
            }
            workers.push(Worker {
                id: uuid::Uuid::new_v4().to_string(),
                display_name: spec.name,
                specialty: spec.specialty,
                covers,
                latency_factor: spec.latency_factor,
            });
        }

        log::info!("[Pool] Registered {} workers", workers.len());
        Ok(Self { workers, backend })
    }

    pub fn from_config(
        config: &EnsembleConfig,
        backend: Arc<dyn WorkerBackend>,
    ) -> Result<Self, PoolError> {
        Self::new(config.workers.clone(), backend)
    }

    pub fn get_worker(&self, name: &str) -> Option<&Worker> {
        self.workers.iter().find(|w| w.display_name == name)
    }

    /// Workers in registration order.
    pub fn workers(&self) -> &[Worker] {
        &self.workers
    }

    pub fn names(&self) -> Vec<String> {
        self.workers.iter().map(|w| w.display_name.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Send `prompt` to every named worker at once and wait for all of them.
    ///
    /// Output order matches `worker_names`. Unknown names, backend errors and
    /// panicking backends each yield a `succeeded = false` response; siblings
    /// are never cancelled.
    pub async fn dispatch(
        &self,
        prompt: &str,
        worker_names: &[String],
        context_files: &[ContextFile],
    ) -> Vec<WorkerResponse> {
        let started = Instant::now();
        let request = Arc::new(PromptRequest {
            prompt: prompt.to_string(),
            context_files: context_files.to_vec(),
        });

        log::debug!(
            "[Pool] Dispatching to {} workers: {}",
            worker_names.len(),
            worker_names.join(", ")
        );

        // slots[i] indexes into handles, or is None for an unknown name.
        let mut slots = Vec::with_capacity(worker_names.len());
        let mut handles = Vec::with_capacity(worker_names.len());
        for name in worker_names {
            let Some(worker) = self.get_worker(name).cloned() else {
                log::warn!("[Pool] Unknown worker requested: {}", name);
                slots.push(None);
                continue;
            };

            let backend = Arc::clone(&self.backend);
            let request = Arc::clone(&request);
            slots.push(Some(handles.len()));
            handles.push(tokio::spawn(async move {
                let result = backend.send_prompt(&worker, &request).await;
                (worker, result, started.elapsed())
            }));
        }

        // Barrier: every task settles before any response is built.
        let mut joined: Vec<Option<_>> = join_all(handles).await.into_iter().map(Some).collect();

        let mut responses = Vec::with_capacity(worker_names.len());
        for (name, slot) in worker_names.iter().zip(slots) {
            let outcome = slot.and_then(|i| joined.get_mut(i).and_then(Option::take));
            let response = match outcome {
                None => WorkerResponse {
                    worker_name: name.clone(),
                    content: format!("Worker '{}' is not registered in this pool.", name),
                    elapsed_ms: elapsed_ms(started),
                    specialty: String::new(),
                    succeeded: false,
                },
                Some(Ok((worker, Ok(reply), elapsed))) => WorkerResponse {
                    worker_name: worker.display_name,
                    content: reply.content,
                    elapsed_ms: elapsed.as_millis() as u64,
                    specialty: worker.specialty,
                    succeeded: reply.succeeded,
                },
                Some(Ok((worker, Err(e), elapsed))) => {
                    log::warn!("[Pool] Worker {} failed: {}", worker.display_name, e);
                    WorkerResponse {
                        content: fallback_message(&worker.display_name, &e.to_string()),
                        worker_name: worker.display_name,
                        elapsed_ms: elapsed.as_millis() as u64,
                        specialty: worker.specialty,
                        succeeded: false,
                    }
                }
                Some(Err(e)) => {
                    log::error!("[Pool] Worker {} panicked: {}", name, e);
                    WorkerResponse {
                        worker_name: name.clone(),
                        content: fallback_message(name, "the worker task panicked"),
                        elapsed_ms: elapsed_ms(started),
                        specialty: self
                            .get_worker(name)
                            .map(|w| w.specialty.clone())
                            .unwrap_or_default(),
                        succeeded: false,
                    }
                }
            };
            responses.push(response);
        }

        let failed = responses.iter().filter(|r| !r.succeeded).count();
        log::info!(
            "[Pool] Dispatch complete: {} responses, {} failed, {}ms",
            responses.len(),
            failed,
            elapsed_ms(started)
        );
        responses
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.names())
            .finish()
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn fallback_message(worker: &str, reason: &str) -> String {
    format!("{} could not complete this request ({}).", worker, reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::types::BackendError;
    use crate::orchestrator::worker::{ScriptedBackend, SimulatedBackend};

    fn spec(name: &str, specialty: &str) -> WorkerSpec {
        WorkerSpec {
            name: name.to_string(),
            specialty: specialty.to_string(),
            covers: vec![],
            latency_factor: 1.0,
        }
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn echo_pool() -> (WorkerPool, ScriptedBackend) {
        let backend = ScriptedBackend::new(|worker, request| {
            Ok(format!("{}: {}", worker.display_name, request.prompt))
        });
        let pool = WorkerPool::new(
            vec![spec("A", "debug"), spec("B", "create"), spec("C", "explain")],
            Arc::new(backend.clone()),
        )
        .unwrap();
        (pool, backend)
    }

    #[test]
    fn rejects_duplicate_and_empty_registries() {
        let backend: Arc<dyn WorkerBackend> = Arc::new(SimulatedBackend::instant());
        let err = WorkerPool::new(vec![spec("A", "debug"), spec("A", "create")], backend.clone())
            .unwrap_err();
        assert_eq!(err, PoolError::DuplicateWorker("A".to_string()));
        assert_eq!(WorkerPool::new(vec![], backend).unwrap_err(), PoolError::Empty);
    }

    #[test]
    fn registration_assigns_ids_and_covers_specialty() {
        let (pool, _) = echo_pool();
        assert_eq!(pool.len(), 3);
        assert_eq!(pool.names(), vec!["A", "B", "C"]);
        let a = pool.get_worker("A").unwrap();
        assert!(a.covers("debug"));
        assert!(!a.id.is_empty());
        assert_ne!(a.id, pool.get_worker("B").unwrap().id);
        assert!(pool.get_worker("Z").is_none());
    }

    #[tokio::test]
    async fn dispatch_preserves_request_order() {
        let (pool, backend) = echo_pool();
        let responses = pool.dispatch("hi", &names(&["C", "A", "B"]), &[]).await;
        let order: Vec<&str> = responses.iter().map(|r| r.worker_name.as_str()).collect();
        assert_eq!(order, vec!["C", "A", "B"]);
        assert_eq!(responses[0].content, "C: hi");
        assert_eq!(responses[1].specialty, "debug");
        assert!(responses.iter().all(|r| r.succeeded));
        assert_eq!(backend.call_count(), 3);
    }

    #[tokio::test]
    async fn unknown_worker_yields_synthetic_failure() {
        let (pool, backend) = echo_pool();
        let responses = pool.dispatch("hi", &names(&["A", "Ghost"]), &[]).await;
        assert_eq!(responses.len(), 2);
        assert!(responses[0].succeeded);
        assert!(!responses[1].succeeded);
        assert_eq!(responses[1].worker_name, "Ghost");
        assert!(responses[1].content.contains("not registered"));
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn backend_error_is_isolated_to_one_worker() {
        let backend = ScriptedBackend::new(|worker, _| {
            if worker.display_name == "B" {
                Err(BackendError::Failed("rate limited".to_string()))
            } else {
                Ok("fine".to_string())
            }
        });
        let pool = WorkerPool::new(
            vec![spec("A", "debug"), spec("B", "create"), spec("C", "explain")],
            Arc::new(backend),
        )
        .unwrap();

        let responses = pool.dispatch("go", &names(&["A", "B", "C"]), &[]).await;
        assert!(responses[0].succeeded);
        assert!(!responses[1].succeeded);
        assert!(responses[1].content.contains("rate limited"));
        assert_eq!(responses[1].specialty, "create");
        assert!(responses[2].succeeded);
    }

    #[tokio::test]
    async fn panicking_backend_does_not_abort_siblings() {
        let backend = ScriptedBackend::new(|worker, _| {
            if worker.display_name == "B" {
                panic!("backend blew up");
            }
            Ok("fine".to_string())
        });
        let pool = WorkerPool::new(
            vec![spec("A", "debug"), spec("B", "create")],
            Arc::new(backend),
        )
        .unwrap();

        let responses = pool.dispatch("go", &names(&["A", "B"]), &[]).await;
        assert_eq!(responses.len(), 2);
        assert!(responses[0].succeeded);
        assert!(!responses[1].succeeded);
        assert!(responses[1].content.contains("panicked"));
    }

    #[tokio::test]
    async fn context_files_reach_the_backend() {
        let backend = ScriptedBackend::new(|_, request| {
            Ok(format!("{} files", request.context_files.len()))
        });
        let pool = WorkerPool::new(vec![spec("A", "debug")], Arc::new(backend)).unwrap();
        let files = vec![
            ContextFile::new("/a.js", "1"),
            ContextFile::new("/b.js", "2"),
        ];
        let responses = pool.dispatch("go", &names(&["A"]), &files).await;
        assert_eq!(responses[0].content, "2 files");
    }

    #[tokio::test]
    async fn empty_request_returns_no_responses() {
        let (pool, _) = echo_pool();
        assert!(pool.dispatch("go", &[], &[]).await.is_empty());
    }
}
