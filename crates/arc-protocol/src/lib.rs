//! Worker Protocol & Telemetry (spec §4.D): the uniform contract every
//! worker implements, and the timeout/status envelope the scheduler wraps
//! around each invocation.

#![warn(missing_docs)]

use arc_core::{EvidenceDraft, Job, Unknown, WorkerStatus};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Data other workers have already published, keyed by worker name (spec
/// §5: "shared context is a map written by the supervisor only after a
/// worker completes — the worker itself does not mutate shared state").
pub type SharedContext = Arc<RwLock<HashMap<String, Value>>>;

/// Build a fresh, empty [`SharedContext`].
#[must_use]
pub fn new_shared_context() -> SharedContext {
    Arc::new(RwLock::new(HashMap::new()))
}

/// Everything a [`Worker`] receives: the Job it runs under, a read view of
/// upstream workers' published data, and the shared store for any reads it
/// needs (e.g. CRM lookups). Workers persist nothing directly — the
/// envelope persists evidence/telemetry after `run` returns.
pub struct WorkerContext {
    /// The Job this invocation belongs to.
    pub job: Job,
    /// Upstream workers' published `data`, by worker name.
    pub shared: SharedContext,
    /// Shared entity store (read access to CRM fixtures, prior runs, etc).
    pub store: Arc<arc_store::Store>,
}

impl WorkerContext {
    /// Read a named upstream worker's published `data`, if present.
    pub async fn upstream(&self, worker_name: &str) -> Option<Value> {
        self.shared.read().await.get(worker_name).cloned()
    }
}

/// The `data`/`unknowns`/`errors`/`evidence`/`web_calls`/`cost_usd` envelope
/// every [`Worker`] returns on (possibly partial) completion (spec §4.D).
#[derive(Debug, Clone, Default)]
pub struct WorkerOutput {
    /// Worker-specific JSON payload, merged into the shared context under
    /// the worker's name once persisted.
    pub data: Value,
    /// Gaps worth surfacing to the caller.
    pub unknowns: Vec<Unknown>,
    /// Non-fatal issues encountered while producing `data`.
    pub errors: Vec<String>,
    /// Evidence drafts to persist alongside this run.
    pub evidence: Vec<EvidenceDraft>,
    /// External calls made while producing this output.
    pub web_calls: u32,
    /// Monetary cost attributed to this run.
    pub cost_usd: f64,
}

impl WorkerOutput {
    /// An empty, successful output (`data = {}`), useful for workers with
    /// nothing to report yet.
    #[must_use]
    pub fn empty() -> Self {
        Self { data: Value::Object(serde_json::Map::new()), ..Default::default() }
    }
}

/// A single-purpose asynchronous unit of work (spec §4.D, §9: "model each
/// worker as a value implementing a single capability").
///
/// Implementations must not panic; any failure that would otherwise be an
/// uncaught exception should be surfaced as `Err(message)`, which the
/// envelope turns into a `failed` [`WorkerExecution`].
#[async_trait]
pub trait Worker: Send + Sync {
    /// The worker's registry name (used as its key in the shared context
    /// and in `WorkerRun.worker_name`).
    fn name(&self) -> &str;

    /// Produce this worker's output for `ctx`.
    async fn run(&self, ctx: &WorkerContext) -> Result<WorkerOutput, String>;
}

/// The outcome of running one [`Worker`] through [`execute_with_envelope`].
#[derive(Debug, Clone)]
pub struct WorkerExecution {
    /// The worker's registry name.
    pub worker_name: String,
    /// `success` / `partial` / `failed`, per spec §4.D's status rules.
    pub status: WorkerStatus,
    /// The (possibly synthesized, on timeout/failure) output envelope.
    pub output: WorkerOutput,
    /// Wall-clock runtime in milliseconds.
    pub runtime_ms: u64,
}

/// Run `worker` under a hard deadline of `timeout`, and assign its status
/// per spec §4.D:
/// - success, no errors → `success`
/// - success, non-empty errors → `partial`
/// - deadline expired → `failed`, errors = `["Worker timed out after Ns"]`
/// - `Err` from the worker → `failed`, errors = `[message]`
pub async fn execute_with_envelope(worker: &dyn Worker, ctx: &WorkerContext, timeout: Duration) -> WorkerExecution {
    let start = Instant::now();
    let outcome = tokio::time::timeout(timeout, worker.run(ctx)).await;
    let runtime_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

    let (status, output) = match outcome {
        Err(_elapsed) => {
            tracing::warn!(target: "arc.worker", worker = worker.name(), timeout_s = timeout.as_secs(), "worker timed out");
            (
                WorkerStatus::Failed,
                WorkerOutput { errors: vec![format!("Worker timed out after {}s", timeout.as_secs())], ..WorkerOutput::empty() },
            )
        }
        Ok(Err(message)) => {
            tracing::warn!(target: "arc.worker", worker = worker.name(), error = %message, "worker raised an error");
            (WorkerStatus::Failed, WorkerOutput { errors: vec![message], ..WorkerOutput::empty() })
        }
        Ok(Ok(output)) => {
            let status = if output.errors.is_empty() { WorkerStatus::Success } else { WorkerStatus::Partial };
            (status, output)
        }
    };

    WorkerExecution { worker_name: worker.name().to_string(), status, output, runtime_ms }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arc_core::{ExecutionMode, JobStatus, Limits, Strategy};
    use std::collections::BTreeMap;

    struct SlowWorker;
    #[async_trait]
    impl Worker for SlowWorker {
        fn name(&self) -> &str {
            "slow"
        }
        async fn run(&self, _ctx: &WorkerContext) -> Result<WorkerOutput, String> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(WorkerOutput::empty())
        }
    }

    struct FailingWorker;
    #[async_trait]
    impl Worker for FailingWorker {
        fn name(&self) -> &str {
            "failing"
        }
        async fn run(&self, _ctx: &WorkerContext) -> Result<WorkerOutput, String> {
            Err("boom".to_string())
        }
    }

    struct PartialWorker;
    #[async_trait]
    impl Worker for PartialWorker {
        fn name(&self) -> &str {
            "partial"
        }
        async fn run(&self, _ctx: &WorkerContext) -> Result<WorkerOutput, String> {
            Ok(WorkerOutput { errors: vec!["degraded".into()], ..WorkerOutput::empty() })
        }
    }

    fn test_context() -> WorkerContext {
        let now = chrono::Utc::now();
        WorkerContext {
            job: Job {
                id: 1,
                trace_id: "abcdef0123456789".into(),
                research_property_id: 1,
                status: JobStatus::InProgress,
                progress: 0,
                current_step: None,
                strategy: Strategy::Wholesale,
                assumptions: BTreeMap::new(),
                limits: Limits { execution_mode: ExecutionMode::Pipeline, ..Limits::default() },
                results: None,
                error_message: None,
                started_at: Some(now),
                completed_at: None,
                created_at: now,
            },
            shared: new_shared_context(),
            store: Arc::new(arc_store::Store::new()),
        }
    }

    #[tokio::test]
    async fn timeout_yields_failed_with_canonical_message() {
        let ctx = test_context();
        let exec = execute_with_envelope(&SlowWorker, &ctx, Duration::from_millis(5)).await;
        assert_eq!(exec.status, WorkerStatus::Failed);
        assert_eq!(exec.output.errors, vec!["Worker timed out after 0s".to_string()]);
    }

    #[tokio::test]
    async fn error_result_yields_failed() {
        let ctx = test_context();
        let exec = execute_with_envelope(&FailingWorker, &ctx, Duration::from_secs(1)).await;
        assert_eq!(exec.status, WorkerStatus::Failed);
        assert_eq!(exec.output.errors, vec!["boom".to_string()]);
    }

    #[tokio::test]
    async fn non_empty_errors_yields_partial() {
        let ctx = test_context();
        let exec = execute_with_envelope(&PartialWorker, &ctx, Duration::from_secs(1)).await;
        assert_eq!(exec.status, WorkerStatus::Partial);
    }

    #[tokio::test]
    async fn success_with_no_errors_yields_success() {
        struct Ok0;
        #[async_trait]
        impl Worker for Ok0 {
            fn name(&self) -> &str {
                "ok"
            }
            async fn run(&self, _ctx: &WorkerContext) -> Result<WorkerOutput, String> {
                Ok(WorkerOutput::empty())
            }
        }
        let ctx = test_context();
        let exec = execute_with_envelope(&Ok0, &ctx, Duration::from_secs(1)).await;
        assert_eq!(exec.status, WorkerStatus::Success);
    }
}
