//! Dependency-aware batch scheduler (spec §4.H): given an ordered list of
//! [`AgentSpec`]s, runs each ready batch in parallel and publishes every
//! worker's output into the shared context as soon as that worker finishes,
//! rather than waiting for the rest of its batch.

use crate::budget::BudgetTracker;
use arc_core::Job;
use arc_error::{ErrorCode, ResearchError};
use arc_protocol::{execute_with_envelope, SharedContext, Worker, WorkerContext, WorkerExecution};
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// One node in the dependency graph the scheduler executes.
#[derive(Debug, Clone)]
pub struct AgentSpec {
    /// Registry name; must match a key in the worker map passed to [`run`].
    pub name: String,
    /// Names of specs that must be `completed` before this one becomes ready.
    pub dependencies: HashSet<String>,
}

impl AgentSpec {
    /// Build a spec with no dependencies.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), dependencies: HashSet::new() }
    }

    /// Build a spec depending on the given names.
    pub fn with_deps(name: impl Into<String>, dependencies: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self { name: name.into(), dependencies: dependencies.into_iter().map(Into::into).collect() }
    }

    /// Drop any dependency not present in `scheduled_names` (spec §4.H: "dangling
    /// dependency references are pruned before scheduling" when `max_steps` truncates
    /// the spec list).
    pub fn prune_dangling(&mut self, scheduled_names: &HashSet<String>) {
        self.dependencies.retain(|d| scheduled_names.contains(d));
    }
}

/// What the scheduler accomplished. `error` is set on `UnresolvedDependencies`
/// or `BudgetExceeded`; `executions` always reflects every worker that
/// actually ran, even when an error cut the run short, so callers can still
/// persist their `WorkerRun`s.
pub struct SchedulerOutcome {
    /// Every worker execution that completed, in completion order.
    pub executions: Vec<WorkerExecution>,
    /// Set when the run stopped early.
    pub error: Option<ResearchError>,
}

/// Run `specs` to completion against `workers`, per spec §4.H's batch loop.
///
/// `job.limits` supplies `max_steps`, `max_parallel_agents`, and
/// `timeout_seconds_per_step`. `budget` is consulted (and recorded into)
/// after every individual worker completion; per the documented open
/// question, a worker already in flight when the budget trips is allowed to
/// finish, so a batch may overshoot the cap by the batch's remaining
/// in-flight workers before scheduling stops.
pub async fn run(
    specs: Vec<AgentSpec>,
    workers: &HashMap<String, Arc<dyn Worker>>,
    job: &Job,
    shared: &SharedContext,
    store: &Arc<arc_store::Store>,
    budget: &BudgetTracker,
) -> SchedulerOutcome {
    let limits = &job.limits;
    let max_steps = limits.max_steps as usize;
    let max_parallel = limits.max_parallel_agents.max(1) as usize;
    let timeout = Duration::from_secs(u64::from(limits.timeout_seconds_per_step));

    let mut pending = specs;
    let mut completed: HashSet<String> = HashSet::new();
    let mut executions: Vec<WorkerExecution> = Vec::new();
    let mut error: Option<ResearchError> = None;

    loop {
        if executions.len() >= max_steps {
            break;
        }

        let ready: Vec<String> =
            pending.iter().filter(|spec| spec.dependencies.is_subset(&completed)).map(|s| s.name.clone()).collect();

        if ready.is_empty() {
            if !pending.is_empty() {
                let stuck: Vec<&str> = pending.iter().map(|s| s.name.as_str()).collect();
                error = Some(
                    ResearchError::new(
                        ErrorCode::UnresolvedDependencies,
                        format!("no agent in {{{}}} has its dependencies satisfied", stuck.join(", ")),
                    )
                    .with_context("pending", stuck.join(",")),
                );
            }
            break;
        }

        let batch_size = max_parallel.min(ready.len()).min(max_steps - executions.len());
        let batch: Vec<String> = ready.into_iter().take(batch_size).collect();

        let mut in_flight = FuturesUnordered::new();
        for name in &batch {
            let Some(worker) = workers.get(name).cloned() else {
                error = Some(ResearchError::new(ErrorCode::Internal, format!("no worker registered for `{name}`")));
                continue;
            };
            let ctx = WorkerContext { job: job.clone(), shared: shared.clone(), store: store.clone() };
            in_flight.push(async move { execute_with_envelope(worker.as_ref(), &ctx, timeout).await });
        }

        while let Some(exec) = in_flight.next().await {
            budget.record(exec.output.web_calls);
            {
                let mut guard = shared.write().await;
                guard.insert(exec.worker_name.clone(), exec.output.data.clone());
            }
            pending.retain(|s| s.name != exec.worker_name);
            completed.insert(exec.worker_name.clone());
            executions.push(exec);

            if error.is_none() && budget.exceeded() {
                error = Some(
                    ResearchError::new(
                        ErrorCode::BudgetExceeded,
                        format!("exceeded web call limit ({} > {})", budget.used(), budget.max_web_calls().unwrap_or(0)),
                    )
                    .with_context("used", budget.used()),
                );
            }
        }

        if error.is_some() {
            break;
        }
    }

    SchedulerOutcome { executions, error }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arc_core::{ExecutionMode, JobStatus, Limits, Strategy};
    use arc_protocol::{new_shared_context, WorkerOutput};
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Echo {
        name: String,
        web_calls: u32,
    }

    #[async_trait]
    impl Worker for Echo {
        fn name(&self) -> &str {
            &self.name
        }
        async fn run(&self, _ctx: &WorkerContext) -> Result<WorkerOutput, String> {
            Ok(WorkerOutput { data: serde_json::json!({"ran": self.name}), web_calls: self.web_calls, ..WorkerOutput::empty() })
        }
    }

    fn test_job(limits: Limits) -> Job {
        let now = chrono::Utc::now();
        Job {
            id: 1,
            trace_id: "abcdef0123456789".into(),
            research_property_id: 1,
            status: JobStatus::InProgress,
            progress: 0,
            current_step: None,
            strategy: Strategy::Wholesale,
            assumptions: BTreeMap::new(),
            limits,
            results: None,
            error_message: None,
            started_at: Some(now),
            completed_at: None,
            created_at: now,
        }
    }

    fn workers(names: &[&str]) -> HashMap<String, Arc<dyn Worker>> {
        names
            .iter()
            .map(|n| (n.to_string(), Arc::new(Echo { name: n.to_string(), web_calls: 0 }) as Arc<dyn Worker>))
            .collect()
    }

    #[tokio::test]
    async fn runs_dependents_after_their_dependency_completes() {
        let specs = vec![AgentSpec::new("a"), AgentSpec::with_deps("b", ["a"])];
        let limits = Limits { max_parallel_agents: 2, execution_mode: ExecutionMode::Orchestrated, ..Limits::default() };
        let job = test_job(limits);
        let shared = new_shared_context();
        let store = Arc::new(arc_store::Store::new());
        let budget = BudgetTracker::new(None);

        let outcome = run(specs, &workers(&["a", "b"]), &job, &shared, &store, &budget).await;
        assert!(outcome.error.is_none());
        let order: Vec<&str> = outcome.executions.iter().map(|e| e.worker_name.as_str()).collect();
        assert_eq!(order, vec!["a", "b"]);
        assert!(shared.read().await.contains_key("a"));
    }

    #[tokio::test]
    async fn unresolved_dependency_surfaces_as_an_error() {
        let specs = vec![AgentSpec::with_deps("b", ["missing"])];
        let limits = Limits { execution_mode: ExecutionMode::Orchestrated, ..Limits::default() };
        let job = test_job(limits);
        let shared = new_shared_context();
        let store = Arc::new(arc_store::Store::new());
        let budget = BudgetTracker::new(None);

        let outcome = run(specs, &workers(&["b"]), &job, &shared, &store, &budget).await;
        assert!(matches!(outcome.error, Some(e) if e.code == arc_error::ErrorCode::UnresolvedDependencies));
        assert!(outcome.executions.is_empty());
    }

    #[tokio::test]
    async fn max_steps_caps_total_executions() {
        let specs = vec![AgentSpec::new("a"), AgentSpec::new("b"), AgentSpec::new("c")];
        let limits = Limits { max_steps: 2, max_parallel_agents: 1, execution_mode: ExecutionMode::Orchestrated, ..Limits::default() };
        let job = test_job(limits);
        let shared = new_shared_context();
        let store = Arc::new(arc_store::Store::new());
        let budget = BudgetTracker::new(None);

        let outcome = run(specs, &workers(&["a", "b", "c"]), &job, &shared, &store, &budget).await;
        assert!(outcome.error.is_none());
        assert_eq!(outcome.executions.len(), 2);
    }

    #[tokio::test]
    async fn batch_size_respects_max_parallel_agents() {
        let calls = Arc::new(AtomicUsize::new(0));
        struct Counting {
            name: String,
            calls: Arc<AtomicUsize>,
        }
        #[async_trait]
        impl Worker for Counting {
            fn name(&self) -> &str {
                &self.name
            }
            async fn run(&self, _ctx: &WorkerContext) -> Result<WorkerOutput, String> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Ok(WorkerOutput::empty())
            }
        }
        let mut map: HashMap<String, Arc<dyn Worker>> = HashMap::new();
        for n in ["a", "b", "c", "d"] {
            map.insert(n.to_string(), Arc::new(Counting { name: n.to_string(), calls: calls.clone() }) as Arc<dyn Worker>);
        }
        let specs = vec![AgentSpec::new("a"), AgentSpec::new("b"), AgentSpec::new("c"), AgentSpec::new("d")];
        let limits = Limits { max_steps: 10, max_parallel_agents: 2, execution_mode: ExecutionMode::Orchestrated, ..Limits::default() };
        let job = test_job(limits);
        let shared = new_shared_context();
        let store = Arc::new(arc_store::Store::new());
        let budget = BudgetTracker::new(None);

        let outcome = run(specs, &map, &job, &shared, &store, &budget).await;
        assert!(outcome.error.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(outcome.executions.len(), 4);
    }

    #[tokio::test]
    async fn budget_exceeded_stops_scheduling_but_keeps_completed_executions() {
        let specs = vec![AgentSpec::new("a"), AgentSpec::new("b"), AgentSpec::new("c")];
        let limits = Limits { max_parallel_agents: 1, execution_mode: ExecutionMode::Orchestrated, ..Limits::default() };
        let job = test_job(limits);
        let shared = new_shared_context();
        let store = Arc::new(arc_store::Store::new());
        let budget = BudgetTracker::new(Some(1));

        let mut map: HashMap<String, Arc<dyn Worker>> = HashMap::new();
        map.insert("a".into(), Arc::new(Echo { name: "a".into(), web_calls: 2 }) as Arc<dyn Worker>);
        map.insert("b".into(), Arc::new(Echo { name: "b".into(), web_calls: 0 }) as Arc<dyn Worker>);
        map.insert("c".into(), Arc::new(Echo { name: "c".into(), web_calls: 0 }) as Arc<dyn Worker>);

        let outcome = run(specs, &map, &job, &shared, &store, &budget).await;
        assert!(matches!(outcome.error, Some(e) if e.code == arc_error::ErrorCode::BudgetExceeded));
        assert_eq!(outcome.executions.len(), 1);
        assert_eq!(outcome.executions[0].worker_name, "a");
    }

    #[test]
    fn prune_dangling_drops_unscheduled_deps() {
        let mut spec = AgentSpec::with_deps("dossier_writer", ["flood_zone", "comps_sales"]);
        let scheduled: HashSet<String> = ["comps_sales".to_string()].into_iter().collect();
        spec.prune_dangling(&scheduled);
        assert_eq!(spec.dependencies, scheduled);
    }
}
