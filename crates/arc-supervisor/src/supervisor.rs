//! The `Supervisor` (spec §4.I): owns a Job's lifecycle end to end — create,
//! run, and assemble the final envelope — dispatching to [`crate::plan`] for
//! the agent graph and [`crate::assembler`] for the output shape.

use crate::assembler::{assemble_output, ResearchOutput};
use crate::plan::build_specs;
use arc_config::ResearchInput;
use arc_core::{build_stable_key, normalize_address, normalize_us_state, Job, JobStatus, ResearchProperty, WorkerRun};
use arc_error::{ErrorCode, ResearchError};
use arc_protocol::new_shared_context;
use arc_runtime::BudgetTracker;
use arc_store::Store;
use arc_workers::crm::{compute_enrichment_status, resolve_enrichment_max_age_hours, CrmFixture, EnrichmentStatus};
use arc_workers::registry::WorkerRegistry;
use chrono::Utc;
use std::sync::Arc;

/// Owns one process's worker registry and backing store; reused across jobs.
pub struct Supervisor {
    store: Arc<Store>,
    registry: WorkerRegistry,
    crm: Arc<CrmFixture>,
}

impl Supervisor {
    /// Build a supervisor against an already-wired worker registry. `crm` is
    /// the same fixture passed into [`arc_workers::registry::WorkerDependencies`],
    /// so `_execute_pipeline`'s enrichment gate can run the same CRM match
    /// before any worker dispatches.
    #[must_use]
    pub fn new(store: Arc<Store>, registry: WorkerRegistry, crm: Arc<CrmFixture>) -> Self {
        Self { store, registry, crm }
    }

    /// `create_job` (spec §4.I): normalize the address, upsert the
    /// property, and insert a `pending` Job. Rejects a second concurrent
    /// job against the same property (spec §5: "at-most-one-in-progress").
    ///
    /// # Errors
    /// `InputInvalid` on a blank address, a bad assumption value, or an
    /// already-in-progress job for the resolved property.
    pub fn create_job(&self, input: &ResearchInput) -> Result<Job, ResearchError> {
        let (_assumptions, limits, _warnings) = input.resolve()?;

        let normalized_address = normalize_address(&input.address, input.city.as_deref(), input.state.as_deref(), input.zip.as_deref());
        let state = normalize_us_state(input.state.as_deref());
        let stable_key =
            build_stable_key(&input.address, input.city.as_deref(), input.state.as_deref(), input.zip.as_deref(), input.apn.as_deref());

        let now = Utc::now();
        let property_id = self.store.upsert_property(ResearchProperty {
            id: 0,
            stable_key,
            raw_address: input.address.clone(),
            normalized_address,
            city: input.city.clone(),
            state,
            zip_code: input.zip.clone(),
            apn: input.apn.clone(),
            geo_lat: None,
            geo_lng: None,
            latest_profile: None,
            created_at: now,
            updated_at: now,
        });

        if self.store.has_in_progress_job(property_id) {
            return Err(ResearchError::new(ErrorCode::InputInvalid, "a job is already in progress for this property")
                .with_context("property_id", property_id));
        }

        let trace_id = uuid::Uuid::new_v4().simple().to_string()[..16].to_string();

        let job = Job {
            id: 0,
            trace_id,
            research_property_id: property_id,
            status: JobStatus::Pending,
            progress: 0,
            current_step: None,
            strategy: input.strategy,
            assumptions: input.assumptions.clone(),
            limits,
            results: None,
            error_message: None,
            started_at: None,
            completed_at: None,
            created_at: now,
        };
        let job_id = self.store.create_job(job);
        Ok(self.store.get_job(job_id).expect("just inserted"))
    }

    /// `run_job` (spec §4.I): move a `pending` Job to `in_progress`, execute
    /// its pipeline, and record the outcome. Always leaves the Job in a
    /// terminal state (`completed` or `failed`) when it returns `Ok`.
    ///
    /// # Errors
    /// Returns the same [`ResearchError`] that was recorded on the Job as
    /// `error_message`, so a caller driving `run_job` directly (rather than
    /// through `run_sync`) can branch on `code`/`category` without
    /// re-parsing the string.
    pub async fn run_job(&self, job_id: u64) -> Result<Job, ResearchError> {
        let mut job = self.store.get_job(job_id).ok_or_else(|| ResearchError::new(ErrorCode::Internal, "job not found"))?;

        self.store.update_job(job_id, |j| {
            j.status = JobStatus::InProgress;
            j.started_at = Some(Utc::now());
            j.current_step = Some("enrichment_gate".to_string());
        });
        job.status = JobStatus::InProgress;

        match self.execute_pipeline(&job).await {
            Ok(()) => {
                let output = assemble_output(&self.store, job.research_property_id, job_id);
                let results = serde_json::to_value(&output).map_err(|e| ResearchError::new(ErrorCode::Internal, e.to_string()))?;
                self.store.update_job(job_id, |j| {
                    j.status = JobStatus::Completed;
                    j.progress = 100;
                    j.current_step = None;
                    j.completed_at = Some(Utc::now());
                    j.results = Some(results);
                });
            }
            Err(err) => {
                self.store.update_job(job_id, |j| {
                    j.status = JobStatus::Failed;
                    j.current_step = None;
                    j.completed_at = Some(Utc::now());
                    j.error_message = Some(err.to_string());
                });
                return Err(err);
            }
        }

        Ok(self.store.get_job(job_id).expect("job exists"))
    }

    /// `run_sync` (spec §4.I): `create_job` then `run_job`, returning the
    /// final Job either way (its `error_message` is set on failure; this
    /// does not itself return `Err`, since a failed-but-persisted Job is a
    /// normal outcome for a caller polling job status).
    ///
    /// # Errors
    /// Only `create_job`'s validation errors propagate; pipeline failures
    /// are captured on the returned Job instead.
    pub async fn run_sync(&self, input: &ResearchInput) -> Result<Job, ResearchError> {
        let job = self.create_job(input)?;
        let _ = self.run_job(job.id).await;
        Ok(self.store.get_job(job.id).expect("job exists"))
    }

    /// `get_full_output` (spec §4.I, §6.4): assemble the envelope for
    /// `property_id`, choosing the latest completed Job when `job_id` is
    /// `None`. Returns `None` when the property or the resolved job don't
    /// exist.
    #[must_use]
    pub fn get_full_output(&self, property_id: u64, job_id: Option<u64>) -> Option<ResearchOutput> {
        self.store.get_property(property_id)?;
        let job_id = match job_id {
            Some(id) => id,
            None => self.store.latest_completed_job(property_id)?.id,
        };
        Some(assemble_output(&self.store, property_id, job_id))
    }

    /// `get_enrichment_status` (spec §6.2): recompute the CRM-match
    /// enrichment status for a known property, without running a Job.
    /// `max_age_hours` overrides the TTL that would otherwise come from
    /// `assumptions.enriched_max_age_hours`; `None` means no freshness
    /// requirement applies.
    #[must_use]
    pub fn get_enrichment_status(&self, property_id: u64, max_age_hours: Option<u32>) -> Option<EnrichmentStatus> {
        let property = self.store.get_property(property_id)?;
        Some(self.compute_status_for(&property, max_age_hours))
    }

    fn compute_status_for(&self, property: &ResearchProperty, max_age_hours: Option<u32>) -> EnrichmentStatus {
        let crm_match = self.crm.find_matching(&property.raw_address, property.city.as_deref(), property.state.as_deref());
        let skip_trace = crm_match.as_ref().and_then(|p| self.crm.latest_skip_trace(p.id));
        let zillow = crm_match.as_ref().and_then(|p| self.crm.zillow_for(p.id));
        compute_enrichment_status(crm_match.as_ref(), skip_trace.as_ref(), zillow.as_ref(), max_age_hours, Utc::now())
    }

    /// `_execute_pipeline` (spec §4.I): runs the enrichment gate, then
    /// dispatches `build_specs` through the scheduler, persisting every
    /// completed worker's evidence and telemetry as it goes (the scheduler
    /// itself writes only to the in-memory shared context, per spec §5).
    async fn execute_pipeline(&self, job: &Job) -> Result<(), ResearchError> {
        let assumptions = arc_config::validate(&job.assumptions).map(|(a, _)| a).unwrap_or_default();

        if assumptions.require_enriched_data.unwrap_or(false) {
            self.enforce_enrichment_gate(job, &assumptions)?;
        }

        let specs = build_specs(job.limits.execution_mode, &assumptions.extra_agents, job.limits.max_steps);

        let shared = new_shared_context();
        let budget = BudgetTracker::new(Some(job.limits.max_web_calls));

        let outcome = arc_runtime::run(specs, &self.registry, job, &shared, &self.store, &budget).await;

        let now = Utc::now();
        for exec in &outcome.executions {
            self.store.persist_drafts(job.id, job.research_property_id, &exec.output.evidence, now);
            self.store.record_worker_run(
                job.id,
                WorkerRun {
                    id: 0,
                    job_id: job.id,
                    worker_name: exec.worker_name.clone(),
                    status: exec.status,
                    runtime_ms: exec.runtime_ms,
                    cost_usd: exec.output.cost_usd,
                    web_calls: exec.output.web_calls,
                    data: exec.output.data.clone(),
                    unknowns: exec.output.unknowns.clone(),
                    errors: exec.output.errors.clone(),
                },
            );
        }

        if let Some(err) = outcome.error {
            return Err(err);
        }
        Ok(())
    }

    /// §4.I.2 enrichment gate: runs the same CRM match the geocode worker
    /// runs (§4.I.3), but before any worker has dispatched.
    fn enforce_enrichment_gate(&self, job: &Job, assumptions: &arc_config::Assumptions) -> Result<(), ResearchError> {
        let property = self
            .store
            .get_property(job.research_property_id)
            .ok_or_else(|| ResearchError::new(ErrorCode::Internal, "research property not found"))?;

        let max_age_hours = resolve_enrichment_max_age_hours(assumptions);
        let status = self.compute_status_for(&property, max_age_hours);

        if status.is_enriched && status.is_fresh.unwrap_or(true) {
            return Ok(());
        }

        if status.is_enriched {
            return Err(ResearchError::new(
                ErrorCode::EnrichmentGateFailed,
                "enrichment data is stale for this property",
            )
            .with_context("age_hours", status.age_hours.unwrap_or_default())
            .with_context("max_age_hours", status.max_age_hours.unwrap_or_default()));
        }

        Err(ResearchError::new(ErrorCode::EnrichmentGateFailed, "required enrichment data is missing")
            .with_context("missing", status.missing.join(",")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arc_adapters::{NullGeocoder, NullGis, NullNarrativeLlm, NullSearch};
    use arc_config::ResearchInput;
    use arc_workers::registry::{build_registry, ApiKeys, WorkerDependencies};
    use std::collections::BTreeMap;

    fn test_supervisor() -> Supervisor {
        let store = Arc::new(Store::new());
        let crm = Arc::new(CrmFixture::new());
        let registry = build_registry(WorkerDependencies {
            geocoder: Arc::new(NullGeocoder),
            search: Arc::new(NullSearch),
            gis: Arc::new(NullGis),
            llm: Arc::new(NullNarrativeLlm),
            crm: crm.clone(),
            api_keys: ApiKeys::default(),
        });
        Supervisor::new(store, registry, crm)
    }

    fn sample_input() -> ResearchInput {
        ResearchInput {
            address: "123 Main St".into(),
            city: Some("Springfield".into()),
            state: Some("IL".into()),
            zip: None,
            apn: None,
            strategy: Default::default(),
            mode: Default::default(),
            assumptions: BTreeMap::new(),
            limits: None,
        }
    }

    #[test]
    fn create_job_rejects_second_concurrent_job_for_same_property() {
        let sup = test_supervisor();
        let job1 = sup.create_job(&sample_input()).expect("first job");
        assert_eq!(job1.status, JobStatus::Pending);
        let err = sup.create_job(&sample_input()).expect_err("second job should be rejected");
        assert_eq!(err.code, ErrorCode::InputInvalid);
    }

    #[tokio::test]
    async fn run_sync_completes_pipeline_mode_job() {
        let sup = test_supervisor();
        let job = sup.run_sync(&sample_input()).await.expect("run_sync should not error on a valid input");
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert!(job.results.is_some());

        let output = sup.get_full_output(job.research_property_id, Some(job.id)).expect("output should assemble");
        assert!(!output.worker_runs.is_empty());
    }

    #[tokio::test]
    async fn enrichment_gate_fails_job_when_required_but_unmatched() {
        let sup = test_supervisor();
        let mut input = sample_input();
        input.assumptions.insert("require_enriched_data".to_string(), serde_json::json!(true));

        let job = sup.run_sync(&input).await.expect("run_sync itself should not error");
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error_message.as_deref().unwrap_or("").contains("ENRICHMENT_GATE_FAILED"));
    }

    #[tokio::test]
    async fn orchestrated_mode_with_extensive_agents_runs_more_workers() {
        let sup = test_supervisor();
        let mut input = sample_input();
        input.mode = arc_core::ExecutionMode::Orchestrated;
        input.assumptions.insert("extra_agents".to_string(), serde_json::json!(["extensive"]));
        input.limits = Some(arc_config::PartialLimits { max_steps: Some(25), ..Default::default() });

        let job = sup.run_sync(&input).await.expect("run_sync should not error");
        assert_eq!(job.status, JobStatus::Completed);

        let output = sup.get_full_output(job.research_property_id, Some(job.id)).expect("output should assemble");
        assert!(output.extensive.is_some());
    }
}
