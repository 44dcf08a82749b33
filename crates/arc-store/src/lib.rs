//! In-memory Evidence Store and entity repositories (spec §3, §4.B, §6.5).
//!
//! The core names no concrete database; this crate gives every other crate
//! an addressable, `Send + Sync` place to read and write the entities spec
//! §3 defines, with the replace-in-place-by-hash and delete-then-rewrite
//! semantics spec §4.B/§7 require. A single [`Store`] behind an `Arc` is
//! shared across a Job's worker tasks.

#![warn(missing_docs)]

use arc_core::{CompRental, CompSale, Dossier, EvidenceDraft, EvidenceItem, Job, JobStatus, ResearchProperty, RiskScore, Underwriting, WorkerRun};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Central addressable store for every persisted entity (spec §6.5).
///
/// Internally a handful of mutex-guarded maps; every method is a short
/// critical section, so lock contention across a Job's parallel worker
/// batch stays negligible.
#[derive(Default)]
pub struct Store {
    properties: Mutex<HashMap<u64, ResearchProperty>>,
    property_by_key: Mutex<HashMap<String, u64>>,
    next_property_id: AtomicU64,

    jobs: Mutex<HashMap<u64, Job>>,
    next_job_id: AtomicU64,

    evidence: Mutex<HashMap<u64, EvidenceItem>>,
    evidence_by_hash: Mutex<HashMap<String, u64>>,
    next_evidence_id: AtomicU64,

    comp_sales: Mutex<HashMap<u64, Vec<CompSale>>>,
    comp_rentals: Mutex<HashMap<u64, Vec<CompRental>>>,
    next_comp_id: AtomicU64,

    underwriting: Mutex<HashMap<u64, Underwriting>>,
    risk_scores: Mutex<HashMap<u64, RiskScore>>,
    dossiers: Mutex<HashMap<u64, Dossier>>,

    worker_runs: Mutex<HashMap<u64, Vec<WorkerRun>>>,
    next_worker_run_id: AtomicU64,
}

impl Store {
    /// Build an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // -- ResearchProperty ---------------------------------------------------

    /// Insert a brand-new property, or return the id of an existing one with
    /// the same `stable_key` (spec §3.1: `stable_key` is immutable once set,
    /// and the property is never deleted by the core).
    pub fn upsert_property(&self, mut property: ResearchProperty) -> u64 {
        let mut by_key = self.property_by_key.lock().expect("poisoned");
        if let Some(&existing_id) = by_key.get(&property.stable_key) {
            return existing_id;
        }
        let id = self.next_property_id.fetch_add(1, Ordering::Relaxed) + 1;
        property.id = id;
        by_key.insert(property.stable_key.clone(), id);
        self.properties.lock().expect("poisoned").insert(id, property);
        id
    }

    /// Fetch a property by id.
    #[must_use]
    pub fn get_property(&self, id: u64) -> Option<ResearchProperty> {
        self.properties.lock().expect("poisoned").get(&id).cloned()
    }

    /// Fetch a property by its stable key.
    #[must_use]
    pub fn get_property_by_key(&self, stable_key: &str) -> Option<ResearchProperty> {
        let id = *self.property_by_key.lock().expect("poisoned").get(stable_key)?;
        self.get_property(id)
    }

    /// Replace a property's mutable fields (geocode backfill, latest
    /// profile), leaving `id`/`stable_key` untouched.
    pub fn update_property(&self, id: u64, f: impl FnOnce(&mut ResearchProperty)) {
        if let Some(property) = self.properties.lock().expect("poisoned").get_mut(&id) {
            f(property);
            property.updated_at = Utc::now();
        }
    }

    /// All known properties whose `city`/`state` match (case-insensitively,
    /// when supplied), capped at `limit` rows — backs the CRM-match /
    /// internal-comp-candidate scans (spec §4.E.3, §4.I.3).
    #[must_use]
    pub fn properties_in_market(&self, city: Option<&str>, state: Option<&str>, limit: usize) -> Vec<ResearchProperty> {
        let city = city.map(str::to_lowercase);
        let state = state.map(str::to_lowercase);
        self.properties
            .lock()
            .expect("poisoned")
            .values()
            .filter(|p| city.as_deref().is_none_or(|c| p.city.as_deref().map(str::to_lowercase).as_deref() == Some(c)))
            .filter(|p| state.as_deref().is_none_or(|s| p.state.as_deref().map(str::to_lowercase).as_deref() == Some(s)))
            .take(limit)
            .cloned()
            .collect()
    }

    // -- Job -----------------------------------------------------------------

    /// Insert a new Job, assigning it an id.
    pub fn create_job(&self, mut job: Job) -> u64 {
        let id = self.next_job_id.fetch_add(1, Ordering::Relaxed) + 1;
        job.id = id;
        self.jobs.lock().expect("poisoned").insert(id, job);
        id
    }

    /// Fetch a Job by id.
    #[must_use]
    pub fn get_job(&self, id: u64) -> Option<Job> {
        self.jobs.lock().expect("poisoned").get(&id).cloned()
    }

    /// Mutate a Job in place (status transitions, progress, results).
    pub fn update_job(&self, id: u64, f: impl FnOnce(&mut Job)) {
        if let Some(job) = self.jobs.lock().expect("poisoned").get_mut(&id) {
            f(job);
        }
    }

    /// Whether a Job for `property_id` is currently `in_progress` (spec §3.1:
    /// at most one in-progress Job per property, §5).
    #[must_use]
    pub fn has_in_progress_job(&self, property_id: u64) -> bool {
        self.jobs
            .lock()
            .expect("poisoned")
            .values()
            .any(|j| j.research_property_id == property_id && j.status == JobStatus::InProgress)
    }

    /// The most recently created `completed` Job for a property, if any
    /// (spec §4.I: `get_full_output` with no `job_id` picks the latest).
    #[must_use]
    pub fn latest_completed_job(&self, property_id: u64) -> Option<Job> {
        self.jobs
            .lock()
            .expect("poisoned")
            .values()
            .filter(|j| j.research_property_id == property_id && j.status == JobStatus::Completed)
            .max_by_key(|j| j.completed_at)
            .cloned()
    }

    // -- EvidenceItem ----------------------------------------------------------

    /// Replace-in-place-by-hash upsert of one evidence draft (spec §4.B).
    pub fn upsert_evidence_draft(&self, job_id: u64, property_id: u64, draft: &EvidenceDraft, now: DateTime<Utc>) -> EvidenceItem {
        let hash = draft.hash();
        let mut by_hash = self.evidence_by_hash.lock().expect("poisoned");
        let mut evidence = self.evidence.lock().expect("poisoned");

        if let Some(&existing_id) = by_hash.get(&hash) {
            let item = evidence.get_mut(&existing_id).expect("index/table desync");
            item.job_id = job_id;
            item.research_property_id = property_id;
            item.category = draft.category.clone();
            item.claim = draft.claim.clone();
            item.source_url = draft.source_url.clone();
            item.raw_excerpt = draft.raw_excerpt.clone();
            item.confidence = Some(draft.confidence);
            item.captured_at = now;
            return item.clone();
        }

        let id = self.next_evidence_id.fetch_add(1, Ordering::Relaxed) + 1;
        let item = EvidenceItem {
            id,
            research_property_id: property_id,
            job_id,
            category: draft.category.clone(),
            claim: draft.claim.clone(),
            source_url: draft.source_url.clone(),
            captured_at: now,
            raw_excerpt: draft.raw_excerpt.clone(),
            confidence: Some(draft.confidence),
            hash: hash.clone(),
        };
        by_hash.insert(hash, id);
        evidence.insert(id, item.clone());
        item
    }

    /// Persist a worker's whole evidence batch atomically (spec §4.B: "the
    /// unit of persistence is the worker's emitted batch").
    pub fn persist_drafts(&self, job_id: u64, property_id: u64, drafts: &[EvidenceDraft], now: DateTime<Utc>) -> Vec<EvidenceItem> {
        drafts.iter().map(|draft| self.upsert_evidence_draft(job_id, property_id, draft, now)).collect()
    }

    /// All evidence for a property, ascending by id (spec §4.J).
    #[must_use]
    pub fn list_evidence_for_property(&self, property_id: u64) -> Vec<EvidenceItem> {
        let mut items: Vec<_> = self
            .evidence
            .lock()
            .expect("poisoned")
            .values()
            .filter(|e| e.research_property_id == property_id)
            .cloned()
            .collect();
        items.sort_by_key(|e| e.id);
        items
    }

    // -- CompSale / CompRental -------------------------------------------------

    /// Delete prior rows for `job_id` and insert `comps`, assigning ids
    /// (spec §3.1: "all rows for a Job are deleted and rewritten each time").
    pub fn replace_comp_sales(&self, job_id: u64, mut comps: Vec<CompSale>) {
        for comp in &mut comps {
            comp.id = self.next_comp_id.fetch_add(1, Ordering::Relaxed) + 1;
        }
        self.comp_sales.lock().expect("poisoned").insert(job_id, comps);
    }

    /// Same as [`Self::replace_comp_sales`] for rentals.
    pub fn replace_comp_rentals(&self, job_id: u64, mut comps: Vec<CompRental>) {
        for comp in &mut comps {
            comp.id = self.next_comp_id.fetch_add(1, Ordering::Relaxed) + 1;
        }
        self.comp_rentals.lock().expect("poisoned").insert(job_id, comps);
    }

    /// A Job's comp sales, descending by `similarity_score` (spec §4.J).
    #[must_use]
    pub fn list_comp_sales(&self, job_id: u64) -> Vec<CompSale> {
        let mut comps = self.comp_sales.lock().expect("poisoned").get(&job_id).cloned().unwrap_or_default();
        comps.sort_by(|a, b| b.similarity_score.partial_cmp(&a.similarity_score).unwrap_or(std::cmp::Ordering::Equal));
        comps
    }

    /// A Job's comp rentals, descending by `similarity_score` (spec §4.J).
    #[must_use]
    pub fn list_comp_rentals(&self, job_id: u64) -> Vec<CompRental> {
        let mut comps = self.comp_rentals.lock().expect("poisoned").get(&job_id).cloned().unwrap_or_default();
        comps.sort_by(|a, b| b.similarity_score.partial_cmp(&a.similarity_score).unwrap_or(std::cmp::Ordering::Equal));
        comps
    }

    // -- Underwriting / RiskScore / Dossier (single row per Job, overwritten) --

    /// Overwrite the Job's Underwriting row.
    pub fn upsert_underwriting(&self, job_id: u64, underwriting: Underwriting) {
        self.underwriting.lock().expect("poisoned").insert(job_id, underwriting);
    }

    /// Fetch the Job's Underwriting row, if computed.
    #[must_use]
    pub fn get_underwriting(&self, job_id: u64) -> Option<Underwriting> {
        self.underwriting.lock().expect("poisoned").get(&job_id).cloned()
    }

    /// Overwrite the Job's RiskScore row.
    pub fn upsert_risk_score(&self, job_id: u64, risk_score: RiskScore) {
        self.risk_scores.lock().expect("poisoned").insert(job_id, risk_score);
    }

    /// Fetch the Job's RiskScore row, if computed.
    #[must_use]
    pub fn get_risk_score(&self, job_id: u64) -> Option<RiskScore> {
        self.risk_scores.lock().expect("poisoned").get(&job_id).cloned()
    }

    /// Overwrite the Job's Dossier row.
    pub fn upsert_dossier(&self, job_id: u64, dossier: Dossier) {
        self.dossiers.lock().expect("poisoned").insert(job_id, dossier);
    }

    /// Fetch the Job's Dossier row, if written.
    #[must_use]
    pub fn get_dossier(&self, job_id: u64) -> Option<Dossier> {
        self.dossiers.lock().expect("poisoned").get(&job_id).cloned()
    }

    // -- WorkerRun --------------------------------------------------------------

    /// Append a telemetry row for a Job (spec §4.D: "always write a
    /// WorkerRun row").
    pub fn record_worker_run(&self, job_id: u64, mut run: WorkerRun) -> u64 {
        let id = self.next_worker_run_id.fetch_add(1, Ordering::Relaxed) + 1;
        run.id = id;
        self.worker_runs.lock().expect("poisoned").entry(job_id).or_default().push(run);
        id
    }

    /// A Job's WorkerRuns, ascending by id (spec §4.J).
    #[must_use]
    pub fn list_worker_runs(&self, job_id: u64) -> Vec<WorkerRun> {
        let mut runs = self.worker_runs.lock().expect("poisoned").get(&job_id).cloned().unwrap_or_default();
        runs.sort_by_key(|r| r.id);
        runs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arc_core::{build_stable_key, Limits, Strategy};
    use std::collections::BTreeMap;

    fn sample_property() -> ResearchProperty {
        let now = Utc::now();
        ResearchProperty {
            id: 0,
            stable_key: build_stable_key("123 Main St", Some("Newark"), Some("NJ"), Some("07102"), None),
            raw_address: "123 Main St".into(),
            normalized_address: "123 main st, newark, NJ, 07102".into(),
            city: Some("Newark".into()),
            state: Some("NJ".into()),
            zip_code: Some("07102".into()),
            apn: None,
            geo_lat: None,
            geo_lng: None,
            latest_profile: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn sample_job(property_id: u64) -> Job {
        let now = Utc::now();
        Job {
            id: 0,
            trace_id: "abcdef0123456789".into(),
            research_property_id: property_id,
            status: JobStatus::Pending,
            progress: 0,
            current_step: None,
            strategy: Strategy::Wholesale,
            assumptions: BTreeMap::new(),
            limits: Limits::default(),
            results: None,
            error_message: None,
            started_at: None,
            completed_at: None,
            created_at: now,
        }
    }

    #[test]
    fn upsert_property_is_idempotent_by_stable_key() {
        let store = Store::new();
        let id1 = store.upsert_property(sample_property());
        let id2 = store.upsert_property(sample_property());
        assert_eq!(id1, id2);
    }

    #[test]
    fn evidence_upsert_replaces_in_place_by_hash() {
        let store = Store::new();
        let property_id = store.upsert_property(sample_property());
        let job_a = store.create_job(sample_job(property_id));
        let job_b = store.create_job(sample_job(property_id));

        let draft = EvidenceDraft::new("flood_zone", "same claim", "https://example.com", None, 0.8);
        let first = store.upsert_evidence_draft(job_a, property_id, &draft, Utc::now());
        let second_time = Utc::now() + chrono::Duration::seconds(5);
        let second = store.upsert_evidence_draft(job_b, property_id, &draft, second_time);

        assert_eq!(first.id, second.id);
        assert_eq!(store.list_evidence_for_property(property_id).len(), 1);
        assert_eq!(second.job_id, job_b);
        assert_eq!(second.captured_at, second_time);
    }

    #[test]
    fn replace_comp_sales_overwrites_prior_rows() {
        let store = Store::new();
        let property_id = store.upsert_property(sample_property());
        let job_id = store.create_job(sample_job(property_id));

        let comp = |score: f64| arc_core::CompSale {
            id: 0,
            research_property_id: property_id,
            job_id,
            address: "1 Elm St".into(),
            distance_mi: Some(0.5),
            sale_date: None,
            sale_price: Some(400_000.0),
            sqft: Some(1500),
            beds: Some(3),
            baths: Some(2.0),
            year_built: None,
            similarity_score: score,
            source_url: "internal://crm/1".into(),
            details: arc_core::CompDetails { origin: arc_core::CompOrigin::Internal, source_quality: 0.95, effective_score: score },
        };

        store.replace_comp_sales(job_id, vec![comp(0.5)]);
        assert_eq!(store.list_comp_sales(job_id).len(), 1);
        store.replace_comp_sales(job_id, vec![comp(0.9), comp(0.3)]);
        let comps = store.list_comp_sales(job_id);
        assert_eq!(comps.len(), 2);
        assert!(comps[0].similarity_score >= comps[1].similarity_score);
    }

    #[test]
    fn worker_runs_accumulate_in_insertion_order() {
        let store = Store::new();
        let property_id = store.upsert_property(sample_property());
        let job_id = store.create_job(sample_job(property_id));

        let make_run = |name: &str| WorkerRun {
            id: 0,
            job_id,
            worker_name: name.into(),
            status: arc_core::WorkerStatus::Success,
            runtime_ms: 10,
            cost_usd: 0.0,
            web_calls: 0,
            data: serde_json::json!({}),
            unknowns: vec![],
            errors: vec![],
        };
        store.record_worker_run(job_id, make_run("normalize_geocode"));
        store.record_worker_run(job_id, make_run("comps_sales"));
        let runs = store.list_worker_runs(job_id);
        assert_eq!(runs.iter().map(|r| r.worker_name.as_str()).collect::<Vec<_>>(), vec!["normalize_geocode", "comps_sales"]);
    }
}
