//! Output Assembler (spec §4.J, §6.4): reads every per-Job table out of the
//! store and renders the canonical `ResearchOutput` envelope a caller
//! actually sees. None of this persists anything; it is a pure read+shape
//! step over data the pipeline already wrote.

use arc_core::{CompRental, CompSale, EvidenceItem, RiskScore, Underwriting, WorkerRun, WorkerStatus};
use arc_store::Store;
use schemars::JsonSchema;
use serde::Serialize;
use serde_json::Value;

/// One evidence record in the envelope (spec §6.4 `evidence[]`), renaming
/// `research_property_id` to `property_id`.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct EvidenceOutput {
    /// Repository-assigned identifier.
    pub id: u64,
    /// Owning property.
    pub property_id: u64,
    /// Evidence category (`"input"`, `"geocode"`, `"comp_sale"`, ...).
    pub category: String,
    /// The claim this evidence backs.
    pub claim: String,
    /// Where the claim was sourced from.
    pub source_url: String,
    /// When the claim was captured.
    pub captured_at: chrono::DateTime<chrono::Utc>,
    /// Raw excerpt backing the claim, if any.
    pub raw_excerpt: Option<String>,
    /// Confidence in `[0, 1]`, if scored.
    pub confidence: Option<f64>,
    /// Dedup hash over category/claim/source/excerpt.
    pub hash: String,
}

impl From<EvidenceItem> for EvidenceOutput {
    fn from(e: EvidenceItem) -> Self {
        Self {
            id: e.id,
            property_id: e.research_property_id,
            category: e.category,
            claim: e.claim,
            source_url: e.source_url,
            captured_at: e.captured_at,
            raw_excerpt: e.raw_excerpt,
            confidence: e.confidence,
            hash: e.hash,
        }
    }
}

/// One comparable sale (spec §6.4 `comps_sales[]`), dropping the internal
/// ids and provenance `details` the envelope doesn't surface.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct CompSaleOutput {
    /// Comparable's address.
    pub address: String,
    /// Distance proxy in miles from the target.
    pub distance_mi: Option<f64>,
    /// Sale date.
    pub sale_date: Option<chrono::NaiveDate>,
    /// Sale price.
    pub sale_price: Option<f64>,
    /// Square footage.
    pub sqft: Option<i64>,
    /// Bedroom count.
    pub beds: Option<i64>,
    /// Bathroom count.
    pub baths: Option<f64>,
    /// Year built.
    pub year_built: Option<i64>,
    /// Similarity score in `[0, 1]`.
    pub similarity_score: f64,
    /// Source URL.
    pub source_url: String,
}

impl From<CompSale> for CompSaleOutput {
    fn from(c: CompSale) -> Self {
        Self {
            address: c.address,
            distance_mi: c.distance_mi,
            sale_date: c.sale_date,
            sale_price: c.sale_price,
            sqft: c.sqft,
            beds: c.beds,
            baths: c.baths,
            year_built: c.year_built,
            similarity_score: c.similarity_score,
            source_url: c.source_url,
        }
    }
}

/// One comparable rental (spec §6.4 `comps_rentals[]`).
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct CompRentalOutput {
    /// Comparable's address.
    pub address: String,
    /// Distance proxy in miles from the target.
    pub distance_mi: Option<f64>,
    /// Date listed.
    pub date_listed: Option<chrono::NaiveDate>,
    /// Monthly rent.
    pub rent: Option<f64>,
    /// Square footage.
    pub sqft: Option<i64>,
    /// Bedroom count.
    pub beds: Option<i64>,
    /// Bathroom count.
    pub baths: Option<f64>,
    /// Similarity score in `[0, 1]`.
    pub similarity_score: f64,
    /// Source URL.
    pub source_url: String,
}

impl From<CompRental> for CompRentalOutput {
    fn from(c: CompRental) -> Self {
        Self {
            address: c.address,
            distance_mi: c.distance_mi,
            date_listed: c.date_listed,
            rent: c.rent,
            sqft: c.sqft,
            beds: c.beds,
            baths: c.baths,
            similarity_score: c.similarity_score,
            source_url: c.source_url,
        }
    }
}

/// The underwriting block (spec §6.4 `underwrite`), dropping `strategy`
/// (already known from the Job) and the internal ids.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct UnderwriteOutput {
    /// ARV tri-range.
    pub arv_estimate: arc_core::Range3,
    /// Rent tri-range.
    pub rent_estimate: arc_core::Range3,
    /// Rehab scope tier.
    pub rehab_tier: arc_core::RehabTier,
    /// Rehab cost tri-range.
    pub rehab_estimated_range: arc_core::Range3,
    /// Recommended offer tri-range.
    pub offer_price_recommendation: arc_core::Range3,
    /// Itemized fee map plus `total`.
    pub fees: std::collections::BTreeMap<String, f64>,
    /// Fixed three-scenario sensitivity table.
    pub sensitivity_table: Vec<arc_core::SensitivityRow>,
}

impl From<Underwriting> for UnderwriteOutput {
    fn from(u: Underwriting) -> Self {
        Self {
            arv_estimate: u.arv_estimate,
            rent_estimate: u.rent_estimate,
            rehab_tier: u.rehab_tier,
            rehab_estimated_range: u.rehab_estimated_range,
            offer_price_recommendation: u.offer_price_recommendation,
            fees: u.fees,
            sensitivity_table: u.sensitivity_table,
        }
    }
}

/// The risk block (spec §6.4 `risk_score`).
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct RiskScoreOutput {
    /// Title risk in `[0, 1]`.
    pub title_risk: f64,
    /// Overall data confidence in `[0, 1]`.
    pub data_confidence: f64,
    /// Compliance flags raised by contradiction checks.
    pub compliance_flags: Vec<String>,
    /// Human-readable notes.
    pub notes: String,
}

impl From<RiskScore> for RiskScoreOutput {
    fn from(r: RiskScore) -> Self {
        Self { title_risk: r.title_risk, data_confidence: r.data_confidence, compliance_flags: r.compliance_flags, notes: r.notes }
    }
}

/// One worker's telemetry row (spec §6.4 `worker_runs[]`), dropping the
/// internal ids and the raw `data` payload (already folded into the
/// envelope's own fields where one exists).
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct WorkerRunOutput {
    /// Registered worker name.
    pub worker_name: String,
    /// Execution outcome.
    pub status: WorkerStatus,
    /// Wall-clock runtime in milliseconds.
    pub runtime_ms: u64,
    /// Monetary cost attributed to this run.
    pub cost_usd: f64,
    /// Number of external calls made.
    pub web_calls: u32,
    /// Gaps worth surfacing.
    pub unknowns: Vec<arc_core::Unknown>,
    /// Non-fatal issues (or the fatal one, on `failed`).
    pub errors: Vec<String>,
}

impl From<WorkerRun> for WorkerRunOutput {
    fn from(w: WorkerRun) -> Self {
        Self { worker_name: w.worker_name, status: w.status, runtime_ms: w.runtime_ms, cost_usd: w.cost_usd, web_calls: w.web_calls, unknowns: w.unknowns, errors: w.errors }
    }
}

/// Worker names whose `WorkerRun.data` feeds the top-level `neighborhood_intel`
/// and `flood_zone` optional fields, as opposed to the `extensive` group.
const NEIGHBORHOOD_WORKER: &str = "neighborhood_intel";
const FLOOD_ZONE_WORKER: &str = "flood_zone";

/// Worker name -> `extensive` envelope key, for the eleven workers with no
/// dedicated table (spec §4.J: "Extracts per-worker 'data' from WorkerRun.data
/// for environmental/extra workers that have no dedicated table").
const EXTENSIVE_WORKERS: &[(&str, &str)] = &[
    ("epa_environmental", "epa_environmental"),
    ("wildfire_hazard", "wildfire_hazard"),
    ("hud_opportunity", "hud_opportunity"),
    ("wetlands", "wetlands"),
    ("historic_places", "historic_places"),
    ("seismic_hazard", "seismic_hazard"),
    ("school_district", "school_district"),
    ("us_real_estate", "us_real_estate"),
    ("walk_score", "walk_score"),
    ("redfin", "redfin"),
    ("rentcast", "rentcast"),
];

/// The dossier block (spec §6.4 `dossier`).
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct DossierOutput {
    /// Rendered markdown, including citations.
    pub markdown: String,
}

/// The full canonical research envelope a caller receives (spec §6.4).
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ResearchOutput {
    /// The geocode worker's published profile, or `null` if it never ran.
    pub property_profile: Option<Value>,
    /// All evidence for the property, ascending by id.
    pub evidence: Vec<EvidenceOutput>,
    /// Comparable sales, descending by similarity.
    pub comps_sales: Vec<CompSaleOutput>,
    /// Comparable rentals, descending by similarity.
    pub comps_rentals: Vec<CompRentalOutput>,
    /// The Job's underwriting record, if that worker ran.
    pub underwrite: Option<UnderwriteOutput>,
    /// The Job's risk score, if that worker ran.
    pub risk_score: Option<RiskScoreOutput>,
    /// Neighborhood AI summary, if `neighborhood_intel` ran.
    pub neighborhood_intel: Option<Value>,
    /// Flood zone lookup, if `flood_zone` ran.
    pub flood_zone: Option<Value>,
    /// The eleven `extra_agents: ["extensive"]` workers that ran, keyed by
    /// worker name; `None` entirely when none of them ran.
    pub extensive: Option<std::collections::BTreeMap<String, Value>>,
    /// The rendered dossier, if `dossier_writer` ran.
    pub dossier: Option<DossierOutput>,
    /// Every worker's telemetry, ascending by id.
    pub worker_runs: Vec<WorkerRunOutput>,
}

/// Assemble the envelope for one completed (or still-running) Job (spec
/// §4.J). Reads are best-effort: a worker that never ran simply leaves its
/// field `None`/empty rather than erroring.
#[must_use]
pub fn assemble_output(store: &Store, property_id: u64, job_id: u64) -> ResearchOutput {
    let property_profile = store.get_property(property_id).and_then(|p| p.latest_profile);

    let evidence = store.list_evidence_for_property(property_id).into_iter().map(EvidenceOutput::from).collect();
    let comps_sales = store.list_comp_sales(job_id).into_iter().map(CompSaleOutput::from).collect();
    let comps_rentals = store.list_comp_rentals(job_id).into_iter().map(CompRentalOutput::from).collect();
    let underwrite = store.get_underwriting(job_id).map(UnderwriteOutput::from);
    let risk_score = store.get_risk_score(job_id).map(RiskScoreOutput::from);
    let dossier = store.get_dossier(job_id).map(|d| DossierOutput { markdown: d.markdown });

    let worker_runs = store.list_worker_runs(job_id);

    let neighborhood_intel = worker_runs.iter().find(|w| w.worker_name == NEIGHBORHOOD_WORKER).map(|w| w.data.clone());
    let flood_zone = worker_runs.iter().find(|w| w.worker_name == FLOOD_ZONE_WORKER).map(|w| w.data.clone());

    let mut extensive = std::collections::BTreeMap::new();
    for run in &worker_runs {
        if let Some((_, key)) = EXTENSIVE_WORKERS.iter().find(|(name, _)| *name == run.worker_name) {
            extensive.insert((*key).to_string(), run.data.clone());
        }
    }
    let extensive = (!extensive.is_empty()).then_some(extensive);

    let worker_runs = worker_runs.into_iter().map(WorkerRunOutput::from).collect();

    ResearchOutput {
        property_profile,
        evidence,
        comps_sales,
        comps_rentals,
        underwrite,
        risk_score,
        neighborhood_intel,
        flood_zone,
        extensive,
        dossier,
        worker_runs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arc_core::{Job, RehabTier, Range3, ResearchProperty, Strategy, Underwriting as UnderwritingEntity, WorkerRun as WorkerRunEntity};
    use chrono::Utc;

    fn sample_property() -> ResearchProperty {
        ResearchProperty {
            id: 0,
            stable_key: "key".into(),
            raw_address: "1 Main St".into(),
            normalized_address: "1 Main St".into(),
            city: None,
            state: None,
            zip_code: None,
            apn: None,
            geo_lat: None,
            geo_lng: None,
            latest_profile: Some(serde_json::json!({"normalized_address": "1 Main St"})),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn sample_job(property_id: u64) -> Job {
        Job {
            id: 0,
            trace_id: "trace".into(),
            research_property_id: property_id,
            status: arc_core::JobStatus::InProgress,
            progress: 0,
            current_step: None,
            strategy: Strategy::Wholesale,
            assumptions: Default::default(),
            limits: arc_core::Limits::default(),
            results: None,
            error_message: None,
            started_at: None,
            completed_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn assembles_empty_envelope_when_nothing_ran() {
        let store = Store::new();
        let property_id = store.upsert_property(sample_property());
        let job_id = store.create_job(sample_job(property_id));

        let out = assemble_output(&store, property_id, job_id);
        assert!(out.evidence.is_empty());
        assert!(out.underwrite.is_none());
        assert!(out.extensive.is_none());
        assert!(out.dossier.is_none());
        assert!(out.property_profile.is_some());
    }

    #[test]
    fn folds_environmental_worker_runs_into_extensive_map() {
        let store = Store::new();
        let property_id = store.upsert_property(sample_property());
        let job_id = store.create_job(sample_job(property_id));

        store.record_worker_run(
            job_id,
            WorkerRunEntity {
                id: 0,
                job_id,
                worker_name: "walk_score".into(),
                status: WorkerStatus::Success,
                runtime_ms: 10,
                cost_usd: 0.0,
                web_calls: 1,
                data: serde_json::json!({"score": 82}),
                unknowns: vec![],
                errors: vec![],
            },
        );
        store.record_worker_run(
            job_id,
            WorkerRunEntity {
                id: 0,
                job_id,
                worker_name: "flood_zone".into(),
                status: WorkerStatus::Success,
                runtime_ms: 10,
                cost_usd: 0.0,
                web_calls: 1,
                data: serde_json::json!({"zone": "X"}),
                unknowns: vec![],
                errors: vec![],
            },
        );

        let out = assemble_output(&store, property_id, job_id);
        let extensive = out.extensive.expect("walk_score should populate extensive");
        assert_eq!(extensive.get("walk_score").and_then(|v| v.get("score")), Some(&serde_json::json!(82)));
        assert_eq!(out.flood_zone.and_then(|v| v.get("zone").cloned()), Some(serde_json::json!("X")));
        assert_eq!(out.worker_runs.len(), 2);
    }

    #[test]
    fn underwriting_and_risk_round_trip_into_output_dtos() {
        let store = Store::new();
        let property_id = store.upsert_property(sample_property());
        let job_id = store.create_job(sample_job(property_id));

        store.upsert_underwriting(
            job_id,
            UnderwritingEntity {
                research_property_id: property_id,
                job_id,
                strategy: Strategy::Flip,
                arv_estimate: Range3 { low: Some(200_000.0), base: Some(220_000.0), high: Some(240_000.0) },
                rent_estimate: Range3 { low: None, base: None, high: None },
                rehab_tier: RehabTier::Medium,
                rehab_estimated_range: Range3 { low: Some(10_000.0), base: Some(15_000.0), high: Some(20_000.0) },
                offer_price_recommendation: Range3 { low: Some(150_000.0), base: Some(160_000.0), high: Some(170_000.0) },
                fees: Default::default(),
                sensitivity_table: vec![],
            },
        );

        let out = assemble_output(&store, property_id, job_id);
        let underwrite = out.underwrite.expect("underwriting should be present");
        assert_eq!(underwrite.arv_estimate.base, Some(220_000.0));
    }
}
