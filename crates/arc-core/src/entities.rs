//! Domain entities and their invariants (spec §3).

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Investment framing for a [`Job`] (glossary: Strategy).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Assign the contract to another buyer without taking title.
    Wholesale,
    /// Buy, renovate, and resell.
    Flip,
    /// Buy and hold for rental income.
    Rental,
}

impl Default for Strategy {
    fn default() -> Self {
        Self::Wholesale
    }
}

/// Rehab scope tier used by the underwriting worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RehabTier {
    /// Cosmetic-only rehab.
    Light,
    /// Kitchens/baths/systems rehab.
    Medium,
    /// Full gut rehab.
    Heavy,
}

impl Default for RehabTier {
    fn default() -> Self {
        Self::Medium
    }
}

impl RehabTier {
    /// Coerce a free-form tier string, defaulting to [`RehabTier::Medium`]
    /// for anything unrecognized (spec §4.E.4).
    #[must_use]
    pub fn coerce(raw: &str) -> Self {
        match raw {
            "light" => Self::Light,
            "heavy" => Self::Heavy,
            _ => Self::Medium,
        }
    }

    /// Dollar-per-square-foot rate for this tier.
    #[must_use]
    pub fn per_sqft_rate(self) -> f64 {
        match self {
            Self::Light => 15.0,
            Self::Medium => 35.0,
            Self::Heavy => 60.0,
        }
    }
}

/// How a [`Job`] schedules its workers (spec §4.H).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Fixed linear ordering of the 9 core workers, effectively serial.
    Pipeline,
    /// Full dependency graph, optionally widened by `extra_agents`.
    Orchestrated,
}

impl Default for ExecutionMode {
    fn default() -> Self {
        Self::Pipeline
    }
}

/// Lifecycle state of a [`Job`]. Terminal states (`Completed`, `Failed`) are
/// immutable once reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created but not yet started.
    Pending,
    /// Currently executing workers.
    InProgress,
    /// Finished successfully; `results` is populated.
    Completed,
    /// Finished with an error; `error_message` is populated.
    Failed,
}

/// Resource limits enforced by the scheduler (spec §5, §6.1).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Limits {
    /// Maximum number of workers executed for this Job.
    pub max_steps: u32,
    /// Cumulative external-call budget across all workers.
    pub max_web_calls: u32,
    /// Per-worker timeout.
    pub timeout_seconds_per_step: u32,
    /// Cap on workers running concurrently within one scheduler batch.
    pub max_parallel_agents: u32,
    /// Scheduling strategy for this Job.
    pub execution_mode: ExecutionMode,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_steps: 9,
            max_web_calls: 30,
            timeout_seconds_per_step: 20,
            max_parallel_agents: 1,
            execution_mode: ExecutionMode::Pipeline,
        }
    }
}

/// Canonical identity of a researched parcel (spec §3.1).
///
/// `stable_key` is immutable once set; everything else may be refreshed by a
/// later Job that supplies a fresher profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchProperty {
    /// Repository-assigned identifier.
    pub id: u64,
    /// SHA-256 of `normalize_address(...) | lower(apn)`. Immutable.
    pub stable_key: String,
    /// Address exactly as supplied by the caller.
    pub raw_address: String,
    /// Canonical form produced by [`crate::address::normalize_address`].
    pub normalized_address: String,
    /// City, if known.
    pub city: Option<String>,
    /// Two-letter state code, if known.
    pub state: Option<String>,
    /// ZIP code, if known.
    pub zip_code: Option<String>,
    /// Assessor's Parcel Number, if known.
    pub apn: Option<String>,
    /// Latitude, once geocoded.
    pub geo_lat: Option<f64>,
    /// Longitude, once geocoded.
    pub geo_lng: Option<f64>,
    /// Opaque structured snapshot populated by the geocode worker.
    pub latest_profile: Option<serde_json::Value>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last-updated timestamp.
    pub updated_at: DateTime<Utc>,
}

/// One execution of the pipeline (spec §3.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Repository-assigned identifier.
    pub id: u64,
    /// 16-hex trace id used to correlate logs.
    pub trace_id: String,
    /// Owning [`ResearchProperty`].
    pub research_property_id: u64,
    /// Current lifecycle state.
    pub status: JobStatus,
    /// Completion percentage, 0-100.
    pub progress: u8,
    /// Name of the worker currently (or most recently) executing.
    pub current_step: Option<String>,
    /// Investment framing for this run.
    pub strategy: Strategy,
    /// Free-form assumption overrides (validated by `arc-config`).
    pub assumptions: BTreeMap<String, serde_json::Value>,
    /// Resource limits for this run.
    pub limits: Limits,
    /// Final output envelope, once completed.
    pub results: Option<serde_json::Value>,
    /// Failure reason, once failed.
    pub error_message: Option<String>,
    /// When the Job transitioned to `in_progress`.
    pub started_at: Option<DateTime<Utc>>,
    /// When the Job reached a terminal state.
    pub completed_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// An atomic, content-addressed provenance record (spec §3.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceItem {
    /// Repository-assigned identifier.
    pub id: u64,
    /// Owning [`ResearchProperty`].
    pub research_property_id: u64,
    /// Owning [`Job`] (rebound on replace-in-place).
    pub job_id: u64,
    /// Evidence category (e.g. `"flood_zone"`, `"owner"`).
    pub category: String,
    /// The human-readable claim this evidence backs.
    pub claim: String,
    /// Where this evidence came from.
    pub source_url: String,
    /// When this evidence was (re-)captured.
    pub captured_at: DateTime<Utc>,
    /// Optional raw excerpt backing the claim.
    pub raw_excerpt: Option<String>,
    /// Confidence in `[0, 1]`.
    pub confidence: Option<f64>,
    /// SHA-256 over the canonicalized `(category, claim, source_url,
    /// raw_excerpt)` tuple. Unique; drives replace-in-place semantics.
    pub hash: String,
}

/// A draft evidence record emitted by a worker, before persistence assigns
/// it an id / rebinds it to a Job (spec §4.D).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceDraft {
    /// Evidence category.
    pub category: String,
    /// The claim this evidence backs.
    pub claim: String,
    /// Source URL (or `internal://...` pseudo-URL).
    pub source_url: String,
    /// Optional raw excerpt.
    pub raw_excerpt: Option<String>,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
}

impl EvidenceDraft {
    /// Convenience constructor.
    pub fn new(
        category: impl Into<String>,
        claim: impl Into<String>,
        source_url: impl Into<String>,
        raw_excerpt: Option<String>,
        confidence: f64,
    ) -> Self {
        Self {
            category: category.into(),
            claim: claim.into(),
            source_url: source_url.into(),
            raw_excerpt,
            confidence,
        }
    }

    /// The content-address hash for this draft (spec §4.A).
    #[must_use]
    pub fn hash(&self) -> String {
        crate::address::build_evidence_hash(
            &self.category,
            &self.claim,
            &self.source_url,
            self.raw_excerpt.as_deref(),
        )
    }
}

/// Origin of a selected comparable (spec §3.1 `details.origin`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompOrigin {
    /// Sourced from the internal CRM dataset.
    Internal,
    /// Extracted from an external search-provider hit.
    External,
}

/// Per-comp scoring/provenance detail (spec §3.1 `CompSale/CompRental.details`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompDetails {
    /// Where the candidate came from.
    pub origin: CompOrigin,
    /// Source-quality score for `source_url` (spec §4.C).
    pub source_quality: f64,
    /// `0.85 * similarity_score + 0.15 * source_quality`, rounded to 6 dp.
    pub effective_score: f64,
}

/// A selected comparable sale (spec §3.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompSale {
    /// Repository-assigned identifier.
    pub id: u64,
    /// Owning [`ResearchProperty`].
    pub research_property_id: u64,
    /// Owning [`Job`].
    pub job_id: u64,
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
    /// Scoring/provenance detail.
    pub details: CompDetails,
}

/// A selected comparable rental (spec §3.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompRental {
    /// Repository-assigned identifier.
    pub id: u64,
    /// Owning [`ResearchProperty`].
    pub research_property_id: u64,
    /// Owning [`Job`].
    pub job_id: u64,
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
    /// Scoring/provenance detail.
    pub details: CompDetails,
}

/// A tri-range estimate (`low`/`base`/`high`), used throughout underwriting.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, JsonSchema)]
pub struct Range3 {
    /// Pessimistic bound.
    pub low: Option<f64>,
    /// Point estimate.
    pub base: Option<f64>,
    /// Optimistic bound.
    pub high: Option<f64>,
}

/// One row of the fixed underwriting sensitivity table (spec §4.E.4).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SensitivityRow {
    /// Scenario name.
    pub scenario: String,
    /// ARV multiplier applied in this scenario.
    pub arv_multiplier: f64,
    /// Rent multiplier applied in this scenario.
    pub rent_multiplier: f64,
    /// Offer-price adjustment applied in this scenario.
    pub offer_adjustment: f64,
}

/// Per-Job deterministic valuation record (spec §3.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Underwriting {
    /// Owning [`ResearchProperty`].
    pub research_property_id: u64,
    /// Owning [`Job`].
    pub job_id: u64,
    /// Investment framing used for the offer formula.
    pub strategy: Strategy,
    /// ARV tri-range.
    pub arv_estimate: Range3,
    /// Rent tri-range.
    pub rent_estimate: Range3,
    /// Rehab scope tier.
    pub rehab_tier: RehabTier,
    /// Rehab cost tri-range.
    pub rehab_estimated_range: Range3,
    /// Recommended offer tri-range. `base` may be negative (spec §3.2).
    pub offer_price_recommendation: Range3,
    /// Itemized fee map plus `total`.
    pub fees: BTreeMap<String, f64>,
    /// Fixed three-scenario sensitivity table.
    pub sensitivity_table: Vec<SensitivityRow>,
}

/// Per-Job risk record (spec §3.1, §4.G).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskScore {
    /// Owning [`ResearchProperty`].
    pub research_property_id: u64,
    /// Owning [`Job`].
    pub job_id: u64,
    /// Title risk in `[0, 1]`.
    pub title_risk: f64,
    /// Overall data confidence in `[0, 1]`.
    pub data_confidence: f64,
    /// Compliance flags raised by contradiction checks.
    pub compliance_flags: Vec<String>,
    /// Human-readable notes.
    pub notes: String,
}

/// Per-Job narrative memo (spec §3.1, §4.E.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dossier {
    /// Owning [`ResearchProperty`].
    pub research_property_id: u64,
    /// Owning [`Job`].
    pub job_id: u64,
    /// Rendered markdown.
    pub markdown: String,
    /// Citations referencing evidence records.
    pub citations: Vec<Citation>,
}

/// One citation line in a [`Dossier`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    /// Referenced evidence id.
    pub evidence_id: u64,
    /// The evidence's source URL, copied for convenience.
    pub source_url: String,
}

/// Status of a single worker's execution envelope (spec §4.D).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    /// Completed with no errors.
    Success,
    /// Completed with non-empty `errors`.
    Partial,
    /// Timed out or raised an uncaught error.
    Failed,
}

/// Per-Job, per-Worker telemetry row (spec §3.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRun {
    /// Repository-assigned identifier.
    pub id: u64,
    /// Owning [`Job`].
    pub job_id: u64,
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
    /// Worker-specific JSON payload.
    pub data: serde_json::Value,
    /// Gaps worth surfacing.
    pub unknowns: Vec<Unknown>,
    /// Non-fatal issues (or the fatal one, on `failed`).
    pub errors: Vec<String>,
}

/// A single reported data gap (spec §4.D).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Unknown {
    /// Name of the field that could not be resolved.
    pub field: String,
    /// Why it could not be resolved.
    pub reason: String,
}
