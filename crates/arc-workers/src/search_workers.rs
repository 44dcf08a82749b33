//! Exa-style search workers for public records, permits/violations, and
//! subdivision zoning research (spec §4.E.2, grounded on `public_records.py`).

use arc_adapters::{SearchHit, SearchProvider};
use arc_core::{source_quality_score, EvidenceDraft, Unknown};
use arc_protocol::{Worker, WorkerContext, WorkerOutput};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

/// One search hit annotated with its resolved source-quality score.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredHit {
    /// Hit title.
    pub title: String,
    /// Hit URL.
    pub url: String,
    /// Hit snippet, truncated per worker.
    pub snippet: String,
    /// Resolved source-quality score.
    pub source_quality: f64,
}

async fn search_and_score(search: &dyn SearchProvider, query: &str, max_results: usize, include_text: bool, category: &str) -> Vec<SearchHit> {
    let mut hits = search.search(query, max_results, include_text).await;
    hits.sort_by(|a, b| {
        source_quality_score(Some(b.url.as_str()), Some(category))
            .partial_cmp(&source_quality_score(Some(a.url.as_str()), Some(category)))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    hits
}

/// `public_records`.
pub struct PublicRecords {
    search: Arc<dyn SearchProvider>,
}

impl PublicRecords {
    /// Build against a search-provider adapter.
    #[must_use]
    pub fn new(search: Arc<dyn SearchProvider>) -> Self {
        Self { search }
    }
}

#[async_trait]
impl Worker for PublicRecords {
    fn name(&self) -> &str {
        "public_records"
    }

    async fn run(&self, ctx: &WorkerContext) -> Result<WorkerOutput, String> {
        let property = ctx.store.get_property(ctx.job.research_property_id).ok_or_else(|| "Research property not found".to_string())?;
        let query = format!("{} assessor recorder parcel", property.normalized_address);
        let hits = search_and_score(self.search.as_ref(), &query, 5, false, "public_records").await;

        let mut evidence = Vec::new();
        let mut unknowns = Vec::new();
        if hits.is_empty() {
            unknowns.push(Unknown { field: "public_records".into(), reason: "No public records hits returned by configured search provider.".into() });
        }

        let scored: Vec<ScoredHit> = hits
            .into_iter()
            .map(|hit| {
                let source_quality = source_quality_score(Some(hit.url.as_str()), Some("public_records"));
                evidence.push(EvidenceDraft::new(
                    "public_records",
                    format!("Public records candidate found: {}.", hit.title),
                    hit.url.clone(),
                    Some(hit.snippet.clone()),
                    source_quality,
                ));
                ScoredHit { title: hit.title, url: hit.url, snippet: hit.snippet, source_quality }
            })
            .collect();

        Ok(WorkerOutput {
            data: serde_json::json!({ "public_records_hits": scored }),
            unknowns,
            errors: Vec::new(),
            evidence,
            web_calls: 1,
            cost_usd: 0.0,
        })
    }
}

/// `permits_violations`.
pub struct PermitsViolations {
    search: Arc<dyn SearchProvider>,
}

impl PermitsViolations {
    /// Build against a search-provider adapter.
    #[must_use]
    pub fn new(search: Arc<dyn SearchProvider>) -> Self {
        Self { search }
    }
}

#[async_trait]
impl Worker for PermitsViolations {
    fn name(&self) -> &str {
        "permits_violations"
    }

    async fn run(&self, ctx: &WorkerContext) -> Result<WorkerOutput, String> {
        let property = ctx.store.get_property(ctx.job.research_property_id).ok_or_else(|| "Research property not found".to_string())?;
        let query = format!("{} permits violations open data", property.normalized_address);
        let hits = search_and_score(self.search.as_ref(), &query, 5, false, "permits").await;

        let mut evidence = Vec::new();
        let mut unknowns = Vec::new();
        if hits.is_empty() {
            unknowns.push(Unknown { field: "permits_violations".into(), reason: "No permit or violation records returned by configured search provider.".into() });
        }

        let scored: Vec<ScoredHit> = hits
            .into_iter()
            .map(|hit| {
                let source_quality = source_quality_score(Some(hit.url.as_str()), Some("permits"));
                evidence.push(EvidenceDraft::new(
                    "permits",
                    format!("Permit/violation source candidate found: {}.", hit.title),
                    hit.url.clone(),
                    Some(hit.snippet.clone()),
                    source_quality,
                ));
                ScoredHit { title: hit.title, url: hit.url, snippet: hit.snippet, source_quality }
            })
            .collect();

        Ok(WorkerOutput {
            data: serde_json::json!({ "permit_violation_hits": scored }),
            unknowns,
            errors: Vec::new(),
            evidence,
            web_calls: 1,
            cost_usd: 0.0,
        })
    }
}

/// `subdivision_research` (opt-in via `extra_agents: ["subdivision_research"]`).
pub struct SubdivisionResearch {
    search: Arc<dyn SearchProvider>,
}

impl SubdivisionResearch {
    /// Build against a search-provider adapter.
    #[must_use]
    pub fn new(search: Arc<dyn SearchProvider>) -> Self {
        Self { search }
    }
}

#[async_trait]
impl Worker for SubdivisionResearch {
    fn name(&self) -> &str {
        "subdivision_research"
    }

    async fn run(&self, ctx: &WorkerContext) -> Result<WorkerOutput, String> {
        let property = ctx.store.get_property(ctx.job.research_property_id).ok_or_else(|| "Research property not found".to_string())?;
        let assumptions = crate::resolved_assumptions(&ctx.job);
        let goal = assumptions.subdivision_goal.clone().unwrap_or_else(|| "subdivide and build".to_string());
        let query = format!(
            "{}, {} {} {} zoning minimum lot size frontage subdivision requirements {}",
            property.raw_address,
            property.city.as_deref().unwrap_or(""),
            property.state.as_deref().unwrap_or(""),
            property.zip_code.as_deref().unwrap_or(""),
            goal
        )
        .trim()
        .to_string();

        let hits = search_and_score(self.search.as_ref(), &query, 8, true, "subdivision").await;

        let mut evidence = Vec::new();
        let mut unknowns = Vec::new();
        if hits.is_empty() {
            unknowns.push(Unknown { field: "subdivision_research".into(), reason: "No subdivision sources returned by configured search provider.".into() });
        }

        let scored: Vec<ScoredHit> = hits
            .into_iter()
            .take(8)
            .map(|hit| {
                let snippet: String = hit.snippet.chars().take(500).collect();
                let source_quality = source_quality_score(Some(hit.url.as_str()), Some("subdivision"));
                evidence.push(EvidenceDraft::new(
                    "subdivision",
                    format!("Subdivision source candidate found: {}.", hit.title),
                    hit.url.clone(),
                    Some(snippet.clone()),
                    source_quality,
                ));
                ScoredHit { title: hit.title, url: hit.url, snippet, source_quality }
            })
            .collect();

        Ok(WorkerOutput {
            data: serde_json::json!({
                "subdivision_research": { "goal": goal, "query": query, "hits": scored }
            }),
            unknowns,
            errors: Vec::new(),
            evidence,
            web_calls: 1,
            cost_usd: 0.0,
        })
    }
}
