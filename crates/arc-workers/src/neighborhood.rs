//! `neighborhood_intel`: crime, schools, and market-trend searches with an
//! optional AI-written summary (spec §4.H, grounded on `neighborhood.py`).

use arc_adapters::{NarrativeLlm, SearchProvider};
use arc_core::{source_quality_score, EvidenceDraft, Unknown};
use arc_protocol::{Worker, WorkerContext, WorkerOutput};
use async_trait::async_trait;
use std::sync::Arc;

const SEARCH_MAX_RESULTS: usize = 5;
const SUMMARY_MODEL: &str = "claude-sonnet-4-5-20250929";
const SUMMARY_MAX_TOKENS: u32 = 600;

struct SearchSection {
    key: &'static str,
    category: &'static str,
    claim_prefix: &'static str,
    query_suffix: &'static str,
}

const SECTIONS: &[SearchSection] = &[
    SearchSection { key: "crime", category: "neighborhood_crime", claim_prefix: "Crime data source found:", query_suffix: "crime statistics safety" },
    SearchSection { key: "schools", category: "neighborhood_schools", claim_prefix: "School quality source found:", query_suffix: "school ratings greatschools" },
    SearchSection { key: "market_trends", category: "neighborhood_market", claim_prefix: "Market trend source found:", query_suffix: "housing market trends home values" },
];

/// `neighborhood_intel`.
pub struct NeighborhoodIntel {
    search: Arc<dyn SearchProvider>,
    llm: Arc<dyn NarrativeLlm>,
}

impl NeighborhoodIntel {
    /// Build against a search-provider adapter and a narrative LLM adapter.
    #[must_use]
    pub fn new(search: Arc<dyn SearchProvider>, llm: Arc<dyn NarrativeLlm>) -> Self {
        Self { search, llm }
    }
}

#[async_trait]
impl Worker for NeighborhoodIntel {
    fn name(&self) -> &str {
        "neighborhood_intel"
    }

    async fn run(&self, ctx: &WorkerContext) -> Result<WorkerOutput, String> {
        let property = ctx.store.get_property(ctx.job.research_property_id).ok_or_else(|| "Research property not found".to_string())?;
        let city = property.city.clone().unwrap_or_default();
        let state = property.state.clone().unwrap_or_default();

        let mut evidence = Vec::new();
        let mut unknowns = Vec::new();
        let mut sections = serde_json::Map::new();
        let mut web_calls = 0u32;
        let mut summary_lines = Vec::new();

        for section in SECTIONS {
            let query = format!("{} {} {}", city, state, section.query_suffix).trim().to_string();
            let hits = self.search.search(&query, SEARCH_MAX_RESULTS, false).await;
            web_calls += 1;

            if hits.is_empty() {
                unknowns.push(Unknown { field: section.key.to_string(), reason: format!("No {} sources returned by configured search provider.", section.key) });
                sections.insert(section.key.to_string(), serde_json::json!({ "hits": [] }));
                continue;
            }

            let hit_values: Vec<serde_json::Value> = hits
                .iter()
                .map(|hit| {
                    let source_quality = source_quality_score(Some(hit.url.as_str()), Some(section.category));
                    evidence.push(EvidenceDraft::new(section.category, format!("{} {}.", section.claim_prefix, hit.title), hit.url.clone(), Some(hit.snippet.clone()), source_quality));
                    summary_lines.push(format!("{}: {} - {}", section.key, hit.title, hit.snippet));
                    serde_json::json!({ "title": hit.title, "url": hit.url, "snippet": hit.snippet })
                })
                .collect();
            sections.insert(section.key.to_string(), serde_json::json!({ "hits": hit_values }));
        }

        let mut ai_summary = None;
        let mut cost_usd = 0.0;
        if !summary_lines.is_empty() {
            let prompt = format!(
                "Summarize the neighborhood outlook for {}, {} in 3-4 sentences based on these sources:\n{}",
                city,
                state,
                summary_lines.join("\n")
            );
            if let Ok(summary) = self.llm.generate(&prompt, SUMMARY_MODEL, SUMMARY_MAX_TOKENS).await {
                ai_summary = Some(summary);
                cost_usd = 0.01;
            }
        }

        Ok(WorkerOutput {
            data: serde_json::json!({
                "neighborhood_intel": {
                    "crime": sections.get("crime"),
                    "schools": sections.get("schools"),
                    "market_trends": sections.get("market_trends"),
                    "demographics": {},
                    "walkability": {},
                    "ai_summary": ai_summary,
                }
            }),
            unknowns,
            errors: Vec::new(),
            evidence,
            web_calls,
            cost_usd,
        })
    }
}
