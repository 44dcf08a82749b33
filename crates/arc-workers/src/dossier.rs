//! `dossier_writer`: the terminal worker. Assembles every upstream worker's
//! findings into a markdown dossier, attempting an AI narrative first and
//! falling back to a deterministic structured write-up (spec §4.E.5,
//! grounded on `dossier.py`).

use crate::profile::upstream_profile;
use arc_adapters::NarrativeLlm;
use arc_core::{Citation, Dossier};
use arc_protocol::{Worker, WorkerContext, WorkerOutput};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

const NARRATIVE_MODEL: &str = "claude-sonnet-4-5-20250929";
const NARRATIVE_MAX_TOKENS: u32 = 1500;

/// `dossier_writer`.
pub struct DossierWriter {
    llm: Arc<dyn NarrativeLlm>,
}

impl DossierWriter {
    /// Build against a narrative LLM adapter.
    #[must_use]
    pub fn new(llm: Arc<dyn NarrativeLlm>) -> Self {
        Self { llm }
    }
}

async fn section(ctx: &WorkerContext, worker_name: &str, key: &str) -> Option<Value> {
    ctx.upstream(worker_name).await.and_then(|v| v.get(key).cloned())
}

#[async_trait]
impl Worker for DossierWriter {
    fn name(&self) -> &str {
        "dossier_writer"
    }

    async fn run(&self, ctx: &WorkerContext) -> Result<WorkerOutput, String> {
        let property = ctx.store.get_property(ctx.job.research_property_id).ok_or_else(|| "Research property not found".to_string())?;
        let profile = upstream_profile(ctx).await;
        let sales = ctx.store.list_comp_sales(ctx.job.id);
        let rentals = ctx.store.list_comp_rentals(ctx.job.id);
        let underwriting = ctx.store.get_underwriting(ctx.job.id);
        let risk = ctx.store.get_risk_score(ctx.job.id);

        let public_records = section(ctx, "public_records", "public_records_hits").await;
        let permits = section(ctx, "permits_violations", "permit_violation_hits").await;
        let subdivision = section(ctx, "subdivision_research", "subdivision_research").await;
        let flood_zone = section(ctx, "flood_zone", "flood_zone").await;
        let epa_environmental = section(ctx, "epa_environmental", "epa_environmental").await;
        let wildfire_hazard = section(ctx, "wildfire_hazard", "wildfire_hazard").await;
        let hud_opportunity = section(ctx, "hud_opportunity", "hud_opportunity").await;
        let wetlands = section(ctx, "wetlands", "wetlands").await;
        let historic_places = section(ctx, "historic_places", "historic_places").await;
        let seismic_hazard = section(ctx, "seismic_hazard", "seismic_hazard").await;
        let school_district = section(ctx, "school_district", "school_district").await;
        let us_real_estate = section(ctx, "us_real_estate", "us_real_estate").await;
        let walk_score = section(ctx, "walk_score", "walk_score").await;
        let redfin = section(ctx, "redfin", "redfin").await;
        let rentcast = section(ctx, "rentcast", "rentcast").await;
        let neighborhood_intel = section(ctx, "neighborhood_intel", "neighborhood_intel").await;

        let data_summary = build_data_summary(
            &property.raw_address,
            profile.as_ref(),
            &sales,
            &rentals,
            underwriting.as_ref(),
            risk.as_ref(),
            public_records.as_ref(),
            permits.as_ref(),
            flood_zone.as_ref(),
            neighborhood_intel.as_ref(),
        );

        let mut ai_narrative = None;
        let mut cost_usd = 0.0;
        let prompt = format!(
            "Write an investment research dossier for {}. Use the following structured data; \
             be specific, note contradictions, and flag missing data rather than inventing it.\n\n{}",
            property.raw_address, data_summary
        );
        if let Ok(narrative) = self.llm.generate(&prompt, NARRATIVE_MODEL, NARRATIVE_MAX_TOKENS).await {
            ai_narrative = Some(narrative);
            cost_usd = 0.02;
        }

        let markdown = match &ai_narrative {
            Some(narrative) => format!("{narrative}\n\n---\n\n## Raw Data Appendix\n\n{}", build_data_appendix(&data_summary, [
                ("public_records", &public_records),
                ("permits_violations", &permits),
                ("subdivision_research", &subdivision),
                ("flood_zone", &flood_zone),
                ("epa_environmental", &epa_environmental),
                ("wildfire_hazard", &wildfire_hazard),
                ("hud_opportunity", &hud_opportunity),
                ("wetlands", &wetlands),
                ("historic_places", &historic_places),
                ("seismic_hazard", &seismic_hazard),
                ("school_district", &school_district),
                ("us_real_estate", &us_real_estate),
                ("walk_score", &walk_score),
                ("redfin", &redfin),
                ("rentcast", &rentcast),
            ])),
            None => build_structured_dossier(
                &property.raw_address,
                profile.as_ref(),
                &sales,
                &rentals,
                underwriting.as_ref(),
                risk.as_ref(),
                public_records.as_ref(),
                permits.as_ref(),
                subdivision.as_ref(),
                flood_zone.as_ref(),
                epa_environmental.as_ref(),
                wildfire_hazard.as_ref(),
                hud_opportunity.as_ref(),
                wetlands.as_ref(),
                historic_places.as_ref(),
                seismic_hazard.as_ref(),
                school_district.as_ref(),
                us_real_estate.as_ref(),
                walk_score.as_ref(),
                redfin.as_ref(),
                rentcast.as_ref(),
                neighborhood_intel.as_ref(),
            ),
        };

        let evidence_items = ctx.store.list_evidence_for_property(ctx.job.research_property_id);
        let citations: Vec<Citation> = evidence_items.iter().map(|e| Citation { evidence_id: e.id, source_url: e.source_url.clone() }).collect();

        let dossier = Dossier { research_property_id: ctx.job.research_property_id, job_id: ctx.job.id, markdown: markdown.clone(), citations };
        ctx.store.upsert_dossier(ctx.job.id, dossier);

        let evidence = vec![arc_core::EvidenceDraft::new(
            "dossier",
            format!("Dossier generated {}.", if ai_narrative.is_some() { "with AI narrative" } else { "from structured data" }),
            format!("internal://agentic_jobs/{}/dossier", ctx.job.id),
            None,
            1.0,
        )];

        Ok(WorkerOutput { data: serde_json::json!({ "dossier": { "markdown": markdown } }), unknowns: Vec::new(), errors: Vec::new(), evidence, web_calls: 0, cost_usd })
    }
}

#[allow(clippy::too_many_arguments)]
fn build_data_summary(
    raw_address: &str,
    profile: Option<&crate::profile::PropertyProfile>,
    sales: &[arc_core::CompSale],
    rentals: &[arc_core::CompRental],
    underwriting: Option<&arc_core::Underwriting>,
    risk: Option<&arc_core::RiskScore>,
    public_records: Option<&Value>,
    permits: Option<&Value>,
    flood_zone: Option<&Value>,
    neighborhood_intel: Option<&Value>,
) -> String {
    let mut lines = vec![format!("Address: {raw_address}")];

    if let Some(profile) = profile {
        lines.push(format!(
            "Parcel facts: {} sqft, {} bed, {} bath, built {}.",
            profile.parcel_facts.sqft.map(|v| v.to_string()).unwrap_or_else(|| "unknown".to_string()),
            profile.parcel_facts.beds.map(|v| v.to_string()).unwrap_or_else(|| "unknown".to_string()),
            profile.parcel_facts.baths.map(|v| v.to_string()).unwrap_or_else(|| "unknown".to_string()),
            profile.parcel_facts.year.map(|v| v.to_string()).unwrap_or_else(|| "unknown".to_string()),
        ));
        lines.push(format!("Enrichment coverage: {}/3 sources, enriched={}.", 3 - profile.enrichment_status.missing.len(), profile.enrichment_status.is_enriched));
    }

    lines.push(format!("Sales comps: {} found.", sales.len()));
    lines.push(format!("Rental comps: {} found.", rentals.len()));

    if let Some(u) = underwriting {
        lines.push(format!(
            "ARV estimate: ${}. Rent estimate: ${}. Offer recommendation: ${}.",
            u.arv_estimate.base.map(|v| format!("{v:.0}")).unwrap_or_else(|| "unknown".to_string()),
            u.rent_estimate.base.map(|v| format!("{v:.0}")).unwrap_or_else(|| "unknown".to_string()),
            u.offer_price_recommendation.base.map(|v| format!("{v:.0}")).unwrap_or_else(|| "unknown".to_string()),
        ));
    }
    if let Some(r) = risk {
        lines.push(format!("Risk: title_risk={:.2}, data_confidence={:.2}, flags={:?}.", r.title_risk, r.data_confidence, r.compliance_flags));
    }
    if let Some(pr) = public_records {
        lines.push(format!("Public records hits: {}.", pr.as_array().map(Vec::len).unwrap_or(0)));
    }
    if let Some(p) = permits {
        lines.push(format!("Permit/violation hits: {}.", p.as_array().map(Vec::len).unwrap_or(0)));
    }
    if let Some(f) = flood_zone {
        lines.push(format!("Flood zone: {}.", f.get("zone").and_then(Value::as_str).unwrap_or("unknown")));
    }
    if let Some(n) = neighborhood_intel {
        if let Some(summary) = n.get("ai_summary").and_then(Value::as_str) {
            lines.push(format!("Neighborhood summary: {summary}"));
        }
    }

    lines.join("\n")
}

fn build_data_appendix(data_summary: &str, optional_sections: [(&str, &Option<Value>); 15]) -> String {
    let mut sections = vec![format!("### Summary\n\n{data_summary}")];
    for (name, value) in optional_sections {
        if let Some(value) = value {
            sections.push(format!("### {name}\n\n```json\n{}\n```", serde_json::to_string_pretty(value).unwrap_or_default()));
        }
    }
    sections.join("\n\n")
}

#[allow(clippy::too_many_arguments)]
fn build_structured_dossier(
    raw_address: &str,
    profile: Option<&crate::profile::PropertyProfile>,
    sales: &[arc_core::CompSale],
    rentals: &[arc_core::CompRental],
    underwriting: Option<&arc_core::Underwriting>,
    risk: Option<&arc_core::RiskScore>,
    public_records: Option<&Value>,
    permits: Option<&Value>,
    subdivision: Option<&Value>,
    flood_zone: Option<&Value>,
    epa_environmental: Option<&Value>,
    wildfire_hazard: Option<&Value>,
    hud_opportunity: Option<&Value>,
    wetlands: Option<&Value>,
    historic_places: Option<&Value>,
    seismic_hazard: Option<&Value>,
    school_district: Option<&Value>,
    us_real_estate: Option<&Value>,
    walk_score: Option<&Value>,
    redfin: Option<&Value>,
    rentcast: Option<&Value>,
    neighborhood_intel: Option<&Value>,
) -> String {
    let mut out = vec![format!("# Research Dossier: {raw_address}"), String::new()];

    out.push("## Property Profile".to_string());
    match profile {
        Some(p) => {
            out.push(format!("- Normalized address: {}", p.normalized_address));
            out.push(format!(
                "- Parcel facts: {} sqft / {} bed / {} bath / built {}",
                p.parcel_facts.sqft.map(|v| v.to_string()).unwrap_or_else(|| "unknown".into()),
                p.parcel_facts.beds.map(|v| v.to_string()).unwrap_or_else(|| "unknown".into()),
                p.parcel_facts.baths.map(|v| v.to_string()).unwrap_or_else(|| "unknown".into()),
                p.parcel_facts.year.map(|v| v.to_string()).unwrap_or_else(|| "unknown".into()),
            ));
            out.push(format!("- Owner: {}", p.owner_names.join(", ")));
            out.push(format!("- Enrichment: is_enriched={}, missing={:?}", p.enrichment_status.is_enriched, p.enrichment_status.missing));
        }
        None => out.push("- No property profile was resolved.".to_string()),
    }
    out.push(String::new());

    out.push("## Comparable Sales".to_string());
    if sales.is_empty() {
        out.push("- No comparable sales found.".to_string());
    } else {
        for comp in sales {
            out.push(format!("- {} — ${:.0} (similarity {:.2})", comp.address, comp.sale_price.unwrap_or(0.0), comp.similarity_score));
        }
    }
    out.push(String::new());

    out.push("## Comparable Rentals".to_string());
    if rentals.is_empty() {
        out.push("- No comparable rentals found.".to_string());
    } else {
        for comp in rentals {
            out.push(format!("- {} — ${:.0}/mo (similarity {:.2})", comp.address, comp.rent.unwrap_or(0.0), comp.similarity_score));
        }
    }
    out.push(String::new());

    out.push("## Underwriting".to_string());
    match underwriting {
        Some(u) => {
            out.push(format!("- Strategy: {:?}", u.strategy));
            out.push(format!("- ARV estimate: low={:?} base={:?} high={:?}", u.arv_estimate.low, u.arv_estimate.base, u.arv_estimate.high));
            out.push(format!("- Rent estimate: low={:?} base={:?} high={:?}", u.rent_estimate.low, u.rent_estimate.base, u.rent_estimate.high));
            out.push(format!("- Rehab tier: {:?}, range: low={:?} base={:?} high={:?}", u.rehab_tier, u.rehab_estimated_range.low, u.rehab_estimated_range.base, u.rehab_estimated_range.high));
            out.push(format!("- Offer recommendation: low={:?} base={:?} high={:?}", u.offer_price_recommendation.low, u.offer_price_recommendation.base, u.offer_price_recommendation.high));
            out.push(format!("- Fees: {:?}", u.fees));
        }
        None => out.push("- Underwriting not computed.".to_string()),
    }
    out.push(String::new());

    out.push("## Risk".to_string());
    match risk {
        Some(r) => {
            out.push(format!("- Title risk: {:.2}", r.title_risk));
            out.push(format!("- Data confidence: {:.2}", r.data_confidence));
            out.push(format!("- Compliance flags: {:?}", r.compliance_flags));
            out.push(format!("- Notes: {}", r.notes));
        }
        None => out.push("- Risk score not computed.".to_string()),
    }
    out.push(String::new());

    push_optional_list_section(&mut out, "Public Records", public_records, "No public records sources found.");
    push_optional_list_section(&mut out, "Permits & Violations", permits, "No permit or violation sources found.");
    push_optional_value_section(&mut out, "Subdivision Research", subdivision, "Subdivision research was not requested for this Job.");
    push_optional_value_section(&mut out, "Flood Zone", flood_zone, "Flood zone lookup was not run for this Job.");
    push_optional_value_section(&mut out, "EPA Environmental", epa_environmental, "EPA environmental lookup was not run for this Job.");
    push_optional_value_section(&mut out, "Wildfire Hazard", wildfire_hazard, "Wildfire hazard lookup was not run for this Job.");
    push_optional_value_section(&mut out, "HUD Opportunity Zone", hud_opportunity, "HUD opportunity zone lookup was not run for this Job.");
    push_optional_value_section(&mut out, "Wetlands", wetlands, "Wetlands lookup was not run for this Job.");
    push_optional_value_section(&mut out, "Historic Places", historic_places, "Historic places lookup was not run for this Job.");
    push_optional_value_section(&mut out, "Seismic Hazard", seismic_hazard, "Seismic hazard lookup was not run for this Job.");
    push_optional_value_section(&mut out, "School District", school_district, "School district lookup was not run for this Job.");
    push_optional_value_section(&mut out, "US Real Estate", us_real_estate, "US Real Estate lookup was not run for this Job.");
    push_optional_value_section(&mut out, "Walk Score", walk_score, "Walk Score lookup was not run for this Job.");
    push_optional_value_section(&mut out, "Redfin", redfin, "Redfin lookup was not run for this Job.");
    push_optional_value_section(&mut out, "RentCast", rentcast, "RentCast lookup was not run for this Job.");
    push_optional_value_section(&mut out, "Neighborhood Intel", neighborhood_intel, "Neighborhood intel was not requested for this Job.");

    out.join("\n")
}

fn push_optional_value_section(out: &mut Vec<String>, title: &str, value: Option<&Value>, absent_note: &str) {
    out.push(format!("## {title}"));
    match value {
        Some(v) => out.push(format!("```json\n{}\n```", serde_json::to_string_pretty(v).unwrap_or_default())),
        None => out.push(format!("- {absent_note}")),
    }
    out.push(String::new());
}

fn push_optional_list_section(out: &mut Vec<String>, title: &str, value: Option<&Value>, absent_note: &str) {
    out.push(format!("## {title}"));
    match value.and_then(Value::as_array).filter(|a| !a.is_empty()) {
        Some(items) => {
            for item in items {
                let title = item.get("title").and_then(Value::as_str).unwrap_or("untitled");
                let url = item.get("url").and_then(Value::as_str).unwrap_or("");
                out.push(format!("- [{title}]({url})"));
            }
        }
        None => out.push(format!("- {absent_note}")),
    }
    out.push(String::new());
}
