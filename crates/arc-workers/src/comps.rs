//! `comps_sales`/`comps_rentals`: scan the internal CRM dataset and external
//! search hits for comparable properties, score and rank them, and persist
//! the winners (spec §4.F, grounded on `comps_workers.py`).

use crate::crm::CrmFixture;
use crate::profile::upstream_profile;
use arc_adapters::SearchProvider;
use arc_core::extract::{extract_comp_entries_from_text, CompKind};
use arc_core::ranker::{comp_source_quality, distance_proxy_mi, effective_score, passes_hard_filters, similarity_score};
use arc_core::{dedupe_and_rank, default_radius_mi, CompDetails, CompOrigin, CompRental, CompSale, EvidenceDraft, Unknown};
use arc_protocol::{Worker, WorkerContext, WorkerOutput};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;

const SALES_MAX_RECENCY_MONTHS: i64 = 12;
const RENTAL_MAX_RECENCY_MONTHS: i64 = 6;
const INTERNAL_CANDIDATE_LIMIT: usize = 25;
const EXTERNAL_MAX_RESULTS: usize = 10;

struct TargetFacts {
    zip: Option<String>,
    city: Option<String>,
    state: Option<String>,
    sqft: Option<i64>,
    beds: Option<i64>,
    baths: Option<f64>,
}

/// `comps_sales`.
pub struct CompsSales {
    crm: Arc<CrmFixture>,
    search: Arc<dyn SearchProvider>,
}

impl CompsSales {
    /// Build against the shared CRM fixture and a search-provider adapter.
    #[must_use]
    pub fn new(crm: Arc<CrmFixture>, search: Arc<dyn SearchProvider>) -> Self {
        Self { crm, search }
    }
}

#[async_trait]
impl Worker for CompsSales {
    fn name(&self) -> &str {
        "comps_sales"
    }

    async fn run(&self, ctx: &WorkerContext) -> Result<WorkerOutput, String> {
        let property = ctx.store.get_property(ctx.job.research_property_id).ok_or_else(|| "Research property not found".to_string())?;
        let profile = upstream_profile(ctx).await;
        let assumptions = crate::resolved_assumptions(&ctx.job);
        let today = Utc::now().date_naive();

        let target = TargetFacts {
            zip: property.zip_code.clone(),
            city: property.city.clone(),
            state: property.state.clone(),
            sqft: profile.as_ref().and_then(|p| p.parcel_facts.sqft),
            beds: profile.as_ref().and_then(|p| p.parcel_facts.beds),
            baths: profile.as_ref().and_then(|p| p.parcel_facts.baths),
        };

        let primary_radius = assumptions.sales_radius_mi.unwrap_or_else(|| default_radius_mi(target.city.as_deref()));
        let fallback_radius = assumptions.sales_fallback_radius_mi.unwrap_or(primary_radius * 3.0);
        let min_comps = assumptions.min_sales_comps() as usize;

        let query = format!(
            "{} recently sold comparable homes {} {}",
            property.normalized_address,
            target.city.as_deref().unwrap_or(""),
            target.state.as_deref().unwrap_or("")
        );
        let hits = self.search.search(&query, EXTERNAL_MAX_RESULTS, true).await;

        let mut ranked = rank_sales(&self.crm, &hits, &target, primary_radius, today);
        let mut used_fallback = false;
        if ranked.len() < min_comps && fallback_radius > primary_radius {
            ranked = rank_sales(&self.crm, &hits, &target, fallback_radius, today);
            used_fallback = true;
        }
        let selected = dedupe_and_rank(ranked, min_comps.max(5), |comp| {
            (comp.details.origin, comp_source_quality(&comp.source_url))
        });

        let mut unknowns = Vec::new();
        if selected.is_empty() {
            unknowns.push(Unknown { field: "comps_sales".into(), reason: "No comparable sales cleared the hard filters.".into() });
        } else if selected.len() < min_comps {
            unknowns.push(Unknown {
                field: "comps_sales".into(),
                reason: format!("Only {} of {} requested sales comps were found.", selected.len(), min_comps),
            });
        }

        let mut evidence = Vec::new();
        for comp in &selected {
            evidence.push(EvidenceDraft::new(
                "comps_sales",
                format!("Comparable sale at {} (similarity {:.2}).", comp.address, comp.similarity_score),
                comp.source_url.clone(),
                comp.sale_price.map(|p| format!("${p:.0}")),
                comp.details.source_quality,
            ));
        }

        let radius_used = if used_fallback { fallback_radius } else { primary_radius };
        let count = selected.len();
        let selected = selected
            .into_iter()
            .map(|mut comp| {
                comp.research_property_id = ctx.job.research_property_id;
                comp.job_id = ctx.job.id;
                comp
            })
            .collect();
        ctx.store.replace_comp_sales(ctx.job.id, selected);

        Ok(WorkerOutput {
            data: serde_json::json!({
                "comps_sales": { "count": count, "radius_mi": radius_used, "used_fallback_radius": used_fallback }
            }),
            unknowns,
            errors: Vec::new(),
            evidence,
            web_calls: 1,
            cost_usd: 0.0,
        })
    }
}

fn rank_sales(crm: &CrmFixture, hits: &[arc_adapters::SearchHit], target: &TargetFacts, radius_mi: f64, today: chrono::NaiveDate) -> Vec<CompSale> {
    let mut candidates = Vec::new();

    for candidate in crm.properties_in_market(target.city.as_deref(), target.state.as_deref(), INTERNAL_CANDIDATE_LIMIT) {
        let Some(sale_price) = candidate.price else { continue };
        let distance = distance_proxy_mi(
            target.zip.as_deref(),
            candidate.zip_code.as_deref(),
            target.city.as_deref(),
            candidate.city.as_deref(),
            target.state.as_deref(),
            candidate.state.as_deref(),
        );
        let sale_date = Some(candidate.updated_at.date_naive());
        if !passes_hard_filters(
            distance,
            radius_mi,
            sale_date,
            today,
            SALES_MAX_RECENCY_MONTHS,
            target.sqft,
            candidate.square_feet,
            target.beds,
            candidate.bedrooms,
            target.baths,
            candidate.bathrooms,
        ) {
            continue;
        }
        let similarity = similarity_score(
            distance,
            radius_mi,
            target.sqft,
            candidate.square_feet,
            target.beds,
            candidate.bedrooms,
            target.baths,
            candidate.bathrooms,
            sale_date,
            today,
        );
        let source_url = format!("internal://properties/{}", candidate.id);
        candidates.push(CompSale {
            id: 0,
            research_property_id: 0,
            job_id: 0,
            address: candidate.address.clone(),
            distance_mi: Some(distance),
            sale_date,
            sale_price: Some(sale_price),
            sqft: candidate.square_feet,
            beds: candidate.bedrooms,
            baths: candidate.bathrooms,
            year_built: candidate.year_built,
            similarity_score: similarity,
            source_url,
            details: CompDetails { origin: CompOrigin::Internal, source_quality: 1.0, effective_score: 0.0 },
        });
    }

    for hit in hits {
        let text = hit.text.as_deref().unwrap_or(&hit.snippet);
        for row in extract_comp_entries_from_text(text, CompKind::Sale, &hit.url, hit.published_date, today) {
            let distance = distance_proxy_mi(
                target.zip.as_deref(),
                Some(row.zip_code.as_str()),
                target.city.as_deref(),
                Some(row.city.as_str()),
                target.state.as_deref(),
                Some(row.state.as_str()),
            );
            if !passes_hard_filters(
                distance,
                radius_mi,
                Some(row.date),
                today,
                SALES_MAX_RECENCY_MONTHS,
                target.sqft,
                row.sqft,
                target.beds,
                row.beds,
                target.baths,
                row.baths,
            ) {
                continue;
            }
            let similarity = similarity_score(
                distance,
                radius_mi,
                target.sqft,
                row.sqft,
                target.beds,
                row.beds,
                target.baths,
                row.baths,
                Some(row.date),
                today,
            );
            let source_quality = comp_source_quality(&row.source_url);
            candidates.push(CompSale {
                id: 0,
                research_property_id: 0,
                job_id: 0,
                address: row.address,
                distance_mi: Some(distance),
                sale_date: Some(row.date),
                sale_price: Some(row.price),
                sqft: row.sqft,
                beds: row.beds,
                baths: row.baths,
                year_built: None,
                similarity_score: similarity,
                source_url: row.source_url.clone(),
                details: CompDetails { origin: CompOrigin::External, source_quality, effective_score: effective_score(similarity, source_quality) },
            });
        }
    }

    candidates
}

/// `comps_rentals`.
pub struct CompsRentals {
    crm: Arc<CrmFixture>,
    search: Arc<dyn SearchProvider>,
}

impl CompsRentals {
    /// Build against the shared CRM fixture and a search-provider adapter.
    #[must_use]
    pub fn new(crm: Arc<CrmFixture>, search: Arc<dyn SearchProvider>) -> Self {
        Self { crm, search }
    }
}

#[async_trait]
impl Worker for CompsRentals {
    fn name(&self) -> &str {
        "comps_rentals"
    }

    async fn run(&self, ctx: &WorkerContext) -> Result<WorkerOutput, String> {
        let property = ctx.store.get_property(ctx.job.research_property_id).ok_or_else(|| "Research property not found".to_string())?;
        let profile = upstream_profile(ctx).await;
        let assumptions = crate::resolved_assumptions(&ctx.job);
        let today = Utc::now().date_naive();

        let target = TargetFacts {
            zip: property.zip_code.clone(),
            city: property.city.clone(),
            state: property.state.clone(),
            sqft: profile.as_ref().and_then(|p| p.parcel_facts.sqft),
            beds: profile.as_ref().and_then(|p| p.parcel_facts.beds),
            baths: profile.as_ref().and_then(|p| p.parcel_facts.baths),
        };

        let primary_radius = assumptions.rental_radius_mi.unwrap_or_else(|| default_radius_mi(target.city.as_deref()));
        let fallback_radius = assumptions.rental_fallback_radius_mi.unwrap_or(primary_radius * 3.0);
        let min_comps = assumptions.min_rental_comps() as usize;

        let query = format!(
            "{} comparable rental listings for rent {} {}",
            property.normalized_address,
            target.city.as_deref().unwrap_or(""),
            target.state.as_deref().unwrap_or("")
        );
        let hits = self.search.search(&query, EXTERNAL_MAX_RESULTS, true).await;

        let mut ranked = rank_rentals(&self.crm, &hits, &target, primary_radius, today);
        let mut used_fallback = false;
        if ranked.len() < min_comps && fallback_radius > primary_radius {
            ranked = rank_rentals(&self.crm, &hits, &target, fallback_radius, today);
            used_fallback = true;
        }
        let selected = dedupe_and_rank(ranked, min_comps.max(5), |comp| {
            (comp.details.origin, comp_source_quality(&comp.source_url))
        });

        let mut unknowns = Vec::new();
        if selected.is_empty() {
            unknowns.push(Unknown { field: "comps_rentals".into(), reason: "No comparable rentals cleared the hard filters.".into() });
        } else if selected.len() < min_comps {
            unknowns.push(Unknown {
                field: "comps_rentals".into(),
                reason: format!("Only {} of {} requested rental comps were found.", selected.len(), min_comps),
            });
        }

        let mut evidence = Vec::new();
        for comp in &selected {
            evidence.push(EvidenceDraft::new(
                "comps_rentals",
                format!("Comparable rental at {} (similarity {:.2}).", comp.address, comp.similarity_score),
                comp.source_url.clone(),
                comp.rent.map(|r| format!("${r:.0}/mo")),
                comp.details.source_quality,
            ));
        }

        let radius_used = if used_fallback { fallback_radius } else { primary_radius };
        let count = selected.len();
        let selected = selected
            .into_iter()
            .map(|mut comp| {
                comp.research_property_id = ctx.job.research_property_id;
                comp.job_id = ctx.job.id;
                comp
            })
            .collect();
        ctx.store.replace_comp_rentals(ctx.job.id, selected);

        Ok(WorkerOutput {
            data: serde_json::json!({
                "comps_rentals": { "count": count, "radius_mi": radius_used, "used_fallback_radius": used_fallback }
            }),
            unknowns,
            errors: Vec::new(),
            evidence,
            web_calls: 1,
            cost_usd: 0.0,
        })
    }
}

fn rank_rentals(
    crm: &CrmFixture,
    hits: &[arc_adapters::SearchHit],
    target: &TargetFacts,
    radius_mi: f64,
    today: chrono::NaiveDate,
) -> Vec<CompRental> {
    let mut candidates = Vec::new();

    for candidate in crm.properties_in_market(target.city.as_deref(), target.state.as_deref(), INTERNAL_CANDIDATE_LIMIT) {
        let Some(zillow) = crm.zillow_for(candidate.id) else { continue };
        let Some(rent) = zillow.rent_zestimate else { continue };
        let distance = distance_proxy_mi(
            target.zip.as_deref(),
            candidate.zip_code.as_deref(),
            target.city.as_deref(),
            candidate.city.as_deref(),
            target.state.as_deref(),
            candidate.state.as_deref(),
        );
        let date_listed = Some(zillow.updated_at.date_naive());
        if !passes_hard_filters(
            distance,
            radius_mi,
            date_listed,
            today,
            RENTAL_MAX_RECENCY_MONTHS,
            target.sqft,
            candidate.square_feet,
            target.beds,
            candidate.bedrooms,
            target.baths,
            candidate.bathrooms,
        ) {
            continue;
        }
        let similarity = similarity_score(
            distance,
            radius_mi,
            target.sqft,
            candidate.square_feet,
            target.beds,
            candidate.bedrooms,
            target.baths,
            candidate.bathrooms,
            date_listed,
            today,
        );
        let source_url = format!("internal://properties/{}", candidate.id);
        candidates.push(CompRental {
            id: 0,
            research_property_id: 0,
            job_id: 0,
            address: candidate.address.clone(),
            distance_mi: Some(distance),
            date_listed,
            rent: Some(rent),
            sqft: candidate.square_feet,
            beds: candidate.bedrooms,
            baths: candidate.bathrooms,
            similarity_score: similarity,
            source_url,
            details: CompDetails { origin: CompOrigin::Internal, source_quality: 1.0, effective_score: 0.0 },
        });
    }

    for hit in hits {
        let text = hit.text.as_deref().unwrap_or(&hit.snippet);
        for row in extract_comp_entries_from_text(text, CompKind::Rental, &hit.url, hit.published_date, today) {
            let distance = distance_proxy_mi(
                target.zip.as_deref(),
                Some(row.zip_code.as_str()),
                target.city.as_deref(),
                Some(row.city.as_str()),
                target.state.as_deref(),
                Some(row.state.as_str()),
            );
            if !passes_hard_filters(
                distance,
                radius_mi,
                Some(row.date),
                today,
                RENTAL_MAX_RECENCY_MONTHS,
                target.sqft,
                row.sqft,
                target.beds,
                row.beds,
                target.baths,
                row.baths,
            ) {
                continue;
            }
            let similarity = similarity_score(
                distance,
                radius_mi,
                target.sqft,
                row.sqft,
                target.beds,
                row.beds,
                target.baths,
                row.baths,
                Some(row.date),
                today,
            );
            let source_quality = comp_source_quality(&row.source_url);
            candidates.push(CompRental {
                id: 0,
                research_property_id: 0,
                job_id: 0,
                address: row.address,
                distance_mi: Some(distance),
                date_listed: Some(row.date),
                rent: Some(row.price),
                sqft: row.sqft,
                beds: row.beds,
                baths: row.baths,
                similarity_score: similarity,
                source_url: row.source_url.clone(),
                details: CompDetails { origin: CompOrigin::External, source_quality, effective_score: effective_score(similarity, source_quality) },
            });
        }
    }

    candidates
}
