//! `normalize_geocode`: enriches a [`arc_core::ResearchProperty`] with
//! coordinates, CRM parcel facts, skip-trace ownership, and Zillow tax/
//! valuation data (spec §4.E.1, grounded on `geo.py`). Every other worker
//! depends on this one.

use crate::crm::{compute_enrichment_status, resolve_enrichment_max_age_hours, CrmFixture};
use crate::profile::{AssessedValues, Geo, ParcelFacts, PropertyProfile, TransactionEntry};
use arc_adapters::Geocoder;
use arc_core::{EvidenceDraft, Unknown};
use arc_protocol::{Worker, WorkerContext, WorkerOutput};
use async_trait::async_trait;
use std::sync::Arc;

/// The geocode/CRM-match worker.
pub struct NormalizeGeocode {
    geocoder: Arc<dyn Geocoder>,
    crm: Arc<CrmFixture>,
}

impl NormalizeGeocode {
    /// Build against a geocoder adapter and a CRM fixture.
    #[must_use]
    pub fn new(geocoder: Arc<dyn Geocoder>, crm: Arc<CrmFixture>) -> Self {
        Self { geocoder, crm }
    }
}

#[async_trait]
impl Worker for NormalizeGeocode {
    fn name(&self) -> &str {
        "normalize_geocode"
    }

    async fn run(&self, ctx: &WorkerContext) -> Result<WorkerOutput, String> {
        let property = ctx
            .store
            .get_property(ctx.job.research_property_id)
            .ok_or_else(|| "Research property not found".to_string())?;

        let mut unknowns = Vec::new();
        let errors: Vec<String> = Vec::new();
        let mut evidence = Vec::new();
        let mut web_calls = 0;

        let mut profile = PropertyProfile {
            normalized_address: property.normalized_address.clone(),
            geo: Geo { lat: property.geo_lat, lng: property.geo_lng },
            apn: property.apn.clone(),
            parcel_facts: ParcelFacts::default(),
            zoning: None,
            owner_names: Vec::new(),
            mailing_address: None,
            assessed_values: AssessedValues::default(),
            tax_status: None,
            transaction_history: Vec::new(),
            enrichment_status: compute_enrichment_status(None, None, None, None, chrono::Utc::now()),
        };

        evidence.push(EvidenceDraft::new(
            "input",
            format!("Input address normalized to '{}'.", property.normalized_address),
            "internal://input",
            Some(property.raw_address.clone()),
            1.0,
        ));

        let mut resolved_city = property.city.clone();
        let mut resolved_state = property.state.clone();
        let mut resolved_zip = property.zip_code.clone();

        let suggestions = self.geocoder.autocomplete(&property.raw_address, "us").await;
        web_calls += 1;
        if let Some(first) = suggestions.first() {
            let details = self.geocoder.details(&first.place_id).await;
            web_calls += 1;
            match details {
                Some(details) => {
                    resolved_city = resolved_city.or(details.city.clone());
                    resolved_state = resolved_state.or(details.state.clone());
                    resolved_zip = resolved_zip.or(details.zip.clone());
                    profile.geo = Geo { lat: Some(details.lat), lng: Some(details.lng) };
                    evidence.push(EvidenceDraft::new(
                        "geocode",
                        "Address geocoded from configured geocoder details.",
                        "internal://geocoder/details",
                        Some(details.formatted_address.clone()),
                        0.95,
                    ));
                }
                None => unknowns.push(Unknown { field: "geo".into(), reason: "Place details lookup returned no result.".into() }),
            }
        } else {
            unknowns.push(Unknown { field: "geo".into(), reason: "No geocoding candidates returned.".into() });
        }

        let crm_match = self.crm.find_matching(&property.raw_address, resolved_city.as_deref(), resolved_state.as_deref());
        let mut skip_trace = None;
        let mut zillow = None;

        if let Some(crm_property) = &crm_match {
            profile.parcel_facts = ParcelFacts {
                sqft: crm_property.square_feet,
                lot: crm_property.lot_size,
                beds: crm_property.bedrooms,
                baths: crm_property.bathrooms,
                year: crm_property.year_built,
            };
            evidence.push(EvidenceDraft::new(
                "property",
                format!("Matched CRM property record #{} for parcel facts.", crm_property.id),
                format!("internal://properties/{}", crm_property.id),
                Some(format!(
                    "{}, {}, {}",
                    crm_property.address,
                    crm_property.city.as_deref().unwrap_or(""),
                    crm_property.state.as_deref().unwrap_or("")
                )),
                0.85,
            ));

            skip_trace = self.crm.latest_skip_trace(crm_property.id);
            if let Some(trace) = skip_trace.as_ref().filter(|t| t.owner_name.is_some()) {
                let owner = trace.owner_name.clone().expect("filtered Some");
                profile.owner_names = vec![owner.clone()];
                let mailing_parts: Vec<&str> = [
                    trace.mailing_address.as_deref(),
                    trace.mailing_city.as_deref(),
                    trace.mailing_state.as_deref(),
                    trace.mailing_zip.as_deref(),
                ]
                .into_iter()
                .flatten()
                .collect();
                profile.mailing_address = (!mailing_parts.is_empty()).then(|| mailing_parts.join(", "));

                evidence.push(EvidenceDraft::new(
                    "owner",
                    "Owner name and mailing address sourced from skip trace data.",
                    format!("internal://skip_traces/property/{}", crm_property.id),
                    Some(owner),
                    0.75,
                ));
            } else {
                unknowns.push(Unknown { field: "owner_names".into(), reason: "No skip trace owner data found.".into() });
            }

            zillow = self.crm.zillow_for(crm_property.id);
            if let Some(z) = &zillow {
                profile.assessed_values =
                    AssessedValues { annual_tax_amount: z.annual_tax_amount, zestimate: z.zestimate, rent_zestimate: z.rent_zestimate };
                profile.tax_status = Some("unknown".into());
                profile.transaction_history = z
                    .price_history
                    .iter()
                    .take(8)
                    .map(|item| TransactionEntry {
                        date: Some(item.date.to_string()),
                        event: Some(item.event.clone()),
                        amount: item.amount,
                        source_url: z.zillow_url.clone(),
                    })
                    .collect();

                evidence.push(EvidenceDraft::new(
                    "tax",
                    "Tax and transaction history pulled from Zillow enrichment record.",
                    z.zillow_url.clone().unwrap_or_else(|| format!("internal://zillow_enrichments/{}", z.id)),
                    Some(format!("{:?}", z.annual_tax_amount)),
                    0.7,
                ));
            } else {
                unknowns.push(Unknown { field: "assessed_values".into(), reason: "No Zillow enrichment data found.".into() });
            }
        } else {
            unknowns.push(Unknown { field: "parcel_facts".into(), reason: "No matching property record in internal CRM dataset.".into() });
        }

        let assumptions = crate::resolved_assumptions(&ctx.job);
        let max_age_hours = resolve_enrichment_max_age_hours(&assumptions);
        profile.enrichment_status =
            compute_enrichment_status(crm_match.as_ref(), skip_trace.as_ref(), zillow.as_ref(), max_age_hours, chrono::Utc::now());

        let profile_value = serde_json::to_value(&profile).map_err(|e| e.to_string())?;
        let property_id = property.id;
        ctx.store.update_property(property_id, |p| {
            p.city = resolved_city;
            p.state = resolved_state;
            p.zip_code = resolved_zip;
            p.geo_lat = profile.geo.lat;
            p.geo_lng = profile.geo.lng;
            p.latest_profile = Some(profile_value.clone());
        });

        Ok(WorkerOutput {
            data: serde_json::json!({ "property_profile": profile_value }),
            unknowns,
            errors,
            evidence,
            web_calls,
            cost_usd: 0.0,
        })
    }
}
