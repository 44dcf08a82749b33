//! The four API-key-gated enrichment lookups: US Real Estate, Walk Score,
//! Redfin, and RentCast (spec §4.H "extensive" group, grounded on
//! `rapidapi.py`). Unlike the geocode-gated GIS workers, these gate on
//! whether an API key was configured at registry build time, not on job
//! assumptions.

use crate::profile::upstream_profile;
use arc_adapters::GisAdapter;
use arc_core::{EvidenceDraft, Unknown};
use arc_protocol::{Worker, WorkerContext, WorkerOutput};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(20);

fn no_key_output(field: &str, service: &str) -> WorkerOutput {
    WorkerOutput {
        data: Value::Null,
        unknowns: vec![Unknown { field: field.to_string(), reason: format!("No {service} API key configured.") }],
        errors: Vec::new(),
        evidence: Vec::new(),
        web_calls: 0,
        cost_usd: 0.0,
    }
}

fn no_geo_output(field: &str) -> WorkerOutput {
    WorkerOutput {
        data: Value::Null,
        unknowns: vec![Unknown { field: field.to_string(), reason: "No geocoded coordinates available to run the lookup.".to_string() }],
        errors: Vec::new(),
        evidence: Vec::new(),
        web_calls: 0,
        cost_usd: 0.0,
    }
}

fn failed_output(field: &str, base_url: &str, error: String) -> WorkerOutput {
    WorkerOutput {
        data: Value::Null,
        unknowns: vec![Unknown { field: field.to_string(), reason: format!("Lookup against {base_url} failed: {error}") }],
        errors: vec![error],
        evidence: Vec::new(),
        web_calls: 1,
        cost_usd: 0.0,
    }
}

/// `us_real_estate`.
pub struct UsRealEstate {
    gis: Arc<dyn GisAdapter>,
    api_key: Option<String>,
}

impl UsRealEstate {
    /// Build against a generic HTTP adapter and an optional RapidAPI key.
    #[must_use]
    pub fn new(gis: Arc<dyn GisAdapter>, api_key: Option<String>) -> Self {
        Self { gis, api_key }
    }
}

const US_REAL_ESTATE_BASE_URL: &str = "https://us-real-estate.p.rapidapi.com/v3/property-detail";

#[async_trait]
impl Worker for UsRealEstate {
    fn name(&self) -> &str {
        "us_real_estate"
    }

    async fn run(&self, ctx: &WorkerContext) -> Result<WorkerOutput, String> {
        let Some(api_key) = &self.api_key else { return Ok(no_key_output("us_real_estate", "RapidAPI US Real Estate")) };
        let property = ctx.store.get_property(ctx.job.research_property_id).ok_or_else(|| "Research property not found".to_string())?;

        let mut params = BTreeMap::new();
        params.insert("address".to_string(), property.normalized_address.clone());
        params.insert("x_rapidapi_key".to_string(), api_key.clone());

        let value = match self.gis.get(US_REAL_ESTATE_BASE_URL, &params, LOOKUP_TIMEOUT).await {
            Ok(v) => v,
            Err(e) => return Ok(failed_output("us_real_estate", US_REAL_ESTATE_BASE_URL, e)),
        };

        let data = value.get("data").and_then(Value::as_object);
        let estimated_value = data.and_then(|d| d.get("estimated_value")).and_then(Value::as_f64);
        let last_sale_price = data.and_then(|d| d.get("last_sale_price")).and_then(Value::as_f64);
        let last_sale_date = data.and_then(|d| d.get("last_sale_date")).and_then(Value::as_str).map(str::to_string);

        let evidence = vec![EvidenceDraft::new(
            "us_real_estate",
            "US Real Estate listing data retrieved for this address.",
            US_REAL_ESTATE_BASE_URL,
            last_sale_date.clone(),
            0.70,
        )];

        Ok(WorkerOutput {
            data: serde_json::json!({ "us_real_estate": { "estimated_value": estimated_value, "last_sale_price": last_sale_price, "last_sale_date": last_sale_date } }),
            unknowns: Vec::new(),
            errors: Vec::new(),
            evidence,
            web_calls: 1,
            cost_usd: 0.0,
        })
    }
}

/// `walk_score`.
pub struct WalkScore {
    gis: Arc<dyn GisAdapter>,
    api_key: Option<String>,
}

impl WalkScore {
    /// Build against a generic HTTP adapter and an optional Walk Score key.
    #[must_use]
    pub fn new(gis: Arc<dyn GisAdapter>, api_key: Option<String>) -> Self {
        Self { gis, api_key }
    }
}

const WALK_SCORE_BASE_URL: &str = "https://api.walkscore.com/score";

#[async_trait]
impl Worker for WalkScore {
    fn name(&self) -> &str {
        "walk_score"
    }

    async fn run(&self, ctx: &WorkerContext) -> Result<WorkerOutput, String> {
        let Some(api_key) = &self.api_key else { return Ok(no_key_output("walk_score", "Walk Score")) };
        let Some(profile) = upstream_profile(ctx).await else { return Ok(no_geo_output("walk_score")) };
        let (Some(lat), Some(lng)) = (profile.geo.lat, profile.geo.lng) else { return Ok(no_geo_output("walk_score")) };

        let mut params = BTreeMap::new();
        params.insert("lat".to_string(), lat.to_string());
        params.insert("lon".to_string(), lng.to_string());
        params.insert("address".to_string(), profile.normalized_address.clone());
        params.insert("wsapikey".to_string(), api_key.clone());
        params.insert("format".to_string(), "json".to_string());

        let value = match self.gis.get(WALK_SCORE_BASE_URL, &params, LOOKUP_TIMEOUT).await {
            Ok(v) => v,
            Err(e) => return Ok(failed_output("walk_score", WALK_SCORE_BASE_URL, e)),
        };

        let walk_score = value.get("walkscore").and_then(Value::as_i64);
        let description = value.get("description").and_then(Value::as_str).map(str::to_string);
        let transit_score = value.get("transit").and_then(|t| t.get("score")).and_then(Value::as_i64);
        let bike_score = value.get("bike").and_then(|b| b.get("score")).and_then(Value::as_i64);

        let evidence = vec![EvidenceDraft::new(
            "walk_score",
            format!("Walk Score of {} ({}).", walk_score.unwrap_or(0), description.as_deref().unwrap_or("unrated")),
            WALK_SCORE_BASE_URL,
            None,
            0.70,
        )];

        Ok(WorkerOutput {
            data: serde_json::json!({ "walk_score": { "walk_score": walk_score, "description": description, "transit_score": transit_score, "bike_score": bike_score } }),
            unknowns: Vec::new(),
            errors: Vec::new(),
            evidence,
            web_calls: 1,
            cost_usd: 0.0,
        })
    }
}

/// `redfin`.
pub struct Redfin {
    gis: Arc<dyn GisAdapter>,
    api_key: Option<String>,
}

impl Redfin {
    /// Build against a generic HTTP adapter and an optional RapidAPI key.
    #[must_use]
    pub fn new(gis: Arc<dyn GisAdapter>, api_key: Option<String>) -> Self {
        Self { gis, api_key }
    }
}

const REDFIN_BASE_URL: &str = "https://redfin-com-data.p.rapidapi.com/property/detail";

#[async_trait]
impl Worker for Redfin {
    fn name(&self) -> &str {
        "redfin"
    }

    async fn run(&self, ctx: &WorkerContext) -> Result<WorkerOutput, String> {
        let Some(api_key) = &self.api_key else { return Ok(no_key_output("redfin", "RapidAPI Redfin")) };
        let property = ctx.store.get_property(ctx.job.research_property_id).ok_or_else(|| "Research property not found".to_string())?;

        let mut params = BTreeMap::new();
        params.insert("address".to_string(), property.normalized_address.clone());
        params.insert("x_rapidapi_key".to_string(), api_key.clone());

        let value = match self.gis.get(REDFIN_BASE_URL, &params, LOOKUP_TIMEOUT).await {
            Ok(v) => v,
            Err(e) => return Ok(failed_output("redfin", REDFIN_BASE_URL, e)),
        };

        let data = value.get("data").and_then(Value::as_object);
        let redfin_estimate = data.and_then(|d| d.get("redfin_estimate")).and_then(Value::as_f64);
        let price_per_sqft = data.and_then(|d| d.get("price_per_sqft")).and_then(Value::as_f64);
        let days_on_market = data.and_then(|d| d.get("days_on_market")).and_then(Value::as_i64);

        let evidence = vec![EvidenceDraft::new(
            "redfin",
            "Redfin valuation data retrieved for this address.",
            REDFIN_BASE_URL,
            redfin_estimate.map(|v| format!("${v:.0}")),
            0.70,
        )];

        Ok(WorkerOutput {
            data: serde_json::json!({ "redfin": { "redfin_estimate": redfin_estimate, "price_per_sqft": price_per_sqft, "days_on_market": days_on_market } }),
            unknowns: Vec::new(),
            errors: Vec::new(),
            evidence,
            web_calls: 1,
            cost_usd: 0.0,
        })
    }
}

/// `rentcast`.
pub struct RentCast {
    gis: Arc<dyn GisAdapter>,
    api_key: Option<String>,
}

impl RentCast {
    /// Build against a generic HTTP adapter and an optional RentCast key.
    #[must_use]
    pub fn new(gis: Arc<dyn GisAdapter>, api_key: Option<String>) -> Self {
        Self { gis, api_key }
    }
}

const RENTCAST_BASE_URL: &str = "https://api.rentcast.io/v1/avm/rent/long-term";

#[async_trait]
impl Worker for RentCast {
    fn name(&self) -> &str {
        "rentcast"
    }

    async fn run(&self, ctx: &WorkerContext) -> Result<WorkerOutput, String> {
        let Some(api_key) = &self.api_key else { return Ok(no_key_output("rentcast", "RentCast")) };
        let property = ctx.store.get_property(ctx.job.research_property_id).ok_or_else(|| "Research property not found".to_string())?;

        let mut params = BTreeMap::new();
        params.insert("address".to_string(), property.normalized_address.clone());
        params.insert("x_api_key".to_string(), api_key.clone());

        let value = match self.gis.get(RENTCAST_BASE_URL, &params, LOOKUP_TIMEOUT).await {
            Ok(v) => v,
            Err(e) => return Ok(failed_output("rentcast", RENTCAST_BASE_URL, e)),
        };

        let rent_estimate = value.get("rent").and_then(Value::as_f64);
        let rent_low = value.get("rentRangeLow").and_then(Value::as_f64);
        let rent_high = value.get("rentRangeHigh").and_then(Value::as_f64);

        let evidence = vec![EvidenceDraft::new(
            "rentcast",
            format!("RentCast rent estimate of ${:.0}/mo.", rent_estimate.unwrap_or(0.0)),
            RENTCAST_BASE_URL,
            None,
            0.70,
        )];

        Ok(WorkerOutput {
            data: serde_json::json!({ "rentcast": { "rent_estimate": rent_estimate, "rent_range_low": rent_low, "rent_range_high": rent_high } }),
            unknowns: Vec::new(),
            errors: Vec::new(),
            evidence,
            web_calls: 1,
            cost_usd: 0.0,
        })
    }
}
