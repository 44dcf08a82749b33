//! The property-profile shape published by [`crate::geocode`] and read back
//! by every downstream worker (spec §6.4 `property_profile`). This is a
//! pipeline-internal structure, not a persisted entity — it travels through
//! [`arc_protocol::WorkerContext::upstream`] as JSON and is also stashed onto
//! `ResearchProperty::latest_profile` for the next Job to read.

use crate::crm::EnrichmentStatus;
use arc_protocol::WorkerContext;
use serde::{Deserialize, Serialize};

/// Geocoded coordinates, possibly unresolved.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Geo {
    /// Latitude.
    pub lat: Option<f64>,
    /// Longitude.
    pub lng: Option<f64>,
}

/// Physical characteristics sourced from the CRM match.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParcelFacts {
    /// Square footage.
    pub sqft: Option<i64>,
    /// Lot size.
    pub lot: Option<f64>,
    /// Bedroom count.
    pub beds: Option<i64>,
    /// Bathroom count.
    pub baths: Option<f64>,
    /// Year built.
    pub year: Option<i64>,
}

/// Tax/valuation figures sourced from the Zillow enrichment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssessedValues {
    /// Most recent annual tax bill.
    pub annual_tax_amount: Option<f64>,
    /// Zillow's automated valuation.
    pub zestimate: Option<f64>,
    /// Zillow's automated rent valuation.
    pub rent_zestimate: Option<f64>,
}

/// One entry in `transaction_history`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionEntry {
    /// Event date, as reported by the source (free-form string).
    pub date: Option<String>,
    /// Event label (e.g. `"Sold"`, `"Listed"`).
    pub event: Option<String>,
    /// Dollar amount, if disclosed.
    pub amount: Option<f64>,
    /// Source URL the entry was pulled from.
    pub source_url: Option<String>,
}

/// The full property profile (spec §6.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyProfile {
    /// Canonical normalized address.
    pub normalized_address: String,
    /// Geocoded coordinates.
    pub geo: Geo,
    /// Assessor's Parcel Number, if known.
    pub apn: Option<String>,
    /// Physical characteristics.
    pub parcel_facts: ParcelFacts,
    /// Zoning designation, if known (never populated by any worker today;
    /// carried as a declared field for forward compatibility).
    pub zoning: Option<String>,
    /// Resolved owner name(s).
    pub owner_names: Vec<String>,
    /// Owner mailing address, joined from skip-trace fields.
    pub mailing_address: Option<String>,
    /// Assessed tax/valuation figures.
    pub assessed_values: AssessedValues,
    /// Tax status label.
    pub tax_status: Option<String>,
    /// Sale/listing history.
    pub transaction_history: Vec<TransactionEntry>,
    /// Enrichment coverage/freshness record.
    pub enrichment_status: EnrichmentStatus,
}

/// Read and decode `normalize_geocode`'s published profile, if it has run.
pub async fn upstream_profile(ctx: &WorkerContext) -> Option<PropertyProfile> {
    let value = ctx.upstream("normalize_geocode").await?;
    let profile = value.get("property_profile")?.clone();
    serde_json::from_value(profile).ok()
}
