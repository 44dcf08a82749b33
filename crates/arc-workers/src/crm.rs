//! In-memory CRM fixture (grounded on how `geo.py`/`comps_workers.py`/
//! `underwriting.py` read `Property`/`SkipTrace`/`ZillowEnrichment` rows —
//! no model file for these three survives in the retrieved corpus, so the
//! field names below are inferred from usage, not copied from a schema).

use arc_config::Assumptions;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// A CRM-sourced property record, used both as a profile match for
/// [`crate::geocode`] and as an internal comp candidate.
#[derive(Debug, Clone)]
pub struct CrmProperty {
    /// Fixture-assigned identifier.
    pub id: u64,
    /// Street address as stored in the CRM.
    pub address: String,
    /// City.
    pub city: Option<String>,
    /// Two-letter state code.
    pub state: Option<String>,
    /// ZIP code.
    pub zip_code: Option<String>,
    /// Square footage.
    pub square_feet: Option<i64>,
    /// Lot size.
    pub lot_size: Option<f64>,
    /// Bedroom count.
    pub bedrooms: Option<i64>,
    /// Bathroom count.
    pub bathrooms: Option<f64>,
    /// Year built.
    pub year_built: Option<i64>,
    /// Last known sale/list price, used as the internal sales-comp price.
    pub price: Option<f64>,
    /// Last-updated timestamp, used as the comp's recency anchor.
    pub updated_at: DateTime<Utc>,
    /// Creation timestamp, fallen back to when `updated_at` is absent.
    pub created_at: DateTime<Utc>,
}

/// A skip-trace (owner lookup) record tied to a [`CrmProperty`].
#[derive(Debug, Clone)]
pub struct SkipTraceRecord {
    /// Fixture-assigned identifier.
    pub id: u64,
    /// Owning [`CrmProperty::id`].
    pub property_id: u64,
    /// Resolved owner name, if any.
    pub owner_name: Option<String>,
    /// Owner mailing address line.
    pub mailing_address: Option<String>,
    /// Owner mailing city.
    pub mailing_city: Option<String>,
    /// Owner mailing state.
    pub mailing_state: Option<String>,
    /// Owner mailing ZIP.
    pub mailing_zip: Option<String>,
    /// When this skip trace was run.
    pub created_at: DateTime<Utc>,
}

/// One entry in a [`ZillowEnrichment::price_history`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceHistoryEntry {
    /// Event date.
    pub date: NaiveDate,
    /// Event label (e.g. `"Sold"`, `"Listed"`).
    pub event: String,
    /// Dollar amount, if disclosed.
    pub amount: Option<f64>,
}

/// A Zillow enrichment record tied to a [`CrmProperty`].
#[derive(Debug, Clone)]
pub struct ZillowEnrichment {
    /// Fixture-assigned identifier.
    pub id: u64,
    /// Owning [`CrmProperty::id`].
    pub property_id: u64,
    /// Most recent annual tax bill.
    pub annual_tax_amount: Option<f64>,
    /// Zillow's automated valuation.
    pub zestimate: Option<f64>,
    /// Zillow's automated rent valuation; also the internal-rental-comp gate.
    pub rent_zestimate: Option<f64>,
    /// Sale/listing history, newest first.
    pub price_history: Vec<PriceHistoryEntry>,
    /// Canonical Zillow URL for this property, if known.
    pub zillow_url: Option<String>,
    /// When this enrichment record was last refreshed.
    pub updated_at: DateTime<Utc>,
}

/// The full enrichment-status record embedded in a property profile (spec
/// §4.I.2's enrichment gate reads this; §9 open question 1 governs how
/// `is_fresh` interacts with `is_enriched`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentStatus {
    /// Whether a CRM property row matched.
    pub has_crm_property_match: bool,
    /// Whether the matched property has a skip-trace owner name.
    pub has_skip_trace_owner: bool,
    /// Whether the matched property has a Zillow enrichment row.
    pub has_zillow_enrichment: bool,
    /// All three of the above.
    pub is_enriched: bool,
    /// `None` when no freshness TTL applies; otherwise whether the latest
    /// enrichment timestamp is within `max_age_hours`.
    pub is_fresh: Option<bool>,
    /// Age of the latest enrichment timestamp, in hours.
    pub age_hours: Option<f64>,
    /// The TTL this status was evaluated against.
    pub max_age_hours: Option<u32>,
    /// Matched [`CrmProperty::id`], if any.
    pub matched_property_id: Option<u64>,
    /// Matched [`SkipTraceRecord::id`], if any.
    pub skip_trace_id: Option<u64>,
    /// Matched [`ZillowEnrichment::id`], if any.
    pub zillow_enrichment_id: Option<u64>,
    /// Which of the three enrichment categories are absent.
    pub missing: Vec<String>,
    /// The later of the skip-trace/Zillow timestamps, if either exists.
    pub last_enriched_at: Option<DateTime<Utc>>,
}

/// Resolve the freshness TTL for a Job (spec supplement, `_shared.py`
/// `resolve_enrichment_max_age_hours`): an explicit
/// `assumptions.enriched_max_age_hours` wins; absent that, a `168`-hour
/// default applies only when `require_enriched_data` is set, else there is
/// no TTL at all. `arc-config::validate` already rejects a non-positive
/// value, so no error path remains here.
#[must_use]
pub fn resolve_enrichment_max_age_hours(assumptions: &Assumptions) -> Option<u32> {
    assumptions.enriched_max_age_hours.or_else(|| assumptions.require_enriched_data.unwrap_or(false).then_some(168))
}

/// Compute an [`EnrichmentStatus`] from the matched records (spec supplement,
/// `_shared.py` `compute_enrichment_status`).
#[must_use]
pub fn compute_enrichment_status(
    crm_property: Option<&CrmProperty>,
    skip_trace: Option<&SkipTraceRecord>,
    zillow: Option<&ZillowEnrichment>,
    max_age_hours: Option<u32>,
    now: DateTime<Utc>,
) -> EnrichmentStatus {
    let has_crm_match = crm_property.is_some();
    let has_skip_owner = skip_trace.is_some_and(|s| s.owner_name.is_some());
    let has_zillow = zillow.is_some();

    let mut missing = Vec::new();
    if !has_crm_match {
        missing.push("crm_property_match".to_string());
    }
    if !has_skip_owner {
        missing.push("skip_trace_owner".to_string());
    }
    if !has_zillow {
        missing.push("zillow_enrichment".to_string());
    }

    let latest = [skip_trace.map(|s| s.created_at), zillow.map(|z| z.updated_at)].into_iter().flatten().max();

    let (age_hours, is_fresh) = match max_age_hours {
        None => (None, None),
        Some(max) => match latest {
            None => (None, Some(false)),
            Some(latest) => {
                let hours = (now - latest).num_milliseconds() as f64 / 3_600_000.0;
                let hours = (hours * 1000.0).round() / 1000.0;
                (Some(hours), Some(hours <= f64::from(max)))
            }
        },
    };

    EnrichmentStatus {
        has_crm_property_match: has_crm_match,
        has_skip_trace_owner: has_skip_owner,
        has_zillow_enrichment: has_zillow,
        is_enriched: has_crm_match && has_skip_owner && has_zillow,
        is_fresh,
        age_hours,
        max_age_hours,
        matched_property_id: crm_property.map(|p| p.id),
        skip_trace_id: skip_trace.map(|s| s.id),
        zillow_enrichment_id: zillow.map(|z| z.id),
        missing,
        last_enriched_at: latest,
    }
}

/// In-memory CRM dataset the geocode and comp workers read from. Populated
/// once by whoever wires up a Job's environment; never mutated by the
/// pipeline itself.
#[derive(Default)]
pub struct CrmFixture {
    properties: Mutex<Vec<CrmProperty>>,
    skip_traces: Mutex<Vec<SkipTraceRecord>>,
    zillow: Mutex<Vec<ZillowEnrichment>>,
}

impl CrmFixture {
    /// An empty fixture.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a property (builder style).
    #[must_use]
    pub fn with_property(self, property: CrmProperty) -> Self {
        self.properties.lock().expect("poisoned").push(property);
        self
    }

    /// Register a skip-trace record (builder style).
    #[must_use]
    pub fn with_skip_trace(self, record: SkipTraceRecord) -> Self {
        self.skip_traces.lock().expect("poisoned").push(record);
        self
    }

    /// Register a Zillow enrichment record (builder style).
    #[must_use]
    pub fn with_zillow(self, record: ZillowEnrichment) -> Self {
        self.zillow.lock().expect("poisoned").push(record);
        self
    }

    /// Properties matching `state`/`city` (case-insensitively, when
    /// supplied), capped at `limit` — backs the internal comp-candidate scan
    /// (spec §4.E.3).
    #[must_use]
    pub fn properties_in_market(&self, city: Option<&str>, state: Option<&str>, limit: usize) -> Vec<CrmProperty> {
        self.properties
            .lock()
            .expect("poisoned")
            .iter()
            .filter(|p| state.is_none_or(|s| p.state.as_deref().is_some_and(|ps| ps.eq_ignore_ascii_case(s))))
            .filter(|p| city.is_none_or(|c| p.city.as_deref().is_some_and(|pc| pc.eq_ignore_ascii_case(c))))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Find the CRM property matching `raw_address` (spec supplement,
    /// `_shared.py` `find_matching_crm_property`): scope to `state`/`city`
    /// when known, prefer an exact address match, fall back to a substring
    /// match either direction.
    #[must_use]
    pub fn find_matching(&self, raw_address: &str, city: Option<&str>, state: Option<&str>) -> Option<CrmProperty> {
        let properties = self.properties.lock().expect("poisoned");
        let scoped: Vec<&CrmProperty> = properties
            .iter()
            .filter(|p| state.is_none_or(|s| p.state.as_deref().is_some_and(|ps| ps.eq_ignore_ascii_case(s))))
            .filter(|p| city.is_none_or(|c| p.city.as_deref().is_some_and(|pc| pc.eq_ignore_ascii_case(c))))
            .collect();

        let raw_lower = raw_address.to_lowercase();
        scoped
            .iter()
            .find(|p| p.address.eq_ignore_ascii_case(raw_address))
            .or_else(|| scoped.iter().find(|p| p.address.to_lowercase().contains(&raw_lower)))
            .map(|p| (*p).clone())
    }

    /// The most recently created skip trace for a property, if any.
    #[must_use]
    pub fn latest_skip_trace(&self, property_id: u64) -> Option<SkipTraceRecord> {
        self.skip_traces
            .lock()
            .expect("poisoned")
            .iter()
            .filter(|s| s.property_id == property_id)
            .max_by_key(|s| s.created_at)
            .cloned()
    }

    /// The Zillow enrichment row for a property, if any.
    #[must_use]
    pub fn zillow_for(&self, property_id: u64) -> Option<ZillowEnrichment> {
        self.zillow.lock().expect("poisoned").iter().find(|z| z.property_id == property_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-07-28T00:00:00Z").unwrap().with_timezone(&Utc)
    }

    fn property(id: u64, address: &str) -> CrmProperty {
        CrmProperty {
            id,
            address: address.into(),
            city: Some("Newark".into()),
            state: Some("NJ".into()),
            zip_code: Some("07102".into()),
            square_feet: Some(1500),
            lot_size: None,
            bedrooms: Some(3),
            bathrooms: Some(2.0),
            year_built: Some(1990),
            price: Some(400_000.0),
            updated_at: now(),
            created_at: now(),
        }
    }

    #[test]
    fn find_matching_prefers_exact_then_substring() {
        let fixture = CrmFixture::new().with_property(property(1, "123 Main St")).with_property(property(2, "456 Oak Ave"));
        let found = fixture.find_matching("123 Main St", Some("Newark"), Some("NJ")).unwrap();
        assert_eq!(found.id, 1);

        let substring = fixture.find_matching("Ave", Some("Newark"), Some("NJ"));
        assert_eq!(substring.unwrap().id, 2);
    }

    #[test]
    fn resolve_ttl_defaults_to_168_only_when_strictly_required() {
        let mut strict = Assumptions { require_enriched_data: Some(true), ..Assumptions::default() };
        assert_eq!(resolve_enrichment_max_age_hours(&strict), Some(168));
        strict.require_enriched_data = Some(false);
        assert_eq!(resolve_enrichment_max_age_hours(&strict), None);
    }

    #[test]
    fn enrichment_status_stale_beyond_ttl_is_not_fresh() {
        let zillow = ZillowEnrichment {
            id: 1,
            property_id: 1,
            annual_tax_amount: None,
            zestimate: None,
            rent_zestimate: None,
            price_history: vec![],
            zillow_url: None,
            updated_at: now() - chrono::Duration::hours(200),
        };
        let status = compute_enrichment_status(Some(&property(1, "123 Main St")), None, Some(&zillow), Some(24), now());
        assert_eq!(status.is_fresh, Some(false));
        assert!(status.age_hours.unwrap() > 24.0);
    }

    #[test]
    fn enrichment_status_missing_latest_is_not_fresh_when_ttl_set() {
        let status = compute_enrichment_status(None, None, None, Some(24), now());
        assert_eq!(status.is_fresh, Some(false));
        assert!(status.age_hours.is_none());
    }

    #[test]
    fn enrichment_status_no_ttl_leaves_freshness_null() {
        let status = compute_enrichment_status(None, None, None, None, now());
        assert_eq!(status.is_fresh, None);
    }
}
