//! The eight geocoded GIS lookups: flood zone, EPA environmental hazards,
//! wildfire hazard, HUD opportunity zone, wetlands, historic places, seismic
//! hazard, and school district (spec §4.H "extensive" group, grounded on
//! `environmental.py`). Each is opt-in via `extra_agents: ["extensive"]` and
//! shares one geocode-gate/adapter-call/error-mapping shape.

use crate::profile::upstream_profile;
use arc_adapters::GisAdapter;
use arc_core::{EvidenceDraft, Unknown};
use arc_protocol::{Worker, WorkerContext, WorkerOutput};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(20);

/// Outcome of the shared geocode-gate + adapter-call step every GIS worker
/// below starts from.
enum GisOutcome {
    /// `normalize_geocode` never resolved coordinates for this property.
    NoGeo,
    /// The adapter call failed.
    Failed(String),
    /// The adapter call succeeded; here is the decoded body.
    Ok(Value),
}

fn point_query_params(lat: f64, lng: f64, out_fields: &str) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    params.insert("geometry".to_string(), format!("{lng},{lat}"));
    params.insert("geometryType".to_string(), "esriGeometryPoint".to_string());
    params.insert("inSR".to_string(), "4326".to_string());
    params.insert("spatialRel".to_string(), "esriSpatialRelIntersects".to_string());
    params.insert("outFields".to_string(), out_fields.to_string());
    params.insert("f".to_string(), "json".to_string());
    params
}

async fn run_point_lookup(ctx: &WorkerContext, gis: &dyn GisAdapter, base_url: &str, out_fields: &str) -> GisOutcome {
    let Some(profile) = upstream_profile(ctx).await else { return GisOutcome::NoGeo };
    let (Some(lat), Some(lng)) = (profile.geo.lat, profile.geo.lng) else { return GisOutcome::NoGeo };
    let params = point_query_params(lat, lng, out_fields);
    match gis.get(base_url, &params, LOOKUP_TIMEOUT).await {
        Ok(value) => GisOutcome::Ok(value),
        Err(e) => GisOutcome::Failed(e),
    }
}

/// Every feature's `attributes` object out of a typical ArcGIS FeatureServer
/// `query` response shape: `{"features": [{"attributes": {...}}, ...]}`.
fn feature_attributes(value: &Value) -> Vec<&Map<String, Value>> {
    value
        .get("features")
        .and_then(Value::as_array)
        .map(|features| features.iter().filter_map(|f| f.get("attributes")).filter_map(Value::as_object).collect())
        .unwrap_or_default()
}

fn unknown_output(field: &str, reason: &str) -> WorkerOutput {
    WorkerOutput {
        data: Value::Null,
        unknowns: vec![Unknown { field: field.to_string(), reason: reason.to_string() }],
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

fn str_field(attrs: &Map<String, Value>, key: &str) -> Option<String> {
    attrs.get(key).and_then(Value::as_str).map(str::to_string)
}

fn f64_field(attrs: &Map<String, Value>, key: &str) -> Option<f64> {
    attrs.get(key).and_then(Value::as_f64)
}

macro_rules! gis_worker {
    ($name:ident, $worker_name:literal, $base_url:literal, $out_fields:literal) => {
        /// See module docs.
        pub struct $name {
            gis: Arc<dyn GisAdapter>,
        }

        impl $name {
            /// Build against a GIS adapter.
            #[must_use]
            pub fn new(gis: Arc<dyn GisAdapter>) -> Self {
                Self { gis }
            }
        }

        impl $name {
            const BASE_URL: &'static str = $base_url;
        }

        #[async_trait]
        impl Worker for $name {
            fn name(&self) -> &str {
                $worker_name
            }

            async fn run(&self, ctx: &WorkerContext) -> Result<WorkerOutput, String> {
                match run_point_lookup(ctx, self.gis.as_ref(), Self::BASE_URL, $out_fields).await {
                    GisOutcome::NoGeo => Ok(unknown_output($worker_name, "No geocoded coordinates available to run the lookup.")),
                    GisOutcome::Failed(e) => Ok(failed_output($worker_name, Self::BASE_URL, e)),
                    GisOutcome::Ok(value) => Ok(self.build_output(value)),
                }
            }
        }
    };
}

gis_worker!(FloodZone, "flood_zone", "https://hazards.fema.gov/gis/nfhl/rest/services/public/NFHL/MapServer/28/query", "FLD_ZONE,ZONE_SUBTY,SFHA_TF");

impl FloodZone {
    fn build_output(&self, value: Value) -> WorkerOutput {
        let attrs = feature_attributes(&value);
        let Some(attrs) = attrs.first() else {
            return unknown_output("flood_zone", "No FEMA flood zone feature returned for these coordinates.");
        };
        let zone = str_field(attrs, "FLD_ZONE");
        let zone_subtype = str_field(attrs, "ZONE_SUBTY");
        let special_flood_hazard_area = attrs.get("SFHA_TF").and_then(Value::as_str).map(|v| v.eq_ignore_ascii_case("t"));

        let evidence = vec![EvidenceDraft::new(
            "flood_zone",
            format!("FEMA flood zone {} identified for this parcel.", zone.as_deref().unwrap_or("unknown")),
            Self::BASE_URL,
            zone_subtype.clone(),
            0.95,
        )];

        WorkerOutput {
            data: serde_json::json!({ "flood_zone": { "zone": zone, "zone_subtype": zone_subtype, "special_flood_hazard_area": special_flood_hazard_area } }),
            unknowns: Vec::new(),
            errors: Vec::new(),
            evidence,
            web_calls: 1,
            cost_usd: 0.0,
        }
    }
}

gis_worker!(
    EpaEnvironmental,
    "epa_environmental",
    "https://enviro.epa.gov/arcgis/rest/services/OAR_OAQPS/FacilitySiting/MapServer/0/query",
    "FAC_NAME,PGM_SYS_ACRNMS,NAICS_CODE"
);

impl EpaEnvironmental {
    fn build_output(&self, value: Value) -> WorkerOutput {
        let facilities: Vec<Value> = feature_attributes(&value)
            .into_iter()
            .map(|attrs| {
                serde_json::json!({
                    "name": str_field(attrs, "FAC_NAME"),
                    "program": str_field(attrs, "PGM_SYS_ACRNMS"),
                    "naics_code": str_field(attrs, "NAICS_CODE"),
                })
            })
            .collect();

        if facilities.is_empty() {
            return unknown_output("epa_environmental", "No EPA-regulated facilities found near this parcel.");
        }

        let evidence = vec![EvidenceDraft::new(
            "epa_environmental",
            format!("{} EPA-regulated facilit{} found nearby.", facilities.len(), if facilities.len() == 1 { "y" } else { "ies" }),
            Self::BASE_URL,
            None,
            0.95,
        )];

        WorkerOutput {
            data: serde_json::json!({ "epa_environmental": { "nearby_facilities": facilities } }),
            unknowns: Vec::new(),
            errors: Vec::new(),
            evidence,
            web_calls: 1,
            cost_usd: 0.0,
        }
    }
}

gis_worker!(
    WildfireHazard,
    "wildfire_hazard",
    "https://usfs.maps.arcgis.com/arcgis/rest/services/WHP_2020/MapServer/0/query",
    "WHP,WHP_LABEL"
);

impl WildfireHazard {
    fn build_output(&self, value: Value) -> WorkerOutput {
        let attrs = feature_attributes(&value);
        let Some(attrs) = attrs.first() else {
            return unknown_output("wildfire_hazard", "No USFS wildfire hazard potential data returned for these coordinates.");
        };
        let class = attrs.get("WHP").and_then(Value::as_i64);
        let label = str_field(attrs, "WHP_LABEL");

        let evidence = vec![EvidenceDraft::new(
            "wildfire_hazard",
            format!("Wildfire hazard potential: {}.", label.as_deref().unwrap_or("unclassified")),
            Self::BASE_URL,
            None,
            0.95,
        )];

        WorkerOutput {
            data: serde_json::json!({ "wildfire_hazard": { "class": class, "label": label } }),
            unknowns: Vec::new(),
            errors: Vec::new(),
            evidence,
            web_calls: 1,
            cost_usd: 0.0,
        }
    }
}

gis_worker!(
    HudOpportunity,
    "hud_opportunity",
    "https://hudgis-hud.opendata.arcgis.com/arcgis/rest/services/Opportunity_Zones/MapServer/0/query",
    "GEOID,OZ_FLAG"
);

impl HudOpportunity {
    fn build_output(&self, value: Value) -> WorkerOutput {
        let attrs = feature_attributes(&value);
        let Some(attrs) = attrs.first() else {
            return WorkerOutput {
                data: serde_json::json!({ "hud_opportunity": { "is_opportunity_zone": false, "tract_id": null } }),
                unknowns: Vec::new(),
                errors: Vec::new(),
                evidence: vec![EvidenceDraft::new(
                    "hud_opportunity",
                    "Parcel does not fall within a designated HUD Opportunity Zone tract.",
                    Self::BASE_URL,
                    None,
                    0.95,
                )],
                web_calls: 1,
                cost_usd: 0.0,
            };
        };
        let tract_id = str_field(attrs, "GEOID");
        let is_opportunity_zone = attrs.get("OZ_FLAG").and_then(Value::as_str).map(|v| v == "1").unwrap_or(false);

        let evidence = vec![EvidenceDraft::new(
            "hud_opportunity",
            if is_opportunity_zone { "Parcel falls within a designated HUD Opportunity Zone tract." } else { "Parcel tract is not a designated HUD Opportunity Zone." },
            Self::BASE_URL,
            tract_id.clone(),
            0.95,
        )];

        WorkerOutput {
            data: serde_json::json!({ "hud_opportunity": { "is_opportunity_zone": is_opportunity_zone, "tract_id": tract_id } }),
            unknowns: Vec::new(),
            errors: Vec::new(),
            evidence,
            web_calls: 1,
            cost_usd: 0.0,
        }
    }
}

gis_worker!(
    Wetlands,
    "wetlands",
    "https://www.fws.gov/wetlandsmapper/rest/services/Wetlands/MapServer/0/query",
    "WETLAND_TYPE,ATTRIBUTE"
);

impl Wetlands {
    fn build_output(&self, value: Value) -> WorkerOutput {
        let attrs = feature_attributes(&value);
        let Some(attrs) = attrs.first() else {
            return WorkerOutput {
                data: serde_json::json!({ "wetlands": { "present": false, "wetland_type": null } }),
                unknowns: Vec::new(),
                errors: Vec::new(),
                evidence: vec![EvidenceDraft::new("wetlands", "No National Wetlands Inventory feature overlaps this parcel.", Self::BASE_URL, None, 0.95)],
                web_calls: 1,
                cost_usd: 0.0,
            };
        };
        let wetland_type = str_field(attrs, "WETLAND_TYPE");

        let evidence = vec![EvidenceDraft::new(
            "wetlands",
            format!("National Wetlands Inventory feature ({}) overlaps this parcel.", wetland_type.as_deref().unwrap_or("unclassified")),
            Self::BASE_URL,
            None,
            0.95,
        )];

        WorkerOutput {
            data: serde_json::json!({ "wetlands": { "present": true, "wetland_type": wetland_type } }),
            unknowns: Vec::new(),
            errors: Vec::new(),
            evidence,
            web_calls: 1,
            cost_usd: 0.0,
        }
    }
}

gis_worker!(
    HistoricPlaces,
    "historic_places",
    "https://mapservices.nps.gov/arcgis/rest/services/cultural_resources/nrhp/MapServer/0/query",
    "RESNAME,LISTED_DATE"
);

impl HistoricPlaces {
    fn build_output(&self, value: Value) -> WorkerOutput {
        let attrs = feature_attributes(&value);
        let Some(attrs) = attrs.first() else {
            return WorkerOutput {
                data: serde_json::json!({ "historic_places": { "listed": false, "name": null, "listed_date": null } }),
                unknowns: Vec::new(),
                errors: Vec::new(),
                evidence: vec![EvidenceDraft::new("historic_places", "Parcel is not listed on the National Register of Historic Places.", Self::BASE_URL, None, 0.95)],
                web_calls: 1,
                cost_usd: 0.0,
            };
        };
        let resource_name = str_field(attrs, "RESNAME");
        let listed_date = str_field(attrs, "LISTED_DATE");

        let evidence = vec![EvidenceDraft::new(
            "historic_places",
            format!("Parcel is listed on the National Register of Historic Places as '{}'.", resource_name.as_deref().unwrap_or("unnamed resource")),
            Self::BASE_URL,
            listed_date.clone(),
            0.95,
        )];

        WorkerOutput {
            data: serde_json::json!({ "historic_places": { "listed": true, "name": resource_name, "listed_date": listed_date } }),
            unknowns: Vec::new(),
            errors: Vec::new(),
            evidence,
            web_calls: 1,
            cost_usd: 0.0,
        }
    }
}

gis_worker!(
    SeismicHazard,
    "seismic_hazard",
    "https://earthquake.usgs.gov/arcgis/rest/services/haz/design_maps/MapServer/0/query",
    "PGA,SS,S1"
);

impl SeismicHazard {
    fn build_output(&self, value: Value) -> WorkerOutput {
        let attrs = feature_attributes(&value);
        let Some(attrs) = attrs.first() else {
            return unknown_output("seismic_hazard", "No USGS seismic hazard data returned for these coordinates.");
        };
        let pga_g = f64_field(attrs, "PGA");

        let evidence = vec![EvidenceDraft::new(
            "seismic_hazard",
            match pga_g {
                Some(pga) => format!("USGS peak ground acceleration of {pga:.2}g at this site."),
                None => "USGS seismic hazard data returned without a resolvable PGA value.".to_string(),
            },
            Self::BASE_URL,
            None,
            0.95,
        )];

        WorkerOutput {
            data: serde_json::json!({ "seismic_hazard": { "pga_g": pga_g } }),
            unknowns: Vec::new(),
            errors: Vec::new(),
            evidence,
            web_calls: 1,
            cost_usd: 0.0,
        }
    }
}

gis_worker!(
    SchoolDistrict,
    "school_district",
    "https://tigerweb.geo.census.gov/arcgis/rest/services/TIGERweb/School/MapServer/0/query",
    "UNSDLEA,NAME"
);

impl SchoolDistrict {
    fn build_output(&self, value: Value) -> WorkerOutput {
        let attrs = feature_attributes(&value);
        let Some(attrs) = attrs.first() else {
            return unknown_output("school_district", "No Census TIGER school district boundary returned for these coordinates.");
        };
        let name = str_field(attrs, "NAME");
        let unified_district_id = str_field(attrs, "UNSDLEA");

        let evidence = vec![EvidenceDraft::new(
            "school_district",
            format!("Parcel falls within the {} school district.", name.as_deref().unwrap_or("unknown")),
            Self::BASE_URL,
            unified_district_id.clone(),
            0.95,
        )];

        WorkerOutput {
            data: serde_json::json!({ "school_district": { "name": name, "unified_district_id": unified_district_id } }),
            unknowns: Vec::new(),
            errors: Vec::new(),
            evidence,
            web_calls: 1,
            cost_usd: 0.0,
        }
    }
}
