//! Assembles the fixed map of worker name to [`Worker`] implementation that
//! the supervisor dispatches against (spec §9: "model each worker as a
//! capability value in a registry map, not a class hierarchy"). Construction
//! is the one place adapters, fixtures, and API keys get wired together.

use crate::comps::{CompsRentals, CompsSales};
use crate::crm::CrmFixture;
use crate::dossier::DossierWriter;
use crate::environmental::{EpaEnvironmental, FloodZone, HistoricPlaces, HudOpportunity, SchoolDistrict, SeismicHazard, WildfireHazard, Wetlands};
use crate::geocode::NormalizeGeocode;
use crate::neighborhood::NeighborhoodIntel;
use crate::rapidapi::{Redfin, RentCast, UsRealEstate, WalkScore};
use crate::search_workers::{PermitsViolations, PublicRecords, SubdivisionResearch};
use crate::underwriting::UnderwritingWorker;
use arc_adapters::{GisAdapter, Geocoder, NarrativeLlm, SearchProvider};
use arc_protocol::Worker;
use std::collections::HashMap;
use std::sync::Arc;

/// RapidAPI-style API keys, injected at registry build time since
/// [`arc_config::Assumptions`] carries none of its own (spec §9 open
/// question: workers needing secrets hold them as constructor parameters,
/// not as fields threaded through a Job's assumptions).
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    /// Shared across the two RapidAPI-hosted lookups that bill per call
    /// (`us_real_estate`, `redfin`).
    pub rapidapi_key: Option<String>,
    /// Walk Score's own key, issued independently of RapidAPI.
    pub walk_score_key: Option<String>,
    /// RentCast's own key.
    pub rentcast_key: Option<String>,
}

/// Everything the registry needs to construct every worker. The supervisor
/// owns one of these per process and reuses it across jobs.
pub struct WorkerDependencies {
    /// Place autocomplete/details adapter.
    pub geocoder: Arc<dyn Geocoder>,
    /// Web search adapter, shared by every search-backed worker.
    pub search: Arc<dyn SearchProvider>,
    /// Generic query/HTTP adapter backing the ArcGIS and RapidAPI lookups.
    pub gis: Arc<dyn GisAdapter>,
    /// AI narrative adapter for neighborhood summaries and the dossier.
    pub llm: Arc<dyn NarrativeLlm>,
    /// Seeded internal CRM/skip-trace/Zillow dataset.
    pub crm: Arc<CrmFixture>,
    /// RapidAPI-family credentials.
    pub api_keys: ApiKeys,
}

/// The full worker name -> implementation map, keyed exactly as the
/// `AgentSpec`/pipeline definitions reference them.
pub type WorkerRegistry = HashMap<String, Arc<dyn Worker>>;

/// Build the registry every Job execution dispatches against.
#[must_use]
pub fn build_registry(deps: WorkerDependencies) -> WorkerRegistry {
    let mut registry: WorkerRegistry = HashMap::new();

    let mut insert = |worker: Arc<dyn Worker>| {
        registry.insert(worker.name().to_string(), worker);
    };

    insert(Arc::new(NormalizeGeocode::new(deps.geocoder.clone(), deps.crm.clone())));

    insert(Arc::new(CompsSales::new(deps.crm.clone(), deps.search.clone())));
    insert(Arc::new(CompsRentals::new(deps.crm.clone(), deps.search.clone())));

    insert(Arc::new(UnderwritingWorker::new()));

    insert(Arc::new(PublicRecords::new(deps.search.clone())));
    insert(Arc::new(PermitsViolations::new(deps.search.clone())));
    insert(Arc::new(SubdivisionResearch::new(deps.search.clone())));

    insert(Arc::new(FloodZone::new(deps.gis.clone())));
    insert(Arc::new(EpaEnvironmental::new(deps.gis.clone())));
    insert(Arc::new(WildfireHazard::new(deps.gis.clone())));
    insert(Arc::new(HudOpportunity::new(deps.gis.clone())));
    insert(Arc::new(Wetlands::new(deps.gis.clone())));
    insert(Arc::new(HistoricPlaces::new(deps.gis.clone())));
    insert(Arc::new(SeismicHazard::new(deps.gis.clone())));
    insert(Arc::new(SchoolDistrict::new(deps.gis.clone())));

    insert(Arc::new(UsRealEstate::new(deps.gis.clone(), deps.api_keys.rapidapi_key.clone())));
    insert(Arc::new(WalkScore::new(deps.gis.clone(), deps.api_keys.walk_score_key.clone())));
    insert(Arc::new(Redfin::new(deps.gis.clone(), deps.api_keys.rapidapi_key.clone())));
    insert(Arc::new(RentCast::new(deps.gis.clone(), deps.api_keys.rentcast_key.clone())));

    insert(Arc::new(NeighborhoodIntel::new(deps.search.clone(), deps.llm.clone())));

    insert(Arc::new(DossierWriter::new(deps.llm.clone())));

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use arc_adapters::{NullGeocoder, NullGis, NullNarrativeLlm, NullSearch};

    fn null_deps() -> WorkerDependencies {
        WorkerDependencies {
            geocoder: Arc::new(NullGeocoder),
            search: Arc::new(NullSearch),
            gis: Arc::new(NullGis),
            llm: Arc::new(NullNarrativeLlm),
            crm: Arc::new(CrmFixture::new()),
            api_keys: ApiKeys::default(),
        }
    }

    #[test]
    fn registers_every_worker() {
        let registry = build_registry(null_deps());
        for name in [
            "normalize_geocode",
            "comps_sales",
            "comps_rentals",
            "underwriting",
            "public_records",
            "permits_violations",
            "subdivision_research",
            "flood_zone",
            "epa_environmental",
            "wildfire_hazard",
            "hud_opportunity",
            "wetlands",
            "historic_places",
            "seismic_hazard",
            "school_district",
            "us_real_estate",
            "walk_score",
            "redfin",
            "rentcast",
            "neighborhood_intel",
            "dossier_writer",
        ] {
            assert!(registry.contains_key(name), "missing worker: {name}");
        }
        assert_eq!(registry.len(), 21);
    }
}
