//! Data Source Adapter Layer (spec §4.C): uniform, fail-closed contracts over
//! a geocoder, a web-search provider, parameterized HTTP GIS services, and
//! the narrative LLM. Every adapter returns `None`/`[]`/`Err` on failure —
//! none may panic or let a network error escape past the trait boundary.

#![warn(missing_docs)]

pub mod cache;
pub mod gis;
pub mod narrative;
pub mod search;

pub use cache::PortalCache;
pub use gis::{GisAdapter, NullGis};
pub use narrative::{NarrativeLlm, NullNarrativeLlm};
pub use search::{NullSearch, SearchHit, SearchProvider, StaticSearchProvider};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One autocomplete suggestion returned by a [`Geocoder`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceSuggestion {
    /// Opaque provider-assigned identifier, fed back into [`Geocoder::details`].
    pub place_id: String,
    /// Human-readable description shown to a user.
    pub description: String,
}

/// Full address detail resolved from a [`PlaceSuggestion::place_id`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceDetails {
    /// Fully formatted address string.
    pub formatted_address: String,
    /// City.
    pub city: Option<String>,
    /// Two-letter state code.
    pub state: Option<String>,
    /// ZIP code.
    pub zip: Option<String>,
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lng: f64,
}

/// Forward-geocoding contract (spec §4.C). Implementations must never throw;
/// any failure resolves to `None`/an empty list.
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// Suggest candidate places for free-text `input`, scoped to `country`.
    async fn autocomplete(&self, input: &str, country: &str) -> Vec<PlaceSuggestion>;
    /// Resolve full address detail for a suggestion's `place_id`.
    async fn details(&self, place_id: &str) -> Option<PlaceDetails>;
}

/// Default [`Geocoder`] that never resolves anything — used when no real
/// geocoding backend is configured (spec §4.C, §6.3: "no real third-party
/// API schemas").
#[derive(Debug, Default, Clone, Copy)]
pub struct NullGeocoder;

#[async_trait]
impl Geocoder for NullGeocoder {
    async fn autocomplete(&self, _input: &str, _country: &str) -> Vec<PlaceSuggestion> {
        Vec::new()
    }

    async fn details(&self, _place_id: &str) -> Option<PlaceDetails> {
        None
    }
}

/// Fixed, in-memory [`Geocoder`] for tests: resolves one address to one
/// coordinate, mirroring a deterministic fixture rather than a live API.
#[derive(Debug, Clone)]
pub struct StaticGeocoder {
    entries: Vec<(String, PlaceDetails)>,
}

impl StaticGeocoder {
    /// Build an empty fixture geocoder; add entries with [`Self::with_entry`].
    #[must_use]
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Register a fixture match keyed by case-insensitive address substring.
    #[must_use]
    pub fn with_entry(mut self, query_contains: impl Into<String>, details: PlaceDetails) -> Self {
        self.entries.push((query_contains.into().to_lowercase(), details));
        self
    }
}

impl Default for StaticGeocoder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Geocoder for StaticGeocoder {
    async fn autocomplete(&self, input: &str, _country: &str) -> Vec<PlaceSuggestion> {
        let lower = input.to_lowercase();
        self.entries
            .iter()
            .filter(|(key, _)| lower.contains(key.as_str()))
            .map(|(key, details)| PlaceSuggestion {
                place_id: key.clone(),
                description: details.formatted_address.clone(),
            })
            .collect()
    }

    async fn details(&self, place_id: &str) -> Option<PlaceDetails> {
        self.entries
            .iter()
            .find(|(key, _)| key == place_id)
            .map(|(_, details)| details.clone())
    }
}
