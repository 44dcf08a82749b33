//! Parameterized HTTP GIS adapter contract (spec §4.C), shared by every
//! environmental/neighborhood worker (flood zone, EPA, wildfire, HUD,
//! wetlands, historic places, seismic, school district, walkability, ...).

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// Uniform HTTP GIS lookup. Implementations must honor `timeout` and must
/// resolve to `Err` rather than panic on any transport or decode failure —
/// the calling worker converts that into `unknowns`/`errors`, never a crash.
#[async_trait]
pub trait GisAdapter: Send + Sync {
    /// Issue a GET-shaped lookup against `base_url` with `params`, bounded by
    /// `timeout`. Returns the decoded JSON body or a short error string.
    async fn get(&self, base_url: &str, params: &BTreeMap<String, String>, timeout: Duration) -> Result<Value, String>;
}

/// Default [`GisAdapter`] that fails every lookup — used when no live
/// backend is wired in (spec §6.3: "no real third-party API schemas").
#[derive(Debug, Default, Clone, Copy)]
pub struct NullGis;

#[async_trait]
impl GisAdapter for NullGis {
    async fn get(&self, _base_url: &str, _params: &BTreeMap<String, String>, _timeout: Duration) -> Result<Value, String> {
        Err("no GIS adapter configured".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_gis_always_fails_closed() {
        let result = NullGis.get("https://example.com", &BTreeMap::new(), Duration::from_secs(1)).await;
        assert!(result.is_err());
    }
}
