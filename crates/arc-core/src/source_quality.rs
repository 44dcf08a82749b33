//! Deterministic source-trust scoring (spec §4.C).

/// Domains (or TLDs) whose data is treated as authoritative.
pub const HIGH_TRUST_DOMAINS: &[&str] = &[".gov", "tax.nj.gov", "countyoffice.org", "arcgis.com", "esri.com"];

/// Domains whose data is treated as reputable but not authoritative.
pub const MEDIUM_TRUST_DOMAINS: &[&str] = &[
    "realtor.com",
    "redfin.com",
    "zillow.com",
    "trulia.com",
    "loopnet.com",
    "crexi.com",
];

/// Score a `source_url` in `[0, 1]` by how much an underwriter should trust
/// claims attributed to it.
///
/// - missing url: `0.25`
/// - `internal://...` (CRM/internal fixtures): `0.95`
/// - `*.gov` or a [`HIGH_TRUST_DOMAINS`] suffix: `0.95`
/// - a [`MEDIUM_TRUST_DOMAINS`] suffix: `0.70`
/// - otherwise, `category` in `{public_records, permits, subdivision}`: `0.45`
/// - otherwise: `0.50`
#[must_use]
pub fn source_quality_score(source_url: Option<&str>, category: Option<&str>) -> f64 {
    let Some(source_url) = source_url.filter(|s| !s.is_empty()) else {
        return 0.25;
    };
    if source_url.starts_with("internal://") {
        return 0.95;
    }

    let host = extract_host(source_url);
    let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
    if host.is_empty() {
        return 0.25;
    }

    if host.ends_with(".gov") || HIGH_TRUST_DOMAINS.iter().any(|d| host.ends_with(d)) {
        return 0.95;
    }
    if MEDIUM_TRUST_DOMAINS.iter().any(|d| host.ends_with(d)) {
        return 0.70;
    }
    if matches!(category, Some("public_records" | "permits" | "subdivision")) {
        return 0.45;
    }
    0.50
}

/// Pull the lowercased host out of a URL-ish string without requiring a full
/// URL parser dependency; tolerant of missing schemes.
fn extract_host(url: &str) -> String {
    let without_scheme = url.split("://").nth(1).unwrap_or(url);
    let host = without_scheme
        .split(['/', '?', '#'])
        .next()
        .unwrap_or("")
        .split('@')
        .next_back()
        .unwrap_or("");
    let host = host.rsplit_once(':').map_or(host, |(h, _)| h);
    host.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_url_is_low_trust() {
        assert_eq!(source_quality_score(None, None), 0.25);
        assert_eq!(source_quality_score(Some(""), None), 0.25);
    }

    #[test]
    fn internal_urls_are_high_trust() {
        assert_eq!(source_quality_score(Some("internal://crm/42"), None), 0.95);
    }

    #[test]
    fn gov_domains_are_high_trust() {
        assert_eq!(source_quality_score(Some("https://tax.nj.gov/records/1"), None), 0.95);
        assert_eq!(source_quality_score(Some("https://www.countyoffice.org/x"), None), 0.95);
    }

    #[test]
    fn medium_trust_portals_score_070() {
        assert_eq!(source_quality_score(Some("https://www.zillow.com/homedetails/1"), None), 0.70);
        assert_eq!(source_quality_score(Some("https://www.redfin.com/x"), None), 0.70);
    }

    #[test]
    fn unclassified_records_categories_score_045() {
        assert_eq!(
            source_quality_score(Some("https://example.com/deed"), Some("public_records")),
            0.45
        );
    }

    #[test]
    fn unclassified_general_scores_050() {
        assert_eq!(source_quality_score(Some("https://example.com/a"), None), 0.50);
    }

    #[test]
    fn host_extraction_ignores_userinfo_and_port() {
        assert_eq!(extract_host("https://user:pw@www.zillow.com:443/a"), "www.zillow.com");
    }
}
