//! Deterministic comparable-sales/rentals filtering, scoring, and ranking
//! (spec §4.F).

use crate::entities::{CompDetails, CompRental, CompSale};
use crate::source_quality::source_quality_score;
use chrono::{Datelike, NaiveDate};

/// Cities for which [`default_radius_mi`] returns the tighter 1.0mi radius.
pub const URBAN_RADIUS_CITIES: &[&str] = &[
    "new york",
    "newark",
    "jersey city",
    "hoboken",
    "philadelphia",
    "boston",
    "chicago",
    "los angeles",
    "san francisco",
    "washington",
    "miami",
    "atlanta",
    "houston",
    "dallas",
    "seattle",
];

/// Deterministic default comp-search radius: 1.0mi for known urban markets,
/// 3.0mi otherwise.
#[must_use]
pub fn default_radius_mi(city: Option<&str>) -> f64 {
    let normalized = city.unwrap_or("").trim().to_lowercase();
    if URBAN_RADIUS_CITIES.contains(&normalized.as_str()) {
        1.0
    } else {
        3.0
    }
}

fn clamp01(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

/// Distance proxy used in lieu of a real geospatial distance: same ZIP is
/// "close", same city+state is "nearby", same state is "regional", anything
/// else is treated as effectively out of range.
#[must_use]
pub fn distance_proxy_mi(
    target_zip: Option<&str>,
    candidate_zip: Option<&str>,
    target_city: Option<&str>,
    candidate_city: Option<&str>,
    target_state: Option<&str>,
    candidate_state: Option<&str>,
) -> f64 {
    if let (Some(tz), Some(cz)) = (target_zip, candidate_zip) {
        if !tz.is_empty() && tz == cz {
            return 0.5;
        }
    }
    if let (Some(tc), Some(cc), Some(ts), Some(cs)) = (target_city, candidate_city, target_state, candidate_state) {
        if tc.to_lowercase() == cc.to_lowercase() && ts.to_lowercase() == cs.to_lowercase() {
            return 1.5;
        }
    }
    if let (Some(ts), Some(cs)) = (target_state, candidate_state) {
        if ts.to_lowercase() == cs.to_lowercase() {
            return 4.0;
        }
    }
    50.0
}

/// Months between `value` and `today` (or 999 if `value` is unknown).
#[must_use]
pub fn recency_months(value: Option<NaiveDate>, today: NaiveDate) -> i64 {
    let Some(value) = value else {
        return 999;
    };
    i64::from(today.year() - value.year()) * 12 + i64::from(today.month() as i32 - value.month() as i32)
}

/// Hard eligibility filters a candidate must clear before it is scored at
/// all (spec §4.F.1).
#[must_use]
#[allow(clippy::too_many_arguments)]
pub fn passes_hard_filters(
    distance_mi: f64,
    radius_mi: f64,
    sale_or_list_date: Option<NaiveDate>,
    today: NaiveDate,
    max_recency_months: i64,
    target_sqft: Option<i64>,
    candidate_sqft: Option<i64>,
    target_beds: Option<i64>,
    candidate_beds: Option<i64>,
    target_baths: Option<f64>,
    candidate_baths: Option<f64>,
) -> bool {
    if distance_mi > radius_mi {
        return false;
    }
    if recency_months(sale_or_list_date, today) > max_recency_months {
        return false;
    }
    if let (Some(t), Some(c)) = (target_sqft, candidate_sqft) {
        if t > 0 {
            let lower = t as f64 * 0.75;
            let upper = t as f64 * 1.25;
            if (c as f64) < lower || (c as f64) > upper {
                return false;
            }
        }
    }
    if let (Some(t), Some(c)) = (target_beds, candidate_beds) {
        if (t - c).abs() > 1 {
            return false;
        }
    }
    if let (Some(t), Some(c)) = (target_baths, candidate_baths) {
        if (t - c).abs() > 1.0 {
            return false;
        }
    }
    true
}

/// Weighted similarity score in `[0, 1]`, rounded to 6 decimal places
/// (spec §4.F.1): `0.35` distance + `0.30` sqft + `0.20` beds/baths + `0.15`
/// recency.
#[must_use]
#[allow(clippy::too_many_arguments)]
pub fn similarity_score(
    distance_mi: f64,
    radius_mi: f64,
    target_sqft: Option<i64>,
    candidate_sqft: Option<i64>,
    target_beds: Option<i64>,
    candidate_beds: Option<i64>,
    target_baths: Option<f64>,
    candidate_baths: Option<f64>,
    sale_or_list_date: Option<NaiveDate>,
    today: NaiveDate,
) -> f64 {
    let distance_component = clamp01(1.0 - (distance_mi / radius_mi.max(0.1)));

    let sqft_component = match (target_sqft, candidate_sqft) {
        (Some(t), Some(c)) if t > 0 => clamp01(1.0 - (c - t).unsigned_abs() as f64 / t.max(1) as f64),
        _ => 0.5,
    };

    let bed_component = match (target_beds, candidate_beds) {
        (Some(t), Some(c)) => {
            let diff = (t - c).abs();
            if diff == 0 {
                1.0
            } else if diff == 1 {
                0.6
            } else {
                0.0
            }
        }
        _ => 0.5,
    };

    let bath_component = match (target_baths, candidate_baths) {
        (Some(t), Some(c)) => {
            let diff = (t - c).abs();
            if diff == 0.0 {
                1.0
            } else if diff <= 1.0 {
                0.6
            } else {
                0.0
            }
        }
        _ => 0.5,
    };

    let months = recency_months(sale_or_list_date, today);
    let recency_component = clamp01(1.0 - (months as f64 / 12.0));

    let bed_bath_component = (bed_component + bath_component) / 2.0;

    let score = 0.35 * distance_component + 0.30 * sqft_component + 0.20 * bed_bath_component + 0.15 * recency_component;
    (clamp01(score) * 1_000_000.0).round() / 1_000_000.0
}

/// Blend a similarity score with source trust: `0.85 * similarity + 0.15 *
/// source_quality`, rounded to 6 decimal places (spec §4.F.1).
#[must_use]
pub fn effective_score(similarity: f64, source_quality: f64) -> f64 {
    (clamp01(0.85 * similarity + 0.15 * source_quality) * 1_000_000.0).round() / 1_000_000.0
}

/// Minimal surface [`dedupe_and_rank`] needs from a comp candidate, shared
/// between [`CompSale`] and [`CompRental`].
pub trait RankableComp {
    /// Comparable's address, for dedupe keying.
    fn address(&self) -> &str;
    /// Comparable's source URL, for dedupe keying and scoring.
    fn source_url(&self) -> &str;
    /// The raw similarity score already computed for this candidate.
    fn similarity_score(&self) -> f64;
    /// Sort-order date; `None` sorts as the oldest possible date.
    fn sort_date(&self) -> Option<NaiveDate>;
    /// Record computed source-quality/effective-score detail.
    fn set_details(&mut self, details: CompDetails);
    /// Effective score after [`RankableComp::set_details`] has run.
    fn effective_score(&self) -> f64;
}

impl RankableComp for CompSale {
    fn address(&self) -> &str {
        &self.address
    }
    fn source_url(&self) -> &str {
        &self.source_url
    }
    fn similarity_score(&self) -> f64 {
        self.similarity_score
    }
    fn sort_date(&self) -> Option<NaiveDate> {
        self.sale_date
    }
    fn set_details(&mut self, details: CompDetails) {
        self.details = details;
    }
    fn effective_score(&self) -> f64 {
        self.details.effective_score
    }
}

impl RankableComp for CompRental {
    fn address(&self) -> &str {
        &self.address
    }
    fn source_url(&self) -> &str {
        &self.source_url
    }
    fn similarity_score(&self) -> f64 {
        self.similarity_score
    }
    fn sort_date(&self) -> Option<NaiveDate> {
        self.date_listed
    }
    fn set_details(&mut self, details: CompDetails) {
        self.details = details;
    }
    fn effective_score(&self) -> f64 {
        self.details.effective_score
    }
}

/// Dedupe candidates by `(address, source_url)` (case-insensitive, first
/// occurrence wins), compute each survivor's effective score, then sort by
/// `(effective_score, similarity_score, date)` descending and truncate to
/// `top_n` (spec §4.F.1).
pub fn dedupe_and_rank<T: RankableComp>(
    comps: Vec<T>,
    top_n: usize,
    origin_source_quality: impl Fn(&T) -> (crate::entities::CompOrigin, f64),
) -> Vec<T> {
    let mut seen = std::collections::HashSet::new();
    let mut deduped: Vec<T> = Vec::new();
    for comp in comps {
        let key = (comp.address().trim().to_lowercase(), comp.source_url().trim().to_lowercase());
        if !seen.insert(key) {
            continue;
        }
        deduped.push(comp);
    }

    for comp in &mut deduped {
        let (origin, source_quality) = origin_source_quality(comp);
        let effective = effective_score(comp.similarity_score(), source_quality);
        comp.set_details(CompDetails {
            origin,
            source_quality,
            effective_score: effective,
        });
    }

    deduped.sort_by(|a, b| {
        let a_key = (a.effective_score(), a.similarity_score(), a.sort_date());
        let b_key = (b.effective_score(), b.similarity_score(), b.sort_date());
        b_key.partial_cmp(&a_key).unwrap_or(std::cmp::Ordering::Equal)
    });
    deduped.truncate(top_n);
    deduped
}

/// Convenience wrapper around [`source_quality_score`] for comp categories.
#[must_use]
pub fn comp_source_quality(source_url: &str) -> f64 {
    source_quality_score(Some(source_url), Some("comps"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_zip_is_closest() {
        assert_eq!(
            distance_proxy_mi(Some("07102"), Some("07102"), None, None, None, None),
            0.5
        );
    }

    #[test]
    fn same_city_state_is_nearby() {
        assert_eq!(
            distance_proxy_mi(None, None, Some("Newark"), Some("NEWARK"), Some("NJ"), Some("nj")),
            1.5
        );
    }

    #[test]
    fn same_state_is_regional() {
        assert_eq!(distance_proxy_mi(None, None, None, None, Some("NJ"), Some("nj")), 4.0);
    }

    #[test]
    fn no_overlap_is_out_of_range() {
        assert_eq!(distance_proxy_mi(None, None, None, None, None, None), 50.0);
    }

    #[test]
    fn recency_months_counts_whole_months() {
        let today = NaiveDate::from_ymd_opt(2026, 7, 28).unwrap();
        let six_months_ago = NaiveDate::from_ymd_opt(2026, 1, 28).unwrap();
        assert_eq!(recency_months(Some(six_months_ago), today), 6);
        assert_eq!(recency_months(None, today), 999);
    }

    #[test]
    fn sqft_outside_band_fails_hard_filter() {
        let today = NaiveDate::from_ymd_opt(2026, 7, 28).unwrap();
        assert!(!passes_hard_filters(0.5, 1.0, Some(today), today, 12, Some(1000), Some(2000), None, None, None, None));
    }

    #[test]
    fn similarity_score_is_bounded_and_rounded() {
        let today = NaiveDate::from_ymd_opt(2026, 7, 28).unwrap();
        let score = similarity_score(0.5, 1.0, Some(1000), Some(1000), Some(3), Some(3), Some(2.0), Some(2.0), Some(today), today);
        assert!((0.0..=1.0).contains(&score));
        assert_eq!(score, (score * 1_000_000.0).round() / 1_000_000.0);
    }

    #[test]
    fn effective_score_blends_source_quality() {
        let score = effective_score(1.0, 1.0);
        assert_eq!(score, 1.0);
        let score = effective_score(0.0, 0.0);
        assert_eq!(score, 0.0);
    }
}
