//! Deterministic extraction of comp-like rows out of narrative search-result
//! text (spec §4.F.2). Used when an external search provider returns prose
//! rather than structured listings.

use chrono::{Duration, NaiveDate};
use std::sync::LazyLock;

/// One row recovered from free text by [`extract_comp_entries_from_text`].
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedComp {
    /// Street address.
    pub address: String,
    /// City.
    pub city: String,
    /// Two-letter state code.
    pub state: String,
    /// ZIP code.
    pub zip_code: String,
    /// Sale price or monthly rent, depending on `comp_type`.
    pub price: f64,
    /// Bedroom count, if found nearby.
    pub beds: Option<i64>,
    /// Bathroom count, if found nearby.
    pub baths: Option<f64>,
    /// Square footage, if found nearby.
    pub sqft: Option<i64>,
    /// Sale/listing date, inferred or falling back to `published_date`.
    pub date: NaiveDate,
    /// Source URL, copied from the call site.
    pub source_url: String,
}

/// Which kind of comp this text is expected to describe; governs price
/// disambiguation in [`extract_price`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompKind {
    /// A completed sale.
    Sale,
    /// An active or recent rental listing.
    Rental,
}

static ADDRESS_PATTERN: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(\d{1,6}\s+[A-Za-z0-9 .#-]+,\s*[A-Za-z .-]+,\s*[A-Z]{2}\s*\d{5})").expect("static pattern")
});
static LEADING_YEAR: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^(?:19|20)\d{2}\s+(\d{1,6}\s+.+)$").expect("static pattern"));
static ADDRESS_COMPONENTS: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^(.+?),\s*([^,]+),\s*([A-Z]{2})\s*(\d{5})$").expect("static pattern"));
static BEDS_PATTERN: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"(?i)(\d{1,2})\s*(?:bds?|beds?)").expect("static pattern"));
static BATHS_PATTERN: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"(?i)(\d{1,2}(?:\.\d+)?)\s*(?:ba|baths?)").expect("static pattern"));
static SQFT_PATTERN: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"(?i)([0-9][0-9,]{2,})\s*(?:sq\s*ft|sqft)").expect("static pattern"));
static RENT_PATTERN: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"(?i)\$\s*([0-9][0-9,]{2,})\s*(?:/\s*mo|/mo|per\s*month)").expect("static pattern"));
static DOLLAR_AMOUNTS: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"\$\s*([0-9][0-9,]{2,})").expect("static pattern"));
static DAYS_ON_ZILLOW: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"(?i)(\d{1,3})\s+days\s+on\s+zillow").expect("static pattern"));
static MONTH_DATE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?i)(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\s+(\d{1,2}),?\s+(\d{4})")
        .expect("static pattern")
});

const WINDOW_AFTER: usize = 260;
const WINDOW_BEFORE: usize = 120;
const MAX_MATCHES: usize = 40;

/// Recover comp rows from `text`, scanning for address-shaped substrings and
/// pulling price/beds/baths/sqft/date out of the surrounding window.
///
/// Rows missing both a resolvable date and a resolvable price are dropped —
/// mirroring the upstream extractor's "don't guess the two load-bearing
/// fields" rule.
#[must_use]
pub fn extract_comp_entries_from_text(
    text: &str,
    comp_type: CompKind,
    source_url: &str,
    published_date: Option<NaiveDate>,
    today: NaiveDate,
) -> Vec<ExtractedComp> {
    if text.is_empty() {
        return Vec::new();
    }

    let mut rows = Vec::new();
    for m in ADDRESS_PATTERN.find_iter(text).take(MAX_MATCHES) {
        let raw_address = m.as_str().trim();
        let address = LEADING_YEAR
            .replace(raw_address, "$1")
            .into_owned();
        let Some((street, city, state, zip_code)) = parse_address_components(&address) else {
            continue;
        };

        let after_start = m.end();
        let after_end = text.len().min(after_start + WINDOW_AFTER);
        let window_after = &text[after_start..after_end];
        let before_start = m.start().saturating_sub(WINDOW_BEFORE);
        let window = &text[before_start..after_end];

        let price = extract_price(window_after, comp_type)
            .or_else(|| extract_price(window, comp_type));
        let Some(price) = price else { continue };

        let beds = extract_int(window_after, &BEDS_PATTERN).or_else(|| extract_int(window, &BEDS_PATTERN));
        let baths = extract_float(window_after, &BATHS_PATTERN).or_else(|| extract_float(window, &BATHS_PATTERN));
        let sqft = extract_int(window_after, &SQFT_PATTERN).or_else(|| extract_int(window, &SQFT_PATTERN));

        let candidate_date = extract_relative_zillow_days(window_after, today)
            .or_else(|| extract_date_from_text(window_after))
            .or_else(|| extract_relative_zillow_days(window, today))
            .or_else(|| extract_date_from_text(window))
            .or(published_date);
        let Some(date) = candidate_date else { continue };

        rows.push(ExtractedComp {
            address: street,
            city,
            state,
            zip_code,
            price,
            beds,
            baths,
            sqft,
            date,
            source_url: source_url.to_string(),
        });
    }
    rows
}

fn parse_address_components(full_address: &str) -> Option<(String, String, String, String)> {
    let caps = ADDRESS_COMPONENTS.captures(full_address.trim())?;
    Some((
        caps.get(1)?.as_str().trim().to_string(),
        caps.get(2)?.as_str().trim().to_string(),
        caps.get(3)?.as_str().trim().to_string(),
        caps.get(4)?.as_str().trim().to_string(),
    ))
}

fn extract_int(text: &str, pattern: &regex::Regex) -> Option<i64> {
    let caps = pattern.captures(text)?;
    caps.get(1)?.as_str().replace(',', "").parse().ok()
}

fn extract_float(text: &str, pattern: &regex::Regex) -> Option<f64> {
    let caps = pattern.captures(text)?;
    caps.get(1)?.as_str().parse().ok()
}

fn extract_price(text: &str, comp_type: CompKind) -> Option<f64> {
    if comp_type == CompKind::Rental {
        if let Some(caps) = RENT_PATTERN.captures(text) {
            if let Ok(value) = caps.get(1)?.as_str().replace(',', "").parse::<f64>() {
                return Some(value);
            }
        }
    }

    let amounts: Vec<f64> = DOLLAR_AMOUNTS
        .captures_iter(text)
        .filter_map(|c| c.get(1)?.as_str().replace(',', "").parse().ok())
        .collect();
    if amounts.is_empty() {
        return None;
    }

    if comp_type == CompKind::Rental {
        return amounts.into_iter().find(|v| *v <= 15000.0);
    }
    amounts.into_iter().find(|v| *v >= 50000.0)
}

fn extract_relative_zillow_days(text: &str, today: NaiveDate) -> Option<NaiveDate> {
    let caps = DAYS_ON_ZILLOW.captures(text)?;
    let days: i64 = caps.get(1)?.as_str().parse().ok()?;
    Some(today - Duration::days(days))
}

fn extract_date_from_text(text: &str) -> Option<NaiveDate> {
    let caps = MONTH_DATE.captures(text)?;
    let month = month_from_abbrev(&caps.get(1)?.as_str().to_lowercase())?;
    let day: u32 = caps.get(2)?.as_str().parse().ok()?;
    let year: i32 = caps.get(3)?.as_str().parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
}

fn month_from_abbrev(abbrev: &str) -> Option<u32> {
    Some(match abbrev {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 7, 28).unwrap()
    }

    #[test]
    fn extracts_sale_row_with_price_beds_baths_sqft() {
        let text = "Check out 123 Main St, Newark, NJ 07102 sold for $350,000. 3 beds, 2 baths, 1500 sqft. Sold March 1, 2026.";
        let rows = extract_comp_entries_from_text(text, CompKind::Sale, "https://example.com/a", None, today());
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.address, "123 Main St");
        assert_eq!(row.city, "Newark");
        assert_eq!(row.state, "NJ");
        assert_eq!(row.zip_code, "07102");
        assert_eq!(row.price, 350_000.0);
        assert_eq!(row.beds, Some(3));
        assert_eq!(row.baths, Some(2.0));
        assert_eq!(row.sqft, Some(1500));
        assert_eq!(row.date, NaiveDate::from_ymd_opt(2026, 3, 1).unwrap());
    }

    #[test]
    fn extracts_rental_row_via_per_month_suffix() {
        let text = "456 Oak Ave, Hoboken, NJ 07030 is listed at $2,400/mo. 15 days on Zillow.";
        let rows = extract_comp_entries_from_text(text, CompKind::Rental, "https://example.com/b", None, today());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].price, 2400.0);
        assert_eq!(rows[0].date, today() - Duration::days(15));
    }

    #[test]
    fn drops_rows_missing_both_date_and_price() {
        let text = "789 Pine Rd, Jersey City, NJ 07302 is a nice place.";
        let rows = extract_comp_entries_from_text(text, CompKind::Sale, "https://example.com/c", None, today());
        assert!(rows.is_empty());
    }

    #[test]
    fn falls_back_to_published_date_when_no_inline_date() {
        let text = "1010 Elm St, Philadelphia, PA 19102 sold for $410,000 last quarter.";
        let published = NaiveDate::from_ymd_opt(2026, 5, 1).unwrap();
        let rows = extract_comp_entries_from_text(text, CompKind::Sale, "https://example.com/d", Some(published), today());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].date, published);
    }

    #[test]
    fn caps_at_forty_matches() {
        let one = "111 First St, Newark, NJ 07102 sold for $100,000 on Jan 1, 2026. ";
        let text = one.repeat(50);
        let rows = extract_comp_entries_from_text(&text, CompKind::Sale, "https://example.com/e", None, today());
        assert_eq!(rows.len(), 40);
    }
}
