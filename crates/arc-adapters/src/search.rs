//! Web-search adapter contract (spec §4.C).

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One search-provider hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    /// Result title.
    pub title: String,
    /// Result URL, used as `source_url` downstream.
    pub url: String,
    /// Short snippet shown by the provider.
    pub snippet: String,
    /// Publish date, if the provider supplies one.
    pub published_date: Option<NaiveDate>,
    /// Full extracted text, if `include_text` was requested and available.
    pub text: Option<String>,
}

/// Web-search contract (spec §4.C). Must return `[]` on any failure; must
/// never panic or propagate a network error past this boundary.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Run a search, optionally requesting full extracted `text` per hit.
    async fn search(&self, query: &str, max_results: usize, include_text: bool) -> Vec<SearchHit>;
}

/// Default [`SearchProvider`] that returns no results (spec §4.C default).
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSearch;

#[async_trait]
impl SearchProvider for NullSearch {
    async fn search(&self, _query: &str, _max_results: usize, _include_text: bool) -> Vec<SearchHit> {
        Vec::new()
    }
}

/// Fixed, in-memory [`SearchProvider`] for tests and demos: returns a
/// canned set of hits regardless of query, truncated to `max_results`.
#[derive(Debug, Clone, Default)]
pub struct StaticSearchProvider {
    hits: Vec<SearchHit>,
}

impl StaticSearchProvider {
    /// Build a fixture provider backed by `hits`.
    #[must_use]
    pub fn new(hits: Vec<SearchHit>) -> Self {
        Self { hits }
    }
}

#[async_trait]
impl SearchProvider for StaticSearchProvider {
    async fn search(&self, _query: &str, max_results: usize, include_text: bool) -> Vec<SearchHit> {
        self.hits
            .iter()
            .take(max_results)
            .cloned()
            .map(|mut hit| {
                if !include_text {
                    hit.text = None;
                }
                hit
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_search_always_returns_empty() {
        let results = NullSearch.search("anything", 10, true).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn static_provider_truncates_and_strips_text_when_not_requested() {
        let hits = vec![
            SearchHit { title: "a".into(), url: "https://a".into(), snippet: "s".into(), published_date: None, text: Some("body".into()) },
            SearchHit { title: "b".into(), url: "https://b".into(), snippet: "s".into(), published_date: None, text: Some("body".into()) },
        ];
        let provider = StaticSearchProvider::new(hits);
        let results = provider.search("q", 1, false).await;
        assert_eq!(results.len(), 1);
        assert!(results[0].text.is_none());
    }
}
