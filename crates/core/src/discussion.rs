//! Discussion-thread lookup.
//!
//! Finds public discussion threads (Hacker News) for an article's original
//! URL. Results are ranked most-discussed first and cached for the run in a
//! small bounded cache, since the same URL tends to be looked up by several
//! stages.

use std::sync::Arc;

use serde::Deserialize;
use url::Url;

use crate::article::Article;
use crate::cache::{CacheBound, LoadingCache};
use crate::fetch::Fetcher;
use crate::{QuireError, Result};

/// Entries kept by [`DiscussionLookup`].
pub const LOOKUP_CACHE_SIZE: usize = 20;

const HN_SEARCH_ENDPOINT: &str = "https://hn.algolia.com/api/v1/search";
const HN_ITEM_PREFIX: &str = "https://news.ycombinator.com/item?id=";

/// Remote search for discussion threads about a URL.
pub trait DiscussionSearch: Send + Sync {
    /// Thread URLs for `url`, most discussed first.
    fn search(&self, url: &str) -> Result<Vec<String>>;
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(rename = "objectID")]
    object_id: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    num_comments: Option<u64>,
}

/// Hacker News search through the Algolia API.
pub struct HackerNewsSearch {
    fetcher: Arc<dyn Fetcher>,
    endpoint: String,
}

impl HackerNewsSearch {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self::with_endpoint(fetcher, HN_SEARCH_ENDPOINT)
    }

    pub fn with_endpoint(fetcher: Arc<dyn Fetcher>, endpoint: impl Into<String>) -> Self {
        Self { fetcher, endpoint: endpoint.into() }
    }

    fn query_url(&self, url: &str) -> Result<String> {
        let query = Url::parse_with_params(&self.endpoint, &[
            ("query", url),
            ("restrictSearchableAttributes", "url"),
            ("tags", "story"),
        ])
        .map_err(|e| QuireError::InvalidUrl(e.to_string()))?;
        Ok(query.into())
    }
}

fn is_thread_url(url: &str, id: &str) -> bool {
    let http = format!("http://news.ycombinator.com/item?id={id}");
    let https = format!("{HN_ITEM_PREFIX}{id}");
    url.eq_ignore_ascii_case(&http) || url.eq_ignore_ascii_case(&https)
}

impl DiscussionSearch for HackerNewsSearch {
    fn search(&self, url: &str) -> Result<Vec<String>> {
        let query = self.query_url(url)?;
        tracing::trace!(url, "Hacker News lookup");

        let response = self.fetcher.get(&query)?;
        if !response.is_ok() {
            return Err(QuireError::HttpStatus { url: query, status: response.status });
        }
        let parsed: SearchResponse = serde_json::from_slice(&response.body)?;

        let mut hits: Vec<SearchHit> = parsed
            .hits
            .into_iter()
            .filter(|hit| hit.url.as_deref() == Some(url))
            .collect();
        if hits.iter().any(|hit| is_thread_url(url, &hit.object_id)) {
            tracing::trace!(url, "Looks like a Hacker News discussion thread");
            return Ok(Vec::new());
        }
        hits.sort_by(|a, b| b.num_comments.unwrap_or(0).cmp(&a.num_comments.unwrap_or(0)));

        let mut threads: Vec<String> = Vec::with_capacity(hits.len());
        for hit in hits {
            let thread = format!("{HN_ITEM_PREFIX}{}", hit.object_id);
            if !threads.contains(&thread) {
                threads.push(thread);
            }
        }
        tracing::trace!(url, count = threads.len(), "Hacker News discussions found");
        Ok(threads)
    }
}

/// Bounded, run-wide cache in front of a [`DiscussionSearch`].
///
/// Lookups never fail: search errors are logged and treated as "no
/// discussions", and that answer is cached like any other.
pub struct DiscussionLookup {
    search: Arc<dyn DiscussionSearch>,
    cache: LoadingCache<String, Arc<Vec<String>>>,
}

impl DiscussionLookup {
    pub fn new(search: Arc<dyn DiscussionSearch>) -> Self {
        Self::with_capacity(search, LOOKUP_CACHE_SIZE)
    }

    pub fn with_capacity(search: Arc<dyn DiscussionSearch>, entries: usize) -> Self {
        Self { search, cache: LoadingCache::new(CacheBound::MaxEntries(entries)) }
    }

    pub fn lookup(&self, article: &dyn Article) -> Arc<Vec<String>> {
        self.lookup_url(article.original_url())
    }

    pub fn lookup_url(&self, url: &str) -> Arc<Vec<String>> {
        self.cache.get_with(&url.to_string(), |key| match self.search.search(key) {
            Ok(threads) => Arc::new(threads),
            Err(e) => {
                tracing::trace!(url = %key, error = %e, "Discussion lookup failed");
                Arc::new(Vec::new())
            }
        })
    }

    pub fn clear(&self) {
        self.cache.clear();
    }
}
