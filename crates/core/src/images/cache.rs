//! Run-wide cache of image outcomes.

use std::sync::Arc;

use super::{ImageConfig, ImageLoader, ImageOutcome};
use crate::cache::{BoundedCache, CacheBound, LoadingCache};
use crate::fetch::Fetcher;

/// Shared, bounded cache of [`ImageOutcome`]s keyed by URL.
///
/// At most one download per URL is in flight at any time; concurrent callers
/// for the same URL wait for it and get the same outcome. Failures are cached
/// too, so a broken image is requested once per run.
pub struct ImageCache {
    loader: ImageLoader,
    entries: LoadingCache<String, ImageOutcome>,
}

impl ImageCache {
    /// Bound taken from `config` (see [`ImageConfig::cache_bound`]).
    pub fn new(fetcher: Arc<dyn Fetcher>, config: ImageConfig) -> Self {
        let bound = config.cache_bound();
        Self::with_bound(fetcher, config, bound)
    }

    pub fn with_bound(fetcher: Arc<dyn Fetcher>, config: ImageConfig, bound: CacheBound) -> Self {
        let store = BoundedCache::new(bound)
            .with_weigher(|url: &String, outcome: &ImageOutcome| outcome.weight() + 2 * url.len() as u64)
            .with_removal_listener(|url: &String, _: &ImageOutcome, cause| {
                tracing::trace!(url = %url, "Removed image from cache because {}", cause.describe());
            });
        Self { loader: ImageLoader::new(fetcher, config), entries: LoadingCache::from_store(store) }
    }

    pub fn config(&self) -> &ImageConfig {
        self.loader.config()
    }

    /// Outcome for `url`, downloading it on a miss.
    pub fn fetch(&self, url: &str) -> ImageOutcome {
        self.entries.get_with(&url.to_string(), |key| self.loader.load(key))
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total weight currently held.
    pub fn weight(&self) -> u64 {
        self.entries.weight()
    }
}
