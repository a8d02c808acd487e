//! Image download, caching and local rewriting.
//!
//! Images referenced by article bodies are downloaded once per run and kept
//! in a shared [`ImageCache`]. Each composed document gets its own
//! [`ImageHandler`], which writes the cached bytes into the document's image
//! folder under a collision-free name and hands back the relative path for
//! the `<img src>` attribute.
//!
//! # Example
//!
//! ```rust
//! use quire_core::images::ImageConfig;
//!
//! let config = ImageConfig::builder()
//!     .ignore_errors(true)
//!     .min_width(2)
//!     .min_height(2)
//!     .cache_max_entries(500)
//!     .build();
//! assert!(config.validate().is_ok());
//! ```

mod cache;
mod handler;
mod loader;

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::Deserialize;

pub use cache::ImageCache;
pub use handler::{ImageHandler, ImageHandlerFactory};
pub use loader::ImageLoader;

use crate::cache::CacheBound;
use crate::{QuireError, Result};

const DEFAULT_CACHE_MB: u64 = 100;
const MAX_CACHE_MB: u64 = 1024;

static NESTED_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^https?://.+%5[cC]%22(https?://.+)%5[cC]%22$").expect("nested url pattern is valid")
});

/// Downloaded image ready to be written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageContent {
    pub bytes: Vec<u8>,
    /// Filename-safe base name, without extension.
    pub name: String,
    /// Lowercase extension including the leading dot (`.png`).
    pub extension: String,
}

impl ImageContent {
    pub fn weight(&self) -> u64 {
        (self.bytes.len() + 2 * (self.name.len() + self.extension.len())) as u64
    }
}

/// Result of loading one image URL. Cached and shared across documents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageOutcome {
    Available(Arc<ImageContent>),
    /// Deliberately never shown (too small).
    Excluded,
    /// Could not be loaded; carries the reason.
    Failed(String),
}

impl ImageOutcome {
    pub fn is_available(&self) -> bool {
        matches!(self, ImageOutcome::Available(_))
    }

    /// Cache weight of this outcome, at least 1.
    pub fn weight(&self) -> u64 {
        let w = match self {
            ImageOutcome::Available(content) => content.weight(),
            ImageOutcome::Excluded => 0,
            ImageOutcome::Failed(reason) => 2 * reason.len() as u64,
        };
        w.max(1)
    }
}

/// Image handling options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Drop images that fail to load instead of failing the document.
    pub ignore_errors: bool,
    /// Re-encode every image as PNG.
    pub to_png: bool,
    /// Images this wide or narrower are excluded. Zero disables the check.
    pub min_width: u32,
    /// Images this tall or shorter are excluded. Zero disables the check.
    pub min_height: u32,
    /// Bound the cache by entry count.
    pub cache_max_members: Option<usize>,
    /// Bound the cache by total size in megabytes (at most 1024).
    pub cache_max_mb: Option<u64>,
}

impl ImageConfig {
    pub fn builder() -> ImageConfigBuilder {
        ImageConfigBuilder::new()
    }

    /// Rejects configurations that bound the cache both ways.
    pub fn validate(&self) -> Result<()> {
        if self.cache_max_members.is_some() && self.cache_max_mb.is_some() {
            return Err(QuireError::ConfigError(
                "image cache may be bounded by cache_max_members or cache_max_mb, not both".to_string(),
            ));
        }
        Ok(())
    }

    /// Cache bound implied by this configuration.
    ///
    /// An entry limit wins; otherwise the size limit applies, 100 MB when
    /// unset and never above 1024 MB.
    pub fn cache_bound(&self) -> CacheBound {
        match (self.cache_max_members, self.cache_max_mb) {
            (Some(members), _) => CacheBound::MaxEntries(members),
            (None, mb) => {
                let mb = mb.unwrap_or(DEFAULT_CACHE_MB).min(MAX_CACHE_MB);
                CacheBound::MaxWeight(mb * 1024 * 1024)
            }
        }
    }

    /// Whether loaded images must be decoded at all.
    pub(crate) fn needs_decode(&self) -> bool {
        self.min_width > 0 || self.min_height > 0 || self.to_png
    }
}

/// Fluent builder for [`ImageConfig`].
#[derive(Debug, Default)]
pub struct ImageConfigBuilder {
    config: ImageConfig,
}

impl ImageConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ignore_errors(mut self, value: bool) -> Self {
        self.config.ignore_errors = value;
        self
    }

    pub fn to_png(mut self, value: bool) -> Self {
        self.config.to_png = value;
        self
    }

    pub fn min_width(mut self, value: u32) -> Self {
        self.config.min_width = value;
        self
    }

    pub fn min_height(mut self, value: u32) -> Self {
        self.config.min_height = value;
        self
    }

    pub fn cache_max_entries(mut self, value: usize) -> Self {
        self.config.cache_max_members = Some(value);
        self
    }

    pub fn cache_max_mb(mut self, value: u64) -> Self {
        self.config.cache_max_mb = Some(value);
        self
    }

    pub fn build(self) -> ImageConfig {
        self.config
    }
}

/// Normalizes an `<img src>` value to a downloadable URL.
///
/// Returns `None` for anything that is not an absolute http(s) URL. Sources
/// that wrap a second, percent-encoded image URL are unwrapped one layer at
/// a time.
pub fn source_to_url(source: &str) -> Option<String> {
    if source.len() < 8 || !(source.starts_with("http://") || source.starts_with("https://")) {
        return None;
    }
    match NESTED_URL.captures(source).and_then(|caps| caps.get(1)) {
        Some(inner) => source_to_url(inner.as_str()),
        None => Some(source.to_string()),
    }
}
