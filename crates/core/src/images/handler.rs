//! Per-document image rewriting.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{ImageCache, ImageOutcome, source_to_url};
use crate::unique::unique_file;
use crate::{QuireError, Result};

/// Hands out one [`ImageHandler`] per composed document, all sharing the
/// run's [`ImageCache`].
#[derive(Clone)]
pub struct ImageHandlerFactory {
    cache: Arc<ImageCache>,
    ignore_errors: bool,
}

impl ImageHandlerFactory {
    /// `ignore_errors` is taken from the cache's configuration.
    pub fn new(cache: Arc<ImageCache>) -> Self {
        let ignore_errors = cache.config().ignore_errors;
        Self { cache, ignore_errors }
    }

    pub fn cache(&self) -> &Arc<ImageCache> {
        &self.cache
    }

    /// Handler writing into `folder`; returned paths are `prefix` + file name.
    pub fn handler(&self, folder: impl Into<PathBuf>, prefix: impl Into<String>) -> ImageHandler {
        ImageHandler {
            cache: Arc::clone(&self.cache),
            ignore_errors: self.ignore_errors,
            folder: folder.into(),
            prefix: prefix.into(),
            mappings: HashMap::new(),
        }
    }
}

/// Rewrites `<img src>` values of one document to local files.
pub struct ImageHandler {
    cache: Arc<ImageCache>,
    ignore_errors: bool,
    folder: PathBuf,
    prefix: String,
    mappings: HashMap<String, Option<String>>,
}

impl ImageHandler {
    pub fn folder(&self) -> &Path {
        &self.folder
    }

    /// Local path to use for `source`, or `None` when the image should be
    /// dropped from the document.
    ///
    /// Each distinct image URL is resolved once per document, so different
    /// spellings of one nested URL share a file. The image folder is only
    /// created when the first image is saved.
    pub fn rewrite(&mut self, source: &str) -> Result<Option<String>> {
        let Some(url) = source_to_url(source) else {
            tracing::trace!(source, "Not a valid URL for an image");
            return Ok(None);
        };
        if let Some(known) = self.mappings.get(&url) {
            return Ok(known.clone());
        }
        let resolved = self.resolve(&url)?;
        self.mappings.insert(url, resolved.clone());
        Ok(resolved)
    }

    fn resolve(&self, url: &str) -> Result<Option<String>> {
        match self.cache.fetch(url) {
            ImageOutcome::Available(content) => {
                let path = self
                    .save(&content.name, &content.extension, &content.bytes)
                    .map_err(|e| QuireError::ImageError { url: url.to_string(), reason: e.to_string() })?;
                tracing::trace!(url, path, "Saved image");
                Ok(Some(path))
            }
            ImageOutcome::Excluded => Ok(None),
            ImageOutcome::Failed(reason) if self.ignore_errors => {
                tracing::debug!(url, reason, "Ignoring image failure");
                Ok(None)
            }
            ImageOutcome::Failed(reason) => Err(QuireError::ImageError { url: url.to_string(), reason }),
        }
    }

    fn save(&self, name: &str, extension: &str, bytes: &[u8]) -> std::io::Result<String> {
        let claimed = unique_file(&self.folder, name, extension)?;
        let file_name = format!("{}{extension}", claimed.base_name);
        fs::write(self.folder.join(&file_name), bytes)?;
        Ok(format!("{}{file_name}", self.prefix))
    }
}
