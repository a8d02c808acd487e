//! Error types for Quire operations.
//!
//! This module defines the main error type [`QuireError`] which represents
//! everything that can go wrong while fetching articles, composing documents,
//! downloading images and running output stages.
//!
//! # Example
//!
//! ```rust
//! use quire_core::{QuireError, Result};
//!
//! fn require_content(html: &str) -> Result<&str> {
//!     if html.trim().is_empty() {
//!         return Err(QuireError::NoContent);
//!     }
//!     Ok(html)
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the article pipeline.
///
/// Per-article failures (fetch, image, stage) are caught by the pipeline and
/// recorded against the article; configuration errors are fatal before any
/// worker starts.
#[derive(Error, Debug)]
pub enum QuireError {
    /// HTTP request errors from reqwest.
    ///
    /// This variant wraps network errors, DNS failures, connection issues,
    /// and other HTTP-related problems.
    #[cfg(feature = "http")]
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Request timeout.
    ///
    /// Returned when an HTTP request exceeds the configured timeout duration.
    #[error("Request timed out after {timeout} seconds")]
    Timeout { timeout: u64 },

    /// A remote server answered with something other than `200 OK`.
    #[error("GET {url} returned {status}")]
    HttpStatus { url: String, status: u16 },

    /// Invalid URL provided.
    ///
    /// Returned when a URL cannot be parsed or is malformed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// HTML or template shape errors.
    ///
    /// Returned when a template cannot be used, for example because the
    /// content slot is missing.
    #[error("Template error: {0}")]
    TemplateError(String),

    /// No content could be obtained for an article.
    #[error("No content could be extracted from the article")]
    NoContent,

    /// An image could not be retrieved and failures are not being ignored.
    #[error("Error retrieving image {url}: {reason}")]
    ImageError { url: String, reason: String },

    /// An output stage failed.
    #[error("Stage '{stage}' failed: {message}")]
    StageError { stage: String, message: String },

    /// The article source could not deliver articles or run a hook.
    #[error("Source error: {0}")]
    SourceError(String),

    /// File not found.
    ///
    /// Returned when attempting to read a file that doesn't exist.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// File I/O errors.
    ///
    /// Wraps standard I/O errors for file operations.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON decoding errors (manifests, search responses).
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// TOML decoding errors for configuration files.
    #[error("Failed to parse configuration: {0}")]
    TomlError(#[from] toml::de::Error),

    /// Configuration errors.
    ///
    /// Returned when the configuration is inconsistent, such as both image
    /// cache bounds being set or an unknown stage type.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type alias for QuireError.
///
/// This is a convenience alias for `std::result::Result<T, QuireError>`.
pub type Result<T> = std::result::Result<T, QuireError>;
