//! Article sources.
//!
//! A source delivers the batch of articles for a run and is told, per
//! article, whether processing succeeded. Hooks may do I/O and may fail; the
//! pipeline logs such failures and never changes an article's outcome
//! because of them.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Deserialize;

use crate::article::{Article, StaticArticle};
use crate::{QuireError, Result};

/// How a source presents itself in composed documents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceMeta {
    /// Short name for `.quire_source_name`.
    pub name: String,
    /// HTML inserted into `.quire_source`.
    pub via_html: String,
}

/// Articles for one run, plus messages for entries that could not be read.
#[derive(Default)]
pub struct ArticleBatch {
    pub articles: Vec<Arc<dyn Article>>,
    pub errors: Vec<String>,
}

pub trait ArticleSource: Send + Sync {
    fn meta(&self) -> &SourceMeta;

    fn fetch_articles(&self) -> Result<ArticleBatch>;

    /// Called after every stage succeeded for `article`.
    fn on_complete(&self, article: &dyn Article) -> Result<()>;

    /// Called after any stage failed for `article`.
    fn on_error(&self, article: &dyn Article) -> Result<()>;
}

/// In-memory source that records which hooks ran.
pub struct MemorySource {
    meta: SourceMeta,
    articles: Vec<Arc<dyn Article>>,
    completed: Mutex<Vec<String>>,
    failed: Mutex<Vec<String>>,
}

impl MemorySource {
    pub fn new(meta: SourceMeta, articles: Vec<Arc<dyn Article>>) -> Self {
        Self { meta, articles, completed: Mutex::new(Vec::new()), failed: Mutex::new(Vec::new()) }
    }

    /// Titles passed to [`ArticleSource::on_complete`], in call order.
    pub fn completed(&self) -> Vec<String> {
        self.completed.lock().clone()
    }

    /// Titles passed to [`ArticleSource::on_error`], in call order.
    pub fn failed(&self) -> Vec<String> {
        self.failed.lock().clone()
    }
}

impl ArticleSource for MemorySource {
    fn meta(&self) -> &SourceMeta {
        &self.meta
    }

    fn fetch_articles(&self) -> Result<ArticleBatch> {
        Ok(ArticleBatch { articles: self.articles.clone(), errors: Vec::new() })
    }

    fn on_complete(&self, article: &dyn Article) -> Result<()> {
        self.completed.lock().push(article.title().to_string());
        Ok(())
    }

    fn on_error(&self, article: &dyn Article) -> Result<()> {
        self.failed.lock().push(article.title().to_string());
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    title: String,
    url: String,
    #[serde(default)]
    source_url: Option<String>,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    content_file: Option<PathBuf>,
}

/// Reads articles from a JSON manifest.
///
/// The manifest is an array of objects:
///
/// ```json
/// [
///   { "title": "Example", "url": "https://example.com/post",
///     "source_url": "https://reader.example/42", "summary": "...",
///     "content_file": "post.html" }
/// ]
/// ```
///
/// Each entry needs `content` (inline HTML) or `content_file` (relative to
/// the manifest). Completed and failed articles are appended, one
/// `url<TAB>title` line each, to `<manifest>.done` and `<manifest>.failed`.
pub struct ManifestSource {
    path: PathBuf,
    meta: SourceMeta,
    log_lock: Mutex<()>,
}

impl ManifestSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_else(|| "manifest".into());
        let via_html = format!("Collected from <em>{}</em>", html_escape::encode_text(&name));
        Self { path, meta: SourceMeta { name, via_html }, log_lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `<manifest>.done`
    pub fn done_log(&self) -> PathBuf {
        sibling_with_suffix(&self.path, ".done")
    }

    /// `<manifest>.failed`
    pub fn failed_log(&self) -> PathBuf {
        sibling_with_suffix(&self.path, ".failed")
    }

    fn append(&self, log: &Path, article: &dyn Article) -> Result<()> {
        let _guard = self.log_lock.lock();
        let mut file = OpenOptions::new().create(true).append(true).open(log)?;
        writeln!(file, "{}\t{}", article.original_url(), article.title())?;
        Ok(())
    }
}

fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

impl ArticleSource for ManifestSource {
    fn meta(&self) -> &SourceMeta {
        &self.meta
    }

    fn fetch_articles(&self) -> Result<ArticleBatch> {
        if !self.path.exists() {
            return Err(QuireError::FileNotFound(self.path.clone()));
        }
        let raw = fs::read_to_string(&self.path)?;
        let entries: Vec<ManifestEntry> = serde_json::from_str(&raw)?;
        let base = self.path.parent().map(Path::to_path_buf).unwrap_or_default();

        let mut batch = ArticleBatch::default();
        for (idx, entry) in entries.into_iter().enumerate() {
            let article = match (entry.content, entry.content_file) {
                (Some(html), _) => StaticArticle::new(entry.title, entry.url, html),
                (None, Some(file)) => StaticArticle::from_file(entry.title, entry.url, base.join(file)),
                (None, None) => {
                    batch.errors.push(format!("Entry {} ('{}') has no content or content_file", idx + 1, entry.title));
                    continue;
                }
            };
            let article = match entry.source_url {
                Some(url) => article.with_source_url(url),
                None => article,
            };
            let article = match entry.summary {
                Some(summary) => article.with_summary(summary),
                None => article,
            };
            batch.articles.push(Arc::new(article));
        }
        Ok(batch)
    }

    fn on_complete(&self, article: &dyn Article) -> Result<()> {
        self.append(&self.done_log(), article)
    }

    fn on_error(&self, article: &dyn Article) -> Result<()> {
        self.append(&self.failed_log(), article)
    }
}
