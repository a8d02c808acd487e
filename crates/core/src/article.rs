//! Articles handed to the pipeline by an article source.
//!
//! An [`Article`] is immutable metadata plus a content fragment. The pipeline
//! mutates the fragment while composing, so [`Article::content`] must return
//! an independent tree on every call.

use std::path::PathBuf;

use parking_lot::Mutex;

use crate::Result;
use crate::dom_tree::DomTree;
use crate::fetch::fetch_file;
use crate::footnotes::abbreviate;
use crate::parse::parse_fragment;

/// Longest summary produced by [`summary_html`], in characters.
pub const SUMMARY_LEN: usize = 1000;
const SUMMARY_MIN_REMAINING: usize = 100;

/// One article to process.
pub trait Article: Send + Sync {
    /// Canonical URL of the article on the web.
    fn original_url(&self) -> &str;

    /// URL of the article in the source's own viewer, if it has one.
    fn source_url(&self) -> Option<&str>;

    /// Plain-text summary supplied by the source.
    fn summary(&self) -> Option<&str>;

    fn title(&self) -> &str;

    /// The article body. Each call returns a tree the caller owns.
    fn content(&self) -> Result<DomTree>;
}

#[derive(Debug, Clone)]
enum Body {
    Html(String),
    File(PathBuf),
}

/// An article whose data is already known, with its body given inline or
/// as a file read on first use.
#[derive(Debug)]
pub struct StaticArticle {
    title: String,
    original_url: String,
    source_url: Option<String>,
    summary: Option<String>,
    body: Body,
    parsed: Mutex<Option<DomTree>>,
}

impl StaticArticle {
    pub fn new(title: impl Into<String>, original_url: impl Into<String>, content_html: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            original_url: original_url.into(),
            source_url: None,
            summary: None,
            body: Body::Html(content_html.into()),
            parsed: Mutex::new(None),
        }
    }

    /// Article whose body is read from `path` the first time it is needed.
    pub fn from_file(title: impl Into<String>, original_url: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self { body: Body::File(path.into()), ..Self::new(title, original_url, "") }
    }

    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }
}

impl Article for StaticArticle {
    fn original_url(&self) -> &str {
        &self.original_url
    }

    fn source_url(&self) -> Option<&str> {
        self.source_url.as_deref().filter(|s| !s.is_empty())
    }

    fn summary(&self) -> Option<&str> {
        self.summary.as_deref().filter(|s| !s.trim().is_empty())
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn content(&self) -> Result<DomTree> {
        let mut parsed = self.parsed.lock();
        if let Some(tree) = parsed.as_ref() {
            return Ok(tree.clone());
        }
        let tree = match &self.body {
            Body::Html(html) => parse_fragment(html),
            Body::File(path) => parse_fragment(&fetch_file(path)?),
        };
        *parsed = Some(tree.clone());
        Ok(tree)
    }
}

/// Short HTML summary of an article.
///
/// Uses the source's summary when there is one. Otherwise the text of the
/// first paragraphs is taken, each in its own `<p>`, until about
/// [`SUMMARY_LEN`] characters are collected. An unreadable body yields an
/// empty summary.
pub fn summary_html(article: &dyn Article) -> String {
    if let Some(summary) = article.summary() {
        let text = abbreviate(summary, SUMMARY_LEN);
        return format!("<p>{}</p>", html_escape::encode_text(&text));
    }

    let Ok(content) = article.content() else {
        return String::new();
    };

    let mut out = String::new();
    let mut remaining = SUMMARY_LEN;
    for p in content.elements_by_tag(content.root(), "p") {
        let text = content.text(p);
        if text.trim().is_empty() {
            continue;
        }
        let text = abbreviate(&text, remaining);
        out.push_str("<p>");
        out.push_str(&html_escape::encode_text(&text));
        out.push_str("</p>");
        remaining = remaining.saturating_sub(text.chars().count());
        if remaining <= SUMMARY_MIN_REMAINING {
            break;
        }
    }
    out
}
