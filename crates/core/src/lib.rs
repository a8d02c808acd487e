//! Turns batches of saved articles into self-contained HTML documents.
//!
//! Each article is composed into a template with its inline links collected
//! as numbered footnotes, its images downloaded and stored next to the
//! document, and links to any discussion threads. A pool of worker threads
//! runs every configured output [`Stage`] on every article; one article
//! failing never stops the others.

pub mod article;
pub mod cache;
pub mod compose;
pub mod config;
pub mod discussion;
pub mod dom_tree;
pub mod error;
pub mod fetch;
pub mod footnotes;
pub mod images;
pub mod parse;
pub mod pipeline;
pub mod reservation;
pub mod source;
pub mod stages;
pub mod template;
pub mod unique;

#[cfg(test)]
mod testing;

pub use article::{Article, StaticArticle, summary_html};
pub use cache::{BoundedCache, CacheBound, LoadingCache, RemovalCause, Weigher};
pub use compose::Composer;
pub use config::{QuireConfig, StageConfig, StageKind, WorkerConfig};
pub use discussion::{DiscussionLookup, DiscussionSearch, HackerNewsSearch};
#[doc(hidden)]
pub use dom_tree::{DomTree, NodeId};
pub use error::{QuireError, Result};
#[cfg(feature = "http")]
pub use fetch::HttpFetcher;
pub use fetch::{FetchConfig, FetchResponse, Fetcher, fetch_file};
pub use footnotes::{Footnote, FootnoteIds, abbreviate, extract_footnotes, insert_footnotes};
pub use images::{
    ImageCache, ImageConfig, ImageConfigBuilder, ImageContent, ImageHandler, ImageHandlerFactory, ImageLoader,
    ImageOutcome,
};
pub use parse::{parse_document, parse_fragment};
pub use pipeline::{ArticleReport, ArticleState, Pipeline, RunReport};
pub use reservation::{Reservation, SaveTarget};
pub use source::{ArticleBatch, ArticleSource, ManifestSource, MemorySource, SourceMeta};
pub use stages::{
    CommandConverter, ConvertJob, ConvertStage, Converter, ImportStage, SaveStage, Stage, StageContext, StageOptions,
};
pub use template::{DEFAULT_TEMPLATE, Template, TemplateStore};
