//! Output stages.
//!
//! A stage takes one article and produces some output from it: an HTML file
//! in a folder ([`SaveStage`]), a converted document produced by an
//! external tool ([`ConvertStage`]) or an entry in a document library
//! ([`ImportStage`]). Each stage composes the article itself
//! with its own template and options. The worker runs every configured stage
//! in turn inside a scratch directory it clears before each stage.

mod convert;
mod import;
mod save;

use std::path::Path;
use std::sync::Arc;

pub use convert::{CommandConverter, ConvertJob, ConvertStage, Converter};
pub use import::ImportStage;
pub use save::SaveStage;

use crate::Result;
use crate::article::Article;
use crate::compose::Composer;
use crate::discussion::DiscussionLookup;
use crate::dom_tree::DomTree;
use crate::images::{ImageHandler, ImageHandlerFactory};
use crate::source::SourceMeta;
use crate::template::Template;

/// Everything a stage gets to process one article.
pub struct StageContext<'a> {
    pub article: &'a dyn Article,
    pub composer: &'a Composer,
    pub source: &'a SourceMeta,
    pub images: &'a ImageHandlerFactory,
    /// Worker-private directory, emptied before the stage runs.
    pub scratch: &'a Path,
    pub discussion: Option<&'a DiscussionLookup>,
}

/// One output step for an article.
pub trait Stage: Send + Sync {
    fn name(&self) -> &str;

    fn run(&self, ctx: &StageContext<'_>) -> Result<()>;
}

/// Composition settings shared by the built-in stages.
#[derive(Debug, Clone)]
pub struct StageOptions {
    pub template: Arc<Template>,
    /// Collect inline links into a numbered footnote list.
    pub footnotes: bool,
    /// Look up discussion threads for the article.
    pub discussion: bool,
}

impl Default for StageOptions {
    fn default() -> Self {
        Self { template: Arc::new(Template::builtin()), footnotes: true, discussion: false }
    }
}

impl StageOptions {
    pub fn with_template(mut self, template: Arc<Template>) -> Self {
        self.template = template;
        self
    }

    pub fn with_footnotes(mut self, footnotes: bool) -> Self {
        self.footnotes = footnotes;
        self
    }

    pub fn with_discussion(mut self, discussion: bool) -> Self {
        self.discussion = discussion;
        self
    }

    /// Composes the context's article with these options.
    pub fn compose(&self, ctx: &StageContext<'_>, images: Option<&mut ImageHandler>) -> Result<DomTree> {
        let discussions = match ctx.discussion {
            Some(lookup) if self.discussion => lookup.lookup(ctx.article),
            _ => Arc::default(),
        };
        ctx.composer
            .compose(ctx.article, ctx.source, &self.template, images, self.footnotes, &discussions)
    }
}
