//! The worker pool.
//!
//! [`Pipeline::run`] asks the source for its articles, puts them on a shared
//! lock-free queue and starts a small pool of named worker threads. Each
//! worker pops articles until the queue is empty and runs every stage on
//! them in order. One stage failing marks the article failed without
//! stopping its other stages or any other article.
//!
//! ```no_run
//! use std::sync::Arc;
//! use quire_core::{ImageCache, ImageConfig, ImageHandlerFactory, ManifestSource, Pipeline, SaveStage, StageOptions};
//! # fn run(fetcher: Arc<dyn quire_core::Fetcher>) -> quire_core::Result<()> {
//! let images = ImageHandlerFactory::new(Arc::new(ImageCache::new(fetcher, ImageConfig::default())));
//! let save = SaveStage::new("save", "out", StageOptions::default())?;
//! let pipeline = Pipeline::new(vec![Box::new(save)], images).with_threads(4);
//!
//! let report = pipeline.run(&ManifestSource::new("articles.json"))?;
//! println!("{} of {} articles failed", report.failed_count(), report.articles.len());
//! # Ok(())
//! # }
//! ```

use std::fs;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::thread;

use crossbeam_queue::SegQueue;
use parking_lot::Mutex;

use crate::Result;
use crate::article::Article;
use crate::compose::Composer;
use crate::discussion::DiscussionLookup;
use crate::images::ImageHandlerFactory;
use crate::source::{ArticleSource, SourceMeta};
use crate::stages::{Stage, StageContext};
use crate::unique::clear_dir;

/// Upper bound on worker threads.
pub const MAX_THREADS: usize = 20;

/// Where an article is in its processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArticleState {
    Queued,
    InProgress,
    Completed,
    Failed,
}

/// Outcome for one article.
#[derive(Debug, Clone)]
pub struct ArticleReport {
    pub title: String,
    pub url: String,
    pub state: ArticleState,
    /// One message per failed stage.
    pub errors: Vec<String>,
}

/// Outcome of a whole run, articles in source order.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub articles: Vec<ArticleReport>,
    /// Entries the source could not turn into articles.
    pub source_errors: Vec<String>,
}

impl RunReport {
    /// True when any article failed or the source reported errors.
    pub fn any_failed(&self) -> bool {
        !self.source_errors.is_empty() || self.articles.iter().any(|a| a.state != ArticleState::Completed)
    }

    pub fn completed_count(&self) -> usize {
        self.count(ArticleState::Completed)
    }

    pub fn failed_count(&self) -> usize {
        self.count(ArticleState::Failed)
    }

    fn count(&self, state: ArticleState) -> usize {
        self.articles.iter().filter(|a| a.state == state).count()
    }
}

/// Runs configured stages over every article of a source.
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
    composer: Composer,
    images: ImageHandlerFactory,
    discussion: Option<Arc<DiscussionLookup>>,
    threads: usize,
}

impl Pipeline {
    /// Single-threaded pipeline without discussion lookups.
    pub fn new(stages: Vec<Box<dyn Stage>>, images: ImageHandlerFactory) -> Self {
        Self { stages, composer: Composer::new(), images, discussion: None, threads: 1 }
    }

    pub fn with_composer(mut self, composer: Composer) -> Self {
        self.composer = composer;
        self
    }

    pub fn with_discussion(mut self, lookup: Arc<DiscussionLookup>) -> Self {
        self.discussion = Some(lookup);
        self
    }

    /// Requested worker count, clamped to `1..=MAX_THREADS`.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.clamp(1, MAX_THREADS);
        self
    }

    pub fn stages(&self) -> &[Box<dyn Stage>] {
        &self.stages
    }

    /// Processes every article of `source`.
    ///
    /// Fails only when the source cannot list its articles or the workers
    /// cannot be set up; per-article problems end up in the report.
    pub fn run(&self, source: &dyn ArticleSource) -> Result<RunReport> {
        let batch = source.fetch_articles()?;
        for message in &batch.errors {
            tracing::error!("{message}");
        }

        let reports: Vec<ArticleReport> = batch
            .articles
            .iter()
            .map(|a| ArticleReport {
                title: a.title().to_string(),
                url: a.original_url().to_string(),
                state: ArticleState::Queued,
                errors: Vec::new(),
            })
            .collect();
        if reports.is_empty() {
            tracing::info!("No articles to be processed");
            return Ok(RunReport { articles: reports, source_errors: batch.errors });
        }

        let workers = self.threads.min(reports.len());
        tracing::debug!(articles = reports.len(), workers, "Starting workers");

        let queue = SegQueue::new();
        for entry in batch.articles.into_iter().enumerate() {
            queue.push(entry);
        }
        let reports = Mutex::new(reports);
        let scratch_root = tempfile::Builder::new().prefix("quire-").tempdir()?;

        thread::scope(|scope| -> Result<()> {
            for n in 0..workers {
                let scratch = scratch_root.path().join(format!("worker{n}"));
                fs::create_dir_all(&scratch)?;
                let worker = Worker { pipeline: self, source, queue: &queue, reports: &reports };
                thread::Builder::new()
                    .name(format!("quire-worker-{n}"))
                    .spawn_scoped(scope, move || worker.run(&scratch))?;
            }
            Ok(())
        })?;

        let report = RunReport { articles: reports.into_inner(), source_errors: batch.errors };
        tracing::debug!(completed = report.completed_count(), failed = report.failed_count(), "All workers done");
        Ok(report)
    }
}

struct Worker<'a> {
    pipeline: &'a Pipeline,
    source: &'a dyn ArticleSource,
    queue: &'a SegQueue<(usize, Arc<dyn Article>)>,
    reports: &'a Mutex<Vec<ArticleReport>>,
}

impl Worker<'_> {
    fn run(&self, scratch: &Path) {
        while let Some((idx, article)) = self.queue.pop() {
            self.reports.lock()[idx].state = ArticleState::InProgress;
            tracing::info!("{}", article.title());

            let errors = self.process(article.as_ref(), self.source.meta(), scratch);
            let state = if errors.is_empty() {
                self.notify("Completion", article.as_ref(), |a| self.source.on_complete(a));
                ArticleState::Completed
            } else {
                self.notify("Error", article.as_ref(), |a| self.source.on_error(a));
                ArticleState::Failed
            };

            let mut reports = self.reports.lock();
            reports[idx].state = state;
            reports[idx].errors = errors;
        }
    }

    /// Calls a source hook. Failures and panics are logged, never propagated.
    fn notify(&self, hook: &str, article: &dyn Article, call: impl FnOnce(&dyn Article) -> Result<()>) {
        let message = match panic::catch_unwind(AssertUnwindSafe(|| call(article))) {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e.to_string(),
            Err(payload) => panic_message(payload.as_ref()),
        };
        tracing::error!(title = article.title(), error = %message, "{hook} hook failed");
    }

    /// Runs every stage and returns the failure messages.
    fn process(&self, article: &dyn Article, meta: &SourceMeta, scratch: &Path) -> Vec<String> {
        let pipeline = self.pipeline;
        if pipeline.stages.is_empty() {
            tracing::error!(title = article.title(), "No stages configured");
            return vec!["no stages configured".to_string()];
        }

        let ctx = StageContext {
            article,
            composer: &pipeline.composer,
            source: meta,
            images: &pipeline.images,
            scratch,
            discussion: pipeline.discussion.as_deref(),
        };

        let mut errors = Vec::new();
        for stage in &pipeline.stages {
            if let Err(e) = clear_dir(scratch) {
                errors.push(format!("{}: cannot clear scratch folder: {e}", stage.name()));
                continue;
            }
            tracing::trace!(stage = stage.name(), title = article.title(), "Running stage");
            let message = match panic::catch_unwind(AssertUnwindSafe(|| stage.run(&ctx))) {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(payload) => panic_message(payload.as_ref()),
            };
            tracing::error!(stage = stage.name(), title = article.title(), "{message}");
            errors.push(format!("{}: {message}", stage.name()));
        }
        errors
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panicked: {s}")
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::article::StaticArticle;
    use crate::images::{ImageCache, ImageConfig};
    use crate::source::MemorySource;
    use crate::testing::FakeFetcher;
    use crate::{QuireError, Result};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn images() -> ImageHandlerFactory {
        ImageHandlerFactory::new(Arc::new(ImageCache::new(Arc::new(FakeFetcher::new()), ImageConfig::default())))
    }

    fn articles(n: usize) -> Vec<Arc<dyn Article>> {
        (1..=n)
            .map(|i| Arc::new(StaticArticle::new(format!("Article {i}"), format!("http://x.example/{i}"), "<p>x</p>")) as Arc<dyn Article>)
            .collect()
    }

    /// Records threads and scratch contents; fails or panics for one title.
    #[derive(Default)]
    struct RecordingStage {
        runs: AtomicUsize,
        threads: Mutex<HashSet<String>>,
        fail_title: Option<&'static str>,
        panic_title: Option<&'static str>,
        dirty_scratch: Mutex<usize>,
    }

    impl Stage for RecordingStage {
        fn name(&self) -> &str {
            "recorder"
        }

        fn run(&self, ctx: &StageContext<'_>) -> Result<()> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            if let Some(name) = thread::current().name() {
                self.threads.lock().insert(name.to_string());
            }
            if fs::read_dir(ctx.scratch)?.next().is_some() {
                *self.dirty_scratch.lock() += 1;
            }
            fs::write(ctx.scratch.join("leftover"), "x")?;

            if Some(ctx.article.title()) == self.panic_title {
                panic!("stage blew up");
            }
            if Some(ctx.article.title()) == self.fail_title {
                return Err(QuireError::StageError { stage: "recorder".into(), message: "refused".into() });
            }
            Ok(())
        }
    }

    #[test]
    fn test_one_failure_does_not_stop_others() {
        let stage = RecordingStage { fail_title: Some("Article 3"), ..Default::default() };
        let pipeline = Pipeline::new(vec![Box::new(stage)], images()).with_threads(3);
        let source = MemorySource::new(SourceMeta::default(), articles(5));

        let report = pipeline.run(&source).unwrap();

        let states: Vec<ArticleState> = report.articles.iter().map(|a| a.state).collect();
        assert_eq!(states, vec![
            ArticleState::Completed,
            ArticleState::Completed,
            ArticleState::Failed,
            ArticleState::Completed,
            ArticleState::Completed,
        ]);
        assert!(report.any_failed());
        assert_eq!(report.articles[2].errors, vec!["recorder: Stage 'recorder' failed: refused"]);
        assert_eq!(source.failed(), vec!["Article 3"]);
        assert_eq!(source.completed().len(), 4);
    }

    #[test]
    fn test_every_stage_runs_even_after_failure() {
        let first = Arc::new(RecordingStage { fail_title: Some("Article 1"), ..Default::default() });
        let second = Arc::new(RecordingStage::default());

        struct Shared(Arc<RecordingStage>);
        impl Stage for Shared {
            fn name(&self) -> &str {
                self.0.name()
            }
            fn run(&self, ctx: &StageContext<'_>) -> Result<()> {
                self.0.run(ctx)
            }
        }

        let pipeline = Pipeline::new(vec![Box::new(Shared(first.clone())), Box::new(Shared(second.clone()))], images());
        let report = pipeline.run(&MemorySource::new(SourceMeta::default(), articles(2))).unwrap();

        assert_eq!(report.failed_count(), 1);
        assert_eq!(first.runs.load(Ordering::SeqCst), 2);
        assert_eq!(second.runs.load(Ordering::SeqCst), 2);
        assert_eq!(*first.dirty_scratch.lock(), 0);
        assert_eq!(*second.dirty_scratch.lock(), 0);
    }

    #[test]
    fn test_panicking_stage_fails_article() {
        let stage = RecordingStage { panic_title: Some("Article 2"), ..Default::default() };
        let pipeline = Pipeline::new(vec![Box::new(stage)], images());
        let report = pipeline.run(&MemorySource::new(SourceMeta::default(), articles(3))).unwrap();

        assert_eq!(report.articles[1].state, ArticleState::Failed);
        assert!(report.articles[1].errors[0].contains("stage blew up"));
        assert_eq!(report.completed_count(), 2);
    }

    /// Source whose hooks panic for one title.
    struct PanickyHooks {
        inner: MemorySource,
        title: &'static str,
    }

    impl ArticleSource for PanickyHooks {
        fn meta(&self) -> &SourceMeta {
            self.inner.meta()
        }

        fn fetch_articles(&self) -> Result<crate::source::ArticleBatch> {
            self.inner.fetch_articles()
        }

        fn on_complete(&self, article: &dyn Article) -> Result<()> {
            if article.title() == self.title {
                panic!("completion hook blew up");
            }
            self.inner.on_complete(article)
        }

        fn on_error(&self, article: &dyn Article) -> Result<()> {
            if article.title() == self.title {
                panic!("error hook blew up");
            }
            self.inner.on_error(article)
        }
    }

    #[test]
    fn test_panicking_hook_keeps_run_going() {
        let stage = RecordingStage { fail_title: Some("Article 3"), ..Default::default() };
        let pipeline = Pipeline::new(vec![Box::new(stage)], images()).with_threads(2);
        let source = PanickyHooks { inner: MemorySource::new(SourceMeta::default(), articles(4)), title: "Article 2" };

        let report = pipeline.run(&source).unwrap();

        assert_eq!(report.articles.len(), 4);
        assert_eq!(report.articles[1].state, ArticleState::Completed);
        assert_eq!(report.articles[2].state, ArticleState::Failed);
        assert_eq!(report.completed_count(), 3);
        assert_eq!(source.inner.completed().len(), 2);
        assert_eq!(source.inner.failed(), vec!["Article 3"]);
    }

    #[test]
    fn test_panicking_error_hook_keeps_failed_state() {
        let stage = RecordingStage { fail_title: Some("Article 1"), ..Default::default() };
        let pipeline = Pipeline::new(vec![Box::new(stage)], images());
        let source = PanickyHooks { inner: MemorySource::new(SourceMeta::default(), articles(2)), title: "Article 1" };

        let report = pipeline.run(&source).unwrap();

        assert_eq!(report.articles[0].state, ArticleState::Failed);
        assert_eq!(report.articles[1].state, ArticleState::Completed);
    }

    #[test]
    fn test_no_stages_fails_every_article() {
        let pipeline = Pipeline::new(Vec::new(), images());
        let report = pipeline.run(&MemorySource::new(SourceMeta::default(), articles(2))).unwrap();
        assert_eq!(report.failed_count(), 2);
    }

    #[test]
    fn test_workers_never_exceed_articles() {
        let stage = Arc::new(RecordingStage::default());

        struct Shared(Arc<RecordingStage>);
        impl Stage for Shared {
            fn name(&self) -> &str {
                "shared"
            }
            fn run(&self, ctx: &StageContext<'_>) -> Result<()> {
                self.0.run(ctx)
            }
        }

        let pipeline = Pipeline::new(vec![Box::new(Shared(stage.clone()))], images()).with_threads(50);
        let report = pipeline.run(&MemorySource::new(SourceMeta::default(), articles(2))).unwrap();

        assert!(!report.any_failed());
        let threads = stage.threads.lock();
        assert!(!threads.is_empty() && threads.len() <= 2);
        assert!(threads.iter().all(|t| t.starts_with("quire-worker-")));
    }

    #[test]
    fn test_thread_count_is_clamped() {
        assert_eq!(Pipeline::new(Vec::new(), images()).with_threads(0).threads, 1);
        assert_eq!(Pipeline::new(Vec::new(), images()).with_threads(99).threads, MAX_THREADS);
    }

    #[test]
    fn test_empty_source() {
        let pipeline = Pipeline::new(Vec::new(), images());
        let report = pipeline.run(&MemorySource::new(SourceMeta::default(), Vec::new())).unwrap();
        assert!(report.articles.is_empty());
        assert!(!report.any_failed());
    }
}
