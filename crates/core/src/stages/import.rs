use std::fs;
use std::sync::Arc;

use super::{ConvertJob, Converter, Stage, StageContext, StageOptions};
use crate::Result;
use crate::article::summary_html;
use crate::unique::sanitize_file_name;

/// Hands the composed document to an external library tool, such as
/// `calibredb add {input} --title {title}`.
///
/// The document is written to the scratch directory as `<title>.html` with
/// its images in `<title>_files/`. Nothing is delivered afterwards; the
/// command is expected to copy what it needs. `{output}` expands to the
/// scratch directory.
pub struct ImportStage {
    name: String,
    importer: Arc<dyn Converter>,
    options: StageOptions,
}

impl ImportStage {
    pub fn new(name: impl Into<String>, importer: Arc<dyn Converter>, options: StageOptions) -> Self {
        Self { name: name.into(), importer, options }
    }
}

impl Stage for ImportStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, ctx: &StageContext<'_>) -> Result<()> {
        let base = sanitize_file_name(ctx.article.title(), "document");
        let input = ctx.scratch.join(format!("{base}.html"));

        let mut images = ctx.images.handler(ctx.scratch.join(format!("{base}_files")), format!("{base}_files/"));
        let doc = self.options.compose(ctx, Some(&mut images))?;
        fs::write(&input, doc.to_html())?;

        tracing::debug!(stage = %self.name, path = %input.display(), "Importing");
        let job = ConvertJob {
            title: ctx.article.title(),
            input: &input,
            output: ctx.scratch,
            summary: summary_html(ctx.article),
        };
        self.importer.convert(&job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::QuireError;
    use crate::article::StaticArticle;
    use crate::compose::Composer;
    use crate::fetch::FetchResponse;
    use crate::images::{ImageCache, ImageConfig, ImageHandlerFactory};
    use crate::source::SourceMeta;
    use crate::testing::{FakeFetcher, png_bytes};
    use parking_lot::Mutex;
    use std::path::Path;

    /// Keeps a copy of every imported document.
    #[derive(Default)]
    struct Library {
        books: Mutex<Vec<(String, String, bool)>>,
        refuse: bool,
    }

    impl Converter for Library {
        fn convert(&self, job: &ConvertJob<'_>) -> Result<()> {
            if self.refuse {
                return Err(QuireError::StageError { stage: "library".into(), message: "locked".into() });
            }
            let html = fs::read_to_string(job.input)?;
            let has_images = job.output.join("Shelf Life_files").is_dir();
            self.books.lock().push((job.title.to_string(), html, has_images));
            Ok(())
        }
    }

    fn run(stage: &ImportStage, article: &StaticArticle, scratch: &Path) -> Result<()> {
        let fetcher = FakeFetcher::new().with("http://i.example/cover.png", FetchResponse::ok(png_bytes(8, 8), None));
        let images = ImageHandlerFactory::new(Arc::new(ImageCache::new(Arc::new(fetcher), ImageConfig::default())));
        let composer = Composer::new();
        let source = SourceMeta::default();
        let ctx =
            StageContext { article, composer: &composer, source: &source, images: &images, scratch, discussion: None };
        stage.run(&ctx)
    }

    #[test]
    fn test_imports_composed_document() {
        let scratch = tempfile::tempdir().unwrap();
        let library = Arc::new(Library::default());
        let stage = ImportStage::new("library", library.clone(), StageOptions::default());
        let article = StaticArticle::new("Shelf Life", "http://x.example", r#"<p><img src="http://i.example/cover.png">Text</p>"#);

        run(&stage, &article, scratch.path()).unwrap();

        let books = library.books.lock();
        assert_eq!(books.len(), 1);
        let (title, html, has_images) = &books[0];
        assert_eq!(title, "Shelf Life");
        assert!(html.contains(r#"<img src="Shelf Life_files/cover.png">"#));
        assert!(*has_images);
    }

    #[test]
    fn test_import_failure_fails_stage() {
        let scratch = tempfile::tempdir().unwrap();
        let stage = ImportStage::new("library", Arc::new(Library { refuse: true, ..Default::default() }), StageOptions::default());

        let result = run(&stage, &StaticArticle::new("Shelf Life", "u", "<p>x</p>"), scratch.path());

        assert!(matches!(result, Err(QuireError::StageError { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_needs_no_output_file() {
        let scratch = tempfile::tempdir().unwrap();
        let shelf = tempfile::tempdir().unwrap();
        let copy = shelf.path().join("imported.html");
        let importer = crate::stages::CommandConverter::new("cp", vec!["{input}".into(), copy.display().to_string()]);
        let stage = ImportStage::new("cp", Arc::new(importer), StageOptions::default());

        run(&stage, &StaticArticle::new("Plain", "u", "<p>Kept.</p>"), scratch.path()).unwrap();

        assert!(fs::read_to_string(&copy).unwrap().contains("<p>Kept.</p>"));
    }
}
