//! Run configuration.
//!
//! A TOML file describes the worker pool, image handling, HTTP settings and
//! the list of output stages:
//!
//! ```toml
//! [worker]
//! threads = 4
//!
//! [image]
//! ignore_errors = true
//! min_width = 1
//! min_height = 1
//! cache_max_mb = 200
//!
//! [fetch]
//! timeout = 20
//!
//! [[stages]]
//! name = "html"
//! type = "save"
//! save_to = "~/Articles"
//! discussion = true
//!
//! [[stages]]
//! name = "epub"
//! type = "convert"
//! save_to = "~/Books"
//! command = "ebook-convert"
//! args = ["{input}", "{output}", "--title", "{title}"]
//! extension = "epub"
//!
//! [[stages]]
//! name = "calibre"
//! type = "import"
//! command = "calibredb"
//! args = ["add", "{input}", "--title", "{title}"]
//! ```
//!
//! Configuration problems are reported before any article is touched.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;

use crate::discussion::{DiscussionLookup, HackerNewsSearch};
use crate::fetch::{FetchConfig, Fetcher, fetch_file};
use crate::images::{ImageCache, ImageConfig, ImageHandlerFactory};
use crate::pipeline::Pipeline;
use crate::stages::{CommandConverter, ConvertStage, ImportStage, SaveStage, Stage, StageOptions};
use crate::template::TemplateStore;
use crate::{QuireError, Result};

/// Worker pool settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Worker threads; clamped to `1..=20` and to the article count.
    pub threads: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { threads: 1 }
    }
}

/// Kinds of output stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Save,
    Convert,
    /// Hand the composed HTML to a library tool.
    Import,
}

impl std::str::FromStr for StageKind {
    type Err = QuireError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "save" => Ok(Self::Save),
            "convert" => Ok(Self::Convert),
            "import" => Ok(Self::Import),
            other => Err(QuireError::ConfigError(format!("unknown stage type '{other}'"))),
        }
    }
}

fn default_true() -> bool {
    true
}

/// One `[[stages]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StageConfig {
    /// Label used in logs; defaults to the stage type.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default = "default_true")]
    pub footnotes: bool,
    #[serde(default)]
    pub discussion: bool,
    /// Template file; the built-in template when absent.
    #[serde(default)]
    pub template: Option<PathBuf>,
    /// Output folder (not used by `import`).
    #[serde(default)]
    pub save_to: Option<PathBuf>,
    /// Program for `convert` and `import` stages.
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    /// Output extension (`convert` only).
    #[serde(default)]
    pub extension: Option<String>,
}

impl StageConfig {
    pub fn stage_kind(&self) -> Result<StageKind> {
        self.kind.parse()
    }

    pub fn label(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.kind.trim().to_ascii_lowercase())
    }

    fn validate(&self) -> Result<()> {
        let kind = self.stage_kind()?;
        let label = self.label();
        if kind != StageKind::Import && self.save_to.is_none() {
            return Err(QuireError::ConfigError(format!("stage '{label}' has no save_to folder")));
        }
        if kind != StageKind::Save && self.command.as_deref().is_none_or(|c| c.trim().is_empty()) {
            return Err(QuireError::ConfigError(format!("stage '{label}' has no command")));
        }
        if kind == StageKind::Convert && self.extension.as_deref().is_none_or(|e| e.trim_matches('.').is_empty()) {
            return Err(QuireError::ConfigError(format!("stage '{label}' has no extension")));
        }
        Ok(())
    }
}

/// Everything read from a configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct QuireConfig {
    pub worker: WorkerConfig,
    pub image: ImageConfig,
    pub fetch: FetchConfig,
    pub stages: Vec<StageConfig>,
}

impl QuireConfig {
    /// Parses and validates TOML text.
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(QuireError::FileNotFound(path.to_path_buf()));
        }
        Self::from_toml(&fetch_file(path)?)
    }

    pub fn validate(&self) -> Result<()> {
        self.image.validate()?;
        if self.stages.is_empty() {
            return Err(QuireError::ConfigError("no stages configured".into()));
        }
        let mut labels = HashSet::new();
        for stage in &self.stages {
            stage.validate()?;
            if !labels.insert(stage.label()) {
                tracing::warn!(stage = %stage.label(), "Several stages share a name");
            }
        }
        Ok(())
    }

    /// Builds a ready-to-run pipeline.
    ///
    /// Output folders are created and templates are loaded here, so a bad
    /// path fails the whole run before processing starts.
    pub fn build_pipeline(&self, fetcher: Arc<dyn Fetcher>) -> Result<Pipeline> {
        let templates = TemplateStore::new();
        let stages = self
            .stages
            .iter()
            .map(|stage| build_stage(stage, &templates))
            .collect::<Result<Vec<_>>>()?;

        let cache = ImageCache::new(Arc::clone(&fetcher), self.image.clone());
        let mut pipeline = Pipeline::new(stages, ImageHandlerFactory::new(Arc::new(cache)))
            .with_threads(self.worker.threads);
        if self.stages.iter().any(|s| s.discussion) {
            let search = HackerNewsSearch::new(fetcher);
            pipeline = pipeline.with_discussion(Arc::new(DiscussionLookup::new(Arc::new(search))));
        }
        Ok(pipeline)
    }
}

fn build_stage(config: &StageConfig, templates: &TemplateStore) -> Result<Box<dyn Stage>> {
    config.validate()?;
    let options = StageOptions::default()
        .with_template(templates.get(config.template.as_deref())?)
        .with_footnotes(config.footnotes)
        .with_discussion(config.discussion);
    let folder = config.save_to.clone().unwrap_or_default();

    let stage: Box<dyn Stage> = match config.stage_kind()? {
        StageKind::Save => Box::new(SaveStage::new(config.label(), folder, options)?),
        StageKind::Convert => {
            let command = config.command.clone().unwrap_or_default();
            let converter = Arc::new(CommandConverter::new(command, config.args.clone()));
            let extension = config.extension.as_deref().unwrap_or_default();
            Box::new(ConvertStage::new(config.label(), folder, extension, converter, options)?)
        }
        StageKind::Import => {
            let command = config.command.clone().unwrap_or_default();
            let importer = Arc::new(CommandConverter::new(command, config.args.clone()));
            Box::new(ImportStage::new(config.label(), importer, options))
        }
    };
    Ok(stage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeFetcher;
    use rstest::rstest;
    use std::fs;

    fn stages_toml(dir: &Path) -> String {
        format!(
            r#"
[worker]
threads = 3

[image]
ignore_errors = true
min_width = 2
cache_max_members = 50

[[stages]]
name = "html"
type = "save"
save_to = "{out}"
discussion = true

[[stages]]
type = "Convert"
save_to = "{out}"
command = "ebook-convert"
args = ["{{input}}", "{{output}}"]
extension = ".epub"
footnotes = false
"#,
            out = dir.display()
        )
    }

    #[test]
    fn test_parse_full_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = QuireConfig::from_toml(&stages_toml(dir.path())).unwrap();

        assert_eq!(config.worker.threads, 3);
        assert!(config.image.ignore_errors);
        assert_eq!(config.image.min_width, 2);
        assert_eq!(config.image.cache_max_members, Some(50));
        assert_eq!(config.fetch.timeout, 30);
        assert_eq!(config.stages.len(), 2);

        let html = &config.stages[0];
        assert_eq!(html.stage_kind().unwrap(), StageKind::Save);
        assert!(html.footnotes);
        assert!(html.discussion);

        let epub = &config.stages[1];
        assert_eq!(epub.label(), "convert");
        assert_eq!(epub.args, vec!["{input}", "{output}"]);
        assert!(!epub.footnotes);
    }

    #[test]
    fn test_build_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let config = QuireConfig::from_toml(&stages_toml(&out)).unwrap();

        let pipeline = config.build_pipeline(Arc::new(FakeFetcher::new())).unwrap();
        let names: Vec<&str> = pipeline.stages().iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["html", "convert"]);
        assert!(out.is_dir());
    }

    #[rstest]
    #[case::both_bounds("[image]\ncache_max_members = 5\ncache_max_mb = 5\n[[stages]]\ntype = \"save\"\nsave_to = \"o\"")]
    #[case::no_stages("[worker]\nthreads = 2")]
    #[case::unknown_type("[[stages]]\ntype = \"print\"\nsave_to = \"o\"")]
    #[case::no_folder("[[stages]]\ntype = \"save\"")]
    #[case::no_command("[[stages]]\ntype = \"convert\"\nsave_to = \"o\"\nextension = \"epub\"")]
    #[case::import_without_command("[[stages]]\ntype = \"import\"")]
    #[case::no_extension("[[stages]]\ntype = \"convert\"\nsave_to = \"o\"\ncommand = \"x\"")]
    fn test_invalid_configs(#[case] text: &str) {
        assert!(matches!(QuireConfig::from_toml(text), Err(QuireError::ConfigError(_))));
    }

    #[test]
    fn test_import_stage_needs_no_folder() {
        let text = "[[stages]]\nname = \"calibre\"\ntype = \"Import\"\ncommand = \"calibredb\"\nargs = [\"add\", \"{input}\"]";
        let config = QuireConfig::from_toml(text).unwrap();
        assert_eq!(config.stages[0].stage_kind().unwrap(), StageKind::Import);

        let pipeline = config.build_pipeline(Arc::new(FakeFetcher::new())).unwrap();
        let names: Vec<&str> = pipeline.stages().iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["calibre"]);
    }

    #[test]
    fn test_malformed_toml() {
        assert!(matches!(QuireConfig::from_toml("[[stages]\n"), Err(QuireError::TomlError(_))));
    }

    #[test]
    fn test_missing_template_fails_build() {
        let dir = tempfile::tempdir().unwrap();
        let text = format!(
            "[[stages]]\ntype = \"save\"\nsave_to = \"{}\"\ntemplate = \"{}\"",
            dir.path().display(),
            dir.path().join("missing.html").display()
        );
        let config = QuireConfig::from_toml(&text).unwrap();
        assert!(config.build_pipeline(Arc::new(FakeFetcher::new())).is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        assert!(matches!(QuireConfig::from_file(&path), Err(QuireError::FileNotFound(_))));

        fs::write(&path, stages_toml(dir.path())).unwrap();
        assert_eq!(QuireConfig::from_file(&path).unwrap().stages.len(), 2);
    }
}
