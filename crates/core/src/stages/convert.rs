use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use super::{Stage, StageContext, StageOptions};
use crate::article::summary_html;
use crate::reservation::SaveTarget;
use crate::{QuireError, Result};

const SCRATCH_NAME: &str = "temp";

/// Inputs for one conversion.
#[derive(Debug)]
pub struct ConvertJob<'a> {
    pub title: &'a str,
    /// Composed HTML; images sit next to it.
    pub input: &'a Path,
    /// Where the converter must write its result.
    pub output: &'a Path,
    /// HTML summary of the article.
    pub summary: String,
}

/// Turns a composed HTML file into another format.
pub trait Converter: Send + Sync {
    fn convert(&self, job: &ConvertJob<'_>) -> Result<()>;
}

/// Runs an external program.
///
/// Each argument may contain the placeholders `{input}`, `{output}`,
/// `{title}` and `{summary}`.
#[derive(Debug, Clone)]
pub struct CommandConverter {
    program: String,
    args: Vec<String>,
}

impl CommandConverter {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self { program: program.into(), args }
    }

    fn expand(&self, job: &ConvertJob<'_>) -> Vec<String> {
        let input = job.input.to_string_lossy();
        let output = job.output.to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{input}", &input)
                    .replace("{output}", &output)
                    .replace("{title}", job.title)
                    .replace("{summary}", &job.summary)
            })
            .collect()
    }
}

impl Converter for CommandConverter {
    fn convert(&self, job: &ConvertJob<'_>) -> Result<()> {
        let args = self.expand(job);
        tracing::debug!(program = %self.program, ?args, "Running converter");
        let output = Command::new(&self.program).args(&args).output().map_err(|e| QuireError::StageError {
            stage: self.program.clone(),
            message: format!("could not run: {e}"),
        })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(QuireError::StageError {
                stage: self.program.clone(),
                message: format!("exited with {}: {}", output.status, stderr.trim()),
            });
        }
        Ok(())
    }
}

/// Composes into the scratch directory, converts, then moves the result to
/// `<title>.<extension>` in the output folder.
pub struct ConvertStage {
    name: String,
    target: SaveTarget,
    extension: String,
    converter: Arc<dyn Converter>,
    options: StageOptions,
}

impl ConvertStage {
    pub fn new(
        name: impl Into<String>, folder: impl Into<PathBuf>, extension: &str, converter: Arc<dyn Converter>,
        options: StageOptions,
    ) -> Result<Self> {
        let extension = extension.trim_start_matches('.').to_ascii_lowercase();
        if extension.is_empty() {
            return Err(QuireError::ConfigError("convert stage needs an output extension".into()));
        }
        Ok(Self { name: name.into(), target: SaveTarget::new(folder)?, extension, converter, options })
    }
}

impl Stage for ConvertStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, ctx: &StageContext<'_>) -> Result<()> {
        let reservation = self.target.reserve_for(ctx.article, Some(&format!(".{}", self.extension)), None)?;
        let input = ctx.scratch.join(format!("{SCRATCH_NAME}.html"));
        let output = ctx.scratch.join(format!("{SCRATCH_NAME}.{}", self.extension));

        let mut images = ctx.images.handler(ctx.scratch, "");
        let doc = self.options.compose(ctx, Some(&mut images))?;
        fs::write(&input, doc.to_html())?;

        let job = ConvertJob { title: ctx.article.title(), input: &input, output: &output, summary: summary_html(ctx.article) };
        self.converter.convert(&job)?;
        if !output.is_file() {
            return Err(QuireError::StageError {
                stage: self.name.clone(),
                message: format!("converter produced no {} file", self.extension),
            });
        }

        self.target.deliver(reservation, Some(&output), None)
    }
}
