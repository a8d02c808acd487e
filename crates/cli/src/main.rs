use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use owo_colors::OwoColorize;
use quire_core::{ArticleSource, DEFAULT_TEMPLATE, HttpFetcher, ManifestSource, QuireConfig, StageConfig};
use tracing_subscriber::EnvFilter;

mod echo;

use echo::{print_banner, print_error, print_info, print_report, print_step, print_success, print_warning};

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Turn saved articles into self-contained HTML documents
#[derive(Parser, Debug)]
#[command(name = "quire")]
#[command(author = "Quire Contributors")]
#[command(version)]
#[command(about = "Turn saved articles into self-contained HTML documents", long_about = None)]
struct Args {
    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process every article of a manifest through the configured stages
    Process {
        /// JSON manifest of articles
        #[arg(value_name = "MANIFEST")]
        manifest: PathBuf,

        /// Configuration file (default: <config dir>/quire/config.toml)
        #[arg(short, long, value_name = "FILE")]
        config: Option<PathBuf>,

        /// Output folder when no configuration file exists
        #[arg(short, long, value_name = "DIR", default_value = ".")]
        output: PathBuf,

        /// Override the configured number of worker threads
        #[arg(short, long, value_name = "NUM")]
        threads: Option<usize>,
    },

    /// List the articles of a manifest without processing them
    List {
        #[arg(value_name = "MANIFEST")]
        manifest: PathBuf,
    },

    /// Write the built-in template to a file for customizing
    Template {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Generate a shell completion script
    Completions {
        #[arg(value_name = "SHELL")]
        shell: Shell,
    },
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("quire").join("config.toml"))
}

fn init_tracing(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("quire_core={level},quire_cli={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// Reads the configuration, or falls back to a single save stage writing
/// into `output` when no file exists at the default location.
fn load_config(explicit: Option<&Path>, output: &Path, verbose: bool) -> anyhow::Result<QuireConfig> {
    if let Some(path) = explicit {
        tracing::debug!(path = %path.display(), "Loading config");
        return QuireConfig::from_file(path).with_context(|| format!("Failed to load config: {}", path.display()));
    }
    if let Some(path) = default_config_path().filter(|p| p.exists()) {
        if verbose {
            print_info(&format!("Using config {}", path.display()));
        }
        tracing::debug!(path = %path.display(), "Loading default config");
        return QuireConfig::from_file(&path).with_context(|| format!("Failed to load config: {}", path.display()));
    }

    if verbose {
        print_warning(&format!("No config file found, saving into {}", output.display()));
    }
    tracing::debug!(output = %output.display(), "Using a single save stage");
    let mut config = QuireConfig::default();
    config.stages.push(StageConfig {
        name: Some("save".to_string()),
        kind: "save".to_string(),
        footnotes: true,
        discussion: false,
        template: None,
        save_to: Some(output.to_path_buf()),
        command: None,
        args: Vec::new(),
        extension: None,
    });
    config.validate()?;
    Ok(config)
}

fn process(
    manifest: &Path, config: Option<&Path>, output: &Path, threads: Option<usize>, verbose: bool,
) -> anyhow::Result<ExitCode> {
    if verbose {
        print_step(1, 3, "Loading configuration");
    }
    let mut config = load_config(config, output, verbose)?;
    if let Some(threads) = threads {
        config.worker.threads = threads;
    }

    if verbose {
        print_step(2, 3, "Preparing stages");
    }
    let fetcher = HttpFetcher::new(config.fetch.clone()).context("Failed to create HTTP client")?;
    let pipeline = config.build_pipeline(Arc::new(fetcher)).context("Failed to set up stages")?;
    tracing::info!(stages = pipeline.stages().len(), threads = config.worker.threads, "Pipeline ready");

    if verbose {
        print_step(3, 3, &format!("Processing {}", manifest.display().bright_white()));
    }
    let source = ManifestSource::new(manifest);
    let report = pipeline
        .run(&source)
        .with_context(|| format!("Failed to read articles from {}", manifest.display()))?;

    if verbose || report.any_failed() {
        print_report(&report);
    }
    if report.any_failed() {
        print_error(&format!("{} of {} articles failed", report.failed_count(), report.articles.len()));
        return Ok(ExitCode::FAILURE);
    }
    print_success(&format!("Processed {} articles", report.completed_count()));
    Ok(ExitCode::SUCCESS)
}

fn list(manifest: &Path) -> anyhow::Result<ExitCode> {
    let source = ManifestSource::new(manifest);
    let batch = source
        .fetch_articles()
        .with_context(|| format!("Failed to read articles from {}", manifest.display()))?;

    for article in &batch.articles {
        println!("{}", article.title());
    }
    for error in &batch.errors {
        print_error(error);
    }
    tracing::debug!(articles = batch.articles.len(), errors = batch.errors.len(), "Listed manifest");
    Ok(if batch.errors.is_empty() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn template(file: &Path) -> anyhow::Result<ExitCode> {
    if file.exists() {
        print_error("The template file already exists.");
        print_info(&format!("Delete or rename {} first.", file.display()));
        return Ok(ExitCode::FAILURE);
    }
    fs::write(file, DEFAULT_TEMPLATE).with_context(|| format!("Failed to write to file: {}", file.display()))?;
    print_success(&format!("Generated template file: {}", file.display().bright_white()));
    Ok(ExitCode::SUCCESS)
}

fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    init_tracing(args.verbose, args.quiet);
    let verbose = args.verbose > 0;

    if verbose {
        print_banner();
    }

    match args.command {
        Command::Process { manifest, config, output, threads } => {
            process(&manifest, config.as_deref(), &output, threads, verbose)
        }
        Command::List { manifest } => list(&manifest),
        Command::Template { file } => template(&file),
        Command::Completions { shell } => {
            let mut cmd = Args::command();
            clap_complete::generate(shell, &mut cmd, "quire", &mut io::stdout());
            Ok(ExitCode::SUCCESS)
        }
    }
}
