use owo_colors::OwoColorize;
use quire_core::{ArticleState, RunReport};

use crate::VERSION;

/// Print a styled banner for verbose mode
pub fn print_banner() {
    eprintln!("\n{} {} {}", "Quire".bold().bright_blue(), "v".dimmed(), VERSION.dimmed());
    eprintln!("{}", "Turn saved articles into self-contained documents\n".dimmed());
}

/// Print a styled step message
pub fn print_step(step: usize, total: usize, message: &str) {
    eprintln!("{} {}", format!("[{}/{}]", step, total).dimmed(), message.bright_cyan());
}

/// Print a success message
pub fn print_success(message: &str) {
    eprintln!("{} {}", "✓".green(), message.bright_green());
}

/// Print an info message
pub fn print_info(message: &str) {
    eprintln!("{} {}", "ℹ".blue(), message.bright_blue());
}

/// Print a warning message
pub fn print_warning(message: &str) {
    eprintln!("{} {}", "⚠".yellow(), message.bright_yellow());
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red(), message.bright_red());
}

/// Print the per-article outcome of a run
pub fn print_report(report: &RunReport) {
    eprintln!("{}", "═".repeat(60).dimmed());
    eprintln!("{}", "Run Summary".bold().cyan());
    eprintln!("{}", "═".repeat(60).dimmed());

    for article in &report.articles {
        match article.state {
            ArticleState::Completed => eprintln!("  {} {}", "✓".green(), article.title.bright_white()),
            _ => {
                eprintln!("  {} {}", "✗".red(), article.title.bright_white());
                for error in &article.errors {
                    eprintln!("      {}", error.dimmed());
                }
            }
        }
    }
    for error in &report.source_errors {
        eprintln!("  {} {}", "⚠".yellow(), error.bright_yellow());
    }

    eprintln!(
        "\n  {} {}   {} {}\n",
        "Completed:".dimmed(),
        report.completed_count().to_string().bright_green(),
        "Failed:".dimmed(),
        report.failed_count().to_string().bright_red()
    );
}
