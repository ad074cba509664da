//! Command-line interface for convoscribe
//!
//! Provides argument parsing using clap derive macros, plus the plain-text
//! rendering of job reports and plugin listings.

use crate::orchestrator::JobReport;
use crate::pipeline::ComponentState;
use crate::plugins::PluginManager;
use clap::{Parser, Subcommand};
use clap_complete::Shell;
use owo_colors::OwoColorize;
use std::fmt::{self, Write};
use std::path::PathBuf;

/// Transcription job orchestration
#[derive(Parser, Debug)]
#[command(name = "convoscribe", version, about = "Transcribe and analyse conversations")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose logging (each -v raises the log level one step)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a transcription job over one or more sources
    Run {
        /// Source files; the file stem becomes the conversation id
        #[arg(required = true, value_name = "SOURCES")]
        sources: Vec<PathBuf>,

        /// Directory of plugin suite files to register
        #[arg(long, value_name = "DIR")]
        plugins: Option<PathBuf>,

        /// Directory transcripts are written to
        #[arg(long, short = 'o', value_name = "DIR")]
        output: Option<PathBuf>,

        /// Worker threads per stage
        #[arg(long, short = 'w', value_name = "N")]
        workers: Option<i64>,

        /// Plugins to apply (comma-separated, default: all registered)
        #[arg(long, value_name = "NAMES", value_delimiter = ',')]
        apply: Option<Vec<String>>,

        /// Print the job report as JSON instead of a summary
        #[arg(long)]
        json: bool,
    },

    /// List registered plugins and their dependencies
    Plugins {
        /// Directory of plugin suite files to register
        #[arg(long, value_name = "DIR")]
        plugins: Option<PathBuf>,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Configuration inspection actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the default configuration file path
    Path,
}

fn paint_state(state: ComponentState, color: bool) -> String {
    let label = state.to_string();
    if !color {
        return label;
    }
    match state {
        ComponentState::Successful => label.green().to_string(),
        ComponentState::Failed => label.red().to_string(),
        ComponentState::Unexecuted => label.yellow().to_string(),
        ComponentState::Ready | ComponentState::Running => label.dimmed().to_string(),
    }
}

/// Renders a job report as a human-readable summary.
pub fn render_report(report: &JobReport, color: bool) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    write_report(&mut out, report, color).ok();
    out
}

/// Writes the summary of `report` to `out`.
pub fn write_report(out: &mut impl Write, report: &JobReport, color: bool) -> fmt::Result {
    writeln!(out, "Components:")?;
    for component in &report.components {
        write!(
            out,
            "  {:<14} {:<11} {}",
            component.name,
            paint_state(component.state, color),
            component.runtime
        )?;
        if let Some(error) = &component.error {
            write!(out, "  {error}")?;
        }
        writeln!(out)?;
    }

    writeln!(out, "Conversations:")?;
    for conversation in &report.conversations {
        let status = match conversation.failures.last() {
            Some(failure) => {
                let text = format!("failed in {}: {}", failure.stage, failure.message);
                if color { text.red().to_string() } else { text }
            }
            None => {
                let analysis = conversation
                    .analysis
                    .as_ref()
                    .map(|summary| {
                        format!(
                            ", {}/{} plugins",
                            summary.successful_plugins.len(),
                            summary.successful_plugins.len() + summary.failed_plugins.len()
                        )
                    })
                    .unwrap_or_default();
                format!(
                    "{} utterances, {:.1}s speech{analysis}",
                    conversation.utterances.len(),
                    conversation.speech_ms() as f64 / 1000.0
                )
            }
        };
        write!(out, "  {:<14} {status}", conversation.id())?;
        if let Some(path) = &conversation.output_path {
            write!(out, " -> {}", path.display())?;
        }
        writeln!(out)?;
    }
    writeln!(out, "Finished in {}", report.runtime)
}

/// Renders the registered plugins, one per line.
pub fn render_plugins(manager: &PluginManager) -> String {
    manager
        .plugin_names()
        .into_iter()
        .filter_map(|name| manager.plugin_details(&name))
        .map(|details| {
            if details.dependencies.is_empty() {
                format!("{} (entry: {})\n", details.name, details.entry)
            } else {
                format!(
                    "{} (entry: {}) <- {}\n",
                    details.name,
                    details.entry,
                    details.dependencies.join(", ")
                )
            }
        })
        .collect()
}
