use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use convoscribe::cli::{Cli, Commands, ConfigAction, render_plugins, render_report};
use convoscribe::config::Config;
use convoscribe::orchestrator::Orchestrator;
use convoscribe::stages::Source;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            sources,
            plugins,
            output,
            workers,
            apply,
            json,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            init_logging(&config, cli.verbose, cli.quiet);
            if let Some(directory) = plugins {
                config.plugins.directory = Some(directory);
            }
            if let Some(directory) = output {
                config.output.directory = directory;
            }
            if let Some(workers) = workers {
                config.pool.workers = workers;
            }
            if apply.is_some() {
                config.plugins.apply = apply;
            }
            run_job(config, sources, json)?;
        }
        Commands::Plugins { plugins } => {
            let mut config = load_config(cli.config.as_deref())?;
            init_logging(&config, cli.verbose, cli.quiet);
            if let Some(directory) = plugins {
                config.plugins.directory = Some(directory);
            }
            let orchestrator = Orchestrator::from_config(config)?;
            print!("{}", render_plugins(orchestrator.plugins()));
        }
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                let config = load_config(cli.config.as_deref())?;
                print!("{}", config.to_toml()?);
            }
            ConfigAction::Path => {
                let path = cli.config.unwrap_or_else(Config::default_path);
                println!("{}", path.display());
            }
        },
        Commands::Completions { shell } => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "convoscribe",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config)
/// 2. Default config path (~/.config/convoscribe/config.toml)
/// 3. Built-in defaults with environment variable overrides
fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = if let Some(path) = custom_path {
        Config::load(path)?
    } else {
        Config::load_or_default(&Config::default_path())?
    };

    Ok(config.with_env_overrides())
}

fn init_logging(config: &Config, verbose: u8, quiet: bool) {
    let directive = convoscribe::logging::filter_directive(&config.logging.level, verbose, quiet);
    if let Err(e) = convoscribe::logging::init(&directive) {
        eprintln!("convoscribe: {e}");
    }
}

fn run_job(config: Config, sources: Vec<PathBuf>, json: bool) -> Result<()> {
    tracing::debug!(version = %convoscribe::version_string(), "starting job");
    let orchestrator = Orchestrator::from_config(config).context("failed to set up job")?;
    let sources = sources.into_iter().map(Source::from_path).collect();
    let report = orchestrator.run(sources)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_report(&report, std::io::stdout().is_terminal()));
    }

    if !report.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
