//! # train-cli
//!
//! Binary entry point for Event Train.
//!
//! This crate provides:
//! - CLI argument parsing using `clap`
//! - Configuration loading and logging setup
//! - `train catalog` to inspect the events a configured train enlists
//! - `train simulate` to run a scripted multi-frame page

mod scenario;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use scenario::{Scenario, SimulationReport};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use train_core::testing::Page;
use train_core::{DEFAULT_EVENTS, Train, TrainConfig};

/// Output format for reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format for programmatic access
    Json,
}

/// Event Train - pub/sub event bus bridging micro front-ends across frames
#[derive(Parser, Debug)]
#[command(name = "train", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    // ─────────────────────────────────────────────────────────────────────────
    // Global options (available for all subcommands)
    // ─────────────────────────────────────────────────────────────────────────

    /// Path to configuration file
    #[arg(short, long, default_value = "train.yml", global = true)]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Show the events and frame selectors a configured train starts with
    Catalog(CatalogArgs),

    /// Run a scripted page of embedded frames and report what happened
    Simulate(SimulateArgs),
}

#[derive(Parser, Debug)]
struct CatalogArgs {
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,
}

#[derive(Parser, Debug)]
struct SimulateArgs {
    /// Scenario file
    scenario: PathBuf,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    // RUST_LOG wins over the configured levels
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.logging.filter_directives()))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    for warning in config.validate()? {
        eprintln!("{warning}");
    }

    match cli.command {
        Commands::Catalog(args) => catalog_command(&config, args),
        Commands::Simulate(args) => simulate_command(&config, args),
    }
}

/// Loads the config file, or the defaults when it does not exist.
fn load_config(path: &Path) -> Result<TrainConfig> {
    if path.exists() {
        TrainConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))
    } else {
        Ok(TrainConfig::default())
    }
}

fn catalog_command(config: &TrainConfig, args: CatalogArgs) -> Result<()> {
    let page = Page::new("https://portal.example");
    let train = Train::bootstrap(page.top(), config).context("Failed to bootstrap train")?;
    let events = train.lookup_registered_event();
    let selectors = train.lookup_registered_iframe_selectors();
    debug!(events = events.len(), selectors = selectors.len(), "Catalog collected");

    match args.format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "events": events,
                "privateEvents": config.private_events,
                "frameSelectors": selectors,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            println!("Namespace │ Event");
            println!("──────────┼──────────────────────────────────────");
            for event in &events {
                let namespace = if DEFAULT_EVENTS.contains(&event.as_str()) {
                    "default"
                } else {
                    "public"
                };
                println!("{namespace:<9} │ {event}");
            }
            for event in &config.private_events {
                println!("{:<9} │ {event}", "private");
            }
            println!();
            println!("Frame selectors:");
            for selector in &selectors {
                println!("  {selector}");
            }
        }
    }
    Ok(())
}

fn simulate_command(config: &TrainConfig, args: SimulateArgs) -> Result<()> {
    let scenario = Scenario::from_file(&args.scenario)?;
    info!(scenario = %args.scenario.display(), "Running simulation");
    let report = scenario::simulate(&scenario, config)?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Table => print_report(&report),
    }
    Ok(())
}

fn print_report(report: &SimulationReport) {
    if let Some(name) = &report.name {
        println!("Scenario: {name}");
        println!();
    }

    println!("Context          │ Handshake     │ Public events");
    println!("─────────────────┼───────────────┼──────────────────────────");
    for context in &report.contexts {
        let public: Vec<&str> = context
            .catalog
            .iter()
            .map(String::as_str)
            .filter(|event| !DEFAULT_EVENTS.contains(event))
            .collect();
        println!(
            "{:<16} │ {:<13} │ {}",
            context.name,
            format!("{:?}", context.handshake),
            if public.is_empty() { "-".to_string() } else { public.join(", ") }
        );
    }

    println!();
    println!("Deliveries ({}):", report.deliveries.len());
    for delivery in &report.deliveries {
        let payload = delivery
            .payload
            .as_ref()
            .map_or_else(|| "-".to_string(), |payload| payload.to_string());
        println!(
            "  {} <- {} [{}] {}",
            delivery.context, delivery.event, delivery.source, payload
        );
    }

    if !report.failures.is_empty() {
        println!();
        println!("Failures ({}):", report.failures.len());
        for failure in &report.failures {
            println!("  {failure}");
        }
    }

    println!();
    println!("Activity log ({}):", report.activities.len());
    for row in &report.activities {
        let activity = &row.activity;
        println!(
            "  {:>13} {:<16} {:<22} {:<7} -> {:<28} {}",
            activity.ts,
            row.context,
            activity.invoked_by,
            activity.source.as_str(),
            activity.target.as_deref().unwrap_or("-"),
            activity.event.as_deref().unwrap_or("-")
        );
    }

    println!();
    println!("{} messages delivered", report.messages_delivered);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("absent.yml")).unwrap();
        assert!(config.public_events.is_empty());
        assert!(config.acknowledge_handshake);
    }

    #[test]
    fn test_broken_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train.yml");
        std::fs::write(&path, "public_events: {not: [a list").unwrap();
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn test_cli_parses_simulate() {
        let cli = Cli::try_parse_from(["train", "-v", "simulate", "page.yml", "--format", "json"])
            .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Simulate(args) => {
                assert_eq!(args.scenario, PathBuf::from("page.yml"));
                assert_eq!(args.format, OutputFormat::Json);
            }
            Commands::Catalog(_) => panic!("expected simulate"),
        }
    }
}
