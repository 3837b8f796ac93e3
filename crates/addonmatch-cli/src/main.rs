//! addonmatch - match installed add-on folders against remote catalogs
//!
//! Usage:
//!   addonmatch scan <DIR>         # Print folder fingerprints
//!   addonmatch reconcile <DIR>    # Match folders and propose add-ons
//!   addonmatch search <QUERY>     # Search a catalog
//!   addonmatch providers          # List providers and breaker state
//!   addonmatch config path|show   # Inspect the configuration

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use console::style;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use addonmatch_core::config::{ConfigStore, to_toml};
use addonmatch_core::prelude::*;
use addonmatch_core::provider::registry::DirectoryReport;

#[derive(Parser)]
#[command(name = "addonmatch")]
#[command(about = "Match installed add-ons against remote catalogs", long_about = None)]
struct Cli {
    /// Path to addonmatch.toml (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fingerprint every add-on folder without contacting any catalog
    Scan {
        /// Add-ons directory (e.g. Interface/AddOns)
        dir: PathBuf,

        /// Fingerprint scheme (murmur2, blake3)
        #[arg(long, default_value = "murmur2")]
        scheme: String,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Match every add-on folder against the enabled providers
    Reconcile {
        /// Add-ons directory (e.g. Interface/AddOns)
        dir: PathBuf,

        /// Game flavor (retail, classic, burning-crusade, wrath)
        #[arg(long)]
        flavor: Option<String>,

        /// Preferred release channel (stable, beta, alpha)
        #[arg(long)]
        channel: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Search a provider's catalog
    Search {
        query: String,

        /// Provider to search (defaults to the first enabled one)
        #[arg(long)]
        provider: Option<String>,

        /// Game flavor (retail, classic, burning-crusade, wrath)
        #[arg(long)]
        flavor: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// List configured providers
    Providers {
        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Inspect the configuration
    Config {
        #[command(subcommand)]
        command: ConfigSubcommand,
    },
}

#[derive(Subcommand)]
enum ConfigSubcommand {
    /// Print the config file location
    Path,
    /// Print the effective configuration
    Show,
}

#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "addonmatch=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let store = match cli.config {
        Some(path) => ConfigStore::from_path(path),
        None => ConfigStore::from_default_location()?,
    };

    tracing::debug!(path = %store.config_path().display(), "using config");

    run_command(&store, cli.command).await
}

async fn run_command(store: &ConfigStore, command: Commands) -> Result<()> {
    match command {
        Commands::Scan {
            dir,
            scheme,
            format,
        } => {
            let ctx = AppContext::load(store)?;
            run_scan(&ctx, dir, &scheme, format).await
        }
        Commands::Reconcile {
            dir,
            flavor,
            channel,
            format,
        } => {
            let ctx = AppContext::load(store)?;
            let options = resolve_options(&ctx, flavor.as_deref(), channel.as_deref())?;
            run_reconcile(&ctx, dir, options, format).await
        }
        Commands::Search {
            query,
            provider,
            flavor,
            format,
        } => {
            let ctx = AppContext::load(store)?;
            let options = resolve_options(&ctx, flavor.as_deref(), None)?;
            run_search(&ctx, &query, provider.as_deref(), options, format).await
        }
        Commands::Providers { format } => {
            let ctx = AppContext::load(store)?;
            run_providers(&ctx, format)
        }
        Commands::Config { command } => run_config(store, command),
    }
}

fn resolve_options(
    ctx: &AppContext,
    flavor: Option<&str>,
    channel: Option<&str>,
) -> Result<ReconcileOptions> {
    let mut options = ctx.default_options();
    if let Some(flavor) = flavor {
        options.flavor = flavor.parse()?;
    }
    if let Some(channel) = channel {
        options.channel = channel.parse()?;
    }
    Ok(options)
}

async fn run_scan(ctx: &AppContext, dir: PathBuf, scheme: &str, format: OutputFormat) -> Result<()> {
    let scheme: FingerprintScheme = scheme.parse()?;
    let folders = ctx.scan_directory(&dir, scheme).await?;

    match format {
        OutputFormat::Json => {
            let output: Vec<_> = folders
                .iter()
                .map(|f| {
                    let scan = f.scan(scheme);
                    serde_json::json!({
                        "folder": f.name,
                        "title": f.display_name(),
                        "ignore_reason": f.ignore_reason,
                        "fingerprint": scan.and_then(|s| s.fingerprint.as_ref()),
                        "files": scan.map(|s| s.files.len()).unwrap_or(0),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            if folders.is_empty() {
                println!("No add-on folders found in {}", dir.display());
                return Ok(());
            }
            println!("{:<32} {:<66} {:>6} Note", "Folder", "Fingerprint", "Files");
            println!("{}", "-".repeat(115));
            for folder in &folders {
                let scan = folder.scan(scheme);
                let fingerprint = scan
                    .and_then(|s| s.fingerprint.as_ref())
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "-".to_string());
                let files = scan.map(|s| s.files.len()).unwrap_or(0);
                let note = match (&folder.ignore_reason, &folder.manifest) {
                    (Some(IgnoreReason::GitRepository), _) => "git checkout",
                    (None, None) => "no manifest",
                    _ => "",
                };
                println!("{:<32} {:<66} {:>6} {}", folder.name, fingerprint, files, note);
            }
        }
    }
    Ok(())
}

async fn run_reconcile(
    ctx: &AppContext,
    dir: PathBuf,
    options: ReconcileOptions,
    format: OutputFormat,
) -> Result<()> {
    let (tx, mut rx) = mpsc::channel::<ScanEvent>(32);
    let progress = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            print_progress(&event);
        }
    });

    let result = ctx.reconcile_directory(&dir, &options, Some(&tx)).await;
    drop(tx);
    finish_progress(progress).await;
    let DirectoryReport { folders, report } = result?;

    let proposals = propose_addons(&folders, &report.results);

    match format {
        OutputFormat::Json => {
            let output = serde_json::json!({
                "flavor": options.flavor,
                "channel": options.channel,
                "results": report.results,
                "failures": report.failures,
                "proposals": proposals,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            print_results_table(&report.results);
            println!();
            print_proposals_table(&proposals);
            for failure in &report.failures {
                println!(
                    "  {} provider '{}': {}",
                    style("warning:").yellow().bold(),
                    failure.provider,
                    failure.error
                );
            }
        }
    }
    Ok(())
}

/// Wait for the progress printer. Its failure never affects the report.
async fn finish_progress(progress: tokio::task::JoinHandle<()>) {
    if let Err(e) = progress.await {
        tracing::debug!(error = %e, "progress task ended abnormally");
    }
}

fn print_progress(event: &ScanEvent) {
    match event {
        ScanEvent::Started { folders, providers } => {
            eprintln!(
                "{} {folders} folders against {providers} providers",
                style("Matching").bold().cyan()
            );
        }
        ScanEvent::ProviderStarted { provider, folders } => {
            eprintln!("  {}: {folders} folders", style(provider).bold());
        }
        ScanEvent::ProviderSkipped { provider } => {
            eprintln!("  {}: {}", style(provider).bold(), style("skipped (circuit open)").yellow());
        }
        ScanEvent::ProviderFailed { provider, error } => {
            eprintln!("  {}: {} {error}", style(provider).bold(), style("failed:").red());
        }
        ScanEvent::ProviderFinished { provider, matched } => {
            eprintln!("  {}: {} matched", style(provider).bold(), style(matched).green());
        }
        ScanEvent::Completed { matched, unmatched } => {
            eprintln!(
                "{} {} matched, {unmatched} unmatched",
                style("Done:").bold().cyan(),
                style(matched).green()
            );
        }
    }
}

fn print_results_table(results: &[MatchResult]) {
    println!(
        "{:<32} {:<10} {:<14} {:<20} {:<20} Channel",
        "Folder", "Match", "Provider", "Installed", "Latest"
    );
    println!("{}", "-".repeat(110));
    for result in results {
        println!(
            "{:<32} {:<10} {:<14} {:<20} {:<20} {}",
            result.folder_name,
            result.kind.as_str(),
            result.provider.as_deref().unwrap_or("-"),
            result
                .matched_release
                .as_ref()
                .map(|r| r.version.as_str())
                .unwrap_or("-"),
            result.latest_version().unwrap_or("-"),
            result
                .effective_channel
                .map(|c| c.to_string())
                .unwrap_or_else(|| "-".to_string()),
        );
    }
}

fn print_proposals_table(proposals: &[ProposedAddon]) {
    if proposals.is_empty() {
        println!("No add-ons proposed.");
        return;
    }
    println!("{:<30} {:<14} {:<10} {:<20} Folders", "Add-on", "Provider", "Id", "Latest");
    println!("{}", "-".repeat(100));
    for p in proposals {
        println!(
            "{:<30} {:<14} {:<10} {:<20} {}",
            p.name,
            p.provider,
            p.external_id,
            p.latest_version.as_deref().unwrap_or("-"),
            p.installed_folders.join(", ")
        );
    }
}

async fn run_search(
    ctx: &AppContext,
    query: &str,
    provider: Option<&str>,
    options: ReconcileOptions,
    format: OutputFormat,
) -> Result<()> {
    let provider = match provider {
        Some(name) => ctx
            .registry()
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("Unknown provider: {name}"))?,
        None => ctx
            .registry()
            .enabled()
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("No providers are enabled"))?,
    };

    let entries = provider.search_by_query(query, &options).await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
        OutputFormat::Table => {
            if entries.is_empty() {
                println!("No results from '{}'", provider.name());
                return Ok(());
            }
            println!("{:<10} {:<32} {:<24} {:>12} Latest", "Id", "Name", "Authors", "Downloads");
            println!("{}", "-".repeat(100));
            for entry in &entries {
                let latest = select_release(entry, options.channel)
                    .map(|s| s.release.version)
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{:<10} {:<32} {:<24} {:>12} {}",
                    entry.id,
                    entry.name,
                    entry.author_line(),
                    entry.download_count,
                    latest
                );
            }
        }
    }
    Ok(())
}

fn run_providers(ctx: &AppContext, format: OutputFormat) -> Result<()> {
    let registry = ctx.registry();
    match format {
        OutputFormat::Json => {
            let output: Vec<_> = registry
                .all()
                .iter()
                .map(|p| {
                    serde_json::json!({
                        "name": p.name(),
                        "enabled": registry.is_enabled(p.name()),
                        "scheme": p.fingerprint_scheme(),
                        "capabilities": p.capabilities(),
                        "circuit": p.circuit_state().map(|s| s.to_string()),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            if registry.is_empty() {
                println!("No providers configured.");
                println!("Add a [[provider]] entry to {}", ctx.config_path().display());
                return Ok(());
            }
            println!(
                "{:<16} {:<8} {:<12} {:<10} Capabilities",
                "Name", "Enabled", "Matching", "Circuit"
            );
            println!("{}", "-".repeat(80));
            for provider in registry.all() {
                let caps = provider.capabilities();
                let mut flags = Vec::new();
                if caps.supports_batch_fetch {
                    flags.push("batch");
                }
                if caps.requires_advertisement {
                    flags.push("ads");
                }
                if caps.allow_reinstall {
                    flags.push("reinstall");
                }
                if caps.allow_channel_change {
                    flags.push("channel-change");
                }
                let matching = provider
                    .fingerprint_scheme()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "manifest".to_string());
                println!(
                    "{:<16} {:<8} {:<12} {:<10} {}",
                    provider.name(),
                    if registry.is_enabled(provider.name()) { "yes" } else { "no" },
                    matching,
                    provider
                        .circuit_state()
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    flags.join(", ")
                );
            }
        }
    }
    Ok(())
}

fn run_config(store: &ConfigStore, command: ConfigSubcommand) -> Result<()> {
    match command {
        ConfigSubcommand::Path => println!("{}", store.config_path().display()),
        ConfigSubcommand::Show => {
            let config = store.load()?;
            print!("{}", to_toml(&config)?);
        }
    }
    Ok(())
}
