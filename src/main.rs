//! Site-Mirror main entry point
//!
//! This is the command-line interface for building, localizing, reporting
//! on and serving offline website mirrors.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use site_mirror::config::{compute_config_hash, parse_config, Config};
use site_mirror::localize::localize_mirror;
use site_mirror::output::report_from_storage;
use site_mirror::pipeline::{plan_mirror, run_mirror, MirrorOptions};
use site_mirror::server::{serve, DEFAULT_PREFIX};
use site_mirror::storage::open_storage;
use site_mirror::{Category, HostScope};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Site-Mirror: offline copies of public websites
///
/// Discovers a site's URLs from robots.txt, sitemaps and links, downloads
/// pages with their sub-resources, rewrites internal links and serves the
/// result from disk.
#[derive(Parser, Debug)]
#[command(name = "site-mirror")]
#[command(version)]
#[command(about = "Builds and serves offline website mirrors", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Discover, crawl and download a site into the mirror tree
    Mirror(MirrorArgs),

    /// Rewrite internal links of a mirror tree in place
    Localize(LocalizeArgs),

    /// Re-derive the report of the latest run from the ledger
    Report(ReportArgs),

    /// Serve a mirror tree over HTTP
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
struct MirrorArgs {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Entry URL of the site (overrides [mirror] start-url)
    #[arg(long)]
    start_url: Option<String>,

    /// Mirror root directory (overrides [output] output-dir)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Directory for ledger, artifacts and report (overrides [output] work-dir)
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Ignore what earlier runs stored in the ledger
    #[arg(long)]
    fresh: bool,

    /// Rewrite internal links once the download finishes
    #[arg(long)]
    localize: bool,

    /// Run discovery only and print what would be crawled
    #[arg(long, conflicts_with_all = ["fresh", "localize"])]
    dry_run: bool,
}

#[derive(Args, Debug)]
struct LocalizeArgs {
    /// Mirror root directory
    #[arg(long)]
    mirror_dir: PathBuf,

    /// Host whose directory the mirror root redirects to
    #[arg(long)]
    primary_host: String,

    /// Additional internal host patterns (exact or "*.suffix")
    #[arg(long = "allow", value_name = "HOST")]
    allow: Vec<String>,
}

#[derive(Args, Debug)]
struct ReportArgs {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Directory holding the ledger (overrides [output] work-dir)
    #[arg(long)]
    work_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Mirror root directory
    #[arg(long)]
    root: PathBuf,

    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    bind: IpAddr,

    /// Port to listen on
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Route prefix the mirror is served under
    #[arg(long, default_value = DEFAULT_PREFIX)]
    prefix: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    match cli.command {
        Command::Mirror(args) => handle_mirror(args).await,
        Command::Localize(args) => handle_localize(args),
        Command::Report(args) => handle_report(args),
        Command::Serve(args) => handle_serve(args).await,
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("site_mirror=info,warn"),
            1 => EnvFilter::new("site_mirror=debug,info"),
            2 => EnvFilter::new("site_mirror=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Loads the optional config file and its hash
fn load_optional_config(path: Option<&PathBuf>) -> anyhow::Result<(Config, String)> {
    match path {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let config = parse_config(path)
                .with_context(|| format!("Failed to load configuration {}", path.display()))?;
            let hash = compute_config_hash(path)?;
            tracing::debug!("Configuration hash: {}", hash);
            Ok((config, hash))
        }
        None => Ok((Config::default(), String::new())),
    }
}

/// Handles the `mirror` subcommand
async fn handle_mirror(args: MirrorArgs) -> anyhow::Result<()> {
    let (mut config, config_hash) = load_optional_config(args.config.as_ref())?;

    if let Some(start_url) = args.start_url {
        config.mirror.start_url = start_url;
    }
    if let Some(output_dir) = args.output_dir {
        config.output.output_dir = output_dir;
    }
    if let Some(work_dir) = args.work_dir {
        config.output.work_dir = work_dir;
    }

    if args.dry_run {
        return handle_dry_run(&config).await;
    }

    let options = MirrorOptions {
        fresh: args.fresh,
        localize: args.localize,
        config_hash,
    };

    let outcome = run_mirror(&config, &options).await.map_err(|e| {
        tracing::error!("Mirror failed: {}", e);
        e
    })?;

    for error in &outcome.discovery_errors {
        tracing::debug!("Discovery: {}", error);
    }
    if let Some(summary) = outcome.localize {
        tracing::info!(
            "Localized {} of {} HTML files",
            summary.files_rewritten,
            summary.files_scanned
        );
    }

    println!("{}", outcome.report.summary_line());
    Ok(())
}

/// Handles `mirror --dry-run`: runs discovery and shows what would be crawled
async fn handle_dry_run(config: &Config) -> anyhow::Result<()> {
    let plan = plan_mirror(config).await?;

    println!("=== Site-Mirror Dry Run ===\n");
    println!("Start URL: {}", plan.start_url);
    println!("Mirror root: {}", config.output.output_dir.display());
    println!("Work directory: {}", config.output.work_dir.display());

    println!("\nSitemaps read ({}):", plan.sitemaps_read.len());
    for sitemap in &plan.sitemaps_read {
        println!("  - {}", sitemap);
    }

    println!("\nSkipped discovery sources ({}):", plan.discovery_errors.len());
    for error in &plan.discovery_errors {
        println!("  - {}", error);
    }

    println!(
        "\nSeeds ({} pages, {} resources):",
        plan.count(Category::Page),
        plan.count(Category::Resource)
    );
    for record in &plan.records {
        println!("  - [{}] {}", record.category, record.url);
    }
    Ok(())
}

/// Handles the `localize` subcommand
fn handle_localize(args: LocalizeArgs) -> anyhow::Result<()> {
    let scope = HostScope::new(args.primary_host, &args.allow);
    let summary = localize_mirror(&args.mirror_dir, &scope)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// Handles the `report` subcommand: prints the report as JSON
fn handle_report(args: ReportArgs) -> anyhow::Result<()> {
    let (mut config, _) = load_optional_config(args.config.as_ref())?;
    if let Some(work_dir) = args.work_dir {
        config.output.work_dir = work_dir;
    }

    let ledger = config.output.ledger_path();
    if !ledger.is_file() {
        anyhow::bail!("No ledger at {}", ledger.display());
    }
    let storage = open_storage(&ledger)?;
    let report = report_from_storage(&storage)?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Handles the `serve` subcommand
async fn handle_serve(args: ServeArgs) -> anyhow::Result<()> {
    if !args.root.is_dir() {
        anyhow::bail!("Mirror root {} is not a directory", args.root.display());
    }
    serve(args.root, SocketAddr::new(args.bind, args.port), &args.prefix).await?;
    Ok(())
}
