//! Casetrack CLI.
//!
//! This binary drives the retrieval engine from the command line: it runs a
//! case-status search, lists the orders attached to a case, or downloads a
//! referenced document, printing results as JSON.
//!
//! Usage examples:
//!   Search (headless, OCR via tesseract):
//!     $ CASETRACK_CHROME_BIN=/usr/bin/chromium CASETRACK_TESSERACT_BIN=tesseract \
//!       cargo run --bin casetrack -- search --case-type "W.P.(C)" \
//!       --case-number 1234 --filing-year 2023
//!   Orders listing:
//!     $ cargo run --bin casetrack -- orders --url https://delhihighcourt.nic.in/app/case-orders/...
//!   Document download:
//!     $ cargo run --bin casetrack -- fetch --url https://delhihighcourt.nic.in/.../order.pdf -o order.pdf

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use casetrack_rs::catalog::FormCatalog;
use casetrack_rs::config::{EngineConfig, Verbosity};
use casetrack_rs::engine::CaseStatusEngine;
use casetrack_rs::runtime::ChromiumFactory;
use casetrack_rs::types::SearchRequest;
use clap::{Args, Parser, Subcommand};
use log::info;

#[derive(Parser)]
#[command(
    name = "casetrack",
    author,
    version,
    about = "Delhi High Court case-status retrieval utilities"
)]
struct Cli {
    /// Increase log verbosity (pass multiple times for DEBUG).
    #[arg(long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a case-status search.
    Search(SearchArgs),
    /// Retrieve the orders listing for a case.
    Orders(OrdersArgs),
    /// Download a document referenced by an order link.
    Fetch(FetchArgs),
    /// Print the case-type and year lists from the form catalog.
    Catalog,
}

#[derive(Args)]
struct SearchArgs {
    /// Case type code, e.g. "W.P.(C)".
    #[arg(long)]
    case_type: String,

    /// Case number without the year.
    #[arg(long)]
    case_number: String,

    /// Filing year, e.g. "2023".
    #[arg(long)]
    filing_year: String,

    /// Show the launched browser window.
    #[arg(long)]
    show_browser: bool,
}

#[derive(Args)]
struct OrdersArgs {
    /// Absolute URL of the orders listing page.
    #[arg(long)]
    url: String,
}

#[derive(Args)]
struct FetchArgs {
    /// Absolute URL of the document.
    #[arg(long)]
    url: String,

    /// Write the document here instead of next to the working directory.
    #[arg(long, short)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_env_logger();

    let cli = Cli::parse();
    let mut config = EngineConfig::from_env().context("failed to load configuration")?;
    config.verbose = verbosity_from_count(cli.verbose);

    match cli.command {
        Command::Search(args) => run_search(config, args).await,
        Command::Orders(args) => run_orders(config, args).await,
        Command::Fetch(args) => run_fetch(config, args).await,
        Command::Catalog => run_catalog(config),
    }
}

async fn run_search(mut config: EngineConfig, args: SearchArgs) -> Result<()> {
    if args.show_browser {
        config.show_browser = true;
        config.headless = false;
    }

    let request = SearchRequest::new(args.case_type, args.case_number, args.filing_year);
    info!("searching for {request}");

    let engine = CaseStatusEngine::new(config, ChromiumFactory::new())
        .context("failed to construct engine")?;
    let outcome = engine.search(&request).await;
    engine.shutdown().await;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

async fn run_orders(config: EngineConfig, args: OrdersArgs) -> Result<()> {
    let engine = CaseStatusEngine::new(config, ChromiumFactory::new())
        .context("failed to construct engine")?;
    let result = engine.orders(&args.url).await;
    engine.shutdown().await;

    let page = result.with_context(|| format!("failed to retrieve orders from {}", args.url))?;
    info!("parsed {} order(s)", page.total_orders);
    println!("{}", serde_json::to_string_pretty(&page)?);
    Ok(())
}

async fn run_fetch(config: EngineConfig, args: FetchArgs) -> Result<()> {
    let engine = CaseStatusEngine::new(config, ChromiumFactory::new())
        .context("failed to construct engine")?;
    let payload = engine
        .fetch_document(&args.url)
        .await
        .with_context(|| format!("failed to fetch {}", args.url))?;

    let target = args
        .output
        .unwrap_or_else(|| PathBuf::from(&payload.filename));
    tokio::fs::write(&target, &payload.content)
        .await
        .with_context(|| format!("failed to write {}", target.display()))?;

    info!(
        "wrote {} ({} bytes, {})",
        target.display(),
        payload.content.len(),
        payload.mime_type
    );
    Ok(())
}

fn run_catalog(config: EngineConfig) -> Result<()> {
    let Some(path) = &config.catalog_path else {
        bail!("CASETRACK_CATALOG must point at a form-structure JSON file");
    };
    let catalog = FormCatalog::from_path(path)
        .with_context(|| format!("failed to load catalog from {}", path.display()))?;

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "caseTypes": catalog
                .case_types()
                .iter()
                .map(|option| serde_json::json!({ "value": option.value, "label": option.label }))
                .collect::<Vec<_>>(),
            "years": catalog
                .years()
                .iter()
                .map(|option| serde_json::json!({ "value": option.value, "label": option.label }))
                .collect::<Vec<_>>(),
        }))?
    );
    Ok(())
}

fn verbosity_from_count(count: u8) -> Verbosity {
    match count {
        0 => Verbosity::Medium,
        _ => Verbosity::Detailed,
    }
}

fn init_env_logger() {
    if env::var("RUST_LOG").is_err() {
        unsafe {
            env::set_var("RUST_LOG", "info");
        }
    }

    let _ = env_logger::Builder::from_env(env_logger::Env::default())
        .format_timestamp_secs()
        .try_init();
}
