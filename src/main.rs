use clap::Parser;
use futures::StreamExt;
use rust_gallery_scraper::config::Config;
use rust_gallery_scraper::crawler::{CrawlOutcome, Crawler};
use rust_gallery_scraper::page_context::PageContext;
use rust_gallery_scraper::registry::AdapterRegistry;
use rust_gallery_scraper::{Error, Result};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "rust-gallery-scraper")]
#[command(about = "Crawl a gallery page and print every chapter, page and image as JSON lines")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ./config.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Stop after this many chapters
    #[arg(long)]
    max_chapters: Option<usize>,

    /// Report in-page image URLs without resolving origins
    #[arg(long)]
    no_origin: bool,

    /// Use this adapter instead of picking one from the URL
    #[arg(long)]
    adapter: Option<String>,

    /// Print the registered adapters and exit
    #[arg(long)]
    list_adapters: bool,

    /// Gallery page to crawl
    #[arg(required_unless_present = "list_adapters")]
    url: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let registry = AdapterRegistry::with_builtin_adapters()?;

    if cli.list_adapters {
        for setup in registry.names().into_iter().filter_map(|name| registry.find(name)) {
            let patterns: Vec<&str> = setup.work_urls.iter().map(|re| re.as_str()).collect();
            println!("{}\t{}", setup.name, patterns.join(" "));
        }
        return Ok(());
    }

    let url = cli
        .url
        .ok_or_else(|| Error::Precondition("no gallery URL given".to_string()))?;

    let mut cfg = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load(),
    };
    if cli.max_chapters.is_some() {
        cfg.crawl.max_chapters = cli.max_chapters;
    }
    if cli.no_origin {
        cfg.crawl.resolve_origin = false;
    }

    let client = Arc::new(cfg.http.create_http_client()?);
    log::info!("HTTP client initialized:");
    log::info!("  Max retries: {}", cfg.http.max_retries);
    log::info!("  Timeout: {}s", cfg.http.timeout_secs);

    let ctx = PageContext::load(&url, client).await?;

    let (name, matcher) = match &cli.adapter {
        Some(forced) => {
            let setup = registry
                .find(forced)
                .ok_or_else(|| Error::Precondition(format!("unknown adapter {}", forced)))?;
            if !setup.is_match(&url) {
                log::warn!("Adapter {} is not meant for {}", setup.name, url);
            }
            (setup.name, (setup.constructor)(ctx))
        }
        None => registry
            .activate(ctx)
            .ok_or_else(|| Error::Precondition(format!("no adapter handles {}", url)))?,
    };

    let crawler = Crawler::new(name, matcher, cfg.crawl.clone());
    log::info!("Crawling {} with adapter {}", url, crawler.adapter());
    let mut outcome = CrawlOutcome::default();
    let mut events = crawler.events();
    let stdout = std::io::stdout();

    while let Some(event) = events.next().await {
        outcome.observe(&event);
        match serde_json::to_string(&event) {
            Ok(line) => {
                let mut out = stdout.lock();
                if writeln!(out, "{}", line).is_err() {
                    // downstream closed the pipe
                    break;
                }
            }
            Err(e) => log::error!("Could not serialize event: {}", e),
        }
    }
    drop(events);

    crawler.metrics().log_summary();
    match outcome.fatal_error() {
        Some(error) => Err(Error::Precondition(format!("no chapters listed: {}", error))),
        None => Ok(()),
    }
}
