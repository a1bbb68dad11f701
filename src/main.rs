//! # rssgen
//!
//! Generates RSS 2.0 feeds for video channels on sites that don't offer one.
//!
//! ## Features
//!
//! - Scrapes channel listings from Rumble and Banned.Video
//! - Retrieves pages with plain HTTP or a headless Chrome, optionally with a
//!   randomized user agent or a full set of anti-detection patches
//! - Caches finished videos on disk, validated against the listing on every
//!   request, so only new or changed entries are fetched again
//! - Serves each feed over HTTP as indented RSS with an `atom:link` self reference
//!
//! ## Usage
//!
//! ```sh
//! rssgen --caching readwrite --port 3000
//! curl http://localhost:3000/rssgen/rumble/DailyShow
//! ```
//!
//! ## Architecture
//!
//! One request flows through a fixed pipeline:
//! 1. **Routing**: `/<prefix>/<source>/<target>` selects a source adapter
//! 2. **Listing**: the adapter's listing page is fetched and parsed
//! 3. **Materializing**: each entry is taken from cache or fetched and parsed
//! 4. **Output**: items are sorted newest first and serialized to RSS

use std::error::Error;
use std::time::Duration;

use clap::Parser;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cache;
mod cli;
mod compose;
mod errors;
mod fetch;
mod models;
mod outputs;
mod scrapers;
mod server;
#[cfg(test)]
mod testing;
mod utils;

use cli::{Cli, Command};
use errors::RssGenError;
use fetch::{FetchOptions, Fetcher, Strategy};
use scrapers::SourceRegistry;
use server::AppState;
use utils::ensure_writable_dir;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Cli::parse();

    // --- Tracing init ---
    let default_level = if args.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "rssgen starting up");
    debug!(?args, "Parsed CLI arguments");

    let fetcher = Fetcher::new(args.fetcher_settings())?;

    match args.command() {
        Command::Serve => serve(&args, fetcher).await,
        Command::Grab {
            url,
            strategy,
            output,
            delay_ms,
        } => {
            let options = grab_options(&strategy, delay_ms)?;
            grab(&fetcher, &url, options, output.as_deref()).await
        }
    }
}

async fn serve(args: &Cli, fetcher: Fetcher) -> Result<(), Box<dyn Error>> {
    let settings = args.settings();

    // A cache that can't be written is reported up front, but requests still work.
    if settings.cache_mode.writes() {
        if let Err(e) = ensure_writable_dir(&settings.cache_root).await {
            error!(
                path = %settings.cache_root.display(),
                error = %e,
                "Cache directory is not writable; items will be served uncached"
            );
        }
    }

    let state = AppState::new(SourceRegistry::new(), fetcher, settings);
    server::serve(args.listen_addr(), state).await
}

fn grab_options(strategy: &str, delay_ms: Option<u64>) -> Result<FetchOptions, RssGenError> {
    let strategy: Strategy = strategy.parse()?;
    let options = FetchOptions::new(strategy);
    Ok(match delay_ms {
        Some(ms) => options.with_delay(Duration::from_millis(ms)),
        None => options,
    })
}

#[instrument(level = "info", skip(fetcher, options))]
async fn grab(
    fetcher: &Fetcher,
    url: &str,
    options: FetchOptions,
    output: Option<&std::path::Path>,
) -> Result<(), Box<dyn Error>> {
    let html = fetcher.fetch(url, &options, None).await?;
    match output {
        Some(path) => {
            tokio::fs::write(path, &html).await?;
            info!(path = %path.display(), bytes = html.len(), "Saved page");
        }
        None => println!("{html}"),
    }
    Ok(())
}
