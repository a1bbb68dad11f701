//! Source adapters: per-site knowledge of where channel data lives.
//!
//! Every supported site implements [`SourceAdapter`]. An adapter only knows
//! URLs, fetch strategies and CSS selectors. Fetching, caching, concurrency
//! and ordering all belong to the composer, which drives every adapter the
//! same way:
//!
//! 1. **Listing**: fetch [`ChannelUrls::listing`] (or the alternate on 404)
//!    and extract a [`ChannelListing`] with [`SourceAdapter::parse_listing`]
//! 2. **About** (optional): fetch [`SourceAdapter::about_url`] for the
//!    channel description when the listing has none
//! 3. **Detail**: fetch each entry's page and extract its description with
//!    [`SourceAdapter::parse_detail`]
//!
//! # Supported Sources
//!
//! | Source | Module | Retrieval | Notes |
//! |--------|--------|-----------|-------|
//! | Rumble | [`rumble`] | plain HTTP | absolute dates, live/upcoming markers, legacy `/user/` fallback |
//! | Banned.Video | [`banned_video`] | stealth browser | relative dates, one shared browser per request |

pub mod banned_video;
pub mod rumble;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Selector};

use crate::cache::CacheField;
use crate::fetch::FetchOptions;
use crate::models::EntryDescriptor;
use crate::utils::collapse_whitespace;

static CHANNEL_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.\-]+$").expect("channel name pattern is valid"));

/// Where a channel's listing can be found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelUrls {
    pub listing: String,
    /// Tried once when the listing answers "not found".
    pub alternate: Option<String>,
}

/// Everything a listing page yields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelListing {
    pub title: String,
    /// `None` when the description lives on a separate page.
    pub description: Option<String>,
    /// In discovery order.
    pub entries: Vec<EntryDescriptor>,
}

/// How the composer resolves a channel's entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Materialization {
    /// One entry's fetch-and-cache cycle completes before the next starts.
    Sequential,
    /// All entries are launched together and awaited as a batch.
    Concurrent,
}

/// Site-specific extraction rules for one source.
pub trait SourceAdapter: Send + Sync {
    /// The path segment that selects this source, e.g. `rumble`.
    fn name(&self) -> &'static str;

    fn language(&self) -> &'static str {
        "en-us"
    }

    /// Reject identifiers that can never name a channel, before any fetch.
    fn validate_target(&self, target: &str) -> Result<(), String> {
        validate_channel_name(target)
    }

    fn channel_urls(&self, target: &str) -> ChannelUrls;

    /// A page holding the channel description, relative to the resolved listing URL.
    fn about_url(&self, _listing_url: &str) -> Option<String> {
        None
    }

    fn listing_fetch(&self) -> FetchOptions;

    fn detail_fetch(&self) -> FetchOptions;

    /// Whether one browser session should serve every rendered fetch of a request.
    fn shares_session(&self) -> bool {
        false
    }

    fn materialization(&self) -> Materialization;

    /// Fields a cached item must share with the listing to be reused.
    fn cache_fields(&self) -> &'static [CacheField];

    /// Separator between the status header and the description body.
    fn paragraph_break(&self) -> &'static str {
        "\n\n"
    }

    /// Extract channel metadata and entries. `now` anchors relative dates.
    fn parse_listing(&self, html: &str, now: DateTime<Utc>) -> ChannelListing;

    fn parse_about(&self, _html: &str) -> Option<String> {
        None
    }

    /// Extract an entry's description body from its detail page.
    fn parse_detail(&self, html: &str) -> String;
}

pub struct SourceRegistry {
    sources: Vec<Box<dyn SourceAdapter>>,
}

impl SourceRegistry {
    /// A registry with every built-in source.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(rumble::RumbleSource::new()));
        registry.register(Box::new(banned_video::BannedVideoSource::new()));
        registry
    }

    pub fn empty() -> Self {
        Self {
            sources: Vec::new(),
        }
    }

    pub fn register(&mut self, source: Box<dyn SourceAdapter>) {
        self.sources.push(source);
    }

    pub fn find(&self, name: &str) -> Option<&dyn SourceAdapter> {
        self.sources
            .iter()
            .find(|s| s.name() == name)
            .map(|s| s.as_ref())
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.sources.iter().map(|s| s.name()).collect()
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Accept a single path segment made of URL-safe channel characters.
pub fn validate_channel_name(target: &str) -> Result<(), String> {
    if target.is_empty() {
        return Err("empty channel name".to_string());
    }
    if target == "." || target == ".." {
        return Err("not a channel name".to_string());
    }
    if !CHANNEL_NAME.is_match(target) {
        return Err(format!("unexpected characters in {target:?}"));
    }
    Ok(())
}

/// Whitespace-collapsed text of the first match of `selector` under `root`.
pub(crate) fn select_text(root: ElementRef<'_>, selector: &Selector) -> Option<String> {
    root.select(selector)
        .next()
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
}

/// Attribute `attr` of the first match of `selector` under `root`.
pub(crate) fn select_attr(root: ElementRef<'_>, selector: &Selector, attr: &str) -> Option<String> {
    root.select(selector)
        .next()
        .and_then(|el| el.value().attr(attr))
        .map(|v| v.trim().to_string())
}
