//! Rumble channel scraper.
//!
//! Rumble serves fully rendered HTML to plain requests, so both listing and
//! video pages are fetched with a single GET. Listings carry absolute
//! `datetime` attributes, which makes the publication date safe to validate
//! cached items against.
//!
//! # URL Pattern
//!
//! - Listing: `https://rumble.com/c/<channel>`; older channels live under
//!   `https://rumble.com/user/<channel>`, which is tried on 404
//! - About: `<listing>/about`
//! - Videos: relative links such as `/v4abc12-episode-title.html`

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, warn};
use url::Url;

use super::{
    ChannelListing, ChannelUrls, Materialization, SourceAdapter, select_attr, select_text,
};
use crate::cache::CacheField;
use crate::fetch::FetchOptions;
use crate::models::{EntryDescriptor, EntryStatus};
use crate::utils::collapse_whitespace;

const BASE_URL: &str = "https://rumble.com";

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector is valid")
}

static CHANNEL_TITLE: Lazy<Selector> = Lazy::new(|| selector(".channel-header--title-wrapper"));
static ENTRY: Lazy<Selector> = Lazy::new(|| selector(".video-listing-entry"));
static ENTRY_LINK: Lazy<Selector> = Lazy::new(|| selector(".video-item .video-item--a"));
static ENTRY_DURATION: Lazy<Selector> = Lazy::new(|| selector(".video-item--duration"));
static ENTRY_TIME: Lazy<Selector> = Lazy::new(|| selector(".video-item--meta.video-item--time"));
static ENTRY_TITLE: Lazy<Selector> = Lazy::new(|| selector(".video-item--title"));
static ENTRY_LIVE: Lazy<Selector> = Lazy::new(|| selector(".video-item--live"));
static ENTRY_UPCOMING: Lazy<Selector> = Lazy::new(|| selector(".video-item--upcoming"));
static ENTRY_DVR: Lazy<Selector> = Lazy::new(|| selector(".video-item--dvr"));
static ABOUT: Lazy<Selector> = Lazy::new(|| selector(".channel-about--description > p"));
static DESCRIPTION_BOX: Lazy<Selector> =
    Lazy::new(|| selector(".container.content.media-description"));
static DESCRIPTION_FIRST: Lazy<Selector> =
    Lazy::new(|| selector(".media-description.media-description--first"));
static DESCRIPTION_MORE: Lazy<Selector> =
    Lazy::new(|| selector(".media-description.media-description--more"));

const CACHE_FIELDS: &[CacheField] = &[CacheField::Title, CacheField::Link, CacheField::PubDate];

#[derive(Debug, Clone)]
pub struct RumbleSource {
    base: String,
}

impl RumbleSource {
    pub fn new() -> Self {
        Self::with_base(BASE_URL)
    }

    /// Point the source at another host, e.g. a mock server.
    pub fn with_base(base: impl Into<String>) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
        }
    }

    fn parse_entry(&self, base: &Url, entry: ElementRef<'_>) -> Option<EntryDescriptor> {
        let href = select_attr(entry, &ENTRY_LINK, "href")?;
        let link = base.join(&href).ok()?.to_string();

        let Some(title) = select_text(entry, &ENTRY_TITLE).filter(|t| !t.is_empty()) else {
            warn!(%link, "Rumble entry without title; skipping");
            return None;
        };

        let published_at = match select_attr(entry, &ENTRY_TIME, "datetime")
            .as_deref()
            .map(DateTime::parse_from_rfc3339)
        {
            Some(Ok(dt)) => dt.with_timezone(&Utc),
            other => {
                warn!(%link, ?other, "Rumble entry without usable datetime; skipping");
                return None;
            }
        };

        let duration = select_attr(entry, &ENTRY_DURATION, "data-value").filter(|d| !d.is_empty());

        Some(EntryDescriptor {
            link,
            title,
            published_at,
            duration,
            status: Some(entry_status(entry)),
        })
    }
}

impl Default for RumbleSource {
    fn default() -> Self {
        Self::new()
    }
}

fn entry_status(entry: ElementRef<'_>) -> EntryStatus {
    if entry.select(&ENTRY_UPCOMING).next().is_some() {
        EntryStatus::Upcoming
    } else if entry.select(&ENTRY_LIVE).next().is_some() {
        EntryStatus::Live
    } else if entry.select(&ENTRY_DVR).next().is_some() {
        EntryStatus::Processing
    } else {
        EntryStatus::Archived
    }
}

impl SourceAdapter for RumbleSource {
    fn name(&self) -> &'static str {
        "rumble"
    }

    fn channel_urls(&self, target: &str) -> ChannelUrls {
        ChannelUrls {
            listing: format!("{}/c/{}", self.base, target),
            alternate: Some(format!("{}/user/{}", self.base, target)),
        }
    }

    fn about_url(&self, listing_url: &str) -> Option<String> {
        Some(format!("{}/about", listing_url.trim_end_matches('/')))
    }

    fn listing_fetch(&self) -> FetchOptions {
        FetchOptions::plain()
    }

    fn detail_fetch(&self) -> FetchOptions {
        FetchOptions::plain()
    }

    fn materialization(&self) -> Materialization {
        Materialization::Concurrent
    }

    fn cache_fields(&self) -> &'static [CacheField] {
        CACHE_FIELDS
    }

    fn parse_listing(&self, html: &str, _now: DateTime<Utc>) -> ChannelListing {
        let document = Html::parse_document(html);
        let root = document.root_element();
        let title = select_text(root, &CHANNEL_TITLE).unwrap_or_default();

        let entries = match Url::parse(&self.base) {
            Ok(base) => document
                .select(&ENTRY)
                .filter_map(|entry| self.parse_entry(&base, entry))
                .collect::<Vec<_>>(),
            Err(e) => {
                warn!(base = %self.base, error = %e, "Invalid Rumble base URL");
                Vec::new()
            }
        };

        info!(count = entries.len(), %title, "Indexed Rumble entries");
        ChannelListing {
            title,
            description: None,
            entries,
        }
    }

    fn parse_about(&self, html: &str) -> Option<String> {
        let document = Html::parse_document(html);
        let paragraphs = document
            .select(&ABOUT)
            .map(|p| collapse_whitespace(&p.text().collect::<String>()))
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>();
        (!paragraphs.is_empty()).then(|| paragraphs.join("\n\n"))
    }

    fn parse_detail(&self, html: &str) -> String {
        let document = Html::parse_document(html);
        let Some(container) = document.select(&DESCRIPTION_BOX).next() else {
            debug!("Rumble video page without description box");
            return String::new();
        };

        let first = container
            .select(&DESCRIPTION_FIRST)
            .map(|el| el.text().collect::<String>().trim().to_string());
        let more = container
            .select(&DESCRIPTION_MORE)
            .map(|el| el.text().collect::<String>().trim().to_string());

        first
            .chain(more)
            .filter(|p| !p.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}
