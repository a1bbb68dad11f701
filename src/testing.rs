//! A JSON-speaking source adapter for exercising the composer and server
//! against a mock HTTP server.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::cache::CacheField;
use crate::fetch::FetchOptions;
use crate::models::{EntryDescriptor, EntryStatus};
use crate::scrapers::{ChannelListing, ChannelUrls, Materialization, SourceAdapter};

#[derive(Deserialize)]
struct MockListing {
    title: String,
    #[serde(default)]
    description: Option<String>,
    entries: Vec<MockEntry>,
}

#[derive(Deserialize)]
struct MockEntry {
    path: String,
    title: String,
    published: DateTime<Utc>,
    #[serde(default)]
    duration: Option<String>,
    #[serde(default)]
    status: Option<EntryStatus>,
}

/// Listing pages are JSON documents, detail and about pages are plain text.
pub struct MockSource {
    pub base: String,
    pub with_alternate: bool,
    pub with_about: bool,
    pub materialization: Materialization,
    pub fields: &'static [CacheField],
}

impl MockSource {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            with_alternate: true,
            with_about: false,
            materialization: Materialization::Concurrent,
            fields: &[CacheField::Title, CacheField::Link, CacheField::PubDate],
        }
    }
}

impl SourceAdapter for MockSource {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn channel_urls(&self, target: &str) -> ChannelUrls {
        ChannelUrls {
            listing: format!("{}/c/{}", self.base, target),
            alternate: self
                .with_alternate
                .then(|| format!("{}/user/{}", self.base, target)),
        }
    }

    fn about_url(&self, listing_url: &str) -> Option<String> {
        self.with_about.then(|| format!("{listing_url}/about"))
    }

    fn listing_fetch(&self) -> FetchOptions {
        FetchOptions::plain()
    }

    fn detail_fetch(&self) -> FetchOptions {
        FetchOptions::plain()
    }

    fn materialization(&self) -> Materialization {
        self.materialization
    }

    fn cache_fields(&self) -> &'static [CacheField] {
        self.fields
    }

    fn parse_listing(&self, html: &str, _now: DateTime<Utc>) -> ChannelListing {
        let Ok(listing) = serde_json::from_str::<MockListing>(html) else {
            return ChannelListing::default();
        };
        ChannelListing {
            title: listing.title,
            description: listing.description,
            entries: listing
                .entries
                .into_iter()
                .map(|e| EntryDescriptor {
                    link: format!("{}{}", self.base, e.path),
                    title: e.title,
                    published_at: e.published,
                    duration: e.duration,
                    status: e.status,
                })
                .collect(),
        }
    }

    fn parse_about(&self, html: &str) -> Option<String> {
        Some(html.trim().to_string())
    }

    fn parse_detail(&self, html: &str) -> String {
        html.trim().to_string()
    }
}
