//! Turns a source adapter and a channel identifier into a [`FeedDocument`].
//!
//! The composer owns everything that is the same for every source: fallback
//! to the alternate listing URL, browser session lifetime, cache validation
//! and write-back, per-entry failure isolation and final ordering. Adapters
//! only describe where things are (see [`crate::scrapers`]).
//!
//! # Entry lifecycle
//!
//! For every entry on the listing:
//!
//! 1. If the cache is readable, a stored record that agrees with the listing on
//!    the adapter's [`SourceAdapter::cache_fields`] is used as-is
//! 2. Otherwise the detail page is fetched and the description assembled as
//!    `header + paragraph break + body` (just `body` when there is no header)
//! 3. Settled entries are written back when the cache is writable
//!
//! An entry that fails anywhere in this cycle is logged and left out of the
//! feed. The feed itself only fails when the listing cannot be retrieved or
//! yields no channel title.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument, warn};

use crate::cache::{CacheKey, CacheLookup, CacheMode, CacheStore};
use crate::errors::RssGenError;
use crate::fetch::{BrowserSession, FetchError, FetchOptions, Fetcher};
use crate::models::{ChannelDescriptor, EntryDescriptor, FeedDocument, FeedItem};
use crate::scrapers::{ChannelUrls, Materialization, SourceAdapter};
use crate::utils::truncate_for_log;

/// One browser per request, launched on first use.
struct SharedSession {
    enabled: bool,
    cell: OnceCell<BrowserSession>,
}

impl SharedSession {
    fn new(enabled: bool) -> Self {
        Self {
            enabled,
            cell: OnceCell::new(),
        }
    }

    async fn close(self) {
        if let Some(session) = self.cell.into_inner() {
            session.close().await;
        }
    }
}

pub struct Composer<'a> {
    fetcher: &'a Fetcher,
    cache_root: PathBuf,
    mode: CacheMode,
}

impl<'a> Composer<'a> {
    pub fn new(fetcher: &'a Fetcher, cache_root: impl Into<PathBuf>, mode: CacheMode) -> Self {
        Self {
            fetcher,
            cache_root: cache_root.into(),
            mode,
        }
    }

    /// Build the feed for `target` on `adapter`.
    ///
    /// The returned document has no `self_link`; that belongs to the caller.
    #[instrument(level = "info", skip_all, fields(source = adapter.name(), %target))]
    pub async fn compose(
        &self,
        adapter: &dyn SourceAdapter,
        target: &str,
    ) -> Result<FeedDocument, RssGenError> {
        adapter
            .validate_target(target)
            .map_err(|reason| RssGenError::SourceRejectedTarget {
                source_name: adapter.name().to_string(),
                target: target.to_string(),
                reason,
            })?;

        let session = SharedSession::new(adapter.shares_session());
        let result = self.compose_with(adapter, target, Utc::now(), &session).await;
        session.close().await;
        result
    }

    async fn compose_with(
        &self,
        adapter: &dyn SourceAdapter,
        target: &str,
        now: DateTime<Utc>,
        session: &SharedSession,
    ) -> Result<FeedDocument, RssGenError> {
        let (listing_url, html) = self
            .fetch_listing(adapter, adapter.channel_urls(target), session)
            .await?;

        let listing = adapter.parse_listing(&html, now);
        if listing.title.trim().is_empty() {
            warn!(url = %listing_url, page = %truncate_for_log(&html, 200), "Listing yielded no channel title");
            return Err(RssGenError::EmptyResult(adapter.name().to_string()));
        }

        let description = match listing.description {
            Some(description) => description,
            None => self.fetch_about(adapter, &listing_url, session).await,
        };

        let channel = ChannelDescriptor {
            title: listing.title,
            link: listing_url,
            description,
            language: adapter.language().to_string(),
        };
        info!(title = %channel.title, entries = listing.entries.len(), "Channel resolved");

        let cache = CacheStore::for_source(&self.cache_root, adapter.name());
        let items = match adapter.materialization() {
            Materialization::Sequential => {
                let mut items = Vec::with_capacity(listing.entries.len());
                for entry in &listing.entries {
                    if let Some(item) = self.materialize(adapter, &cache, entry, session).await {
                        items.push(item);
                    }
                }
                items
            }
            Materialization::Concurrent => join_all(
                listing
                    .entries
                    .iter()
                    .map(|entry| self.materialize(adapter, &cache, entry, session)),
            )
            .await
            .into_iter()
            .flatten()
            .collect(),
        };

        let mut document = FeedDocument {
            channel,
            items,
            self_link: None,
        };
        document.sort_items();
        info!(
            items = document.items.len(),
            dropped = listing.entries.len() - document.items.len(),
            "Feed composed"
        );
        Ok(document)
    }

    /// Fetch the listing, retrying the alternate URL once on "not found".
    async fn fetch_listing(
        &self,
        adapter: &dyn SourceAdapter,
        urls: ChannelUrls,
        session: &SharedSession,
    ) -> Result<(String, String), RssGenError> {
        let options = adapter.listing_fetch();
        let primary = match self.fetch(&urls.listing, &options, session).await {
            Ok(html) => return Ok((urls.listing, html)),
            Err(e) => e,
        };

        let Some(alternate) = urls.alternate.filter(|_| primary.is_not_found()) else {
            warn!(url = %urls.listing, status = ?primary.status(), error = %primary, "Listing unavailable");
            return Err(RssGenError::SourceUnavailable {
                url: urls.listing,
                source: primary,
            });
        };

        info!(from = %urls.listing, to = %alternate, "Listing not found; trying alternate address");
        match self.fetch(&alternate, &options, session).await {
            Ok(html) => Ok((alternate, html)),
            Err(source) => {
                warn!(url = %alternate, error = %source, "Alternate listing unavailable");
                Err(RssGenError::SourceUnavailable {
                    url: alternate,
                    source,
                })
            }
        }
    }

    /// The channel description from the adapter's about page, or empty.
    async fn fetch_about(
        &self,
        adapter: &dyn SourceAdapter,
        listing_url: &str,
        session: &SharedSession,
    ) -> String {
        let Some(url) = adapter.about_url(listing_url) else {
            return String::new();
        };
        match self.fetch(&url, &adapter.listing_fetch(), session).await {
            Ok(html) => adapter.parse_about(&html).unwrap_or_default(),
            Err(e) => {
                warn!(%url, error = %e, "About page unavailable; leaving description empty");
                String::new()
            }
        }
    }

    /// Materialize one entry; failures are logged and yield `None`.
    async fn materialize(
        &self,
        adapter: &dyn SourceAdapter,
        cache: &CacheStore,
        entry: &EntryDescriptor,
        session: &SharedSession,
    ) -> Option<FeedItem> {
        match self.try_materialize(adapter, cache, entry, session).await {
            Ok(item) => Some(item),
            Err(e) => {
                warn!(link = %entry.link, error = %e, "Dropping entry");
                None
            }
        }
    }

    async fn try_materialize(
        &self,
        adapter: &dyn SourceAdapter,
        cache: &CacheStore,
        entry: &EntryDescriptor,
        session: &SharedSession,
    ) -> Result<FeedItem, FetchError> {
        let key = CacheKey::from_url(&entry.link);
        if key.is_none() {
            debug!(link = %entry.link, "No cache key for entry");
        }
        let candidate = entry.candidate_item();

        if let Some(key) = key.as_ref().filter(|_| self.mode.reads()) {
            if let CacheLookup::Hit(item) = cache.lookup(key, &candidate, adapter.cache_fields()).await {
                return Ok(item);
            }
        }

        let html = self.fetch(&entry.link, &adapter.detail_fetch(), session).await?;
        let body = adapter.parse_detail(&html);
        let description = match entry.description_header() {
            Some(header) => format!("{header}{}{body}", adapter.paragraph_break()),
            None => body,
        };
        let item = FeedItem {
            description,
            ..candidate
        };

        let writable = self.mode.writes() && entry.is_settled();
        if let Some(key) = key.as_ref().filter(|_| writable) {
            if let Err(e) = self.persist(cache, key, &item).await {
                warn!(link = %entry.link, error = %e, "Serving item uncached");
            }
        }
        Ok(item)
    }

    async fn persist(
        &self,
        cache: &CacheStore,
        key: &CacheKey,
        item: &FeedItem,
    ) -> Result<(), RssGenError> {
        cache.store(key, item).await?;
        Ok(())
    }

    async fn fetch(
        &self,
        url: &str,
        options: &FetchOptions,
        session: &SharedSession,
    ) -> Result<String, FetchError> {
        let shared = match options.strategy.session_flavor() {
            Some(flavor) if session.enabled => {
                let shared = session
                    .cell
                    .get_or_try_init(|| self.fetcher.launch_session(flavor))
                    .await?;
                if shared.flavor() != flavor {
                    warn!(%url, session = ?shared.flavor(), requested = ?flavor, "Reusing a browser launched for another strategy");
                }
                Some(shared)
            }
            _ => None,
        };
        self.fetcher.fetch(url, options, shared).await
    }
}
