//! Banned.Video channel scraper.
//!
//! The site is a client-rendered app behind bot detection, so every page is
//! loaded through the stealth browser. A single browser session serves the
//! listing and all video pages of one request. Videos are visited one at a
//! time.
//!
//! Listings show only relative ages ("3 days ago"). Publication dates are
//! derived from the time of the request and are therefore not stable, so
//! cached items are validated on title and link only.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, warn};
use url::Url;

use super::{ChannelListing, ChannelUrls, Materialization, SourceAdapter, select_text};
use crate::cache::CacheField;
use crate::fetch::{FetchOptions, Strategy};
use crate::models::{EntryDescriptor, EntryStatus};
use crate::utils::{collapse_whitespace, parse_relative_age};

const BASE_URL: &str = "https://banned.video";

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector is valid")
}

static CHANNEL_TITLE: Lazy<Selector> = Lazy::new(|| selector(".css-hpai52"));
static ENTRY: Lazy<Selector> = Lazy::new(|| selector(".css-19uxrib"));
static ENTRY_DURATION: Lazy<Selector> = Lazy::new(|| selector(".css-ptuw1s"));
static ENTRY_TITLE: Lazy<Selector> = Lazy::new(|| selector(".css-1h0cpt4"));
static ENTRY_AGE: Lazy<Selector> = Lazy::new(|| selector(".css-12axsrb"));
static DESCRIPTION: Lazy<Selector> = Lazy::new(|| selector(".css-jgvb17"));

const CACHE_FIELDS: &[CacheField] = &[CacheField::Title, CacheField::Link];

#[derive(Debug, Clone)]
pub struct BannedVideoSource {
    base: String,
}

impl BannedVideoSource {
    pub fn new() -> Self {
        Self::with_base(BASE_URL)
    }

    pub fn with_base(base: impl Into<String>) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
        }
    }

    fn parse_entry(
        &self,
        base: &Url,
        entry: ElementRef<'_>,
        now: DateTime<Utc>,
    ) -> Option<EntryDescriptor> {
        let href = entry
            .children()
            .filter_map(ElementRef::wrap)
            .find(|child| child.value().name() == "a")
            .and_then(|a| a.value().attr("href"))?;
        let link = base.join(href.trim()).ok()?.to_string();

        let title = select_text(entry, &ENTRY_TITLE).unwrap_or_default();
        let age_text = select_text(entry, &ENTRY_AGE).unwrap_or_default();
        let Some(published_at) = parse_relative_age(&age_text)
            .and_then(|age| now.checked_sub_signed(age))
        else {
            warn!(%link, age = %age_text, "Unreadable video age; skipping");
            return None;
        };

        let duration = select_text(entry, &ENTRY_DURATION).filter(|d| !d.is_empty());
        let status = duration
            .as_deref()
            .filter(|d| d.eq_ignore_ascii_case("live"))
            .map(|_| EntryStatus::Live);

        Some(EntryDescriptor {
            link,
            title,
            published_at,
            duration,
            status,
        })
    }
}

impl Default for BannedVideoSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Text of the title's parent block, without the title itself.
fn channel_blurb(title: ElementRef<'_>) -> Option<String> {
    let parent = title.parent().and_then(ElementRef::wrap)?;
    let text = parent
        .descendants()
        .filter(|node| !node.ancestors().any(|a| a.id() == title.id()))
        .filter_map(|node| node.value().as_text().map(|t| t.to_string()))
        .collect::<Vec<_>>()
        .join(" ");
    let text = collapse_whitespace(&text);
    (!text.is_empty()).then_some(text)
}

impl SourceAdapter for BannedVideoSource {
    fn name(&self) -> &'static str {
        "banned-video"
    }

    fn channel_urls(&self, target: &str) -> ChannelUrls {
        ChannelUrls {
            listing: format!("{}/channel/{}", self.base, target),
            alternate: None,
        }
    }

    fn listing_fetch(&self) -> FetchOptions {
        FetchOptions::new(Strategy::Stealth)
    }

    fn detail_fetch(&self) -> FetchOptions {
        FetchOptions::new(Strategy::Stealth)
    }

    fn shares_session(&self) -> bool {
        true
    }

    fn materialization(&self) -> Materialization {
        Materialization::Sequential
    }

    fn cache_fields(&self) -> &'static [CacheField] {
        CACHE_FIELDS
    }

    fn paragraph_break(&self) -> &'static str {
        "<br><br>"
    }

    fn parse_listing(&self, html: &str, now: DateTime<Utc>) -> ChannelListing {
        let document = Html::parse_document(html);
        let title_el = document.select(&CHANNEL_TITLE).next();
        let title = title_el
            .map(|el| collapse_whitespace(&el.text().collect::<String>()))
            .unwrap_or_default();
        let description = Some(title_el.and_then(channel_blurb).unwrap_or_default());

        let entries = match Url::parse(&self.base) {
            Ok(base) => document
                .select(&ENTRY)
                .filter_map(|entry| self.parse_entry(&base, entry, now))
                .collect::<Vec<_>>(),
            Err(e) => {
                warn!(base = %self.base, error = %e, "Invalid Banned.Video base URL");
                Vec::new()
            }
        };

        info!(count = entries.len(), %title, "Indexed Banned.Video entries");
        ChannelListing {
            title,
            description,
            entries,
        }
    }

    fn parse_detail(&self, html: &str) -> String {
        let document = Html::parse_document(html);
        match document.select(&DESCRIPTION).next() {
            Some(el) => el.inner_html().trim().to_string(),
            None => {
                debug!("Banned.Video page without description block");
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    const LISTING: &str = r#"
        <html><body>
          <div class="css-header">
            <h2 class="css-hpai52">The  Channel</h2>
            <span>Breaking news</span> <span>every   day.</span>
          </div>
          <div class="css-19uxrib">
            <a href="/watch?id=abc123">
              <span class="css-ptuw1s">12:34</span>
            </a>
            <div class="css-1h0cpt4">Episode
               one</div>
            <div class="css-12axsrb">3 days ago</div>
          </div>
          <div class="css-19uxrib">
            <a href="/watch?id=live1"><span class="css-ptuw1s">LIVE</span></a>
            <div class="css-1h0cpt4">On air</div>
            <div class="css-12axsrb">an hour ago</div>
          </div>
          <div class="css-19uxrib">
            <a href="/watch?id=odd"><span class="css-ptuw1s">1:00</span></a>
            <div class="css-1h0cpt4">Strange age</div>
            <div class="css-12axsrb">sometime</div>
          </div>
        </body></html>
    "#;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_channel_urls_have_no_fallback() {
        let urls = BannedVideoSource::new().channel_urls("thealexjonesshow");
        assert_eq!(urls.listing, "https://banned.video/channel/thealexjonesshow");
        assert_eq!(urls.alternate, None);
    }

    #[test]
    fn test_parse_listing_channel_metadata() {
        let listing = BannedVideoSource::new().parse_listing(LISTING, now());
        assert_eq!(listing.title, "The Channel");
        assert_eq!(listing.description.as_deref(), Some("Breaking news every day."));
    }

    #[test]
    fn test_parse_listing_entries_and_relative_dates() {
        let listing = BannedVideoSource::new().parse_listing(LISTING, now());
        assert_eq!(listing.entries.len(), 2, "unreadable age is skipped");

        let first = &listing.entries[0];
        assert_eq!(first.link, "https://banned.video/watch?id=abc123");
        assert_eq!(first.title, "Episode one");
        assert_eq!(first.duration.as_deref(), Some("12:34"));
        assert_eq!(first.status, None);
        assert_eq!(first.published_at, now() - Duration::days(3));

        let live = &listing.entries[1];
        assert_eq!(live.status, Some(EntryStatus::Live));
        assert_eq!(live.published_at, now() - Duration::hours(1));
        assert!(!live.is_settled());
    }

    #[test]
    fn test_parse_listing_skips_ages_beyond_the_calendar() {
        let html = r#"
            <h2 class="css-hpai52">Ancient</h2>
            <div class="css-19uxrib">
              <a href="/watch?id=huge"><span class="css-ptuw1s">1:00</span></a>
              <div class="css-1h0cpt4">Too old to count</div>
              <div class="css-12axsrb">99999999999999 days ago</div>
            </div>
            <div class="css-19uxrib">
              <a href="/watch?id=far"><span class="css-ptuw1s">1:00</span></a>
              <div class="css-1h0cpt4">Before year zero</div>
              <div class="css-12axsrb">100000000 days ago</div>
            </div>
            <div class="css-19uxrib">
              <a href="/watch?id=ok"><span class="css-ptuw1s">1:00</span></a>
              <div class="css-1h0cpt4">Recent</div>
              <div class="css-12axsrb">2 days ago</div>
            </div>
        "#;
        let listing = BannedVideoSource::new().parse_listing(html, now());
        assert_eq!(listing.entries.len(), 1);
        assert_eq!(listing.entries[0].link, "https://banned.video/watch?id=ok");
    }

    #[test]
    fn test_parse_listing_without_title() {
        let listing = BannedVideoSource::new().parse_listing("<html><body></body></html>", now());
        assert_eq!(listing.title, "");
        assert!(listing.entries.is_empty());
    }

    #[test]
    fn test_parse_detail_keeps_markup() {
        let html = r#"<div class="css-jgvb17"><p>Show notes</p><a href="https://x.test">link</a></div>"#;
        assert_eq!(
            BannedVideoSource::new().parse_detail(html),
            r#"<p>Show notes</p><a href="https://x.test">link</a>"#
        );
        assert_eq!(BannedVideoSource::new().parse_detail("<div></div>"), "");
    }

    #[test]
    fn test_policy() {
        let source = BannedVideoSource::new();
        assert!(source.shares_session());
        assert_eq!(source.materialization(), Materialization::Sequential);
        assert_eq!(source.cache_fields(), &[CacheField::Title, CacheField::Link]);
        assert_eq!(source.paragraph_break(), "<br><br>");
        assert_eq!(source.listing_fetch().strategy, Strategy::Stealth);
        assert_eq!(source.language(), "en-us");
    }
}
