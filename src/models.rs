//! Data models for scraped channels and the feeds built from them.
//!
//! This module defines the core data structures used throughout the application:
//! - [`ChannelDescriptor`]: Channel-level metadata scraped once per request
//! - [`EntryDescriptor`]: A lightweight reference to one video, taken from a listing page
//! - [`EntryStatus`]: Whether a video is finished, live, upcoming or still processing
//! - [`FeedItem`]: A fully materialized feed entry, and the unit stored in the cache
//! - [`FeedDocument`]: The channel plus its ordered items, ready for serialization
//!
//! `FeedItem` keeps the `pubDate` field name on the wire so cache records stay
//! readable next to the RSS they end up in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Channel-level metadata for one feed.
///
/// Produced once per request by the composer from what a source adapter
/// extracted, and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChannelDescriptor {
    /// The channel's display name.
    pub title: String,
    /// The listing URL the channel was resolved from.
    pub link: String,
    /// Free-text channel description (may be empty).
    pub description: String,
    /// Language tag, e.g. `en-us`.
    pub language: String,
}

/// Lifecycle state of a video as shown on a listing page.
///
/// Anything other than [`EntryStatus::Archived`] may still change upstream
/// and must never be written to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Archived,
    Live,
    Upcoming,
    Processing,
}

/// One entry discovered on a channel listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDescriptor {
    /// Absolute URL of the video's detail page.
    pub link: String,
    /// The video title as shown on the listing.
    pub title: String,
    /// When the video was published.
    pub published_at: DateTime<Utc>,
    /// Human-readable duration, e.g. `1:02:03`.
    pub duration: Option<String>,
    /// Sources without a live concept leave this empty.
    pub status: Option<EntryStatus>,
}

impl EntryDescriptor {
    /// True when content behind this entry is final and may be cached.
    pub fn is_settled(&self) -> bool {
        matches!(self.status, None | Some(EntryStatus::Archived))
    }

    /// The item as far as the listing page knows it, without a description.
    ///
    /// Used as the candidate when validating a cached record.
    pub fn candidate_item(&self) -> FeedItem {
        FeedItem {
            title: self.title.clone(),
            link: self.link.clone(),
            pub_date: self.published_at,
            description: String::new(),
        }
    }

    /// The header line shown above an item's description.
    ///
    /// Returns `None` for settled entries whose listing carried no duration.
    pub fn description_header(&self) -> Option<String> {
        match self.status {
            Some(EntryStatus::Upcoming) => Some("Upcoming".to_string()),
            Some(EntryStatus::Live) => Some("Live".to_string()),
            Some(EntryStatus::Processing) => Some("Processing / DVR".to_string()),
            Some(EntryStatus::Archived) | None => self
                .duration
                .as_deref()
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(|d| format!("Duration: {d}")),
        }
    }
}

/// A fully materialized feed entry.
///
/// This is also the exact content of a cache record: one JSON object per file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FeedItem {
    pub title: String,
    pub link: String,
    #[serde(rename = "pubDate")]
    pub pub_date: DateTime<Utc>,
    pub description: String,
}

/// A channel and its items, ready to be serialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedDocument {
    pub channel: ChannelDescriptor,
    /// Sorted newest first by [`FeedDocument::sort_items`].
    pub items: Vec<FeedItem>,
    /// Absolute URL this feed is served from, used for the `atom:link` element.
    pub self_link: Option<String>,
}

impl FeedDocument {
    /// Sort items by publication date, newest first.
    ///
    /// The sort is stable, so items with equal dates keep discovery order.
    pub fn sort_items(&mut self) {
        self.items.sort_by(|a, b| b.pub_date.cmp(&a.pub_date));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(status: Option<EntryStatus>, duration: Option<&str>) -> EntryDescriptor {
        EntryDescriptor {
            link: "https://example.com/v1".to_string(),
            title: "Episode 1".to_string(),
            published_at: Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap(),
            duration: duration.map(str::to_string),
            status,
        }
    }

    fn item(title: &str, day: u32) -> FeedItem {
        FeedItem {
            title: title.to_string(),
            link: format!("https://example.com/{title}"),
            pub_date: Utc.with_ymd_and_hms(2024, 3, day, 8, 0, 0).unwrap(),
            description: String::new(),
        }
    }

    #[test]
    fn test_settled_statuses() {
        assert!(entry(None, None).is_settled());
        assert!(entry(Some(EntryStatus::Archived), None).is_settled());
        assert!(!entry(Some(EntryStatus::Live), None).is_settled());
        assert!(!entry(Some(EntryStatus::Upcoming), None).is_settled());
        assert!(!entry(Some(EntryStatus::Processing), None).is_settled());
    }

    #[test]
    fn test_description_header_by_status() {
        assert_eq!(
            entry(Some(EntryStatus::Archived), Some("12:34")).description_header(),
            Some("Duration: 12:34".to_string())
        );
        assert_eq!(
            entry(None, Some(" 1:02:03 ")).description_header(),
            Some("Duration: 1:02:03".to_string())
        );
        assert_eq!(entry(None, None).description_header(), None);
        assert_eq!(
            entry(Some(EntryStatus::Live), Some("12:34")).description_header(),
            Some("Live".to_string())
        );
        assert_eq!(
            entry(Some(EntryStatus::Upcoming), None).description_header(),
            Some("Upcoming".to_string())
        );
        assert_eq!(
            entry(Some(EntryStatus::Processing), None).description_header(),
            Some("Processing / DVR".to_string())
        );
    }

    #[test]
    fn test_feed_item_json_uses_pub_date_key() {
        let json = serde_json::to_string(&item("a", 1)).unwrap();
        assert!(json.contains("\"pubDate\":\"2024-03-01T08:00:00Z\""));
    }

    #[test]
    fn test_feed_item_round_trip() {
        let original = FeedItem {
            description: "Duration: 3:00<br><br><p>Hello &amp; bye</p>".to_string(),
            ..item("round-trip", 4)
        };
        let json = serde_json::to_string(&original).unwrap();
        let parsed: FeedItem = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_sort_items_newest_first_and_stable() {
        let mut doc = FeedDocument {
            channel: ChannelDescriptor {
                title: "c".to_string(),
                link: "https://example.com".to_string(),
                description: String::new(),
                language: "en-us".to_string(),
            },
            items: vec![item("old", 1), item("tie-a", 3), item("new", 9), item("tie-b", 3)],
            self_link: None,
        };
        doc.sort_items();
        let titles: Vec<_> = doc.items.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["new", "tie-a", "tie-b", "old"]);
        assert!(doc.items.windows(2).all(|w| w[0].pub_date >= w[1].pub_date));
    }
}
