//! Output generation for RSS feeds.
//!
//! # Submodules
//!
//! - [`rss`]: Serializes a [`FeedDocument`](crate::models::FeedDocument) to RSS 2.0 markup
//! - [`pretty`]: Re-indents already serialized markup, one tag pair per line
//!
//! [`render`] chains both and is what the HTTP surface serves.

pub mod pretty;
pub mod rss;

use crate::errors::RssGenError;
use crate::models::FeedDocument;

/// Serialize `doc` and pretty-print the result.
pub fn render(doc: &FeedDocument) -> Result<String, RssGenError> {
    Ok(pretty::format_xml(&rss::to_xml(doc)?))
}
