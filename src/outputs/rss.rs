//! RSS 2.0 serialization.
//!
//! Produces compact markup; indentation is added afterwards by
//! [`super::pretty`]. Element order is fixed:
//!
//! ```text
//! <rss version="2.0" xmlns:atom="http://www.w3.org/2005/Atom">
//!   <channel>
//!     title, link, description, language, atom:link
//!     <item> title, link, pubDate, guid, description </item> ...
//!   </channel>
//! </rss>
//! ```

use std::error::Error;

use chrono::{DateTime, Utc};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use tracing::{debug, instrument};

use crate::errors::RssGenError;
use crate::models::{ChannelDescriptor, FeedDocument, FeedItem};

pub const ATOM_NS: &str = "http://www.w3.org/2005/Atom";

const RFC822_UTC: &str = "%a, %d %b %Y %H:%M:%S GMT";

type XmlWriter = Writer<Vec<u8>>;
type WriteResult = Result<(), Box<dyn Error>>;

/// Format a timestamp as `Tue, 02 Jan 2024 03:04:05 GMT`, always in UTC.
pub fn rfc822_date(date: &DateTime<Utc>) -> String {
    date.format(RFC822_UTC).to_string()
}

/// Serialize `doc` to compact RSS 2.0 markup, including the XML declaration.
#[instrument(level = "debug", skip_all, fields(items = doc.items.len()))]
pub fn to_xml(doc: &FeedDocument) -> Result<String, RssGenError> {
    let mut writer = Writer::new(Vec::new());
    write_document(&mut writer, doc)
        .map_err(|e| RssGenError::Unknown(format!("feed serialization failed: {e}")))?;
    let xml = String::from_utf8(writer.into_inner())
        .map_err(|e| RssGenError::Unknown(format!("feed is not UTF-8: {e}")))?;
    debug!(bytes = xml.len(), "Serialized feed");
    Ok(xml)
}

fn write_document(w: &mut XmlWriter, doc: &FeedDocument) -> WriteResult {
    w.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut rss = BytesStart::new("rss");
    rss.push_attribute(("version", "2.0"));
    rss.push_attribute(("xmlns:atom", ATOM_NS));
    w.write_event(Event::Start(rss))?;
    w.write_event(Event::Start(BytesStart::new("channel")))?;

    write_channel(w, &doc.channel, doc.self_link.as_deref())?;
    for item in &doc.items {
        write_item(w, item)?;
    }

    w.write_event(Event::End(BytesEnd::new("channel")))?;
    w.write_event(Event::End(BytesEnd::new("rss")))?;
    Ok(())
}

fn write_channel(w: &mut XmlWriter, channel: &ChannelDescriptor, self_link: Option<&str>) -> WriteResult {
    text_element(w, "title", &channel.title)?;
    text_element(w, "link", &channel.link)?;
    text_element(w, "description", &channel.description)?;
    text_element(w, "language", &channel.language)?;

    let mut atom = BytesStart::new("atom:link");
    if let Some(href) = self_link {
        atom.push_attribute(("href", href));
    }
    atom.push_attribute(("rel", "self"));
    atom.push_attribute(("type", "application/rss+xml"));
    w.write_event(Event::Empty(atom))?;
    Ok(())
}

fn write_item(w: &mut XmlWriter, item: &FeedItem) -> WriteResult {
    w.write_event(Event::Start(BytesStart::new("item")))?;
    text_element(w, "title", &item.title)?;
    text_element(w, "link", &item.link)?;
    text_element(w, "pubDate", &rfc822_date(&item.pub_date))?;
    text_element(w, "guid", &item.link)?;
    text_element(w, "description", &item.description)?;
    w.write_event(Event::End(BytesEnd::new("item")))?;
    Ok(())
}

fn text_element(w: &mut XmlWriter, name: &str, text: &str) -> WriteResult {
    w.write_event(Event::Start(BytesStart::new(name)))?;
    w.write_event(Event::Text(BytesText::new(text)))?;
    w.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}
