//! Utility functions for text cleanup, relative ages, and file system checks.
//!
//! This module provides helper functions used throughout the application:
//! - Whitespace collapsing for text scraped out of markup
//! - Relative age parsing ("2 days ago") for listings without absolute dates
//! - String truncation for logging
//! - File system validation for the cache directory

use chrono::Duration;
use once_cell::sync::Lazy;
use regex::Regex;
use std::error::Error;
use std::fs as stdfs;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

static RELATIVE_AGE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d+|an?)\s+(second|minute|hour|day|week|month|year)s?\b")
        .expect("relative age pattern is valid")
});

/// Collapse every run of whitespace into a single space and trim the ends.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(collapse_whitespace("  a \n\t b "), "a b");
/// ```
pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse a relative age such as `"2 days ago"` or `"an hour ago"`.
///
/// Months count as 30 days and years as 365 days.
///
/// # Returns
///
/// The age as a [`Duration`], or `None` when no number/unit pair is found or
/// the amount does not fit in a [`Duration`].
pub fn parse_relative_age(text: &str) -> Option<Duration> {
    let caps = RELATIVE_AGE.captures(text)?;
    let amount = match caps[1].to_ascii_lowercase().as_str() {
        "a" | "an" => 1,
        n => n.parse::<i64>().ok()?,
    };
    match caps[2].to_ascii_lowercase().as_str() {
        "second" => Duration::try_seconds(amount),
        "minute" => Duration::try_minutes(amount),
        "hour" => Duration::try_hours(amount),
        "day" => Duration::try_days(amount),
        "week" => Duration::try_weeks(amount),
        "month" => Duration::try_days(amount.checked_mul(30)?),
        "year" => Duration::try_days(amount.checked_mul(365)?),
        _ => None,
    }
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut to at most `max` bytes (on a character boundary)
/// with an ellipsis and a count of the dropped bytes appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let cut = s
        .char_indices()
        .map(|(i, _)| i)
        .take_while(|&i| i <= max)
        .last()
        .unwrap_or(0);
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if it doesn't exist, then performs a write test by
/// creating and immediately deleting a probe file.
///
/// # Errors
///
/// Returns an error if:
/// - The directory cannot be created
/// - The directory is not writable (permission denied, read-only filesystem, etc.)
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    let probe_path = path.join("..__probe_write__");
    match stdfs::File::create(&probe_path) {
        Ok(_) => {
            let _ = stdfs::remove_file(&probe_path);
            info!("Cache directory is writable");
            Ok(())
        }
        Err(e) => Err(Box::new(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  Hello \n\t  world  "), "Hello world");
        assert_eq!(collapse_whitespace(""), "");
        assert_eq!(collapse_whitespace("one"), "one");
    }

    #[test]
    fn test_parse_relative_age_numbers() {
        assert_eq!(parse_relative_age("2 days ago"), Some(Duration::days(2)));
        assert_eq!(parse_relative_age("15 minutes ago"), Some(Duration::minutes(15)));
        assert_eq!(parse_relative_age("1 second ago"), Some(Duration::seconds(1)));
        assert_eq!(parse_relative_age("3 weeks ago"), Some(Duration::weeks(3)));
    }

    #[test]
    fn test_parse_relative_age_articles() {
        assert_eq!(parse_relative_age("an hour ago"), Some(Duration::hours(1)));
        assert_eq!(parse_relative_age("a year ago"), Some(Duration::days(365)));
        assert_eq!(parse_relative_age("A month ago"), Some(Duration::days(30)));
    }

    #[test]
    fn test_parse_relative_age_rejects_noise() {
        assert_eq!(parse_relative_age(""), None);
        assert_eq!(parse_relative_age("yesterday"), None);
        assert_eq!(parse_relative_age("12 views"), None);
    }

    #[test]
    fn test_parse_relative_age_out_of_range() {
        assert_eq!(parse_relative_age("99999999999999 days ago"), None);
        assert_eq!(parse_relative_age("99999999999999999999 seconds ago"), None);
        assert_eq!(parse_relative_age("9999999999999999 weeks ago"), None);
        assert_eq!(parse_relative_age("999999999999999999 years ago"), None);
    }

    #[test]
    fn test_truncate_for_log_short_string() {
        assert_eq!(truncate_for_log("Hello, world!", 100), "Hello, world!");
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 bytes)"));
    }

    #[test]
    fn test_truncate_for_log_respects_char_boundaries() {
        let s = "ééééé";
        let result = truncate_for_log(s, 3);
        assert!(result.starts_with('é'));
        assert!(result.contains("(+8 bytes)"));
    }

    #[tokio::test]
    async fn test_ensure_writable_dir_creates_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a").join("b");
        ensure_writable_dir(&nested).await.unwrap();
        assert!(nested.is_dir());
        assert!(!nested.join("..__probe_write__").exists());
    }
}
