//! Flat, file-per-item cache of materialized feed items.
//!
//! Each source gets its own directory under the cache root. Every cached item
//! lives in one file whose name is derived from the item's URL (see
//! [`CacheKey::from_url`]) and whose entire content is the JSON-encoded
//! [`FeedItem`]. There is no index, metadata file or expiry: a record stays
//! valid as long as the fields the source validates on still match what the
//! listing page shows.
//!
//! # Mode gating
//!
//! [`CacheStore`] never checks the [`CacheMode`]. The composer asks
//! [`CacheMode::reads`] / [`CacheMode::writes`] before calling
//! [`CacheStore::lookup`] / [`CacheStore::store`].
//!
//! # Failure semantics
//!
//! - Missing, unreadable or malformed records are misses, never errors.
//! - Failing to create the directory or write a record is a [`CacheError`]
//!   for that one item; callers decide how far it propagates.

use clap::ValueEnum;
use rand::{Rng, rng};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tracing::{debug, instrument, warn};

use crate::models::FeedItem;

/// Tri-state policy deciding whether the cache is consulted and written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum CacheMode {
    /// Never look up, never write.
    #[default]
    #[value(alias = "off")]
    Disabled,
    /// Look up, never write.
    #[value(name = "readonly", alias = "read-only")]
    ReadOnly,
    /// Look up and write.
    #[value(name = "readwrite", alias = "read-write")]
    ReadWrite,
}

impl CacheMode {
    pub fn reads(self) -> bool {
        !matches!(self, CacheMode::Disabled)
    }

    pub fn writes(self) -> bool {
        matches!(self, CacheMode::ReadWrite)
    }
}

/// A field compared between a listing candidate and a stored record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheField {
    Title,
    Link,
    PubDate,
}

impl CacheField {
    fn matches(self, candidate: &FeedItem, stored: &FeedItem) -> bool {
        match self {
            CacheField::Title => candidate.title == stored.title,
            CacheField::Link => candidate.link == stored.link,
            CacheField::PubDate => candidate.pub_date == stored.pub_date,
        }
    }
}

/// File name of a cache record, derived from the item's URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Strip colons and slashes from `url`.
    ///
    /// The transform is pure, so the same URL always lands on the same file.
    /// Returns `None` when nothing usable as a file name is left.
    pub fn from_url(url: &str) -> Option<Self> {
        let name = url.replace([':', '/'], "");
        match name.as_str() {
            "" | "." | ".." => None,
            _ => Some(CacheKey(name)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Why a lookup did not produce a usable record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissReason {
    /// No record on disk.
    Absent,
    /// A record exists but a validated field differs.
    Mismatch,
    /// The record could not be read.
    Unreadable,
    /// The record is not a valid item.
    Corrupt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    Hit(FeedItem),
    Miss(MissReason),
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not encode cache record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One source's cache directory.
#[derive(Debug, Clone)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The cache directory for `source` under `root`.
    pub fn for_source(root: &Path, source: &str) -> Self {
        Self::new(root.join(source))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.as_str())
    }

    /// Look up `key` and validate it against `candidate`.
    ///
    /// Only a record whose `fields` all equal the candidate's counts as a hit.
    #[instrument(level = "debug", skip_all, fields(key = %key.as_str()))]
    pub async fn lookup(
        &self,
        key: &CacheKey,
        candidate: &FeedItem,
        fields: &[CacheField],
    ) -> CacheLookup {
        let path = self.path_for(key);
        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Cache item not found");
                return CacheLookup::Miss(MissReason::Absent);
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cache item unreadable; treating as miss");
                return CacheLookup::Miss(MissReason::Unreadable);
            }
        };

        let stored: FeedItem = match serde_json::from_str(&raw) {
            Ok(item) => item,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cache item malformed; treating as miss");
                return CacheLookup::Miss(MissReason::Corrupt);
            }
        };

        if fields.iter().all(|f| f.matches(candidate, &stored)) {
            debug!("Cache hit");
            CacheLookup::Hit(stored)
        } else {
            debug!("Cache item found but mismatched");
            CacheLookup::Miss(MissReason::Mismatch)
        }
    }

    /// Overwrite the record for `key` with `item`.
    ///
    /// Creates the cache directory when absent. The record is written to a
    /// temporary file and renamed into place, so readers never see a partial
    /// record.
    #[instrument(level = "debug", skip_all, fields(key = %key.as_str()))]
    pub async fn store(&self, key: &CacheKey, item: &FeedItem) -> Result<(), CacheError> {
        let json = serde_json::to_string(item)?;

        fs::create_dir_all(&self.dir).await.map_err(|source| CacheError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let path = self.path_for(key);
        let tmp = self
            .dir
            .join(format!(".{}.{:08x}.tmp", key.as_str(), rng().random::<u32>()));

        if let Err(source) = fs::write(&tmp, json).await {
            return Err(CacheError::Io { path: tmp, source });
        }
        if let Err(source) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(CacheError::Io { path, source });
        }

        debug!(path = %path.display(), "Cache item written");
        Ok(())
    }
}
