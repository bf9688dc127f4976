//! Response cache with credential redaction.
//!
//! This module provides:
//! - [`CacheEntry`] - One stored GET response
//! - [`CacheBackend`] - Trait for where entries live
//! - [`MemoryCache`] / [`FileCache`] - In-process and on-disk backends
//! - [`ResponseCache`] - Keying, freshness and redaction around a backend
//!
//! # Redaction
//!
//! [`ResponseCache::store`] rewrites every credential header (see
//! [`HeaderRole`](crate::headers::HeaderRole)) to
//! [`REDACTION_MARKER`](crate::headers::REDACTION_MARKER) before the entry
//! reaches the backend. Backends only ever see redacted entries.
//!
//! # Storage Location
//!
//! [`FileCache::default_dir`] is `<platform cache dir>/offers-sdk/http`, one
//! JSON file per entry named by a UUIDv5 of the cache key.
//!
//! # Growth
//!
//! [`MemoryCache`] is bounded by capacity and expires each entry at its own
//! `expires_at`. [`FileCache`] drops expired and unparseable files whenever a
//! new entry is stored.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use moka::Expiry;
use moka::sync::Cache;
use reqwest::Method;
use reqwest::header::{CACHE_CONTROL, HeaderMap};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use url::Url;
use url::form_urlencoded;
use uuid::Uuid;

use crate::headers::{Headers, Params, is_secret_header, redact};

/// Default freshness window for cached responses.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Default number of entries [`MemoryCache`] holds before evicting.
pub const DEFAULT_CACHE_CAPACITY: u64 = 1000;

/// Error type for cache backends.
#[derive(Debug, Error)]
pub enum CacheError {
    /// I/O error reading or writing a cache file.
    #[error("cache I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error.
    #[error("cache entry is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Cache directory not available on this platform.
    #[error("cache directory not available")]
    CacheDirUnavailable,
}

/// One stored response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub method: String,
    pub url: String,
    pub status: u16,
    pub request_headers: Headers,
    pub response_headers: Headers,
    pub body: Value,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// Time left before the entry goes stale, zero once it has.
    pub fn time_to_live(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Where cache entries live.
///
/// Backends store what they are given. Redaction is done by
/// [`ResponseCache`] before any write.
pub trait CacheBackend: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;

    fn write(&self, entry: &CacheEntry) -> Result<(), CacheError>;

    fn remove(&self, key: &str) -> Result<(), CacheError>;

    /// Every stored entry that can still be read.
    fn entries(&self) -> Result<Vec<CacheEntry>, CacheError>;

    /// Drop entries that went stale at or before `now`.
    fn prune(&self, now: DateTime<Utc>) -> Result<(), CacheError>;

    /// Remove everything, returning how many entries were dropped.
    fn clear(&self) -> Result<usize, CacheError>;
}

/// Expires each entry at its own `expires_at`.
struct EntryExpiry;

impl Expiry<String, CacheEntry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        entry: &CacheEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(entry.time_to_live(Utc::now()))
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.time_to_live(Utc::now()))
    }
}

/// In-process cache backend, bounded by capacity.
pub struct MemoryCache {
    entries: Cache<String, CacheEntry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    /// A cache holding at most `max_capacity` entries.
    pub fn with_capacity(max_capacity: u64) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(EntryExpiry)
            .build();
        Self { entries }
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("entry_count", &self.entries.entry_count())
            .finish()
    }
}

impl CacheBackend for MemoryCache {
    fn read(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.entries.get(key))
    }

    fn write(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        self.entries.insert(entry.key.clone(), entry.clone());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.entries.invalidate(key);
        Ok(())
    }

    fn entries(&self) -> Result<Vec<CacheEntry>, CacheError> {
        Ok(self.entries.iter().map(|(_, entry)| entry).collect())
    }

    fn prune(&self, _now: DateTime<Utc>) -> Result<(), CacheError> {
        self.entries.run_pending_tasks();
        Ok(())
    }

    fn clear(&self) -> Result<usize, CacheError> {
        let count = self.entries.iter().count();
        self.entries.invalidate_all();
        self.entries.run_pending_tasks();
        Ok(count)
    }
}

/// On-disk cache backend: one JSON file per entry.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
}

impl FileCache {
    /// Platform cache directory for HTTP responses.
    pub fn default_dir() -> Result<PathBuf, CacheError> {
        let dirs = directories::ProjectDirs::from("com", "offers-sdk", "offers-sdk")
            .ok_or(CacheError::CacheDirUnavailable)?;
        Ok(dirs.cache_dir().join("http"))
    }

    /// Open (creating if needed) a cache rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| CacheError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let name = Uuid::new_v5(&Uuid::NAMESPACE_URL, key.as_bytes());
        self.dir.join(format!("{}.json", name))
    }

    fn read_file(path: &Path) -> Result<CacheEntry, CacheError> {
        let contents = fs::read_to_string(path).map_err(|source| CacheError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn remove_file(path: PathBuf) -> Result<(), CacheError> {
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CacheError::Io { path, source }),
        }
    }

    /// Every `*.json` file in the cache directory.
    fn json_files(&self) -> Result<Vec<PathBuf>, CacheError> {
        let read_dir = fs::read_dir(&self.dir).map_err(|source| CacheError::Io {
            path: self.dir.clone(),
            source,
        })?;

        let mut files = Vec::new();
        for item in read_dir {
            let path = item
                .map_err(|source| CacheError::Io {
                    path: self.dir.clone(),
                    source,
                })?
                .path();
            if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        Ok(files)
    }
}

impl CacheBackend for FileCache {
    fn read(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        Self::read_file(&path).map(Some)
    }

    fn write(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        let path = self.path_for(&entry.key);
        let contents = serde_json::to_string_pretty(entry)?;
        fs::write(&path, contents).map_err(|source| CacheError::Io { path, source })
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        Self::remove_file(self.path_for(key))
    }

    fn entries(&self) -> Result<Vec<CacheEntry>, CacheError> {
        let mut entries = Vec::new();
        for path in self.json_files()? {
            match Self::read_file(&path) {
                Ok(entry) => entries.push(entry),
                Err(e) => tracing::warn!(path = ?path, error = %e, "Skipping unreadable cache file"),
            }
        }
        Ok(entries)
    }

    fn prune(&self, now: DateTime<Utc>) -> Result<(), CacheError> {
        let mut removed = 0usize;
        for path in self.json_files()? {
            let stale = match Self::read_file(&path) {
                Ok(entry) => !entry.is_fresh_at(now),
                Err(CacheError::Json(_)) => true,
                Err(_) => false,
            };
            if stale {
                Self::remove_file(path)?;
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::debug!(removed, dir = ?self.dir, "Pruned stale cache files");
        }
        Ok(())
    }

    /// Deletes files by path without parsing them.
    fn clear(&self) -> Result<usize, CacheError> {
        let files = self.json_files()?;
        let count = files.len();
        for path in files {
            Self::remove_file(path)?;
        }
        Ok(count)
    }
}

/// Response cache: keying, freshness and redaction over a [`CacheBackend`].
///
/// Backend failures never fail a request. They are logged and the request
/// proceeds as a cache miss.
pub struct ResponseCache {
    backend: Box<dyn CacheBackend>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(backend: Box<dyn CacheBackend>, ttl: Duration) -> Self {
        Self { backend, ttl }
    }

    /// An in-process cache with the given TTL.
    pub fn in_memory(ttl: Duration) -> Self {
        Self::new(Box::new(MemoryCache::new()), ttl)
    }

    /// Default freshness window.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cache key for a request.
    ///
    /// Method, URL without query, then every query pair sorted by name. No
    /// header takes part, and a query parameter named like a credential
    /// header is left out, so rotating tokens never splits the cache.
    pub fn key(method: &Method, url: &Url, params: &Params) -> String {
        let mut base = url.clone();
        base.set_query(None);
        base.set_fragment(None);

        let mut pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .chain(params.iter().map(|(k, v)| (k.clone(), v.clone())))
            .filter(|(name, _)| !is_secret_header(name))
            .collect();
        pairs.sort();

        let query = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(&pairs)
            .finish();

        format!("{} {}?{}", method, base, query)
    }

    /// A fresh entry for `key`, if any. Stale entries are evicted.
    pub fn lookup(&self, key: &str) -> Option<CacheEntry> {
        match self.backend.read(key) {
            Ok(Some(entry)) if entry.is_fresh_at(Utc::now()) => Some(entry),
            Ok(Some(_)) => {
                tracing::debug!(key = %key, "Evicting stale cache entry");
                if let Err(e) = self.backend.remove(key) {
                    tracing::warn!(key = %key, error = %e, "Failed to evict stale cache entry");
                }
                None
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    /// Redact credentials from `entry`, then persist it.
    ///
    /// Stale entries under other keys are pruned on the way.
    pub fn store(&self, mut entry: CacheEntry) {
        entry.request_headers = redact(&entry.request_headers);
        entry.response_headers = redact(&entry.response_headers);

        if let Err(e) = self.backend.prune(Utc::now()) {
            tracing::warn!(error = %e, "Cache prune failed");
        }
        if let Err(e) = self.backend.write(&entry) {
            tracing::warn!(key = %entry.key, error = %e, "Cache write failed");
        }
    }

    /// Every persisted entry, as stored.
    pub fn entries(&self) -> Result<Vec<CacheEntry>, CacheError> {
        self.backend.entries()
    }

    /// Remove every entry, returning how many were dropped.
    pub fn clear(&self) -> Result<usize, CacheError> {
        self.backend.clear()
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

/// Freshness window for a response, honoring `Cache-Control`.
///
/// Returns `None` when the response must not be stored: `no-store`,
/// `no-cache`, or `max-age=0`. `max-age=N` replaces `default_ttl`.
pub fn freshness(headers: &HeaderMap, default_ttl: Duration) -> Option<Duration> {
    let mut ttl = default_ttl;

    for value in headers.get_all(CACHE_CONTROL) {
        let Ok(value) = value.to_str() else { continue };
        for directive in value.split(',').map(|d| d.trim().to_ascii_lowercase()) {
            if directive == "no-store" || directive == "no-cache" {
                return None;
            }
            if let Some(seconds) = directive.strip_prefix("max-age=") {
                if let Ok(seconds) = seconds.trim_matches('"').parse::<u64>() {
                    ttl = Duration::from_secs(seconds);
                }
            }
        }
    }

    (!ttl.is_zero()).then_some(ttl)
}
