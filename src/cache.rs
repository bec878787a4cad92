//! File-per-key JSON cache with absolute expiry timestamps.
//!
//! Each entry is a `{"exp": <unix seconds>, "data": <value>}` document stored
//! under the cache root. Entries are invalidated lazily on read and in bulk by
//! [`TtlCache::sweep_expired`]. There is no locking: writes land in a
//! temporary sibling and are renamed into place, and anything unreadable is
//! deleted the next time it is touched.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::Result;

/// Source of the current time in unix seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock(AtomicI64);

impl ManualClock {
    #[must_use]
    pub fn new(start: i64) -> Self {
        Self(AtomicI64::new(start))
    }

    pub fn set(&self, now: i64) {
        self.0.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        let secs = i64::try_from(by.as_secs()).unwrap_or(i64::MAX);
        self.0.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of one sweep over the cache directory.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub scanned: usize,
    pub expired: usize,
    pub corrupt: usize,
}

impl SweepStats {
    #[must_use]
    pub const fn removed(&self) -> usize {
        self.expired + self.corrupt
    }
}

#[derive(Serialize)]
struct EntryRef<'a, T> {
    exp: i64,
    data: &'a T,
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

pub struct TtlCache {
    root: PathBuf,
    default_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl TtlCache {
    pub fn new(root: impl Into<PathBuf>, default_ttl: Duration) -> Self {
        Self::with_clock(root, default_ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(root: impl Into<PathBuf>, default_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            root: root.into(),
            default_ttl,
            clock,
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub const fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// On-disk file name for a logical key.
    #[must_use]
    pub fn file_name(key: &str) -> String {
        format!("{}.json", key.replace(['/', '\\'], "_"))
    }

    fn path(&self, key: &str) -> PathBuf {
        self.root.join(Self::file_name(key))
    }

    /// Look up a live entry.
    ///
    /// Expired entries, and entries that cannot be read back as `T`, are
    /// deleted and reported as a miss.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let path = self.path(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(key, error = %e, "Failed to read cache entry");
                discard(&path).await;
                return None;
            }
        };

        let Some((exp, data)) = decode_entry(&bytes) else {
            warn!(key, "Removing corrupt cache entry");
            discard(&path).await;
            return None;
        };

        if exp <= self.clock.now() {
            debug!(key, exp, "Cache entry expired");
            discard(&path).await;
            return None;
        }

        match serde_json::from_value(data) {
            Ok(value) => {
                debug!(key, "Cache hit");
                Some(value)
            }
            Err(e) => {
                warn!(key, error = %e, "Removing cache entry with unexpected shape");
                discard(&path).await;
                None
            }
        }
    }

    /// Store `value` under `key` for `ttl`, or the default TTL.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ScrapeError::Cache`] if the entry cannot be written.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) -> Result<()> {
        let ttl = i64::try_from(ttl.unwrap_or(self.default_ttl).as_secs()).unwrap_or(i64::MAX);
        let entry = EntryRef {
            exp: self.clock.now().saturating_add(ttl),
            data: value,
        };
        let bytes = serde_json::to_vec(&entry).map_err(std::io::Error::from)?;

        tokio::fs::create_dir_all(&self.root).await?;

        let path = self.path(key);
        let tmp = self.root.join(format!(
            "{}.{}.{}.tmp",
            Self::file_name(key),
            std::process::id(),
            TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        tokio::fs::write(&tmp, &bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        debug!(key, ttl, "Cache entry stored");
        Ok(())
    }

    /// Delete an entry. Returns whether there was one.
    ///
    /// # Errors
    ///
    /// Returns [`crate::ScrapeError::Cache`] if the file exists but cannot be removed.
    pub async fn remove(&self, key: &str) -> Result<bool> {
        match tokio::fs::remove_file(self.path(key)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete every expired or unreadable `.json` entry under the root.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache directory exists but cannot be listed.
    pub async fn sweep_expired(&self) -> std::io::Result<SweepStats> {
        let mut stats = SweepStats::default();
        let mut dir = match tokio::fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(stats),
            Err(e) => return Err(e),
        };

        let now = self.clock.now();
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            stats.scanned += 1;

            match tokio::fs::read(&path).await.ok().as_deref().and_then(decode_entry) {
                None => {
                    stats.corrupt += 1;
                    discard(&path).await;
                }
                Some((exp, _)) if exp <= now => {
                    stats.expired += 1;
                    discard(&path).await;
                }
                Some(_) => {}
            }
        }

        Ok(stats)
    }
}

/// `(exp, data)` of a well-formed entry.
fn decode_entry(bytes: &[u8]) -> Option<(i64, Value)> {
    let mut doc: Value = serde_json::from_slice(bytes).ok()?;
    let exp = doc.get("exp")?.as_i64()?;
    let data = doc.get_mut("data")?.take();
    Some((exp, data))
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Failed to remove cache file");
        }
    }
}

async fn sweep_once(cache: &TtlCache) {
    match cache.sweep_expired().await {
        Ok(stats) => {
            if stats.removed() > 0 {
                info!(
                    scanned = stats.scanned,
                    expired = stats.expired,
                    corrupt = stats.corrupt,
                    "Swept cache"
                );
            }
        }
        Err(e) => {
            error!("Failed to sweep cache: {e}");
        }
    }
}

/// Sweep the cache now and then every `interval` until `shutdown` fires.
pub async fn run_sweeper(cache: Arc<TtlCache>, interval: Duration, shutdown: CancellationToken) {
    info!(
        interval_secs = interval.as_secs(),
        root = %cache.root().display(),
        "Starting cache sweeper"
    );

    sweep_once(&cache).await;

    let mut ticker = tokio::time::interval(interval);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                sweep_once(&cache).await;
            }
            () = shutdown.cancelled() => {
                info!("Cache sweeper shutting down");
                break;
            }
        }
    }
}
