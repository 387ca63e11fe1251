//! Process-wide cache of open, memory-mapped column files.
//!
//! Keyed by `(path, mtime)` rather than just `path` so a rename-over-publish
//! (§4.1/§5) naturally invalidates the cached handle instead of serving a
//! stale mapping — the next lookup observes the new mtime and reopens.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use lru::LruCache;
use tracing::debug;
use wx_column::ColumnFile;
use wx_common::{WxError, WxResult};

type CacheKey = (PathBuf, SystemTime);

/// Hit/miss/eviction counters, mirroring the teacher's chunk cache stats.
#[derive(Debug, Default, Clone, Copy)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

pub struct ColumnFileCache {
    inner: Mutex<LruCache<CacheKey, Arc<ColumnFile>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl ColumnFileCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(LruCache::new(
                NonZeroUsize::new(capacity.max(1)).unwrap(),
            )),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Return the cached handle for `path` if its mtime still matches, else
    /// open (with the bounded rename-race retry) and cache the new handle.
    pub fn get_or_open(&self, path: &Path) -> WxResult<Arc<ColumnFile>> {
        let metadata = std::fs::metadata(path).map_err(|e| WxError::io(path.display().to_string(), e))?;
        let mtime = metadata
            .modified()
            .map_err(|e| WxError::io(path.display().to_string(), e))?;
        let key = (path.to_path_buf(), mtime);

        {
            let mut guard = self.inner.lock().expect("column file cache lock poisoned");
            if let Some(existing) = guard.get(&key) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Arc::clone(existing));
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let opened = Arc::new(ColumnFile::open_retrying(path, 3)?);

        let mut guard = self.inner.lock().expect("column file cache lock poisoned");
        let evicted_before = guard.len();
        guard.put(key, Arc::clone(&opened));
        if guard.len() < evicted_before + 1 {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        debug!(path = %path.display(), "opened and cached column file handle");
        Ok(opened)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}
