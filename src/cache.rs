/// Size-bounded file cache shared by every image read

use lru::LruCache;
use parking_lot::Mutex;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use sysinfo::System;
use tracing::{debug, trace, warn};

use crate::error::ImcompError;

const MB: u64 = 1024 * 1024;

/// Cache limit, absolute or relative to the machine's memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSize {
    Bytes(u64),
    PercentOfMemory(u8),
}

impl Default for CacheSize {
    fn default() -> Self {
        CacheSize::PercentOfMemory(10)
    }
}

impl CacheSize {
    pub fn megabytes(mb: u64) -> Self {
        CacheSize::Bytes(mb * MB)
    }

    pub fn to_bytes(self) -> u64 {
        match self {
            CacheSize::Bytes(bytes) => bytes,
            CacheSize::PercentOfMemory(percent) => {
                let mut sys = System::new();
                sys.refresh_memory();
                sys.total_memory() / 100 * u64::from(percent)
            }
        }
    }
}

impl FromStr for CacheSize {
    type Err = ImcompError;

    /// `"4096"`, `"512K"`, `"300M"`, `"2G"` or `"10%"`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || ImcompError::CacheSize(s.to_string());

        if let Some(percent) = s.strip_suffix('%') {
            let percent: u8 = percent.trim().parse().map_err(|_| invalid())?;
            if percent == 0 || percent > 100 {
                return Err(invalid());
            }
            return Ok(CacheSize::PercentOfMemory(percent));
        }

        let (digits, unit) = match s.char_indices().find(|(_, c)| !c.is_ascii_digit()) {
            Some((i, _)) => s.split_at(i),
            None => (s, ""),
        };
        let value: u64 = digits.parse().map_err(|_| invalid())?;
        let factor = match unit.trim().to_ascii_uppercase().as_str() {
            "" | "B" => 1,
            "K" | "KB" => 1024,
            "M" | "MB" => MB,
            "G" | "GB" => 1024 * MB,
            _ => return Err(invalid()),
        };
        value.checked_mul(factor).map(CacheSize::Bytes).ok_or_else(invalid)
    }
}

#[derive(Debug)]
struct Inner {
    files: LruCache<PathBuf, Arc<[u8]>>,
    used_bytes: u64,
    max_bytes: u64,
    hits: u64,
    misses: u64,
}

impl Inner {
    fn insert(&mut self, path: PathBuf, data: Arc<[u8]>) {
        let len = data.len() as u64;
        if len > self.max_bytes {
            trace!("{} exceeds the cache size, not retained", path.display());
            return;
        }
        if let Some(previous) = self.files.put(path, data) {
            self.used_bytes -= previous.len() as u64;
        }
        self.used_bytes += len;
    }

    fn enforce_limit(&mut self) -> usize {
        let mut evicted = 0;
        while self.used_bytes > self.max_bytes {
            let Some((_, data)) = self.files.pop_lru() else {
                break;
            };
            self.used_bytes -= data.len() as u64;
            evicted += 1;
        }
        evicted
    }
}

/// Raw file contents kept in memory, least recently used first out.
///
/// All methods take `&self` and may be called from any thread.
#[derive(Debug)]
pub struct FileCache {
    inner: Mutex<Inner>,
    enabled: AtomicBool,
}

impl FileCache {
    pub fn new(size: CacheSize) -> Self {
        let max_bytes = size.to_bytes();
        debug!("file cache: max {:.1}MB", max_bytes as f64 / MB as f64);
        Self {
            inner: Mutex::new(Inner {
                files: LruCache::unbounded(),
                used_bytes: 0,
                max_bytes,
                hits: 0,
                misses: 0,
            }),
            enabled: AtomicBool::new(true),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// When disabled, reads go straight to disk and nothing is retained
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn set_max_cache_size(&self, size: CacheSize) {
        let mut inner = self.inner.lock();
        inner.max_bytes = size.to_bytes();
        inner.enforce_limit();
    }

    /// Prefetch files; unreadable files are skipped
    pub fn add_files<P: AsRef<Path>>(&self, paths: &[P]) -> usize {
        let mut added = 0;
        for path in paths {
            let path = path.as_ref();
            if self.inner.lock().files.contains(path) {
                continue;
            }
            match fs::read(path) {
                Ok(data) => {
                    let mut inner = self.inner.lock();
                    inner.insert(path.to_path_buf(), Arc::from(data));
                    inner.enforce_limit();
                    added += 1;
                }
                Err(e) => warn!("cannot prefetch {}: {}", path.display(), e),
            }
        }
        debug!("prefetched {} of {} files", added, paths.len());
        added
    }

    /// Read through the cache
    pub fn read(&self, path: &Path) -> io::Result<Arc<[u8]>> {
        if !self.is_enabled() {
            return fs::read(path).map(Arc::from);
        }

        {
            let mut inner = self.inner.lock();
            if let Some(data) = inner.files.get(path).cloned() {
                inner.hits += 1;
                return Ok(data);
            }
            inner.misses += 1;
        }

        let data: Arc<[u8]> = Arc::from(fs::read(path)?);
        let mut inner = self.inner.lock();
        inner.insert(path.to_path_buf(), Arc::clone(&data));
        inner.enforce_limit();
        Ok(data)
    }

    /// Drop every cached file
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.files.clear();
        inner.used_bytes = 0;
    }

    /// Evict until usage is within the limit; returns the number of evicted files
    pub fn check_size_limit(&self) -> usize {
        self.inner.lock().enforce_limit()
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            files: inner.files.len(),
            used_bytes: inner.used_bytes,
            max_bytes: inner.max_bytes,
            hits: inner.hits,
            misses: inner.misses,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub files: usize,
    pub used_bytes: u64,
    pub max_bytes: u64,
    pub hits: u64,
    pub misses: u64,
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "File cache: {} files, {:.1}MB/{:.1}MB, {} hits, {} misses",
            self.files,
            self.used_bytes as f64 / MB as f64,
            self.max_bytes as f64 / MB as f64,
            self.hits,
            self.misses
        )
    }
}
