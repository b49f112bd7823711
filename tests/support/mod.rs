#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use http::{HeaderMap, HeaderValue, StatusCode, header};
use tempfile::TempDir;
use url::Url;

use tiercache::cache::{BlobStore, CacheConfig, CacheRequest, CachedResponse, FsBlobStore};

mod logging;

pub use logging::LogCapture;

/// Lifetime that always lands an entry on disk under the default thresholds.
pub const DISK_TTL: u64 = 200_000;
/// Lifetime that keeps a small entry in memory only.
pub const MEMORY_TTL: u64 = 60;

pub struct TestDirs {
    _temp: TempDir,
    pub root: PathBuf,
    pub cache_dir: PathBuf,
    pub config_path: PathBuf,
}

impl TestDirs {
    pub fn new() -> Result<Self> {
        let temp = TempDir::new()?;
        let root = temp.path().to_path_buf();
        let cache_dir = root.join("http_cache");
        let config_path = root.join("tiercache.toml");
        Ok(Self {
            _temp: temp,
            root,
            cache_dir,
            config_path,
        })
    }

    /// Writes a settings file whose `cache_dir` is relative to the file itself.
    pub fn write_settings(&self, extra: &str) -> Result<&Path> {
        let body = format!("cache_dir = \"http_cache\"\nlog = \"text\"\n{extra}");
        std::fs::write(&self.config_path, body)?;
        Ok(&self.config_path)
    }
}

pub fn test_config() -> CacheConfig {
    CacheConfig {
        memory_capacity: 64 * 1024,
        disk_capacity: 1024 * 1024,
        maintenance_interval: Duration::from_secs(3600),
        ..CacheConfig::default()
    }
}

pub fn request(path: &str) -> CacheRequest {
    CacheRequest::new(url(path))
}

pub fn url(path: &str) -> Url {
    Url::parse(&format!("https://cdn.example.test{path}")).expect("test url")
}

pub fn response(max_age: u64, body: impl Into<bytes::Bytes>) -> CachedResponse {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_str(&format!("public, max-age={max_age}")).expect("header"),
    );
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.append(header::SET_COOKIE, HeaderValue::from_static("a=1"));
    headers.append(header::SET_COOKIE, HeaderValue::from_static("b=2"));
    CachedResponse::new(StatusCode::OK, headers, body)
}

/// [`FsBlobStore`] with switchable failures and a write counter.
#[derive(Debug)]
pub struct FlakyStore {
    inner: FsBlobStore,
    fail_puts: AtomicBool,
    fail_deletes: AtomicBool,
    puts: AtomicUsize,
}

impl FlakyStore {
    pub async fn open(root: &Path) -> Result<Arc<Self>> {
        Ok(Arc::new(Self {
            inner: FsBlobStore::open(root).await?,
            fail_puts: AtomicBool::new(false),
            fail_deletes: AtomicBool::new(false),
            puts: AtomicUsize::new(0),
        }))
    }

    pub fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn puts(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn disk_dir(&self) -> &Path {
        self.inner.disk_dir()
    }
}

#[async_trait]
impl BlobStore for FlakyStore {
    async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        if self.fail_puts.load(Ordering::SeqCst) {
            bail!("injected put failure for {key}");
        }
        self.inner.put(key, data).await?;
        self.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            bail!("injected delete failure for {key}");
        }
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        self.inner.exists(key).await
    }

    async fn clear(&self) -> Result<()> {
        self.inner.clear().await
    }
}

/// Counts regular files below `dir`.
pub fn count_files(dir: &Path) -> usize {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .filter_map(|entry| entry.ok())
        .map(|entry| {
            let path = entry.path();
            if path.is_dir() {
                count_files(&path)
            } else {
                1
            }
        })
        .sum()
}

/// Path of the persisted disk index inside an [`FsBlobStore`] directory.
pub fn index_record_path(disk_dir: &Path) -> PathBuf {
    let hex = blake3::hash(b"disk-index").to_hex();
    disk_dir.join(&hex[..2]).join(&hex[2..4]).join(hex.as_str())
}

/// Sums the sizes of all regular files below `dir`.
pub fn total_file_bytes(dir: &Path) -> u64 {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return 0;
    };
    entries
        .filter_map(|entry| entry.ok())
        .map(|entry| {
            let path = entry.path();
            if path.is_dir() {
                total_file_bytes(&path)
            } else {
                entry.metadata().map(|meta| meta.len()).unwrap_or(0)
            }
        })
        .sum()
}
