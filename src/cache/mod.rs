use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::{Error, Result};
use parking_lot::Mutex;
use tokio::sync::{OnceCell, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};
use url::Url;

pub mod config;
mod error;
mod eviction;
mod index;
mod key;
mod maintenance;
mod memory;
mod policy;
mod record;
mod request;
mod store;
#[cfg(test)]
pub(crate) mod testing;
mod tier;
mod worker;

pub use self::config::CacheConfig;
pub use error::{
    CacheErrorKind, ConfigurationError, PersistenceError, StorageError, WorkerStopped,
    classify_cache_error,
};
pub use eviction::EvictionStats;
pub use index::{DiskIndex, EntryMeta, IndexSnapshot};
pub use key::{CacheKey, canonical_url, canonicalize};
pub use policy::{CacheControl, expiration_date, parse_cache_control, parse_http_date};
pub use request::{CacheRequest, CachedResponse, RequestCachePolicy, StoragePolicy};
pub use store::{BlobStore, FsBlobStore};
pub use tier::{RejectReason, TierLimits, TierPlan, plan_tier};

use crate::logging::{CacheEvent, log_cache_event};
use error::log_cache_error;
use maintenance::spawn_maintenance;
use memory::MemoryTier;
use record::{StoredResponse, decode_record, encode_record};
use worker::{DiskJob, DiskQueue, spawn_disk_worker};

#[cfg(feature = "fuzzing")]
pub mod fuzzing {
    use std::time::SystemTime;

    use anyhow::Result;

    use super::record::{decode_record, encode_record};

    /// Decodes a disk record and, when it parses, decodes its re-encoding.
    pub fn decode_disk_record(data: &[u8]) -> Result<SystemTime> {
        let stored = decode_record(data)?;
        let again = decode_record(&encode_record(&stored)?)?;
        Ok(again.expires_at)
    }
}

/// Blob key holding the persisted [`IndexSnapshot`]. Cache keys always carry the
/// version tag prefix, so this cannot collide with an entry.
const INDEX_RECORD_KEY: &str = "disk-index";

/// Where a `put` ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Memory,
    Disk,
    Rejected(RejectReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub disk_entries: usize,
    pub disk_usage: u64,
    pub disk_capacity: u64,
    pub memory_usage: u64,
    pub memory_capacity: u64,
}

/// Two-tier response cache: a byte-bounded LRU in memory in front of a capacity-bounded
/// disk tier stored through a [`BlobStore`].
///
/// Clones share the same cache. Disk writes, removals and index persistence run on a
/// single background worker; the disk index is loaded once, when the cache is opened.
#[derive(Clone)]
pub struct HttpCache {
    inner: Arc<CacheInner>,
}

struct CacheInner {
    state: Arc<CacheState>,
    queue: DiskQueue,
    scheduler: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for CacheInner {
    fn drop(&mut self) {
        if let Some(scheduler) = self.scheduler.get_mut().take() {
            scheduler.abort();
        }
    }
}

#[derive(Debug)]
struct CacheState {
    config: CacheConfig,
    store: Arc<dyn BlobStore>,
    index: OnceCell<Mutex<DiskIndex>>,
    memory: Mutex<MemoryTier>,
}

impl HttpCache {
    pub async fn open(config: CacheConfig, store: Arc<dyn BlobStore>) -> Result<Self> {
        config.validate()?;
        let interval = config.maintenance_interval;
        let state = Arc::new(CacheState::new(config, store));
        let (entries, usage) = {
            let index = state.index().await.lock();
            (index.len(), index.usage())
        };
        crate::metrics::set_disk_usage(usage);
        info!(entries, usage, "disk index ready");

        let (queue, jobs) = DiskQueue::channel();
        spawn_disk_worker(state.clone(), jobs);
        let scheduler = spawn_maintenance(state.clone(), queue.clone(), interval);

        Ok(Self {
            inner: Arc::new(CacheInner {
                state,
                queue,
                scheduler: Mutex::new(Some(scheduler)),
            }),
        })
    }

    /// Opens a cache over an [`FsBlobStore`] rooted at `root`.
    pub async fn open_dir(config: CacheConfig, root: impl Into<PathBuf>) -> Result<Self> {
        let store = FsBlobStore::open(root).await?;
        Self::open(config, Arc::new(store)).await
    }

    pub fn config(&self) -> &CacheConfig {
        &self.state().config
    }

    fn state(&self) -> &CacheState {
        &self.inner.state
    }

    pub async fn get(&self, request: &CacheRequest) -> Option<CachedResponse> {
        if request.bypasses_cache() {
            crate::metrics::record_cache_lookup("none", "bypass");
            return None;
        }
        let key = CacheKey::for_request(request);
        let now = SystemTime::now();
        let state = self.state();

        let memory_hit = state.memory.lock().get(key.as_str(), now);
        if let Some(stored) = memory_hit {
            self.record_lookup(&key, "memory", "hit");
            return Some(stored.response);
        }

        let seq = state.index().await.lock().get(key.as_str()).map(|meta| meta.seq);
        let Some(seq) = seq else {
            self.record_lookup(&key, "none", "miss");
            return None;
        };

        let data = match state.store.get(key.as_str()).await {
            Ok(Some(data)) => data,
            Ok(None) => {
                debug!(key = %key, "indexed blob is missing");
                self.discard_disk_entry(&key, seq);
                self.record_lookup(&key, "disk", "missing");
                return None;
            }
            Err(err) => {
                log_cache_error("disk read", &StorageError::new("read", key.as_str(), err).into());
                self.record_lookup(&key, "disk", "error");
                return None;
            }
        };
        let stored = match decode_record(&data) {
            Ok(stored) => stored,
            Err(err) => {
                warn!(key = %key, error = %err, "discarding undecodable cache record");
                self.discard_disk_entry(&key, seq);
                self.record_lookup(&key, "disk", "corrupt");
                return None;
            }
        };
        if stored.is_expired(now) {
            trace!(key = %key, "disk entry expired");
            self.discard_disk_entry(&key, seq);
            self.record_lookup(&key, "disk", "expired");
            return None;
        }

        state.index().await.lock().touch(key.as_str(), now);
        let size = data.len() as u64;
        if state.config.fits_memory(size) {
            self.insert_memory(key.as_str(), stored.clone(), size);
        }
        self.record_lookup(&key, "disk", "hit");
        Some(stored.response)
    }

    pub async fn put(&self, request: &CacheRequest, response: CachedResponse) -> StoreOutcome {
        let key = CacheKey::for_request(request);
        if request.bypasses_cache() {
            return self.rejected(&key, RejectReason::Bypassed);
        }
        let now = SystemTime::now();
        let Some(expires_at) = expiration_date(response.status, &response.headers, now) else {
            return self.rejected(&key, RejectReason::NotCacheable);
        };

        let storage = response.storage_policy;
        let stored = StoredResponse {
            response,
            expires_at,
        };
        let data = match encode_record(&stored) {
            Ok(data) => data,
            Err(err) => {
                warn!(key = %key, error = %err, "failed to encode cache record");
                return self.rejected(&key, RejectReason::NotCacheable);
            }
        };
        let size = data.len() as u64;

        match plan_tier(
            size,
            Some(expires_at),
            now,
            storage,
            &self.state().config.tier_limits(),
        ) {
            TierPlan::Reject(reason) => self.rejected(&key, reason),
            TierPlan::MemoryOnly => {
                self.insert_memory(key.as_str(), stored, size);
                let on_disk = self.state().index().await.lock().contains(key.as_str());
                if on_disk && let Err(err) = self.remove_from_disk(key.as_str()).await {
                    log_cache_error("stale disk copy", &err);
                }
                self.stored(&key, StoreOutcome::Memory, size)
            }
            TierPlan::Disk => {
                self.remove_memory(key.as_str());
                let job_key = key.as_str().to_string();
                let written = self
                    .inner
                    .queue
                    .call(|done| DiskJob::Store {
                        key: job_key,
                        data,
                        done,
                    })
                    .await;
                match written {
                    Ok(()) => self.stored(&key, StoreOutcome::Disk, size),
                    Err(err) => {
                        log_cache_error("disk store", &err);
                        crate::metrics::record_cache_store_failure();
                        if self.state().config.fits_memory(size) {
                            self.insert_memory(key.as_str(), stored, size);
                            self.stored(&key, StoreOutcome::Memory, size)
                        } else {
                            self.rejected(&key, RejectReason::StorageFailed)
                        }
                    }
                }
            }
        }
    }

    /// Drops the entry from both tiers.
    pub async fn remove(&self, request: &CacheRequest) -> Result<()> {
        let key = CacheKey::for_request(request);
        self.remove_memory(key.as_str());
        self.remove_from_disk(key.as_str()).await
    }

    /// Empties both tiers, deleting every blob and the persisted index.
    pub async fn clear(&self) -> Result<()> {
        {
            let mut memory = self.state().memory.lock();
            memory.clear();
        }
        crate::metrics::set_memory_usage(0);
        self.inner.queue.call(|done| DiskJob::Clear { done }).await?;
        info!("cache cleared");
        Ok(())
    }

    pub async fn current_disk_usage(&self) -> u64 {
        self.state().index().await.lock().usage()
    }

    pub fn current_memory_usage(&self) -> u64 {
        self.state().memory.lock().bytes_in_use()
    }

    pub async fn stats(&self) -> CacheStats {
        let (disk_entries, disk_usage) = {
            let index = self.state().index().await.lock();
            (index.len(), index.usage())
        };
        let config = &self.state().config;
        CacheStats {
            disk_entries,
            disk_usage,
            disk_capacity: config.disk_capacity,
            memory_usage: self.current_memory_usage(),
            memory_capacity: config.memory_capacity,
        }
    }

    /// True when a fresh copy is held in memory, or the disk index knows the key and its
    /// blob still exists. Disk entries are not decoded, so their expiry is not checked.
    pub async fn is_cached(&self, url: &Url) -> bool {
        let key = CacheKey::for_url(url);
        let state = self.state();
        if state
            .memory
            .lock()
            .contains_fresh(key.as_str(), SystemTime::now())
        {
            return true;
        }
        let indexed = state.index().await.lock().contains(key.as_str());
        if !indexed {
            return false;
        }
        match state.store.exists(key.as_str()).await {
            Ok(exists) => exists,
            Err(err) => {
                log_cache_error("disk exists", &StorageError::new("exists", key.as_str(), err).into());
                false
            }
        }
    }

    /// Runs eviction now instead of waiting for the next maintenance tick.
    pub async fn balance(&self) -> Result<EvictionStats> {
        let (done, answer) = oneshot::channel();
        self.inner.queue.submit(DiskJob::Balance { done })?;
        answer.await.map_err(|_| Error::from(WorkerStopped))?
    }

    /// Waits for all queued disk work and persists the index if it is dirty.
    pub async fn flush(&self) -> Result<()> {
        self.inner.queue.call(|done| DiskJob::Flush { done }).await
    }

    /// Stops periodic maintenance and flushes. The cache stays usable afterwards, without
    /// the scheduler.
    pub async fn close(&self) -> Result<()> {
        if let Some(scheduler) = self.inner.scheduler.lock().take() {
            scheduler.abort();
        }
        self.flush().await?;
        debug!("cache closed");
        Ok(())
    }

    async fn remove_from_disk(&self, key: &str) -> Result<()> {
        let keys = vec![key.to_string()];
        self.inner
            .queue
            .call(|done| DiskJob::Remove { keys, done })
            .await
    }

    /// Queues removal of a disk entry that turned out to be unusable. `seq` is the index
    /// stamp seen when the entry was read.
    fn discard_disk_entry(&self, key: &CacheKey, seq: u64) {
        let job = DiskJob::Discard {
            key: key.as_str().to_string(),
            seq,
        };
        if let Err(err) = self.inner.queue.submit(job) {
            log_cache_error("discard disk entry", &err);
        }
    }

    fn insert_memory(&self, key: &str, stored: StoredResponse, size: u64) {
        let (evicted, in_use) = {
            let mut memory = self.state().memory.lock();
            let evicted = memory.insert(key.to_string(), stored, size);
            (evicted, memory.bytes_in_use())
        };
        crate::metrics::record_memory_eviction(evicted);
        crate::metrics::set_memory_usage(in_use);
    }

    fn remove_memory(&self, key: &str) {
        let in_use = {
            let mut memory = self.state().memory.lock();
            memory.remove(key);
            memory.bytes_in_use()
        };
        crate::metrics::set_memory_usage(in_use);
    }

    fn record_lookup(&self, key: &CacheKey, tier: &'static str, outcome: &'static str) {
        crate::metrics::record_cache_lookup(tier, outcome);
        log_cache_event(&CacheEvent {
            op: "get",
            key: key.as_str(),
            tier,
            outcome,
            size: None,
        });
    }

    fn stored(&self, key: &CacheKey, outcome: StoreOutcome, size: u64) -> StoreOutcome {
        let tier = match outcome {
            StoreOutcome::Memory => "memory",
            StoreOutcome::Disk => "disk",
            StoreOutcome::Rejected(_) => "none",
        };
        crate::metrics::record_cache_store(tier);
        log_cache_event(&CacheEvent {
            op: "put",
            key: key.as_str(),
            tier,
            outcome: "stored",
            size: Some(size),
        });
        outcome
    }

    fn rejected(&self, key: &CacheKey, reason: RejectReason) -> StoreOutcome {
        crate::metrics::record_cache_reject(reason.as_str());
        log_cache_event(&CacheEvent {
            op: "put",
            key: key.as_str(),
            tier: "none",
            outcome: reason.as_str(),
            size: None,
        });
        StoreOutcome::Rejected(reason)
    }
}

impl CacheState {
    fn new(config: CacheConfig, store: Arc<dyn BlobStore>) -> Self {
        let memory = MemoryTier::new(config.memory_capacity);
        Self {
            config,
            store,
            index: OnceCell::new(),
            memory: Mutex::new(memory),
        }
    }

    /// The disk index, loaded from the blob store on first use.
    async fn index(&self) -> &Mutex<DiskIndex> {
        self.index
            .get_or_init(|| async { Mutex::new(self.load_index().await) })
            .await
    }

    async fn load_index(&self) -> DiskIndex {
        let data = match self.store.get(INDEX_RECORD_KEY).await {
            Ok(Some(data)) => data,
            Ok(None) => return DiskIndex::new(),
            Err(err) => {
                warn!(error = %err, "failed to read disk index; starting empty");
                return DiskIndex::new();
            }
        };
        match IndexSnapshot::from_bytes(&data) {
            Ok(snapshot) => DiskIndex::from_snapshot(snapshot),
            Err(err) => {
                warn!(error = %err, "disk index record is corrupt; starting empty");
                let mut index = DiskIndex::new();
                index.mark_dirty();
                index
            }
        }
    }

    /// Writes the index snapshot. The index is marked clean before the write and dirty
    /// again if the write fails, so changes made meanwhile are never lost.
    async fn persist_index(&self) -> Result<()> {
        let index = self.index().await;
        let snapshot = {
            let mut guard = index.lock();
            guard.mark_clean();
            guard.snapshot()
        };
        let written = match snapshot.to_bytes() {
            Ok(bytes) => self.store.put(INDEX_RECORD_KEY, &bytes).await,
            Err(err) => Err(err),
        };
        match written {
            Ok(()) => {
                crate::metrics::record_index_persist(true);
                trace!(entries = snapshot.sizes.len(), "disk index persisted");
                Ok(())
            }
            Err(err) => {
                index.lock().mark_dirty();
                crate::metrics::record_index_persist(false);
                Err(PersistenceError::new(err).into())
            }
        }
    }
}
