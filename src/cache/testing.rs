use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::{Result, bail};
use async_trait::async_trait;
use parking_lot::Mutex;

use super::BlobStore;

/// In-process [`BlobStore`] with switchable write failures.
#[derive(Debug, Default)]
pub(crate) struct MemoryBlobStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    puts: AtomicUsize,
    fail_puts: AtomicBool,
    fail_clears: AtomicBool,
}

impl MemoryBlobStore {
    pub(crate) fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_clears(&self, fail: bool) {
        self.fail_clears.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.blobs.lock().contains_key(key)
    }

    pub(crate) fn insert_raw(&self, key: &str, data: &[u8]) {
        self.blobs.lock().insert(key.to_string(), data.to_vec());
    }

    pub(crate) fn remove_raw(&self, key: &str) {
        self.blobs.lock().remove(key);
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        if self.fail_puts.load(Ordering::SeqCst) {
            bail!("simulated write failure");
        }
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.blobs.lock().insert(key.to_string(), data.to_vec());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs.lock().get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.blobs.lock().remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.contains(key))
    }

    async fn clear(&self) -> Result<()> {
        if self.fail_clears.load(Ordering::SeqCst) {
            bail!("simulated clear failure");
        }
        self.blobs.lock().clear();
        Ok(())
    }
}
