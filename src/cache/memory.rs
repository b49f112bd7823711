use std::time::SystemTime;

use lru::LruCache;

use super::record::StoredResponse;

#[derive(Debug)]
struct MemoryEntry {
    stored: StoredResponse,
    size: u64,
}

/// Byte-bounded LRU holding decoded responses.
#[derive(Debug)]
pub(crate) struct MemoryTier {
    lru: LruCache<String, MemoryEntry>,
    bytes_in_use: u64,
    max_bytes: u64,
}

impl MemoryTier {
    pub(crate) fn new(max_bytes: u64) -> Self {
        Self {
            lru: LruCache::unbounded(),
            bytes_in_use: 0,
            max_bytes,
        }
    }

    pub(crate) fn clear(&mut self) {
        self.bytes_in_use = 0;
        self.lru.clear();
    }

    /// Returns a fresh entry and marks it most recently used. Expired entries are dropped.
    pub(crate) fn get(&mut self, key: &str, now: SystemTime) -> Option<StoredResponse> {
        let expired = self.lru.get(key)?.stored.is_expired(now);
        if expired {
            self.remove(key);
            return None;
        }
        self.lru.peek(key).map(|entry| entry.stored.clone())
    }

    pub(crate) fn contains_fresh(&self, key: &str, now: SystemTime) -> bool {
        self.lru
            .peek(key)
            .map(|entry| !entry.stored.is_expired(now))
            .unwrap_or(false)
    }

    pub(crate) fn remove(&mut self, key: &str) -> bool {
        if let Some(removed) = self.lru.pop(key) {
            self.bytes_in_use = self.bytes_in_use.saturating_sub(removed.size);
            return true;
        }
        false
    }

    /// Inserts or replaces `key`, then evicts least recently used entries until the tier
    /// fits its budget. Returns how many entries were evicted.
    pub(crate) fn insert(&mut self, key: String, stored: StoredResponse, size: u64) -> usize {
        if size > self.max_bytes {
            self.remove(&key);
            return 0;
        }

        let mut evicted = 0;
        if let Some(previous) = self.lru.put(key, MemoryEntry { stored, size }) {
            self.bytes_in_use = self.bytes_in_use.saturating_sub(previous.size);
        }
        self.bytes_in_use = self.bytes_in_use.saturating_add(size);

        while self.bytes_in_use > self.max_bytes {
            if let Some((_key, removed)) = self.lru.pop_lru() {
                self.bytes_in_use = self.bytes_in_use.saturating_sub(removed.size);
                evicted += 1;
            } else {
                break;
            }
        }

        evicted
    }

    pub(crate) fn bytes_in_use(&self) -> u64 {
        self.bytes_in_use
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.lru.len()
    }
}
