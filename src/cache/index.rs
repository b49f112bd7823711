use std::collections::{BTreeMap, HashMap};
use std::time::SystemTime;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::record::{from_unix_millis, to_unix_millis};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryMeta {
    pub last_access: SystemTime,
    pub size: u64,
    /// Insertion order, used only to break `last_access` ties.
    pub(crate) seq: u64,
}

/// Directory of disk-resident entries and their aggregate size.
///
/// `usage` always equals the sum of `size` over `entries`; every mutation keeps that true.
#[derive(Debug, Default)]
pub struct DiskIndex {
    entries: HashMap<String, EntryMeta>,
    usage: u64,
    dirty: bool,
    next_seq: u64,
}

/// The persisted form of a [`DiskIndex`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSnapshot {
    pub disk_usage: u64,
    /// Last access per key, in milliseconds since the Unix epoch.
    pub accesses: BTreeMap<String, u64>,
    pub sizes: BTreeMap<String, u64>,
}

impl IndexSnapshot {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}

impl DiskIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: IndexSnapshot) -> Self {
        let IndexSnapshot {
            disk_usage,
            accesses,
            sizes,
        } = snapshot;

        let mut restored: Vec<(String, SystemTime, u64)> = sizes
            .into_iter()
            .map(|(key, size)| {
                let last_access = accesses
                    .get(&key)
                    .copied()
                    .map(from_unix_millis)
                    .unwrap_or(SystemTime::UNIX_EPOCH);
                (key, last_access, size)
            })
            .collect();
        restored.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));

        let mut index = Self::new();
        for (key, last_access, size) in restored {
            index.insert_meta(key, last_access, size);
        }

        if index.usage != disk_usage {
            warn!(
                recorded = disk_usage,
                computed = index.usage,
                "persisted disk usage disagrees with entry sizes; using computed value"
            );
            index.dirty = true;
        }
        index
    }

    pub fn snapshot(&self) -> IndexSnapshot {
        let mut snapshot = IndexSnapshot {
            disk_usage: self.usage,
            ..IndexSnapshot::default()
        };
        for (key, meta) in &self.entries {
            snapshot
                .accesses
                .insert(key.clone(), to_unix_millis(meta.last_access));
            snapshot.sizes.insert(key.clone(), meta.size);
        }
        snapshot
    }

    pub fn get(&self, key: &str) -> Option<EntryMeta> {
        self.entries.get(key).copied()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Inserts or replaces the meta for `key`. The previous size, if any, is subtracted
    /// before the new one is added.
    pub fn put(&mut self, key: String, size: u64, now: SystemTime) -> Option<EntryMeta> {
        let previous = self.entries.remove(&key);
        if let Some(previous) = &previous {
            self.usage = self.usage.saturating_sub(previous.size);
        }
        self.insert_meta(key, now, size);
        self.dirty = true;
        previous
    }

    fn insert_meta(&mut self, key: String, last_access: SystemTime, size: u64) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.usage = self.usage.saturating_add(size);
        self.entries.insert(
            key,
            EntryMeta {
                last_access,
                size,
                seq,
            },
        );
    }

    /// Records an access without forcing a persist.
    pub fn touch(&mut self, key: &str, now: SystemTime) -> bool {
        match self.entries.get_mut(key) {
            Some(meta) => {
                meta.last_access = now;
                self.dirty = true;
                true
            }
            None => false,
        }
    }

    /// Drops the given keys, returning the metas that were present.
    pub fn remove<I, S>(&mut self, keys: I) -> Vec<(String, EntryMeta)>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut removed = Vec::new();
        for key in keys {
            if let Some((key, meta)) = self.entries.remove_entry(key.as_ref()) {
                self.usage = self.usage.saturating_sub(meta.size);
                removed.push((key, meta));
            }
        }
        if !removed.is_empty() {
            self.dirty = true;
        }
        removed
    }

    /// Drops `key` only if it still holds the entry stamped `seq`. A later `put` of the
    /// same key always carries a newer stamp, so it survives.
    pub fn remove_if_seq_matches(&mut self, key: &str, seq: u64) -> Option<EntryMeta> {
        let matches = self
            .entries
            .get(key)
            .map(|meta| meta.seq == seq)
            .unwrap_or(false);
        if matches && let Some(removed) = self.entries.remove(key) {
            self.usage = self.usage.saturating_sub(removed.size);
            self.dirty = true;
            return Some(removed);
        }
        None
    }

    /// Empties the index. Sequence stamps keep counting so stamps handed out before the
    /// reset never match a later entry.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.usage = 0;
        self.dirty = false;
    }

    pub fn usage(&self) -> u64 {
        self.usage
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty = false;
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = (&String, &EntryMeta)> {
        self.entries.iter()
    }
}
