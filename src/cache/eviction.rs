use anyhow::Result;
use tracing::{debug, warn};

use super::CacheState;
use super::index::EntryMeta;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EvictionStats {
    pub removed: usize,
    pub bytes_reclaimed: u64,
}

/// Picks the least recently accessed keys whose removal brings `usage` down to `capacity`.
///
/// Returns nothing when already within capacity. Ties on access time fall back to insertion
/// order.
pub(crate) fn select_victims<'a, I>(entries: I, usage: u64, capacity: u64) -> Vec<String>
where
    I: IntoIterator<Item = (&'a String, &'a EntryMeta)>,
{
    if usage <= capacity {
        return Vec::new();
    }
    let mut ordered: Vec<(&String, &EntryMeta)> = entries.into_iter().collect();
    ordered.sort_by_key(|(_, meta)| (meta.last_access, meta.seq));

    let excess = usage - capacity;
    let mut freed = 0u64;
    let mut victims = Vec::new();
    for (key, meta) in ordered {
        if freed >= excess {
            break;
        }
        freed = freed.saturating_add(meta.size);
        victims.push(key.clone());
    }
    victims
}

impl CacheState {
    /// Evicts from the disk tier until usage fits the configured capacity, then persists
    /// the index.
    pub(super) async fn balance_disk_usage(&self) -> Result<EvictionStats> {
        let capacity = self.config.disk_capacity;
        let removed = {
            let mut index = self.index().await.lock();
            let victims = select_victims(index.entries(), index.usage(), capacity);
            if victims.is_empty() {
                return Ok(EvictionStats::default());
            }
            let removed = index.remove(victims);
            crate::metrics::set_disk_usage(index.usage());
            removed
        };

        let mut stats = EvictionStats::default();
        for (key, meta) in &removed {
            stats.removed += 1;
            stats.bytes_reclaimed = stats.bytes_reclaimed.saturating_add(meta.size);
            if let Err(err) = self.store.delete(key).await {
                warn!(error = %err, key = %key, "failed to delete evicted blob");
            }
        }
        crate::metrics::record_disk_eviction(stats.removed, stats.bytes_reclaimed);
        debug!(
            removed = stats.removed,
            bytes = stats.bytes_reclaimed,
            "disk tier balanced"
        );

        self.persist_index().await?;
        Ok(stats)
    }
}
