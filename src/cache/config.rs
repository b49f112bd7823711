use std::time::Duration;

use super::error::ConfigurationError;
use super::tier::TierLimits;

pub const DEFAULT_MEMORY_CAPACITY: u64 = 1024 * 1024;
pub const DEFAULT_DISK_CAPACITY: u64 = 20 * 1024 * 1024;
pub const DEFAULT_MIN_DISK_ITEM_INTERVAL: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_MAX_MEMORY_ITEM_INTERVAL: Duration = Duration::from_secs(36 * 60 * 60);
pub const DEFAULT_MAX_MEMORY_ITEM_SIZE: u64 = 16 * 1024;
pub const DEFAULT_MAINTENANCE_INTERVAL: Duration = Duration::from_secs(5);

/// Capacities and tiering thresholds for an [`HttpCache`](super::HttpCache).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub memory_capacity: u64,
    pub disk_capacity: u64,
    /// Entries must outlive this to be written to disk.
    pub min_disk_item_interval: Duration,
    /// Small entries expiring within this stay in memory only.
    pub max_memory_item_interval: Duration,
    pub max_memory_item_size: u64,
    /// Lets responses marked memory-only reach the disk tier anyway.
    pub allow_disk_for_memory_only: bool,
    pub maintenance_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
            disk_capacity: DEFAULT_DISK_CAPACITY,
            min_disk_item_interval: DEFAULT_MIN_DISK_ITEM_INTERVAL,
            max_memory_item_interval: DEFAULT_MAX_MEMORY_ITEM_INTERVAL,
            max_memory_item_size: DEFAULT_MAX_MEMORY_ITEM_SIZE,
            allow_disk_for_memory_only: true,
            maintenance_interval: DEFAULT_MAINTENANCE_INTERVAL,
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.disk_capacity == 0 {
            return Err(ConfigurationError::new("disk_capacity must be greater than zero"));
        }
        if self.memory_capacity == 0 {
            return Err(ConfigurationError::new(
                "memory_capacity must be greater than zero",
            ));
        }
        if self.maintenance_interval.is_zero() {
            return Err(ConfigurationError::new(
                "maintenance_interval must be greater than zero",
            ));
        }
        Ok(())
    }

    pub(crate) fn tier_limits(&self) -> TierLimits {
        TierLimits {
            disk_capacity: self.disk_capacity,
            memory_capacity: self.memory_capacity,
            max_memory_item_size: self.max_memory_item_size,
            min_disk_interval: self.min_disk_item_interval,
            max_memory_interval: self.max_memory_item_interval,
            allow_disk_for_memory_only: self.allow_disk_for_memory_only,
        }
    }

    /// Whether an entry of `size` bytes may be promoted into or kept in memory.
    pub(crate) fn fits_memory(&self, size: u64) -> bool {
        size < self.memory_capacity && size <= self.max_memory_item_size
    }
}
