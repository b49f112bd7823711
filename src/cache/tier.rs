use std::time::{Duration, SystemTime};

use super::StoragePolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    NotCacheable,
    StorageNotAllowed,
    TooLarge,
    ExpiresTooSoon,
    Bypassed,
    StorageFailed,
}

impl RejectReason {
    pub fn as_str(self) -> &'static str {
        match self {
            RejectReason::NotCacheable => "not_cacheable",
            RejectReason::StorageNotAllowed => "storage_not_allowed",
            RejectReason::TooLarge => "too_large",
            RejectReason::ExpiresTooSoon => "expires_too_soon",
            RejectReason::Bypassed => "bypassed",
            RejectReason::StorageFailed => "storage_failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierPlan {
    MemoryOnly,
    Disk,
    Reject(RejectReason),
}

#[derive(Debug, Clone, Copy)]
pub struct TierLimits {
    pub disk_capacity: u64,
    pub memory_capacity: u64,
    pub max_memory_item_size: u64,
    pub min_disk_interval: Duration,
    pub max_memory_interval: Duration,
    pub allow_disk_for_memory_only: bool,
}

/// Decides which tier a response of `size` bytes expiring at `expires_at` belongs in.
///
/// Entries that fit in memory and expire within `max_memory_interval` stay in memory;
/// anything living longer than `min_disk_interval` is otherwise written to disk.
pub fn plan_tier(
    size: u64,
    expires_at: Option<SystemTime>,
    now: SystemTime,
    storage: StoragePolicy,
    limits: &TierLimits,
) -> TierPlan {
    let Some(expires_at) = expires_at else {
        return TierPlan::Reject(RejectReason::NotCacheable);
    };
    let disk_allowed = match storage {
        StoragePolicy::Allowed => true,
        StoragePolicy::AllowedInMemoryOnly => limits.allow_disk_for_memory_only,
        StoragePolicy::NotAllowed => return TierPlan::Reject(RejectReason::StorageNotAllowed),
    };
    if size >= limits.disk_capacity {
        return TierPlan::Reject(RejectReason::TooLarge);
    }

    let lifetime = expires_at.duration_since(now).unwrap_or(Duration::ZERO);
    let disk_eligible = disk_allowed && lifetime > limits.min_disk_interval;
    let memory_eligible = size < limits.memory_capacity && size <= limits.max_memory_item_size;

    if memory_eligible && (!disk_eligible || lifetime <= limits.max_memory_interval) {
        return TierPlan::MemoryOnly;
    }
    if disk_eligible {
        return TierPlan::Disk;
    }
    // Too big for memory and too short-lived to be worth a disk write.
    TierPlan::Reject(RejectReason::ExpiresTooSoon)
}
