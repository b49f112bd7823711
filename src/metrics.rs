use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

static CACHE_LOOKUP_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let opts = Opts::new("cache_lookup_total", "Cache lookups by tier and result");
    let vec = IntCounterVec::new(opts, &["tier", "result"]).expect("create counter vec");
    REGISTRY
        .register(Box::new(vec.clone()))
        .expect("register cache_lookup_total");
    vec
});

static CACHE_STORE_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let opts = Opts::new("cache_store_total", "Stored responses by tier");
    let vec = IntCounterVec::new(opts, &["tier"]).expect("create counter vec");
    REGISTRY
        .register(Box::new(vec.clone()))
        .expect("register cache_store_total");
    vec
});

static CACHE_REJECT_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let opts = Opts::new("cache_reject_total", "Responses not stored, by reason");
    let vec = IntCounterVec::new(opts, &["reason"]).expect("create counter vec");
    REGISTRY
        .register(Box::new(vec.clone()))
        .expect("register cache_reject_total");
    vec
});

static CACHE_STORE_FAILURES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "cache_store_failures_total",
        "Disk writes that failed and fell back or were dropped",
    )
    .expect("create cache_store_failures_total");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("register cache_store_failures_total");
    counter
});

static CACHE_ERRORS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let vec = IntCounterVec::new(
        Opts::new("cache_errors_total", "Cache errors by kind"),
        &["kind"],
    )
    .expect("create cache_errors_total");
    REGISTRY
        .register(Box::new(vec.clone()))
        .expect("register cache_errors_total");
    vec
});

static DISK_EVICTIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new("cache_disk_evictions_total", "Entries evicted from disk")
        .expect("create counter");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("register cache_disk_evictions_total");
    counter
});

static DISK_EVICTED_BYTES_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "cache_disk_evicted_bytes_total",
        "Bytes reclaimed by disk eviction",
    )
    .expect("create counter");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("register cache_disk_evicted_bytes_total");
    counter
});

static MEMORY_EVICTIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new("cache_memory_evictions_total", "Entries evicted from memory")
        .expect("create counter");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("register cache_memory_evictions_total");
    counter
});

static INDEX_PERSIST_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let vec = IntCounterVec::new(
        Opts::new("cache_index_persist_total", "Disk index writes by result"),
        &["result"],
    )
    .expect("create cache_index_persist_total");
    REGISTRY
        .register(Box::new(vec.clone()))
        .expect("register cache_index_persist_total");
    vec
});

static MAINTENANCE_RUNS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let vec = IntCounterVec::new(
        Opts::new("cache_maintenance_runs_total", "Maintenance tasks executed"),
        &["task"],
    )
    .expect("create cache_maintenance_runs_total");
    REGISTRY
        .register(Box::new(vec.clone()))
        .expect("register cache_maintenance_runs_total");
    vec
});

static MAINTENANCE_COALESCED_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "cache_maintenance_coalesced_total",
        "Pending maintenance tasks superseded by a later tick",
    )
    .expect("create counter");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("register cache_maintenance_coalesced_total");
    counter
});

static CACHE_CLEANUP_DIRS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::new(
        "cache_cleanup_dirs_total",
        "Old cache directories removed after layout upgrade",
    )
    .expect("create counter");
    REGISTRY
        .register(Box::new(counter.clone()))
        .expect("register cache_cleanup_dirs_total");
    counter
});

static DISK_USAGE_BYTES: Lazy<IntGauge> = Lazy::new(|| {
    let gauge = IntGauge::new("cache_disk_usage_bytes", "Bytes recorded in the disk index")
        .expect("create cache_disk_usage_bytes");
    REGISTRY
        .register(Box::new(gauge.clone()))
        .expect("register cache_disk_usage_bytes");
    gauge
});

static MEMORY_USAGE_BYTES: Lazy<IntGauge> = Lazy::new(|| {
    let gauge = IntGauge::new("cache_memory_usage_bytes", "Bytes held by the memory tier")
        .expect("create cache_memory_usage_bytes");
    REGISTRY
        .register(Box::new(gauge.clone()))
        .expect("register cache_memory_usage_bytes");
    gauge
});

pub fn record_cache_lookup(tier: &str, result: &str) {
    CACHE_LOOKUP_TOTAL.with_label_values(&[tier, result]).inc();
}

pub fn record_cache_store(tier: &str) {
    CACHE_STORE_TOTAL.with_label_values(&[tier]).inc();
}

pub fn record_cache_reject(reason: &str) {
    CACHE_REJECT_TOTAL.with_label_values(&[reason]).inc();
}

pub fn record_cache_store_failure() {
    CACHE_STORE_FAILURES_TOTAL.inc();
}

pub fn record_cache_error(kind: &str) {
    CACHE_ERRORS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn record_disk_eviction(entries: usize, bytes: u64) {
    if entries > 0 {
        DISK_EVICTIONS_TOTAL.inc_by(entries as u64);
    }
    if bytes > 0 {
        DISK_EVICTED_BYTES_TOTAL.inc_by(bytes);
    }
}

pub fn record_memory_eviction(entries: usize) {
    if entries > 0 {
        MEMORY_EVICTIONS_TOTAL.inc_by(entries as u64);
    }
}

pub fn record_index_persist(ok: bool) {
    let label = if ok { "ok" } else { "error" };
    INDEX_PERSIST_TOTAL.with_label_values(&[label]).inc();
}

pub fn record_maintenance_run(task: &str) {
    MAINTENANCE_RUNS_TOTAL.with_label_values(&[task]).inc();
}

pub fn record_maintenance_coalesced() {
    MAINTENANCE_COALESCED_TOTAL.inc();
}

pub fn record_cache_cleanup_dir() {
    CACHE_CLEANUP_DIRS_TOTAL.inc();
}

pub fn set_disk_usage(bytes: u64) {
    DISK_USAGE_BYTES.set(bytes.min(i64::MAX as u64) as i64);
}

pub fn set_memory_usage(bytes: u64) {
    MEMORY_USAGE_BYTES.set(bytes.min(i64::MAX as u64) as i64);
}

pub fn gather() -> Vec<u8> {
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .expect("encode metrics");
    buffer
}
