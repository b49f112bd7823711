mod support;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use http::{HeaderValue, StatusCode, header};
use tokio::time::sleep;

use tiercache::cache::{CacheConfig, FsBlobStore, HttpCache, RejectReason, StoreOutcome};

use support::*;

#[tokio::test]
async fn disk_round_trip_preserves_response() -> Result<()> {
    let dirs = TestDirs::new()?;
    let cache = HttpCache::open_dir(test_config(), &dirs.cache_dir).await?;
    let req = request("/assets/app.js");
    let body = vec![7u8; 4096];

    assert_eq!(
        cache.put(&req, response(DISK_TTL, body.clone())).await,
        StoreOutcome::Disk
    );
    let hit = cache.get(&req).await.expect("disk hit");
    assert_eq!(hit.status, StatusCode::OK);
    assert_eq!(hit.body.as_ref(), body.as_slice());
    assert_eq!(hit.headers.get_all(header::SET_COOKIE).iter().count(), 2);
    assert_eq!(
        hit.headers.get(header::CONTENT_TYPE).unwrap(),
        "application/octet-stream"
    );

    let store = FsBlobStore::open(&dirs.cache_dir).await?;
    // entry blob plus the index record
    assert_eq!(count_files(store.disk_dir()), 2);
    assert!(index_record_path(store.disk_dir()).exists());
    Ok(())
}

#[tokio::test]
async fn disk_round_trip_keeps_non_ascii_header_values() -> Result<()> {
    let dirs = TestDirs::new()?;
    let cache = HttpCache::open_dir(test_config(), &dirs.cache_dir).await?;
    let req = request("/download");
    let mut resp = response(DISK_TTL, vec![0u8; 1024]);
    resp.headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_bytes(b"attachment; filename=\"caf\xe9.txt\"")?,
    );
    let expected = resp.headers.clone();

    assert_eq!(cache.put(&req, resp).await, StoreOutcome::Disk);
    let hit = cache.get(&req).await.expect("disk hit");
    assert_eq!(hit.headers, expected);
    Ok(())
}

#[tokio::test]
async fn memory_round_trip_never_touches_disk() -> Result<()> {
    let dirs = TestDirs::new()?;
    let store = FlakyStore::open(&dirs.cache_dir).await?;
    let cache = HttpCache::open(test_config(), store.clone()).await?;
    let req = request("/api/status");

    assert_eq!(
        cache.put(&req, response(MEMORY_TTL, &b"{\"ok\":true}"[..])).await,
        StoreOutcome::Memory
    );
    let hit = cache.get(&req).await.expect("memory hit");
    assert_eq!(hit.body.as_ref(), b"{\"ok\":true}");
    assert_eq!(store.puts(), 0);
    assert_eq!(count_files(store.disk_dir()), 0);
    Ok(())
}

#[tokio::test]
async fn reopen_keeps_recently_read_entries_when_shrinking() -> Result<()> {
    let dirs = TestDirs::new()?;
    let entry = vec![1u8; 1000];
    {
        let cache = HttpCache::open_dir(test_config(), &dirs.cache_dir).await?;
        for path in ["/a", "/b", "/c"] {
            cache.put(&request(path), response(DISK_TTL, entry.clone())).await;
            sleep(Duration::from_millis(5)).await;
        }
        // reading /a makes /b the least recently used entry
        assert!(cache.get(&request("/a")).await.is_some());
        cache.close().await?;
    }

    let probe = HttpCache::open_dir(test_config(), &dirs.cache_dir).await?;
    let usage = probe.current_disk_usage().await;
    probe.close().await?;
    drop(probe);
    let one = usage / 3;

    let config = CacheConfig {
        disk_capacity: 2 * one + one / 2,
        ..test_config()
    };
    let cache = HttpCache::open_dir(config, &dirs.cache_dir).await?;
    let stats = cache.balance().await?;

    assert_eq!(stats.removed, 1);
    assert_eq!(cache.current_disk_usage().await, 2 * one);
    assert!(cache.is_cached(&url("/a")).await);
    assert!(!cache.is_cached(&url("/b")).await);
    assert!(cache.is_cached(&url("/c")).await);
    Ok(())
}

#[tokio::test]
async fn failed_blob_write_leaves_previous_entry_in_place() -> Result<()> {
    let dirs = TestDirs::new()?;
    let store = FlakyStore::open(&dirs.cache_dir).await?;
    let cache = HttpCache::open(test_config(), store.clone()).await?;
    let req = request("/report.pdf");

    assert_eq!(
        cache.put(&req, response(DISK_TTL, vec![1u8; 20_000])).await,
        StoreOutcome::Disk
    );
    let usage = cache.current_disk_usage().await;

    store.fail_puts(true);
    assert_eq!(
        cache.put(&req, response(DISK_TTL, vec![2u8; 30_000])).await,
        StoreOutcome::Rejected(RejectReason::StorageFailed)
    );
    assert_eq!(cache.current_disk_usage().await, usage);
    let hit = cache.get(&req).await.expect("previous entry");
    assert_eq!(hit.body.len(), 20_000);
    assert_eq!(hit.body[0], 1);

    assert_eq!(
        cache
            .put(&request("/fresh.pdf"), response(DISK_TTL, vec![3u8; 20_000]))
            .await,
        StoreOutcome::Rejected(RejectReason::StorageFailed)
    );
    assert!(!cache.is_cached(&url("/fresh.pdf")).await);
    assert_eq!(cache.current_disk_usage().await, usage);

    store.fail_puts(false);
    assert_eq!(
        cache
            .put(&request("/fresh.pdf"), response(DISK_TTL, vec![3u8; 20_000]))
            .await,
        StoreOutcome::Disk
    );
    Ok(())
}

#[tokio::test]
async fn eviction_updates_index_even_when_deletes_fail() -> Result<()> {
    let dirs = TestDirs::new()?;
    let store = FlakyStore::open(&dirs.cache_dir).await?;
    let config = CacheConfig {
        disk_capacity: 10_000,
        ..test_config()
    };
    let cache = HttpCache::open(config, store.clone()).await?;
    store.fail_deletes(true);

    for i in 0..8 {
        cache
            .put(&request(&format!("/chunk/{i}")), response(DISK_TTL, vec![0u8; 2_000]))
            .await;
    }
    assert!(cache.current_disk_usage().await <= 10_000);
    assert!(cache.is_cached(&url("/chunk/7")).await);
    assert!(!cache.is_cached(&url("/chunk/0")).await);
    Ok(())
}

#[tokio::test]
async fn maintenance_persists_access_times() -> Result<()> {
    let dirs = TestDirs::new()?;
    let store = FlakyStore::open(&dirs.cache_dir).await?;
    let config = CacheConfig {
        maintenance_interval: Duration::from_millis(50),
        ..test_config()
    };
    let cache = HttpCache::open(config, store.clone()).await?;
    let req = request("/logo.png");
    cache.put(&req, response(DISK_TTL, vec![9u8; 512])).await;
    let writes = store.puts();

    // promotes into memory and marks the index dirty without persisting
    assert!(cache.get(&req).await.is_some());
    assert_eq!(store.puts(), writes);

    sleep(Duration::from_millis(300)).await;
    assert!(store.puts() > writes);
    Ok(())
}

#[tokio::test]
async fn expired_disk_entry_is_dropped_on_read() -> Result<()> {
    let dirs = TestDirs::new()?;
    let config = CacheConfig {
        min_disk_item_interval: Duration::ZERO,
        max_memory_item_interval: Duration::ZERO,
        ..test_config()
    };
    let cache = HttpCache::open_dir(config, &dirs.cache_dir).await?;
    let req = request("/ticker");
    assert_eq!(
        cache.put(&req, response(1, &b"42"[..])).await,
        StoreOutcome::Disk
    );

    sleep(Duration::from_millis(1_100)).await;
    assert!(cache.get(&req).await.is_none());
    cache.flush().await?;
    assert_eq!(cache.current_disk_usage().await, 0);
    assert!(!cache.is_cached(&req.url).await);
    Ok(())
}

#[tokio::test]
async fn concurrent_puts_keep_usage_consistent() -> Result<()> {
    let dirs = TestDirs::new()?;
    let cache = HttpCache::open_dir(test_config(), &dirs.cache_dir).await?;

    let mut tasks = Vec::new();
    for i in 0..16 {
        let cache = cache.clone();
        tasks.push(tokio::spawn(async move {
            let body = vec![i as u8; 1_000 + i * 10];
            cache
                .put(&request(&format!("/parallel/{i}")), response(DISK_TTL, body))
                .await
        }));
    }
    for task in tasks {
        assert_eq!(task.await?, StoreOutcome::Disk);
    }
    cache.flush().await?;

    let disk_dir = FsBlobStore::open(&dirs.cache_dir).await?.disk_dir().to_path_buf();
    let index_bytes = std::fs::metadata(index_record_path(&disk_dir))?.len();
    assert_eq!(
        cache.current_disk_usage().await,
        total_file_bytes(&disk_dir) - index_bytes
    );
    assert_eq!(cache.stats().await.disk_entries, 16);
    Ok(())
}

#[tokio::test]
async fn clear_empties_the_store() -> Result<()> {
    let dirs = TestDirs::new()?;
    let store = FlakyStore::open(&dirs.cache_dir).await?;
    let cache = HttpCache::open(test_config(), store.clone()).await?;
    for i in 0..4 {
        cache
            .put(&request(&format!("/bulk/{i}")), response(DISK_TTL, vec![0u8; 256]))
            .await;
    }
    cache.put(&request("/hot"), response(MEMORY_TTL, &b"hot"[..])).await;

    cache.clear().await?;
    assert_eq!(count_files(store.disk_dir()), 0);
    assert_eq!(cache.current_disk_usage().await, 0);
    assert!(cache.get(&request("/hot")).await.is_none());
    Ok(())
}

#[tokio::test]
async fn corrupt_index_record_is_logged_and_discarded() -> Result<()> {
    let dirs = TestDirs::new()?;
    let disk_dir = {
        let store: Arc<FsBlobStore> = Arc::new(FsBlobStore::open(&dirs.cache_dir).await?);
        let cache = HttpCache::open(test_config(), store.clone()).await?;
        cache.put(&request("/kept"), response(DISK_TTL, vec![5u8; 128])).await;
        cache.close().await?;
        store.disk_dir().to_path_buf()
    };
    std::fs::write(index_record_path(&disk_dir), b"{\"diskUsage\": ")?;

    let logs = LogCapture::new("warn").await;
    let cache = HttpCache::open_dir(test_config(), &dirs.cache_dir).await?;
    assert!(
        logs.contains("disk index record is corrupt"),
        "missing warning in logs: {}",
        logs.text()
    );
    assert_eq!(cache.current_disk_usage().await, 0);
    assert!(cache.get(&request("/kept")).await.is_none());
    Ok(())
}
