use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::fs as async_fs;
use tokio::io::AsyncWriteExt;
use tracing::warn;

use super::error::ConfigurationError;

const STORE_LAYOUT_VERSION: u32 = 1;
const STORE_VERSION_PREFIX: &str = "v";
const STORE_TOMBSTONE_PREFIX: &str = "tombstone-";
const TEMP_PREFIX: &str = "tmp_";

/// Keyed byte storage backing the disk tier.
///
/// Implementations must be safe to call from any task. A missing key is not an error:
/// `get` returns `None` and `delete` succeeds.
#[async_trait]
pub trait BlobStore: Send + Sync + fmt::Debug {
    async fn put(&self, key: &str, data: &[u8]) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn delete(&self, key: &str) -> Result<()>;
    async fn exists(&self, key: &str) -> Result<bool>;
    /// Removes every blob.
    async fn clear(&self) -> Result<()>;
}

/// Filesystem [`BlobStore`] under a versioned directory, one file per key.
///
/// File names are the BLAKE3 hash of the key, sharded two levels deep. Writes land in a
/// temporary file first and are renamed into place.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    disk_dir: PathBuf,
}

impl FsBlobStore {
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if let Ok(metadata) = async_fs::metadata(&root).await
            && !metadata.is_dir()
        {
            return Err(ConfigurationError::new(format!(
                "cache location {} is not a directory",
                root.display()
            ))
            .into());
        }

        let (disk_dir, stale) = prepare_versioned_dir(&root).await?;
        spawn_dir_cleanup(stale);

        let store = Self { disk_dir };
        store.remove_temp_files().await?;
        Ok(store)
    }

    pub fn disk_dir(&self) -> &Path {
        &self.disk_dir
    }

    fn blob_path(&self, key: &str) -> PathBuf {
        let entry_id = blake3::hash(key.as_bytes()).to_hex();
        let (first, remainder) = entry_id.split_at(2);
        let (second, _) = remainder.split_at(2);
        self.disk_dir.join(first).join(second).join(entry_id.as_str())
    }

    fn temp_path(&self) -> PathBuf {
        self.disk_dir
            .join(format!("{TEMP_PREFIX}{}", uuid::Uuid::new_v4()))
    }

    async fn remove_temp_files(&self) -> Result<()> {
        let mut entries = match async_fs::read_dir(&self.disk_dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let is_temp = entry
                .file_name()
                .to_str()
                .map(|name| name.starts_with(TEMP_PREFIX))
                .unwrap_or(false);
            if is_temp && entry.file_type().await?.is_file() {
                let _ = async_fs::remove_file(entry.path()).await;
            }
        }
        Ok(())
    }

    async fn dir_is_empty(path: &Path) -> bool {
        let mut entries = match async_fs::read_dir(path).await {
            Ok(entries) => entries,
            Err(_) => return false,
        };
        matches!(entries.next_entry().await, Ok(None))
    }

    async fn prune_empty_shards(&self, blob_path: &Path) {
        let Some(shard2) = blob_path.parent() else {
            return;
        };
        if Self::dir_is_empty(shard2).await {
            let _ = async_fs::remove_dir(shard2).await;
        }
        let Some(shard1) = shard2.parent() else {
            return;
        };
        if shard1 == self.disk_dir {
            return;
        }
        if Self::dir_is_empty(shard1).await {
            let _ = async_fs::remove_dir(shard1).await;
        }
    }

    async fn write_temp(&self, path: &Path, data: &[u8]) -> Result<()> {
        let mut options = async_fs::OpenOptions::new();
        options.create_new(true).write(true);
        #[cfg(unix)]
        {
            options.mode(0o600);
        }
        let mut file = options
            .open(path)
            .await
            .with_context(|| format!("failed to create blob file {}", path.display()))?;
        file.write_all(data).await?;
        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.blob_path(key);
        if let Some(parent) = path.parent() {
            async_fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create shard {}", parent.display()))?;
        }

        let temp = self.temp_path();
        if let Err(err) = self.write_temp(&temp, data).await {
            let _ = async_fs::remove_file(&temp).await;
            return Err(err);
        }
        if let Err(err) = async_fs::rename(&temp, &path).await {
            let _ = async_fs::remove_file(&temp).await;
            return Err(err).with_context(|| format!("failed to commit blob {}", path.display()));
        }
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.blob_path(key);
        match async_fs::read(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => {
                Err(err).with_context(|| format!("failed to read blob {}", path.display()))
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.blob_path(key);
        match async_fs::remove_file(&path).await {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to remove blob {}", path.display()));
            }
        }
        self.prune_empty_shards(&path).await;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(async_fs::try_exists(self.blob_path(key)).await?)
    }

    async fn clear(&self) -> Result<()> {
        let mut entries = match async_fs::read_dir(&self.disk_dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(err.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let result = if entry.file_type().await?.is_dir() {
                async_fs::remove_dir_all(&path).await
            } else {
                async_fs::remove_file(&path).await
            };
            match result {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(err)
                        .with_context(|| format!("failed to clear {}", path.display()));
                }
            }
        }
        Ok(())
    }
}

fn version_dir(root: &Path) -> PathBuf {
    root.join(format!("{STORE_VERSION_PREFIX}{STORE_LAYOUT_VERSION}"))
}

fn parse_version(name: &str) -> Option<u32> {
    let version = name.strip_prefix(STORE_VERSION_PREFIX)?;
    if version.is_empty() || !version.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    version.parse().ok()
}

/// Creates the active layout directory and tombstones directories from other layouts.
/// Returns the active directory and the tombstones awaiting removal.
async fn prepare_versioned_dir(root: &Path) -> Result<(PathBuf, Vec<PathBuf>)> {
    async_fs::create_dir_all(root)
        .await
        .with_context(|| format!("failed to create cache root {}", root.display()))?;

    let active_name = format!("{STORE_VERSION_PREFIX}{STORE_LAYOUT_VERSION}");
    let active_dir = version_dir(root);
    async_fs::create_dir_all(&active_dir)
        .await
        .with_context(|| format!("failed to create cache dir {}", active_dir.display()))?;

    let mut stale = Vec::new();
    let mut entries = async_fs::read_dir(root).await?;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name == active_name {
            continue;
        }
        if name.starts_with(STORE_TOMBSTONE_PREFIX) {
            stale.push(entry.path());
            continue;
        }
        if parse_version(&name).is_some() {
            let tombstone = root.join(format!(
                "{STORE_TOMBSTONE_PREFIX}{name}-{}",
                uuid::Uuid::new_v4()
            ));
            if let Err(err) = async_fs::rename(entry.path(), &tombstone).await {
                warn!(
                    error = %err,
                    path = %entry.path().display(),
                    "failed to tombstone old cache dir"
                );
                continue;
            }
            stale.push(tombstone);
        }
    }

    Ok((active_dir, stale))
}

fn spawn_dir_cleanup(dirs: Vec<PathBuf>) {
    for dir in dirs {
        tokio::spawn(async move {
            match async_fs::remove_dir_all(&dir).await {
                Ok(()) => crate::metrics::record_cache_cleanup_dir(),
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => {
                    warn!(
                        error = %err,
                        path = %dir.display(),
                        "failed to remove old cache dir"
                    );
                }
            }
        });
    }
}
