use std::sync::Arc;
use std::time::SystemTime;

use anyhow::{Error, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::CacheState;
use super::eviction::EvictionStats;
use super::error::{StorageError, WorkerStopped, log_cache_error};
use super::maintenance::{MaintenanceTask, MaintenanceTicket};

pub(super) type Ack = oneshot::Sender<Result<()>>;

/// Work executed by the disk worker, strictly one job at a time in submission order.
pub(super) enum DiskJob {
    Store {
        key: String,
        data: Vec<u8>,
        done: Ack,
    },
    Remove {
        keys: Vec<String>,
        done: Ack,
    },
    /// Drops an unreadable entry, unless a newer write of the key has replaced it.
    Discard {
        key: String,
        seq: u64,
    },
    Clear {
        done: Ack,
    },
    Balance {
        done: oneshot::Sender<Result<EvictionStats>>,
    },
    /// Persists the index if dirty. Also acts as a barrier for earlier jobs.
    Flush {
        done: Ack,
    },
    Maintenance {
        ticket: MaintenanceTicket,
        task: MaintenanceTask,
    },
}

impl DiskJob {
    fn name(&self) -> &'static str {
        match self {
            DiskJob::Store { .. } => "store",
            DiskJob::Remove { .. } => "remove",
            DiskJob::Discard { .. } => "discard",
            DiskJob::Clear { .. } => "clear",
            DiskJob::Balance { .. } => "balance",
            DiskJob::Flush { .. } => "flush",
            DiskJob::Maintenance { .. } => "maintenance",
        }
    }
}

#[derive(Debug, Clone)]
pub(super) struct DiskQueue {
    tx: mpsc::UnboundedSender<DiskJob>,
}

impl DiskQueue {
    pub(super) fn channel() -> (Self, mpsc::UnboundedReceiver<DiskJob>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub(super) fn submit(&self, job: DiskJob) -> Result<()> {
        self.tx.send(job).map_err(|_| Error::from(WorkerStopped))
    }

    /// Submits the job built around a fresh ack and waits for the worker to answer.
    pub(super) async fn call(&self, build: impl FnOnce(Ack) -> DiskJob) -> Result<()> {
        let (done, answer) = oneshot::channel();
        self.submit(build(done))?;
        answer.await.map_err(|_| Error::from(WorkerStopped))?
    }
}

pub(super) fn spawn_disk_worker(
    state: Arc<CacheState>,
    mut jobs: mpsc::UnboundedReceiver<DiskJob>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(job) = jobs.recv().await {
            state.run_job(job).await;
        }
        debug!("disk worker stopped");
    })
}

impl CacheState {
    pub(super) async fn run_job(&self, job: DiskJob) {
        trace!(job = job.name(), "running disk job");
        match job {
            DiskJob::Store { key, data, done } => {
                let _ = done.send(self.store_entry(&key, &data).await);
            }
            DiskJob::Remove { keys, done } => {
                let _ = done.send(self.remove_entries(&keys).await);
            }
            DiskJob::Discard { key, seq } => {
                if let Err(err) = self.discard_entry(&key, seq).await {
                    log_cache_error("disk discard", &err);
                }
            }
            DiskJob::Clear { done } => {
                let _ = done.send(self.clear_disk().await);
            }
            DiskJob::Balance { done } => {
                let _ = done.send(self.balance_disk_usage().await);
            }
            DiskJob::Flush { done } => {
                let _ = done.send(self.flush_index().await);
            }
            DiskJob::Maintenance { ticket, task } => {
                if !ticket.try_start() {
                    trace!(task = task.as_str(), "skipping superseded maintenance");
                    return;
                }
                let result = match task {
                    MaintenanceTask::Evict => self.balance_disk_usage().await.map(|_| ()),
                    MaintenanceTask::Persist => self.flush_index().await,
                };
                crate::metrics::record_maintenance_run(task.as_str());
                if let Err(err) = result {
                    log_cache_error("maintenance", &err);
                }
            }
        }
    }

    /// Writes the blob, then records it in the index. The index is only touched once the
    /// blob write has succeeded.
    async fn store_entry(&self, key: &str, data: &[u8]) -> Result<()> {
        self.store
            .put(key, data)
            .await
            .map_err(|err| StorageError::new("write", key, err))?;

        let over_capacity = {
            let mut index = self.index().await.lock();
            index.put(key.to_string(), data.len() as u64, SystemTime::now());
            crate::metrics::set_disk_usage(index.usage());
            index.usage() > self.config.disk_capacity
        };

        let housekeeping = if over_capacity {
            self.balance_disk_usage().await.map(|_| ())
        } else {
            self.persist_index().await
        };
        if let Err(err) = housekeeping {
            log_cache_error("disk store", &err);
        }
        Ok(())
    }

    async fn remove_entries(&self, keys: &[String]) -> Result<()> {
        let removed = {
            let mut index = self.index().await.lock();
            let removed = index.remove(keys);
            crate::metrics::set_disk_usage(index.usage());
            removed
        };
        if removed.is_empty() {
            return Ok(());
        }
        for (key, _) in &removed {
            if let Err(err) = self.store.delete(key).await {
                log_cache_error("disk remove", &StorageError::new("delete", key, err).into());
            }
        }
        self.persist_index().await
    }

    async fn discard_entry(&self, key: &str, seq: u64) -> Result<()> {
        let removed = {
            let mut index = self.index().await.lock();
            let removed = index.remove_if_seq_matches(key, seq);
            crate::metrics::set_disk_usage(index.usage());
            removed
        };
        if removed.is_none() {
            trace!(key, "entry rewritten since it was read; keeping it");
            return Ok(());
        }
        if let Err(err) = self.store.delete(key).await {
            log_cache_error("disk discard", &StorageError::new("delete", key, err).into());
        }
        self.persist_index().await
    }

    async fn clear_disk(&self) -> Result<()> {
        {
            let mut index = self.index().await.lock();
            index.reset();
        }
        crate::metrics::set_disk_usage(0);
        if let Err(err) = self.store.clear().await {
            // leave an empty record behind so a restart does not resurrect the old index
            if let Err(persist_err) = self.persist_index().await {
                log_cache_error("clear", &persist_err);
            }
            return Err(StorageError::new("clear", "*", err).into());
        }
        debug!("disk tier cleared");
        Ok(())
    }

    async fn flush_index(&self) -> Result<()> {
        let dirty = self.index().await.lock().is_dirty();
        if dirty {
            self.persist_index().await
        } else {
            Ok(())
        }
    }
}
