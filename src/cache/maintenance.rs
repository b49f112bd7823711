use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

use super::CacheState;
use super::worker::{DiskJob, DiskQueue};

const PENDING: u8 = 0;
const RUNNING: u8 = 1;
const CANCELLED: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum MaintenanceTask {
    Evict,
    Persist,
}

impl MaintenanceTask {
    pub(super) fn as_str(self) -> &'static str {
        match self {
            MaintenanceTask::Evict => "evict",
            MaintenanceTask::Persist => "persist",
        }
    }
}

/// Shared between the scheduler and the queued job. Exactly one of `try_start` and
/// `cancel` wins.
#[derive(Debug, Clone)]
pub(super) struct MaintenanceTicket {
    state: Arc<AtomicU8>,
}

impl MaintenanceTicket {
    fn new() -> Self {
        Self {
            state: Arc::new(AtomicU8::new(PENDING)),
        }
    }

    pub(super) fn try_start(&self) -> bool {
        self.transition(RUNNING)
    }

    fn cancel(&self) -> bool {
        self.transition(CANCELLED)
    }

    fn transition(&self, to: u8) -> bool {
        self.state
            .compare_exchange(PENDING, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Decides on every tick whether the disk tier needs eviction or just a persist, keeping at
/// most one such job pending at a time.
#[derive(Debug, Default)]
pub(super) struct MaintenanceScheduler {
    pending: Option<MaintenanceTicket>,
}

impl MaintenanceScheduler {
    pub(super) async fn tick(
        &mut self,
        state: &CacheState,
        queue: &DiskQueue,
    ) -> Result<Option<MaintenanceTask>> {
        if let Some(previous) = self.pending.take()
            && previous.cancel()
        {
            crate::metrics::record_maintenance_coalesced();
            trace!("cancelled maintenance left pending by the previous tick");
        }

        let task = {
            let index = state.index().await.lock();
            if index.usage() > state.config.disk_capacity {
                Some(MaintenanceTask::Evict)
            } else if index.is_dirty() {
                Some(MaintenanceTask::Persist)
            } else {
                None
            }
        };
        let Some(task) = task else {
            return Ok(None);
        };

        let ticket = MaintenanceTicket::new();
        queue.submit(DiskJob::Maintenance {
            ticket: ticket.clone(),
            task,
        })?;
        self.pending = Some(ticket);
        Ok(Some(task))
    }
}

pub(super) fn spawn_maintenance(
    state: Arc<CacheState>,
    queue: DiskQueue,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut scheduler = MaintenanceScheduler::default();
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(err) = scheduler.tick(&state, &queue).await {
                debug!(error = %err, "maintenance scheduler stopping");
                break;
            }
        }
    })
}
