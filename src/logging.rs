use anyhow::{Result, anyhow};
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogFormat;

const DEFAULT_FILTER: &str = "info";

pub fn init_logger(format: LogFormat) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    match format {
        LogFormat::Json => fmt::fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(false)
            .with_span_list(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .try_init()
            .map_err(|err| anyhow!(err))?,
        LogFormat::Text => fmt::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .try_init()
            .map_err(|err| anyhow!(err))?,
    }

    Ok(())
}

/// One cache operation, as it appears in the structured log.
#[derive(Debug, Clone, Copy)]
pub struct CacheEvent<'a> {
    /// `get` or `put`.
    pub op: &'static str,
    pub key: &'a str,
    /// `memory`, `disk` or `none`.
    pub tier: &'static str,
    pub outcome: &'static str,
    pub size: Option<u64>,
}

pub fn log_cache_event(event: &CacheEvent<'_>) {
    let CacheEvent {
        op,
        key,
        tier,
        outcome,
        size,
    } = *event;

    tracing::debug!(target = "cache_event", op, key, tier, outcome, size);
}
