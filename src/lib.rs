pub mod cache;
pub mod cli;
pub mod logging;
pub mod metrics;
pub mod settings;

use std::fmt::Write as _;

use anyhow::Result;
use tracing::info;

use crate::{
    cache::{CacheKey, HttpCache},
    cli::Command,
    settings::Settings,
};

/// Opens the cache described by `settings`, runs one admin command and closes the cache.
/// Returns the text to print.
pub async fn run(command: &Command, settings: &Settings) -> Result<String> {
    let cache = HttpCache::open_dir(settings.cache_config(), &settings.cache_dir).await?;
    let output = run_command(&cache, command).await;
    cache.close().await?;
    output
}

async fn run_command(cache: &HttpCache, command: &Command) -> Result<String> {
    let mut out = String::new();
    match command {
        Command::Stats => {
            let stats = cache.stats().await;
            writeln!(out, "disk entries:  {}", stats.disk_entries)?;
            writeln!(
                out,
                "disk usage:    {} / {} bytes",
                stats.disk_usage, stats.disk_capacity
            )?;
            writeln!(
                out,
                "memory usage:  {} / {} bytes",
                stats.memory_usage, stats.memory_capacity
            )?;
        }
        Command::Evict => {
            let evicted = cache.balance().await?;
            info!(
                removed = evicted.removed,
                bytes = evicted.bytes_reclaimed,
                "manual eviction finished"
            );
            writeln!(
                out,
                "evicted {} entries ({} bytes); disk usage now {} bytes",
                evicted.removed,
                evicted.bytes_reclaimed,
                cache.current_disk_usage().await
            )?;
        }
        Command::Clear => {
            cache.clear().await?;
            writeln!(out, "cache cleared")?;
        }
        Command::Check { url } => {
            let cached = cache.is_cached(url).await;
            let key = CacheKey::for_url(url);
            let state = if cached { "cached" } else { "not cached" };
            writeln!(out, "{url}: {state} ({key})")?;
        }
        Command::Metrics => {
            out.push_str(&String::from_utf8_lossy(&metrics::gather()));
        }
    }
    Ok(out)
}
