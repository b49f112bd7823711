use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, Parser)]
#[command(name = "tiercache", about = "Inspect and maintain a tiercache response cache")]
pub struct Cli {
    /// Path to the configuration file (defaults to ./tiercache.toml if present).
    #[arg(long)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Print disk and memory usage.
    Stats,
    /// Evict least recently used entries until the disk tier fits its capacity.
    Evict,
    /// Delete every cached entry and the persisted index.
    Clear,
    /// Report whether a URL has a cached response.
    Check { url: Url },
    /// Print the cache metrics in Prometheus text format after opening the cache.
    Metrics,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Text,
}
