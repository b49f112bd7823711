use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, bail, ensure};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::cache::{self, CacheConfig};
use crate::cli::{Cli, LogFormat};

fn default_log_format() -> LogFormat {
    LogFormat::Text
}

fn default_memory_capacity() -> u64 {
    cache::config::DEFAULT_MEMORY_CAPACITY
}

fn default_disk_capacity() -> u64 {
    cache::config::DEFAULT_DISK_CAPACITY
}

fn default_min_disk_item_interval() -> u64 {
    cache::config::DEFAULT_MIN_DISK_ITEM_INTERVAL.as_secs()
}

fn default_max_memory_item_interval() -> u64 {
    cache::config::DEFAULT_MAX_MEMORY_ITEM_INTERVAL.as_secs()
}

fn default_max_memory_item_size() -> u64 {
    cache::config::DEFAULT_MAX_MEMORY_ITEM_SIZE
}

fn default_allow_disk_for_memory_only() -> bool {
    true
}

fn default_maintenance_interval() -> u64 {
    cache::config::DEFAULT_MAINTENANCE_INTERVAL.as_secs()
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub cache_dir: PathBuf,
    #[serde(default = "default_log_format")]
    pub log: LogFormat,
    #[serde(default = "default_memory_capacity")]
    pub memory_capacity: u64,
    #[serde(default = "default_disk_capacity")]
    pub disk_capacity: u64,
    /// Seconds.
    #[serde(default = "default_min_disk_item_interval")]
    pub min_disk_item_interval: u64,
    /// Seconds.
    #[serde(default = "default_max_memory_item_interval")]
    pub max_memory_item_interval: u64,
    #[serde(default = "default_max_memory_item_size")]
    pub max_memory_item_size: u64,
    #[serde(default = "default_allow_disk_for_memory_only")]
    pub allow_disk_for_memory_only: bool,
    /// Seconds.
    #[serde(default = "default_maintenance_interval")]
    pub maintenance_interval: u64,
}

impl Settings {
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut builder = Config::builder();
        let config_path = resolve_config_path(cli)?;

        builder = builder.add_source(File::from(config_path.clone()).required(true));

        builder = builder.add_source(
            Environment::with_prefix("TIERCACHE")
                .separator("__")
                .try_parsing(true),
        );

        let cfg = builder.build().map_err(to_anyhow)?;
        let mut settings: Settings = cfg.try_deserialize().map_err(to_anyhow)?;
        settings.apply_base_dir(&config_path);
        settings.validate()?;
        Ok(settings)
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            memory_capacity: self.memory_capacity,
            disk_capacity: self.disk_capacity,
            min_disk_item_interval: Duration::from_secs(self.min_disk_item_interval),
            max_memory_item_interval: Duration::from_secs(self.max_memory_item_interval),
            max_memory_item_size: self.max_memory_item_size,
            allow_disk_for_memory_only: self.allow_disk_for_memory_only,
            maintenance_interval: Duration::from_secs(self.maintenance_interval),
        }
    }

    fn apply_base_dir(&mut self, config_path: &Path) {
        let base_dir = config_path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        self.cache_dir = absolutize(&self.cache_dir, base_dir);
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.disk_capacity > 0,
            "disk_capacity must be greater than 0 (got {})",
            self.disk_capacity
        );
        ensure!(
            self.memory_capacity > 0,
            "memory_capacity must be greater than 0 (got {})",
            self.memory_capacity
        );
        ensure!(
            self.maintenance_interval > 0,
            "maintenance_interval must be greater than 0 seconds (got {})",
            self.maintenance_interval
        );
        if self.cache_dir.as_os_str().is_empty() {
            bail!("cache_dir must not be empty");
        }
        Ok(())
    }
}

fn to_anyhow(err: ConfigError) -> anyhow::Error {
    anyhow::anyhow!(err)
}

impl Cli {
    pub fn config_path(&self) -> Option<&Path> {
        self.config.as_deref()
    }
}

fn resolve_config_path(cli: &Cli) -> Result<PathBuf> {
    if let Some(path) = cli.config_path() {
        return Ok(path.to_path_buf());
    }

    for candidate in default_config_candidates() {
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    bail!(
        "no configuration file provided via --config and none found in default locations: {}",
        default_config_candidates()
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );
}

fn default_config_candidates() -> [PathBuf; 2] {
    [
        PathBuf::from("/etc/tiercache/tiercache.toml"),
        PathBuf::from("tiercache.toml"),
    ]
}

fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
