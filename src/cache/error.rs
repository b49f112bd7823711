use anyhow::Error;
use thiserror::Error;
use tracing::warn;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
#[error("blob {operation} failed for {key}")]
pub struct StorageError {
    pub operation: &'static str,
    pub key: String,
    #[source]
    pub source: BoxError,
}

impl StorageError {
    pub fn new(operation: &'static str, key: impl Into<String>, source: Error) -> Self {
        Self {
            operation,
            key: key.into(),
            source: source.into(),
        }
    }
}

#[derive(Debug, Error)]
#[error("failed to persist disk index")]
pub struct PersistenceError {
    #[source]
    pub source: BoxError,
}

impl PersistenceError {
    pub fn new(source: Error) -> Self {
        Self {
            source: source.into(),
        }
    }
}

#[derive(Debug, Error)]
#[error("invalid cache configuration: {reason}")]
pub struct ConfigurationError {
    pub reason: String,
}

impl ConfigurationError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Returned when the disk worker has shut down and can no longer accept jobs.
#[derive(Debug, Error)]
#[error("disk worker is not running")]
pub struct WorkerStopped;

pub enum CacheErrorKind<'a> {
    Storage(&'a StorageError),
    Persistence(&'a PersistenceError),
    Configuration(&'a ConfigurationError),
    WorkerStopped,
    Other,
}

impl CacheErrorKind<'_> {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheErrorKind::Storage(_) => "storage",
            CacheErrorKind::Persistence(_) => "persistence",
            CacheErrorKind::Configuration(_) => "configuration",
            CacheErrorKind::WorkerStopped => "worker_stopped",
            CacheErrorKind::Other => "other",
        }
    }
}

pub fn classify_cache_error(err: &Error) -> CacheErrorKind<'_> {
    if let Some(storage) = err.downcast_ref::<StorageError>() {
        CacheErrorKind::Storage(storage)
    } else if let Some(persistence) = err.downcast_ref::<PersistenceError>() {
        CacheErrorKind::Persistence(persistence)
    } else if let Some(config) = err.downcast_ref::<ConfigurationError>() {
        CacheErrorKind::Configuration(config)
    } else if err.downcast_ref::<WorkerStopped>().is_some() {
        CacheErrorKind::WorkerStopped
    } else {
        CacheErrorKind::Other
    }
}

pub fn log_cache_error(context: &'static str, err: &Error) {
    let kind = classify_cache_error(err);
    crate::metrics::record_cache_error(kind.as_str());
    match &kind {
        CacheErrorKind::Storage(storage) => warn!(
            operation = storage.operation,
            key = %storage.key,
            error = %storage.source,
            "{context}: blob store failure"
        ),
        CacheErrorKind::Persistence(persistence) => warn!(
            error = %persistence.source,
            "{context}: disk index was not persisted"
        ),
        _ => warn!(error = %err, kind = kind.as_str(), "{context}"),
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;

    use super::*;

    #[test]
    fn classifies_wrapped_errors() {
        let err: Error = StorageError::new("write", "k", anyhow!("disk full")).into();
        assert!(matches!(classify_cache_error(&err), CacheErrorKind::Storage(s) if s.key == "k"));

        let err: Error = PersistenceError::new(anyhow!("nope")).into();
        assert_eq!(classify_cache_error(&err).as_str(), "persistence");

        let err: Error = ConfigurationError::new("zero capacity").into();
        assert_eq!(classify_cache_error(&err).as_str(), "configuration");
        assert_eq!(err.to_string(), "invalid cache configuration: zero capacity");

        let err = anyhow!("something else");
        assert_eq!(classify_cache_error(&err).as_str(), "other");
    }

    #[test]
    fn storage_error_keeps_its_source() {
        let err = StorageError::new("read", "k", anyhow!("permission denied"));
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("permission denied"));
    }
}
