use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use url::Url;

/// How a request wants the cache to treat it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestCachePolicy {
    #[default]
    UseProtocolCachePolicy,
    /// Skip lookups and never store the response.
    ReloadIgnoringCache,
}

/// Where the origin (or the caller) allows a response to be retained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoragePolicy {
    #[default]
    Allowed,
    AllowedInMemoryOnly,
    NotAllowed,
}

#[derive(Debug, Clone)]
pub struct CacheRequest {
    pub url: Url,
    pub cache_policy: RequestCachePolicy,
}

impl CacheRequest {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            cache_policy: RequestCachePolicy::default(),
        }
    }

    pub fn with_cache_policy(mut self, cache_policy: RequestCachePolicy) -> Self {
        self.cache_policy = cache_policy;
        self
    }

    pub(crate) fn bypasses_cache(&self) -> bool {
        self.cache_policy == RequestCachePolicy::ReloadIgnoringCache
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub storage_policy: StoragePolicy,
}

impl CachedResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
            storage_policy: StoragePolicy::default(),
        }
    }

    pub fn with_storage_policy(mut self, storage_policy: StoragePolicy) -> Self {
        self.storage_policy = storage_policy;
        self
    }

    pub fn content_length(&self) -> u64 {
        self.body.len() as u64
    }
}
