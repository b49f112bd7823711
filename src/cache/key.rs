use url::Url;

use super::CacheRequest;

/// Namespace for keys. Bump it whenever the encoded record layout changes; entries written
/// under an older tag simply stop matching and age out through eviction.
pub(crate) const KEY_VERSION_TAG: &str = "tiercache-r1";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn for_url(url: &Url) -> Self {
        let canonical = canonical_url(url);
        let escaped = urlencoding::encode(canonical.as_str());
        Self(format!("{KEY_VERSION_TAG}_{escaped}"))
    }

    pub fn for_request(request: &CacheRequest) -> Self {
        Self::for_url(&request.url)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Returns the URL with any fragment removed.
pub fn canonical_url(url: &Url) -> Url {
    if url.fragment().is_none() {
        return url.clone();
    }
    let mut canonical = url.clone();
    canonical.set_fragment(None);
    canonical
}

/// Returns a copy of the request addressing the canonical URL.
pub fn canonicalize(request: &CacheRequest) -> CacheRequest {
    CacheRequest {
        url: canonical_url(&request.url),
        cache_policy: request.cache_policy,
    }
}
