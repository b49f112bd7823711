use std::time::{Duration, SystemTime};

use anyhow::{Result, anyhow, ensure};
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::{Deserialize, Serialize};

use super::CachedResponse;

/// A response plus the instant it stops being fresh, as held by either tier.
#[derive(Debug, Clone)]
pub(crate) struct StoredResponse {
    pub response: CachedResponse,
    pub expires_at: SystemTime,
}

impl StoredResponse {
    pub(crate) fn is_expired(&self, now: SystemTime) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedHead {
    status: u16,
    /// Header values as raw bytes; values may carry obs-text that is not valid UTF-8.
    headers: Vec<(String, Vec<u8>)>,
    expires_at_ms: u64,
    content_length: u64,
}

/// Layout: 4-byte big-endian head length, JSON head, raw body.
pub(crate) fn encode_record(stored: &StoredResponse) -> Result<Vec<u8>> {
    let head = PersistedHead {
        status: stored.response.status.as_u16(),
        headers: headermap_to_vec(&stored.response.headers),
        expires_at_ms: to_unix_millis(stored.expires_at),
        content_length: stored.response.content_length(),
    };
    let head = serde_json::to_vec(&head)?;
    let head_len = u32::try_from(head.len()).map_err(|_| anyhow!("record head too large"))?;

    let mut out = Vec::with_capacity(4 + head.len() + stored.response.body.len());
    out.extend_from_slice(&head_len.to_be_bytes());
    out.extend_from_slice(&head);
    out.extend_from_slice(&stored.response.body);
    Ok(out)
}

pub(crate) fn decode_record(data: &[u8]) -> Result<StoredResponse> {
    ensure!(data.len() >= 4, "record truncated before head length");
    let (len_bytes, rest) = data.split_at(4);
    let head_len = u32::from_be_bytes([len_bytes[0], len_bytes[1], len_bytes[2], len_bytes[3]]);
    let head_len = head_len as usize;
    ensure!(rest.len() >= head_len, "record truncated inside head");

    let (head, body) = rest.split_at(head_len);
    let head: PersistedHead = serde_json::from_slice(head)?;
    ensure!(
        body.len() as u64 == head.content_length,
        "record body length {} does not match recorded {}",
        body.len(),
        head.content_length
    );

    let status = StatusCode::from_u16(head.status)
        .map_err(|_| anyhow!("record has invalid status {}", head.status))?;
    Ok(StoredResponse {
        response: CachedResponse::new(
            status,
            to_headermap(&head.headers)?,
            Bytes::copy_from_slice(body),
        ),
        expires_at: from_unix_millis(head.expires_at_ms),
    })
}

pub(crate) fn to_unix_millis(time: SystemTime) -> u64 {
    time.duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

pub(crate) fn from_unix_millis(millis: u64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_millis(millis)
}

fn to_headermap(items: &[(String, Vec<u8>)]) -> Result<HeaderMap> {
    let mut map = HeaderMap::with_capacity(items.len());
    for (name, value) in items {
        let name = HeaderName::try_from(name.as_str())
            .map_err(|_| anyhow!("record has invalid header name {name:?}"))?;
        let value = HeaderValue::from_bytes(value)
            .map_err(|_| anyhow!("record has invalid value for header {name}"))?;
        map.append(name, value);
    }
    Ok(map)
}

fn headermap_to_vec(map: &HeaderMap) -> Vec<(String, Vec<u8>)> {
    map.iter()
        .map(|(name, value)| (name.as_str().to_string(), value.as_bytes().to_vec()))
        .collect()
}
