use std::time::{Duration, SystemTime};

use http::{HeaderMap, StatusCode};

const DEFAULT_FRESHNESS: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheControl {
    pub no_cache: bool,
    pub no_store: bool,
    pub max_age: Option<i64>,
}

pub fn parse_cache_control(headers: &HeaderMap) -> CacheControl {
    let mut cc = CacheControl::default();

    for value in headers.get_all(http::header::CACHE_CONTROL) {
        if let Ok(s) = value.to_str() {
            for part in s.split(',') {
                let part = part.trim();
                if part.eq_ignore_ascii_case("no-cache") {
                    cc.no_cache = true;
                } else if part.eq_ignore_ascii_case("no-store") {
                    cc.no_store = true;
                } else if let Some((name, value)) = part.split_once('=')
                    && name.trim().eq_ignore_ascii_case("max-age")
                    && let Ok(secs) = value.trim().trim_matches('"').parse::<i64>()
                {
                    cc.max_age = Some(secs);
                }
            }
        }
    }
    cc
}

fn pragma_no_cache(headers: &HeaderMap) -> bool {
    headers
        .get_all(http::header::PRAGMA)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|token| token.trim().eq_ignore_ascii_case("no-cache"))
}

/// Parses an HTTP date in RFC 1123, RFC 850 or asctime form. Anything else is `None`.
pub fn parse_http_date(value: &str) -> Option<SystemTime> {
    let value = value.trim();
    if let Ok(time) = httpdate::parse_http_date(value) {
        return Some(time);
    }

    // asctime with an unpadded day of month ("Sun Nov 6 08:49:37 1994")
    let parts: Vec<&str> = value.split_whitespace().collect();
    if let [weekday, month, day, clock, year] = parts.as_slice()
        && day.len() == 1
    {
        let padded = format!("{weekday} {month} {day:>2} {clock} {year}");
        return httpdate::parse_http_date(&padded).ok();
    }
    None
}

fn header_date(headers: &HeaderMap, name: http::header::HeaderName) -> Option<SystemTime> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_http_date)
}

fn status_is_cacheable(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::OK
            | StatusCode::NON_AUTHORITATIVE_INFORMATION
            | StatusCode::MULTIPLE_CHOICES
            | StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::GONE
    )
}

/// Computes when a response stops being fresh, or `None` when it must not be stored.
///
/// The reference "now" is the response `Date` header when it parses, otherwise
/// `local_now`. `Expires` is interpreted relative to the server clock and re-anchored
/// on `local_now` so clock skew between origin and client does not shorten lifetimes.
/// A result that is not strictly after `local_now` is discarded.
pub fn expiration_date(
    status: StatusCode,
    headers: &HeaderMap,
    local_now: SystemTime,
) -> Option<SystemTime> {
    let expires_at = freshness_deadline(status, headers, local_now)?;
    (expires_at > local_now).then_some(expires_at)
}

fn freshness_deadline(
    status: StatusCode,
    headers: &HeaderMap,
    local_now: SystemTime,
) -> Option<SystemTime> {
    if !status_is_cacheable(status) {
        return None;
    }
    if pragma_no_cache(headers) {
        return None;
    }

    let now = header_date(headers, http::header::DATE).unwrap_or(local_now);

    let cc = parse_cache_control(headers);
    if cc.no_store {
        return None;
    }
    if let Some(max_age) = cc.max_age {
        if max_age <= 0 {
            return None;
        }
        return now.checked_add(Duration::from_secs(max_age as u64));
    }

    if let Some(expires) = headers.get(http::header::EXPIRES) {
        let remote_expiry = expires.to_str().ok().and_then(parse_http_date)?;
        let lifetime = remote_expiry.duration_since(now).ok()?;
        if lifetime.is_zero() {
            return None;
        }
        return local_now.checked_add(lifetime);
    }

    // Redirects without explicit freshness get no heuristic lifetime.
    if matches!(status, StatusCode::FOUND | StatusCode::TEMPORARY_REDIRECT) {
        return None;
    }

    if let Some(last_modified) = header_date(headers, http::header::LAST_MODIFIED) {
        let age = now.duration_since(last_modified).ok()?;
        if age.is_zero() {
            return None;
        }
        return now.checked_add(age / 10);
    }

    now.checked_add(DEFAULT_FRESHNESS)
}
