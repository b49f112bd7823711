#![no_main]

use std::time::{Duration, SystemTime};

use http::{HeaderMap, HeaderValue, StatusCode, header};
use libfuzzer_sys::fuzz_target;

use tiercache::cache::{expiration_date, parse_http_date};

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    let payload = &data[1..];
    let split = (data[0] as usize) % (payload.len() + 1);
    let (control, date) = payload.split_at(split);
    let date = String::from_utf8_lossy(date);
    let _ = parse_http_date(date.as_ref());

    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_bytes(control) {
        headers.insert(header::CACHE_CONTROL, value.clone());
        headers.insert(header::PRAGMA, value);
    }
    if let Ok(value) = HeaderValue::from_str(date.as_ref()) {
        headers.insert(header::DATE, value.clone());
        headers.insert(header::EXPIRES, value);
    }

    let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
    if let Some(expires) = expiration_date(StatusCode::OK, &headers, now) {
        assert!(expires > now);
    }
});
