// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Timestamp helpers shared by the partitions and the gateway.

use chrono::{DateTime, Utc};

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Format a millisecond epoch timestamp as RFC 3339 (e.g. for `expiresAt`, `lastSeen`).
pub fn to_rfc3339(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .unwrap_or_else(|| DateTime::<Utc>::from_timestamp(0, 0).unwrap())
        .to_rfc3339()
}

/// The current UTC hour truncated to an ISO-8601 prefix, e.g. `2026-08-01T14`.
pub fn hour_bucket_now() -> String {
    hour_bucket(now_ms())
}

/// The ISO-8601 hour prefix containing `ms`.
pub fn hour_bucket(ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .unwrap_or_else(|| DateTime::<Utc>::from_timestamp(0, 0).unwrap())
        .format("%Y-%m-%dT%H")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc3339_roundtrip_parses() {
        let ms = 1_700_000_000_000;
        let s = to_rfc3339(ms);
        let parsed = DateTime::parse_from_rfc3339(&s).unwrap();
        assert_eq!(parsed.timestamp_millis(), ms);
    }

    #[test]
    fn test_hour_bucket_format() {
        // 2023-11-14T22:13:20Z
        let bucket = hour_bucket(1_700_000_000_000);
        assert_eq!(bucket, "2023-11-14T22");
    }
}
