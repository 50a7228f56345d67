// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `MetricsPartition`: the singleton "global" partition that aggregates
//! operation counters and cleanup snapshots across every `RegistryPartition`.
//!
//! Backed by a flat key-value SQLite table, the same storage shape
//! `hdds-persistence::sqlite::SqliteStore` uses for its sample table, just
//! keyed by a string instead of a GUID/timestamp pair.

use crate::error::RpcError;
use crate::time::hour_bucket_now;
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::sync::Mutex;

const STATS_WINDOW_MS: i64 = 3_600_000;
const COUNTER_RETENTION_MS: i64 = 24 * 3_600_000;
const CLEANUP_SNAPSHOT_RETENTION_MS: i64 = 10 * 60_000;

/// A single hour's operation tally, returned by `stats()`.
#[derive(Debug, Clone, Default)]
pub struct OperationCounter {
    pub hour: String,
    pub counts: HashMap<String, u64>,
}

/// The most recent cleanup counts reported by a given partition.
#[derive(Debug, Clone)]
pub struct CleanupSnapshot {
    pub origin_id: String,
    pub expired_colonies: u64,
    pub expired_agents: u64,
    pub recorded_at_ms: i64,
}

/// Singleton partition tracking per-operation counters (bucketed by hour) and
/// the last cleanup snapshot reported by each other partition. Never routes
/// traffic for a specific `mesh_id`; the gateway addresses it directly by the
/// literal id `"global"`.
pub struct MetricsPartition {
    conn: Mutex<Connection>,
}

impl MetricsPartition {
    pub fn open(conn: Connection) -> Result<Self, RpcError> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Increment the counter for `operation` in the current hour bucket.
    /// Fire-and-forget from the gateway's perspective: a failure here must
    /// never fail the RPC it's tracking.
    pub fn track(&self, operation: &str) -> Result<(), RpcError> {
        let hour = hour_bucket_now();
        let key = format!("count:{operation}:{hour}");
        let conn = self.conn.lock().expect("metrics connection poisoned");
        conn.execute(
            "INSERT INTO metrics_kv (key, value) VALUES (?1, '1')
             ON CONFLICT(key) DO UPDATE SET value = CAST(CAST(value AS INTEGER) + 1 AS TEXT)",
            params![key],
        )?;
        Ok(())
    }

    /// Record the cleanup counts a `RegistryPartition` just observed.
    pub fn report_cleanup(
        &self,
        origin_id: &str,
        expired_colonies: u64,
        expired_agents: u64,
        recorded_at_ms: i64,
    ) -> Result<(), RpcError> {
        let key = format!("cleanup:{origin_id}");
        let value = format!("{expired_colonies}:{expired_agents}:{recorded_at_ms}");
        let conn = self.conn.lock().expect("metrics connection poisoned");
        conn.execute(
            "INSERT INTO metrics_kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    /// All operation counters recorded for `hour` (an `hour_bucket` string).
    pub fn stats_for_hour(&self, hour: &str) -> Result<OperationCounter, RpcError> {
        let conn = self.conn.lock().expect("metrics connection poisoned");
        let mut stmt = conn.prepare("SELECT key, value FROM metrics_kv WHERE key LIKE 'count:%'")?;
        let mut counts = HashMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (key, value) = row?;
            // key shape: count:<operation>:<hour>
            let mut parts = key.splitn(3, ':');
            let _ = parts.next();
            let Some(operation) = parts.next() else {
                continue;
            };
            let Some(key_hour) = parts.next() else {
                continue;
            };
            if key_hour != hour {
                continue;
            }
            let count: u64 = value.parse().unwrap_or(0);
            counts.insert(operation.to_string(), count);
        }
        Ok(OperationCounter {
            hour: hour.to_string(),
            counts,
        })
    }

    /// Per-operation counts summed over every hour bucket whose start falls
    /// within the last hour, for `/stats`.
    pub fn stats(&self, now_ms: i64) -> Result<HashMap<String, u64>, RpcError> {
        let cutoff = now_ms - STATS_WINDOW_MS;
        let conn = self.conn.lock().expect("metrics connection poisoned");
        let mut stmt = conn.prepare("SELECT key, value FROM metrics_kv WHERE key LIKE 'count:%'")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut totals = HashMap::new();
        for row in rows {
            let (key, value) = row?;
            let mut parts = key.splitn(3, ':');
            let _ = parts.next();
            let (Some(operation), Some(hour)) = (parts.next(), parts.next()) else {
                continue;
            };
            let Some(bucket_start) = hour_bucket_start_ms(hour) else {
                continue;
            };
            if bucket_start < cutoff {
                continue;
            }
            let count: u64 = value.parse().unwrap_or(0);
            *totals.entry(operation.to_string()).or_insert(0u64) += count;
        }
        Ok(totals)
    }

    /// Hourly retention sweep: drop counter buckets older than 24h and
    /// cleanup snapshots older than 10 minutes.
    pub fn retain(&self, now_ms: i64) -> Result<(), RpcError> {
        let counter_cutoff = now_ms - COUNTER_RETENTION_MS;
        let snapshot_cutoff = now_ms - CLEANUP_SNAPSHOT_RETENTION_MS;

        let conn = self.conn.lock().expect("metrics connection poisoned");
        let mut stmt = conn.prepare("SELECT key FROM metrics_kv WHERE key LIKE 'count:%'")?;
        let keys: Vec<String> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        for key in keys {
            let mut parts = key.splitn(3, ':');
            let _ = parts.next();
            let _ = parts.next();
            let Some(hour) = parts.next() else { continue };
            let Some(bucket_start) = hour_bucket_start_ms(hour) else {
                continue;
            };
            if bucket_start < counter_cutoff {
                conn.execute("DELETE FROM metrics_kv WHERE key = ?1", params![key])?;
            }
        }

        let mut stmt = conn.prepare("SELECT key, value FROM metrics_kv WHERE key LIKE 'cleanup:%'")?;
        let snapshots: Vec<(String, String)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<_>>()?;
        for (key, value) in snapshots {
            let recorded_at: i64 = value.rsplit(':').next().and_then(|v| v.parse().ok()).unwrap_or(0);
            if recorded_at < snapshot_cutoff {
                conn.execute("DELETE FROM metrics_kv WHERE key = ?1", params![key])?;
            }
        }
        Ok(())
    }

    /// The last cleanup snapshot reported by `origin_id`, if any.
    pub fn last_cleanup(&self, origin_id: &str) -> Result<Option<CleanupSnapshot>, RpcError> {
        let key = format!("cleanup:{origin_id}");
        let conn = self.conn.lock().expect("metrics connection poisoned");
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM metrics_kv WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.and_then(|v| parse_cleanup_snapshot(origin_id, &v)))
    }

    /// Every cleanup snapshot currently retained, one per partition that has
    /// reported a cleanup pass, surfaced by `/stats` so a caller can observe
    /// a prior cleanup without polling each partition individually.
    pub fn cleanup_snapshots(&self) -> Result<Vec<CleanupSnapshot>, RpcError> {
        let conn = self.conn.lock().expect("metrics connection poisoned");
        let mut stmt = conn.prepare("SELECT key, value FROM metrics_kv WHERE key LIKE 'cleanup:%'")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut snapshots = Vec::new();
        for row in rows {
            let (key, value) = row?;
            let Some(origin_id) = key.strip_prefix("cleanup:") else {
                continue;
            };
            if let Some(snapshot) = parse_cleanup_snapshot(origin_id, &value) {
                snapshots.push(snapshot);
            }
        }
        Ok(snapshots)
    }
}

fn parse_cleanup_snapshot(origin_id: &str, value: &str) -> Option<CleanupSnapshot> {
    let mut parts = value.splitn(3, ':');
    let (Some(colonies), Some(agents), Some(recorded_at)) =
        (parts.next(), parts.next(), parts.next())
    else {
        return None;
    };
    Some(CleanupSnapshot {
        origin_id: origin_id.to_string(),
        expired_colonies: colonies.parse().unwrap_or(0),
        expired_agents: agents.parse().unwrap_or(0),
        recorded_at_ms: recorded_at.parse().unwrap_or(0),
    })
}

/// Parses an `hour_bucket` string (`%Y-%m-%dT%H`) into its start time in
/// milliseconds since the epoch.
fn hour_bucket_start_ms(hour: &str) -> Option<i64> {
    NaiveDateTime::parse_from_str(&format!("{hour}:00:00"), "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|dt| dt.and_utc().timestamp_millis())
}

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS metrics_kv (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_test_metrics() -> MetricsPartition {
        MetricsPartition::open(Connection::open_in_memory().unwrap()).unwrap()
    }

    #[test]
    fn test_track_increments_counter() {
        let metrics = open_test_metrics();
        metrics.track("RegisterColony").unwrap();
        metrics.track("RegisterColony").unwrap();
        metrics.track("LookupColony").unwrap();

        let hour = hour_bucket_now();
        let stats = metrics.stats_for_hour(&hour).unwrap();
        assert_eq!(stats.counts.get("RegisterColony"), Some(&2));
        assert_eq!(stats.counts.get("LookupColony"), Some(&1));
    }

    #[test]
    fn test_report_and_read_cleanup_snapshot() {
        let metrics = open_test_metrics();
        assert!(metrics.last_cleanup("m1").unwrap().is_none());

        metrics.report_cleanup("m1", 3, 7, 1_700_000_000_000).unwrap();
        let snapshot = metrics.last_cleanup("m1").unwrap().unwrap();
        assert_eq!(snapshot.expired_colonies, 3);
        assert_eq!(snapshot.expired_agents, 7);
        assert_eq!(snapshot.recorded_at_ms, 1_700_000_000_000);

        metrics.report_cleanup("m1", 1, 0, 1_700_000_100_000).unwrap();
        let snapshot = metrics.last_cleanup("m1").unwrap().unwrap();
        assert_eq!(snapshot.expired_colonies, 1);
        assert_eq!(snapshot.expired_agents, 0);
    }

    #[test]
    fn test_stats_for_hour_ignores_other_hours() {
        let metrics = open_test_metrics();
        metrics.track("RegisterColony").unwrap();
        let stats = metrics.stats_for_hour("1999-01-01T00").unwrap();
        assert!(stats.counts.is_empty());
    }

    #[test]
    fn test_stats_sums_buckets_within_last_hour() {
        let metrics = open_test_metrics();
        let now = 1_700_003_600_000; // 2023-11-14T23:33:20Z
        let recent_hour = crate::time::hour_bucket(now);
        let stale_hour = crate::time::hour_bucket(now - 2 * 3_600_000);

        metrics
            .conn
            .lock()
            .unwrap()
            .execute(
                "INSERT INTO metrics_kv (key, value) VALUES (?1, '5'), (?2, '9')",
                params![
                    format!("count:RegisterColony:{recent_hour}"),
                    format!("count:RegisterColony:{stale_hour}")
                ],
            )
            .unwrap();

        let stats = metrics.stats(now).unwrap();
        assert_eq!(stats.get("RegisterColony"), Some(&5));
    }

    #[test]
    fn test_cleanup_snapshots_lists_every_reporting_partition() {
        let metrics = open_test_metrics();
        assert!(metrics.cleanup_snapshots().unwrap().is_empty());

        metrics.report_cleanup("mesh-a", 2, 1, 1_700_000_000_000).unwrap();
        metrics.report_cleanup("mesh-b", 0, 4, 1_700_000_050_000).unwrap();

        let mut snapshots = metrics.cleanup_snapshots().unwrap();
        snapshots.sort_by(|a, b| a.origin_id.cmp(&b.origin_id));
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].origin_id, "mesh-a");
        assert_eq!(snapshots[0].expired_colonies, 2);
        assert_eq!(snapshots[1].origin_id, "mesh-b");
        assert_eq!(snapshots[1].expired_agents, 4);
    }

    #[test]
    fn test_retain_drops_old_counters_and_snapshots() {
        let metrics = open_test_metrics();
        let now = 1_700_003_600_000;
        let old_hour = crate::time::hour_bucket(now - 2 * COUNTER_RETENTION_MS);

        metrics
            .conn
            .lock()
            .unwrap()
            .execute(
                "INSERT INTO metrics_kv (key, value) VALUES (?1, '1')",
                params![format!("count:RegisterColony:{old_hour}")],
            )
            .unwrap();
        metrics
            .report_cleanup("m1", 1, 0, now - 2 * CLEANUP_SNAPSHOT_RETENTION_MS)
            .unwrap();
        metrics.report_cleanup("m2", 1, 0, now).unwrap();

        metrics.retain(now).unwrap();

        assert!(metrics.stats(now).unwrap().is_empty());
        assert!(metrics.last_cleanup("m1").unwrap().is_none());
        assert!(metrics.last_cleanup("m2").unwrap().is_some());
    }
}
