// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `PartitionDirectory`: owns the lazily-created `RegistryPartition` for each
//! `mesh_id` and the single `MetricsPartition`, and spawns each partition's
//! cleanup alarm, mirroring the lease-checker `tokio::spawn` loop in
//! `hdds-discovery-server::server::DiscoveryServer::run`.

pub mod metrics;
pub mod registry;

use crate::error::RpcError;
use metrics::MetricsPartition;
use registry::RegistryPartition;
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, RwLock, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

const METRICS_PARTITION_ID: &str = "global";

/// Sanitizes a `mesh_id` into a filesystem-safe, stable partition id. The
/// sanitized id *is* the partition id: equal names yield equal ids across
/// restarts, with no hashing involved.
pub fn id_from_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Directory of all live partitions. Holds a `Weak` reference to itself so a
/// spawned cleanup task can report back to it without holding a strong
/// reference that would keep the directory alive forever.
pub struct PartitionDirectory {
    data_dir: PathBuf,
    default_ttl: Duration,
    cleanup_interval: Duration,
    service_version: String,
    registries: RwLock<HashMap<String, Arc<RegistryPartition>>>,
    metrics: Arc<MetricsPartition>,
    self_weak: OnceLock<Weak<PartitionDirectory>>,
}

impl PartitionDirectory {
    pub fn new(
        data_dir: PathBuf,
        default_ttl: Duration,
        cleanup_interval: Duration,
        service_version: String,
    ) -> Result<Arc<Self>, RpcError> {
        std::fs::create_dir_all(&data_dir)
            .map_err(|e| RpcError::internal(format!("creating data dir: {e}")))?;

        let metrics_conn = open_connection(&data_dir, METRICS_PARTITION_ID)?;
        let metrics = Arc::new(MetricsPartition::open(metrics_conn)?);

        let directory = Arc::new(Self {
            data_dir,
            default_ttl,
            cleanup_interval,
            service_version,
            registries: RwLock::new(HashMap::new()),
            metrics,
            self_weak: OnceLock::new(),
        });
        let _ = directory.self_weak.set(Arc::downgrade(&directory));
        directory.spawn_metrics_retention();
        Ok(directory)
    }

    /// Hourly alarm: flush pending counts (tracked synchronously already),
    /// then drop counter buckets and cleanup snapshots past their retention
    /// window.
    fn spawn_metrics_retention(self: &Arc<Self>) {
        let metrics = Arc::clone(&self.metrics);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(3600));
            loop {
                ticker.tick().await;
                if let Err(err) = metrics.retain(crate::time::now_ms()) {
                    warn!(error = %err, "metrics retention sweep failed");
                }
            }
        });
    }

    pub fn metrics(&self) -> Arc<MetricsPartition> {
        Arc::clone(&self.metrics)
    }

    /// Sum of non-expired colony records across every currently loaded
    /// partition, for `/health`. Partitions that have never been touched
    /// this process lifetime are not opened just to be counted.
    pub fn total_colonies(&self) -> Result<u64, RpcError> {
        let registries = self.registries.read().unwrap();
        let mut total = 0u64;
        for partition in registries.values() {
            total += partition.count()?.colonies;
        }
        Ok(total)
    }

    /// Returns the `RegistryPartition` for `mesh_id`, opening it (and
    /// spawning its cleanup alarm) on first access.
    pub fn registry_for(&self, mesh_id: &str) -> Result<Arc<RegistryPartition>, RpcError> {
        let id = id_from_name(mesh_id);
        if id == METRICS_PARTITION_ID {
            return Err(RpcError::invalid_argument(
                "meshId \"global\" is reserved for the metrics partition",
            ));
        }

        if let Some(existing) = self.registries.read().unwrap().get(&id) {
            return Ok(Arc::clone(existing));
        }

        let mut registries = self.registries.write().unwrap();
        if let Some(existing) = registries.get(&id) {
            return Ok(Arc::clone(existing));
        }

        debug!(partition_id = %id, "opening registry partition");
        let conn = open_connection(&self.data_dir, &id)?;
        let partition = Arc::new(RegistryPartition::open(
            &id,
            conn,
            self.default_ttl,
            self.service_version.clone(),
        )?);

        self.spawn_cleanup_alarm(Arc::clone(&partition));
        registries.insert(id, Arc::clone(&partition));
        Ok(partition)
    }

    fn spawn_cleanup_alarm(&self, partition: Arc<RegistryPartition>) {
        let interval = self.cleanup_interval;
        let weak_directory = self
            .self_weak
            .get()
            .cloned()
            .expect("self_weak set in PartitionDirectory::new");

        tokio::spawn(async move {
            // Fire immediately so a prior process lifetime's overdue cleanup
            // runs before the first scheduled tick.
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match partition.cleanup() {
                    Ok(counts) if counts.any() => {
                        info!(
                            partition_id = partition.id(),
                            expired_colonies = counts.expired_colonies,
                            expired_agents = counts.expired_agents,
                            "cleanup pass expired records"
                        );
                        if let Some(directory) = weak_directory.upgrade() {
                            let now = crate::time::now_ms();
                            if let Err(err) = directory.metrics().report_cleanup(
                                partition.id(),
                                counts.expired_colonies,
                                counts.expired_agents,
                                now,
                            ) {
                                warn!(error = %err, "failed to report cleanup snapshot to metrics partition");
                            }
                        }
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!(partition_id = partition.id(), error = %err, "cleanup pass failed");
                    }
                }
            }
        });
    }
}

fn open_connection(data_dir: &Path, id: &str) -> Result<Connection, RpcError> {
    let path = data_dir.join(format!("{id}.sqlite"));
    Connection::open(&path)
        .map_err(|e| RpcError::internal(format!("opening {}: {e}", path.display())))
}
