// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `RegistryPartition`: the single owner of colony/agent state for one `mesh_id`.
//!
//! Mirrors the storage approach `hdds-persistence::sqlite::SqliteStore` uses for
//! DDS samples: a `rusqlite::Connection` behind a `Mutex`, schema created on open,
//! JSON-serialized columns for the structured fields.

use crate::error::RpcError;
use crate::net::is_private;
use crate::time::{now_ms, to_rfc3339};
use crate::wire::{
    LookupAgentResponse, LookupColonyResponse, ObservedEndpoint, PublicEndpoint,
    RegisterAgentRequest, RegisterColonyRequest, RegisterResponse,
};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A registered colony: identity, reachability, and lease bookkeeping.
#[derive(Debug, Clone)]
pub struct ColonyRecord {
    pub mesh_id: String,
    pub pubkey: String,
    pub endpoints: Vec<String>,
    pub mesh_ipv4: Option<String>,
    pub mesh_ipv6: Option<String>,
    pub connect_port: Option<u16>,
    pub public_port: Option<u16>,
    pub metadata: HashMap<String, String>,
    pub observed_endpoint: Option<ObservedEndpoint>,
    pub public_endpoint: Option<PublicEndpoint>,
    pub nat_hint: i64,
    pub created_at: i64,
    pub updated_at: i64,
    pub expires_at: i64,
}

/// A registered agent: identity, reachability, and lease bookkeeping, scoped
/// to the colony's `mesh_id`.
#[derive(Debug, Clone)]
pub struct AgentRecord {
    pub agent_id: String,
    pub mesh_id: String,
    pub pubkey: String,
    pub endpoints: Vec<String>,
    pub observed_endpoint: Option<ObservedEndpoint>,
    pub metadata: HashMap<String, String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub expires_at: i64,
}

/// Counts produced by a cleanup pass, reported to the `MetricsPartition`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CleanupCounts {
    pub expired_colonies: u64,
    pub expired_agents: u64,
}

impl CleanupCounts {
    pub fn any(&self) -> bool {
        self.expired_colonies > 0 || self.expired_agents > 0
    }
}

/// Non-expired record counts, for `health()`/`count()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistryCounts {
    pub colonies: u64,
    pub agents: u64,
}

#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub status: &'static str,
    pub version: String,
    pub uptime_seconds: u64,
    pub registered_colonies: u64,
}

/// Read-through cache keyed by lookup kind; invalidated on upsert and on any
/// cleanup pass that deleted records. Entries store the already-serialized
/// record plus its `expires_at` so a cache hit still honors TTL expiry.
#[derive(Debug, Default)]
struct ReadCache {
    colonies: HashMap<String, (ColonyRecord, i64)>,
    agents: HashMap<String, (AgentRecord, i64)>,
}

/// Single-owner, serialized-access container for one `mesh_id`'s colony and
/// agent records. All state-mutating methods take `&self` and serialize
/// internally via the connection mutex, so callers never need to coordinate
/// locking across colony and agent operations on the same partition.
#[derive(Debug)]
pub struct RegistryPartition {
    id: String,
    conn: Mutex<Connection>,
    cache: Mutex<ReadCache>,
    started_at: Instant,
    default_ttl: Duration,
    service_version: String,
}

impl RegistryPartition {
    pub fn open(
        id: &str,
        conn: Connection,
        default_ttl: Duration,
        service_version: String,
    ) -> Result<Self, RpcError> {
        init_schema(&conn)?;
        Ok(Self {
            id: id.to_string(),
            conn: Mutex::new(conn),
            cache: Mutex::new(ReadCache::default()),
            started_at: Instant::now(),
            default_ttl,
            service_version,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Register or update a colony: validates meshId/pubkey and that at least
    /// one reachability hint is present, rejects a pubkey that doesn't match
    /// an existing registration for this mesh, synthesizes the observed
    /// endpoint from the transport-seen IP, and upserts the row with a fresh
    /// TTL while preserving the original `created_at`.
    pub fn register_colony(
        &self,
        req: RegisterColonyRequest,
        observed_ip: Option<IpAddr>,
    ) -> Result<RegisterResponse, RpcError> {
        let mesh_id = non_empty(req.mesh_id.as_deref())
            .ok_or_else(|| RpcError::invalid_argument("meshId is required"))?;
        let pubkey = non_empty(req.pubkey.as_deref())
            .ok_or_else(|| RpcError::invalid_argument("pubkey is required"))?;
        if req.endpoints.is_empty() && req.observed_endpoint.is_none() {
            return Err(RpcError::invalid_argument(
                "at least one of endpoints or observedEndpoint is required",
            ));
        }

        let conn = self.conn.lock().expect("registry connection poisoned");

        let existing = load_colony_row(&conn, mesh_id)?;
        if let Some(existing) = &existing {
            if existing.pubkey != pubkey {
                return Err(RpcError::already_exists(format!(
                    "mesh {mesh_id} is already registered under a different key"
                )));
            }
        }

        let observed_endpoint = synthesize_observed_endpoint(req.observed_endpoint, observed_ip);

        let now = now_ms();
        let created_at = existing.as_ref().map(|r| r.created_at).unwrap_or(now);
        let expires_at = now + self.default_ttl.as_millis() as i64;

        let record = ColonyRecord {
            mesh_id: mesh_id.to_string(),
            pubkey: pubkey.to_string(),
            endpoints: req.endpoints,
            mesh_ipv4: req.mesh_ipv4,
            mesh_ipv6: req.mesh_ipv6,
            connect_port: req.connect_port,
            public_port: req.public_port,
            metadata: req.metadata,
            observed_endpoint: observed_endpoint.clone(),
            public_endpoint: req.public_endpoint,
            nat_hint: 0,
            created_at,
            updated_at: now,
            expires_at,
        };

        upsert_colony(&conn, &record)?;
        drop(conn);
        self.cache.lock().unwrap().colonies.remove(mesh_id);

        Ok(RegisterResponse {
            success: true,
            ttl: self.default_ttl.as_secs(),
            expires_at: to_rfc3339(expires_at),
            observed_endpoint,
        })
    }

    pub fn lookup_colony(&self, mesh_id: &str) -> Result<LookupColonyResponse, RpcError> {
        let now = now_ms();

        if let Some((record, expires_at)) = self.cache.lock().unwrap().colonies.get(mesh_id).cloned() {
            if expires_at >= now {
                return Ok(colony_to_response(&record));
            }
        }

        let conn = self.conn.lock().expect("registry connection poisoned");
        let record = load_colony_row(&conn, mesh_id)?
            .filter(|r| r.expires_at >= now)
            .ok_or_else(|| RpcError::not_found(format!("mesh {mesh_id} not found")))?;
        drop(conn);

        self.cache
            .lock()
            .unwrap()
            .colonies
            .insert(mesh_id.to_string(), (record.clone(), record.expires_at));

        Ok(colony_to_response(&record))
    }

    pub fn register_agent(
        &self,
        req: RegisterAgentRequest,
        observed_ip: Option<IpAddr>,
    ) -> Result<RegisterResponse, RpcError> {
        let agent_id = non_empty(req.agent_id.as_deref())
            .ok_or_else(|| RpcError::invalid_argument("agentId is required"))?;
        let mesh_id = non_empty(req.mesh_id.as_deref())
            .ok_or_else(|| RpcError::invalid_argument("meshId is required"))?;
        let pubkey = non_empty(req.pubkey.as_deref())
            .ok_or_else(|| RpcError::invalid_argument("pubkey is required"))?;
        if req.endpoints.is_empty() && req.observed_endpoint.is_none() {
            return Err(RpcError::invalid_argument(
                "at least one of endpoints or observedEndpoint is required",
            ));
        }

        let conn = self.conn.lock().expect("registry connection poisoned");
        let existing = load_agent_row(&conn, agent_id)?;

        let observed_endpoint = synthesize_observed_endpoint(req.observed_endpoint, observed_ip);

        let now = now_ms();
        let created_at = existing.as_ref().map(|r| r.created_at).unwrap_or(now);
        let expires_at = now + self.default_ttl.as_millis() as i64;

        let record = AgentRecord {
            agent_id: agent_id.to_string(),
            mesh_id: mesh_id.to_string(),
            pubkey: pubkey.to_string(),
            endpoints: req.endpoints,
            observed_endpoint: observed_endpoint.clone(),
            metadata: req.metadata,
            created_at,
            updated_at: now,
            expires_at,
        };

        upsert_agent(&conn, &record)?;
        drop(conn);
        self.cache.lock().unwrap().agents.remove(agent_id);

        Ok(RegisterResponse {
            success: true,
            ttl: self.default_ttl.as_secs(),
            expires_at: to_rfc3339(expires_at),
            observed_endpoint,
        })
    }

    pub fn lookup_agent(&self, agent_id: &str) -> Result<LookupAgentResponse, RpcError> {
        let now = now_ms();

        if let Some((record, expires_at)) = self.cache.lock().unwrap().agents.get(agent_id).cloned() {
            if expires_at >= now {
                return Ok(agent_to_response(&record));
            }
        }

        let conn = self.conn.lock().expect("registry connection poisoned");
        let record = load_agent_row(&conn, agent_id)?
            .filter(|r| r.expires_at >= now)
            .ok_or_else(|| RpcError::not_found(format!("agent {agent_id} not found")))?;
        drop(conn);

        self.cache
            .lock()
            .unwrap()
            .agents
            .insert(agent_id.to_string(), (record.clone(), record.expires_at));

        Ok(agent_to_response(&record))
    }

    pub fn count(&self) -> Result<RegistryCounts, RpcError> {
        let now = now_ms();
        let conn = self.conn.lock().expect("registry connection poisoned");
        let colonies: i64 = conn.query_row(
            "SELECT COUNT(*) FROM colonies WHERE expires_at >= ?1",
            params![now],
            |row| row.get(0),
        )?;
        let agents: i64 = conn.query_row(
            "SELECT COUNT(*) FROM agents WHERE expires_at >= ?1",
            params![now],
            |row| row.get(0),
        )?;
        Ok(RegistryCounts {
            colonies: colonies.max(0) as u64,
            agents: agents.max(0) as u64,
        })
    }

    pub fn health(&self) -> Result<HealthStatus, RpcError> {
        let counts = self.count()?;
        Ok(HealthStatus {
            status: "ok",
            version: self.service_version.clone(),
            uptime_seconds: self.started_at.elapsed().as_secs(),
            registered_colonies: counts.colonies,
        })
    }

    /// Delete expired colonies and agents, returning the counts deleted.
    /// Invalidates the read cache iff anything was deleted.
    pub fn cleanup(&self) -> Result<CleanupCounts, RpcError> {
        let now = now_ms();
        let conn = self.conn.lock().expect("registry connection poisoned");

        let expired_colonies = conn.execute(
            "DELETE FROM colonies WHERE expires_at < ?1",
            params![now],
        )? as u64;
        let expired_agents = conn.execute(
            "DELETE FROM agents WHERE expires_at < ?1",
            params![now],
        )? as u64;
        drop(conn);

        let counts = CleanupCounts {
            expired_colonies,
            expired_agents,
        };
        if counts.any() {
            let mut cache = self.cache.lock().unwrap();
            cache.colonies.clear();
            cache.agents.clear();
        }
        Ok(counts)
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.is_empty())
}

/// Overwrites the IP with the transport-observed one when the client's claim
/// is absent or looks private, keeping the declared port.
fn synthesize_observed_endpoint(
    declared: Option<ObservedEndpoint>,
    observed_ip: Option<IpAddr>,
) -> Option<ObservedEndpoint> {
    let Some(observed_ip) = observed_ip else {
        return declared;
    };

    let should_override = match &declared {
        None => true,
        Some(endpoint) => endpoint
            .ip
            .parse::<IpAddr>()
            .map(|ip| is_private(&ip))
            .unwrap_or(true),
    };

    if !should_override {
        return declared;
    }

    let port = declared.map(|e| e.port).unwrap_or(0);
    Some(ObservedEndpoint {
        ip: observed_ip.to_string(),
        port,
        protocol: "udp".to_string(),
    })
}

fn colony_to_response(record: &ColonyRecord) -> LookupColonyResponse {
    LookupColonyResponse {
        mesh_id: record.mesh_id.clone(),
        pubkey: record.pubkey.clone(),
        endpoints: record.endpoints.clone(),
        mesh_ipv4: record.mesh_ipv4.clone(),
        mesh_ipv6: record.mesh_ipv6.clone(),
        connect_port: record.connect_port,
        public_port: record.public_port,
        metadata: record.metadata.clone(),
        last_seen: Some(to_rfc3339(record.updated_at)),
        observed_endpoints: record.observed_endpoint.clone().into_iter().collect(),
        nat: record.nat_hint,
        public_endpoint: record.public_endpoint.clone(),
    }
}

fn agent_to_response(record: &AgentRecord) -> LookupAgentResponse {
    LookupAgentResponse {
        agent_id: record.agent_id.clone(),
        mesh_id: record.mesh_id.clone(),
        pubkey: record.pubkey.clone(),
        endpoints: record.endpoints.clone(),
        observed_endpoints: record.observed_endpoint.clone().into_iter().collect(),
        metadata: record.metadata.clone(),
        last_seen: Some(to_rfc3339(record.updated_at)),
    }
}

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS colonies (
            mesh_id TEXT PRIMARY KEY,
            pubkey TEXT NOT NULL,
            endpoints TEXT NOT NULL,
            mesh_ipv4 TEXT,
            mesh_ipv6 TEXT,
            connect_port INTEGER,
            public_port INTEGER,
            metadata TEXT NOT NULL,
            observed_endpoint TEXT,
            public_endpoint TEXT,
            nat_hint INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_colonies_expires_at ON colonies(expires_at);

        CREATE TABLE IF NOT EXISTS agents (
            agent_id TEXT PRIMARY KEY,
            mesh_id TEXT NOT NULL,
            pubkey TEXT NOT NULL,
            endpoints TEXT NOT NULL,
            observed_endpoint TEXT,
            metadata TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_agents_mesh_id ON agents(mesh_id);
        CREATE INDEX IF NOT EXISTS idx_agents_expires_at ON agents(expires_at);",
    )
}

fn upsert_colony(conn: &Connection, r: &ColonyRecord) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO colonies (mesh_id, pubkey, endpoints, mesh_ipv4, mesh_ipv6, connect_port,
            public_port, metadata, observed_endpoint, public_endpoint, nat_hint,
            created_at, updated_at, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
         ON CONFLICT(mesh_id) DO UPDATE SET
            pubkey = excluded.pubkey,
            endpoints = excluded.endpoints,
            mesh_ipv4 = excluded.mesh_ipv4,
            mesh_ipv6 = excluded.mesh_ipv6,
            connect_port = excluded.connect_port,
            public_port = excluded.public_port,
            metadata = excluded.metadata,
            observed_endpoint = excluded.observed_endpoint,
            public_endpoint = excluded.public_endpoint,
            updated_at = excluded.updated_at,
            expires_at = excluded.expires_at",
        params![
            r.mesh_id,
            r.pubkey,
            json(&r.endpoints),
            r.mesh_ipv4,
            r.mesh_ipv6,
            r.connect_port,
            r.public_port,
            json(&r.metadata),
            json_opt(&r.observed_endpoint),
            json_opt(&r.public_endpoint),
            r.nat_hint,
            r.created_at,
            r.updated_at,
            r.expires_at,
        ],
    )?;
    Ok(())
}

fn upsert_agent(conn: &Connection, r: &AgentRecord) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO agents (agent_id, mesh_id, pubkey, endpoints, observed_endpoint, metadata,
            created_at, updated_at, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
         ON CONFLICT(agent_id) DO UPDATE SET
            mesh_id = excluded.mesh_id,
            pubkey = excluded.pubkey,
            endpoints = excluded.endpoints,
            observed_endpoint = excluded.observed_endpoint,
            metadata = excluded.metadata,
            updated_at = excluded.updated_at,
            expires_at = excluded.expires_at",
        params![
            r.agent_id,
            r.mesh_id,
            r.pubkey,
            json(&r.endpoints),
            json_opt(&r.observed_endpoint),
            json(&r.metadata),
            r.created_at,
            r.updated_at,
            r.expires_at,
        ],
    )?;
    Ok(())
}

fn load_colony_row(conn: &Connection, mesh_id: &str) -> rusqlite::Result<Option<ColonyRecord>> {
    conn.query_row(
        "SELECT mesh_id, pubkey, endpoints, mesh_ipv4, mesh_ipv6, connect_port, public_port,
            metadata, observed_endpoint, public_endpoint, nat_hint, created_at, updated_at, expires_at
         FROM colonies WHERE mesh_id = ?1",
        params![mesh_id],
        |row| {
            Ok(ColonyRecord {
                mesh_id: row.get(0)?,
                pubkey: row.get(1)?,
                endpoints: from_json(row.get::<_, String>(2)?),
                mesh_ipv4: row.get(3)?,
                mesh_ipv6: row.get(4)?,
                connect_port: row.get(5)?,
                public_port: row.get(6)?,
                metadata: from_json(row.get::<_, String>(7)?),
                observed_endpoint: from_json_opt(row.get::<_, Option<String>>(8)?),
                public_endpoint: from_json_opt(row.get::<_, Option<String>>(9)?),
                nat_hint: row.get(10)?,
                created_at: row.get(11)?,
                updated_at: row.get(12)?,
                expires_at: row.get(13)?,
            })
        },
    )
    .optional()
}

fn load_agent_row(conn: &Connection, agent_id: &str) -> rusqlite::Result<Option<AgentRecord>> {
    conn.query_row(
        "SELECT agent_id, mesh_id, pubkey, endpoints, observed_endpoint, metadata,
            created_at, updated_at, expires_at
         FROM agents WHERE agent_id = ?1",
        params![agent_id],
        |row| {
            Ok(AgentRecord {
                agent_id: row.get(0)?,
                mesh_id: row.get(1)?,
                pubkey: row.get(2)?,
                endpoints: from_json(row.get::<_, String>(3)?),
                observed_endpoint: from_json_opt(row.get::<_, Option<String>>(4)?),
                metadata: from_json(row.get::<_, String>(5)?),
                created_at: row.get(6)?,
                updated_at: row.get(7)?,
                expires_at: row.get(8)?,
            })
        },
    )
    .optional()
}

fn json<T: serde::Serialize>(v: &T) -> String {
    serde_json::to_string(v).unwrap_or_default()
}

fn json_opt<T: serde::Serialize>(v: &Option<T>) -> Option<String> {
    v.as_ref().map(|v| json(v))
}

fn from_json<T: for<'de> serde::Deserialize<'de> + Default>(s: String) -> T {
    serde_json::from_str(&s).unwrap_or_default()
}

fn from_json_opt<T: for<'de> serde::Deserialize<'de>>(s: Option<String>) -> Option<T> {
    s.and_then(|s| serde_json::from_str(&s).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_test_partition() -> RegistryPartition {
        RegistryPartition::open(
            "m1",
            Connection::open_in_memory().unwrap(),
            Duration::from_secs(300),
            "0.0.0".to_string(),
        )
        .unwrap()
    }

    fn register_req(mesh_id: &str, pubkey: &str) -> RegisterColonyRequest {
        RegisterColonyRequest {
            mesh_id: Some(mesh_id.to_string()),
            pubkey: Some(pubkey.to_string()),
            endpoints: vec!["1.2.3.4:51820".to_string()],
            mesh_ipv4: Some("10.42.0.1".to_string()),
            mesh_ipv6: None,
            connect_port: Some(9000),
            public_port: None,
            metadata: HashMap::new(),
            observed_endpoint: None,
            public_endpoint: None,
        }
    }

    #[test]
    fn test_register_and_lookup_round_trip() {
        let part = open_test_partition();
        let resp = part
            .register_colony(register_req("m1", "dGVzdA=="), Some("1.2.3.4".parse().unwrap()))
            .unwrap();
        assert!(resp.success);
        assert_eq!(resp.ttl, 300);
        assert_eq!(
            resp.observed_endpoint,
            Some(ObservedEndpoint {
                ip: "1.2.3.4".into(),
                port: 0,
                protocol: "udp".into()
            })
        );

        let looked_up = part.lookup_colony("m1").unwrap();
        assert_eq!(looked_up.mesh_id, "m1");
        assert_eq!(looked_up.pubkey, "dGVzdA==");
        assert_eq!(looked_up.endpoints, vec!["1.2.3.4:51820".to_string()]);
        assert_eq!(looked_up.mesh_ipv4.as_deref(), Some("10.42.0.1"));
        assert_eq!(looked_up.connect_port, Some(9000));
        assert_eq!(looked_up.observed_endpoints.len(), 1);
    }

    #[test]
    fn test_missing_mesh_id_is_invalid_argument() {
        let part = open_test_partition();
        let mut req = register_req("m1", "dGVzdA==");
        req.mesh_id = None;
        let err = part.register_colony(req, None).unwrap_err();
        assert_eq!(err.code.as_str(), "invalid_argument");
    }

    #[test]
    fn test_split_brain_rejected() {
        let part = open_test_partition();
        part.register_colony(register_req("m2", "A=="), None).unwrap();
        let err = part
            .register_colony(register_req("m2", "B=="), None)
            .unwrap_err();
        assert_eq!(err.code.as_str(), "already_exists");
    }

    #[test]
    fn test_lookup_missing_mesh_not_found() {
        let part = open_test_partition();
        let err = part.lookup_colony("does-not-exist").unwrap_err();
        assert_eq!(err.code.as_str(), "not_found");
    }

    #[test]
    fn test_idempotent_registration_preserves_created_at() {
        let part = open_test_partition();
        let first = part.register_colony(register_req("m1", "dGVzdA=="), None).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        let second = part.register_colony(register_req("m1", "dGVzdA=="), None).unwrap();
        // created_at is not on the wire response, but expires_at must advance.
        assert!(second.expires_at >= first.expires_at);
    }

    #[test]
    fn test_ttl_expiry_via_cleanup() {
        let part = RegistryPartition::open(
            "m1",
            Connection::open_in_memory().unwrap(),
            Duration::from_millis(1),
            "0.0.0".to_string(),
        )
        .unwrap();
        part.register_colony(register_req("m1", "dGVzdA=="), None).unwrap();
        std::thread::sleep(Duration::from_millis(20));

        let counts = part.cleanup().unwrap();
        assert_eq!(counts.expired_colonies, 1);

        let err = part.lookup_colony("m1").unwrap_err();
        assert_eq!(err.code.as_str(), "not_found");
    }

    #[test]
    fn test_observed_endpoint_preserved_when_public() {
        let part = open_test_partition();
        let mut req = register_req("m3", "dGVzdA==");
        req.observed_endpoint = Some(ObservedEndpoint {
            ip: "8.8.8.8".into(),
            port: 51820,
            protocol: "udp".into(),
        });
        let resp = part
            .register_colony(req, Some("1.2.3.4".parse().unwrap()))
            .unwrap();
        assert_eq!(resp.observed_endpoint.unwrap().ip, "8.8.8.8");
    }

    #[test]
    fn test_agent_register_and_lookup() {
        let part = open_test_partition();
        let req = RegisterAgentRequest {
            agent_id: Some("a1".into()),
            mesh_id: Some("m1".into()),
            pubkey: Some("dGVzdA==".into()),
            endpoints: vec!["5.6.7.8:4000".into()],
            observed_endpoint: None,
            metadata: HashMap::new(),
        };
        part.register_agent(req, None).unwrap();
        let resp = part.lookup_agent("a1").unwrap();
        assert_eq!(resp.agent_id, "a1");
        assert_eq!(resp.mesh_id, "m1");
    }

    #[test]
    fn test_agent_registration_has_no_split_brain_check() {
        let part = open_test_partition();
        let req = |pk: &str| RegisterAgentRequest {
            agent_id: Some("a1".into()),
            mesh_id: Some("m1".into()),
            pubkey: Some(pk.to_string()),
            endpoints: vec!["5.6.7.8:4000".into()],
            observed_endpoint: None,
            metadata: HashMap::new(),
        };
        part.register_agent(req("A=="), None).unwrap();
        // Different pubkey, same agent_id: agents upsert unconditionally.
        let resp = part.register_agent(req("B=="), None).unwrap();
        assert!(resp.success);
    }

    #[test]
    fn test_count_and_health() {
        let part = open_test_partition();
        part.register_colony(register_req("m1", "dGVzdA=="), None).unwrap();
        let counts = part.count().unwrap();
        assert_eq!(counts.colonies, 1);

        let health = part.health().unwrap();
        assert_eq!(health.status, "ok");
        assert_eq!(health.registered_colonies, 1);
    }
}
