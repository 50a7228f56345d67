// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Connect-JSON wire schemas for the discovery RPCs.
//!
//! Field names follow the exact camelCase the protocol defines; optional
//! fields are omitted when unset (`skip_serializing_if`).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// `{ip, port, protocol}` as observed by the transport or declared by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedEndpoint {
    pub ip: String,
    pub port: u16,
    #[serde(default = "default_protocol")]
    pub protocol: String,
}

fn default_protocol() -> String {
    "udp".to_string()
}

/// CA fingerprint, binary `value` carried as base64 on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaFingerprint {
    pub algorithm: String,
    pub value: String,
}

/// Public HTTPS endpoint configuration for a colony.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicEndpoint {
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_fingerprint: Option<CaFingerprint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

fn empty_metadata() -> HashMap<String, String> {
    HashMap::new()
}

fn is_empty_metadata(m: &HashMap<String, String>) -> bool {
    m.is_empty()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterColonyRequest {
    pub mesh_id: Option<String>,
    pub pubkey: Option<String>,
    #[serde(default)]
    pub endpoints: Vec<String>,
    #[serde(default)]
    pub mesh_ipv4: Option<String>,
    #[serde(default)]
    pub mesh_ipv6: Option<String>,
    #[serde(default)]
    pub connect_port: Option<u16>,
    #[serde(default)]
    pub public_port: Option<u16>,
    #[serde(default = "empty_metadata")]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub observed_endpoint: Option<ObservedEndpoint>,
    #[serde(default)]
    pub public_endpoint: Option<PublicEndpoint>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub success: bool,
    pub ttl: u64,
    pub expires_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_endpoint: Option<ObservedEndpoint>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupColonyRequest {
    pub mesh_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupColonyResponse {
    pub mesh_id: String,
    pub pubkey: String,
    pub endpoints: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mesh_ipv4: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mesh_ipv6: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_port: Option<u16>,
    #[serde(skip_serializing_if = "is_empty_metadata")]
    pub metadata: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<String>,
    pub observed_endpoints: Vec<ObservedEndpoint>,
    pub nat: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_endpoint: Option<PublicEndpoint>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterAgentRequest {
    pub agent_id: Option<String>,
    pub mesh_id: Option<String>,
    pub pubkey: Option<String>,
    #[serde(default)]
    pub endpoints: Vec<String>,
    #[serde(default)]
    pub observed_endpoint: Option<ObservedEndpoint>,
    #[serde(default = "empty_metadata")]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupAgentRequest {
    pub agent_id: Option<String>,
    pub mesh_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LookupAgentResponse {
    pub agent_id: String,
    pub mesh_id: String,
    pub pubkey: String,
    pub endpoints: Vec<String>,
    pub observed_endpoints: Vec<ObservedEndpoint>,
    #[serde(skip_serializing_if = "is_empty_metadata")]
    pub metadata: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBootstrapTokenRequest {
    pub reef_id: Option<String>,
    pub colony_id: Option<String>,
    pub agent_id: Option<String>,
    pub intent: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBootstrapTokenResponse {
    pub jwt: String,
    /// Decimal seconds since epoch, stringified to avoid precision loss.
    pub expires_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub registered_colonies: u64,
}

/// A single partition's last reported cleanup pass, as exposed by `/stats`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupSnapshotView {
    pub origin_id: String,
    pub expired_colonies: u64,
    pub expired_agents: u64,
    pub recorded_at: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub operations: HashMap<String, u64>,
    pub cleanups: Vec<CleanupSnapshotView>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_colony_request_parses_minimal_body() {
        let body = r#"{"meshId":"m1","pubkey":"dGVzdA==","endpoints":["1.2.3.4:51820"]}"#;
        let req: RegisterColonyRequest = serde_json::from_str(body).unwrap();
        assert_eq!(req.mesh_id.as_deref(), Some("m1"));
        assert_eq!(req.endpoints, vec!["1.2.3.4:51820".to_string()]);
        assert!(req.metadata.is_empty());
    }

    #[test]
    fn test_register_response_omits_absent_observed_endpoint() {
        let resp = RegisterResponse {
            success: true,
            ttl: 300,
            expires_at: "2026-08-01T00:00:00Z".into(),
            observed_endpoint: None,
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(!json.contains("observedEndpoint"));
    }

    #[test]
    fn test_register_response_includes_observed_endpoint_when_set() {
        let resp = RegisterResponse {
            success: true,
            ttl: 300,
            expires_at: "2026-08-01T00:00:00Z".into(),
            observed_endpoint: Some(ObservedEndpoint {
                ip: "1.2.3.4".into(),
                port: 0,
                protocol: "udp".into(),
            }),
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"observedEndpoint\""));
        assert!(json.contains("\"protocol\":\"udp\""));
    }

    #[test]
    fn test_bootstrap_token_response_stringifies_expires_at() {
        let resp = CreateBootstrapTokenResponse {
            jwt: "a.b.c".into(),
            expires_at: 1234567890u64.to_string(),
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"expiresAt\":\"1234567890\""));
    }
}
