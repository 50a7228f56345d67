// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! RPC handlers: body parsing, client-IP extraction, partition dispatch, and
//! the Connect status-code mapping to HTTP responses, the same shape as
//! `hdds-gateway::handlers::ApiError` implementing `IntoResponse`.

use super::AppState;
use crate::error::{ErrorBody, RpcError};
use crate::wire::{
    CleanupSnapshotView, CreateBootstrapTokenRequest, CreateBootstrapTokenResponse,
    HealthResponse, LookupAgentRequest, LookupAgentResponse, LookupColonyRequest,
    LookupColonyResponse, RegisterAgentRequest, RegisterColonyRequest, RegisterResponse,
    StatsResponse,
};
use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::warn;

/// Wraps `RpcError` for axum's `IntoResponse`, serializing the `{code, message}`
/// envelope at the status the code maps to.
pub struct ApiError(RpcError);

impl From<RpcError> for ApiError {
    fn from(e: RpcError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body: ErrorBody = (&self.0).into();
        (status, Json(body)).into_response()
    }
}

fn track(state: &AppState, operation: &str) {
    if let Err(err) = state.directory.metrics().track(operation) {
        warn!(operation, error = %err, "failed to record operation counter");
    }
}

async fn parse_body<T: DeserializeOwned>(headers: &HeaderMap, body: &Bytes) -> Result<T, RpcError> {
    let content_type = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if content_type.starts_with("application/proto") {
        return Err(RpcError::invalid_argument("only JSON encoding is supported"));
    }

    serde_json::from_slice(body)
        .map_err(|e| RpcError::invalid_argument(format!("malformed request body: {e}")))
}

/// Prefers `CF-Connecting-IP`, then the first hop of `X-Forwarded-For`,
/// falling back to the TCP peer address.
fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> Option<IpAddr> {
    if let Some(ip) = headers
        .get("cf-connecting-ip")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
    {
        return Some(ip);
    }
    if let Some(ip) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(|v| v.trim().parse().ok())
    {
        return Some(ip);
    }
    Some(peer.ip())
}

pub async fn register_colony(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<RegisterResponse>, ApiError> {
    track(&state, "RegisterColony");
    let req: RegisterColonyRequest = parse_body(&headers, &body).await?;
    let mesh_id = req
        .mesh_id
        .clone()
        .ok_or_else(|| RpcError::invalid_argument("meshId is required"))?;
    let observed_ip = client_ip(&headers, peer);
    let partition = state.directory.registry_for(&mesh_id)?;
    let resp = partition.register_colony(req, observed_ip)?;
    Ok(Json(resp))
}

pub async fn lookup_colony(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<LookupColonyResponse>, ApiError> {
    track(&state, "LookupColony");
    let req: LookupColonyRequest = parse_body(&headers, &body).await?;
    let mesh_id = req
        .mesh_id
        .ok_or_else(|| RpcError::invalid_argument("meshId is required"))?;
    let partition = state.directory.registry_for(&mesh_id)?;
    let resp = partition.lookup_colony(&mesh_id)?;
    Ok(Json(resp))
}

pub async fn register_agent(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<RegisterResponse>, ApiError> {
    track(&state, "RegisterAgent");
    let req: RegisterAgentRequest = parse_body(&headers, &body).await?;
    let mesh_id = req
        .mesh_id
        .clone()
        .ok_or_else(|| RpcError::invalid_argument("meshId is required"))?;
    let observed_ip = client_ip(&headers, peer);
    let partition = state.directory.registry_for(&mesh_id)?;
    let resp = partition.register_agent(req, observed_ip)?;
    Ok(Json(resp))
}

/// Agent lookup is scoped to the partition named by `meshId`; there is no
/// cross-partition agent index, so `meshId` must be supplied by the caller.
pub async fn lookup_agent(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<LookupAgentResponse>, ApiError> {
    track(&state, "LookupAgent");
    let req: LookupAgentRequest = parse_body(&headers, &body).await?;
    let mesh_id = req
        .mesh_id
        .ok_or_else(|| RpcError::invalid_argument("meshId is required"))?;
    let agent_id = req
        .agent_id
        .ok_or_else(|| RpcError::invalid_argument("agentId is required"))?;
    let partition = state.directory.registry_for(&mesh_id)?;
    let resp = partition.lookup_agent(&agent_id)?;
    Ok(Json(resp))
}

pub async fn create_bootstrap_token(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<CreateBootstrapTokenResponse>, ApiError> {
    track(&state, "CreateBootstrapToken");
    let req: CreateBootstrapTokenRequest = parse_body(&headers, &body).await?;
    let signing = state
        .signing
        .as_ref()
        .ok_or_else(|| RpcError::internal("no signing key configured"))?;
    let (jwt, expires_at) = signing.create_bootstrap_token(
        req.reef_id.as_deref(),
        req.colony_id.as_deref(),
        req.agent_id.as_deref(),
        req.intent.as_deref(),
    )?;
    Ok(Json(CreateBootstrapTokenResponse {
        jwt,
        expires_at: expires_at.to_string(),
    }))
}

pub async fn jwks(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let signing = state
        .signing
        .as_ref()
        .ok_or_else(|| RpcError::internal("no signing key configured"))?;
    let mut response = Json(signing.jwks()).into_response();
    response.headers_mut().insert(
        axum::http::header::CACHE_CONTROL,
        axum::http::HeaderValue::from_static("public, max-age=300"),
    );
    Ok(response)
}

fn health_body(state: &AppState) -> Result<HealthResponse, RpcError> {
    let registered_colonies = state.directory.total_colonies()?;
    Ok(HealthResponse {
        status: "ok".to_string(),
        version: state.config.service_version.clone(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        registered_colonies,
    })
}

/// `GET /health`: plain status, not counted as a dispatched RPC.
pub async fn health(State(state): State<Arc<AppState>>) -> Result<Json<HealthResponse>, ApiError> {
    Ok(Json(health_body(&state)?))
}

/// `POST .../DiscoveryService/Health`: the same aggregate, dispatched as an RPC.
pub async fn health_rpc(State(state): State<Arc<AppState>>) -> Result<Json<HealthResponse>, ApiError> {
    track(&state, "Health");
    Ok(Json(health_body(&state)?))
}

pub async fn request_relay(State(state): State<Arc<AppState>>) -> ApiError {
    track(&state, "RequestRelay");
    RpcError::unimplemented("relay RPCs are not implemented").into()
}

pub async fn release_relay(State(state): State<Arc<AppState>>) -> ApiError {
    track(&state, "ReleaseRelay");
    RpcError::unimplemented("relay RPCs are not implemented").into()
}

/// Operation counters over the last hour plus the last cleanup pass each
/// partition has reported, so a caller can observe both without polling
/// individual partitions.
pub async fn stats(State(state): State<Arc<AppState>>) -> Result<Json<StatsResponse>, ApiError> {
    let metrics = state.directory.metrics();
    let operations = metrics.stats(crate::time::now_ms())?;
    let cleanups = metrics
        .cleanup_snapshots()?
        .into_iter()
        .map(|s| CleanupSnapshotView {
            origin_id: s.origin_id,
            expired_colonies: s.expired_colonies,
            expired_agents: s.expired_agents,
            recorded_at: crate::time::to_rfc3339(s.recorded_at_ms),
        })
        .collect();
    Ok(Json(StatsResponse {
        operations,
        cleanups,
    }))
}

pub async fn not_found() -> ApiError {
    RpcError::not_found("no such route").into()
}
