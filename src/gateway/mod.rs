// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The Connect-JSON HTTP gateway, assembled the way `hdds-gateway::main::build_router`
//! assembles its axum `Router`: one `AppState`, CORS + trace layers, and a flat
//! route table.

pub mod handlers;

use crate::config::Config;
use crate::partition::PartitionDirectory;
use crate::signing::SigningKeyStore;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub struct AppState {
    pub directory: Arc<PartitionDirectory>,
    pub signing: Option<Arc<SigningKeyStore>>,
    pub config: Arc<Config>,
    pub started_at: Instant,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/coral.discovery.v1.DiscoveryService/RegisterColony",
            post(handlers::register_colony),
        )
        .route(
            "/coral.discovery.v1.DiscoveryService/LookupColony",
            post(handlers::lookup_colony),
        )
        .route(
            "/coral.discovery.v1.DiscoveryService/RegisterAgent",
            post(handlers::register_agent),
        )
        .route(
            "/coral.discovery.v1.DiscoveryService/LookupAgent",
            post(handlers::lookup_agent),
        )
        .route(
            "/coral.discovery.v1.DiscoveryService/CreateBootstrapToken",
            post(handlers::create_bootstrap_token),
        )
        .route(
            "/coral.discovery.v1.DiscoveryService/Health",
            post(handlers::health_rpc),
        )
        .route(
            "/coral.discovery.v1.DiscoveryService/RequestRelay",
            post(handlers::request_relay),
        )
        .route(
            "/coral.discovery.v1.DiscoveryService/ReleaseRelay",
            post(handlers::release_relay),
        )
        .route("/.well-known/jwks.json", get(handlers::jwks))
        .route("/health", get(handlers::health))
        .route("/stats", get(handlers::stats))
        .fallback(handlers::not_found)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
