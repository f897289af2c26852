//! # Parley Server
//!
//! Main binary that orchestrates both Parley services:
//! - REST API (call records, voice snapshots, health)
//! - WebSocket signaling gateway (presence, call control, voice channels)
//!
//! Both run in a single process; the gateway and API share the presence
//! registry and voice tracker, so REST snapshots always reflect live state.

use parley_api::AppState;
use parley_gateway::GatewayState;
use parley_presence::{PresenceRegistry, VoiceChannelTracker};
use parley_store::memory::{MemoryCallStore, MemoryUserDirectory};
use parley_store::repository::CallRepository;
use std::net::SocketAddr;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = parley_common::config::init()?;

    // Initialize tracing (structured logging)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parley=debug,tower_http=debug".into()),
        )
        .with_target(true)
        .init();

    tracing::info!("🚀 Starting Parley v{}", env!("CARGO_PKG_VERSION"));

    // === Shared presence state ===
    // One registry and one tracker, shared between the gateway (mutations)
    // and the REST API (snapshots).
    let registry = PresenceRegistry::new();
    let directory = MemoryUserDirectory::new();
    let tracker = Arc::new(VoiceChannelTracker::new(directory));

    // === Call aggregate store ===
    let calls = Arc::new(CallRepository::new(MemoryCallStore::new()));

    // === REST API Server ===
    let api_state = AppState {
        calls,
        registry: registry.clone(),
        tracker: tracker.clone(),
    };
    let api_router = parley_api::build_router(api_state);
    let api_addr = SocketAddr::new(config.server.host.parse()?, config.server.port);

    // === WebSocket Gateway ===
    let gateway_state = GatewayState::new(
        registry,
        tracker,
        config.signaling.delivery_queue_depth,
    );
    let gateway_router = parley_gateway::build_router(gateway_state);
    let gateway_addr = SocketAddr::new(config.server.host.parse()?, config.server.gateway_port);

    tracing::info!("📡 REST API listening on http://{api_addr}");
    tracing::info!("🔌 Signaling gateway listening on ws://{gateway_addr}");

    // Run both servers concurrently
    tokio::try_join!(
        async {
            let listener = tokio::net::TcpListener::bind(api_addr).await?;
            axum::serve(listener, api_router).await?;
            Ok::<_, anyhow::Error>(())
        },
        async {
            let listener = tokio::net::TcpListener::bind(gateway_addr).await?;
            axum::serve(listener, gateway_router).await?;
            Ok::<_, anyhow::Error>(())
        },
    )?;

    Ok(())
}
