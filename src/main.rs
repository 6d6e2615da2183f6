//! Standalone entry point: boots the CLI-subprocess proxy's HTTP front end
//! (§4.5, §6) for local development and testing. Embedders that need the
//! full gateway (router, retry engine, async task manager) wire
//! `llm_gateway_core::orchestrator::Orchestrator` into their own service
//! instead of this binary.

use anyhow::Result;
use llm_gateway_core::config::Settings;
use llm_gateway_core::proxy::server::{build_router, ProxyState};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,llm_gateway_core=debug".parse().unwrap());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let settings = Arc::new(Settings::from_env());
    let bind_addr = settings.cli_proxy_bind_addr.clone();
    let state = ProxyState::new(settings);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!(addr = %bind_addr, "CLI-subprocess proxy listening");
    axum::serve(listener, app).await?;
    Ok(())
}
