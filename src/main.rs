//! Auriga coordinator - oracle status entrypoint
//!
//! Resolves the current on-chain oracle state through the configured indexer
//! and reports it. Transaction flows are driven through the library API by
//! the surrounding tooling; this binary is the read-only health view.

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

use auriga_coordinator::chain::{ChainQuery, HttpChainClient};
use auriga_coordinator::config::Settings;
use auriga_coordinator::state::Lifecycle;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    info!("Starting Auriga coordinator v{}", env!("CARGO_PKG_VERSION"));

    let settings = Settings::load()?;
    info!(
        instance = %settings.coordinator.instance_id,
        network = %settings.network.name,
        "configuration loaded"
    );

    let client = Arc::new(HttpChainClient::new(
        settings.indexer.base_url.clone(),
        settings.indexer.timeout_ms,
    )?);

    let query = ChainQuery::new(
        client,
        settings.oracle.oracle_address()?,
        settings.oracle.marker()?,
        settings.network.slot_config()?,
    );

    let (slot, now_ms) = query.current_time().await?;
    info!(slot, now_ms, "chain tip resolved");

    let (state_utxo, state) = query.resolve_state().await?;
    info!(
        state_ref = %state_utxo.reference,
        reserve = %state_utxo.output.value,
        nodes = state.nodes.len(),
        platform_reward = state.platform_reward,
        "oracle state resolved"
    );

    match state.feed {
        Some(feed) => {
            let age_ms = now_ms.saturating_sub(feed.updated_at);
            info!(price = feed.price, age_ms, "current aggregate feed");
        }
        None => warn!("oracle has no aggregate feed yet"),
    }

    if state.lifecycle == Lifecycle::Closed {
        warn!("oracle is closed");
    }

    match query.resolve_reference_script().await? {
        Some(utxo) => info!(script_ref = %utxo.reference, "reference script published"),
        None => info!("no reference script published"),
    }

    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,auriga_coordinator=debug,hyper=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();
}
