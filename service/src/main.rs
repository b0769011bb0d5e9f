mod config;

use std::{sync::Arc, time::Duration};

use alloy::transports::http::reqwest::Url;
use relay_core::{chain::HttpChainClient, signer::LocalTransactionSigner};
use relay_engine::Transactor;
use relay_queue::MemoryQueue;
use tracing_subscriber::{filter::EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config::get_config();

    let subscriber = tracing_subscriber::registry().with(
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "relayd=debug,relay_engine=debug,relay_queue=debug".into()),
    );

    match config.service.log_format {
        config::LogFormat::Json => subscriber
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        config::LogFormat::Pretty => subscriber.with(tracing_subscriber::fmt::layer()).init(),
    }

    let rpc_url: Url = config.chain.rpc_url.parse()?;
    let chain = Arc::new(HttpChainClient::new(config.chain.chain_id, rpc_url));
    let signer = Arc::new(LocalTransactionSigner::from_hex_key(
        &config.chain.private_key,
    )?);
    let queue = Arc::new(MemoryQueue::new());

    tracing::info!(
        chain_id = config.chain.chain_id,
        "Starting transaction relay"
    );

    let transactor = Transactor::start(config.engine.clone(), chain, signer, queue).await;
    let transactor = Arc::new(transactor);

    let stats_interval = Duration::from_secs(config.service.stats_interval_secs);
    let stats_handle = {
        let transactor = transactor.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(stats_interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let stats = transactor.stats().await;
                tracing::info!(
                    acquired = stats.acquired,
                    in_flight = stats.in_flight,
                    queue_depth = stats.queue_depth,
                    dead_letters = stats.dead_letters,
                    "Engine stats"
                );
            }
        })
    };

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    stats_handle.abort();
    let _ = stats_handle.await;
    match Arc::try_unwrap(transactor) {
        Ok(transactor) => transactor.shutdown().await,
        Err(_) => tracing::warn!("Transactor still shared at shutdown, exiting without drain"),
    }

    tracing::info!("Relay stopped");
    Ok(())
}
