//! Exchange server binary.
//!
//! Replays the configured tick tapes, matches orders and serves the
//! `venue.Exchange` gRPC service until Ctrl+C.

use std::sync::Arc;

use anyhow::Context;
use exchange::delivery::rpc::ExchangeRpc;
use exchange::{ExchangeService, MemoryDealQueue, TickReader};
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;
use tracing::info;
use trading_venue::config::Config;
use trading_venue::logging;
use venue_proto::exchange_server::ExchangeServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing("info");

    let config = Config::load(Config::path_from_args()).context("failed to load configuration")?;
    let exchange_cfg = config.exchange;

    let service = Arc::new(ExchangeService::new(
        Arc::new(MemoryDealQueue::new()),
        TickReader::new(&exchange_cfg.assets_dir),
        exchange_cfg.tickers.clone(),
        exchange_cfg.interval(),
        exchange_cfg.base_inventory,
    ));

    let addr = exchange_cfg
        .listen_addr
        .parse()
        .context("bad exchange listen address")?;
    let shutdown = CancellationToken::new();

    {
        let service = Arc::clone(&service);
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("received shutdown signal");
                service.stop();
                shutdown.cancel();
            }
        });
    }

    let workers = {
        let service = Arc::clone(&service);
        tokio::spawn(async move { service.start().await })
    };

    info!(%addr, "serving exchange rpc");
    Server::builder()
        .add_service(ExchangeServer::new(ExchangeRpc::new(Arc::clone(&service))))
        .serve_with_shutdown(addr, shutdown.cancelled())
        .await
        .context("exchange server failed")?;

    workers.await?;

    Ok(())
}
