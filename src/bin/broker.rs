//! Broker server binary.
//!
//! Connects Postgres and the exchange, consumes the fill and candle streams,
//! and serves the `venue.Broker` gRPC service until Ctrl+C.

use std::sync::Arc;

use anyhow::Context;
use broker::delivery::exchange::RpcExchangeGateway;
use broker::delivery::rpc::BrokerRpc;
use broker::repository::{self, PgClientRepo, PgDealRepo, PgPositionRepo, PgStatisticRepo};
use broker::BrokerService;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;
use tracing::info;
use trading_venue::config::Config;
use trading_venue::logging;
use venue_proto::broker_server::BrokerServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    logging::init_tracing("info");

    let config = Config::load(Config::path_from_args()).context("failed to load configuration")?;
    let broker_cfg = config.broker;

    let pool = repository::connect(&broker_cfg.db.dsn())
        .await
        .context("failed to connect to the database")?;

    let gateway = RpcExchangeGateway::connect(broker_cfg.exchange_addr.clone(), broker_cfg.broker_id)
        .await
        .context("failed to connect to the exchange")?;

    let service = Arc::new(BrokerService::new(
        Arc::new(PgClientRepo::new(pool.clone())),
        Arc::new(PgDealRepo::new(pool.clone())),
        Arc::new(PgPositionRepo::new(pool.clone())),
        Arc::new(PgStatisticRepo::new(pool)),
        Arc::new(gateway),
    ));

    let addr = broker_cfg
        .listen_addr
        .parse()
        .context("bad broker listen address")?;
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

    info!(%addr, "serving broker rpc");
    Server::builder()
        .add_service(BrokerServer::new(BrokerRpc::new(Arc::clone(&service))))
        .serve_with_shutdown(addr, shutdown.cancelled())
        .await
        .context("broker server failed")?;

    workers.await?;

    Ok(())
}
