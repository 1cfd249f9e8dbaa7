//! Broker console binary.

use anyhow::Context;
use trading_venue::config::Config;
use trading_venue::console::Console;
use trading_venue::logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init_tracing("warn");

    let config = Config::load(Config::path_from_args()).context("failed to load configuration")?;
    let client_cfg = config.client;

    let mut console = Console::connect(client_cfg.broker_addr, client_cfg.login)
        .await
        .context("failed to connect to the broker")?;

    console.run().await
}
