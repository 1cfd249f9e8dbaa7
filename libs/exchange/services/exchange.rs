//! Exchange façade: lifecycle wiring, matching and candle emission.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::domain::{nano_id, Deal, Ohlcv, Subscriber, Tick};
use crate::repository::DealQueue;
use crate::services::candle::CandleBook;
use crate::services::hub::SubscriptionHub;
use crate::services::tick::TickReader;

const CHANNEL_CAPACITY: usize = 100;

/// The order-matching and market-data core.
///
/// `start` spawns one tape reader per configured ticker, a tee that feeds the
/// candle worker and the matcher, and waits for the whole set; `stop` cancels
/// it. Everything else may be called concurrently at any time.
pub struct ExchangeService {
    queue: Arc<dyn DealQueue>,
    reader: TickReader,
    tickers: Vec<String>,
    interval: Duration,
    inventory: Mutex<HashMap<String, i32>>,
    hub: SubscriptionHub,
    cancel: Mutex<Option<CancellationToken>>,
}

impl ExchangeService {
    pub fn new(
        queue: Arc<dyn DealQueue>,
        reader: TickReader,
        tickers: Vec<String>,
        interval: Duration,
        base_inventory: i32,
    ) -> Self {
        let inventory = tickers
            .iter()
            .map(|ticker| (ticker.clone(), base_inventory))
            .collect();

        Self {
            queue,
            reader,
            tickers,
            interval,
            inventory: Mutex::new(inventory),
            hub: SubscriptionHub::new(),
            cancel: Mutex::new(None),
        }
    }

    /// Runs the worker set until cancellation or tape exhaustion.
    pub async fn start(self: Arc<Self>) {
        let token = CancellationToken::new();
        *self.cancel.lock() = Some(token.clone());

        let (tick_tx, tick_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (stat_tx, stat_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (deal_tx, deal_rx) = mpsc::channel(CHANNEL_CAPACITY);

        let mut workers = JoinSet::new();

        workers.spawn(retransmit(token.clone(), tick_rx, vec![stat_tx, deal_tx]));

        {
            let service = Arc::clone(&self);
            let token = token.clone();
            workers.spawn(async move { service.send_statistic(token, stat_rx).await });
        }
        {
            let service = Arc::clone(&self);
            let token = token.clone();
            workers.spawn(async move { service.complete_deals(token, deal_rx).await });
        }

        for ticker in self.tickers.clone() {
            let reader = self.reader.clone();
            let token = token.clone();
            let tick_tx = tick_tx.clone();
            workers.spawn(async move { reader.start_reading(token, &ticker, tick_tx).await });
        }
        drop(tick_tx);

        info!("started");
        while let Some(joined) = workers.join_next().await {
            if let Err(err) = joined {
                error!(%err, "worker failed");
            }
        }
        info!("stopped");
    }

    /// Cancels the worker set. An error is logged if the service was never
    /// started.
    pub fn stop(&self) {
        match self.cancel.lock().take() {
            Some(token) => token.cancel(),
            None => error!("stop requested but the service was never started"),
        }
    }

    /// Stamps and queues a new order. No balance or inventory validation
    /// happens here; the matcher decides completion when ticks arrive.
    pub fn create(&self, mut deal: Deal) -> Deal {
        deal.id = nano_id();
        self.queue.add(deal.clone());

        deal
    }

    /// Removes a queued order; reports whether anything was removed.
    pub fn cancel(&self, deal_id: i64) -> bool {
        self.queue.delete(deal_id)
    }

    /// Subscribes `tx` to closed candles, starting from this moment.
    pub fn statistic(&self, subscriber: Subscriber, tx: mpsc::Sender<Ohlcv>) {
        self.hub.subscribe_stats(subscriber, tx);
    }

    pub fn statistic_unsubscribe(&self, subscriber: &Subscriber) {
        self.hub.unsubscribe_stats(subscriber);
    }

    /// Subscribes `tx` to the broker's completed deals, starting from this
    /// moment.
    pub fn results(&self, subscriber: Subscriber, tx: mpsc::Sender<Deal>) {
        self.hub.subscribe_deals(subscriber, tx);
    }

    pub fn results_unsubscribe(&self, subscriber: &Subscriber) {
        self.hub.unsubscribe_deals(subscriber);
    }

    #[cfg(test)]
    pub(crate) fn hub(&self) -> &SubscriptionHub {
        &self.hub
    }

    async fn send_statistic(&self, token: CancellationToken, mut ticks: mpsc::Receiver<Tick>) {
        let mut book = CandleBook::new(self.interval);
        let mut clock = time::interval_at(Instant::now() + self.interval, self.interval);
        clock.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("statistic worker started");
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                tick = ticks.recv() => match tick {
                    Some(tick) => book.apply(&tick),
                    None => break,
                },
                _ = clock.tick() => {
                    for candle in book.close_all() {
                        self.hub.publish_stat(&candle).await;
                    }
                }
            }
        }
        info!("statistic worker stopped");
    }

    async fn complete_deals(&self, token: CancellationToken, mut ticks: mpsc::Receiver<Tick>) {
        info!("matching worker started");
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                tick = ticks.recv() => match tick {
                    Some(tick) => self.match_tick(&tick).await,
                    None => break,
                },
            }
        }
        info!("matching worker stopped");
    }

    /// Completes every queued deal crossed by `tick`.
    ///
    /// Inventory mutation and the completion check run under the inventory
    /// lock, one deal at a time; publication happens outside it so no lock is
    /// held across a channel send.
    async fn match_tick(&self, tick: &Tick) {
        for mut deal in self.queue.get(&tick.ticker, tick.price) {
            let completed = {
                let mut inventory = self.inventory.lock();
                if deal.price > 0.0 && inventory.get(&deal.ticker).copied().unwrap_or(0) > 0 {
                    self.complete_purchase(&mut inventory, &mut deal);
                    true
                } else if deal.price < 0.0 {
                    self.complete_sale(&mut inventory, &mut deal);
                    true
                } else {
                    false
                }
            };

            if completed {
                self.hub.publish_deal(&deal).await;
            }
        }
    }

    /// A buy consumes inventory; if it runs short, the deal amount is capped
    /// to what was available and the deal is flagged partial.
    fn complete_purchase(&self, inventory: &mut HashMap<String, i32>, deal: &mut Deal) {
        let available = inventory.entry(deal.ticker.clone()).or_insert(0);
        if *available < deal.amount {
            deal.amount = *available;
            deal.partial = true;
            *available = 0;
        } else {
            *available -= deal.amount;
        }

        self.queue.delete(deal.id);
    }

    /// A sale replenishes inventory without bound.
    fn complete_sale(&self, inventory: &mut HashMap<String, i32>, deal: &mut Deal) {
        *inventory.entry(deal.ticker.clone()).or_insert(0) += deal.amount;

        self.queue.delete(deal.id);
    }
}

/// Tee: retransmits every tick to each downstream channel, preserving order.
/// Downstream slowness backpressures the whole pipeline.
async fn retransmit(
    token: CancellationToken,
    mut ticks: mpsc::Receiver<Tick>,
    outs: Vec<mpsc::Sender<Tick>>,
) {
    loop {
        tokio::select! {
            _ = token.cancelled() => return,
            tick = ticks.recv() => match tick {
                Some(tick) => {
                    for tx in &outs {
                        if tx.send(tick.clone()).await.is_err() {
                            return;
                        }
                    }
                }
                None => return,
            },
        }
    }
}
