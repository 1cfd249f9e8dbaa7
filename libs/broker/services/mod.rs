//! Broker orchestration: stream consumers and client-facing operations.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::delivery::exchange::ExchangeGateway;
use crate::domain::{Client, Deal, DealStatus, DealType, Ohlcv, Position, Profile, STARTING_BALANCE};
use crate::error::Result;
use crate::repository::{ClientRepo, DealRepo, PositionRepo, StatisticRepo};

const CHANNEL_CAPACITY: usize = 100;

/// The broker service: bridges exchange streams into the durable store and
/// exposes the client-facing operations.
pub struct BrokerService {
    clients: Arc<dyn ClientRepo>,
    deals: Arc<dyn DealRepo>,
    positions: Arc<dyn PositionRepo>,
    stats: Arc<dyn StatisticRepo>,
    exchange: Arc<dyn ExchangeGateway>,
    cancel: Mutex<Option<CancellationToken>>,
}

impl BrokerService {
    pub fn new(
        clients: Arc<dyn ClientRepo>,
        deals: Arc<dyn DealRepo>,
        positions: Arc<dyn PositionRepo>,
        stats: Arc<dyn StatisticRepo>,
        exchange: Arc<dyn ExchangeGateway>,
    ) -> Self {
        Self {
            clients,
            deals,
            positions,
            stats,
            exchange,
            cancel: Mutex::new(None),
        }
    }

    /// Runs the stat and result consumers until cancellation.
    pub async fn start(self: Arc<Self>) {
        let token = CancellationToken::new();
        *self.cancel.lock() = Some(token.clone());

        let mut workers = JoinSet::new();
        {
            let service = Arc::clone(&self);
            let token = token.clone();
            workers.spawn(async move { service.consume_statistic(token).await });
        }
        {
            let service = Arc::clone(&self);
            let token = token.clone();
            workers.spawn(async move { service.consume_results(token).await });
        }

        info!("started");
        while let Some(joined) = workers.join_next().await {
            if let Err(err) = joined {
                error!(%err, "worker failed");
            }
        }
        info!("stopped");
    }

    /// Cancels the consumers. An error is logged if the service was never
    /// started.
    pub fn stop(&self) {
        match self.cancel.lock().take() {
            Some(token) => token.cancel(),
            None => error!("stop requested but the service was never started"),
        }
    }

    /// Returns the client for `login`, creating it with the starting balance
    /// on first contact.
    pub async fn get_client(&self, login: &str) -> Result<Client> {
        if let Some(client) = self.clients.get(login).await? {
            return Ok(client);
        }

        let mut client = Client {
            id: 0,
            login: login.to_string(),
            balance: STARTING_BALANCE,
        };
        self.clients.add(&mut client).await?;
        info!(login, client = client.id, "created new client");

        Ok(client)
    }

    /// Balance, positions and open deals for `login`.
    pub async fn get_profile(&self, login: &str) -> Result<Profile> {
        let client = self.get_client(login).await?;
        let positions = self.positions.get(client.id).await?;
        let open_deals = self.deals.get_opened(client.id).await?;

        Ok(Profile {
            client_id: client.id,
            balance: client.balance,
            positions,
            open_deals,
        })
    }

    /// Forwards the deal to the exchange, then records it locally as New
    /// under the exchange-assigned id.
    pub async fn create(&self, mut deal: Deal) -> Result<Deal> {
        deal.id = self.exchange.create(&deal).await?;
        deal.status = DealStatus::New;
        self.deals.add(&deal).await?;

        Ok(deal)
    }

    /// Forwards the cancel to the exchange; marks the local deal Canceled
    /// only when the exchange actually removed it.
    pub async fn cancel(&self, deal_id: i64) -> Result<bool> {
        let ok = self.exchange.cancel(deal_id).await?;
        if ok {
            self.deals.update_status(deal_id, DealStatus::Canceled).await?;
        }

        Ok(ok)
    }

    /// Most recent stored candles for `ticker`, newest first.
    pub async fn history(&self, ticker: &str) -> Result<Vec<Ohlcv>> {
        self.stats.get(ticker).await
    }

    async fn consume_statistic(&self, token: CancellationToken) {
        let (tx, mut rx) = mpsc::channel(CHANNEL_CAPACITY);
        let exchange = Arc::clone(&self.exchange);
        let pump = tokio::spawn(async move {
            if let Err(err) = exchange.statistic(token, tx).await {
                error!(%err, "statistic stream failed");
            }
        });

        info!("statistic consumer started");
        while let Some(candle) = rx.recv().await {
            if let Err(err) = self.stats.add(&candle).await {
                error!(ticker = %candle.ticker, %err, "failed to store candle");
            }
        }
        let _ = pump.await;
        info!("statistic consumer stopped");
    }

    async fn consume_results(&self, token: CancellationToken) {
        let (tx, mut rx) = mpsc::channel(CHANNEL_CAPACITY);
        let exchange = Arc::clone(&self.exchange);
        let pump = tokio::spawn(async move {
            if let Err(err) = exchange.results(token, tx).await {
                error!(%err, "results stream failed");
            }
        });

        info!("results consumer started");
        while let Some(deal) = rx.recv().await {
            self.apply_fill(deal).await;
        }
        let _ = pump.await;
        info!("results consumer stopped");
    }

    /// Applies one completed fill: persist the deal outcome, then adjust the
    /// position, then the balance. The three writes are not transactional;
    /// each failure is logged and the fill is abandoned where it stopped.
    async fn apply_fill(&self, deal: Deal) {
        if let Err(err) = self.deals.update(&deal).await {
            error!(deal = deal.id, %err, "failed to update deal");
            return;
        }

        let position = Position {
            client_id: deal.client_id,
            ticker: deal.ticker.clone(),
            amount: deal.amount,
        };
        let adjusted = match deal.deal_type {
            DealType::Buy => self.positions.add(&position).await,
            DealType::Sell => self.positions.remove(&position).await,
        };
        if let Err(err) = adjusted {
            error!(deal = deal.id, %err, "failed to adjust position");
            return;
        }

        let total = deal.price * f64::from(deal.amount);
        let balanced = match deal.deal_type {
            DealType::Buy => self.clients.sub_balance(deal.client_id, total).await,
            DealType::Sell => self.clients.sum_balance(deal.client_id, total).await,
        };
        if let Err(err) = balanced {
            error!(deal = deal.id, %err, "failed to adjust balance");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicI64, Ordering};

    use async_trait::async_trait;
    use chrono::Utc;
    use parking_lot::Mutex;

    use super::*;
    use crate::error::BrokerError;

    #[derive(Default)]
    struct MemClients {
        next_id: AtomicI64,
        clients: Mutex<Vec<Client>>,
    }

    #[async_trait]
    impl ClientRepo for MemClients {
        async fn add(&self, client: &mut Client) -> Result<()> {
            client.id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            self.clients.lock().push(client.clone());
            Ok(())
        }

        async fn get(&self, login: &str) -> Result<Option<Client>> {
            Ok(self
                .clients
                .lock()
                .iter()
                .find(|client| client.login == login)
                .cloned())
        }

        async fn sum_balance(&self, client_id: i64, amount: f64) -> Result<()> {
            let mut clients = self.clients.lock();
            if let Some(client) = clients.iter_mut().find(|client| client.id == client_id) {
                client.balance += amount;
            }
            Ok(())
        }

        async fn sub_balance(&self, client_id: i64, amount: f64) -> Result<()> {
            self.sum_balance(client_id, -amount).await
        }
    }

    #[derive(Default)]
    struct MemDeals {
        deals: Mutex<Vec<Deal>>,
        fail_updates: bool,
    }

    #[async_trait]
    impl DealRepo for MemDeals {
        async fn add(&self, deal: &Deal) -> Result<()> {
            self.deals.lock().push(deal.clone());
            Ok(())
        }

        async fn get_opened(&self, client_id: i64) -> Result<Vec<Deal>> {
            Ok(self
                .deals
                .lock()
                .iter()
                .filter(|deal| deal.client_id == client_id && deal.status == DealStatus::New)
                .cloned()
                .collect())
        }

        async fn update(&self, deal: &Deal) -> Result<()> {
            if self.fail_updates {
                return Err(BrokerError::Database(sqlx::Error::PoolClosed));
            }
            let mut deals = self.deals.lock();
            if let Some(stored) = deals.iter_mut().find(|stored| stored.id == deal.id) {
                *stored = deal.clone();
            } else {
                deals.push(deal.clone());
            }
            Ok(())
        }

        async fn update_status(&self, deal_id: i64, status: DealStatus) -> Result<()> {
            let mut deals = self.deals.lock();
            if let Some(stored) = deals.iter_mut().find(|stored| stored.id == deal_id) {
                stored.status = status;
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemPositions {
        positions: Mutex<HashMap<(i64, String), i32>>,
    }

    #[async_trait]
    impl PositionRepo for MemPositions {
        async fn add(&self, position: &Position) -> Result<()> {
            *self
                .positions
                .lock()
                .entry((position.client_id, position.ticker.clone()))
                .or_insert(0) += position.amount;
            Ok(())
        }

        async fn get(&self, client_id: i64) -> Result<Vec<Position>> {
            Ok(self
                .positions
                .lock()
                .iter()
                .filter(|((id, _), _)| *id == client_id)
                .map(|((id, ticker), amount)| Position {
                    client_id: *id,
                    ticker: ticker.clone(),
                    amount: *amount,
                })
                .collect())
        }

        async fn remove(&self, position: &Position) -> Result<()> {
            *self
                .positions
                .lock()
                .entry((position.client_id, position.ticker.clone()))
                .or_insert(0) -= position.amount;
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemStats {
        candles: Mutex<Vec<Ohlcv>>,
    }

    #[async_trait]
    impl StatisticRepo for MemStats {
        async fn add(&self, candle: &Ohlcv) -> Result<()> {
            self.candles.lock().push(candle.clone());
            Ok(())
        }

        async fn get(&self, ticker: &str) -> Result<Vec<Ohlcv>> {
            Ok(self
                .candles
                .lock()
                .iter()
                .filter(|candle| candle.ticker == ticker)
                .cloned()
                .collect())
        }
    }

    struct FakeExchange {
        next_id: AtomicI64,
        cancel_ok: bool,
    }

    impl FakeExchange {
        fn new(cancel_ok: bool) -> Self {
            Self {
                next_id: AtomicI64::new(1000),
                cancel_ok,
            }
        }
    }

    #[async_trait]
    impl ExchangeGateway for FakeExchange {
        async fn create(&self, _deal: &Deal) -> Result<i64> {
            Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
        }

        async fn cancel(&self, _deal_id: i64) -> Result<bool> {
            Ok(self.cancel_ok)
        }

        async fn statistic(
            &self,
            _token: CancellationToken,
            _out: mpsc::Sender<Ohlcv>,
        ) -> Result<()> {
            Ok(())
        }

        async fn results(&self, _token: CancellationToken, _out: mpsc::Sender<Deal>) -> Result<()> {
            Ok(())
        }
    }

    struct Fixture {
        service: Arc<BrokerService>,
        clients: Arc<MemClients>,
        deals: Arc<MemDeals>,
        positions: Arc<MemPositions>,
    }

    fn fixture_with(deals: MemDeals, cancel_ok: bool) -> Fixture {
        let clients = Arc::new(MemClients::default());
        let deals = Arc::new(deals);
        let positions = Arc::new(MemPositions::default());
        let stats = Arc::new(MemStats::default());

        let service = Arc::new(BrokerService::new(
            Arc::clone(&clients) as Arc<dyn ClientRepo>,
            Arc::clone(&deals) as Arc<dyn DealRepo>,
            Arc::clone(&positions) as Arc<dyn PositionRepo>,
            stats as Arc<dyn StatisticRepo>,
            Arc::new(FakeExchange::new(cancel_ok)) as Arc<dyn ExchangeGateway>,
        ));

        Fixture {
            service,
            clients,
            deals,
            positions,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(MemDeals::default(), true)
    }

    fn fill(client_id: i64, deal_type: DealType, amount: i32, price: f64) -> Deal {
        Deal {
            id: 7,
            client_id,
            ticker: "SPFB.RTS".to_string(),
            deal_type,
            amount,
            partial: false,
            price,
            status: DealStatus::Completed,
            time: Utc::now(),
        }
    }

    #[tokio::test]
    async fn unknown_login_gets_the_starting_balance() {
        let fx = fixture();

        let client = fx.service.get_client("alice").await.unwrap();
        assert_eq!(client.balance, STARTING_BALANCE);
        assert!(client.id > 0);

        // A second lookup reuses the stored client.
        let again = fx.service.get_client("alice").await.unwrap();
        assert_eq!(again.id, client.id);
        assert_eq!(fx.clients.clients.lock().len(), 1);
    }

    #[tokio::test]
    async fn create_records_the_deal_under_the_exchange_id() {
        let fx = fixture();

        let deal = fx
            .service
            .create(fill(1, DealType::Buy, 400, 1000.0))
            .await
            .unwrap();

        assert_eq!(deal.id, 1000);
        assert_eq!(deal.status, DealStatus::New);

        let stored = fx.deals.deals.lock();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].id, 1000);
        assert_eq!(stored[0].status, DealStatus::New);
    }

    #[tokio::test]
    async fn cancel_marks_the_local_deal_canceled() {
        let fx = fixture();
        let deal = fx
            .service
            .create(fill(1, DealType::Buy, 400, 1000.0))
            .await
            .unwrap();

        assert!(fx.service.cancel(deal.id).await.unwrap());
        assert_eq!(fx.deals.deals.lock()[0].status, DealStatus::Canceled);
    }

    #[tokio::test]
    async fn declined_cancel_leaves_the_deal_open() {
        let fx = fixture_with(MemDeals::default(), false);
        let deal = fx
            .service
            .create(fill(1, DealType::Buy, 400, 1000.0))
            .await
            .unwrap();

        assert!(!fx.service.cancel(deal.id).await.unwrap());
        assert_eq!(fx.deals.deals.lock()[0].status, DealStatus::New);
    }

    #[tokio::test]
    async fn buy_fill_debits_balance_and_adds_position() {
        let fx = fixture();
        let client = fx.service.get_client("alice").await.unwrap();

        fx.service
            .apply_fill(fill(client.id, DealType::Buy, 400, 1000.0))
            .await;

        let profile = fx.service.get_profile("alice").await.unwrap();
        assert_eq!(profile.balance, STARTING_BALANCE - 400_000.0);
        assert_eq!(profile.positions.len(), 1);
        assert_eq!(profile.positions[0].amount, 400);
    }

    #[tokio::test]
    async fn sell_fill_credits_balance_and_removes_position() {
        let fx = fixture();
        let client = fx.service.get_client("bob").await.unwrap();
        fx.positions
            .add(&Position {
                client_id: client.id,
                ticker: "SPFB.RTS".to_string(),
                amount: 500,
            })
            .await
            .unwrap();

        fx.service
            .apply_fill(fill(client.id, DealType::Sell, 300, 150.0))
            .await;

        let profile = fx.service.get_profile("bob").await.unwrap();
        assert_eq!(profile.balance, STARTING_BALANCE + 45_000.0);
        assert_eq!(profile.positions[0].amount, 200);
    }

    #[tokio::test]
    async fn failed_deal_update_skips_the_side_effects() {
        let fx = fixture_with(
            MemDeals {
                fail_updates: true,
                ..MemDeals::default()
            },
            true,
        );
        let client = fx.service.get_client("carol").await.unwrap();

        fx.service
            .apply_fill(fill(client.id, DealType::Buy, 400, 1000.0))
            .await;

        let profile = fx.service.get_profile("carol").await.unwrap();
        assert_eq!(profile.balance, STARTING_BALANCE);
        assert!(profile.positions.is_empty());
    }

    #[tokio::test]
    async fn profile_lists_only_open_deals() {
        let fx = fixture();
        let client = fx.service.get_client("dave").await.unwrap();

        let open = fx
            .service
            .create(fill(client.id, DealType::Buy, 10, 100.0))
            .await
            .unwrap();
        let canceled = fx
            .service
            .create(fill(client.id, DealType::Buy, 20, 100.0))
            .await
            .unwrap();
        fx.service.cancel(canceled.id).await.unwrap();

        let profile = fx.service.get_profile("dave").await.unwrap();
        assert_eq!(profile.open_deals.len(), 1);
        assert_eq!(profile.open_deals[0].id, open.id);
    }

    #[tokio::test]
    async fn stop_before_start_does_not_panic() {
        let fx = fixture();
        fx.service.stop();
    }
}
