//! Fan-out of candles and completed deals to broker subscriptions.

use std::collections::HashMap;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::debug;

use crate::domain::{Deal, Ohlcv, Subscriber};

/// Dynamic registry of per-broker result and stat channels.
///
/// Mutations and iterations run under a reader-writer lock; fan-out snapshots
/// the senders under the read lock and sends outside it, so a blocking send
/// never holds the lock and registration changes during delivery are safe.
#[derive(Debug, Default)]
pub struct SubscriptionHub {
    stats: RwLock<HashMap<Subscriber, mpsc::Sender<Ohlcv>>>,
    deals: RwLock<HashMap<Subscriber, mpsc::Sender<Deal>>>,
}

impl SubscriptionHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe_stats(&self, subscriber: Subscriber, tx: mpsc::Sender<Ohlcv>) {
        self.stats.write().insert(subscriber, tx);
    }

    pub fn unsubscribe_stats(&self, subscriber: &Subscriber) {
        self.stats.write().remove(subscriber);
    }

    pub fn subscribe_deals(&self, subscriber: Subscriber, tx: mpsc::Sender<Deal>) {
        self.deals.write().insert(subscriber, tx);
    }

    pub fn unsubscribe_deals(&self, subscriber: &Subscriber) {
        self.deals.write().remove(subscriber);
    }

    #[cfg(test)]
    pub(crate) fn stat_subscribers(&self) -> usize {
        self.stats.read().len()
    }

    #[cfg(test)]
    pub(crate) fn deal_subscribers(&self) -> usize {
        self.deals.read().len()
    }

    /// Delivers a closed candle to every stat subscriber.
    pub async fn publish_stat(&self, candle: &Ohlcv) {
        let targets: Vec<mpsc::Sender<Ohlcv>> = self.stats.read().values().cloned().collect();

        for tx in targets {
            if tx.send(candle.clone()).await.is_err() {
                debug!(ticker = %candle.ticker, "stat subscriber is gone");
            }
        }
    }

    /// Delivers a completed deal to the subscriptions of its broker only.
    pub async fn publish_deal(&self, deal: &Deal) {
        let targets: Vec<mpsc::Sender<Deal>> = self
            .deals
            .read()
            .iter()
            .filter(|(subscriber, _)| subscriber.broker_id == deal.broker_id)
            .map(|(_, tx)| tx.clone())
            .collect();

        for tx in targets {
            if tx.send(deal.clone()).await.is_err() {
                debug!(deal = deal.id, "result subscriber is gone");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;

    use super::*;

    fn fill(broker_id: i64) -> Deal {
        Deal {
            id: 7,
            broker_id,
            client_id: 1,
            ticker: "SPFB.RTS".to_string(),
            amount: 10,
            partial: false,
            time: Utc::now(),
            price: 1000.0,
        }
    }

    fn candle() -> Ohlcv {
        Ohlcv {
            id: 1,
            ticker: "SPFB.RTS".to_string(),
            time: Utc::now(),
            interval: Duration::from_secs(5),
            open: 1.0,
            high: 2.0,
            low: 0.5,
            close: 1.5,
            volume: 3,
        }
    }

    #[tokio::test]
    async fn deals_go_only_to_the_matching_broker() {
        let hub = SubscriptionHub::new();
        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        hub.subscribe_deals(Subscriber::new(1), tx1);
        hub.subscribe_deals(Subscriber::new(2), tx2);

        hub.publish_deal(&fill(1)).await;

        assert_eq!(rx1.try_recv().unwrap().broker_id, 1);
        assert!(rx2.try_recv().is_err());
    }

    #[tokio::test]
    async fn unsubscribed_channel_stays_silent() {
        let hub = SubscriptionHub::new();
        let (tx, mut rx) = mpsc::channel(8);
        let subscriber = Subscriber::new(1);
        hub.subscribe_deals(subscriber, tx);

        hub.publish_deal(&fill(1)).await;
        assert!(rx.try_recv().is_ok());

        hub.unsubscribe_deals(&subscriber);
        hub.publish_deal(&fill(1)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn one_broker_may_hold_overlapping_streams() {
        let hub = SubscriptionHub::new();
        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        let first = Subscriber {
            broker_id: 1,
            instance_id: 1,
        };
        let second = Subscriber {
            broker_id: 1,
            instance_id: 2,
        };
        hub.subscribe_deals(first, tx1);
        hub.subscribe_deals(second, tx2);

        hub.publish_deal(&fill(1)).await;

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());

        // Dropping one stream must not detach the other.
        hub.unsubscribe_deals(&first);
        hub.publish_deal(&fill(1)).await;
        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn stats_fan_out_to_every_broker() {
        let hub = SubscriptionHub::new();
        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        hub.subscribe_stats(Subscriber::new(1), tx1);
        hub.subscribe_stats(Subscriber::new(2), tx2);

        hub.publish_stat(&candle()).await;

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[tokio::test]
    async fn closed_receiver_does_not_stall_the_rest() {
        let hub = SubscriptionHub::new();
        let (tx1, rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        hub.subscribe_deals(
            Subscriber {
                broker_id: 1,
                instance_id: 1,
            },
            tx1,
        );
        hub.subscribe_deals(
            Subscriber {
                broker_id: 1,
                instance_id: 2,
            },
            tx2,
        );
        drop(rx1);

        hub.publish_deal(&fill(1)).await;

        assert!(rx2.try_recv().is_ok());
    }
}
