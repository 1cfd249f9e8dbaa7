use parking_lot::RwLock;

use super::DealQueue;
use crate::domain::Deal;

/// In-memory deal queue behind a reader-writer lock.
///
/// Not persisted across restarts; the broker is the system of record for
/// terminal deal states.
#[derive(Debug, Default)]
pub struct MemoryDealQueue {
    deals: RwLock<Vec<Deal>>,
}

impl MemoryDealQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A queued order with signed price `p` crosses tick price `t` iff it is a
/// buy with a limit at or above the tick, or a sell with a limit at or below
/// it.
fn crosses(queued_price: f64, tick_price: f64) -> bool {
    (queued_price > 0.0 && queued_price >= tick_price)
        || (queued_price < 0.0 && -queued_price <= tick_price)
}

impl DealQueue for MemoryDealQueue {
    fn add(&self, deal: Deal) {
        self.deals.write().push(deal);
    }

    fn get(&self, ticker: &str, price: f64) -> Vec<Deal> {
        self.deals
            .read()
            .iter()
            .filter(|deal| deal.ticker == ticker && crosses(deal.price, price))
            .cloned()
            .collect()
    }

    fn delete(&self, deal_id: i64) -> bool {
        let mut deals = self.deals.write();
        match deals.iter().position(|deal| deal.id == deal_id) {
            Some(idx) => {
                deals.remove(idx);
                true
            }
            None => false,
        }
    }
}
