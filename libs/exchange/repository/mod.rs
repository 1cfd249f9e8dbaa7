//! Storage of live orders.

mod memory;

pub use memory::MemoryDealQueue;

use crate::domain::Deal;

/// Thread-safe collection of live orders, queryable by crossing.
pub trait DealQueue: Send + Sync {
    /// Adds a deal to the queue.
    fn add(&self, deal: Deal);

    /// Returns, in insertion order, the deals on `ticker` whose limit is
    /// satisfied by the tick price.
    fn get(&self, ticker: &str, price: f64) -> Vec<Deal>;

    /// Removes a deal by id; reports whether anything was removed.
    fn delete(&self, deal_id: i64) -> bool;
}
