//! Order-matching and market-data core of the simulated venue.
//!
//! The exchange replays historical tick tapes, matches queued orders against
//! the incoming ticks, folds ticks into OHLCV candles and fans both fills and
//! candles out to broker subscriptions over gRPC.

pub mod delivery;
pub mod domain;
pub mod error;
pub mod repository;
pub mod services;

pub use domain::{Deal, Ohlcv, Subscriber, Tick};
pub use error::{ExchangeError, Result};
pub use repository::{DealQueue, MemoryDealQueue};
pub use services::exchange::ExchangeService;
pub use services::tick::TickReader;
