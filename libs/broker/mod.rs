//! Broker core: order gateway and durable bookkeeping over the exchange
//! streams.
//!
//! The broker forwards client orders to the exchange, consumes the fill and
//! candle streams, and applies their balance/position effects to Postgres.

pub mod delivery;
pub mod domain;
pub mod error;
pub mod repository;
pub mod services;

pub use domain::{Client, Deal, DealStatus, DealType, Ohlcv, Position, Profile};
pub use error::{BrokerError, Result};
pub use services::BrokerService;
