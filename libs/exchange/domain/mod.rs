//! Core exchange types.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// A discrete price/volume sample for one ticker at a point in time.
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub ticker: String,
    pub price: f64,
    pub volume: i32,
}

/// A queued or completed order.
///
/// The price is signed on the exchange side: positive buys at the limit,
/// negative sells at the absolute value. Brokers keep sign-free prices and
/// translate at the wire boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct Deal {
    pub id: i64,
    pub broker_id: i64,
    pub client_id: i64,
    pub ticker: String,
    pub amount: i32,
    pub partial: bool,
    pub time: DateTime<Utc>,
    pub price: f64,
}

/// OHLCV aggregate for one ticker over one interval.
#[derive(Debug, Clone, PartialEq)]
pub struct Ohlcv {
    pub id: i64,
    pub ticker: String,
    pub time: DateTime<Utc>,
    pub interval: Duration,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i32,
}

/// Identity of one subscription stream.
///
/// The same broker may hold several concurrent streams; `instance_id` is a
/// fresh nonce per stream and the pair is the map key, so overlapping
/// subscriptions never clobber each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscriber {
    pub broker_id: i64,
    pub instance_id: i64,
}

impl Subscriber {
    /// Mints a subscription identity with a fresh instance nonce.
    pub fn new(broker_id: i64) -> Self {
        Self {
            broker_id,
            instance_id: nano_id(),
        }
    }
}

/// Wall-clock id with nanosecond resolution, used for deal ids, candle
/// nonces and stream instance ids.
pub fn nano_id() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}
