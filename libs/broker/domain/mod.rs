//! Broker-side domain types.
//!
//! Prices here are sign-free; the side lives in an explicit [`DealType`] and
//! is folded into the price sign only at the exchange wire boundary.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::error::BrokerError;

/// Balance granted to a login on first contact.
pub const STARTING_BALANCE: f64 = 100_000_000.0;

/// Deal side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DealType {
    Buy,
    Sell,
}

impl DealType {
    pub fn as_str(self) -> &'static str {
        match self {
            DealType::Buy => "BUY",
            DealType::Sell => "SELL",
        }
    }
}

impl fmt::Display for DealType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DealType {
    type Err = BrokerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUY" => Ok(DealType::Buy),
            "SELL" => Ok(DealType::Sell),
            other => Err(BrokerError::UnknownDealType(other.to_string())),
        }
    }
}

/// Deal lifecycle. New deals either complete (possibly partially) or get
/// canceled; both end states are terminal and persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DealStatus {
    New,
    Completed,
    Canceled,
}

impl DealStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DealStatus::New => "NEW",
            DealStatus::Completed => "COMPLETED",
            DealStatus::Canceled => "CANCELED",
        }
    }
}

impl fmt::Display for DealStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DealStatus {
    type Err = BrokerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(DealStatus::New),
            "COMPLETED" => Ok(DealStatus::Completed),
            "CANCELED" => Ok(DealStatus::Canceled),
            other => Err(BrokerError::UnknownDealStatus(other.to_string())),
        }
    }
}

/// A broker client.
#[derive(Debug, Clone, PartialEq)]
pub struct Client {
    pub id: i64,
    pub login: String,
    pub balance: f64,
}

/// A client deal as the broker records it.
#[derive(Debug, Clone, PartialEq)]
pub struct Deal {
    pub id: i64,
    pub client_id: i64,
    pub ticker: String,
    pub deal_type: DealType,
    pub amount: i32,
    pub partial: bool,
    pub price: f64,
    pub status: DealStatus,
    pub time: DateTime<Utc>,
}

/// A client's holding in one ticker.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub client_id: i64,
    pub ticker: String,
    pub amount: i32,
}

/// Aggregated client view: balance, holdings and open deals.
#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub client_id: i64,
    pub balance: f64,
    pub positions: Vec<Position>,
    pub open_deals: Vec<Deal>,
}

/// Stored OHLCV candle, mirroring the exchange statistic.
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
