//! Client side of the exchange gRPC service.
//!
//! Translates between sign-free broker deals and the signed-price exchange
//! wire, and pumps the server streams into bounded channels.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tonic::transport::Channel;
use tonic::Code;
use tracing::info;
use venue_proto as proto;
use venue_proto::exchange_client::ExchangeClient;

use crate::domain::{Deal, DealStatus, DealType, Ohlcv};
use crate::error::Result;

const UNARY_TIMEOUT: Duration = Duration::from_secs(10);

/// Seam between the broker service and the exchange transport.
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Sends a new deal; returns the exchange-assigned id.
    async fn create(&self, deal: &Deal) -> Result<i64>;

    /// Asks the exchange to drop a queued deal.
    async fn cancel(&self, deal_id: i64) -> Result<bool>;

    /// Pumps the candle stream into `out` until cancellation or stream end.
    /// `out` is dropped on return, which ends the consumer loop cleanly.
    async fn statistic(&self, token: CancellationToken, out: mpsc::Sender<Ohlcv>) -> Result<()>;

    /// Pumps completed deals into `out` until cancellation or stream end.
    async fn results(&self, token: CancellationToken, out: mpsc::Sender<Deal>) -> Result<()>;
}

/// gRPC-backed gateway bound to one broker id.
pub struct RpcExchangeGateway {
    broker_id: i64,
    client: ExchangeClient<Channel>,
}

impl RpcExchangeGateway {
    pub async fn connect(addr: String, broker_id: i64) -> Result<Self> {
        let client = ExchangeClient::connect(addr).await?;

        Ok(Self { broker_id, client })
    }
}

/// Folds the deal side into the signed wire price.
fn encode_price(deal_type: DealType, price: f64) -> f64 {
    match deal_type {
        DealType::Buy => price,
        DealType::Sell => -price,
    }
}

/// Splits a signed wire price back into side and absolute price.
fn decode_price(price: f64) -> (DealType, f64) {
    if price < 0.0 {
        (DealType::Sell, -price)
    } else {
        (DealType::Buy, price)
    }
}

/// Remote cancellation and server unavailability close streams cleanly.
fn is_stream_end(status: &tonic::Status) -> bool {
    matches!(status.code(), Code::Cancelled | Code::Unavailable)
}

fn deal_from_wire(deal: proto::Deal) -> Deal {
    let (deal_type, price) = decode_price(deal.price);

    Deal {
        id: deal.id,
        client_id: deal.client_id,
        ticker: deal.ticker,
        deal_type,
        amount: deal.amount,
        partial: deal.partial,
        price,
        status: DealStatus::Completed,
        time: DateTime::from_timestamp(deal.time, 0).unwrap_or_else(Utc::now),
    }
}

fn ohlcv_from_wire(candle: proto::Ohlcv) -> Ohlcv {
    Ohlcv {
        id: candle.id,
        ticker: candle.ticker,
        time: DateTime::from_timestamp(candle.time, 0).unwrap_or_else(Utc::now),
        interval: Duration::from_secs(candle.interval.max(0) as u64),
        open: candle.open,
        high: candle.high,
        low: candle.low,
        close: candle.close,
        volume: candle.volume,
    }
}

#[async_trait]
impl ExchangeGateway for RpcExchangeGateway {
    async fn create(&self, deal: &Deal) -> Result<i64> {
        let request = proto::Deal {
            id: 0,
            broker_id: self.broker_id,
            client_id: deal.client_id,
            ticker: deal.ticker.clone(),
            amount: deal.amount,
            partial: false,
            time: deal.time.timestamp(),
            price: encode_price(deal.deal_type, deal.price),
        };

        let mut client = self.client.clone();
        let response = timeout(UNARY_TIMEOUT, client.create(request)).await??;

        Ok(response.into_inner().id)
    }

    async fn cancel(&self, deal_id: i64) -> Result<bool> {
        let request = proto::DealId {
            id: deal_id,
            broker_id: self.broker_id,
        };

        let mut client = self.client.clone();
        let response = timeout(UNARY_TIMEOUT, client.cancel(request)).await??;

        Ok(response.into_inner().success)
    }

    async fn statistic(&self, token: CancellationToken, out: mpsc::Sender<Ohlcv>) -> Result<()> {
        let mut client = self.client.clone();
        let mut stream = client
            .statistic(proto::BrokerId { id: self.broker_id })
            .await?
            .into_inner();

        info!(broker = self.broker_id, "statistic stream opened");
        loop {
            tokio::select! {
                _ = token.cancelled() => return Ok(()),
                message = stream.message() => match message {
                    Ok(Some(candle)) => {
                        if out.send(ohlcv_from_wire(candle)).await.is_err() {
                            return Ok(());
                        }
                    }
                    Ok(None) => return Ok(()),
                    Err(status) if is_stream_end(&status) => return Ok(()),
                    Err(status) => return Err(status.into()),
                },
            }
        }
    }

    async fn results(&self, token: CancellationToken, out: mpsc::Sender<Deal>) -> Result<()> {
        let mut client = self.client.clone();
        let mut stream = client
            .results(proto::BrokerId { id: self.broker_id })
            .await?
            .into_inner();

        info!(broker = self.broker_id, "results stream opened");
        loop {
            tokio::select! {
                _ = token.cancelled() => return Ok(()),
                message = stream.message() => match message {
                    Ok(Some(deal)) => {
                        if out.send(deal_from_wire(deal)).await.is_err() {
                            return Ok(());
                        }
                    }
                    Ok(None) => return Ok(()),
                    Err(status) if is_stream_end(&status) => return Ok(()),
                    Err(status) => return Err(status.into()),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_sign_round_trips_for_both_sides() {
        for (deal_type, price) in [(DealType::Buy, 1000.0), (DealType::Sell, 150.5)] {
            let encoded = encode_price(deal_type, price);
            assert_eq!(decode_price(encoded), (deal_type, price));
        }
    }

    #[test]
    fn buys_stay_positive_and_sells_go_negative() {
        assert_eq!(encode_price(DealType::Buy, 1000.0), 1000.0);
        assert_eq!(encode_price(DealType::Sell, 1000.0), -1000.0);
    }

    #[test]
    fn fills_decode_as_completed_deals() {
        let deal = deal_from_wire(proto::Deal {
            id: 5,
            broker_id: 1,
            client_id: 2,
            ticker: "GAZP".to_string(),
            amount: 300,
            partial: true,
            time: 1_562_222_000,
            price: -150.0,
        });

        assert_eq!(deal.deal_type, DealType::Sell);
        assert_eq!(deal.price, 150.0);
        assert_eq!(deal.status, DealStatus::Completed);
        assert!(deal.partial);
    }

    #[test]
    fn transport_shutdown_codes_end_streams_cleanly() {
        assert!(is_stream_end(&tonic::Status::cancelled("client went away")));
        assert!(is_stream_end(&tonic::Status::unavailable("server stopped")));
        assert!(!is_stream_end(&tonic::Status::internal("boom")));
    }
}
