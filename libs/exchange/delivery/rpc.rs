//! gRPC delivery for the exchange service.
//!
//! Stream subscriptions are released through a drop guard, so client
//! disconnects, cancellation and server shutdown all detach the subscriber
//! the same way.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};
use tracing::info;
use venue_proto as proto;
use venue_proto::exchange_server::Exchange;

use crate::domain::{Deal, Ohlcv, Subscriber};
use crate::services::exchange::ExchangeService;

const STREAM_CAPACITY: usize = 100;

/// tonic-facing wrapper over [`ExchangeService`].
pub struct ExchangeRpc {
    service: Arc<ExchangeService>,
}

impl ExchangeRpc {
    pub fn new(service: Arc<ExchangeService>) -> Self {
        Self { service }
    }
}

#[tonic::async_trait]
impl Exchange for ExchangeRpc {
    type StatisticStream = StatisticStream;
    type ResultsStream = ResultsStream;

    async fn create(
        &self,
        request: Request<proto::Deal>,
    ) -> Result<Response<proto::DealId>, Status> {
        let deal = deal_from_wire(request.into_inner());
        let broker_id = deal.broker_id;
        let deal = self.service.create(deal);

        info!(broker = broker_id, deal = deal.id, "handled create request");
        Ok(Response::new(proto::DealId {
            id: deal.id,
            broker_id,
        }))
    }

    async fn cancel(
        &self,
        request: Request<proto::DealId>,
    ) -> Result<Response<proto::CancelResult>, Status> {
        let request = request.into_inner();
        let success = self.service.cancel(request.id);

        info!(
            broker = request.broker_id,
            deal = request.id,
            success,
            "handled cancel request"
        );
        Ok(Response::new(proto::CancelResult { success }))
    }

    async fn statistic(
        &self,
        request: Request<proto::BrokerId>,
    ) -> Result<Response<Self::StatisticStream>, Status> {
        let subscriber = Subscriber::new(request.into_inner().id);
        let (tx, rx) = mpsc::channel(STREAM_CAPACITY);
        self.service.statistic(subscriber, tx);

        info!(broker = subscriber.broker_id, "streaming statistic");
        Ok(Response::new(StatisticStream {
            inner: ReceiverStream::new(rx),
            service: Arc::clone(&self.service),
            subscriber,
        }))
    }

    async fn results(
        &self,
        request: Request<proto::BrokerId>,
    ) -> Result<Response<Self::ResultsStream>, Status> {
        let subscriber = Subscriber::new(request.into_inner().id);
        let (tx, rx) = mpsc::channel(STREAM_CAPACITY);
        self.service.results(subscriber, tx);

        info!(broker = subscriber.broker_id, "streaming results");
        Ok(Response::new(ResultsStream {
            inner: ReceiverStream::new(rx),
            service: Arc::clone(&self.service),
            subscriber,
        }))
    }
}

/// Server stream of closed candles; dropping it releases the subscription.
pub struct StatisticStream {
    inner: ReceiverStream<Ohlcv>,
    service: Arc<ExchangeService>,
    subscriber: Subscriber,
}

impl Stream for StatisticStream {
    type Item = Result<proto::Ohlcv, Status>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner)
            .poll_next(cx)
            .map(|candle| candle.map(|candle| Ok(ohlcv_to_wire(candle))))
    }
}

impl Drop for StatisticStream {
    fn drop(&mut self) {
        info!(broker = self.subscriber.broker_id, "statistic stream closed");
        self.service.statistic_unsubscribe(&self.subscriber);
    }
}

/// Server stream of completed deals; dropping it releases the subscription.
pub struct ResultsStream {
    inner: ReceiverStream<Deal>,
    service: Arc<ExchangeService>,
    subscriber: Subscriber,
}

impl Stream for ResultsStream {
    type Item = Result<proto::Deal, Status>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner)
            .poll_next(cx)
            .map(|deal| deal.map(|deal| Ok(deal_to_wire(deal))))
    }
}

impl Drop for ResultsStream {
    fn drop(&mut self) {
        info!(broker = self.subscriber.broker_id, "results stream closed");
        self.service.results_unsubscribe(&self.subscriber);
    }
}

fn deal_from_wire(deal: proto::Deal) -> Deal {
    Deal {
        id: deal.id,
        broker_id: deal.broker_id,
        client_id: deal.client_id,
        ticker: deal.ticker,
        amount: deal.amount,
        partial: deal.partial,
        time: DateTime::from_timestamp(deal.time, 0).unwrap_or_else(Utc::now),
        price: deal.price,
    }
}

fn deal_to_wire(deal: Deal) -> proto::Deal {
    proto::Deal {
        id: deal.id,
        broker_id: deal.broker_id,
        client_id: deal.client_id,
        ticker: deal.ticker,
        amount: deal.amount,
        partial: deal.partial,
        time: deal.time.timestamp(),
        price: deal.price,
    }
}

fn ohlcv_to_wire(candle: Ohlcv) -> proto::Ohlcv {
    proto::Ohlcv {
        id: candle.id,
        ticker: candle.ticker,
        time: candle.time.timestamp(),
        interval: candle.interval.as_secs() as i32,
        open: candle.open,
        high: candle.high,
        low: candle.low,
        close: candle.close,
        volume: candle.volume,
    }
}
