//! gRPC delivery for the broker service.

use std::sync::Arc;

use chrono::Utc;
use tonic::{Request, Response, Status};
use tracing::{error, info};
use venue_proto as proto;
use venue_proto::broker_server::Broker;

use crate::domain::{Deal, DealStatus, DealType, Ohlcv};
use crate::error::BrokerError;
use crate::services::BrokerService;

/// tonic-facing wrapper over [`BrokerService`].
pub struct BrokerRpc {
    service: Arc<BrokerService>,
}

impl BrokerRpc {
    pub fn new(service: Arc<BrokerService>) -> Self {
        Self { service }
    }
}

fn internal(err: BrokerError) -> Status {
    error!(%err, "request failed");
    Status::internal(err.to_string())
}

fn login_of(client: Option<proto::ClientLogin>) -> String {
    client.map(|client| client.login).unwrap_or_default()
}

#[tonic::async_trait]
impl Broker for BrokerRpc {
    async fn get_profile(
        &self,
        request: Request<proto::ClientLogin>,
    ) -> Result<Response<proto::Profile>, Status> {
        let login = request.into_inner().login;
        let profile = self.service.get_profile(&login).await.map_err(internal)?;

        let positions = profile
            .positions
            .iter()
            .map(|position| proto::Position {
                ticker: position.ticker.clone(),
                amount: position.amount,
            })
            .collect();
        let deals = profile
            .open_deals
            .iter()
            .map(|deal| proto::OpenDeal {
                id: deal.id,
                ticker: deal.ticker.clone(),
                deal_type: deal.deal_type.to_string(),
                amount: deal.amount,
                price: deal.price,
                time: deal.time.timestamp(),
            })
            .collect();

        info!(%login, "handled profile request");
        Ok(Response::new(proto::Profile {
            balance: profile.balance,
            positions,
            deals,
        }))
    }

    async fn create(
        &self,
        request: Request<proto::CreateDeal>,
    ) -> Result<Response<proto::DealId>, Status> {
        let request = request.into_inner();
        let login = login_of(request.client);

        let deal_type: DealType = request
            .deal_type
            .parse()
            .map_err(|err: BrokerError| Status::invalid_argument(err.to_string()))?;

        let client = self.service.get_client(&login).await.map_err(internal)?;
        let deal = Deal {
            id: 0,
            client_id: client.id,
            ticker: request.ticker,
            deal_type,
            amount: request.amount,
            partial: false,
            price: request.price,
            status: DealStatus::New,
            time: Utc::now(),
        };

        let deal = self.service.create(deal).await.map_err(internal)?;

        info!(%login, deal = deal.id, "handled create request");
        Ok(Response::new(proto::DealId {
            id: deal.id,
            broker_id: 0,
        }))
    }

    async fn cancel(
        &self,
        request: Request<proto::CancelDeal>,
    ) -> Result<Response<proto::Success>, Status> {
        let request = request.into_inner();
        let login = login_of(request.client);

        let ok = self
            .service
            .cancel(request.deal_id)
            .await
            .map_err(internal)?;

        info!(%login, deal = request.deal_id, ok, "handled cancel request");
        Ok(Response::new(proto::Success { ok }))
    }

    async fn statistic(
        &self,
        request: Request<proto::TickerRequest>,
    ) -> Result<Response<proto::History>, Status> {
        let request = request.into_inner();
        let history = self.service.history(&request.name).await.map_err(internal)?;

        let prices = history.iter().map(candle_to_wire).collect();

        info!(ticker = %request.name, "handled statistic request");
        Ok(Response::new(proto::History { prices }))
    }
}

fn candle_to_wire(candle: &Ohlcv) -> proto::Candle {
    proto::Candle {
        time: candle.time.timestamp(),
        interval: candle.interval.as_secs() as i32,
        open: candle.open,
        high: candle.high,
        low: candle.low,
        close: candle.close,
        volume: candle.volume,
    }
}
