//! Generated gRPC protocol for the trading venue.
//!
//! The `venue.Exchange` service is consumed by brokers, `venue.Broker` by
//! client front-ends. Prices on the exchange wire are signed: positive means
//! buy at the limit, negative means sell at the absolute value.

tonic::include_proto!("venue");
