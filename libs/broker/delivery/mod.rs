//! Transport-facing adapters: the exchange gateway and the client-facing
//! gRPC server.

pub mod exchange;
pub mod rpc;
