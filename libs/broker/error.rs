use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Exchange transport error: {0}")]
    Transport(#[from] tonic::Status),

    #[error("Failed to connect: {0}")]
    Connect(#[from] tonic::transport::Error),

    #[error("Request timed out")]
    Timeout(#[from] tokio::time::error::Elapsed),

    #[error("Unknown deal type: {0}")]
    UnknownDealType(String),

    #[error("Unknown deal status: {0}")]
    UnknownDealStatus(String),
}

pub type Result<T> = std::result::Result<T, BrokerError>;
