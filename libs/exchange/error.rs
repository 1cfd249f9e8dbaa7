use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("Malformed tick row: {0}")]
    BadRow(String),
}

pub type Result<T> = std::result::Result<T, ExchangeError>;
