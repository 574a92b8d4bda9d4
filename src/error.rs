use crate::blockchain::client::ClientError;
use crate::blockchain::geyser::StreamError;
use crate::config::ConfigError;
use crate::programs::DecodeError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Client error: {0}")]
    Client(#[from] ClientError),

    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Address lookup table error: {0}")]
    LookupTable(String),

    #[error("Backfill bookend error: {0}")]
    Bookend(String),

    #[error("Task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
