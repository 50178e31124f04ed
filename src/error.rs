// src/error.rs
use crate::identity::JobId;

#[derive(Debug, thiserror::Error)]
pub enum MetaError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt metadata under '{key}': {reason}")]
    Corrupt { key: String, reason: String },

    #[error("Key '{0}' is reserved for lifecycle state")]
    ReservedKey(String),

    #[error("Unknown job class: {0}")]
    UnknownJobClass(String),

    #[error("Job type not registered: {0}")]
    UnregisteredJob(String),

    #[error("No metadata recorded for job {0}")]
    NotTracked(JobId),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, MetaError>;
