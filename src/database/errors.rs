//! Connection pool error types

use thiserror::Error;

/// Failure reported by a driver while connecting, resetting or closing
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ConnectionError {
    pub message: String,
}

impl ConnectionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Failed to connect to '{resource_name}': {source}")]
    Connect {
        resource_name: String,
        #[source]
        source: ConnectionError,
    },

    /// Every pooled connection is active or persistent
    #[error("Connection pool is full ({max_connections} connections) and no connection can be evicted")]
    PoolFull { max_connections: usize },

    #[error("Connection pool has been shut down")]
    Closed,
}

impl PoolError {
    /// Stable label used in error telemetry
    pub fn kind(&self) -> &'static str {
        match self {
            PoolError::Connect { .. } => "connect",
            PoolError::PoolFull { .. } => "pool_full",
            PoolError::Closed => "pool_closed",
        }
    }
}

pub type PoolResult<T> = Result<T, PoolError>;
