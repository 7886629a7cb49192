//! Error types for the remote store client.

use thiserror::Error;

use vertable_core::error::Error as StoreError;

use crate::protocol::ErrorResponse;

/// Errors returned by `RemoteStoreClient` before a store error is decoded.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(serde_json::Error),

    #[error("server disconnected")]
    Disconnected,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("server error: {}: {}", .0.error, .0.message)]
    Server(ErrorResponse),
}

impl From<ClientError> for StoreError {
    /// Server errors decode back into store errors by code; transport
    /// failures are kept as unrecognized errors.
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Server(response) => response.into_store_error(),
            other => StoreError::unrecognized(&other),
        }
    }
}
