//! Error types for the bridge.

use mmflink_core::event::HostEvent;
use mmflink_core::printer::PrinterError;
use mmflink_core::storage::StorageError;
use thiserror::Error;

/// Result type for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Failures of a REST call to the management service.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The service answered with a non-success status.
    #[error("HTTP status {0}")]
    Status(u16),

    /// No answer within the configured timeout.
    #[error("Request timed out")]
    Timeout,

    /// Connection or protocol failure before a status was received.
    #[error("Request failed: {0}")]
    Request(String),

    /// The body could not be decoded.
    #[error("Invalid response body: {0}")]
    Decode(String),
}

impl ApiError {
    /// The host event reporting this failure.
    pub fn host_event(&self) -> HostEvent {
        match self {
            ApiError::Status(status) => HostEvent::Error { status: *status },
            other => HostEvent::RequestFailed {
                reason: other.to_string(),
            },
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::Timeout
        } else if let Some(status) = e.status() {
            ApiError::Status(status.as_u16())
        } else if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Request(e.to_string())
        }
    }
}

/// Broker connection failures.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Connection options could not be built.
    #[error("Invalid broker options: {0}")]
    Options(String),

    /// Operation needs a live connection.
    #[error("Not connected")]
    NotConnected,

    /// The client rejected a request.
    #[error("MQTT client error: {0}")]
    Client(String),
}

impl From<rumqttc::ClientError> for TransportError {
    fn from(e: rumqttc::ClientError) -> Self {
        TransportError::Client(e.to_string())
    }
}

/// Failures while fetching and placing a print artifact.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// File name would escape the uploads folder.
    #[error("Invalid file name: {0:?}")]
    InvalidName(String),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Any bridge failure.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Printer(#[from] PrinterError),
}
