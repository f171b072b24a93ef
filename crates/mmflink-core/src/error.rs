//! Crate-wide error type.

use crate::message::DecodeError;
use crate::printer::PrinterError;
use crate::storage::StorageError;

/// Result type using the crate error.
pub type Result<T> = std::result::Result<T, Error>;

/// Any failure raised by the core domain.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Printer(#[from] PrinterError),

    /// Configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
