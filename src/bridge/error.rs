//! Bridge-specific error types.

use crate::types::ObjectId;
use thiserror::Error;

/// Errors raised while opening, driving or reading a serial connection.
///
/// None of these are fatal: each one moves the owning bridge to the `error`
/// status, which reverts to `disconnected` after a delay.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    #[error("Serial transport is not available: {0}")]
    Unsupported(String),

    #[error("No serial port configured for bridge {0}")]
    NoPort(ObjectId),

    #[error("Failed to open {port}: {reason}")]
    Open { port: String, reason: String },

    #[error("Write failed: {0}")]
    Write(String),

    #[error("Read failed: {0}")]
    Read(String),

    #[error("Object {0} is not a bridge")]
    NotABridge(ObjectId),
}

pub type BridgeResult<T> = std::result::Result<T, BridgeError>;
