//! Error handling for the wirecanvas crate
//!
//! This module defines the crate-wide error type and a Result alias for use
//! throughout the application. Subsystems keep their own narrower error enums
//! ([`PropagationError`], [`BridgeError`]) which convert into this one.

use crate::bridge::BridgeError;
use crate::graph::PropagationError;
use thiserror::Error;

/// Main error type for wirecanvas operations
#[derive(Error, Debug)]
pub enum WireCanvasError {
    /// Errors raised by the propagation engine
    #[error("Propagation error: {0}")]
    Propagation(#[from] PropagationError),

    /// Errors raised by a bridge connection or its transport
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Errors related to channel communication
    #[error("Channel error: {0}")]
    Channel(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<WireCanvasError>,
    },
}

impl WireCanvasError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        WireCanvasError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }
}

impl From<serde_json::Error> for WireCanvasError {
    fn from(err: serde_json::Error) -> Self {
        WireCanvasError::Serialization(err.to_string())
    }
}

/// Result type alias for wirecanvas operations
pub type Result<T> = std::result::Result<T, WireCanvasError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<WireCanvasError>,
{
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.into().with_context(f()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ObjectId;

    #[test]
    fn test_error_display() {
        let err = WireCanvasError::Config("missing baud rate".to_string());
        assert_eq!(err.to_string(), "Configuration error: missing baud rate");
    }

    #[test]
    fn test_error_with_context() {
        let err = WireCanvasError::Channel("closed".to_string());
        let with_ctx = err.with_context("Failed to send command");
        assert!(with_ctx.to_string().contains("Failed to send command"));
        assert!(with_ctx.to_string().contains("closed"));
    }

    #[test]
    fn test_propagation_error_converts() {
        let inner = PropagationError::UnknownObject(ObjectId::from("ghost"));
        let result: std::result::Result<(), PropagationError> = Err(inner);
        let err = result.context("binding slider").unwrap_err();
        assert!(err.to_string().starts_with("binding slider"));
        assert!(err.to_string().contains("ghost"));
    }
}
