//! Protocol error types

use thiserror::Error;

/// Protocol-specific errors
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Missing argument: {0}")]
    MissingArgument(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Message too large: {size} > {max}")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Frame encoding failed: {0}")]
    Encode(String),

    #[error("Frame decoding failed: {0}")]
    Decode(String),

    #[error("Core error: {0}")]
    Core(#[from] memsync_core::Error),
}

impl ProtocolError {
    /// Error code used in `-ERR` responses
    pub fn code(&self) -> &'static str {
        match self {
            ProtocolError::InvalidCommand(_) => "INVALID_CMD",
            ProtocolError::MissingArgument(_) | ProtocolError::InvalidArgument(_) => "INVALID_ARG",
            ProtocolError::MessageTooLarge { .. } => "TOO_LARGE",
            ProtocolError::Encode(_) | ProtocolError::Decode(_) => "PROTOCOL",
            ProtocolError::Core(memsync_core::Error::InvalidKey(_)) => "INVALID_KEY",
            ProtocolError::Core(_) => "INTERNAL",
        }
    }
}

/// Result type for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;
