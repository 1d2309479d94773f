//! Error types for transports.

use thiserror::Error;

/// Errors reported by a transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The channel to the arbiter is not open.
    #[error("Channel to the resource manager is down")]
    ChannelDown,

    /// The channel could not be opened.
    #[error("Failed to connect to the resource manager: {0}")]
    ConnectFailed(String),

    /// A message could not be handed to the channel.
    #[error("Failed to send message: {0}")]
    SendFailed(String),
}

/// Result type for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;
