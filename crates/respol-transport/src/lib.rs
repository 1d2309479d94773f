//! respol Transport
//!
//! This crate defines the boundary between the protocol engine and the
//! inter-process channel to the resource-policy arbiter:
//!
//! - [`Request`], [`TransportEvent`] and friends: the messages crossing it
//! - [`Transport`]: the trait a concrete channel implements
//! - [`MemoryTransport`]: an in-process transport that records requests
//! - [`channel`] (feature `async`): a tokio mpsc transport with an arbiter endpoint
//!
//! The wire encoding is the transport's business. Messages derive serde
//! traits so any serde format can carry them.
//!
//! # Example
//!
//! ```
//! use respol_transport::{MemoryTransport, Transport};
//!
//! let (mut transport, handle) = MemoryTransport::new();
//! transport.connect().unwrap();
//! assert!(handle.is_connected());
//! ```

#[cfg(feature = "async")]
pub mod channel;
pub mod error;
pub mod memory;
pub mod message;
pub mod transport;

// Re-export main types
#[cfg(feature = "async")]
pub use channel::{ArbiterEndpoint, ChannelTransport, channel};
pub use error::{TransportError, TransportResult};
pub use memory::{MemoryTransport, MemoryTransportHandle};
pub use message::{
    NotifyKind, ReplyOutcome, Request, RequestId, RequestKind, RequestPayload,
    ResourceDescriptor, TransportEvent,
};
pub use transport::{BoxedTransport, Transport};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{TransportError, TransportResult};
    pub use crate::message::{
        NotifyKind, ReplyOutcome, Request, RequestId, RequestKind, TransportEvent,
    };
    pub use crate::transport::Transport;
}
