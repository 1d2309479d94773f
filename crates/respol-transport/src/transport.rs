//! The transport seam.

use crate::error::TransportResult;
use crate::message::Request;

/// Asynchronous, message-oriented channel to the arbiter.
///
/// Implementations must never block: `send` hands the request to the channel
/// and returns. Replies and notifications travel the other way as
/// [`TransportEvent`](crate::TransportEvent)s, which the owner of the transport
/// feeds to the engine on the engine's own thread.
///
/// # Implementing a Transport
///
/// ```ignore
/// use respol_transport::{Request, Transport, TransportError, TransportResult};
///
/// struct SocketTransport { /* ... */ }
///
/// impl Transport for SocketTransport {
///     fn connect(&mut self) -> TransportResult<()> {
///         // open the socket, start the reader thread
///         Ok(())
///     }
///
///     fn send(&mut self, request: &Request) -> TransportResult<()> {
///         // encode and queue for writing
///         Ok(())
///     }
///
///     fn disconnect(&mut self) {
///         // close the socket
///     }
/// }
/// ```
pub trait Transport: Send {
    /// Open the session with the arbiter.
    fn connect(&mut self) -> TransportResult<()>;

    /// Queue a request for delivery.
    ///
    /// Fails only when the channel is down.
    fn send(&mut self, request: &Request) -> TransportResult<()>;

    /// Close the session. Called at most once per successful `connect`.
    fn disconnect(&mut self);

    /// Short name used in logs.
    fn name(&self) -> &str {
        "transport"
    }
}

/// A boxed transport.
pub type BoxedTransport = Box<dyn Transport>;

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn connect(&mut self) -> TransportResult<()> {
        (**self).connect()
    }

    fn send(&mut self, request: &Request) -> TransportResult<()> {
        (**self).send(request)
    }

    fn disconnect(&mut self) {
        (**self).disconnect()
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
