//! Tokio channel transport.
//!
//! [`channel`] creates a transport for the engine, an [`ArbiterEndpoint`] for
//! whatever plays the arbiter (a bridge to the real IPC socket, or a test),
//! and the receiver of inbound [`TransportEvent`]s that the engine's task must
//! drain. Inbound traffic never touches the engine directly; it is queued and
//! picked up on the engine's task.

use tokio::sync::mpsc;
use tracing::debug;

use respol_core::ResourceType;

use crate::error::{TransportError, TransportResult};
use crate::message::{NotifyKind, ReplyOutcome, Request, RequestId, TransportEvent};
use crate::transport::Transport;

/// Create a connected transport / arbiter pair.
pub fn channel() -> (
    ChannelTransport,
    ArbiterEndpoint,
    mpsc::UnboundedReceiver<TransportEvent>,
) {
    let (request_tx, request_rx) = mpsc::unbounded_channel();
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    (
        ChannelTransport {
            outbound: request_tx,
            open: false,
        },
        ArbiterEndpoint {
            requests: request_rx,
            events: event_tx,
        },
        event_rx,
    )
}

/// Engine side of a [`channel`].
#[derive(Debug)]
pub struct ChannelTransport {
    outbound: mpsc::UnboundedSender<Request>,
    open: bool,
}

impl Transport for ChannelTransport {
    fn connect(&mut self) -> TransportResult<()> {
        if self.outbound.is_closed() {
            return Err(TransportError::ConnectFailed(
                "arbiter endpoint is gone".to_string(),
            ));
        }
        self.open = true;
        debug!("Channel transport opened");
        Ok(())
    }

    fn send(&mut self, request: &Request) -> TransportResult<()> {
        if !self.open {
            return Err(TransportError::ChannelDown);
        }
        self.outbound
            .send(request.clone())
            .map_err(|_| TransportError::SendFailed("arbiter endpoint is gone".to_string()))
    }

    fn disconnect(&mut self) {
        self.open = false;
        debug!("Channel transport closed");
    }

    fn name(&self) -> &str {
        "channel"
    }
}

/// Arbiter side of a [`channel`].
#[derive(Debug)]
pub struct ArbiterEndpoint {
    requests: mpsc::UnboundedReceiver<Request>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl ArbiterEndpoint {
    /// Wait for the next request from the engine.
    pub async fn recv(&mut self) -> Option<Request> {
        self.requests.recv().await
    }

    /// Take a request if one is queued.
    pub fn try_recv(&mut self) -> Option<Request> {
        self.requests.try_recv().ok()
    }

    /// Deliver an arbitrary event to the engine.
    pub fn send_event(&self, event: TransportEvent) -> TransportResult<()> {
        self.events
            .send(event)
            .map_err(|_| TransportError::SendFailed("engine side is gone".to_string()))
    }

    /// Report the channel as up.
    pub fn connected(&self) -> TransportResult<()> {
        self.send_event(TransportEvent::Connected)
    }

    /// Report the channel as down.
    pub fn disconnected(&self) -> TransportResult<()> {
        self.send_event(TransportEvent::Disconnected)
    }

    /// Answer a request.
    pub fn reply(
        &self,
        request_id: RequestId,
        outcome: ReplyOutcome,
        granted: Vec<ResourceType>,
    ) -> TransportResult<()> {
        self.send_event(TransportEvent::Reply {
            request_id,
            outcome,
            granted,
        })
    }

    /// Answer a request successfully.
    pub fn grant(&self, request_id: RequestId, granted: Vec<ResourceType>) -> TransportResult<()> {
        self.send_event(TransportEvent::ok(request_id, granted))
    }

    /// Refuse a request.
    pub fn deny(&self, request_id: RequestId) -> TransportResult<()> {
        self.send_event(TransportEvent::denied(request_id))
    }

    /// Send an unsolicited notification.
    pub fn notify(&self, kind: NotifyKind, resources: Vec<ResourceType>) -> TransportResult<()> {
        self.send_event(TransportEvent::notify(kind, resources))
    }

    /// A sender for pushing events from elsewhere (e.g. a reader thread).
    pub fn event_sender(&self) -> mpsc::UnboundedSender<TransportEvent> {
        self.events.clone()
    }
}

#[cfg(test)]
mod tests {
    use respol_core::ResourceMode;

    use super::*;
    use crate::message::{RequestKind, RequestPayload};

    fn request(id: u64) -> Request {
        Request {
            id: RequestId::new(id),
            kind: RequestKind::Register,
            payload: RequestPayload {
                application_class: "player".to_string(),
                resources: Vec::new(),
                mode: ResourceMode::default(),
            },
        }
    }

    #[tokio::test]
    async fn test_request_reaches_arbiter() {
        let (mut transport, mut arbiter, _events) = channel();
        transport.connect().unwrap();
        transport.send(&request(1)).unwrap();

        let received = arbiter.recv().await.unwrap();
        assert_eq!(received.id, RequestId::new(1));
    }

    #[tokio::test]
    async fn test_reply_reaches_engine_queue() {
        let (_transport, arbiter, mut events) = channel();
        arbiter
            .grant(RequestId::new(4), vec![ResourceType::AudioPlayback])
            .unwrap();

        let event = events.recv().await.unwrap();
        assert_eq!(
            event,
            TransportEvent::ok(RequestId::new(4), vec![ResourceType::AudioPlayback])
        );
    }

    #[test]
    fn test_send_before_connect_fails() {
        let (mut transport, _arbiter, _events) = channel();
        assert_eq!(transport.send(&request(1)), Err(TransportError::ChannelDown));
    }

    #[test]
    fn test_connect_fails_without_arbiter() {
        let (mut transport, arbiter, _events) = channel();
        drop(arbiter);
        assert!(matches!(
            transport.connect(),
            Err(TransportError::ConnectFailed(_))
        ));
    }
}
