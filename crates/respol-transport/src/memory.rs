//! In-process transport that records outbound requests.
//!
//! `MemoryTransport` never talks to a real arbiter. Everything it is asked to
//! send is stored and can be inspected through the paired
//! [`MemoryTransportHandle`], which can also make the channel misbehave.
//! Replies are injected by calling the engine directly.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::error::{TransportError, TransportResult};
use crate::message::{Request, RequestKind};
use crate::transport::Transport;

#[derive(Debug, Default)]
struct Shared {
    sent: Vec<Request>,
    connected: bool,
    connects: usize,
    disconnects: usize,
    refuse_connect: bool,
    refuse_send: bool,
}

/// Transport that keeps every request in memory.
#[derive(Debug)]
pub struct MemoryTransport {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryTransport {
    /// Create a transport and the handle observing it.
    pub fn new() -> (Self, MemoryTransportHandle) {
        let shared = Arc::new(Mutex::new(Shared::default()));
        (
            Self {
                shared: Arc::clone(&shared),
            },
            MemoryTransportHandle { shared },
        )
    }
}

impl Transport for MemoryTransport {
    fn connect(&mut self) -> TransportResult<()> {
        let mut shared = self.shared.lock();
        if shared.refuse_connect {
            return Err(TransportError::ConnectFailed(
                "connection refused".to_string(),
            ));
        }
        shared.connected = true;
        shared.connects += 1;
        Ok(())
    }

    fn send(&mut self, request: &Request) -> TransportResult<()> {
        let mut shared = self.shared.lock();
        if !shared.connected {
            return Err(TransportError::ChannelDown);
        }
        if shared.refuse_send {
            return Err(TransportError::SendFailed("send refused".to_string()));
        }
        trace!(request_id = %request.id, kind = %request.kind, "Recorded request");
        shared.sent.push(request.clone());
        Ok(())
    }

    fn disconnect(&mut self) {
        let mut shared = self.shared.lock();
        shared.connected = false;
        shared.disconnects += 1;
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Observer and fault injector for a [`MemoryTransport`].
#[derive(Debug, Clone)]
pub struct MemoryTransportHandle {
    shared: Arc<Mutex<Shared>>,
}

impl MemoryTransportHandle {
    /// All requests sent so far.
    pub fn sent(&self) -> Vec<Request> {
        self.shared.lock().sent.clone()
    }

    /// Number of requests sent so far.
    pub fn sent_count(&self) -> usize {
        self.shared.lock().sent.len()
    }

    /// The most recent request.
    pub fn last_sent(&self) -> Option<Request> {
        self.shared.lock().sent.last().cloned()
    }

    /// The most recent request of the given kind.
    pub fn last_of(&self, kind: RequestKind) -> Option<Request> {
        self.shared
            .lock()
            .sent
            .iter()
            .rev()
            .find(|r| r.kind == kind)
            .cloned()
    }

    /// Remove and return all recorded requests.
    pub fn take_sent(&self) -> Vec<Request> {
        std::mem::take(&mut self.shared.lock().sent)
    }

    /// Whether the session is open.
    pub fn is_connected(&self) -> bool {
        self.shared.lock().connected
    }

    /// How many times the session was opened.
    pub fn connect_count(&self) -> usize {
        self.shared.lock().connects
    }

    /// How many times the session was closed.
    pub fn disconnect_count(&self) -> usize {
        self.shared.lock().disconnects
    }

    /// Make subsequent `connect` calls fail.
    pub fn refuse_connect(&self, refuse: bool) {
        self.shared.lock().refuse_connect = refuse;
    }

    /// Make subsequent `send` calls fail.
    pub fn refuse_send(&self, refuse: bool) {
        self.shared.lock().refuse_send = refuse;
    }

    /// Simulate the channel dropping underneath the engine.
    pub fn drop_channel(&self) {
        self.shared.lock().connected = false;
    }
}

#[cfg(test)]
mod tests {
    use respol_core::ResourceMode;

    use super::*;
    use crate::message::{RequestId, RequestPayload};

    fn request(id: u64, kind: RequestKind) -> Request {
        Request {
            id: RequestId::new(id),
            kind,
            payload: RequestPayload {
                application_class: "player".to_string(),
                resources: Vec::new(),
                mode: ResourceMode::default(),
            },
        }
    }

    #[test]
    fn test_send_requires_connect() {
        let (mut transport, handle) = MemoryTransport::new();
        assert_eq!(
            transport.send(&request(1, RequestKind::Register)),
            Err(TransportError::ChannelDown)
        );

        transport.connect().unwrap();
        transport.send(&request(1, RequestKind::Register)).unwrap();
        transport.send(&request(2, RequestKind::Acquire)).unwrap();

        assert_eq!(handle.sent_count(), 2);
        assert_eq!(handle.last_sent().unwrap().id, RequestId::new(2));
        assert_eq!(
            handle.last_of(RequestKind::Register).unwrap().id,
            RequestId::new(1)
        );
    }

    #[test]
    fn test_fault_injection() {
        let (mut transport, handle) = MemoryTransport::new();

        handle.refuse_connect(true);
        assert!(matches!(
            transport.connect(),
            Err(TransportError::ConnectFailed(_))
        ));

        handle.refuse_connect(false);
        transport.connect().unwrap();
        handle.refuse_send(true);
        assert!(matches!(
            transport.send(&request(1, RequestKind::Acquire)),
            Err(TransportError::SendFailed(_))
        ));

        handle.refuse_send(false);
        handle.drop_channel();
        assert_eq!(
            transport.send(&request(2, RequestKind::Acquire)),
            Err(TransportError::ChannelDown)
        );
    }

    #[test]
    fn test_session_counters() {
        let (mut transport, handle) = MemoryTransport::new();
        transport.connect().unwrap();
        assert!(handle.is_connected());

        transport.disconnect();
        assert!(!handle.is_connected());
        assert_eq!(handle.connect_count(), 1);
        assert_eq!(handle.disconnect_count(), 1);
    }

    #[test]
    fn test_take_sent() {
        let (mut transport, handle) = MemoryTransport::new();
        transport.connect().unwrap();
        transport.send(&request(1, RequestKind::Register)).unwrap();

        assert_eq!(handle.take_sent().len(), 1);
        assert_eq!(handle.sent_count(), 0);
    }
}
