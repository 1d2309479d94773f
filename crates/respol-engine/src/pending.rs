//! Table of requests awaiting a reply.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use respol_transport::{RequestId, RequestKind};

/// An outstanding request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRequest {
    /// What the request asked for.
    pub kind: RequestKind,
    /// When it was handed to the transport.
    pub sent_at: Instant,
}

impl PendingRequest {
    /// Time since the request was sent.
    pub fn age(&self) -> Duration {
        self.sent_at.elapsed()
    }
}

/// Requests sent on the current session that have not been answered.
///
/// Superseded requests stay in the table until their reply arrives, so every
/// entry leaves exactly once: through [`PendingRequests::take`] on its reply,
/// or through [`PendingRequests::clear`] when the session ends.
#[derive(Debug, Default)]
pub struct PendingRequests {
    entries: HashMap<RequestId, PendingRequest>,
}

impl PendingRequests {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request that was just sent.
    pub fn insert(&mut self, id: RequestId, kind: RequestKind) {
        self.entries.insert(
            id,
            PendingRequest {
                kind,
                sent_at: Instant::now(),
            },
        );
    }

    /// Remove and return the entry for a reply.
    pub fn take(&mut self, id: RequestId) -> Option<PendingRequest> {
        self.entries.remove(&id)
    }

    /// Check if a request is outstanding.
    pub fn contains(&self, id: RequestId) -> bool {
        self.entries.contains_key(&id)
    }

    /// Look up an outstanding request.
    pub fn get(&self, id: RequestId) -> Option<&PendingRequest> {
        self.entries.get(&id)
    }

    /// Drop every entry, returning how many there were.
    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    /// Number of outstanding requests.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if nothing is outstanding.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_is_single_use() {
        let mut pending = PendingRequests::new();
        pending.insert(RequestId::new(1), RequestKind::Acquire);

        assert!(pending.contains(RequestId::new(1)));
        assert_eq!(
            pending.take(RequestId::new(1)).map(|p| p.kind),
            Some(RequestKind::Acquire)
        );
        assert!(pending.take(RequestId::new(1)).is_none());
        assert!(pending.is_empty());
    }

    #[test]
    fn test_clear_counts_entries() {
        let mut pending = PendingRequests::new();
        pending.insert(RequestId::new(1), RequestKind::Register);
        pending.insert(RequestId::new(2), RequestKind::Acquire);

        assert_eq!(pending.len(), 2);
        assert_eq!(pending.clear(), 2);
        assert_eq!(pending.clear(), 0);
    }

    #[test]
    fn test_get_reports_kind() {
        let mut pending = PendingRequests::new();
        pending.insert(RequestId::new(7), RequestKind::Release);

        let entry = pending.get(RequestId::new(7)).unwrap();
        assert_eq!(entry.kind, RequestKind::Release);
        assert!(entry.age() < Duration::from_secs(60));
    }
}
