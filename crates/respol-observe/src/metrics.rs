//! Protocol metrics for a resource set.

use std::collections::BTreeMap;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Collects counters while a resource set talks to the arbiter.
///
/// Request kinds are passed as their names so this crate does not depend on
/// the transport message types.
#[derive(Default)]
pub struct MetricsCollector {
    requests: RwLock<RequestMetrics>,
    outcomes: RwLock<OutcomeMetrics>,
    session: RwLock<SessionMetrics>,
}

impl MetricsCollector {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request handed to the transport.
    pub fn record_request_sent(&self, kind: &str) {
        let mut requests = self.requests.write();
        requests.sent_total += 1;
        *requests.sent_by_kind.entry(kind.to_string()).or_insert(0) += 1;
    }

    /// Record a reply matched to the request currently in flight.
    pub fn record_reply_matched(&self, round_trip: Duration) {
        let mut requests = self.requests.write();
        requests.replies_matched += 1;
        requests.last_round_trip = Some(round_trip);
        if round_trip > requests.max_round_trip {
            requests.max_round_trip = round_trip;
        }
    }

    /// Record a reply to a request that had been superseded.
    pub fn record_reply_superseded(&self) {
        self.requests.write().replies_superseded += 1;
    }

    /// Record a reply or notification that matched nothing.
    pub fn record_protocol_error(&self) {
        self.requests.write().protocol_errors += 1;
    }

    /// Record a request abandoned because a newer one replaced it.
    pub fn record_superseded_request(&self) {
        self.requests.write().superseded += 1;
    }

    /// Record a grant.
    pub fn record_grant(&self) {
        self.outcomes.write().grants += 1;
    }

    /// Record a denial.
    pub fn record_denial(&self) {
        self.outcomes.write().denials += 1;
    }

    /// Record a loss to another application.
    pub fn record_loss(&self) {
        self.outcomes.write().losses += 1;
    }

    /// Record a revocation by the arbiter.
    pub fn record_manager_release(&self) {
        self.outcomes.write().manager_releases += 1;
    }

    /// Record an acknowledged release.
    pub fn record_release(&self) {
        self.outcomes.write().releases += 1;
    }

    /// Record a completed registration.
    pub fn record_connected(&self) {
        self.session.write().connections += 1;
    }

    /// Record a refused or timed-out registration.
    pub fn record_connection_failure(&self) {
        self.session.write().connection_failures += 1;
    }

    /// Record the end of a session.
    pub fn record_disconnected(&self, discarded_requests: usize) {
        let mut session = self.session.write();
        session.disconnections += 1;
        session.discarded_requests += discarded_requests as u64;
    }

    /// Get a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests: self.requests.read().clone(),
            outcomes: self.outcomes.read().clone(),
            session: self.session.read().clone(),
        }
    }

    /// Reset all metrics.
    pub fn reset(&self) {
        *self.requests.write() = RequestMetrics::default();
        *self.outcomes.write() = OutcomeMetrics::default();
        *self.session.write() = SessionMetrics::default();
    }
}

impl std::fmt::Debug for MetricsCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsCollector")
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

/// Request and reply counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestMetrics {
    /// Requests handed to the transport.
    pub sent_total: u64,
    /// Requests per kind.
    pub sent_by_kind: BTreeMap<String, u64>,
    /// Requests abandoned in favour of a newer one.
    pub superseded: u64,
    /// Replies applied to the set.
    pub replies_matched: u64,
    /// Replies discarded because their request had been superseded.
    pub replies_superseded: u64,
    /// Replies or notifications that matched nothing.
    pub protocol_errors: u64,
    /// Round trip of the last matched reply.
    pub last_round_trip: Option<Duration>,
    /// Longest round trip seen.
    pub max_round_trip: Duration,
}

/// Negotiation outcome counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutcomeMetrics {
    /// Grants received.
    pub grants: u64,
    /// Denials received.
    pub denials: u64,
    /// Losses to other applications.
    pub losses: u64,
    /// Revocations by the arbiter.
    pub manager_releases: u64,
    /// Acknowledged releases.
    pub releases: u64,
}

/// Session counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionMetrics {
    /// Registrations accepted.
    pub connections: u64,
    /// Registrations refused or timed out.
    pub connection_failures: u64,
    /// Sessions ended.
    pub disconnections: u64,
    /// Outstanding requests thrown away when sessions ended.
    pub discarded_requests: u64,
}

/// Point-in-time copy of all metrics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Request and reply counters.
    pub requests: RequestMetrics,
    /// Outcome counters.
    pub outcomes: OutcomeMetrics,
    /// Session counters.
    pub session: SessionMetrics,
}

impl MetricsSnapshot {
    /// Convert to a JSON value.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Convert to pretty-printed JSON.
    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_counters() {
        let collector = MetricsCollector::new();
        collector.record_request_sent("register");
        collector.record_request_sent("acquire");
        collector.record_request_sent("acquire");
        collector.record_superseded_request();
        collector.record_reply_superseded();
        collector.record_protocol_error();

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.requests.sent_total, 3);
        assert_eq!(snapshot.requests.sent_by_kind["acquire"], 2);
        assert_eq!(snapshot.requests.superseded, 1);
        assert_eq!(snapshot.requests.replies_superseded, 1);
        assert_eq!(snapshot.requests.protocol_errors, 1);
    }

    #[test]
    fn test_round_trip_tracking() {
        let collector = MetricsCollector::new();
        collector.record_reply_matched(Duration::from_millis(30));
        collector.record_reply_matched(Duration::from_millis(10));

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.requests.replies_matched, 2);
        assert_eq!(snapshot.requests.last_round_trip, Some(Duration::from_millis(10)));
        assert_eq!(snapshot.requests.max_round_trip, Duration::from_millis(30));
    }

    #[test]
    fn test_session_and_outcomes() {
        let collector = MetricsCollector::new();
        collector.record_connected();
        collector.record_grant();
        collector.record_loss();
        collector.record_disconnected(2);

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.session.connections, 1);
        assert_eq!(snapshot.session.discarded_requests, 2);
        assert_eq!(snapshot.outcomes.grants, 1);
        assert_eq!(snapshot.outcomes.losses, 1);

        collector.reset();
        assert_eq!(collector.snapshot().outcomes.grants, 0);
    }

    #[test]
    fn test_snapshot_json() {
        let collector = MetricsCollector::new();
        collector.record_denial();

        let json = collector.snapshot().to_json();
        assert_eq!(json["outcomes"]["denials"], 1);
        assert!(collector.snapshot().to_json_pretty().contains("denials"));
    }
}
