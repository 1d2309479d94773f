//! Lifecycle states of a resource set.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a resource set is in its conversation with the arbiter.
///
/// Lost and denied outcomes are events, not states: a set that loses its
/// resources stays [`SetState::Connected`] and may acquire again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetState {
    /// No session with the arbiter.
    #[default]
    Disconnected,
    /// Registration sent, waiting for the arbiter to accept it.
    Connecting,
    /// Registered and idle.
    Connected,
    /// An acquire request is in flight.
    Acquiring,
    /// A release request is in flight.
    Releasing,
}

impl SetState {
    /// Get the state name.
    pub fn as_str(&self) -> &'static str {
        match self {
            SetState::Disconnected => "disconnected",
            SetState::Connecting => "connecting",
            SetState::Connected => "connected",
            SetState::Acquiring => "acquiring",
            SetState::Releasing => "releasing",
        }
    }

    /// States in which exactly one request is outstanding.
    pub fn has_request_in_flight(&self) -> bool {
        matches!(
            self,
            SetState::Connecting | SetState::Acquiring | SetState::Releasing
        )
    }

    /// States in which the arbiter has accepted the registration.
    pub fn is_registered(&self) -> bool {
        matches!(
            self,
            SetState::Connected | SetState::Acquiring | SetState::Releasing
        )
    }
}

impl fmt::Display for SetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_flight_states() {
        assert!(!SetState::Disconnected.has_request_in_flight());
        assert!(SetState::Connecting.has_request_in_flight());
        assert!(!SetState::Connected.has_request_in_flight());
        assert!(SetState::Acquiring.has_request_in_flight());
        assert!(SetState::Releasing.has_request_in_flight());
    }

    #[test]
    fn test_registered_states() {
        assert!(!SetState::Connecting.is_registered());
        assert!(SetState::Releasing.is_registered());
        assert_eq!(SetState::default(), SetState::Disconnected);
    }
}
