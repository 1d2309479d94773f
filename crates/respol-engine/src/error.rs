//! Error types for the protocol engine.

use thiserror::Error;

use respol_core::{ResourceType, SetState, UsageError};
use respol_transport::{NotifyKind, RequestId, TransportError};

/// Errors returned synchronously by engine operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The call was not valid in the current state.
    #[error(transparent)]
    Usage(#[from] UsageError),

    /// The transport refused the call; the set is now disconnected.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Inbound traffic the engine could not make sense of.
///
/// These never reach the caller; they are logged and counted, and the
/// engine state is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// A reply named a request that is not outstanding.
    #[error("Reply to unknown request {0}")]
    UnknownRequest(RequestId),

    /// A notification arrived in a state where it means nothing.
    #[error("Unexpected {kind} notification while {state}")]
    UnexpectedNotification {
        /// Notification kind.
        kind: NotifyKind,
        /// Engine state at the time.
        state: SetState,
    },

    /// A notification named no resource the set holds or wants.
    #[error("{kind} notification names no relevant resource: {resources:?}")]
    IrrelevantResources {
        /// Notification kind.
        kind: NotifyKind,
        /// Resource types named.
        resources: Vec<ResourceType>,
    },

    /// A reply granted resources that are not in the set.
    #[error("Grant names resources outside the set: {0:?}")]
    ForeignGrant(Vec<ResourceType>),
}

/// Result type for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;
