//! respol Engine - the resource negotiation protocol
//!
//! This crate drives one resource set through its conversation with the
//! arbiter:
//!
//! - [`ResourceEngine`]: the state machine behind every set operation
//! - [`PendingRequests`]: requests awaiting a reply, keyed by [`RequestId`]
//! - [`EngineError`] and [`ProtocolError`]: what can go wrong
//!
//! The engine is transport-agnostic. Inbound traffic is fed to
//! [`ResourceEngine::handle`] by whatever owns the transport's receive side,
//! and outcomes come back as [`ResourceEvent`]s.
//!
//! [`RequestId`]: respol_transport::RequestId
//! [`ResourceEvent`]: respol_observe::ResourceEvent

pub mod engine;
pub mod error;
pub mod pending;

// Re-export main types
pub use engine::ResourceEngine;
pub use error::{EngineError, EngineResult, ProtocolError};
pub use pending::{PendingRequest, PendingRequests};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::engine::ResourceEngine;
    pub use crate::error::{EngineError, EngineResult};
}
