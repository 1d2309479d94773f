//! # respol - Resource Policy Client
//!
//! respol lets an application negotiate contended hardware resources (audio
//! and video paths, vibrator, LEDs, backlight, hardware keys) with a
//! system-wide policy arbiter. The application groups what it needs into a
//! [`ResourceSet`], registers it, asks for the resources, and learns through
//! events whether it got them, lost them, or had them taken away.
//!
//! ## Quick Start
//!
//! ```
//! use respol::prelude::*;
//!
//! let (transport, arbiter) = MemoryTransport::new();
//! let mut set = ResourceSet::builder("player")
//!     .with_mode(ResourceMode::new().with_auto_release(true))
//!     .with_resource(ResourceType::AudioPlayback)
//!     .build(transport)?;
//!
//! set.connect()?;
//! set.acquire()?;
//!
//! // The arbiter accepts the registration, then grants the set.
//! let register = arbiter.last_of(RequestKind::Register).unwrap();
//! set.handle(TransportEvent::ok(register.id, vec![]));
//! let acquire = arbiter.last_of(RequestKind::Acquire).unwrap();
//! set.handle(TransportEvent::ok(acquire.id, vec![ResourceType::AudioPlayback]));
//!
//! assert!(set.has_grants());
//! assert_eq!(
//!     set.drain_events().last(),
//!     Some(&ResourceEvent::ResourcesAcquired {
//!         granted: vec![ResourceType::AudioPlayback]
//!     })
//! );
//! # Ok::<(), RespolError>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    Your Application                     │
//! ├─────────────────────────────────────────────────────────┤
//! │          respol (ResourceSet, SetDriver facade)         │
//! ├──────────────────┬──────────────────┬───────────────────┤
//! │  respol-engine   │  respol-observe  │   respol-core     │
//! │  (state machine, │  (events,        │   (resources,     │
//! │   correlation)   │   metrics)       │    config)        │
//! ├──────────────────┴──────────────────┴───────────────────┤
//! │       respol-transport (Transport trait, channels)      │
//! └─────────────────────────────────────────────────────────┘
//! ```

#[cfg(feature = "async")]
pub mod driver;
pub mod set;

pub use set::{ResourceSet, ResourceSetBuilder, SetId};

#[cfg(feature = "async")]
pub use driver::{ChannelSubscriber, SetDriver, SetHandle, SetStatus};

// Re-export from sub-crates
pub use respol_core;
pub use respol_engine;
pub use respol_observe;
pub use respol_transport;

use respol_core::{ConfigError, UsageError};
use respol_engine::EngineError;
use respol_transport::TransportError;

/// Errors from respol.
#[derive(Debug, thiserror::Error)]
pub enum RespolError {
    /// The call was not valid in the current state.
    #[error("Usage error: {0}")]
    Usage(#[from] UsageError),

    /// The transport failed; the set is disconnected.
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The driver task is no longer running.
    #[error("Driver has shut down")]
    DriverClosed,
}

impl From<EngineError> for RespolError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Usage(e) => RespolError::Usage(e),
            EngineError::Transport(e) => RespolError::Transport(e),
        }
    }
}

/// Prelude module for convenient imports.
pub mod prelude {
    // Main types
    pub use crate::{ResourceSet, ResourceSetBuilder, RespolError, SetId};

    #[cfg(feature = "async")]
    pub use crate::{SetDriver, SetHandle, SetStatus};

    // Core types
    pub use respol_core::{
        EngineConfig, Resource, ResourceMode, ResourceType, SetConfig, SetState, UsageError,
    };

    // Transport types
    pub use respol_transport::{
        MemoryTransport, NotifyKind, ReplyOutcome, RequestId, RequestKind, Transport,
        TransportEvent,
    };

    // Observability types
    pub use respol_observe::{
        EventQueue, EventSubscriber, LoggingSubscriber, MetricsCollector, MetricsSnapshot,
        ResourceEvent,
    };

    // Common std types
    pub use std::sync::Arc;
}
