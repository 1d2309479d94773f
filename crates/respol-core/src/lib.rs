//! respol Core - resource descriptors and shared types
//!
//! This crate holds the value types every other respol crate builds on:
//!
//! - [`Resource`] and [`ResourceType`]: what an application asks the arbiter for
//! - [`SetState`]: where a resource set is in its lifecycle
//! - [`ResourceMode`], [`EngineConfig`], [`SetConfig`]: configuration
//! - [`UsageError`], [`ConfigError`]: synchronous error types
//!
//! # Example
//!
//! ```
//! use respol_core::prelude::*;
//!
//! let audio = Resource::new(ResourceType::AudioPlayback)
//!     .with_process_id(std::process::id())
//!     .with_stream_tag("media.name", "*");
//!
//! let config = EngineConfig::new()
//!     .with_mode(ResourceMode::new().with_auto_release(true));
//!
//! assert!(config.mode.auto_release);
//! assert_eq!(audio.resource_type(), ResourceType::AudioPlayback);
//! ```

pub mod config;
pub mod error;
pub mod resource;
pub mod state;

// Re-export main types at crate root
pub use config::{EngineConfig, ResourceConfig, ResourceMode, SetConfig};
pub use error::{ConfigError, ConfigResult, UsageError, UsageResult};
pub use resource::{Resource, ResourceType, attributes};
pub use state::SetState;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::{EngineConfig, ResourceMode, SetConfig};
    pub use crate::error::{ConfigError, UsageError};
    pub use crate::resource::{Resource, ResourceType};
    pub use crate::state::SetState;
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_prelude_imports() {
        use crate::prelude::*;

        let _ = Resource::new(ResourceType::Leds);
        let _ = EngineConfig::default();
        assert_eq!(SetState::default(), SetState::Disconnected);
    }
}
