//! Error types shared by the respol crates.

use thiserror::Error;

use crate::resource::ResourceType;
use crate::state::SetState;

/// Misuse of the resource-set API, rejected at the call site.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsageError {
    /// The set composition is frozen once registration has started.
    #[error("Resource set is {state}; resources can only be changed while disconnected")]
    SetLocked {
        /// The state the set was in.
        state: SetState,
    },

    /// A resource of this type is already part of the set.
    #[error("Resource already present: {0}")]
    DuplicateResource(ResourceType),

    /// No resource of this type is part of the set.
    #[error("Resource not in set: {0}")]
    UnknownResource(ResourceType),

    /// Acquiring a set without resources.
    #[error("Resource set is empty")]
    EmptyResourceSet,
}

/// Errors loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error reading a configuration file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The TOML document could not be parsed.
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// A resource type name is not recognised.
    #[error("Unknown resource type: '{0}'")]
    UnknownResourceType(String),

    /// The configuration is structurally valid but not usable.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for API usage checks.
pub type UsageResult<T> = std::result::Result<T, UsageError>;

/// Result type for configuration loading.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
