//! Configuration types for resource sets.
//!
//! [`ResourceMode`] carries the flags forwarded to the arbiter, [`EngineConfig`]
//! controls client-side protocol behaviour, and [`SetConfig`] describes a whole
//! resource set so it can be declared in a TOML file.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};
use crate::resource::{Resource, ResourceType};

/// Mode flags of a resource set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceMode {
    /// Release the whole set automatically when resources are lost.
    pub auto_release: bool,

    /// Ask the arbiter to acknowledge every state change explicitly.
    pub always_reply: bool,
}

impl ResourceMode {
    /// No flags set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable automatic release on loss.
    pub fn with_auto_release(mut self, enabled: bool) -> Self {
        self.auto_release = enabled;
        self
    }

    /// Enable or disable explicit acknowledgements.
    pub fn with_always_reply(mut self, enabled: bool) -> Self {
        self.always_reply = enabled;
        self
    }
}

/// Client-side protocol configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineConfig {
    /// Mode flags sent with every request.
    pub mode: ResourceMode,

    /// Re-register automatically when the transport comes back up after a loss.
    ///
    /// If the set held or wanted resources when the connection dropped, they
    /// are acquired again once registration succeeds.
    pub auto_reconnect: bool,

    /// How long registration may stay unanswered before it is abandoned.
    ///
    /// The engine itself never waits; the deadline is enforced by whoever
    /// drives it (see `registration_deadline`).
    pub register_timeout: Option<Duration>,
}

impl EngineConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the mode flags.
    pub fn with_mode(mut self, mode: ResourceMode) -> Self {
        self.mode = mode;
        self
    }

    /// Enable or disable automatic reconnection.
    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Set the registration deadline.
    pub fn with_register_timeout(mut self, timeout: Duration) -> Self {
        self.register_timeout = Some(timeout);
        self
    }

    /// Configuration suited to media players: release on loss and reconnect
    /// when the arbiter restarts.
    pub fn interactive() -> Self {
        Self {
            mode: ResourceMode::new().with_auto_release(true),
            auto_reconnect: true,
            register_timeout: None,
        }
    }
}

/// One resource entry in a [`SetConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Resource type.
    #[serde(rename = "type")]
    pub resource_type: ResourceType,

    /// Whether the resource is optional.
    #[serde(default)]
    pub optional: bool,

    /// Attributes forwarded to the arbiter.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl ResourceConfig {
    /// Build the resource descriptor.
    pub fn to_resource(&self) -> Resource {
        Resource::new(self.resource_type)
            .with_optional(self.optional)
            .with_attributes(self.attributes.clone())
    }
}

/// Declarative description of a resource set.
///
/// # Example
///
/// ```
/// use respol_core::SetConfig;
///
/// let config = SetConfig::from_toml_str(r#"
///     application_class = "player"
///
///     [mode]
///     auto_release = true
///
///     [[resources]]
///     type = "audio_playback"
///     attributes = { pid = "1234" }
/// "#).unwrap();
///
/// assert_eq!(config.application_class, "player");
/// assert!(config.mode.auto_release);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetConfig {
    /// Application class (priority label).
    pub application_class: String,

    /// Mode flags.
    #[serde(default)]
    pub mode: ResourceMode,

    /// Re-register after a connection loss.
    #[serde(default)]
    pub auto_reconnect: bool,

    /// Registration deadline in milliseconds.
    #[serde(default)]
    pub register_timeout_ms: Option<u64>,

    /// Resources in the set.
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
}

impl SetConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(text: &str) -> ConfigResult<Self> {
        let config: SetConfig = toml::from_str(text)?;
        config.validate()?;
        debug!(
            class = %config.application_class,
            resources = config.resources.len(),
            "Parsed resource set configuration"
        );
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Check the configuration for problems serde cannot express.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.application_class.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "application_class must not be empty".to_string(),
            ));
        }

        let mut seen = BTreeSet::new();
        for entry in &self.resources {
            if !seen.insert(entry.resource_type) {
                return Err(ConfigError::Invalid(format!(
                    "resource '{}' listed more than once",
                    entry.resource_type
                )));
            }
        }

        if self.register_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "register_timeout_ms must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// The engine configuration described by this file.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            mode: self.mode,
            auto_reconnect: self.auto_reconnect,
            register_timeout: self.register_timeout_ms.map(Duration::from_millis),
        }
    }

    /// The resource descriptors described by this file.
    pub fn to_resources(&self) -> Vec<Resource> {
        self.resources.iter().map(ResourceConfig::to_resource).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_builder() {
        let mode = ResourceMode::new()
            .with_auto_release(true)
            .with_always_reply(true);
        assert!(mode.auto_release);
        assert!(mode.always_reply);
        assert_eq!(ResourceMode::default(), ResourceMode::new());
    }

    #[test]
    fn test_engine_config_presets() {
        let config = EngineConfig::default();
        assert!(!config.auto_reconnect);
        assert!(config.register_timeout.is_none());

        let interactive = EngineConfig::interactive();
        assert!(interactive.mode.auto_release);
        assert!(interactive.auto_reconnect);
        assert_eq!(interactive.register_timeout, None);
    }

    #[test]
    fn test_parse_full_config() {
        let config = SetConfig::from_toml_str(
            r#"
            application_class = "player"
            auto_reconnect = true
            register_timeout_ms = 2500

            [mode]
            auto_release = true
            always_reply = true

            [[resources]]
            type = "audio_playback"
            attributes = { pid = "31", "stream.tag.name" = "media.name" }

            [[resources]]
            type = "video_playback"
            optional = true
            "#,
        )
        .unwrap();

        let engine = config.engine_config();
        assert!(engine.mode.always_reply);
        assert!(engine.auto_reconnect);
        assert_eq!(engine.register_timeout, Some(Duration::from_millis(2500)));

        let resources = config.to_resources();
        assert_eq!(resources.len(), 2);
        assert_eq!(resources[0].process_id(), Some(31));
        assert!(resources[1].is_optional());
    }

    #[test]
    fn test_rejects_duplicate_types() {
        let result = SetConfig::from_toml_str(
            r#"
            application_class = "player"
            [[resources]]
            type = "vibra"
            [[resources]]
            type = "vibra"
            "#,
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_empty_class() {
        let result = SetConfig::from_toml_str(r#"application_class = "  ""#);
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_unknown_type() {
        let result = SetConfig::from_toml_str(
            r#"
            application_class = "player"
            [[resources]]
            type = "speaker"
            "#,
        );
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = SetConfig::from_file("/nonexistent/respol/set.toml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
