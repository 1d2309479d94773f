//! Resource descriptors.
//!
//! A [`Resource`] describes one hardware capability an application wants to
//! use: an audio route, the vibration motor, a hardware button and so on.
//! Resources are plain values. Their `granted` flag is owned by the protocol
//! engine; applications only read it.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// The closed set of resource kinds the arbiter knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    /// Audio output route.
    AudioPlayback,
    /// Audio capture route.
    AudioRecorder,
    /// Video overlay.
    VideoPlayback,
    /// Camera / video capture.
    VideoRecorder,
    /// Vibration motor.
    Vibra,
    /// Notification LEDs.
    Leds,
    /// Display backlight.
    Backlight,
    /// Power / system key.
    SystemButton,
    /// Lock slider.
    LockButton,
    /// Volume (scale) keys.
    ScaleButton,
    /// Camera snap key.
    SnapButton,
    /// Camera lens cover switch.
    LensCover,
    /// Headset media keys.
    HeadsetButtons,
}

impl ResourceType {
    /// Every resource type, in protocol order.
    pub const ALL: [ResourceType; 13] = [
        ResourceType::AudioPlayback,
        ResourceType::AudioRecorder,
        ResourceType::VideoPlayback,
        ResourceType::VideoRecorder,
        ResourceType::Vibra,
        ResourceType::Leds,
        ResourceType::Backlight,
        ResourceType::SystemButton,
        ResourceType::LockButton,
        ResourceType::ScaleButton,
        ResourceType::SnapButton,
        ResourceType::LensCover,
        ResourceType::HeadsetButtons,
    ];

    /// Get the canonical name used in configuration and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::AudioPlayback => "audio_playback",
            ResourceType::AudioRecorder => "audio_recorder",
            ResourceType::VideoPlayback => "video_playback",
            ResourceType::VideoRecorder => "video_recorder",
            ResourceType::Vibra => "vibra",
            ResourceType::Leds => "leds",
            ResourceType::Backlight => "backlight",
            ResourceType::SystemButton => "system_button",
            ResourceType::LockButton => "lock_button",
            ResourceType::ScaleButton => "scale_button",
            ResourceType::SnapButton => "snap_button",
            ResourceType::LensCover => "lens_cover",
            ResourceType::HeadsetButtons => "headset_buttons",
        }
    }

    /// Whether this is one of the hardware-button variants.
    pub fn is_button(&self) -> bool {
        matches!(
            self,
            ResourceType::SystemButton
                | ResourceType::LockButton
                | ResourceType::ScaleButton
                | ResourceType::SnapButton
                | ResourceType::LensCover
                | ResourceType::HeadsetButtons
        )
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResourceType::ALL
            .iter()
            .copied()
            .find(|ty| ty.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownResourceType(s.to_string()))
    }
}

/// Well-known attribute names understood by the arbiter.
///
/// Attributes are opaque to this crate and forwarded verbatim; these
/// constants only spare callers from spelling the keys themselves.
pub mod attributes {
    /// Owning process id.
    pub const PROCESS_ID: &str = "pid";

    /// Audio group (application class the stream is routed under).
    pub const AUDIO_GROUP: &str = "audio.group";

    /// Name of the stream property used to classify the stream.
    pub const STREAM_TAG_NAME: &str = "stream.tag.name";

    /// Value of the stream classifier property.
    pub const STREAM_TAG_VALUE: &str = "stream.tag.value";
}

/// Descriptor of one hardware capability request.
///
/// # Example
///
/// ```
/// use respol_core::{Resource, ResourceType};
///
/// let audio = Resource::new(ResourceType::AudioPlayback)
///     .with_process_id(4242)
///     .with_stream_tag("media.name", "*");
///
/// assert_eq!(audio.process_id(), Some(4242));
/// assert!(!audio.is_granted());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    resource_type: ResourceType,
    optional: bool,
    attributes: BTreeMap<String, String>,
    #[serde(skip)]
    granted: bool,
}

impl Resource {
    /// Create a mandatory resource with no attributes.
    pub fn new(resource_type: ResourceType) -> Self {
        Self {
            resource_type,
            optional: false,
            attributes: BTreeMap::new(),
            granted: false,
        }
    }

    /// Create an optional resource.
    pub fn optional(resource_type: ResourceType) -> Self {
        Self::new(resource_type).with_optional(true)
    }

    /// Mark the resource optional or mandatory.
    pub fn with_optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    /// Add an attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Add several attributes at once.
    pub fn with_attributes<K, V>(mut self, attributes: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        for (name, value) in attributes {
            self.attributes.insert(name.into(), value.into());
        }
        self
    }

    /// Tag the resource with the owning process id.
    pub fn with_process_id(self, pid: u32) -> Self {
        self.with_attribute(attributes::PROCESS_ID, pid.to_string())
    }

    /// Set the audio group.
    pub fn with_audio_group(self, group: impl Into<String>) -> Self {
        self.with_attribute(attributes::AUDIO_GROUP, group)
    }

    /// Set the stream classifier property.
    pub fn with_stream_tag(self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.with_attribute(attributes::STREAM_TAG_NAME, name)
            .with_attribute(attributes::STREAM_TAG_VALUE, value)
    }

    /// Get the resource type.
    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    /// Whether the arbiter may grant the set without this resource.
    pub fn is_optional(&self) -> bool {
        self.optional
    }

    /// Whether the resource is currently granted.
    pub fn is_granted(&self) -> bool {
        self.granted
    }

    /// Get an attribute value.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// All attributes, ordered by name.
    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    /// The process id attribute, if present and numeric.
    pub fn process_id(&self) -> Option<u32> {
        self.attribute(attributes::PROCESS_ID)?.parse().ok()
    }

    /// The audio group attribute.
    pub fn audio_group(&self) -> Option<&str> {
        self.attribute(attributes::AUDIO_GROUP)
    }

    /// The stream classifier as a `(name, value)` pair.
    pub fn stream_tag(&self) -> Option<(&str, &str)> {
        Some((
            self.attribute(attributes::STREAM_TAG_NAME)?,
            self.attribute(attributes::STREAM_TAG_VALUE)?,
        ))
    }

    /// Set an attribute in place.
    ///
    /// Owners must only call this while the set is still disconnected; the
    /// set facade enforces that.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(name.into(), value.into());
    }

    /// Remove an attribute, returning its previous value.
    pub fn remove_attribute(&mut self, name: &str) -> Option<String> {
        self.attributes.remove(name)
    }

    /// Change the optional flag in place.
    pub fn set_optional(&mut self, optional: bool) {
        self.optional = optional;
    }

    /// Update the grant flag. Reserved for the protocol engine.
    #[doc(hidden)]
    pub fn set_granted(&mut self, granted: bool) {
        self.granted = granted;
    }
}

impl From<ResourceType> for Resource {
    fn from(resource_type: ResourceType) -> Self {
        Self::new(resource_type)
    }
}
