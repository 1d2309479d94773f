//! Messages exchanged with the arbiter.
//!
//! Outbound traffic is always a [`Request`]; inbound traffic is a
//! [`TransportEvent`]. The encoding on the wire belongs to the concrete
//! transport, so every type here derives serde traits and nothing more.

use std::fmt;

use respol_core::{Resource, ResourceMode, ResourceType};
use serde::{Deserialize, Serialize};

/// Identifier correlating a request with its reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(u64);

impl RequestId {
    /// Wrap a raw identifier.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw identifier.
    pub const fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a request asks the arbiter to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    /// Announce the application class and resource list.
    Register,
    /// Ask for the resources.
    Acquire,
    /// Give the resources back.
    Release,
}

impl RequestKind {
    /// Get the kind name.
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Register => "register",
            RequestKind::Acquire => "acquire",
            RequestKind::Release => "release",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire view of one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Resource type.
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    /// Whether the arbiter may grant the set without it.
    pub optional: bool,
    /// Attributes, forwarded verbatim.
    pub attributes: Vec<(String, String)>,
}

impl From<&Resource> for ResourceDescriptor {
    fn from(resource: &Resource) -> Self {
        Self {
            resource_type: resource.resource_type(),
            optional: resource.is_optional(),
            attributes: resource
                .attributes()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}

/// Body of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestPayload {
    /// Application class (priority label).
    pub application_class: String,
    /// Resources the request concerns.
    pub resources: Vec<ResourceDescriptor>,
    /// Mode flags in force when the request was built.
    pub mode: ResourceMode,
}

/// An outbound request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    /// Correlation identifier.
    pub id: RequestId,
    /// Request kind.
    pub kind: RequestKind,
    /// Request body.
    pub payload: RequestPayload,
}

impl Request {
    /// Resource types named in the payload.
    pub fn resource_types(&self) -> Vec<ResourceType> {
        self.payload
            .resources
            .iter()
            .map(|r| r.resource_type)
            .collect()
    }
}

/// Outcome carried by a reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyOutcome {
    /// The request succeeded.
    Ok,
    /// The arbiter refused the request.
    Denied,
    /// The arbiter could not process the request.
    Failed {
        /// Arbiter error code.
        code: i32,
        /// Arbiter error message.
        message: String,
    },
}

impl ReplyOutcome {
    /// Check if the outcome is a success.
    pub fn is_ok(&self) -> bool {
        matches!(self, ReplyOutcome::Ok)
    }
}

impl fmt::Display for ReplyOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplyOutcome::Ok => f.write_str("ok"),
            ReplyOutcome::Denied => f.write_str("denied"),
            ReplyOutcome::Failed { code, message } => write!(f, "failed ({code}): {message}"),
        }
    }
}

/// Unsolicited notification kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyKind {
    /// A higher-priority application took the resources.
    Lost,
    /// The arbiter revoked the resources on its own (e.g. headset unplugged).
    ReleasedByManager,
    /// Additional resources were granted after an earlier partial grant.
    Granted,
    /// Resources the set wants have become free.
    Available,
}

impl NotifyKind {
    /// Get the kind name.
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifyKind::Lost => "lost",
            NotifyKind::ReleasedByManager => "released_by_manager",
            NotifyKind::Granted => "granted",
            NotifyKind::Available => "available",
        }
    }
}

impl fmt::Display for NotifyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a transport can deliver to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TransportEvent {
    /// The channel to the arbiter is up.
    Connected,
    /// The channel to the arbiter went down.
    Disconnected,
    /// Reply to a request.
    Reply {
        /// Identifier of the request being answered.
        request_id: RequestId,
        /// Outcome.
        outcome: ReplyOutcome,
        /// Resource types granted, for acquire replies.
        granted: Vec<ResourceType>,
    },
    /// Notification not tied to a request.
    Notify {
        /// Notification kind.
        kind: NotifyKind,
        /// Resource types affected; empty means all of them.
        resources: Vec<ResourceType>,
    },
}

impl TransportEvent {
    /// Shorthand for a successful reply.
    pub fn ok(request_id: RequestId, granted: Vec<ResourceType>) -> Self {
        TransportEvent::Reply {
            request_id,
            outcome: ReplyOutcome::Ok,
            granted,
        }
    }

    /// Shorthand for a denial.
    pub fn denied(request_id: RequestId) -> Self {
        TransportEvent::Reply {
            request_id,
            outcome: ReplyOutcome::Denied,
            granted: Vec::new(),
        }
    }

    /// Shorthand for a notification.
    pub fn notify(kind: NotifyKind, resources: Vec<ResourceType>) -> Self {
        TransportEvent::Notify { kind, resources }
    }
}
