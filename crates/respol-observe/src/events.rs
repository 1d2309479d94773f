//! Lifecycle events raised to the application.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use respol_core::ResourceType;

/// Notifications a resource set raises while talking to the arbiter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ResourceEvent {
    /// Registration was accepted.
    ConnectedToManager,
    /// The session ended.
    DisconnectedFromManager,
    /// Registration was refused or timed out.
    ConnectionFailed {
        /// Why the registration did not complete.
        reason: String,
    },
    /// Resources were granted.
    ResourcesAcquired {
        /// Every resource type currently granted.
        granted: Vec<ResourceType>,
    },
    /// The acquire request was refused.
    ResourcesDenied,
    /// A higher-priority application took resources.
    LostResources {
        /// Resource types no longer granted.
        lost: Vec<ResourceType>,
    },
    /// A release request was acknowledged.
    ResourcesReleased,
    /// The arbiter revoked resources on its own.
    ResourcesReleasedByManager {
        /// Resource types no longer granted.
        released: Vec<ResourceType>,
    },
    /// Resources the set wants have become free.
    ResourcesBecameAvailable {
        /// Resource types now available.
        available: Vec<ResourceType>,
    },
}

impl ResourceEvent {
    /// Get the event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            ResourceEvent::ConnectedToManager => "connected_to_manager",
            ResourceEvent::DisconnectedFromManager => "disconnected_from_manager",
            ResourceEvent::ConnectionFailed { .. } => "connection_failed",
            ResourceEvent::ResourcesAcquired { .. } => "resources_acquired",
            ResourceEvent::ResourcesDenied => "resources_denied",
            ResourceEvent::LostResources { .. } => "lost_resources",
            ResourceEvent::ResourcesReleased => "resources_released",
            ResourceEvent::ResourcesReleasedByManager { .. } => "resources_released_by_manager",
            ResourceEvent::ResourcesBecameAvailable { .. } => "resources_became_available",
        }
    }
}

/// Subscriber for resource events.
pub trait EventSubscriber: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &ResourceEvent);

    /// Event types this subscriber wants; `None` means all of them.
    fn event_filter(&self) -> Option<Vec<&'static str>> {
        None
    }
}

impl<F> EventSubscriber for F
where
    F: Fn(&ResourceEvent) + Send + Sync,
{
    fn on_event(&self, event: &ResourceEvent) {
        self(event)
    }
}

/// A subscriber that logs every event through `tracing`.
pub struct LoggingSubscriber {
    /// Level used for routine events. Losses and failures log at `warn`.
    pub log_level: tracing::Level,
}

impl LoggingSubscriber {
    /// Create a new logging subscriber.
    pub fn new() -> Self {
        Self {
            log_level: tracing::Level::DEBUG,
        }
    }

    /// Set the log level.
    pub fn with_level(mut self, level: tracing::Level) -> Self {
        self.log_level = level;
        self
    }
}

impl Default for LoggingSubscriber {
    fn default() -> Self {
        Self::new()
    }
}

macro_rules! log_at {
    ($level:expr, $($arg:tt)+) => {{
        let level = $level;
        if level == tracing::Level::ERROR {
            tracing::error!($($arg)+)
        } else if level == tracing::Level::WARN {
            tracing::warn!($($arg)+)
        } else if level == tracing::Level::INFO {
            tracing::info!($($arg)+)
        } else if level == tracing::Level::DEBUG {
            tracing::debug!($($arg)+)
        } else {
            tracing::trace!($($arg)+)
        }
    }};
}

impl EventSubscriber for LoggingSubscriber {
    fn on_event(&self, event: &ResourceEvent) {
        match event {
            ResourceEvent::LostResources { lost } => {
                tracing::warn!(event = event.event_type(), lost = ?lost, "Resources lost");
            }
            ResourceEvent::ResourcesReleasedByManager { released } => {
                tracing::warn!(
                    event = event.event_type(),
                    released = ?released,
                    "Resources released by manager"
                );
            }
            ResourceEvent::ConnectionFailed { reason } => {
                tracing::warn!(event = event.event_type(), reason = %reason, "Connection failed");
            }
            ResourceEvent::ResourcesAcquired { granted } => {
                log_at!(
                    self.log_level,
                    event = event.event_type(),
                    granted = ?granted,
                    "Resources acquired"
                );
            }
            ResourceEvent::ResourcesBecameAvailable { available } => {
                log_at!(
                    self.log_level,
                    event = event.event_type(),
                    available = ?available,
                    "Resources became available"
                );
            }
            _ => {
                log_at!(self.log_level, event = event.event_type(), "Resource event");
            }
        }
    }
}

/// Bounded queue of events for applications that poll.
///
/// When full, the oldest event is discarded and counted in [`EventQueue::dropped`].
pub struct EventQueue {
    events: Mutex<VecDeque<ResourceEvent>>,
    capacity: usize,
    dropped: Mutex<u64>,
}

impl EventQueue {
    /// Default capacity.
    pub const DEFAULT_CAPACITY: usize = 256;

    /// Create a queue holding at most `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity.min(Self::DEFAULT_CAPACITY))),
            capacity: capacity.max(1),
            dropped: Mutex::new(0),
        }
    }

    /// Take the oldest queued event.
    pub fn pop(&self) -> Option<ResourceEvent> {
        self.events.lock().pop_front()
    }

    /// Take all queued events, oldest first.
    pub fn drain(&self) -> Vec<ResourceEvent> {
        self.events.lock().drain(..).collect()
    }

    /// Copy the queued events without removing them.
    pub fn snapshot(&self) -> Vec<ResourceEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Number of queued events.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Events discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        *self.dropped.lock()
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

impl EventSubscriber for EventQueue {
    fn on_event(&self, event: &ResourceEvent) {
        let mut events = self.events.lock();
        if events.len() >= self.capacity {
            events.pop_front();
            *self.dropped.lock() += 1;
            tracing::warn!(capacity = self.capacity, "Event queue full, dropping oldest event");
        }
        events.push_back(event.clone());
    }
}

/// Event dispatcher that manages subscribers.
#[derive(Default)]
pub struct EventDispatcher {
    subscribers: RwLock<Vec<Arc<dyn EventSubscriber>>>,
}

impl EventDispatcher {
    /// Create a new event dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscriber.
    pub fn subscribe(&self, subscriber: Arc<dyn EventSubscriber>) {
        self.subscribers.write().push(subscriber);
    }

    /// Remove one subscriber. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&self, subscriber: &Arc<dyn EventSubscriber>) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|s| !Arc::ptr_eq(s, subscriber));
        subscribers.len() != before
    }

    /// Remove all subscribers.
    pub fn clear_subscribers(&self) {
        self.subscribers.write().clear();
    }

    /// Get subscriber count.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Deliver an event to every interested subscriber, once each.
    pub fn emit(&self, event: ResourceEvent) {
        let subscribers = self.subscribers.read().clone();
        for subscriber in subscribers.iter() {
            if let Some(filter) = subscriber.event_filter() {
                if !filter.contains(&event.event_type()) {
                    continue;
                }
            }
            subscriber.on_event(&event);
        }
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}
