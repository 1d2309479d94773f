//! The application-facing resource set.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};
use uuid::Uuid;

use respol_core::{EngineConfig, Resource, ResourceMode, ResourceType, SetConfig, SetState};
use respol_engine::ResourceEngine;
use respol_observe::{EventQueue, EventSubscriber, MetricsCollector, ResourceEvent};
use respol_transport::{RequestId, Transport, TransportEvent};

use crate::RespolError;

/// Unique identifier for a resource set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SetId(Uuid);

impl SetId {
    /// Create a new random set ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SetId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A group of resources negotiated with the arbiter as a unit.
///
/// Every operation returns immediately. Outcomes arrive as
/// [`ResourceEvent`]s, delivered to subscribers and, unless the queue was
/// left out or detached, queued for [`ResourceSet::poll_event`].
pub struct ResourceSet {
    id: SetId,
    engine: ResourceEngine,
    events: Option<Arc<EventQueue>>,
}

impl ResourceSet {
    /// Create a set with the default configuration.
    pub fn new(application_class: impl Into<String>, transport: impl Transport + 'static) -> Self {
        Self::with_config(application_class, transport, EngineConfig::default())
    }

    /// Create a set with the given configuration.
    pub fn with_config(
        application_class: impl Into<String>,
        transport: impl Transport + 'static,
        config: EngineConfig,
    ) -> Self {
        Self::assemble(
            application_class.into(),
            transport,
            config,
            Some(EventQueue::DEFAULT_CAPACITY),
        )
    }

    fn assemble(
        application_class: String,
        transport: impl Transport + 'static,
        config: EngineConfig,
        queue_capacity: Option<usize>,
    ) -> Self {
        let id = SetId::new();
        let mut engine = ResourceEngine::new(application_class, Box::new(transport), config);
        engine.set_label(id.to_string());

        let events = queue_capacity.map(|capacity| Arc::new(EventQueue::new(capacity)));
        if let Some(queue) = &events {
            engine
                .events()
                .subscribe(Arc::clone(queue) as Arc<dyn EventSubscriber>);
        }

        info!(set = %id, class = %engine.application_class(), "Resource set created");
        Self { id, engine, events }
    }

    /// Start building a set.
    pub fn builder(application_class: impl Into<String>) -> ResourceSetBuilder {
        ResourceSetBuilder::new(application_class)
    }

    /// Create a set from a loaded configuration file.
    pub fn from_config(
        config: &SetConfig,
        transport: impl Transport + 'static,
    ) -> Result<Self, RespolError> {
        config.validate()?;
        ResourceSetBuilder::new(config.application_class.clone())
            .with_config(config.engine_config())
            .with_resources(config.to_resources())
            .build(transport)
    }

    // Composition

    /// Add a resource of the given type with attributes.
    ///
    /// An existing resource of the same type is replaced.
    pub fn add_resource<K, V>(
        &mut self,
        resource_type: ResourceType,
        attributes: impl IntoIterator<Item = (K, V)>,
    ) -> Result<(), RespolError>
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.add(Resource::new(resource_type).with_attributes(attributes))
            .map(|_| ())
    }

    /// Add a prepared resource, returning the one it replaced.
    pub fn add(&mut self, resource: Resource) -> Result<Option<Resource>, RespolError> {
        Ok(self.engine.add_resource(resource)?)
    }

    /// Add a resource, failing if one of the same type is present.
    pub fn add_unique_resource(&mut self, resource: Resource) -> Result<(), RespolError> {
        Ok(self.engine.add_unique_resource(resource)?)
    }

    /// Remove a resource.
    pub fn remove_resource(&mut self, resource_type: ResourceType) -> Result<Resource, RespolError> {
        Ok(self.engine.remove_resource(resource_type)?)
    }

    /// Set an attribute on a resource.
    pub fn set_attribute(
        &mut self,
        resource_type: ResourceType,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), RespolError> {
        Ok(self.engine.set_attribute(resource_type, name, value)?)
    }

    /// Mark a resource optional or mandatory.
    pub fn set_optional(
        &mut self,
        resource_type: ResourceType,
        optional: bool,
    ) -> Result<(), RespolError> {
        Ok(self.engine.set_optional(resource_type, optional)?)
    }

    /// Change the mode flags.
    pub fn set_mode(&mut self, mode: ResourceMode) {
        self.engine.set_mode(mode);
    }

    // Negotiation

    /// Register with the arbiter.
    pub fn connect(&mut self) -> Result<(), RespolError> {
        Ok(self.engine.connect()?)
    }

    /// Ask for the resources.
    pub fn acquire(&mut self) -> Result<(), RespolError> {
        Ok(self.engine.acquire()?)
    }

    /// Give the resources back.
    pub fn release(&mut self) -> Result<(), RespolError> {
        Ok(self.engine.release()?)
    }

    /// Release what is held and close the session.
    pub fn disconnect(&mut self) {
        self.engine.disconnect();
    }

    /// Apply an inbound transport event.
    pub fn handle(&mut self, event: TransportEvent) {
        self.engine.handle(event);
    }

    /// When an unanswered registration should be abandoned.
    pub fn registration_deadline(&self) -> Option<Instant> {
        self.engine.registration_deadline()
    }

    /// Abandon an unanswered registration.
    pub fn registration_timed_out(&mut self) -> bool {
        self.engine.registration_timed_out()
    }

    // Accessors

    /// Get the set ID.
    pub fn id(&self) -> SetId {
        self.id
    }

    /// Get the application class.
    pub fn application_class(&self) -> &str {
        self.engine.application_class()
    }

    /// Get the lifecycle state.
    pub fn state(&self) -> SetState {
        self.engine.state()
    }

    /// Get the mode flags.
    pub fn mode(&self) -> ResourceMode {
        self.engine.mode()
    }

    /// Whether anything is granted.
    pub fn has_grants(&self) -> bool {
        self.engine.has_grants()
    }

    /// Whether a resource of this type is granted.
    pub fn is_granted(&self, resource_type: ResourceType) -> bool {
        self.engine.is_granted(resource_type)
    }

    /// Types of all granted resources.
    pub fn granted_resources(&self) -> Vec<ResourceType> {
        self.engine.granted_resources()
    }

    /// Iterate over the resources.
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.engine.resources()
    }

    /// Look up a resource.
    pub fn resource(&self, resource_type: ResourceType) -> Option<&Resource> {
        self.engine.resource(resource_type)
    }

    /// The request whose reply is awaited.
    pub fn pending_request_id(&self) -> Option<RequestId> {
        self.engine.pending_request_id()
    }

    /// Subscribe to events.
    pub fn subscribe(&self, subscriber: Arc<dyn EventSubscriber>) {
        self.engine.events().subscribe(subscriber);
    }

    /// Take the oldest queued event.
    pub fn poll_event(&self) -> Option<ResourceEvent> {
        self.events.as_ref().and_then(|queue| queue.pop())
    }

    /// Take all queued events.
    pub fn drain_events(&self) -> Vec<ResourceEvent> {
        self.events
            .as_ref()
            .map(|queue| queue.drain())
            .unwrap_or_default()
    }

    /// The queue events are collected in, if the set has one.
    pub fn events(&self) -> Option<&Arc<EventQueue>> {
        self.events.as_ref()
    }

    /// Stop collecting events for polling.
    ///
    /// For callers that consume events through their own subscriber and
    /// never poll. Returns the queue with whatever it still holds.
    pub fn detach_event_queue(&mut self) -> Option<Arc<EventQueue>> {
        let queue = self.events.take()?;
        let subscriber = Arc::clone(&queue) as Arc<dyn EventSubscriber>;
        self.engine.events().unsubscribe(&subscriber);
        debug!(set = %self.id, pending = queue.len(), "Event queue detached");
        Some(queue)
    }

    /// Protocol metrics.
    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        self.engine.metrics()
    }

    /// The engine behind this set.
    pub fn engine(&self) -> &ResourceEngine {
        &self.engine
    }
}

impl std::fmt::Debug for ResourceSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceSet")
            .field("id", &self.id)
            .field("engine", &self.engine)
            .finish()
    }
}

/// Builder for a [`ResourceSet`].
pub struct ResourceSetBuilder {
    application_class: String,
    config: EngineConfig,
    resources: Vec<Resource>,
    subscribers: Vec<Arc<dyn EventSubscriber>>,
    queue_capacity: Option<usize>,
}

impl ResourceSetBuilder {
    /// Create a builder for the given application class.
    pub fn new(application_class: impl Into<String>) -> Self {
        Self {
            application_class: application_class.into(),
            config: EngineConfig::default(),
            resources: Vec::new(),
            subscribers: Vec::new(),
            queue_capacity: Some(EventQueue::DEFAULT_CAPACITY),
        }
    }

    /// Replace the engine configuration.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the mode flags.
    pub fn with_mode(mut self, mode: ResourceMode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Enable or disable automatic re-registration.
    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.config.auto_reconnect = enabled;
        self
    }

    /// Add a resource.
    pub fn with_resource(mut self, resource: impl Into<Resource>) -> Self {
        self.resources.push(resource.into());
        self
    }

    /// Add several resources.
    pub fn with_resources(mut self, resources: impl IntoIterator<Item = Resource>) -> Self {
        self.resources.extend(resources);
        self
    }

    /// Add an event subscriber.
    pub fn with_event_subscriber(mut self, subscriber: Arc<dyn EventSubscriber>) -> Self {
        self.subscribers.push(subscriber);
        self
    }

    /// Bound the polling queue.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    /// Leave out the polling queue; events reach subscribers only.
    pub fn without_event_queue(mut self) -> Self {
        self.queue_capacity = None;
        self
    }

    /// Build the set on top of a transport.
    pub fn build(self, transport: impl Transport + 'static) -> Result<ResourceSet, RespolError> {
        let mut set = ResourceSet::assemble(
            self.application_class,
            transport,
            self.config,
            self.queue_capacity,
        );
        for resource in self.resources {
            set.add(resource)?;
        }
        for subscriber in self.subscribers {
            set.subscribe(subscriber);
        }
        Ok(set)
    }
}

impl std::fmt::Debug for ResourceSetBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceSetBuilder")
            .field("application_class", &self.application_class)
            .field("config", &self.config)
            .field("resources", &self.resources)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
