//! The resource negotiation state machine.
//!
//! [`ResourceEngine`] turns set operations into correlated requests, keeps the
//! table of outstanding requests, and applies replies and notifications from
//! the arbiter to the per-resource grant flags. It never waits: every
//! operation queues a message and returns, and outcomes are reported through
//! the engine's [`EventDispatcher`].
//!
//! # States
//!
//! ```text
//! Disconnected --connect--> Connecting --register ok--> Connected
//!                                                        |   ^
//!                                        acquire/release v   | reply
//!                                                  Acquiring / Releasing
//! ```
//!
//! Connection loss from any state leads back to `Disconnected`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use respol_core::{
    EngineConfig, Resource, ResourceMode, ResourceType, SetState, UsageError, UsageResult,
};
use respol_observe::{EventDispatcher, MetricsCollector, ResourceEvent};
use respol_transport::{
    BoxedTransport, NotifyKind, ReplyOutcome, Request, RequestId, RequestKind, RequestPayload,
    ResourceDescriptor, TransportEvent,
};

use crate::error::{EngineResult, ProtocolError};
use crate::pending::PendingRequests;

/// Client-side protocol engine for one resource set.
///
/// The engine exclusively owns its transport session and must be driven from
/// a single logical thread: operations and inbound transport events are plain
/// `&mut self` calls.
///
/// # Example
///
/// ```
/// use respol_core::{EngineConfig, Resource, ResourceType, SetState};
/// use respol_engine::ResourceEngine;
/// use respol_transport::{MemoryTransport, RequestKind, TransportEvent};
///
/// let (transport, handle) = MemoryTransport::new();
/// let mut engine = ResourceEngine::new("player", Box::new(transport), EngineConfig::default());
/// engine.add_resource(Resource::new(ResourceType::AudioPlayback)).unwrap();
///
/// engine.connect().unwrap();
/// let register = handle.last_of(RequestKind::Register).unwrap();
/// engine.handle(TransportEvent::ok(register.id, vec![]));
/// assert_eq!(engine.state(), SetState::Connected);
///
/// engine.acquire().unwrap();
/// let acquire = handle.last_of(RequestKind::Acquire).unwrap();
/// engine.handle(TransportEvent::ok(acquire.id, vec![ResourceType::AudioPlayback]));
/// assert!(engine.is_granted(ResourceType::AudioPlayback));
/// ```
pub struct ResourceEngine {
    /// Name used in log records.
    label: String,
    application_class: String,
    config: EngineConfig,
    transport: BoxedTransport,
    /// Whether `transport.connect()` succeeded and `disconnect()` is still owed.
    session_open: bool,
    state: SetState,
    resources: BTreeMap<ResourceType, Resource>,
    next_request_id: u64,
    pending: PendingRequests,
    /// The request whose reply drives the next transition.
    in_flight: Option<RequestId>,
    /// The application wants the resources (acquire called, no release since).
    wanted: bool,
    registered_once: bool,
    connecting_since: Option<Instant>,
    events: EventDispatcher,
    metrics: Arc<MetricsCollector>,
}

impl ResourceEngine {
    /// Create an engine for the given application class.
    pub fn new(
        application_class: impl Into<String>,
        transport: BoxedTransport,
        config: EngineConfig,
    ) -> Self {
        let application_class = application_class.into();
        Self {
            label: application_class.clone(),
            application_class,
            config,
            transport,
            session_open: false,
            state: SetState::Disconnected,
            resources: BTreeMap::new(),
            next_request_id: 1,
            pending: PendingRequests::new(),
            in_flight: None,
            wanted: false,
            registered_once: false,
            connecting_since: None,
            events: EventDispatcher::new(),
            metrics: Arc::new(MetricsCollector::new()),
        }
    }

    /// Set the name used in log records.
    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = label.into();
    }

    // Composition

    fn ensure_mutable(&self) -> UsageResult<()> {
        if self.state == SetState::Disconnected {
            Ok(())
        } else {
            Err(UsageError::SetLocked { state: self.state })
        }
    }

    /// Add a resource, replacing any resource of the same type.
    ///
    /// Returns the replaced resource.
    pub fn add_resource(&mut self, mut resource: Resource) -> UsageResult<Option<Resource>> {
        self.ensure_mutable()?;
        resource.set_granted(false);
        let resource_type = resource.resource_type();
        let replaced = self.resources.insert(resource_type, resource);
        debug!(
            set = %self.label,
            resource = %resource_type,
            replaced = replaced.is_some(),
            "Resource added"
        );
        Ok(replaced)
    }

    /// Add a resource, rejecting a second resource of the same type.
    pub fn add_unique_resource(&mut self, resource: Resource) -> UsageResult<()> {
        self.ensure_mutable()?;
        if self.resources.contains_key(&resource.resource_type()) {
            return Err(UsageError::DuplicateResource(resource.resource_type()));
        }
        self.add_resource(resource).map(|_| ())
    }

    /// Remove a resource.
    pub fn remove_resource(&mut self, resource_type: ResourceType) -> UsageResult<Resource> {
        self.ensure_mutable()?;
        let removed = self
            .resources
            .remove(&resource_type)
            .ok_or(UsageError::UnknownResource(resource_type))?;
        debug!(set = %self.label, resource = %resource_type, "Resource removed");
        Ok(removed)
    }

    /// Set an attribute on a resource.
    pub fn set_attribute(
        &mut self,
        resource_type: ResourceType,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> UsageResult<()> {
        self.ensure_mutable()?;
        self.resources
            .get_mut(&resource_type)
            .ok_or(UsageError::UnknownResource(resource_type))?
            .set_attribute(name, value);
        Ok(())
    }

    /// Mark a resource optional or mandatory.
    pub fn set_optional(&mut self, resource_type: ResourceType, optional: bool) -> UsageResult<()> {
        self.ensure_mutable()?;
        self.resources
            .get_mut(&resource_type)
            .ok_or(UsageError::UnknownResource(resource_type))?
            .set_optional(optional);
        Ok(())
    }

    /// Replace the mode flags. They travel with every subsequent request.
    pub fn set_mode(&mut self, mode: ResourceMode) {
        debug!(
            set = %self.label,
            auto_release = mode.auto_release,
            always_reply = mode.always_reply,
            "Mode changed"
        );
        self.config.mode = mode;
    }

    // Operations

    /// Open the session and register with the arbiter.
    ///
    /// Does nothing unless the set is disconnected.
    pub fn connect(&mut self) -> EngineResult<()> {
        if self.state != SetState::Disconnected {
            debug!(set = %self.label, state = %self.state, "Connect ignored");
            return Ok(());
        }

        if !self.session_open {
            if let Err(e) = self.transport.connect() {
                warn!(set = %self.label, error = %e, "Failed to open transport session");
                return Err(e.into());
            }
            self.session_open = true;
            info!(
                set = %self.label,
                transport = self.transport.name(),
                "Transport session opened"
            );
        }

        self.begin(RequestKind::Register, SetState::Connecting)?;
        self.connecting_since = Some(Instant::now());
        Ok(())
    }

    /// Ask for the resources.
    ///
    /// Before registration completes the request is remembered and sent once
    /// the arbiter accepts the registration. While another acquire is in
    /// flight the new one supersedes it.
    pub fn acquire(&mut self) -> EngineResult<()> {
        if self.resources.is_empty() {
            return Err(UsageError::EmptyResourceSet.into());
        }
        self.wanted = true;

        match self.state {
            SetState::Disconnected | SetState::Connecting => {
                debug!(set = %self.label, state = %self.state, "Acquire deferred until registered");
                Ok(())
            }
            SetState::Connected | SetState::Acquiring | SetState::Releasing => {
                self.begin(RequestKind::Acquire, SetState::Acquiring)?;
                Ok(())
            }
        }
    }

    /// Give the resources back, cancelling any acquire in flight.
    pub fn release(&mut self) -> EngineResult<()> {
        self.wanted = false;

        match self.state {
            SetState::Disconnected | SetState::Connecting => {
                debug!(set = %self.label, state = %self.state, "Deferred acquire dropped");
                Ok(())
            }
            SetState::Connected | SetState::Acquiring | SetState::Releasing => {
                self.begin(RequestKind::Release, SetState::Releasing)?;
                Ok(())
            }
        }
    }

    /// End the session, releasing held resources on the way out.
    ///
    /// The set stays disconnected until [`connect`](Self::connect) is called
    /// again, even with auto-reconnect enabled.
    pub fn disconnect(&mut self) {
        self.wanted = false;
        self.registered_once = false;
        if self.state == SetState::Disconnected {
            self.close_session();
            return;
        }

        self.release_for_teardown();
        self.connection_lost();
    }

    /// When registration should be abandoned, if a deadline is configured.
    pub fn registration_deadline(&self) -> Option<Instant> {
        let since = self.connecting_since?;
        Some(since + self.config.register_timeout?)
    }

    /// Abandon a registration that went unanswered.
    ///
    /// Returns `false` if the set was not connecting.
    pub fn registration_timed_out(&mut self) -> bool {
        if self.state != SetState::Connecting {
            return false;
        }
        warn!(set = %self.label, "Registration timed out");
        self.in_flight = None;
        self.registration_failed("registration timed out".to_string());
        true
    }

    // Transport callbacks

    /// Apply an inbound transport event.
    pub fn handle(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Connected => self.on_connected(),
            TransportEvent::Disconnected => self.on_disconnected(),
            TransportEvent::Reply {
                request_id,
                outcome,
                granted,
            } => self.on_reply(request_id, outcome, granted),
            TransportEvent::Notify { kind, resources } => self.on_notify(kind, resources),
        }
    }

    /// The channel to the arbiter came up.
    pub fn on_connected(&mut self) {
        match self.state {
            SetState::Disconnected if self.config.auto_reconnect && self.registered_once => {
                info!(set = %self.label, "Resource manager is back, registering again");
                if let Err(e) = self.connect() {
                    warn!(set = %self.label, error = %e, "Re-registration failed");
                }
            }
            state => {
                debug!(set = %self.label, state = %state, "Transport reports connection up");
            }
        }
    }

    /// The channel to the arbiter went down.
    pub fn on_disconnected(&mut self) {
        self.connection_lost();
    }

    /// A reply arrived.
    pub fn on_reply(&mut self, id: RequestId, outcome: ReplyOutcome, granted: Vec<ResourceType>) {
        let Some(entry) = self.pending.take(id) else {
            self.protocol_error(ProtocolError::UnknownRequest(id));
            return;
        };

        if self.in_flight != Some(id) {
            debug!(
                set = %self.label,
                request_id = %id,
                kind = %entry.kind,
                outcome = %outcome,
                "Discarding reply to superseded request"
            );
            self.metrics.record_reply_superseded();
            return;
        }

        self.in_flight = None;
        self.metrics.record_reply_matched(entry.age());

        match entry.kind {
            RequestKind::Register => self.registration_answered(outcome),
            RequestKind::Acquire => self.acquire_answered(outcome, granted),
            RequestKind::Release => self.release_answered(outcome),
        }
    }

    /// An unsolicited notification arrived.
    pub fn on_notify(&mut self, kind: NotifyKind, resources: Vec<ResourceType>) {
        match kind {
            NotifyKind::Lost | NotifyKind::ReleasedByManager => self.revoked(kind, resources),
            NotifyKind::Granted => self.granted_later(resources),
            NotifyKind::Available => self.became_available(resources),
        }
    }

    // Reply handling

    fn registration_answered(&mut self, outcome: ReplyOutcome) {
        self.connecting_since = None;

        if !outcome.is_ok() {
            warn!(set = %self.label, outcome = %outcome, "Registration refused");
            self.registration_failed(format!("registration refused: {outcome}"));
            return;
        }

        self.registered_once = true;
        self.set_state(SetState::Connected);
        self.metrics.record_connected();
        info!(
            set = %self.label,
            class = %self.application_class,
            resources = self.resources.len(),
            "Registered with resource manager"
        );
        self.events.emit(ResourceEvent::ConnectedToManager);

        if self.wanted && self.resources.is_empty() {
            debug!(set = %self.label, "Deferred acquire dropped, set is empty");
            self.wanted = false;
        } else if self.wanted {
            if let Err(e) = self.begin(RequestKind::Acquire, SetState::Acquiring) {
                warn!(set = %self.label, error = %e, "Deferred acquire could not be sent");
            }
        }
    }

    fn acquire_answered(&mut self, outcome: ReplyOutcome, granted: Vec<ResourceType>) {
        self.set_state(SetState::Connected);

        if let ReplyOutcome::Failed { code, message } = &outcome {
            warn!(set = %self.label, code, message = %message, "Acquire failed");
        }

        let mut known = BTreeSet::new();
        let mut foreign = Vec::new();
        if outcome.is_ok() {
            for resource_type in granted {
                if self.resources.contains_key(&resource_type) {
                    known.insert(resource_type);
                } else {
                    foreign.push(resource_type);
                }
            }
        }
        if !foreign.is_empty() {
            self.protocol_error(ProtocolError::ForeignGrant(foreign));
        }

        if known.is_empty() {
            self.clear_grants();
            self.wanted = false;
            self.metrics.record_denial();
            info!(set = %self.label, "Resources denied");
            self.events.emit(ResourceEvent::ResourcesDenied);
            return;
        }

        for (resource_type, resource) in self.resources.iter_mut() {
            resource.set_granted(known.contains(resource_type));
        }
        self.metrics.record_grant();
        let granted = self.granted_resources();
        info!(set = %self.label, granted = ?granted, "Resources acquired");
        self.events.emit(ResourceEvent::ResourcesAcquired { granted });
    }

    fn release_answered(&mut self, outcome: ReplyOutcome) {
        if !outcome.is_ok() {
            warn!(set = %self.label, outcome = %outcome, "Release not acknowledged cleanly");
        }
        self.clear_grants();
        self.set_state(SetState::Connected);
        self.metrics.record_release();
        info!(set = %self.label, "Resources released");
        self.events.emit(ResourceEvent::ResourcesReleased);
    }

    // Notification handling

    fn revoked(&mut self, kind: NotifyKind, resources: Vec<ResourceType>) {
        if !self.state.is_registered() {
            self.protocol_error(ProtocolError::UnexpectedNotification {
                kind,
                state: self.state,
            });
            return;
        }

        let affected: Vec<ResourceType> = self
            .resources
            .values()
            .filter(|r| r.is_granted())
            .map(Resource::resource_type)
            .filter(|t| resources.is_empty() || resources.contains(t))
            .collect();
        if affected.is_empty() {
            self.protocol_error(ProtocolError::IrrelevantResources { kind, resources });
            return;
        }

        for resource_type in &affected {
            if let Some(resource) = self.resources.get_mut(resource_type) {
                resource.set_granted(false);
            }
        }

        if kind == NotifyKind::ReleasedByManager {
            self.metrics.record_manager_release();
            info!(set = %self.label, released = ?affected, "Resources released by manager");
            self.events
                .emit(ResourceEvent::ResourcesReleasedByManager { released: affected });
            return;
        }

        self.metrics.record_loss();
        info!(set = %self.label, lost = ?affected, "Resources lost");
        self.events.emit(ResourceEvent::LostResources { lost: affected });

        if self.config.mode.auto_release {
            if self.state == SetState::Connected {
                info!(set = %self.label, "Releasing automatically after loss");
                if let Err(e) = self.release() {
                    warn!(set = %self.label, error = %e, "Automatic release failed");
                }
            } else {
                debug!(set = %self.label, state = %self.state, "Automatic release skipped");
            }
        }
    }

    fn granted_later(&mut self, resources: Vec<ResourceType>) {
        if !matches!(self.state, SetState::Connected | SetState::Acquiring) {
            self.protocol_error(ProtocolError::UnexpectedNotification {
                kind: NotifyKind::Granted,
                state: self.state,
            });
            return;
        }

        let mut refined = false;
        for resource_type in &resources {
            if let Some(resource) = self.resources.get_mut(resource_type) {
                if !resource.is_granted() {
                    resource.set_granted(true);
                    refined = true;
                }
            }
        }
        if !refined {
            self.protocol_error(ProtocolError::IrrelevantResources {
                kind: NotifyKind::Granted,
                resources,
            });
            return;
        }

        self.metrics.record_grant();
        let granted = self.granted_resources();
        info!(set = %self.label, granted = ?granted, "Grant refined");
        self.events.emit(ResourceEvent::ResourcesAcquired { granted });
    }

    fn became_available(&mut self, resources: Vec<ResourceType>) {
        if !self.state.is_registered() {
            self.protocol_error(ProtocolError::UnexpectedNotification {
                kind: NotifyKind::Available,
                state: self.state,
            });
            return;
        }

        let available: Vec<ResourceType> = resources
            .iter()
            .copied()
            .filter(|t| self.resources.contains_key(t))
            .collect();
        if available.is_empty() {
            self.protocol_error(ProtocolError::IrrelevantResources {
                kind: NotifyKind::Available,
                resources,
            });
            return;
        }

        debug!(set = %self.label, available = ?available, "Resources became available");
        self.events
            .emit(ResourceEvent::ResourcesBecameAvailable { available });
    }

    // Internals

    fn allocate_request_id(&mut self) -> RequestId {
        let id = RequestId::new(self.next_request_id);
        self.next_request_id += 1;
        id
    }

    fn build_request(&mut self, kind: RequestKind) -> Request {
        Request {
            id: self.allocate_request_id(),
            kind,
            payload: RequestPayload {
                application_class: self.application_class.clone(),
                resources: self.resources.values().map(ResourceDescriptor::from).collect(),
                mode: self.config.mode,
            },
        }
    }

    /// Send a request and record it as outstanding.
    fn dispatch(&mut self, kind: RequestKind) -> EngineResult<RequestId> {
        let request = self.build_request(kind);

        if let Err(e) = self.transport.send(&request) {
            warn!(
                set = %self.label,
                request_id = %request.id,
                kind = %kind,
                error = %e,
                "Failed to send request"
            );
            self.connection_lost();
            return Err(e.into());
        }

        debug!(set = %self.label, request_id = %request.id, kind = %kind, "Request sent");
        self.pending.insert(request.id, kind);
        self.metrics.record_request_sent(kind.as_str());
        Ok(request.id)
    }

    /// Send a request that becomes the one in flight, superseding any other.
    fn begin(&mut self, kind: RequestKind, next: SetState) -> EngineResult<RequestId> {
        let id = self.dispatch(kind)?;
        if let Some(previous) = self.in_flight.replace(id) {
            debug!(
                set = %self.label,
                superseded = %previous,
                by = %id,
                "Request superseded"
            );
            self.metrics.record_superseded_request();
        }
        self.set_state(next);
        Ok(id)
    }

    fn release_for_teardown(&mut self) {
        if !self.session_open || !(self.has_grants() || self.state == SetState::Acquiring) {
            return;
        }
        let request = self.build_request(RequestKind::Release);
        match self.transport.send(&request) {
            Ok(()) => {
                self.metrics.record_request_sent(RequestKind::Release.as_str());
                debug!(set = %self.label, request_id = %request.id, "Released on teardown");
            }
            Err(e) => {
                debug!(set = %self.label, error = %e, "Release on teardown not delivered");
            }
        }
    }

    fn registration_failed(&mut self, reason: String) {
        self.pending.clear();
        self.connecting_since = None;
        self.close_session();
        if !self.config.auto_reconnect {
            self.wanted = false;
        }
        self.set_state(SetState::Disconnected);
        self.metrics.record_connection_failure();
        self.events.emit(ResourceEvent::ConnectionFailed { reason });
    }

    fn connection_lost(&mut self) {
        let previous = self.state;
        let discarded = self.pending.clear();
        self.in_flight = None;
        self.connecting_since = None;
        self.clear_grants();
        self.close_session();
        if !self.config.auto_reconnect {
            self.wanted = false;
        }
        self.set_state(SetState::Disconnected);

        if previous != SetState::Disconnected {
            self.metrics.record_disconnected(discarded);
            info!(
                set = %self.label,
                previous = %previous,
                discarded,
                "Disconnected from resource manager"
            );
            self.events.emit(ResourceEvent::DisconnectedFromManager);
        }
    }

    fn close_session(&mut self) {
        if self.session_open {
            self.transport.disconnect();
            self.session_open = false;
            info!(set = %self.label, "Transport session closed");
        }
    }

    fn clear_grants(&mut self) {
        for resource in self.resources.values_mut() {
            resource.set_granted(false);
        }
    }

    fn set_state(&mut self, next: SetState) {
        if self.state != next {
            debug!(set = %self.label, from = %self.state, to = %next, "State change");
            self.state = next;
        }
        debug_assert_eq!(
            self.in_flight.is_some(),
            self.state.has_request_in_flight(),
            "in-flight request must match state {}",
            self.state
        );
    }

    fn protocol_error(&self, error: ProtocolError) {
        warn!(set = %self.label, state = %self.state, error = %error, "Ignoring message");
        self.metrics.record_protocol_error();
    }

    // Accessors

    /// Get the application class.
    pub fn application_class(&self) -> &str {
        &self.application_class
    }

    /// Get the current state.
    pub fn state(&self) -> SetState {
        self.state
    }

    /// Get the configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Get the mode flags.
    pub fn mode(&self) -> ResourceMode {
        self.config.mode
    }

    /// Iterate over the resources, ordered by type.
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    /// Look up a resource.
    pub fn resource(&self, resource_type: ResourceType) -> Option<&Resource> {
        self.resources.get(&resource_type)
    }

    /// Whether a resource of this type is in the set.
    pub fn contains(&self, resource_type: ResourceType) -> bool {
        self.resources.contains_key(&resource_type)
    }

    /// Whether a resource of this type is currently granted.
    pub fn is_granted(&self, resource_type: ResourceType) -> bool {
        self.resources
            .get(&resource_type)
            .is_some_and(Resource::is_granted)
    }

    /// Whether anything is currently granted.
    pub fn has_grants(&self) -> bool {
        self.resources.values().any(Resource::is_granted)
    }

    /// Types of all granted resources.
    pub fn granted_resources(&self) -> Vec<ResourceType> {
        self.resources
            .values()
            .filter(|r| r.is_granted())
            .map(Resource::resource_type)
            .collect()
    }

    /// The request whose reply drives the next transition.
    pub fn pending_request_id(&self) -> Option<RequestId> {
        self.in_flight
    }

    /// All outstanding requests, including superseded ones.
    pub fn pending_requests(&self) -> &PendingRequests {
        &self.pending
    }

    /// Whether the transport session is open.
    pub fn is_session_open(&self) -> bool {
        self.session_open
    }

    /// The dispatcher events are emitted through.
    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    /// Protocol metrics.
    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }
}

impl Drop for ResourceEngine {
    fn drop(&mut self) {
        self.release_for_teardown();
        self.close_session();
    }
}

impl std::fmt::Debug for ResourceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceEngine")
            .field("label", &self.label)
            .field("application_class", &self.application_class)
            .field("state", &self.state)
            .field("resources", &self.resources.keys().collect::<Vec<_>>())
            .field("in_flight", &self.in_flight)
            .field("pending", &self.pending.len())
            .finish()
    }
}
