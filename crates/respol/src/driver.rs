//! Tokio driver owning a resource set on one task.
//!
//! The engine must see every operation and every inbound transport event on
//! a single logical thread. [`SetDriver::run`] is that thread: it selects
//! over transport events, commands from [`SetHandle`]s and the registration
//! deadline, and forwards resource events to an mpsc channel.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant as TokioInstant, sleep_until};
use tracing::{debug, info, warn};

use respol_core::{ResourceType, SetState};
use respol_observe::{EventSubscriber, ResourceEvent};
use respol_transport::TransportEvent;

use crate::RespolError;
use crate::set::{ResourceSet, SetId};

const COMMAND_BUFFER: usize = 32;

type Reply = oneshot::Sender<Result<(), RespolError>>;

enum Command {
    Connect(Reply),
    Acquire(Reply),
    Release(Reply),
    Disconnect(oneshot::Sender<()>),
    Status(oneshot::Sender<SetStatus>),
    Shutdown,
}

/// State of a driven set at the time it was asked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetStatus {
    /// Lifecycle state.
    pub state: SetState,
    /// Granted resource types.
    pub granted: Vec<ResourceType>,
}

/// Forwards resource events into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSubscriber {
    sender: mpsc::UnboundedSender<ResourceEvent>,
}

impl ChannelSubscriber {
    /// Create a subscriber and the receiver it feeds.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ResourceEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl EventSubscriber for ChannelSubscriber {
    fn on_event(&self, event: &ResourceEvent) {
        if self.sender.send(event.clone()).is_err() {
            debug!(event = event.event_type(), "Event receiver dropped");
        }
    }
}

/// Runs a [`ResourceSet`] until shut down.
pub struct SetDriver {
    set: ResourceSet,
    inbound: mpsc::UnboundedReceiver<TransportEvent>,
    commands: mpsc::Receiver<Command>,
}

impl SetDriver {
    /// Wrap a set and the receiver of its transport's inbound events.
    ///
    /// Returns the driver, a handle for issuing operations, and the stream of
    /// resource events. The set's polling queue is detached; events reach the
    /// application through the returned receiver only.
    pub fn new(
        mut set: ResourceSet,
        inbound: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> (Self, SetHandle, mpsc::UnboundedReceiver<ResourceEvent>) {
        let (subscriber, events) = ChannelSubscriber::new();
        if let Some(queue) = set.detach_event_queue() {
            for event in queue.drain() {
                subscriber.on_event(&event);
            }
        }
        set.subscribe(Arc::new(subscriber));

        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let handle = SetHandle {
            id: set.id(),
            commands: command_tx,
        };

        (
            Self {
                set,
                inbound,
                commands: command_rx,
            },
            handle,
            events,
        )
    }

    /// Drive the set until shutdown is requested or every handle is dropped.
    ///
    /// Returns the set so the caller decides when it is torn down.
    pub async fn run(mut self) -> ResourceSet {
        let id = self.set.id();
        let mut inbound_open = true;
        info!(set = %id, "Driver started");

        loop {
            let deadline = self.set.registration_deadline();
            let sleep_target =
                TokioInstant::from_std(deadline.unwrap_or_else(std::time::Instant::now));

            tokio::select! {
                event = self.inbound.recv(), if inbound_open => match event {
                    Some(event) => self.set.handle(event),
                    None => {
                        warn!(set = %id, "Transport event stream closed");
                        inbound_open = false;
                        self.set.handle(TransportEvent::Disconnected);
                    }
                },
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.execute(command),
                },
                _ = sleep_until(sleep_target), if deadline.is_some() => {
                    self.set.registration_timed_out();
                }
            }
        }

        info!(set = %id, state = %self.set.state(), "Driver stopped");
        self.set
    }

    fn execute(&mut self, command: Command) {
        match command {
            Command::Connect(reply) => {
                let _ = reply.send(self.set.connect());
            }
            Command::Acquire(reply) => {
                let _ = reply.send(self.set.acquire());
            }
            Command::Release(reply) => {
                let _ = reply.send(self.set.release());
            }
            Command::Disconnect(reply) => {
                self.set.disconnect();
                let _ = reply.send(());
            }
            Command::Status(reply) => {
                let _ = reply.send(SetStatus {
                    state: self.set.state(),
                    granted: self.set.granted_resources(),
                });
            }
            Command::Shutdown => {}
        }
    }
}

impl std::fmt::Debug for SetDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SetDriver").field("set", &self.set).finish()
    }
}

/// Cloneable handle to a running [`SetDriver`].
#[derive(Debug, Clone)]
pub struct SetHandle {
    id: SetId,
    commands: mpsc::Sender<Command>,
}

impl SetHandle {
    /// ID of the driven set.
    pub fn id(&self) -> SetId {
        self.id
    }

    async fn request(&self, make: impl FnOnce(Reply) -> Command) -> Result<(), RespolError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| RespolError::DriverClosed)?;
        rx.await.map_err(|_| RespolError::DriverClosed)?
    }

    /// Register with the arbiter.
    pub async fn connect(&self) -> Result<(), RespolError> {
        self.request(Command::Connect).await
    }

    /// Ask for the resources.
    pub async fn acquire(&self) -> Result<(), RespolError> {
        self.request(Command::Acquire).await
    }

    /// Give the resources back.
    pub async fn release(&self) -> Result<(), RespolError> {
        self.request(Command::Release).await
    }

    /// Release what is held and close the session.
    pub async fn disconnect(&self) -> Result<(), RespolError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Disconnect(tx))
            .await
            .map_err(|_| RespolError::DriverClosed)?;
        rx.await.map_err(|_| RespolError::DriverClosed)
    }

    /// Current state and grants.
    pub async fn status(&self) -> Result<SetStatus, RespolError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Status(tx))
            .await
            .map_err(|_| RespolError::DriverClosed)?;
        rx.await.map_err(|_| RespolError::DriverClosed)
    }

    /// Stop the driver.
    pub async fn shutdown(&self) -> Result<(), RespolError> {
        self.commands
            .send(Command::Shutdown)
            .await
            .map_err(|_| RespolError::DriverClosed)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use respol_core::EngineConfig;
    use respol_transport::{ArbiterEndpoint, RequestKind, channel};

    use super::*;

    fn player(
        config: EngineConfig,
    ) -> (
        ResourceSet,
        ArbiterEndpoint,
        mpsc::UnboundedReceiver<TransportEvent>,
    ) {
        let (transport, arbiter, inbound) = channel();
        let set = ResourceSet::builder("player")
            .with_config(config)
            .with_resource(ResourceType::AudioPlayback)
            .build(transport)
            .unwrap();
        (set, arbiter, inbound)
    }

    #[tokio::test]
    async fn test_driven_grant() {
        let (set, mut arbiter, inbound) = player(EngineConfig::default());
        let (driver, handle, mut events) = SetDriver::new(set, inbound);
        let task = tokio::spawn(driver.run());

        handle.connect().await.unwrap();
        let register = arbiter.recv().await.unwrap();
        assert_eq!(register.kind, RequestKind::Register);
        arbiter.grant(register.id, vec![]).unwrap();
        assert_eq!(events.recv().await, Some(ResourceEvent::ConnectedToManager));

        handle.acquire().await.unwrap();
        let acquire = arbiter.recv().await.unwrap();
        assert_eq!(acquire.kind, RequestKind::Acquire);
        arbiter
            .grant(acquire.id, vec![ResourceType::AudioPlayback])
            .unwrap();
        assert_eq!(
            events.recv().await,
            Some(ResourceEvent::ResourcesAcquired {
                granted: vec![ResourceType::AudioPlayback]
            })
        );

        let status = handle.status().await.unwrap();
        assert_eq!(status.state, SetState::Connected);
        assert_eq!(status.granted, vec![ResourceType::AudioPlayback]);

        handle.shutdown().await.unwrap();
        let set = task.await.unwrap();
        assert!(set.has_grants());
    }

    #[tokio::test]
    async fn test_registration_deadline() {
        let config = EngineConfig::new().with_register_timeout(Duration::from_millis(20));
        let (set, mut arbiter, inbound) = player(config);
        let (driver, handle, mut events) = SetDriver::new(set, inbound);
        let task = tokio::spawn(driver.run());

        handle.connect().await.unwrap();
        assert!(arbiter.recv().await.is_some());

        let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .unwrap();
        assert!(matches!(event, Some(ResourceEvent::ConnectionFailed { .. })));
        assert_eq!(handle.status().await.unwrap().state, SetState::Disconnected);

        drop(handle);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_arbiter_gone() {
        let (set, mut arbiter, inbound) = player(EngineConfig::default());
        let (driver, handle, mut events) = SetDriver::new(set, inbound);
        let task = tokio::spawn(driver.run());

        handle.connect().await.unwrap();
        let register = arbiter.recv().await.unwrap();
        arbiter.grant(register.id, vec![]).unwrap();
        assert_eq!(events.recv().await, Some(ResourceEvent::ConnectedToManager));

        drop(arbiter);
        assert_eq!(
            events.recv().await,
            Some(ResourceEvent::DisconnectedFromManager)
        );
        assert_eq!(handle.status().await.unwrap().state, SetState::Disconnected);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_long_run_keeps_no_polling_backlog() {
        let (set, mut arbiter, inbound) = player(EngineConfig::default());
        let (driver, handle, mut events) = SetDriver::new(set, inbound);
        let task = tokio::spawn(driver.run());

        handle.connect().await.unwrap();
        let register = arbiter.recv().await.unwrap();
        arbiter.grant(register.id, vec![]).unwrap();
        assert_eq!(events.recv().await, Some(ResourceEvent::ConnectedToManager));

        for _ in 0..150 {
            handle.acquire().await.unwrap();
            let acquire = arbiter.recv().await.unwrap();
            arbiter
                .grant(acquire.id, vec![ResourceType::AudioPlayback])
                .unwrap();
            assert!(matches!(
                events.recv().await,
                Some(ResourceEvent::ResourcesAcquired { .. })
            ));

            handle.release().await.unwrap();
            let release = arbiter.recv().await.unwrap();
            assert_eq!(release.kind, RequestKind::Release);
            arbiter.grant(release.id, vec![]).unwrap();
            assert_eq!(events.recv().await, Some(ResourceEvent::ResourcesReleased));
        }

        handle.shutdown().await.unwrap();
        let set = task.await.unwrap();
        assert!(set.events().is_none());
        assert_eq!(set.poll_event(), None);
        assert_eq!(set.engine().events().subscriber_count(), 1);
    }

    #[tokio::test]
    async fn test_events_before_driving_are_forwarded() {
        let (mut set, _arbiter, inbound) = player(EngineConfig::default());
        set.connect().unwrap();
        set.handle(TransportEvent::Disconnected);
        assert_eq!(set.events().map(|queue| queue.len()), Some(1));

        let (driver, handle, mut events) = SetDriver::new(set, inbound);
        let task = tokio::spawn(driver.run());
        assert_eq!(
            events.recv().await,
            Some(ResourceEvent::DisconnectedFromManager)
        );

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_handle_after_shutdown() {
        let (set, _arbiter, inbound) = player(EngineConfig::default());
        let (driver, handle, _events) = SetDriver::new(set, inbound);
        let task = tokio::spawn(driver.run());

        handle.shutdown().await.unwrap();
        task.await.unwrap();

        assert!(matches!(
            handle.acquire().await,
            Err(RespolError::DriverClosed)
        ));
    }
}
