//! respol Observability
//!
//! This crate provides what applications observe about a resource set:
//!
//! - [`ResourceEvent`]: lifecycle notifications (acquired, denied, lost, ...)
//! - [`EventDispatcher`] and [`EventSubscriber`]: observer-style delivery
//! - [`EventQueue`]: a bounded queue for applications that poll
//! - [`MetricsCollector`]: protocol counters with a serde snapshot
//!
//! # Event Subscription
//!
//! ```
//! use std::sync::Arc;
//! use respol_observe::{EventDispatcher, EventQueue, EventSubscriber, ResourceEvent};
//!
//! let dispatcher = EventDispatcher::new();
//! let queue = Arc::new(EventQueue::default());
//! dispatcher.subscribe(Arc::clone(&queue) as Arc<dyn EventSubscriber>);
//!
//! dispatcher.emit(ResourceEvent::ConnectedToManager);
//! assert_eq!(queue.pop(), Some(ResourceEvent::ConnectedToManager));
//! ```

pub mod events;
pub mod metrics;

// Re-export main types
pub use events::{EventDispatcher, EventQueue, EventSubscriber, LoggingSubscriber, ResourceEvent};
pub use metrics::{
    MetricsCollector, MetricsSnapshot, OutcomeMetrics, RequestMetrics, SessionMetrics,
};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::events::{EventDispatcher, EventQueue, EventSubscriber, ResourceEvent};
    pub use crate::metrics::{MetricsCollector, MetricsSnapshot};
}
