//! Event Bus implementation.
//!
//! One bus is owned by each plot session. Observers either register a
//! synchronous handler or take a broadcast receiver for async polling.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::events::{EventCategory, PlotEvent};

/// Subscription handle for unsubscribing from events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Sub({})", &self.0.to_string()[..8])
    }
}

/// Filter to receive only specific event types
#[derive(Debug, Clone, Default)]
pub enum EventFilter {
    /// Receive all events.
    #[default]
    All,
    /// Receive events matching any of these categories.
    Categories(Vec<EventCategory>),
}

impl EventFilter {
    /// Check if an event matches this filter
    pub fn matches(&self, event: &PlotEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Categories(categories) => categories.contains(&event.category()),
        }
    }
}

/// Observer callback. A returned error is logged and otherwise ignored.
type EventHandler = Box<dyn Fn(PlotEvent) -> anyhow::Result<()> + Send + Sync>;

/// Configuration for the event bus
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Events a broadcast receiver may fall behind by before it lags.
    pub channel_capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
        }
    }
}

/// Error types for event bus operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum EventBusError {
    /// A receiver fell behind and missed events
    #[error("Event receiver lagged, {0} events dropped")]
    Lagged(u64),
    /// Channel is closed
    #[error("Event channel is closed")]
    ChannelClosed,
}

impl From<broadcast::error::RecvError> for EventBusError {
    fn from(e: broadcast::error::RecvError) -> Self {
        match e {
            broadcast::error::RecvError::Lagged(n) => EventBusError::Lagged(n),
            broadcast::error::RecvError::Closed => EventBusError::ChannelClosed,
        }
    }
}

/// Fan-out of session notifications to any number of observers
pub struct EventBus {
    sender: broadcast::Sender<PlotEvent>,
    handlers: Arc<RwLock<HashMap<SubscriptionId, (EventFilter, EventHandler)>>>,
}

impl EventBus {
    /// Create a new event bus with default configuration
    pub fn new() -> Self {
        Self::with_config(EventBusConfig::default())
    }

    /// Create a new event bus with custom configuration
    pub fn with_config(config: EventBusConfig) -> Self {
        let (sender, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            sender,
            handlers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Publish an event to all subscribers
    ///
    /// Never fails and never blocks: handler errors are logged and
    /// swallowed, and having no broadcast receivers is normal. Returns the
    /// number of handlers and receivers the event was offered to.
    pub fn publish(&self, event: PlotEvent) -> usize {
        tracing::debug!("Event: {}", event.description());

        let mut delivered = 0;
        {
            let handlers = self.handlers.read();
            for (id, (filter, handler)) in handlers.iter() {
                if filter.matches(&event) {
                    delivered += 1;
                    if let Err(e) = handler(event.clone()) {
                        tracing::warn!("Observer {} failed on {}: {}", id, event.description(), e);
                    }
                }
            }
        }

        delivered + self.sender.send(event).unwrap_or(0)
    }

    /// Deliver an event to a single subscription only.
    ///
    /// Used to replay current state to an observer that just registered.
    pub fn publish_to(&self, id: SubscriptionId, event: PlotEvent) -> bool {
        let handlers = self.handlers.read();
        match handlers.get(&id) {
            Some((filter, handler)) if filter.matches(&event) => {
                if let Err(e) = handler(event.clone()) {
                    tracing::warn!("Observer {} failed on {}: {}", id, event.description(), e);
                }
                true
            }
            _ => false,
        }
    }

    /// Subscribe to events with a synchronous handler
    ///
    /// The handler is called on the publishing task, so it should return
    /// quickly.
    pub fn subscribe<F>(&self, filter: EventFilter, handler: F) -> SubscriptionId
    where
        F: Fn(PlotEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = SubscriptionId::new();
        let mut handlers = self.handlers.write();
        handlers.insert(id, (filter, Box::new(handler)));
        tracing::debug!("Subscription {} added", id);
        id
    }

    /// Get a receiver for async event polling
    pub fn receiver(&self) -> broadcast::Receiver<PlotEvent> {
        self.sender.subscribe()
    }

    /// Unsubscribe from events
    ///
    /// Returns true if the subscription was found and removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write();
        let removed = handlers.remove(&id).is_some();
        if removed {
            tracing::debug!("Subscription {} removed", id);
        }
        removed
    }

    /// Get the number of registered handlers
    pub fn subscriber_count(&self) -> usize {
        self.handlers.read().len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .field("receivers", &self.sender.receiver_count())
            .finish()
    }
}
