//! Call lifecycle events
//!
//! Every successful transition in the
//! [`CallStateManager`](crate::state_manager::CallStateManager) emits exactly
//! one [`CallEvent`]. Delivery is synchronous and in registration order:
//! each subscriber has returned before the transition call returns, and a
//! subscriber only ever sees the snapshot that triggered it.
//!
//! Async consumers that do not need the synchronous guarantee can take an
//! [`EventStream`] instead; it is fed after all direct subscribers ran.
//!
//! # Event Subscription
//!
//! ```rust
//! use callsync_client_core::events::{CallEventBus, CallEvent};
//!
//! let bus = CallEventBus::new(16);
//! let id = bus.subscribe(|event: &CallEvent| {
//!     println!("{}", event.name());
//! });
//! assert_eq!(bus.subscriber_count(), 1);
//! assert!(bus.unsubscribe(id));
//! ```

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use crate::call::CallSession;

/// Stream of lifecycle events for async consumers
pub type EventStream = BroadcastStream<CallEvent>;

/// Why a session reached `ended`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// The local user hung up
    LocalHangup,
    /// The peer hung up or cancelled before answer
    RemoteHangup,
    /// External timeout trigger (unanswered ring)
    TimedOut,
    /// State was cleared during cleanup
    Reset,
}

/// Lifecycle event carrying the post-transition snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallEvent {
    /// `call:incoming`: a session was admitted
    Incoming(CallSession),
    /// `call:outgoing`: the local user placed a call
    Outgoing(CallSession),
    /// `call:answered`: incoming → active
    Answered(CallSession),
    /// `call:declined`: incoming → ended by the local user
    Declined(CallSession),
    /// `call:ended`: any terminal transition other than a decline.
    ///
    /// `session` is `None` when `end_call` ran with nothing active, so UI
    /// listeners can reset to idle unconditionally.
    Ended {
        session: Option<CallSession>,
        reason: EndReason,
    },
}

impl CallEvent {
    /// Wire-style event name
    pub fn name(&self) -> &'static str {
        match self {
            CallEvent::Incoming(_) => "call:incoming",
            CallEvent::Outgoing(_) => "call:outgoing",
            CallEvent::Answered(_) => "call:answered",
            CallEvent::Declined(_) => "call:declined",
            CallEvent::Ended { .. } => "call:ended",
        }
    }

    pub fn session(&self) -> Option<&CallSession> {
        match self {
            CallEvent::Incoming(s)
            | CallEvent::Outgoing(s)
            | CallEvent::Answered(s)
            | CallEvent::Declined(s) => Some(s),
            CallEvent::Ended { session, .. } => session.as_ref(),
        }
    }

    /// Whether ringing must stop in response to this event
    pub fn stops_ringing(&self) -> bool {
        matches!(
            self,
            CallEvent::Answered(_) | CallEvent::Declined(_) | CallEvent::Ended { .. }
        )
    }
}

impl fmt::Display for CallEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.session() {
            Some(session) => write!(f, "{} ({})", self.name(), session.call_id),
            None => f.write_str(self.name()),
        }
    }
}

/// Handle returned by [`CallEventBus::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

type Listener = Arc<dyn Fn(&CallEvent) + Send + Sync>;

/// Ordered, synchronous fan-out of [`CallEvent`]s
pub struct CallEventBus {
    subscribers: RwLock<Vec<(SubscriptionId, Listener)>>,
    stream_tx: broadcast::Sender<CallEvent>,
}

impl CallEventBus {
    /// Create a bus; `stream_capacity` bounds each [`EventStream`]'s backlog
    pub fn new(stream_capacity: usize) -> Self {
        let (stream_tx, _) = broadcast::channel(stream_capacity.max(1));
        Self {
            subscribers: RwLock::new(Vec::new()),
            stream_tx,
        }
    }

    /// Register a listener; it receives events for transitions that
    /// complete after this call, never earlier ones.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&CallEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(Uuid::new_v4());
        self.subscribers.write().push((id, Arc::new(listener)));
        id
    }

    /// Remove a listener; returns false if it was not registered
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(sub_id, _)| *sub_id != id);
        subscribers.len() != before
    }

    /// Drop every listener
    pub fn clear(&self) {
        self.subscribers.write().clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Async stream of subsequent events
    pub fn events(&self) -> EventStream {
        BroadcastStream::new(self.stream_tx.subscribe())
    }

    /// Deliver `event` to every listener in registration order.
    ///
    /// The listener list is snapshotted first, so listeners may subscribe,
    /// unsubscribe or trigger further transitions without deadlocking.
    pub(crate) fn emit(&self, event: &CallEvent) {
        let listeners: Vec<Listener> = self
            .subscribers
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        tracing::debug!(event = event.name(), listeners = listeners.len(), "Emitting call event");
        for listener in listeners {
            listener(event);
        }

        // No receivers is fine
        let _ = self.stream_tx.send(event.clone());
    }
}

impl Default for CallEventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

impl fmt::Debug for CallEventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallEventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use tokio_stream::StreamExt;

    fn ended() -> CallEvent {
        CallEvent::Ended {
            session: None,
            reason: EndReason::LocalHangup,
        }
    }

    #[test]
    fn test_emit_in_registration_order() {
        let bus = CallEventBus::new(4);
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let order = order.clone();
            bus.subscribe(move |_| order.lock().push(i));
        }

        bus.emit(&ended());
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_unsubscribe_stops_delivery() {
        let bus = CallEventBus::new(4);
        let hits = Arc::new(Mutex::new(0));

        let counter = hits.clone();
        let id = bus.subscribe(move |_| *counter.lock() += 1);

        bus.emit(&ended());
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.emit(&ended());

        assert_eq!(*hits.lock(), 1);
    }

    #[test]
    fn test_listener_may_subscribe_during_emit() {
        let bus = Arc::new(CallEventBus::new(4));
        let inner = bus.clone();
        bus.subscribe(move |_| {
            inner.subscribe(|_| {});
        });

        bus.emit(&ended());
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_event_stream_receives_after_subscribers() {
        let bus = CallEventBus::new(4);
        let mut stream = bus.events();

        bus.emit(&ended());

        let event = stream.next().await.unwrap().unwrap();
        assert_eq!(event.name(), "call:ended");
        assert!(event.session().is_none());
        assert!(event.stops_ringing());
    }
}
