//! Call state manager: the single source of truth for the active call
//!
//! Owns the one active-call slot, a bounded history of ended sessions and
//! a time-bounded set of ended channels that late signals cannot revive.
//! All mutation goes through the guarded transition operations below; each
//! either completes and emits its [`CallEvent`] before returning, or is a
//! no-op reported through [`AdmitOutcome`] / [`TransitionOutcome`].
//!
//! # Transition Table
//!
//! | From            | Operation             | To       |
//! |-----------------|-----------------------|----------|
//! | (none)          | `create_incoming_call`| incoming |
//! | (none)          | `create_outgoing_call`| outgoing |
//! | incoming        | `answer_call`         | active   |
//! | incoming        | `decline_call`        | ended    |
//! | any non-terminal| `end_call`            | ended    |
//! | any non-terminal| `timeout_call`        | ended    |
//!
//! A failed guard is "nothing to do", not an error: duplicate push and
//! socket deliveries of one call land here and must be absorbed silently.
//!
//! # Usage Examples
//!
//! ```rust
//! use callsync_client_core::call::{CallParams, CallState, Channel, PhoneNumber};
//! use callsync_client_core::state_manager::CallStateManager;
//!
//! let manager = CallStateManager::new(50);
//! let params = CallParams {
//!     channel: Channel::new("call_abc").unwrap(),
//!     caller_phone: PhoneNumber::parse("+491234").unwrap(),
//!     callee_phone: PhoneNumber::parse("+495678").unwrap(),
//!     caller_name: None,
//!     has_video: true,
//! };
//!
//! assert!(manager.create_incoming_call(params.clone()).is_admitted());
//! // The same channel again is absorbed
//! assert!(!manager.create_incoming_call(params).is_admitted());
//!
//! assert!(manager.answer_call().is_transitioned());
//! assert_eq!(manager.active_call().unwrap().call_state, CallState::Active);
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

use parking_lot::{Mutex, ReentrantMutex};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::call::{CallDirection, CallId, CallParams, CallSession, CallState, Channel};
use crate::config::DEFAULT_ENDED_CHANNEL_RETENTION;
use crate::events::{CallEvent, CallEventBus, EndReason, EventStream, SubscriptionId};

/// Why an admission was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Another non-terminal session occupies the slot
    Busy {
        active_call_id: CallId,
        active_channel: Channel,
    },
    /// The channel already reached `ended`; a late or replayed signal
    ChannelEnded { channel: Channel },
}

/// Result of `create_incoming_call` / `create_outgoing_call`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmitOutcome {
    /// New session created and `call:incoming` / `call:outgoing` emitted
    Admitted(CallSession),
    /// A session for this channel already exists; no event emitted
    Duplicate(CallSession),
    /// Signal dropped; no event emitted
    Rejected(RejectReason),
}

impl AdmitOutcome {
    pub fn is_admitted(&self) -> bool {
        matches!(self, AdmitOutcome::Admitted(_))
    }

    /// The admitted or pre-existing session
    pub fn session(&self) -> Option<&CallSession> {
        match self {
            AdmitOutcome::Admitted(s) | AdmitOutcome::Duplicate(s) => Some(s),
            AdmitOutcome::Rejected(_) => None,
        }
    }
}

/// Result of a guarded transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// Transition applied; carries the post-transition snapshot
    Transitioned(CallSession),
    /// Guard failed; `current` is the state of whatever occupies the slot
    InvalidState { current: Option<CallState> },
}

impl TransitionOutcome {
    pub fn is_transitioned(&self) -> bool {
        matches!(self, TransitionOutcome::Transitioned(_))
    }

    pub fn session(&self) -> Option<&CallSession> {
        match self {
            TransitionOutcome::Transitioned(s) => Some(s),
            TransitionOutcome::InvalidState { .. } => None,
        }
    }
}

/// Which session an operation is aimed at
#[derive(Debug, Clone, Copy)]
enum Target<'a> {
    Current,
    Call(&'a CallId),
    Channel(&'a Channel),
}

impl Target<'_> {
    fn matches(&self, session: &CallSession) -> bool {
        match self {
            Target::Current => true,
            Target::Call(id) => &session.call_id == *id,
            Target::Channel(channel) => &session.channel == *channel,
        }
    }
}

#[derive(Default)]
struct Slots {
    active: Option<CallSession>,
    history: VecDeque<CallSession>,
    /// Ended channels in end order; pruned by age, not by `history_limit`
    ended_channels: VecDeque<(Channel, Instant)>,
}

impl Slots {
    fn forget_ended_before(&mut self, cutoff: Instant) {
        while matches!(self.ended_channels.front(), Some((_, ended_at)) if *ended_at < cutoff) {
            self.ended_channels.pop_front();
        }
    }

    fn channel_ended(&self, channel: &Channel) -> bool {
        self.ended_channels.iter().any(|(c, _)| c == channel)
    }
}

/// Owner of the active-call slot
pub struct CallStateManager {
    slots: Mutex<Slots>,
    /// Serialises mutate+emit across threads; re-entrant so a listener
    /// may drive a follow-up transition from inside its callback.
    transition_guard: ReentrantMutex<()>,
    events: CallEventBus,
    history_limit: usize,
    ended_channel_retention: Duration,
}

impl CallStateManager {
    /// Create a manager keeping at most `history_limit` ended sessions
    pub fn new(history_limit: usize) -> Self {
        Self::with_retention(history_limit, DEFAULT_ENDED_CHANNEL_RETENTION)
    }

    /// Like [`new`](Self::new), rejecting signals for an ended channel
    /// for `ended_channel_retention` after it ended
    pub fn with_retention(history_limit: usize, ended_channel_retention: Duration) -> Self {
        Self {
            slots: Mutex::new(Slots::default()),
            transition_guard: ReentrantMutex::new(()),
            events: CallEventBus::default(),
            history_limit: history_limit.max(1),
            ended_channel_retention,
        }
    }

    // ===== TRANSITIONS =====

    /// Admit an incoming call signal.
    ///
    /// Same channel as the active session returns `Duplicate` with that
    /// session; any other active session, or a channel that already ended,
    /// returns `Rejected`. Only `Admitted` emits `call:incoming`.
    pub fn create_incoming_call(&self, params: CallParams) -> AdmitOutcome {
        self.admit(params, CallDirection::Incoming)
    }

    /// Admit a call placed by the local user; emits `call:outgoing`
    pub fn create_outgoing_call(&self, params: CallParams) -> AdmitOutcome {
        self.admit(params, CallDirection::Outgoing)
    }

    /// incoming → active for whatever call is ringing
    pub fn answer_call(&self) -> TransitionOutcome {
        self.answer(Target::Current)
    }

    /// incoming → active, only if `call_id` is the ringing call
    pub fn answer_call_for(&self, call_id: &CallId) -> TransitionOutcome {
        self.answer(Target::Call(call_id))
    }

    /// incoming → ended for whatever call is ringing
    pub fn decline_call(&self) -> TransitionOutcome {
        self.decline(Target::Current)
    }

    /// incoming → ended, only if `call_id` is the ringing call
    pub fn decline_call_for(&self, call_id: &CallId) -> TransitionOutcome {
        self.decline(Target::Call(call_id))
    }

    /// End the active session as a local hangup.
    ///
    /// With no active session this still emits `call:ended` with no
    /// session, so UI listeners can reset to idle unconditionally.
    pub fn end_call(&self) -> TransitionOutcome {
        self.end_call_with_reason(EndReason::LocalHangup)
    }

    /// End the active session with an explicit reason
    pub fn end_call_with_reason(&self, reason: EndReason) -> TransitionOutcome {
        let _guard = self.transition_guard.lock();
        let outcome = self.finish(Target::Current, reason);
        if !outcome.is_transitioned() {
            warn!("No active call to end");
            self.events.emit(&CallEvent::Ended {
                session: None,
                reason,
            });
        }
        outcome
    }

    /// End the active session only if it belongs to `call_id`
    pub fn end_call_for(&self, call_id: &CallId, reason: EndReason) -> TransitionOutcome {
        let _guard = self.transition_guard.lock();
        self.finish(Target::Call(call_id), reason)
    }

    /// End the active session only if it uses `channel`.
    ///
    /// A stale or foreign channel is a silent no-op and never touches an
    /// unrelated call.
    pub fn end_call_by_channel(&self, channel: &Channel, reason: EndReason) -> TransitionOutcome {
        let _guard = self.transition_guard.lock();
        self.finish(Target::Channel(channel), reason)
    }

    /// External timeout trigger for `call_id`; stale timers are no-ops
    pub fn timeout_call(&self, call_id: &CallId) -> TransitionOutcome {
        let _guard = self.transition_guard.lock();
        self.finish(Target::Call(call_id), EndReason::TimedOut)
    }

    /// Clear the active slot during cleanup, archiving what was there
    pub fn reset(&self) {
        let _guard = self.transition_guard.lock();
        let cleared = {
            let mut slots = self.slots.lock();
            slots.active.take().map(|mut session| {
                session.mark_ended();
                self.archive(&mut slots, session.clone());
                session
            })
        };

        if let Some(session) = cleared {
            self.events.emit(&CallEvent::Ended {
                session: Some(session),
                reason: EndReason::Reset,
            });
        }
        info!("CallStateManager: state reset");
    }

    // ===== QUERIES =====

    /// Snapshot of the active (non-terminal) session
    pub fn active_call(&self) -> Option<CallSession> {
        self.slots.lock().active.clone()
    }

    pub fn has_active_call(&self) -> bool {
        self.slots.lock().active.is_some()
    }

    /// The active session, if it uses `channel`
    pub fn call_by_channel(&self, channel: &Channel) -> Option<CallSession> {
        self.slots
            .lock()
            .active
            .as_ref()
            .filter(|s| &s.channel == channel)
            .cloned()
    }

    /// Whether `call_id` is still ringing
    pub fn is_incoming(&self, call_id: &CallId) -> bool {
        self.slots
            .lock()
            .active
            .as_ref()
            .map_or(false, |s| &s.call_id == call_id && s.call_state == CallState::Incoming)
    }

    /// Ended sessions, oldest first
    pub fn call_history(&self) -> Vec<CallSession> {
        self.slots.lock().history.iter().cloned().collect()
    }

    // ===== EVENTS =====

    /// Register a lifecycle listener; see [`CallEventBus::subscribe`]
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&CallEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Async stream of subsequent lifecycle events
    pub fn events(&self) -> EventStream {
        self.events.events()
    }

    /// Unregister every listener
    pub fn dispose(&self) {
        self.events.clear();
        debug!("CallStateManager: all listeners removed");
    }

    // ===== INTERNALS =====

    fn admit(&self, params: CallParams, direction: CallDirection) -> AdmitOutcome {
        let _guard = self.transition_guard.lock();
        let session = {
            let mut slots = self.slots.lock();

            if let Some(active) = slots.active.as_ref() {
                if active.channel == params.channel {
                    info!(
                        channel = %params.channel,
                        call_id = %active.call_id,
                        "Call already exists for channel"
                    );
                    return AdmitOutcome::Duplicate(active.clone());
                }
                info!(
                    channel = %params.channel,
                    active_call_id = %active.call_id,
                    "Dropping call signal while another call is in progress"
                );
                return AdmitOutcome::Rejected(RejectReason::Busy {
                    active_call_id: active.call_id.clone(),
                    active_channel: active.channel.clone(),
                });
            }

            if let Some(cutoff) = Instant::now().checked_sub(self.ended_channel_retention) {
                slots.forget_ended_before(cutoff);
            }
            if slots.channel_ended(&params.channel) {
                info!(channel = %params.channel, "Ignoring signal for an ended channel");
                return AdmitOutcome::Rejected(RejectReason::ChannelEnded {
                    channel: params.channel,
                });
            }

            let session = CallSession::new(params, direction);
            slots.active = Some(session.clone());
            session
        };

        info!(
            call_id = %session.call_id,
            channel = %session.channel,
            state = %session.call_state,
            "Call created"
        );
        let event = match direction {
            CallDirection::Incoming => CallEvent::Incoming(session.clone()),
            CallDirection::Outgoing => CallEvent::Outgoing(session.clone()),
        };
        self.events.emit(&event);
        AdmitOutcome::Admitted(session)
    }

    fn answer(&self, target: Target<'_>) -> TransitionOutcome {
        let _guard = self.transition_guard.lock();
        let snapshot = {
            let mut slots = self.slots.lock();
            match slots.active.as_mut() {
                Some(session)
                    if session.call_state == CallState::Incoming && target.matches(session) =>
                {
                    session.call_state = CallState::Active;
                    session.clone()
                }
                other => {
                    warn!("No incoming call to answer");
                    return TransitionOutcome::InvalidState {
                        current: other.map(|s| s.call_state),
                    };
                }
            }
        };

        info!(call_id = %snapshot.call_id, "Call answered");
        self.events.emit(&CallEvent::Answered(snapshot.clone()));
        TransitionOutcome::Transitioned(snapshot)
    }

    fn decline(&self, target: Target<'_>) -> TransitionOutcome {
        let _guard = self.transition_guard.lock();
        let snapshot = {
            let mut slots = self.slots.lock();
            let ringing = slots
                .active
                .as_ref()
                .map_or(false, |s| s.call_state == CallState::Incoming && target.matches(s));
            if !ringing {
                warn!("No incoming call to decline");
                return TransitionOutcome::InvalidState {
                    current: slots.active.as_ref().map(|s| s.call_state),
                };
            }
            let Some(mut session) = slots.active.take() else {
                return TransitionOutcome::InvalidState { current: None };
            };
            session.mark_ended();
            self.archive(&mut slots, session.clone());
            session
        };

        info!(call_id = %snapshot.call_id, "Call declined");
        self.events.emit(&CallEvent::Declined(snapshot.clone()));
        TransitionOutcome::Transitioned(snapshot)
    }

    /// Move the targeted session to `ended`. Caller holds the transition guard.
    fn finish(&self, target: Target<'_>, reason: EndReason) -> TransitionOutcome {
        let snapshot = {
            let mut slots = self.slots.lock();
            let matches = slots.active.as_ref().map_or(false, |s| target.matches(s));
            if !matches {
                debug!(?reason, "No matching call to end");
                return TransitionOutcome::InvalidState {
                    current: slots.active.as_ref().map(|s| s.call_state),
                };
            }
            let Some(mut session) = slots.active.take() else {
                return TransitionOutcome::InvalidState { current: None };
            };
            session.mark_ended();
            self.archive(&mut slots, session.clone());
            session
        };

        info!(call_id = %snapshot.call_id, ?reason, "Call ended");
        self.events.emit(&CallEvent::Ended {
            session: Some(snapshot.clone()),
            reason,
        });
        TransitionOutcome::Transitioned(snapshot)
    }

    fn archive(&self, slots: &mut Slots, session: CallSession) {
        slots.ended_channels.push_back((session.channel.clone(), Instant::now()));
        slots.history.push_back(session);
        while slots.history.len() > self.history_limit {
            slots.history.pop_front();
        }
    }
}

impl Default for CallStateManager {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_HISTORY_LIMIT)
    }
}

impl fmt::Debug for CallStateManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.slots.lock();
        f.debug_struct("CallStateManager")
            .field("active", &slots.active.as_ref().map(|s| &s.call_id))
            .field("history", &slots.history.len())
            .field("ended_channels", &slots.ended_channels.len())
            .field("events", &self.events)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::PhoneNumber;
    use std::sync::Arc;

    fn params(channel: &str) -> CallParams {
        CallParams {
            channel: Channel::new(channel).unwrap(),
            caller_phone: PhoneNumber::parse("+491234").unwrap(),
            callee_phone: PhoneNumber::parse("+495678").unwrap(),
            caller_name: None,
            has_video: true,
        }
    }

    fn recorder(manager: &CallStateManager) -> Arc<Mutex<Vec<CallEvent>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        manager.subscribe(move |event| sink.lock().push(event.clone()));
        seen
    }

    #[test]
    fn test_answer_incoming_call() {
        let manager = CallStateManager::new(10);
        let seen = recorder(&manager);

        let admitted = manager.create_incoming_call(params("call_abc"));
        let call_id = admitted.session().unwrap().call_id.clone();
        assert_eq!(manager.active_call().unwrap().call_state, CallState::Incoming);

        let outcome = manager.answer_call();
        assert!(outcome.is_transitioned());
        assert_eq!(manager.active_call().unwrap().call_state, CallState::Active);

        let events = seen.lock();
        let answered: Vec<_> = events
            .iter()
            .filter(|e| matches!(e, CallEvent::Answered(_)))
            .collect();
        assert_eq!(answered.len(), 1);
        assert_eq!(answered[0].session().unwrap().call_id, call_id);
    }

    #[test]
    fn test_single_active_call() {
        let manager = CallStateManager::new(10);
        assert!(manager.create_incoming_call(params("call_1")).is_admitted());

        for channel in ["call_2", "call_3", "call_4"] {
            match manager.create_incoming_call(params(channel)) {
                AdmitOutcome::Rejected(RejectReason::Busy { active_channel, .. }) => {
                    assert_eq!(active_channel.as_str(), "call_1");
                }
                other => panic!("expected busy rejection, got {:?}", other),
            }
        }

        // Active (answered) calls block admission too
        manager.answer_call();
        assert!(!manager.create_incoming_call(params("call_5")).is_admitted());

        manager.end_call();
        assert!(manager.create_incoming_call(params("call_6")).is_admitted());
    }

    #[test]
    fn test_duplicate_channel_is_idempotent() {
        let manager = CallStateManager::new(10);
        let seen = recorder(&manager);

        let first = manager.create_incoming_call(params("call_xyz"));
        let second = manager.create_incoming_call(params("call_xyz"));

        assert!(first.is_admitted());
        assert!(matches!(second, AdmitOutcome::Duplicate(_)));
        assert_eq!(first.session(), second.session());
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_no_resurrection_after_decline() {
        let manager = CallStateManager::new(10);
        let seen = recorder(&manager);

        manager.create_incoming_call(params("call_abc"));
        assert!(manager.decline_call().is_transitioned());
        assert!(manager.active_call().is_none());

        assert_eq!(
            manager.answer_call(),
            TransitionOutcome::InvalidState { current: None }
        );
        assert!(!manager.decline_call().is_transitioned());

        let events = seen.lock();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], CallEvent::Declined(_)));
    }

    #[test]
    fn test_ended_channel_is_not_revived() {
        let manager = CallStateManager::new(10);
        manager.create_incoming_call(params("call_abc"));
        manager.end_call_with_reason(EndReason::RemoteHangup);

        assert_eq!(
            manager.create_incoming_call(params("call_abc")),
            AdmitOutcome::Rejected(RejectReason::ChannelEnded {
                channel: Channel::new("call_abc").unwrap()
            })
        );
    }

    #[test]
    fn test_end_call_without_session_emits_idle_event() {
        let manager = CallStateManager::new(10);
        let seen = recorder(&manager);

        assert!(!manager.end_call().is_transitioned());
        assert_eq!(
            *seen.lock(),
            vec![CallEvent::Ended {
                session: None,
                reason: EndReason::LocalHangup
            }]
        );
    }

    #[test]
    fn test_foreign_channel_does_not_end_call() {
        let manager = CallStateManager::new(10);
        let seen = recorder(&manager);
        manager.create_incoming_call(params("call_1"));

        let outcome =
            manager.end_call_by_channel(&Channel::new("call_2").unwrap(), EndReason::RemoteHangup);
        assert_eq!(
            outcome,
            TransitionOutcome::InvalidState {
                current: Some(CallState::Incoming)
            }
        );
        assert_eq!(manager.active_call().unwrap().call_state, CallState::Incoming);
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_guarded_by_call_id() {
        let manager = CallStateManager::new(10);
        manager.create_incoming_call(params("call_1"));
        let stale = CallId::from_string("call_0_stale");

        assert!(!manager.answer_call_for(&stale).is_transitioned());
        assert!(!manager.decline_call_for(&stale).is_transitioned());
        assert!(!manager.timeout_call(&stale).is_transitioned());
        assert!(manager.has_active_call());

        let current = manager.active_call().unwrap().call_id;
        let outcome = manager.timeout_call(&current);
        assert!(outcome.is_transitioned());
        assert_eq!(outcome.session().unwrap().call_state, CallState::Ended);
    }

    #[test]
    fn test_history_is_bounded() {
        let manager = CallStateManager::new(2);
        for channel in ["call_1", "call_2", "call_3"] {
            manager.create_incoming_call(params(channel));
            manager.decline_call();
        }

        let history = manager.call_history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].channel.as_str(), "call_2");
        assert!(history.iter().all(|s| s.end_time.is_some()));
    }

    #[test]
    fn test_late_subscriber_misses_earlier_transitions() {
        let manager = CallStateManager::new(10);
        manager.create_incoming_call(params("call_1"));

        let seen = recorder(&manager);
        assert!(seen.lock().is_empty());

        manager.answer_call();
        let events = seen.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].session().unwrap().call_state, CallState::Active);
    }

    #[test]
    fn test_listener_may_transition_reentrantly() {
        let manager = Arc::new(CallStateManager::new(10));
        let inner = Arc::downgrade(&manager);
        manager.subscribe(move |event| {
            if let (CallEvent::Answered(_), Some(manager)) = (event, inner.upgrade()) {
                manager.end_call();
            }
        });

        manager.create_incoming_call(params("call_1"));
        manager.answer_call();
        assert!(manager.active_call().is_none());
        assert_eq!(manager.call_history().len(), 1);
    }

    #[test]
    fn test_outgoing_call_lifecycle() {
        let manager = CallStateManager::new(10);
        let seen = recorder(&manager);

        let outcome = manager.create_outgoing_call(params("call_out"));
        assert_eq!(outcome.session().unwrap().call_state, CallState::Outgoing);
        // Outgoing calls cannot be answered or declined locally
        assert!(!manager.answer_call().is_transitioned());
        assert!(!manager.decline_call().is_transitioned());

        assert!(manager.end_call().is_transitioned());
        let names: Vec<_> = seen.lock().iter().map(|e| e.name()).collect();
        assert_eq!(names, vec!["call:outgoing", "call:ended"]);
    }

    #[test]
    fn test_reset_archives_active_call() {
        let manager = CallStateManager::new(10);
        let seen = recorder(&manager);

        manager.reset();
        assert!(seen.lock().is_empty());

        manager.create_incoming_call(params("call_1"));
        manager.reset();
        assert!(!manager.has_active_call());
        assert!(matches!(
            seen.lock().last(),
            Some(CallEvent::Ended {
                reason: EndReason::Reset,
                ..
            })
        ));
    }
}
