//! Session orchestration
//!
//! [`CallOrchestrator`] is the glue owned by the host application's session
//! object. It binds the realtime transport, push payloads and native call
//! actions to the notification service and state manager, drives
//! navigation from lifecycle events, and tells the peer when the local
//! user ends or declines a call.
//!
//! # Wiring
//!
//! ```text
//!  socket ─▶ handle_transport_event ─┐
//!  push   ─▶ handle_push_payload ────┼─▶ CallNotificationService ─▶ CallStateManager
//!  OS call screen ─▶ native callbacks┘                                   │ events
//!                                                                        ▼
//!                                       CallNavigator  ◀── navigation listener
//!  socket ◀── callEnded / callRequest / register
//! ```
//!
//! # Usage Examples
//!
//! ```rust,no_run
//! use callsync_client_core::builder::CallCoreBuilder;
//! use callsync_client_core::mock::{RecordingNavigator, RecordingPresenter, RecordingTransport, RecordingVibrator};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let orchestrator = CallCoreBuilder::new()
//!     .user_phone("+495678")
//!     .presenter(Arc::new(RecordingPresenter::new()))
//!     .vibrator(Arc::new(RecordingVibrator::new()))
//!     .transport(Arc::new(RecordingTransport::connected()))
//!     .navigator(Arc::new(RecordingNavigator::new()))
//!     .build()?;
//!
//! orchestrator.start().await?;
//! let session = orchestrator.start_video_call("+491234")?;
//! println!("calling on {}", session.channel);
//! orchestrator.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::call::{CallId, CallParams, CallSession, CallState, Channel, PhoneNumber};
use crate::error::{CallError, CallResult, TransportError};
use crate::events::{CallEvent, EndReason, SubscriptionId};
use crate::notification::{CallNotificationService, IngestOutcome, NotificationResponse, ResponseOutcome};
use crate::platform::PlatformCallAdapter;
use crate::signal::{IncomingCallSignal, SignalSource};
use crate::state_manager::{AdmitOutcome, CallStateManager, RejectReason, TransitionOutcome};
use crate::transport::{OutboundMessage, RealtimeTransport, TransportEvent};

/// Parameters for the call screen
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallScreenRoute {
    pub channel: Channel,
    pub user_phone: PhoneNumber,
    pub target_phone: PhoneNumber,
    pub has_video: bool,
}

impl CallScreenRoute {
    fn for_session(session: &CallSession, user_phone: &PhoneNumber) -> Self {
        Self {
            channel: session.channel.clone(),
            user_phone: user_phone.clone(),
            target_phone: session.peer_of(user_phone).clone(),
            has_video: session.has_video,
        }
    }
}

/// Host application navigation
pub trait CallNavigator: Send + Sync {
    /// Show the in-app incoming call UI
    fn show_incoming_call(&self, session: &CallSession);

    /// Open the media call screen
    fn open_call_screen(&self, route: &CallScreenRoute);

    /// Return to the idle (no call) view
    fn show_idle(&self);
}

/// Call-session glue owned by the application session
pub struct CallOrchestrator {
    user_phone: PhoneNumber,
    state_manager: Arc<CallStateManager>,
    platform: Arc<PlatformCallAdapter>,
    notifications: Arc<CallNotificationService>,
    transport: Arc<dyn RealtimeTransport>,
    navigator: Arc<dyn CallNavigator>,
    connected: AtomicBool,
    subscription: Mutex<Option<SubscriptionId>>,
}

impl CallOrchestrator {
    pub fn new(
        user_phone: PhoneNumber,
        state_manager: Arc<CallStateManager>,
        platform: Arc<PlatformCallAdapter>,
        notifications: Arc<CallNotificationService>,
        transport: Arc<dyn RealtimeTransport>,
        navigator: Arc<dyn CallNavigator>,
    ) -> Self {
        Self {
            user_phone,
            state_manager,
            platform,
            notifications,
            transport,
            navigator,
            connected: AtomicBool::new(false),
            subscription: Mutex::new(None),
        }
    }

    /// Initialise the components and wire every listener.
    ///
    /// Native and notification setup are best-effort. A failed `register`
    /// is returned after everything else is wired. Calling `start` on a
    /// started orchestrator does nothing.
    pub async fn start(self: &Arc<Self>) -> CallResult<()> {
        if self.subscription.lock().is_some() {
            return Ok(());
        }
        info!(user = %self.user_phone, "CallOrchestrator: starting");

        self.notifications.set_local_user(Some(self.user_phone.clone()));

        let registered = if self.transport.is_connected() {
            self.connected.store(true, Ordering::SeqCst);
            self.register()
        } else {
            Ok(())
        };

        let native_ready = self.platform.initialize().await;
        let notifications_ready = self.notifications.initialize().await;
        if !notifications_ready {
            warn!("Notification fallback unavailable; calls may ring silently");
        }

        self.wire_native_callbacks();
        self.subscribe_navigation();

        info!(native_ready, notifications_ready, "CallOrchestrator: started");
        registered
    }

    fn register(&self) -> CallResult<()> {
        self.transport
            .emit(OutboundMessage::Register {
                user_phone: self.user_phone.clone(),
            })
            .map_err(CallError::from)
    }

    fn wire_native_callbacks(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.platform.set_on_answer_call_callback(move |call_id| {
            let weak = Weak::clone(&weak);
            async move {
                if let Some(orchestrator) = weak.upgrade() {
                    orchestrator.on_native_answer(call_id).await;
                }
            }
        });

        let weak = Arc::downgrade(self);
        self.platform.set_on_end_call_callback(move |call_id| {
            let weak = Weak::clone(&weak);
            async move {
                if let Some(orchestrator) = weak.upgrade() {
                    orchestrator.on_native_end(call_id).await;
                }
            }
        });

        let weak = Arc::downgrade(self);
        self.platform.set_on_reject_call_callback(move |call_id| {
            let weak = Weak::clone(&weak);
            async move {
                if let Some(orchestrator) = weak.upgrade() {
                    orchestrator.on_native_reject(call_id).await;
                }
            }
        });
    }

    fn subscribe_navigation(&self) {
        let navigator = Arc::clone(&self.navigator);
        let user_phone = self.user_phone.clone();
        let id = self.state_manager.subscribe(move |event| match event {
            CallEvent::Incoming(session) => navigator.show_incoming_call(session),
            CallEvent::Answered(session) => {
                navigator.open_call_screen(&CallScreenRoute::for_session(session, &user_phone))
            }
            CallEvent::Outgoing(_) => {}
            CallEvent::Declined(_) | CallEvent::Ended { .. } => navigator.show_idle(),
        });
        *self.subscription.lock() = Some(id);
    }

    async fn on_native_answer(&self, call_id: CallId) {
        let outcome = self.notifications.answer_call_for(&call_id).await;
        if !outcome.is_transitioned() {
            debug!(%call_id, "Native answer for a call that is not ringing");
        }
    }

    /// The OS end button also dismisses a ringing call
    async fn on_native_end(&self, call_id: CallId) {
        let Some(session) = self
            .state_manager
            .active_call()
            .filter(|s| s.call_id == call_id)
        else {
            debug!(%call_id, "Native end for a call that is not active");
            return;
        };

        let outcome = if session.call_state == CallState::Incoming {
            self.notifications.decline_call_for(&call_id).await
        } else {
            self.state_manager.end_call_for(&call_id, EndReason::LocalHangup)
        };
        if outcome.is_transitioned() {
            self.notify_peer(&session);
        }
    }

    async fn on_native_reject(&self, call_id: CallId) {
        let session = self.state_manager.active_call();
        let outcome = self.notifications.decline_call_for(&call_id).await;
        if let (true, Some(session)) = (outcome.is_transitioned(), session) {
            self.notify_peer(&session);
        }
    }

    /// Feed one decoded socket event in.
    ///
    /// Call signals received while the transport is marked disconnected
    /// are dropped; a reconnect re-registers before anything else.
    pub async fn handle_transport_event(&self, event: TransportEvent) -> CallResult<()> {
        match event {
            TransportEvent::Connected => {
                info!("Realtime transport connected");
                self.connected.store(true, Ordering::SeqCst);
                self.register()
            }
            TransportEvent::Disconnected { reason } => {
                info!(reason = ?reason, "Realtime transport disconnected");
                self.connected.store(false, Ordering::SeqCst);
                Ok(())
            }
            TransportEvent::IncomingCall {
                from,
                channel,
                caller_name,
            } => {
                if !self.is_connected() {
                    debug!(%channel, "Dropping incomingCall received while disconnected");
                    return Ok(());
                }
                let mut signal = IncomingCallSignal::new(from, self.user_phone.as_str(), channel)
                    .with_source(SignalSource::Socket);
                if let Some(name) = caller_name {
                    signal = signal.with_caller_name(name);
                }
                let outcome = self.notifications.handle_incoming_call(signal).await?;
                log_ingest(&outcome);
                Ok(())
            }
            TransportEvent::CallEnded { channel } => {
                let channel = Channel::new(channel)?;
                self.notifications.end_call_by_channel(&channel);
                Ok(())
            }
        }
    }

    /// Decode and handle a named socket event; unknown names are ignored
    pub async fn handle_wire_event(&self, name: &str, payload: Value) -> CallResult<()> {
        match TransportEvent::from_wire(name, payload) {
            Ok(event) => self.handle_transport_event(event).await,
            Err(CallError::Transport(TransportError::UnknownEvent { name })) => {
                debug!(event = %name, "Ignoring socket event");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Route a push or VoIP push payload into the ingestion funnel.
    ///
    /// `Ok(None)` means the payload was not a call signal.
    pub async fn handle_push_payload(
        &self,
        payload: &Value,
        source: SignalSource,
    ) -> CallResult<Option<IngestOutcome>> {
        let Some(signal) = IncomingCallSignal::from_payload(payload, source)? else {
            debug!(%source, "Push payload is not a call signal");
            return Ok(None);
        };
        let outcome = self.notifications.handle_incoming_call(signal).await?;
        log_ingest(&outcome);
        Ok(Some(outcome))
    }

    /// Handle a notification tap or action button
    pub async fn handle_notification_response(&self, response: &NotificationResponse) -> ResponseOutcome {
        let outcome = self.notifications.handle_notification_response(response).await;
        match &outcome {
            ResponseOutcome::ShowCallScreen(Some(session)) => self.navigator.show_incoming_call(session),
            ResponseOutcome::Declined(TransitionOutcome::Transitioned(session)) => self.notify_peer(session),
            _ => {}
        }
        outcome
    }

    /// Place a video call to `callee`.
    ///
    /// Admits an outgoing session, sends `callRequest` and opens the call
    /// screen. Fails if another call is in progress or the request cannot
    /// be sent.
    pub fn start_video_call(&self, callee: &str) -> CallResult<CallSession> {
        let callee = PhoneNumber::parse(callee)?;
        let channel = Channel::generate(&self.user_phone, &callee);

        let session = match self.state_manager.create_outgoing_call(CallParams {
            channel,
            caller_phone: self.user_phone.clone(),
            callee_phone: callee.clone(),
            caller_name: None,
            has_video: true,
        }) {
            AdmitOutcome::Admitted(session) => session,
            AdmitOutcome::Duplicate(existing) => {
                return Err(CallError::CallInProgress {
                    channel: existing.channel.to_string(),
                });
            }
            AdmitOutcome::Rejected(RejectReason::Busy { active_channel, .. }) => {
                warn!(%active_channel, "Cannot place a call while another is in progress");
                return Err(CallError::CallInProgress {
                    channel: active_channel.to_string(),
                });
            }
            AdmitOutcome::Rejected(RejectReason::ChannelEnded { channel }) => {
                return Err(CallError::internal(format!(
                    "generated channel {} was already used",
                    channel
                )));
            }
        };

        let request = OutboundMessage::CallRequest {
            from: self.user_phone.clone(),
            to: callee,
            channel: session.channel.to_string(),
        };
        if let Err(e) = self.transport.emit(request) {
            error!(channel = %session.channel, error = %e, "Failed to send call request");
            self.state_manager
                .end_call_for(&session.call_id, EndReason::LocalHangup);
            return Err(e.into());
        }

        info!(call_id = %session.call_id, channel = %session.channel, "Outgoing call requested");
        self.navigator
            .open_call_screen(&CallScreenRoute::for_session(&session, &self.user_phone));
        Ok(session)
    }

    /// Answer the ringing call
    pub async fn answer_call(&self) -> TransitionOutcome {
        self.notifications.answer_call().await
    }

    /// Decline the ringing call and tell the caller
    pub async fn decline_call(&self) -> TransitionOutcome {
        let outcome = self.notifications.decline_call().await;
        if let TransitionOutcome::Transitioned(session) = &outcome {
            self.notify_peer(session);
        }
        outcome
    }

    /// Hang up and tell the peer; with no call this only resets the UI
    pub fn end_call(&self) -> TransitionOutcome {
        if let Some(session) = self.state_manager.active_call() {
            self.notify_peer(&session);
        }
        self.state_manager.end_call()
    }

    fn notify_peer(&self, session: &CallSession) {
        let message = OutboundMessage::CallEnded {
            from: self.user_phone.clone(),
            to: session.peer_of(&self.user_phone).clone(),
            channel: session.channel.to_string(),
        };
        if let Err(e) = self.transport.emit(message) {
            warn!(channel = %session.channel, error = %e, "Failed to notify peer of call end");
        }
    }

    pub fn active_call(&self) -> Option<CallSession> {
        self.state_manager.active_call()
    }

    pub fn has_active_call(&self) -> bool {
        self.state_manager.has_active_call()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn user_phone(&self) -> &PhoneNumber {
        &self.user_phone
    }

    pub fn state_manager(&self) -> &Arc<CallStateManager> {
        &self.state_manager
    }

    pub fn notifications(&self) -> &Arc<CallNotificationService> {
        &self.notifications
    }

    pub fn platform(&self) -> &Arc<PlatformCallAdapter> {
        &self.platform
    }

    /// Tear everything down and unregister all listeners
    pub async fn shutdown(&self) {
        if let Some(id) = self.subscription.lock().take() {
            self.state_manager.unsubscribe(id);
        }
        self.notifications.cleanup().await;
        self.platform.cleanup();
        self.state_manager.dispose();
        info!("CallOrchestrator: shut down");
    }
}

impl fmt::Debug for CallOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallOrchestrator")
            .field("user_phone", &self.user_phone)
            .field("connected", &self.is_connected())
            .field("state_manager", &self.state_manager)
            .finish()
    }
}

fn log_ingest(outcome: &IngestOutcome) {
    match outcome {
        IngestOutcome::Duplicate(session) => {
            debug!(channel = %session.channel, "Duplicate call signal absorbed")
        }
        IngestOutcome::Rejected(reason) => debug!(?reason, "Call signal rejected"),
        admitted => {
            if let Some(session) = admitted.session() {
                info!(call_id = %session.call_id, "Incoming call admitted")
            }
        }
    }
}
