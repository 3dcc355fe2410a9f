//! Signaling front door and notification fallback
//!
//! [`CallNotificationService::handle_incoming_call`] is the single
//! ingestion point for "a call is ringing for you", whatever path the
//! signal took (socket, push, VoIP push, foreground notification). It
//! decides between native and notification presentation, owns the ringing
//! side effect, and turns notification responses into state transitions.
//!
//! # Ingestion Flow
//!
//! ```text
//!  signal ─▶ channel already active? ──yes──▶ Duplicate (no side effects)
//!               │ no
//!               ▼
//!          create_incoming_call ──Duplicate/Rejected──▶ return
//!               │ Admitted
//!               ▼
//!          native display ok? ──yes──▶ PresentedNatively
//!               │ no
//!               ▼
//!          present notification ─▶ start ringing ─▶ FallbackPresented
//!               (failed)                             / PresentationDegraded
//! ```
//!
//! Ringing stops on every `answered`/`declined`/`ended` event through a
//! state manager subscription, independent of which path caused it.

mod presenter;
mod ringer;

pub use presenter::{
    is_call_payload, payload_call_id, ActionButton, CallNotification, NotificationAction,
    NotificationCategorySpec, NotificationChannelSpec, NotificationId, NotificationPayload,
    NotificationPresenter, NotificationResponse, PresentedNotification, ANSWER_ACTION_ID,
    DECLINE_ACTION_ID,
};
pub use ringer::{Ringer, Vibrator};

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::call::{CallId, CallSession, CallState, Channel, PhoneNumber};
use crate::config::{CallCoreConfig, NotificationConfig};
use crate::contact::ContactResolver;
use crate::error::{CallError, CallResult};
use crate::events::{CallEvent, EndReason, SubscriptionId};
use crate::platform::{Platform, PlatformCallAdapter};
use crate::recovery::with_timeout;
use crate::signal::{IncomingCallSignal, SignalSource};
use crate::state_manager::{AdmitOutcome, CallStateManager, RejectReason, TransitionOutcome};

/// Result of feeding one signal into the ingestion funnel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Admitted and ringing on the OS call screen
    PresentedNatively(CallSession),
    /// Admitted, notification shown and ringing started
    FallbackPresented {
        session: CallSession,
        notification_id: NotificationId,
    },
    /// Admitted and ringing, but no notification could be shown
    PresentationDegraded(CallSession),
    /// Same channel already active; nothing was presented
    Duplicate(CallSession),
    Rejected(RejectReason),
}

impl IngestOutcome {
    pub fn is_admitted(&self) -> bool {
        matches!(
            self,
            IngestOutcome::PresentedNatively(_)
                | IngestOutcome::FallbackPresented { .. }
                | IngestOutcome::PresentationDegraded(_)
        )
    }

    pub fn session(&self) -> Option<&CallSession> {
        match self {
            IngestOutcome::PresentedNatively(s)
            | IngestOutcome::FallbackPresented { session: s, .. }
            | IngestOutcome::PresentationDegraded(s)
            | IngestOutcome::Duplicate(s) => Some(s),
            IngestOutcome::Rejected(_) => None,
        }
    }
}

/// What a notification response led to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseOutcome {
    /// Not a call notification
    Ignored,
    Answered(TransitionOutcome),
    Declined(TransitionOutcome),
    /// Bare tap: surface the call screen for this ringing session, if any
    ShowCallScreen(Option<CallSession>),
}

#[derive(Default)]
struct Lifecycle {
    initialized: bool,
    subscription: Option<SubscriptionId>,
}

/// Signaling front door
pub struct CallNotificationService {
    state_manager: Arc<CallStateManager>,
    platform: Arc<PlatformCallAdapter>,
    presenter: Arc<dyn NotificationPresenter>,
    ringer: Ringer,
    contacts: Option<Arc<dyn ContactResolver>>,
    config: NotificationConfig,
    ring_timeout: Option<Duration>,
    os_timeout: Duration,
    default_has_video: bool,
    local_user: RwLock<Option<PhoneNumber>>,
    lifecycle: Mutex<Lifecycle>,
    ring_timer: Mutex<Option<JoinHandle<()>>>,
}

impl CallNotificationService {
    pub fn new(
        state_manager: Arc<CallStateManager>,
        platform: Arc<PlatformCallAdapter>,
        presenter: Arc<dyn NotificationPresenter>,
        vibrator: Arc<dyn Vibrator>,
        config: &CallCoreConfig,
    ) -> Self {
        Self {
            state_manager,
            platform,
            presenter,
            ringer: Ringer::new(vibrator, config.ring.clone()),
            contacts: None,
            config: config.notifications.clone(),
            ring_timeout: config.ring.ring_timeout,
            os_timeout: config.native_call_timeout,
            default_has_video: config.default_has_video,
            local_user: RwLock::new(None),
            lifecycle: Mutex::new(Lifecycle::default()),
            ring_timer: Mutex::new(None),
        }
    }

    /// Resolve missing caller names through `resolver`
    pub fn with_contact_resolver(mut self, resolver: Arc<dyn ContactResolver>) -> Self {
        self.contacts = Some(resolver);
        self
    }

    /// Number used as callee when a signal omits it
    pub fn set_local_user(&self, phone: Option<PhoneNumber>) {
        *self.local_user.write() = phone;
    }

    /// Set up the notification channel/category and the state listener.
    ///
    /// Idempotent. Returns `false` if notification setup failed; the state
    /// listener is registered regardless so ringing can always be stopped.
    pub async fn initialize(self: &Arc<Self>) -> bool {
        if self.lifecycle.lock().initialized {
            return true;
        }
        info!("CallNotificationService: initializing");

        self.subscribe_state_events();

        match self.setup_notifications().await {
            Ok(()) => {
                self.lifecycle.lock().initialized = true;
                info!("CallNotificationService: initialized");
                true
            }
            Err(e) => {
                error!(error = %e, "CallNotificationService: notification setup failed");
                false
            }
        }
    }

    async fn setup_notifications(&self) -> CallResult<()> {
        let category = NotificationCategorySpec::from_config(&self.config);
        with_timeout("configure_category", self.os_timeout, async {
            self.presenter
                .configure_category(&category)
                .await
                .map_err(CallError::from)
        })
        .await?;

        if self.platform.platform() == Platform::Android {
            let channel = NotificationChannelSpec::from_config(&self.config);
            with_timeout("configure_channel", self.os_timeout, async {
                self.presenter
                    .configure_channel(&channel)
                    .await
                    .map_err(CallError::from)
            })
            .await?;
        }
        Ok(())
    }

    fn subscribe_state_events(self: &Arc<Self>) {
        let mut lifecycle = self.lifecycle.lock();
        if lifecycle.subscription.is_some() {
            return;
        }
        let weak: Weak<Self> = Arc::downgrade(self);
        let id = self.state_manager.subscribe(move |event| {
            if let Some(service) = weak.upgrade() {
                service.on_call_event(event);
            }
        });
        lifecycle.subscription = Some(id);
    }

    fn on_call_event(&self, event: &CallEvent) {
        if !event.stops_ringing() {
            return;
        }

        self.ringer.stop();
        self.cancel_ring_timer();

        match event {
            CallEvent::Answered(session) => self.platform.on_call_answered(session),
            CallEvent::Declined(session) => self.platform.on_call_declined(session),
            CallEvent::Ended {
                session: Some(session),
                ..
            } => self.platform.on_call_ended(session),
            _ => {}
        }

        self.spawn_clear_notifications();
    }

    /// Feed one inbound call signal through the funnel.
    ///
    /// Duplicates and rejections are `Ok`; only a malformed signal is an
    /// error. Presentation failures degrade, they never drop an admitted call.
    pub async fn handle_incoming_call(&self, signal: IncomingCallSignal) -> CallResult<IngestOutcome> {
        info!(
            channel = %signal.channel,
            source = %signal.source,
            "Handling incoming call signal"
        );

        let local_user = self.local_user.read().clone();
        let mut params = signal.to_params(local_user.as_ref(), self.default_has_video)?;

        if let Some(existing) = self.state_manager.call_by_channel(&params.channel) {
            debug!(
                channel = %params.channel,
                source = %signal.source,
                "Call already active for channel, skipping presentation"
            );
            return Ok(IngestOutcome::Duplicate(existing));
        }

        if params.caller_name.is_none() {
            if let Some(contacts) = &self.contacts {
                params.caller_name = Some(contacts.resolve(&params.caller_phone).name);
            }
        }

        let session = match self.state_manager.create_incoming_call(params) {
            AdmitOutcome::Admitted(session) => session,
            AdmitOutcome::Duplicate(session) => return Ok(IngestOutcome::Duplicate(session)),
            AdmitOutcome::Rejected(reason) => return Ok(IngestOutcome::Rejected(reason)),
        };

        if self.platform.display_incoming_call(&session).await {
            // The state listener may have synced the OS before the display landed
            match self.state_manager.active_call() {
                Some(current) if current.call_id == session.call_id => match current.call_state {
                    CallState::Incoming => self.arm_ring_timeout(&session.call_id),
                    CallState::Active => self.platform.on_call_answered(&current),
                    _ => {}
                },
                _ => {
                    debug!(call_id = %session.call_id, "Call ended during native display, retracting");
                    self.platform.on_call_ended(&session);
                }
            }
            return Ok(IngestOutcome::PresentedNatively(session));
        }

        let notification = CallNotification::for_session(&session, &self.config, self.platform.platform());
        let presented = with_timeout("present_notification", self.os_timeout, async {
            self.presenter
                .present(&notification)
                .await
                .map_err(CallError::from)
        })
        .await;

        if !self.state_manager.is_incoming(&session.call_id) {
            debug!(call_id = %session.call_id, "Call left incoming state during presentation");
            self.spawn_clear_notifications();
        } else {
            self.ringer.start(&session.call_id);
            // A transition between the check and the start would have stopped nothing
            if !self.state_manager.is_incoming(&session.call_id) {
                self.ringer.stop_for(&session.call_id);
            } else {
                self.arm_ring_timeout(&session.call_id);
            }
        }

        match presented {
            Ok(notification_id) => {
                info!(call_id = %session.call_id, %notification_id, "Notification call UI displayed");
                Ok(IngestOutcome::FallbackPresented {
                    session,
                    notification_id,
                })
            }
            Err(e) => {
                error!(
                    call_id = %session.call_id,
                    error = %e,
                    category = %e.category(),
                    "Neither native nor notification presentation available"
                );
                Ok(IngestOutcome::PresentationDegraded(session))
            }
        }
    }

    /// Funnel a call notification delivered while in the foreground
    pub async fn handle_foreground_notification(&self, data: &Value) -> CallResult<Option<IngestOutcome>> {
        let Some(signal) = IncomingCallSignal::from_payload(data, SignalSource::ForegroundNotification)? else {
            return Ok(None);
        };
        self.handle_incoming_call(signal).await.map(Some)
    }

    /// Map a notification tap or action button to a transition
    pub async fn handle_notification_response(&self, response: &NotificationResponse) -> ResponseOutcome {
        if !is_call_payload(&response.data) {
            return ResponseOutcome::Ignored;
        }
        let call_id = payload_call_id(&response.data);
        let action = response.action();
        info!(?action, call_id = ?call_id, "Call notification response");

        match (action, call_id) {
            (NotificationAction::Answer, Some(id)) => ResponseOutcome::Answered(self.answer_call_for(&id).await),
            (NotificationAction::Answer, None) => ResponseOutcome::Answered(self.answer_call().await),
            (NotificationAction::Decline, Some(id)) => {
                ResponseOutcome::Declined(self.decline_call_for(&id).await)
            }
            (NotificationAction::Decline, None) => ResponseOutcome::Declined(self.decline_call().await),
            (NotificationAction::Open, _) => ResponseOutcome::ShowCallScreen(
                self.state_manager
                    .active_call()
                    .filter(|s| s.call_state == CallState::Incoming),
            ),
        }
    }

    /// Answer the ringing call; stops ringing and clears notifications on success
    pub async fn answer_call(&self) -> TransitionOutcome {
        let outcome = self.state_manager.answer_call();
        self.after_local_response(&outcome).await;
        outcome
    }

    pub async fn answer_call_for(&self, call_id: &CallId) -> TransitionOutcome {
        let outcome = self.state_manager.answer_call_for(call_id);
        self.after_local_response(&outcome).await;
        outcome
    }

    /// Decline the ringing call; stops ringing and clears notifications on success
    pub async fn decline_call(&self) -> TransitionOutcome {
        let outcome = self.state_manager.decline_call();
        self.after_local_response(&outcome).await;
        outcome
    }

    pub async fn decline_call_for(&self, call_id: &CallId) -> TransitionOutcome {
        let outcome = self.state_manager.decline_call_for(call_id);
        self.after_local_response(&outcome).await;
        outcome
    }

    async fn after_local_response(&self, outcome: &TransitionOutcome) {
        if outcome.is_transitioned() {
            self.ringer.stop();
            self.cancel_ring_timer();
            clear_call_notifications(self.presenter.as_ref(), self.os_timeout).await;
        }
    }

    /// End the active call if, and only if, it uses `channel`
    pub fn end_call_by_channel(&self, channel: &Channel) -> TransitionOutcome {
        let outcome = self
            .state_manager
            .end_call_by_channel(channel, EndReason::RemoteHangup);
        if !outcome.is_transitioned() {
            debug!(%channel, "Ignoring end signal for inactive channel");
        }
        outcome
    }

    pub fn is_ringing(&self) -> bool {
        self.ringer.is_ringing()
    }

    /// Dismiss every presented call notification; returns how many
    pub async fn clear_notifications(&self) -> usize {
        clear_call_notifications(self.presenter.as_ref(), self.os_timeout).await
    }

    /// Stop ringing, clear notifications, reset call state and drop the
    /// state listener. Other listeners on the state manager are untouched.
    pub async fn cleanup(&self) {
        self.ringer.stop();
        self.cancel_ring_timer();
        clear_call_notifications(self.presenter.as_ref(), self.os_timeout).await;
        self.state_manager.reset();

        let mut lifecycle = self.lifecycle.lock();
        if let Some(id) = lifecycle.subscription.take() {
            self.state_manager.unsubscribe(id);
        }
        lifecycle.initialized = false;
        info!("CallNotificationService: cleaned up");
    }

    fn arm_ring_timeout(&self, call_id: &CallId) {
        let Some(timeout) = self.ring_timeout else {
            return;
        };
        let Ok(handle) = Handle::try_current() else {
            warn!("No tokio runtime; ring timeout not armed");
            return;
        };

        let state_manager = Arc::clone(&self.state_manager);
        let call_id = call_id.clone();
        let timer = handle.spawn(async move {
            tokio::time::sleep(timeout).await;
            if state_manager.is_incoming(&call_id) {
                info!(%call_id, timeout_ms = timeout.as_millis() as u64, "Ring timed out");
                state_manager.timeout_call(&call_id);
            }
        });

        if let Some(previous) = self.ring_timer.lock().replace(timer) {
            previous.abort();
        }
    }

    fn cancel_ring_timer(&self) {
        if let Some(timer) = self.ring_timer.lock().take() {
            timer.abort();
        }
    }

    fn spawn_clear_notifications(&self) {
        let Ok(handle) = Handle::try_current() else {
            return;
        };
        let presenter = Arc::clone(&self.presenter);
        let timeout = self.os_timeout;
        handle.spawn(async move {
            clear_call_notifications(presenter.as_ref(), timeout).await;
        });
    }
}

impl fmt::Debug for CallNotificationService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallNotificationService")
            .field("initialized", &self.lifecycle.lock().initialized)
            .field("ringer", &self.ringer)
            .field("ring_timeout", &self.ring_timeout)
            .finish()
    }
}

/// Dismiss presented call notifications; each dismissal is tried on its own
async fn clear_call_notifications(presenter: &dyn NotificationPresenter, timeout: Duration) -> usize {
    let presented = with_timeout("presented_notifications", timeout, async {
        presenter.presented().await.map_err(CallError::from)
    })
    .await;

    let presented = match presented {
        Ok(presented) => presented,
        Err(e) => {
            warn!(error = %e, "Could not list presented notifications");
            return 0;
        }
    };

    let mut dismissed = 0;
    for notification in presented.iter().filter(|n| is_call_payload(&n.data)) {
        match presenter.dismiss(&notification.id).await {
            Ok(()) => dismissed += 1,
            Err(e) => warn!(id = %notification.id, error = %e, "Failed to dismiss call notification"),
        }
    }
    if dismissed > 0 {
        debug!(dismissed, "Call notifications cleared");
    }
    dismissed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::CallState;
    use crate::error::{NotificationError, PlatformError};
    use crate::mock::{MockNativeBackend, RecordingPresenter, RecordingVibrator};
    use crate::platform::NativeCallBackend;
    use serde_json::json;

    struct Harness {
        manager: Arc<CallStateManager>,
        backend: Arc<MockNativeBackend>,
        presenter: Arc<RecordingPresenter>,
        vibrator: Arc<RecordingVibrator>,
        service: Arc<CallNotificationService>,
    }

    async fn harness(platform: Platform, backend: MockNativeBackend, config: CallCoreConfig) -> Harness {
        let manager = Arc::new(CallStateManager::new(config.history_limit));
        let backend = Arc::new(backend);
        let adapter = Arc::new(PlatformCallAdapter::new(
            platform,
            Some(backend.clone() as Arc<dyn NativeCallBackend>),
            config.native.clone(),
            config.native_call_timeout,
        ));
        adapter.initialize().await;
        let presenter = Arc::new(RecordingPresenter::new());
        let vibrator = Arc::new(RecordingVibrator::new());
        let service = Arc::new(CallNotificationService::new(
            manager.clone(),
            adapter,
            presenter.clone(),
            vibrator.clone(),
            &config,
        ));
        assert!(service.initialize().await);
        Harness {
            manager,
            backend,
            presenter,
            vibrator,
            service,
        }
    }

    fn signal(channel: &str) -> IncomingCallSignal {
        IncomingCallSignal::new("+491234", "+495678", channel).with_video(true)
    }

    #[tokio::test]
    async fn test_native_presentation_skips_fallback() {
        let h = harness(Platform::Ios, MockNativeBackend::new(), CallCoreConfig::default()).await;

        let outcome = h.service.handle_incoming_call(signal("call_1")).await.unwrap();
        assert!(matches!(outcome, IngestOutcome::PresentedNatively(_)));
        assert!(h.presenter.presented_notifications().is_empty());
        assert!(!h.service.is_ringing());
    }

    #[tokio::test]
    async fn test_fallback_rings_until_answered() {
        let h = harness(Platform::Android, MockNativeBackend::new(), CallCoreConfig::default()).await;
        h.backend.set_display_error(Some(PlatformError::api("display", "boom")));

        let outcome = h.service.handle_incoming_call(signal("call_1")).await.unwrap();
        assert!(matches!(outcome, IngestOutcome::FallbackPresented { .. }));
        assert!(h.service.is_ringing());
        assert_eq!(h.presenter.presented_notifications().len(), 1);

        assert!(h.service.answer_call().await.is_transitioned());
        assert!(!h.service.is_ringing());
        assert!(!h.vibrator.is_vibrating());
        assert!(h.presenter.on_screen().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_signal_has_no_side_effects() {
        let h = harness(Platform::Desktop, MockNativeBackend::new(), CallCoreConfig::default()).await;

        let first = h.service.handle_incoming_call(signal("call_xyz")).await.unwrap();
        let second = h
            .service
            .handle_incoming_call(signal("call_xyz").with_source(SignalSource::Push))
            .await
            .unwrap();

        assert!(first.is_admitted());
        assert!(matches!(second, IngestOutcome::Duplicate(_)));
        assert_eq!(first.session().unwrap().call_id, second.session().unwrap().call_id);
        assert_eq!(h.presenter.presented_notifications().len(), 1);
        assert_eq!(h.vibrator.pattern_starts(), 1);
    }

    #[tokio::test]
    async fn test_remote_end_stops_ringing() {
        let h = harness(Platform::Web, MockNativeBackend::new(), CallCoreConfig::default()).await;
        h.service.handle_incoming_call(signal("call_1")).await.unwrap();
        assert!(h.service.is_ringing());

        assert!(!h
            .service
            .end_call_by_channel(&Channel::new("call_2").unwrap())
            .is_transitioned());
        assert!(h.service.is_ringing());

        assert!(h
            .service
            .end_call_by_channel(&Channel::new("call_1").unwrap())
            .is_transitioned());
        assert!(!h.service.is_ringing());
        assert!(!h.vibrator.is_vibrating());
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn test_total_presentation_failure_degrades() {
        let h = harness(Platform::Desktop, MockNativeBackend::new(), CallCoreConfig::default()).await;
        h.presenter
            .set_present_error(Some(NotificationError::delivery("present", "denied")));

        let outcome = h.service.handle_incoming_call(signal("call_1")).await.unwrap();
        assert!(matches!(outcome, IngestOutcome::PresentationDegraded(_)));
        assert!(h.service.is_ringing());
        assert_eq!(h.manager.active_call().unwrap().call_state, CallState::Incoming);
        assert!(logs_contain("Neither native nor notification presentation available"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ring_timeout_ends_unanswered_call() {
        let config = CallCoreConfig::default().with_ring(
            crate::config::RingConfig::default().with_ring_timeout(Duration::from_secs(30)),
        );
        let h = harness(Platform::Desktop, MockNativeBackend::new(), config).await;
        let mut events = h.manager.events();

        h.service.handle_incoming_call(signal("call_1")).await.unwrap();
        tokio::time::sleep(Duration::from_secs(31)).await;

        assert!(h.manager.active_call().is_none());
        assert!(!h.service.is_ringing());
        use tokio_stream::StreamExt;
        let _incoming = events.next().await;
        match events.next().await {
            Some(Ok(CallEvent::Ended { reason, .. })) => assert_eq!(reason, EndReason::TimedOut),
            other => panic!("expected timeout end, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_answered_call_is_not_timed_out() {
        let config = CallCoreConfig::default().with_ring(
            crate::config::RingConfig::default().with_ring_timeout(Duration::from_secs(30)),
        );
        let h = harness(Platform::Desktop, MockNativeBackend::new(), config).await;

        h.service.handle_incoming_call(signal("call_1")).await.unwrap();
        h.service.answer_call().await;
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(h.manager.active_call().unwrap().call_state, CallState::Active);
    }

    #[tokio::test]
    async fn test_notification_responses() {
        let h = harness(Platform::Desktop, MockNativeBackend::new(), CallCoreConfig::default()).await;
        let outcome = h.service.handle_incoming_call(signal("call_1")).await.unwrap();
        let session = outcome.session().unwrap().clone();
        let data = serde_json::to_value(NotificationPayload::from_session(&session)).unwrap();

        let tap = NotificationResponse {
            action_identifier: None,
            data: data.clone(),
        };
        assert_eq!(
            h.service.handle_notification_response(&tap).await,
            ResponseOutcome::ShowCallScreen(Some(session.clone()))
        );
        assert!(h.service.is_ringing());

        let unrelated = NotificationResponse {
            action_identifier: Some("answer".to_string()),
            data: json!({ "type": "chat_message" }),
        };
        assert_eq!(
            h.service.handle_notification_response(&unrelated).await,
            ResponseOutcome::Ignored
        );

        let decline = NotificationResponse {
            action_identifier: Some("decline".to_string()),
            data,
        };
        match h.service.handle_notification_response(&decline).await {
            ResponseOutcome::Declined(outcome) => assert!(outcome.is_transitioned()),
            other => panic!("expected decline, got {:?}", other),
        }
        assert!(!h.service.is_ringing());
    }

    #[tokio::test]
    async fn test_stale_notification_action_is_ignored() {
        let h = harness(Platform::Desktop, MockNativeBackend::new(), CallCoreConfig::default()).await;
        h.service.handle_incoming_call(signal("call_2")).await.unwrap();

        let stale = NotificationResponse {
            action_identifier: Some("answer".to_string()),
            data: json!({ "type": "incoming_call", "callId": "call_1_old", "channel": "call_1" }),
        };
        match h.service.handle_notification_response(&stale).await {
            ResponseOutcome::Answered(outcome) => assert!(!outcome.is_transitioned()),
            other => panic!("expected answer attempt, got {:?}", other),
        }
        assert_eq!(h.manager.active_call().unwrap().call_state, CallState::Incoming);
    }

    #[tokio::test]
    async fn test_foreground_notification_dedup() {
        let h = harness(Platform::Desktop, MockNativeBackend::new(), CallCoreConfig::default()).await;
        let data = json!({
            "type": "incoming_call",
            "callerPhone": "+491234",
            "calleePhone": "+495678",
            "channel": "call_1",
        });

        let first = h.service.handle_foreground_notification(&data).await.unwrap();
        let second = h.service.handle_foreground_notification(&data).await.unwrap();
        assert!(first.unwrap().is_admitted());
        assert!(matches!(second, Some(IngestOutcome::Duplicate(_))));

        let other = json!({ "type": "friend_request" });
        assert!(h.service.handle_foreground_notification(&other).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_contact_resolver_fills_caller_name() {
        let manager = Arc::new(CallStateManager::default());
        let adapter = Arc::new(PlatformCallAdapter::without_native(Platform::Desktop));
        let contacts = crate::contact::ContactBook::new().with_device_contact("+491234", "Anna");
        let service = Arc::new(
            CallNotificationService::new(
                manager,
                adapter,
                Arc::new(RecordingPresenter::new()),
                Arc::new(RecordingVibrator::new()),
                &CallCoreConfig::default(),
            )
            .with_contact_resolver(Arc::new(contacts)),
        );

        let outcome = service.handle_incoming_call(signal("call_1")).await.unwrap();
        assert_eq!(outcome.session().unwrap().caller_name.as_deref(), Some("Anna"));
    }

    #[tokio::test]
    async fn test_cleanup_unsubscribes_only_itself() {
        let h = harness(Platform::Desktop, MockNativeBackend::new(), CallCoreConfig::default()).await;
        let seen = Arc::new(Mutex::new(0));
        let counter = seen.clone();
        h.manager.subscribe(move |_| *counter.lock() += 1);

        h.service.handle_incoming_call(signal("call_1")).await.unwrap();
        h.service.cleanup().await;

        assert!(!h.manager.has_active_call());
        assert!(!h.service.is_ringing());
        // incoming + reset
        assert_eq!(*seen.lock(), 2);

        h.manager.create_incoming_call(signal("call_2").to_params(None, true).unwrap());
        assert_eq!(*seen.lock(), 3);
    }
}
