//! In-memory collaborators for tests and the demo
//!
//! Each mock records what the call core asked of it and can be told to
//! fail, so degradation paths are testable without an OS underneath.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::call::{CallId, CallSession, PhoneNumber};
use crate::config::NativeCallOptions;
use crate::error::{NotificationError, PlatformError, TransportError};
use crate::notification::{
    CallNotification, NotificationCategorySpec, NotificationChannelSpec, NotificationId,
    NotificationPresenter, PresentedNotification, Vibrator,
};
use crate::orchestrator::{CallNavigator, CallScreenRoute};
use crate::platform::{NativeActionSender, NativeCallAction, NativeCallBackend, NativeIncomingCall};
use crate::transport::{OutboundMessage, RealtimeTransport};

/// Scriptable native call backend
#[derive(Default)]
pub struct MockNativeBackend {
    setup_error: Option<PlatformError>,
    display_error: Mutex<Option<PlatformError>>,
    display_delay: Option<Duration>,
    end_error: Option<PlatformError>,
    remove_listeners_error: Option<PlatformError>,
    setup_calls: AtomicUsize,
    actions: Mutex<Option<NativeActionSender>>,
    displayed: Mutex<Vec<NativeIncomingCall>>,
    connected: Mutex<Vec<CallId>>,
    ended: Mutex<Vec<CallId>>,
    listeners_removed: AtomicBool,
}

impl MockNativeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_setup_error(mut self, error: PlatformError) -> Self {
        self.setup_error = Some(error);
        self
    }

    pub fn with_display_error(self, error: PlatformError) -> Self {
        *self.display_error.lock() = Some(error);
        self
    }

    /// Make every display hang for `delay`
    pub fn with_display_delay(mut self, delay: Duration) -> Self {
        self.display_delay = Some(delay);
        self
    }

    pub fn with_end_error(mut self, error: PlatformError) -> Self {
        self.end_error = Some(error);
        self
    }

    pub fn with_remove_listeners_error(mut self, error: PlatformError) -> Self {
        self.remove_listeners_error = Some(error);
        self
    }

    pub fn set_display_error(&self, error: Option<PlatformError>) {
        *self.display_error.lock() = error;
    }

    pub fn setup_count(&self) -> usize {
        self.setup_calls.load(Ordering::SeqCst)
    }

    pub fn displayed(&self) -> Vec<NativeIncomingCall> {
        self.displayed.lock().clone()
    }

    pub fn connected(&self) -> Vec<CallId> {
        self.connected.lock().clone()
    }

    pub fn ended(&self) -> Vec<CallId> {
        self.ended.lock().clone()
    }

    pub fn listeners_removed(&self) -> bool {
        self.listeners_removed.load(Ordering::SeqCst)
    }

    /// Simulate the user acting on the OS call screen
    pub fn trigger(&self, action: NativeCallAction) -> bool {
        match self.actions.lock().as_ref() {
            Some(tx) => tx.send(action).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl NativeCallBackend for MockNativeBackend {
    async fn setup(
        &self,
        _options: &NativeCallOptions,
        actions: NativeActionSender,
    ) -> Result<(), PlatformError> {
        self.setup_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = &self.setup_error {
            return Err(error.clone());
        }
        *self.actions.lock() = Some(actions);
        Ok(())
    }

    async fn display_incoming_call(&self, call: &NativeIncomingCall) -> Result<(), PlatformError> {
        if let Some(delay) = self.display_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = self.display_error.lock().clone() {
            return Err(error);
        }
        self.displayed.lock().push(call.clone());
        Ok(())
    }

    fn report_call_connected(
        &self,
        call_id: &CallId,
        _handle: &PhoneNumber,
        _display_name: &str,
    ) -> Result<(), PlatformError> {
        self.connected.lock().push(call_id.clone());
        Ok(())
    }

    fn end_call(&self, call_id: &CallId) -> Result<(), PlatformError> {
        if let Some(error) = &self.end_error {
            return Err(error.clone());
        }
        self.ended.lock().push(call_id.clone());
        Ok(())
    }

    fn remove_listeners(&self) -> Result<(), PlatformError> {
        self.actions.lock().take();
        if let Some(error) = &self.remove_listeners_error {
            return Err(error.clone());
        }
        self.listeners_removed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Notification subsystem that keeps everything in memory
#[derive(Default)]
pub struct RecordingPresenter {
    setup_error: Option<NotificationError>,
    present_error: Mutex<Option<NotificationError>>,
    next_id: AtomicUsize,
    channels: Mutex<Vec<NotificationChannelSpec>>,
    categories: Mutex<Vec<NotificationCategorySpec>>,
    presented: Mutex<Vec<CallNotification>>,
    on_screen: Mutex<Vec<PresentedNotification>>,
    dismissed: Mutex<Vec<NotificationId>>,
}

impl RecordingPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_setup_error(mut self, error: NotificationError) -> Self {
        self.setup_error = Some(error);
        self
    }

    pub fn set_present_error(&self, error: Option<NotificationError>) {
        *self.present_error.lock() = error;
    }

    /// Every notification ever presented, in order
    pub fn presented_notifications(&self) -> Vec<CallNotification> {
        self.presented.lock().clone()
    }

    /// Notifications not yet dismissed
    pub fn on_screen(&self) -> Vec<PresentedNotification> {
        self.on_screen.lock().clone()
    }

    pub fn dismissed(&self) -> Vec<NotificationId> {
        self.dismissed.lock().clone()
    }

    pub fn configured_channels(&self) -> Vec<NotificationChannelSpec> {
        self.channels.lock().clone()
    }

    pub fn configured_categories(&self) -> Vec<NotificationCategorySpec> {
        self.categories.lock().clone()
    }

    /// Put an arbitrary notification on screen, e.g. a chat message
    pub fn show_raw(&self, data: serde_json::Value) -> NotificationId {
        let id = self.allocate_id();
        self.on_screen.lock().push(PresentedNotification {
            id: id.clone(),
            data,
        });
        id
    }

    fn allocate_id(&self) -> NotificationId {
        NotificationId::from_string(format!(
            "notification-{}",
            self.next_id.fetch_add(1, Ordering::SeqCst) + 1
        ))
    }
}

#[async_trait]
impl NotificationPresenter for RecordingPresenter {
    async fn configure_channel(&self, spec: &NotificationChannelSpec) -> Result<(), NotificationError> {
        if let Some(error) = &self.setup_error {
            return Err(error.clone());
        }
        self.channels.lock().push(spec.clone());
        Ok(())
    }

    async fn configure_category(
        &self,
        spec: &NotificationCategorySpec,
    ) -> Result<(), NotificationError> {
        if let Some(error) = &self.setup_error {
            return Err(error.clone());
        }
        self.categories.lock().push(spec.clone());
        Ok(())
    }

    async fn present(&self, notification: &CallNotification) -> Result<NotificationId, NotificationError> {
        if let Some(error) = self.present_error.lock().clone() {
            return Err(error);
        }
        let data = serde_json::to_value(&notification.payload)
            .map_err(|e| NotificationError::delivery("present", e.to_string()))?;
        let id = self.allocate_id();
        self.presented.lock().push(notification.clone());
        self.on_screen.lock().push(PresentedNotification {
            id: id.clone(),
            data,
        });
        Ok(id)
    }

    async fn presented(&self) -> Result<Vec<PresentedNotification>, NotificationError> {
        Ok(self.on_screen.lock().clone())
    }

    async fn dismiss(&self, id: &NotificationId) -> Result<(), NotificationError> {
        let mut on_screen = self.on_screen.lock();
        let before = on_screen.len();
        on_screen.retain(|n| &n.id != id);
        if on_screen.len() != before {
            self.dismissed.lock().push(id.clone());
        }
        Ok(())
    }
}

/// Vibration motor that records its state
#[derive(Default)]
pub struct RecordingVibrator {
    vibrating: AtomicBool,
    pattern_starts: AtomicUsize,
    pulses: AtomicUsize,
    cancels: AtomicUsize,
}

impl RecordingVibrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a repeating pattern is running
    pub fn is_vibrating(&self) -> bool {
        self.vibrating.load(Ordering::SeqCst)
    }

    pub fn pattern_starts(&self) -> usize {
        self.pattern_starts.load(Ordering::SeqCst)
    }

    pub fn pulses(&self) -> usize {
        self.pulses.load(Ordering::SeqCst)
    }

    pub fn cancels(&self) -> usize {
        self.cancels.load(Ordering::SeqCst)
    }
}

impl Vibrator for RecordingVibrator {
    fn vibrate_pattern(&self, _pattern_ms: &[u64], repeat: bool) {
        self.pattern_starts.fetch_add(1, Ordering::SeqCst);
        self.vibrating.store(repeat, Ordering::SeqCst);
    }

    fn vibrate_once(&self, _duration: Duration) {
        self.pulses.fetch_add(1, Ordering::SeqCst);
    }

    fn cancel(&self) {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        self.vibrating.store(false, Ordering::SeqCst);
    }
}

/// Socket stand-in that records every outbound message
#[derive(Default)]
pub struct RecordingTransport {
    connected: AtomicBool,
    fail_sends: AtomicBool,
    sent: Mutex<Vec<OutboundMessage>>,
}

impl RecordingTransport {
    /// Disconnected transport
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connected() -> Self {
        let transport = Self::default();
        transport.connected.store(true, Ordering::SeqCst);
        transport
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Make every send fail
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<OutboundMessage> {
        self.sent.lock().clone()
    }

    pub fn sent_events(&self) -> Vec<&'static str> {
        self.sent.lock().iter().map(OutboundMessage::event_name).collect()
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

impl RealtimeTransport for RecordingTransport {
    fn emit(&self, message: OutboundMessage) -> Result<(), TransportError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Send {
                event: message.event_name().to_string(),
                reason: "simulated failure".to_string(),
            });
        }
        self.sent.lock().push(message);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// A navigation request recorded by [`RecordingNavigator`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationEvent {
    IncomingCall(CallId),
    CallScreen(CallScreenRoute),
    Idle,
}

/// Navigator that records requests instead of moving screens
#[derive(Default)]
pub struct RecordingNavigator {
    events: Mutex<Vec<NavigationEvent>>,
}

impl RecordingNavigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<NavigationEvent> {
        self.events.lock().clone()
    }

    pub fn last(&self) -> Option<NavigationEvent> {
        self.events.lock().last().cloned()
    }
}

impl CallNavigator for RecordingNavigator {
    fn show_incoming_call(&self, session: &CallSession) {
        self.events
            .lock()
            .push(NavigationEvent::IncomingCall(session.call_id.clone()));
    }

    fn open_call_screen(&self, route: &CallScreenRoute) {
        self.events.lock().push(NavigationEvent::CallScreen(route.clone()));
    }

    fn show_idle(&self) {
        self.events.lock().push(NavigationEvent::Idle);
    }
}
