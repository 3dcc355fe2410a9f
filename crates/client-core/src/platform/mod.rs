//! Native call UI bridge
//!
//! [`PlatformCallAdapter`] attempts OS-native call presentation and falls
//! back cleanly when it is unavailable. Native call UI is an enhancement,
//! never a requirement: every failure in here is caught at the adapter
//! boundary, logged, and reported as "not handled natively" so the caller
//! can fall back to a notification.
//!
//! # Directions of Control
//!
//! ```text
//!   CallStateManager ──events──▶ on_call_answered / declined / ended ──▶ OS
//!
//!   OS call screen ──NativeCallAction──▶ action pump ──▶ registered callbacks
//!                                                       (answer / end / reject)
//! ```
//!
//! The callbacks are the reverse direction: the session orchestrator wires
//! them to state manager operations, keyed by call id.

mod backend;

pub use backend::{
    HandleType, NativeActionSender, NativeCallAction, NativeCallBackend, NativeIncomingCall,
};

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::call::{CallId, CallSession};
use crate::config::NativeCallOptions;
use crate::contact::UNKNOWN_CALLER_LABEL;
use crate::error::{CallError, CallResult, PlatformError};
use crate::recovery::with_timeout;

/// Callback invoked with the call id of a native user action
pub type NativeActionCallback = Arc<dyn Fn(CallId) -> BoxFuture<'static, ()> + Send + Sync>;

/// Operating system family the process runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ios,
    Android,
    Web,
    Desktop,
}

impl Platform {
    /// Platform of the current build target
    pub fn current() -> Self {
        if cfg!(target_os = "ios") {
            Platform::Ios
        } else if cfg!(target_os = "android") {
            Platform::Android
        } else if cfg!(target_family = "wasm") {
            Platform::Web
        } else {
            Platform::Desktop
        }
    }
}

/// Which native call mechanisms a platform offers; fixed per platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformCapabilities {
    pub supports_native_call_ui: bool,
    pub supports_call_kit: bool,
    pub supports_in_call_service: bool,
    pub supports_voip_push: bool,
}

impl PlatformCapabilities {
    pub fn for_platform(platform: Platform) -> Self {
        Self {
            supports_native_call_ui: matches!(platform, Platform::Ios | Platform::Android),
            supports_call_kit: platform == Platform::Ios,
            supports_in_call_service: platform == Platform::Android,
            supports_voip_push: platform == Platform::Ios,
        }
    }
}

#[derive(Default, Clone)]
struct NativeCallbacks {
    on_answer: Option<NativeActionCallback>,
    on_end: Option<NativeActionCallback>,
    on_reject: Option<NativeActionCallback>,
}

/// Bridge between call state and the OS call subsystem
pub struct PlatformCallAdapter {
    platform: Platform,
    capabilities: PlatformCapabilities,
    backend: Option<Arc<dyn NativeCallBackend>>,
    options: NativeCallOptions,
    call_timeout: Duration,
    /// `None` until the first initialize attempt; then native readiness
    ready: Mutex<Option<bool>>,
    init_lock: tokio::sync::Mutex<()>,
    callbacks: Arc<RwLock<NativeCallbacks>>,
    action_pump: Mutex<Option<JoinHandle<()>>>,
}

impl PlatformCallAdapter {
    pub fn new(
        platform: Platform,
        backend: Option<Arc<dyn NativeCallBackend>>,
        options: NativeCallOptions,
        call_timeout: Duration,
    ) -> Self {
        Self {
            platform,
            capabilities: PlatformCapabilities::for_platform(platform),
            backend,
            options,
            call_timeout,
            ready: Mutex::new(None),
            init_lock: tokio::sync::Mutex::new(()),
            callbacks: Arc::new(RwLock::new(NativeCallbacks::default())),
            action_pump: Mutex::new(None),
        }
    }

    /// Adapter with no native backend linked; always falls back
    pub fn without_native(platform: Platform) -> Self {
        Self::new(
            platform,
            None,
            NativeCallOptions::default(),
            Duration::from_secs(5),
        )
    }

    /// Set up the native call subsystem.
    ///
    /// Idempotent and best-effort: returns whether native call UI is ready.
    /// `false` means callers should use notification-based presentation.
    pub async fn initialize(&self) -> bool {
        let _init = self.init_lock.lock().await;
        if let Some(ready) = *self.ready.lock() {
            return ready;
        }

        info!(
            platform = ?self.platform,
            capabilities = ?self.capabilities,
            "PlatformCallAdapter: initializing"
        );

        let ready = match self.setup_native().await {
            Ok(ready) => ready,
            Err(e) => {
                warn!(error = %e, "Native call UI unavailable, using notification fallback");
                false
            }
        };

        *self.ready.lock() = Some(ready);
        info!(native_ready = ready, "PlatformCallAdapter: initialized");
        ready
    }

    async fn setup_native(&self) -> CallResult<bool> {
        if !self.capabilities.supports_native_call_ui {
            debug!(platform = ?self.platform, "No native call UI on this platform");
            return Ok(false);
        }

        let backend = self.backend.as_ref().ok_or_else(|| PlatformError::Unavailable {
            reason: "no native call backend linked".to_string(),
        })?;

        let (tx, rx) = mpsc::unbounded_channel();
        with_timeout("native_setup", self.call_timeout, async {
            backend.setup(&self.options, tx).await.map_err(CallError::from)
        })
        .await?;

        let pump = tokio::spawn(pump_actions(rx, Arc::clone(&self.callbacks)));
        if let Some(previous) = self.action_pump.lock().replace(pump) {
            previous.abort();
        }
        Ok(true)
    }

    /// Whether native call UI finished setting up
    pub fn is_native_ready(&self) -> bool {
        self.ready.lock().unwrap_or(false)
    }

    /// Attempt native presentation of an incoming call.
    ///
    /// `true` means the OS is ringing and the caller must not also show a
    /// notification-based ring.
    pub async fn display_incoming_call(&self, session: &CallSession) -> bool {
        if !self.is_native_ready() {
            debug!(call_id = %session.call_id, "Native call UI not ready, using fallback");
            return false;
        }
        let Some(backend) = self.backend.as_ref() else {
            return false;
        };

        let call = NativeIncomingCall::from_session(session);
        let displayed = with_timeout("display_incoming_call", self.call_timeout, async {
            backend
                .display_incoming_call(&call)
                .await
                .map_err(CallError::from)
        })
        .await;

        match displayed {
            Ok(()) => {
                info!(call_id = %session.call_id, platform = ?self.platform, "Native incoming call displayed");
                true
            }
            Err(e) => {
                error!(
                    call_id = %session.call_id,
                    error = %e,
                    category = %e.category(),
                    "Failed to display native incoming call"
                );
                // A late display would ring alongside the fallback
                if matches!(e, CallError::OperationTimeout { .. }) {
                    if let Err(e) = backend.end_call(&session.call_id) {
                        warn!(call_id = %session.call_id, error = %e, "Failed to retract timed out native display");
                    }
                }
                false
            }
        }
    }

    /// Tell the OS the call was answered (e.g. via an in-app button)
    pub fn on_call_answered(&self, session: &CallSession) {
        let Some(backend) = self.active_backend() else {
            return;
        };
        let display_name = session.caller_name.as_deref().unwrap_or(UNKNOWN_CALLER_LABEL);
        match backend.report_call_connected(&session.call_id, &session.caller_phone, display_name) {
            Ok(()) => debug!(call_id = %session.call_id, "Native call marked connected"),
            Err(e) => error!(call_id = %session.call_id, error = %e, "Failed to start native call"),
        }
    }

    /// Tell the OS the call was declined
    pub fn on_call_declined(&self, session: &CallSession) {
        self.end_native_call(&session.call_id, "declined");
    }

    /// Tell the OS the call ended
    pub fn on_call_ended(&self, session: &CallSession) {
        self.end_native_call(&session.call_id, "ended");
    }

    fn end_native_call(&self, call_id: &CallId, why: &'static str) {
        let Some(backend) = self.active_backend() else {
            return;
        };
        match backend.end_call(call_id) {
            Ok(()) => debug!(%call_id, why, "Native call ended"),
            Err(e) => error!(%call_id, why, error = %e, "Failed to end native call"),
        }
    }

    fn active_backend(&self) -> Option<&Arc<dyn NativeCallBackend>> {
        if self.is_native_ready() {
            self.backend.as_ref()
        } else {
            None
        }
    }

    pub fn set_on_answer_call_callback<F, Fut>(&self, callback: F)
    where
        F: Fn(CallId) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.callbacks.write().on_answer = Some(boxed_callback(callback));
    }

    pub fn set_on_end_call_callback<F, Fut>(&self, callback: F)
    where
        F: Fn(CallId) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.callbacks.write().on_end = Some(boxed_callback(callback));
    }

    pub fn set_on_reject_call_callback<F, Fut>(&self, callback: F)
    where
        F: Fn(CallId) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.callbacks.write().on_reject = Some(boxed_callback(callback));
    }

    /// Route a native user action to its registered callback.
    ///
    /// Returns whether a callback handled it. Actions arriving from the
    /// backend go through here as well.
    pub async fn dispatch_native_action(&self, action: NativeCallAction) -> bool {
        dispatch(&self.callbacks, action).await
    }

    pub fn capabilities(&self) -> PlatformCapabilities {
        self.capabilities
    }

    pub fn supports_native_call_ui(&self) -> bool {
        self.capabilities.supports_native_call_ui
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    /// Remove native listeners, drop callbacks and forget initialisation.
    ///
    /// Each step runs even if an earlier one failed.
    pub fn cleanup(&self) {
        if let Some(backend) = self.active_backend() {
            if let Err(e) = backend.remove_listeners() {
                error!(error = %e, "Failed to remove native call listeners");
            }
        }

        if let Some(pump) = self.action_pump.lock().take() {
            pump.abort();
        }

        *self.callbacks.write() = NativeCallbacks::default();
        *self.ready.lock() = None;
        info!("PlatformCallAdapter: cleaned up");
    }
}

impl fmt::Debug for PlatformCallAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlatformCallAdapter")
            .field("platform", &self.platform)
            .field("capabilities", &self.capabilities)
            .field("has_backend", &self.backend.is_some())
            .field("ready", &*self.ready.lock())
            .finish()
    }
}

impl Drop for PlatformCallAdapter {
    fn drop(&mut self) {
        if let Some(pump) = self.action_pump.get_mut().take() {
            pump.abort();
        }
    }
}

fn boxed_callback<F, Fut>(callback: F) -> NativeActionCallback
where
    F: Fn(CallId) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |call_id| callback(call_id).boxed())
}

async fn pump_actions(
    mut actions: mpsc::UnboundedReceiver<NativeCallAction>,
    callbacks: Arc<RwLock<NativeCallbacks>>,
) {
    while let Some(action) = actions.recv().await {
        dispatch(&callbacks, action).await;
    }
    debug!("Native action channel closed");
}

async fn dispatch(callbacks: &RwLock<NativeCallbacks>, action: NativeCallAction) -> bool {
    let callback = {
        let callbacks = callbacks.read();
        match &action {
            NativeCallAction::Answer(_) => callbacks.on_answer.clone(),
            NativeCallAction::End(_) => callbacks.on_end.clone(),
            NativeCallAction::Reject(_) => callbacks.on_reject.clone(),
            NativeCallAction::DidDisplayIncomingCall {
                call_id,
                from_push_kit,
            } => {
                debug!(%call_id, from_push_kit, "Native UI displayed incoming call");
                return false;
            }
            NativeCallAction::SetMuted { call_id, muted } => {
                debug!(%call_id, muted, "Native mute toggled");
                return false;
            }
        }
    };

    let call_id = action.call_id().clone();
    match callback {
        Some(callback) => {
            info!(%call_id, ?action, "Native call action");
            callback(call_id).await;
            true
        }
        None => {
            warn!(%call_id, ?action, "No callback registered for native action");
            false
        }
    }
}
