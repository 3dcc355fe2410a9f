//! Builder wiring the call core components
//!
//! Every component is an explicitly constructed, owned instance; the
//! builder is the one place that knows how they fit together.
//!
//! ```rust
//! use callsync_client_core::builder::CallCoreBuilder;
//! use callsync_client_core::mock::{RecordingNavigator, RecordingPresenter, RecordingTransport, RecordingVibrator};
//! use callsync_client_core::platform::Platform;
//! use std::sync::Arc;
//!
//! let orchestrator = CallCoreBuilder::new()
//!     .user_phone("+49 170 5678")
//!     .platform(Platform::Desktop)
//!     .presenter(Arc::new(RecordingPresenter::new()))
//!     .vibrator(Arc::new(RecordingVibrator::new()))
//!     .transport(Arc::new(RecordingTransport::connected()))
//!     .navigator(Arc::new(RecordingNavigator::new()))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(orchestrator.user_phone().as_str(), "+491705678");
//! ```

use std::sync::Arc;

use crate::call::PhoneNumber;
use crate::config::CallCoreConfig;
use crate::contact::ContactResolver;
use crate::error::{CallError, CallResult};
use crate::notification::{CallNotificationService, NotificationPresenter, Vibrator};
use crate::orchestrator::{CallNavigator, CallOrchestrator};
use crate::platform::{NativeCallBackend, Platform, PlatformCallAdapter};
use crate::state_manager::CallStateManager;
use crate::transport::RealtimeTransport;

/// Builder for a fully wired [`CallOrchestrator`]
pub struct CallCoreBuilder {
    config: CallCoreConfig,
    user_phone: Option<String>,
    platform: Platform,
    native_backend: Option<Arc<dyn NativeCallBackend>>,
    presenter: Option<Arc<dyn NotificationPresenter>>,
    vibrator: Option<Arc<dyn Vibrator>>,
    transport: Option<Arc<dyn RealtimeTransport>>,
    navigator: Option<Arc<dyn CallNavigator>>,
    contacts: Option<Arc<dyn ContactResolver>>,
}

impl CallCoreBuilder {
    pub fn new() -> Self {
        Self {
            config: CallCoreConfig::default(),
            user_phone: None,
            platform: Platform::current(),
            native_backend: None,
            presenter: None,
            vibrator: None,
            transport: None,
            navigator: None,
            contacts: None,
        }
    }

    pub fn config(mut self, config: CallCoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Modify the configuration in place
    pub fn with_config<F>(mut self, f: F) -> Self
    where
        F: FnOnce(CallCoreConfig) -> CallCoreConfig,
    {
        self.config = f(self.config);
        self
    }

    /// Local user's phone identifier (required)
    pub fn user_phone(mut self, phone: impl Into<String>) -> Self {
        self.user_phone = Some(phone.into());
        self
    }

    /// Override the detected platform
    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// OS call subsystem; without one, calls always use the notification fallback
    pub fn native_backend(mut self, backend: Arc<dyn NativeCallBackend>) -> Self {
        self.native_backend = Some(backend);
        self
    }

    pub fn presenter(mut self, presenter: Arc<dyn NotificationPresenter>) -> Self {
        self.presenter = Some(presenter);
        self
    }

    pub fn vibrator(mut self, vibrator: Arc<dyn Vibrator>) -> Self {
        self.vibrator = Some(vibrator);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn RealtimeTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn navigator(mut self, navigator: Arc<dyn CallNavigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    pub fn contact_resolver(mut self, contacts: Arc<dyn ContactResolver>) -> Self {
        self.contacts = Some(contacts);
        self
    }

    /// Validate and wire everything. Nothing is initialised until
    /// [`CallOrchestrator::start`].
    pub fn build(self) -> CallResult<Arc<CallOrchestrator>> {
        self.config.validate()?;

        let user_phone = PhoneNumber::parse(
            self.user_phone
                .as_deref()
                .ok_or_else(|| CallError::config("user_phone", "is required"))?,
        )?;
        let presenter = self
            .presenter
            .ok_or_else(|| CallError::config("presenter", "is required"))?;
        let vibrator = self
            .vibrator
            .ok_or_else(|| CallError::config("vibrator", "is required"))?;
        let transport = self
            .transport
            .ok_or_else(|| CallError::config("transport", "is required"))?;
        let navigator = self
            .navigator
            .ok_or_else(|| CallError::config("navigator", "is required"))?;

        let state_manager = Arc::new(CallStateManager::with_retention(
            self.config.history_limit,
            self.config.ended_channel_retention,
        ));
        let platform = Arc::new(PlatformCallAdapter::new(
            self.platform,
            self.native_backend,
            self.config.native.clone(),
            self.config.native_call_timeout,
        ));

        let mut notifications = CallNotificationService::new(
            Arc::clone(&state_manager),
            Arc::clone(&platform),
            presenter,
            vibrator,
            &self.config,
        );
        if let Some(contacts) = self.contacts {
            notifications = notifications.with_contact_resolver(contacts);
        }

        Ok(Arc::new(CallOrchestrator::new(
            user_phone,
            state_manager,
            platform,
            Arc::new(notifications),
            transport,
            navigator,
        )))
    }
}

impl Default for CallCoreBuilder {
    fn default() -> Self {
        Self::new()
    }
}
