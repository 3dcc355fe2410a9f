//! Shared harness for the integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use callsync_client_core::mock::{
    MockNativeBackend, RecordingNavigator, RecordingPresenter, RecordingTransport,
    RecordingVibrator,
};
use callsync_client_core::{CallCoreBuilder, CallCoreConfig, CallOrchestrator, Platform};
use serde_json::{json, Value};

pub const ME: &str = "+495678";
pub const PEER: &str = "+491234";

pub struct Harness {
    pub core: Arc<CallOrchestrator>,
    pub native: Option<Arc<MockNativeBackend>>,
    pub presenter: Arc<RecordingPresenter>,
    pub vibrator: Arc<RecordingVibrator>,
    pub transport: Arc<RecordingTransport>,
    pub navigator: Arc<RecordingNavigator>,
}

pub struct HarnessBuilder {
    platform: Platform,
    native: Option<MockNativeBackend>,
    transport: RecordingTransport,
    config: CallCoreConfig,
}

impl HarnessBuilder {
    /// Desktop, no native backend, connected transport
    pub fn new() -> Self {
        Self {
            platform: Platform::Desktop,
            native: None,
            transport: RecordingTransport::connected(),
            config: CallCoreConfig::default(),
        }
    }

    /// iOS with the given native backend
    pub fn native(mut self, backend: MockNativeBackend) -> Self {
        self.platform = Platform::Ios;
        self.native = Some(backend);
        self
    }

    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn disconnected(mut self) -> Self {
        self.transport = RecordingTransport::new();
        self
    }

    pub fn config(mut self, config: CallCoreConfig) -> Self {
        self.config = config;
        self
    }

    pub async fn start(self) -> Harness {
        let presenter = Arc::new(RecordingPresenter::new());
        let vibrator = Arc::new(RecordingVibrator::new());
        let transport = Arc::new(self.transport);
        let navigator = Arc::new(RecordingNavigator::new());
        let native = self.native.map(Arc::new);

        let mut builder = CallCoreBuilder::new()
            .config(self.config)
            .user_phone(ME)
            .platform(self.platform)
            .presenter(presenter.clone())
            .vibrator(vibrator.clone())
            .transport(transport.clone())
            .navigator(navigator.clone());
        if let Some(native) = &native {
            builder = builder.native_backend(native.clone());
        }

        let core = builder.build().expect("harness should build");
        core.start().await.expect("harness should start");

        Harness {
            core,
            native,
            presenter,
            vibrator,
            transport,
            navigator,
        }
    }
}

impl Harness {
    pub fn native(&self) -> &MockNativeBackend {
        self.native.as_deref().expect("harness has no native backend")
    }
}

/// Data payload of an incoming call push
pub fn call_push(channel: &str) -> Value {
    json!({
        "type": "incoming_call",
        "callerPhone": PEER,
        "calleePhone": ME,
        "channel": channel,
        "callerName": "Anna",
    })
}

/// Socket `incomingCall` payload
pub fn socket_call(channel: &str) -> Value {
    json!({ "from": PEER, "channel": channel })
}

/// Poll `check` until it holds or about a second has passed
pub async fn eventually<F: Fn() -> bool>(check: F) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}
