//! # CallSync Client Core - Call Session State Machine
//!
//! This crate decides what an incoming or outgoing call *is* at any moment
//! on a mobile client, and keeps that answer consistent while signals for
//! the same call race in over two independent paths: a realtime socket
//! (only while connected) and OS push / VoIP push (even when backgrounded,
//! possibly duplicated).
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      CallOrchestrator                        │
//! │   socket events · push payloads · navigation · peer notify   │
//! └──────────────┬───────────────────────────────┬───────────────┘
//!                │                               │
//!  ┌─────────────▼─────────────┐   ┌─────────────▼─────────────┐
//!  │  CallNotificationService  │   │    PlatformCallAdapter    │
//!  │ ingestion funnel, ringing │──▶│  native call UI, fallback │
//!  │  notification fallback    │   │  detection, OS callbacks  │
//!  └─────────────┬─────────────┘   └───────────────────────────┘
//!                │
//!  ┌─────────────▼─────────────┐
//!  │     CallStateManager      │  single active-call slot,
//!  │  guarded transitions +    │  bounded history,
//!  │  ordered CallEvent fan-out│  synchronous events
//!  └───────────────────────────┘
//! ```
//!
//! Every call signal, whichever path delivered it, goes through
//! [`CallNotificationService::handle_incoming_call`]; the state manager's
//! channel guard is the only deduplication mechanism.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use callsync_client_core::{CallCoreBuilder, SignalSource};
//! use callsync_client_core::mock::{RecordingNavigator, RecordingPresenter, RecordingTransport, RecordingVibrator};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let core = CallCoreBuilder::new()
//!         .user_phone("+495678")
//!         .presenter(Arc::new(RecordingPresenter::new()))
//!         .vibrator(Arc::new(RecordingVibrator::new()))
//!         .transport(Arc::new(RecordingTransport::connected()))
//!         .navigator(Arc::new(RecordingNavigator::new()))
//!         .build()?;
//!     core.start().await?;
//!
//!     let push = json!({
//!         "type": "incoming_call",
//!         "callerPhone": "+491234",
//!         "calleePhone": "+495678",
//!         "channel": "call_abc",
//!     });
//!     core.handle_push_payload(&push, SignalSource::Push).await?;
//!     core.answer_call().await;
//!
//!     core.end_call();
//!     core.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod call;
pub mod config;
pub mod contact;
pub mod error;
pub mod events;
pub mod logging;
pub mod notification;
pub mod orchestrator;
pub mod platform;
pub mod recovery;
pub mod signal;
pub mod state_manager;
pub mod transport;

#[cfg(any(test, feature = "mock-platform"))]
pub mod mock;

pub use builder::CallCoreBuilder;
pub use call::{CallDirection, CallId, CallParams, CallSession, CallState, Channel, PhoneNumber};
pub use config::{CallCoreConfig, NativeCallOptions, NotificationConfig, RingConfig};
pub use contact::{ContactBook, ContactInfo, ContactResolver};
pub use error::{CallError, CallResult, ErrorCategory, NotificationError, PlatformError, TransportError};
pub use events::{CallEvent, CallEventBus, EndReason, EventStream, SubscriptionId};
pub use notification::{CallNotificationService, IngestOutcome, NotificationPresenter, ResponseOutcome, Vibrator};
pub use orchestrator::{CallNavigator, CallOrchestrator, CallScreenRoute};
pub use platform::{NativeCallBackend, Platform, PlatformCallAdapter, PlatformCapabilities};
pub use signal::{IncomingCallSignal, SignalSource};
pub use state_manager::{AdmitOutcome, CallStateManager, RejectReason, TransitionOutcome};
pub use transport::{OutboundMessage, RealtimeTransport, TransportEvent};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
