//! Native call UI backend seam
//!
//! A [`NativeCallBackend`] wraps whatever OS call subsystem is linked into
//! the host application (CallKit on iOS, ConnectionService on Android).
//! The adapter only ever talks to this trait; user actions on the OS call
//! screen come back as [`NativeCallAction`]s over the channel handed to
//! [`NativeCallBackend::setup`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::call::{CallId, CallSession, PhoneNumber};
use crate::config::NativeCallOptions;
use crate::contact::UNKNOWN_CALLER_LABEL;
use crate::error::PlatformError;

/// Sender half for native user actions
pub type NativeActionSender = mpsc::UnboundedSender<NativeCallAction>;

/// How the OS should interpret the call handle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandleType {
    #[default]
    Generic,
    Number,
    Email,
}

/// What the native call screen is asked to show
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeIncomingCall {
    /// Native call UUID; the session's call id
    pub call_id: CallId,
    pub handle: PhoneNumber,
    pub handle_type: HandleType,
    pub display_name: String,
    pub has_video: bool,
}

impl NativeIncomingCall {
    pub fn from_session(session: &CallSession) -> Self {
        Self {
            call_id: session.call_id.clone(),
            handle: session.caller_phone.clone(),
            handle_type: HandleType::Generic,
            display_name: session
                .caller_name
                .clone()
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| UNKNOWN_CALLER_LABEL.to_string()),
            has_video: session.has_video,
        }
    }
}

/// A user action performed on the OS call screen
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeCallAction {
    Answer(CallId),
    /// Hang up, or dismiss before answering on platforms without reject
    End(CallId),
    Reject(CallId),
    /// The OS confirmed it is showing the ring UI
    DidDisplayIncomingCall { call_id: CallId, from_push_kit: bool },
    SetMuted { call_id: CallId, muted: bool },
}

impl NativeCallAction {
    pub fn call_id(&self) -> &CallId {
        match self {
            NativeCallAction::Answer(id)
            | NativeCallAction::End(id)
            | NativeCallAction::Reject(id) => id,
            NativeCallAction::DidDisplayIncomingCall { call_id, .. }
            | NativeCallAction::SetMuted { call_id, .. } => call_id,
        }
    }
}

/// OS call subsystem operations used by the adapter
#[async_trait]
pub trait NativeCallBackend: Send + Sync {
    /// Register with the OS and start forwarding user actions to `actions`
    async fn setup(
        &self,
        options: &NativeCallOptions,
        actions: NativeActionSender,
    ) -> Result<(), PlatformError>;

    /// Show the native ringing screen
    async fn display_incoming_call(&self, call: &NativeIncomingCall) -> Result<(), PlatformError>;

    /// Tell the OS the call is now connected
    fn report_call_connected(
        &self,
        call_id: &CallId,
        handle: &PhoneNumber,
        display_name: &str,
    ) -> Result<(), PlatformError>;

    /// Tear down the native call UI for `call_id`
    fn end_call(&self, call_id: &CallId) -> Result<(), PlatformError>;

    /// Stop forwarding user actions
    fn remove_listeners(&self) -> Result<(), PlatformError>;
}
