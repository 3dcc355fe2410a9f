//! Inbound call signals
//!
//! Socket events, push notifications, VoIP pushes and foreground-delivered
//! local notifications all normalise into one [`IncomingCallSignal`] and
//! enter the system through
//! [`CallNotificationService::handle_incoming_call`](crate::notification::CallNotificationService::handle_incoming_call).
//! Deduplication happens there, keyed by channel, never per transport.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::call::{CallParams, Channel, PhoneNumber};
use crate::error::{CallError, CallResult};

/// Payload `type` tag for call signals
pub const INCOMING_CALL_TYPE: &str = "incoming_call";

/// Delivery path a signal arrived on; used for logging only
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    /// Realtime socket `incomingCall` event
    Socket,
    /// Regular push notification
    Push,
    /// iOS VoIP push (PushKit)
    VoipPush,
    /// A call notification delivered while the app was in the foreground
    ForegroundNotification,
    #[default]
    Unspecified,
}

impl fmt::Display for SignalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SignalSource::Socket => "socket",
            SignalSource::Push => "push",
            SignalSource::VoipPush => "voip_push",
            SignalSource::ForegroundNotification => "foreground_notification",
            SignalSource::Unspecified => "unspecified",
        };
        f.write_str(name)
    }
}

/// Signal kind tag; only call initiation is modelled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalKind {
    #[default]
    #[serde(rename = "incoming_call")]
    IncomingCall,
}

/// A "call is ringing for you" signal, as delivered on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingCallSignal {
    #[serde(rename = "type", default)]
    pub kind: SignalKind,
    pub caller_phone: String,
    /// Missing on some VoIP pushes; the local user's number is used then
    #[serde(default)]
    pub callee_phone: Option<String>,
    pub channel: String,
    #[serde(default)]
    pub caller_name: Option<String>,
    #[serde(default)]
    pub has_video: Option<bool>,
    #[serde(skip)]
    pub source: SignalSource,
}

impl IncomingCallSignal {
    pub fn new(
        caller_phone: impl Into<String>,
        callee_phone: impl Into<String>,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            kind: SignalKind::IncomingCall,
            caller_phone: caller_phone.into(),
            callee_phone: Some(callee_phone.into()),
            channel: channel.into(),
            caller_name: None,
            has_video: None,
            source: SignalSource::Unspecified,
        }
    }

    pub fn with_caller_name(mut self, name: impl Into<String>) -> Self {
        self.caller_name = Some(name.into());
        self
    }

    pub fn with_video(mut self, has_video: bool) -> Self {
        self.has_video = Some(has_video);
        self
    }

    pub fn with_source(mut self, source: SignalSource) -> Self {
        self.source = source;
        self
    }

    /// Parse a raw push / notification data payload.
    ///
    /// Returns `Ok(None)` when the payload is not a call signal at all
    /// (other notification types share the same delivery path), and
    /// [`CallError::MalformedSignal`] when it claims to be one but lacks
    /// the caller or channel.
    pub fn from_payload(payload: &Value, source: SignalSource) -> CallResult<Option<Self>> {
        let object = payload
            .as_object()
            .ok_or_else(|| CallError::malformed("payload is not a JSON object"))?;

        match object.get("type").and_then(Value::as_str) {
            Some(INCOMING_CALL_TYPE) => {}
            // VoIP pushes carry no type tag; everything they deliver is a call
            None if source == SignalSource::VoipPush => {}
            _ => return Ok(None),
        }

        let text = |key: &str| {
            object
                .get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let caller_phone = text("callerPhone")
            .ok_or_else(|| CallError::malformed("missing callerPhone"))?;
        let channel = text("channel").ok_or_else(|| CallError::malformed("missing channel"))?;

        Ok(Some(Self {
            kind: SignalKind::IncomingCall,
            caller_phone,
            callee_phone: text("calleePhone"),
            channel,
            caller_name: text("callerName"),
            has_video: object.get("hasVideo").and_then(Value::as_bool),
            source,
        }))
    }

    /// Validate and convert into admission parameters.
    ///
    /// `local_user` fills a missing callee; `default_has_video` fills a
    /// missing capability flag.
    pub fn to_params(
        &self,
        local_user: Option<&PhoneNumber>,
        default_has_video: bool,
    ) -> CallResult<CallParams> {
        let channel = Channel::new(self.channel.clone())?;
        let caller_phone = PhoneNumber::parse(&self.caller_phone)?;
        let callee_phone = match (&self.callee_phone, local_user) {
            (Some(raw), _) => PhoneNumber::parse(raw)?,
            (None, Some(local)) => local.clone(),
            (None, None) => return Err(CallError::malformed("missing calleePhone")),
        };

        Ok(CallParams {
            channel,
            caller_phone,
            callee_phone,
            caller_name: self.caller_name.clone().filter(|n| !n.trim().is_empty()),
            has_video: self.has_video.unwrap_or(default_has_video),
        })
    }
}
