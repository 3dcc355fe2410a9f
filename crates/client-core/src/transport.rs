//! Realtime socket transport: wire events and the send seam
//!
//! The socket itself lives in the host application. It hands received
//! events to [`TransportEvent::from_wire`] and implements
//! [`RealtimeTransport`] for the three messages the call core sends.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::call::PhoneNumber;
use crate::error::{CallError, CallResult, TransportError};

/// `incomingCall` action value that means "the call ended"
const END_ACTION: &str = "end";

/// Messages the call core sends to the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    /// Bind this connection to the local user; sent on every (re)connect
    Register { user_phone: PhoneNumber },
    /// Ask the server to ring `to`
    CallRequest {
        from: PhoneNumber,
        to: PhoneNumber,
        channel: String,
    },
    /// Tell the peer the local user ended the call
    CallEnded {
        from: PhoneNumber,
        to: PhoneNumber,
        channel: String,
    },
}

impl OutboundMessage {
    /// Socket event name
    pub fn event_name(&self) -> &'static str {
        match self {
            OutboundMessage::Register { .. } => "register",
            OutboundMessage::CallRequest { .. } => "callRequest",
            OutboundMessage::CallEnded { .. } => "callEnded",
        }
    }

    /// Socket event payload
    pub fn payload(&self) -> Value {
        match self {
            OutboundMessage::Register { user_phone } => Value::String(user_phone.to_string()),
            OutboundMessage::CallRequest { from, to, channel }
            | OutboundMessage::CallEnded { from, to, channel } => json!({
                "from": from,
                "to": to,
                "channel": channel,
            }),
        }
    }
}

/// Events received from the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Connected,
    Disconnected { reason: Option<String> },
    /// A call is ringing for the local user
    IncomingCall {
        from: String,
        channel: String,
        caller_name: Option<String>,
    },
    /// The peer ended or cancelled the call on `channel`
    CallEnded { channel: String },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IncomingCallWire {
    #[serde(default)]
    from: Option<String>,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    caller_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CallEndedWire {
    #[serde(default)]
    channel: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl TransportEvent {
    /// Decode a named socket event.
    ///
    /// `incomingCall` with `action: "end"` decodes as [`TransportEvent::CallEnded`].
    /// Names the call core does not consume yield [`TransportError::UnknownEvent`].
    pub fn from_wire(name: &str, payload: Value) -> CallResult<Self> {
        match name {
            "connect" => Ok(TransportEvent::Connected),
            "disconnect" => Ok(TransportEvent::Disconnected {
                reason: payload.as_str().map(str::to_string),
            }),
            "incomingCall" => {
                let wire: IncomingCallWire = serde_json::from_value(payload)?;
                let channel = non_empty(wire.channel)
                    .ok_or_else(|| CallError::malformed("incomingCall without channel"))?;

                if wire.action.as_deref() == Some(END_ACTION) {
                    return Ok(TransportEvent::CallEnded { channel });
                }

                let from = non_empty(wire.from)
                    .ok_or_else(|| CallError::malformed("incomingCall without from"))?;
                Ok(TransportEvent::IncomingCall {
                    from,
                    channel,
                    caller_name: non_empty(wire.caller_name),
                })
            }
            "callEnded" => {
                let wire: CallEndedWire = serde_json::from_value(payload)?;
                let channel = non_empty(wire.channel)
                    .ok_or_else(|| CallError::malformed("callEnded without channel"))?;
                Ok(TransportEvent::CallEnded { channel })
            }
            other => Err(TransportError::UnknownEvent {
                name: other.to_string(),
            }
            .into()),
        }
    }
}

/// Outbound side of the realtime socket.
///
/// Sends are fire-and-forget; an implementation queues or fails fast but
/// never blocks.
pub trait RealtimeTransport: Send + Sync {
    fn emit(&self, message: OutboundMessage) -> Result<(), TransportError>;

    fn is_connected(&self) -> bool;
}

/// Wire shape of a transport event, for hosts that forward raw frames
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireFrame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl WireFrame {
    pub fn decode(self) -> CallResult<TransportEvent> {
        TransportEvent::from_wire(&self.event, self.data)
    }
}

impl From<&OutboundMessage> for WireFrame {
    fn from(message: &OutboundMessage) -> Self {
        Self {
            event: message.event_name().to_string(),
            data: message.payload(),
        }
    }
}
