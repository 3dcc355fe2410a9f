//! Call session data model
//!
//! A [`CallSession`] is the single authoritative record of a call. Only the
//! [`CallStateManager`](crate::state_manager::CallStateManager) creates or
//! mutates sessions; everything else works on cloned snapshots.
//!
//! # State Machine
//!
//! ```text
//!   (none) ──createIncomingCall──▶ Incoming ──answer──▶ Active
//!      │                              │                   │
//!      └──createOutgoingCall──▶ Outgoing                  │
//!                                     │                   │
//!              decline / end / timeout│      end / timeout│
//!                                     ▼                   ▼
//!                                   Ended ◀───────────────┘
//! ```
//!
//! No transition re-enters `Incoming`, and `Ended` is terminal.

use std::fmt;

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::contact::normalize_phone;
use crate::error::{CallError, CallResult};

/// Prefix shared by call ids and locally generated channels
const CALL_PREFIX: &str = "call_";

/// Hex characters kept from the channel digest
const CHANNEL_TOKEN_LEN: usize = 12;

fn random_salt(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect::<String>()
        .to_ascii_lowercase()
}

/// Unique identifier of one call session, stable for its lifetime
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(String);

impl CallId {
    /// Generate a time + random based id (`call_<millis>_<salt>`)
    pub fn generate() -> Self {
        Self(format!(
            "{}{}_{}",
            CALL_PREFIX,
            Utc::now().timestamp_millis(),
            random_salt(6)
        ))
    }

    /// Wrap an id received from a native call backend or notification
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Shared rendezvous identifier known to caller and callee.
///
/// Correlates socket and push signals for the same call and names the
/// media session. Immutable once a session is created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Channel(String);

impl Channel {
    /// Wrap a channel name received from a signal
    pub fn new(name: impl Into<String>) -> CallResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(CallError::malformed("channel must not be empty"));
        }
        Ok(Self(name))
    }

    /// Generate a channel for an outgoing call.
    ///
    /// Hashes caller, callee, timestamp and a random salt down to a short
    /// token. Unique enough for the lifetime of one call; not meant to be
    /// globally unique or unguessable.
    pub fn generate(caller: &PhoneNumber, callee: &PhoneNumber) -> Self {
        let raw = format!(
            "{}_{}_{}_{}",
            caller,
            callee,
            Utc::now().timestamp_millis(),
            random_salt(6)
        );
        let digest = Sha256::digest(raw.as_bytes());
        let token: String = digest
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect::<String>()
            .chars()
            .take(CHANNEL_TOKEN_LEN)
            .collect();
        Self(format!("{}{}", CALL_PREFIX, token))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Channel {
    type Error = CallError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Channel> for String {
    fn from(channel: Channel) -> Self {
        channel.0
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalised phone identifier (`+` and digits only)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Normalise and wrap a phone identifier
    pub fn parse(input: &str) -> CallResult<Self> {
        let normalized = normalize_phone(input);
        if normalized.trim_start_matches('+').is_empty() {
            return Err(CallError::InvalidPhoneNumber {
                input: input.to_string(),
            });
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PhoneNumber {
    type Error = CallError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PhoneNumber> for String {
    fn from(phone: PhoneNumber) -> Self {
        phone.0
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of a call session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallState {
    /// Ringing on the callee side, not yet answered
    Incoming,
    /// Placed by the local user, waiting for the peer
    Outgoing,
    /// Answered and connected
    Active,
    /// Terminal
    Ended,
}

impl CallState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallState::Ended)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallState::Incoming => "incoming",
            CallState::Outgoing => "outgoing",
            CallState::Active => "active",
            CallState::Ended => "ended",
        }
    }
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side created the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    Incoming,
    Outgoing,
}

/// Parameters for admitting a new session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallParams {
    pub channel: Channel,
    pub caller_phone: PhoneNumber,
    pub callee_phone: PhoneNumber,
    pub caller_name: Option<String>,
    pub has_video: bool,
}

/// The single call record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallSession {
    pub call_id: CallId,
    pub channel: Channel,
    pub caller_phone: PhoneNumber,
    pub callee_phone: PhoneNumber,
    pub caller_name: Option<String>,
    pub has_video: bool,
    pub call_state: CallState,
    pub direction: CallDirection,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl CallSession {
    pub(crate) fn new(params: CallParams, direction: CallDirection) -> Self {
        let call_state = match direction {
            CallDirection::Incoming => CallState::Incoming,
            CallDirection::Outgoing => CallState::Outgoing,
        };
        Self {
            call_id: CallId::generate(),
            channel: params.channel,
            caller_phone: params.caller_phone,
            callee_phone: params.callee_phone,
            caller_name: params.caller_name,
            has_video: params.has_video,
            call_state,
            direction,
            start_time: Utc::now(),
            end_time: None,
        }
    }

    pub(crate) fn mark_ended(&mut self) {
        self.call_state = CallState::Ended;
        self.end_time = Some(Utc::now());
    }

    pub fn is_terminal(&self) -> bool {
        self.call_state.is_terminal()
    }

    /// The other party, seen from `local`
    pub fn peer_of(&self, local: &PhoneNumber) -> &PhoneNumber {
        if &self.caller_phone == local {
            &self.callee_phone
        } else {
            &self.caller_phone
        }
    }

    /// Caller label for call UI: the resolved name, else the number
    pub fn caller_label(&self) -> &str {
        self.caller_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| self.caller_phone.as_str())
    }

    /// Time from creation to the terminal transition, if ended
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.end_time.map(|end| end - self.start_time)
    }
}
