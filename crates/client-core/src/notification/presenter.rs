//! Local notification seam and call notification payloads

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::call::{CallId, CallSession, Channel, PhoneNumber};
use crate::config::NotificationConfig;
use crate::error::NotificationError;
use crate::platform::Platform;
use crate::signal::{SignalKind, INCOMING_CALL_TYPE};

/// Identifier of an action button on the call notification
pub const ANSWER_ACTION_ID: &str = "answer";
pub const DECLINE_ACTION_ID: &str = "decline";

/// OS identifier of a presented notification
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationId(String);

impl NotificationId {
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Android notification channel for call alerts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationChannelSpec {
    pub id: String,
    pub name: String,
    pub description: String,
    pub max_importance: bool,
    pub vibration_pattern_ms: Vec<u64>,
    pub light_color: String,
    pub public_on_lockscreen: bool,
    pub show_badge: bool,
}

impl NotificationChannelSpec {
    pub fn from_config(config: &NotificationConfig) -> Self {
        Self {
            id: config.channel_id.clone(),
            name: config.channel_name.clone(),
            description: config.channel_description.clone(),
            max_importance: true,
            vibration_pattern_ms: config.vibration_pattern_ms.clone(),
            light_color: config.accent_color.clone(),
            public_on_lockscreen: true,
            show_badge: true,
        }
    }
}

/// A button attached to a notification category
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionButton {
    pub identifier: String,
    pub title: String,
    pub opens_app_to_foreground: bool,
    pub is_destructive: bool,
}

/// Notification category carrying the answer/decline buttons
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationCategorySpec {
    pub id: String,
    pub actions: Vec<ActionButton>,
}

impl NotificationCategorySpec {
    pub fn from_config(config: &NotificationConfig) -> Self {
        Self {
            id: config.category_id.clone(),
            actions: vec![
                ActionButton {
                    identifier: ANSWER_ACTION_ID.to_string(),
                    title: config.answer_title.clone(),
                    opens_app_to_foreground: true,
                    is_destructive: false,
                },
                ActionButton {
                    identifier: DECLINE_ACTION_ID.to_string(),
                    title: config.decline_title.clone(),
                    opens_app_to_foreground: false,
                    is_destructive: true,
                },
            ],
        }
    }
}

/// Data attached to a call notification; read back on tap or action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    #[serde(rename = "type")]
    pub kind: SignalKind,
    pub call_id: CallId,
    pub channel: Channel,
    pub caller_phone: PhoneNumber,
    pub callee_phone: PhoneNumber,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caller_name: Option<String>,
    pub has_video: bool,
}

impl NotificationPayload {
    pub fn from_session(session: &CallSession) -> Self {
        Self {
            kind: SignalKind::IncomingCall,
            call_id: session.call_id.clone(),
            channel: session.channel.clone(),
            caller_phone: session.caller_phone.clone(),
            callee_phone: session.callee_phone.clone(),
            caller_name: session.caller_name.clone(),
            has_video: session.has_video,
        }
    }
}

/// Whether raw notification data belongs to a call notification
pub fn is_call_payload(data: &Value) -> bool {
    data.get("type").and_then(Value::as_str) == Some(INCOMING_CALL_TYPE)
}

/// Call id carried by raw notification data, if any
pub fn payload_call_id(data: &Value) -> Option<CallId> {
    data.get("callId")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(CallId::from_string)
}

/// A call-style local notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallNotification {
    pub title: String,
    pub body: String,
    pub category_id: String,
    /// Android channel; `None` elsewhere
    pub channel_id: Option<String>,
    pub play_sound: bool,
    pub vibration_pattern_ms: Option<Vec<u64>>,
    pub color: Option<String>,
    /// Not swipe-dismissable where the platform allows
    pub sticky: bool,
    pub auto_dismiss: bool,
    pub badge: Option<u32>,
    pub payload: NotificationPayload,
}

impl CallNotification {
    pub fn for_session(session: &CallSession, config: &NotificationConfig, platform: Platform) -> Self {
        let android = platform == Platform::Android;
        Self {
            title: session.caller_label().to_string(),
            body: config.body_for(session.has_video).to_string(),
            category_id: config.category_id.clone(),
            channel_id: android.then(|| config.channel_id.clone()),
            play_sound: true,
            vibration_pattern_ms: android.then(|| config.vibration_pattern_ms.clone()),
            color: android.then(|| config.accent_color.clone()),
            sticky: true,
            auto_dismiss: false,
            badge: Some(1),
            payload: NotificationPayload::from_session(session),
        }
    }
}

/// A notification currently shown by the OS
#[derive(Debug, Clone, PartialEq)]
pub struct PresentedNotification {
    pub id: NotificationId,
    pub data: Value,
}

/// What the user did with a call notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationAction {
    Answer,
    Decline,
    /// Bare tap on the notification body
    Open,
}

impl NotificationAction {
    /// Map an OS action identifier; unknown or missing ids are a plain tap
    pub fn from_identifier(identifier: Option<&str>) -> Self {
        match identifier {
            Some(ANSWER_ACTION_ID) => NotificationAction::Answer,
            Some(DECLINE_ACTION_ID) => NotificationAction::Decline,
            _ => NotificationAction::Open,
        }
    }
}

/// A user response delivered by the OS
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationResponse {
    pub action_identifier: Option<String>,
    pub data: Value,
}

impl NotificationResponse {
    pub fn action(&self) -> NotificationAction {
        NotificationAction::from_identifier(self.action_identifier.as_deref())
    }
}

/// Local notification subsystem
#[async_trait]
pub trait NotificationPresenter: Send + Sync {
    /// Register the Android notification channel
    async fn configure_channel(&self, spec: &NotificationChannelSpec) -> Result<(), NotificationError>;

    /// Register the category with answer/decline actions
    async fn configure_category(
        &self,
        spec: &NotificationCategorySpec,
    ) -> Result<(), NotificationError>;

    /// Show a notification immediately
    async fn present(&self, notification: &CallNotification)
        -> Result<NotificationId, NotificationError>;

    /// Notifications currently on screen
    async fn presented(&self) -> Result<Vec<PresentedNotification>, NotificationError>;

    async fn dismiss(&self, id: &NotificationId) -> Result<(), NotificationError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::call::{CallDirection, CallParams};
    use serde_json::json;

    fn session(has_video: bool) -> CallSession {
        CallSession::new(
            CallParams {
                channel: Channel::new("call_abc").unwrap(),
                caller_phone: PhoneNumber::parse("+491234").unwrap(),
                callee_phone: PhoneNumber::parse("+495678").unwrap(),
                caller_name: None,
                has_video,
            },
            CallDirection::Incoming,
        )
    }

    #[test]
    fn test_action_identifiers() {
        assert_eq!(NotificationAction::from_identifier(Some("answer")), NotificationAction::Answer);
        assert_eq!(NotificationAction::from_identifier(Some("decline")), NotificationAction::Decline);
        assert_eq!(NotificationAction::from_identifier(None), NotificationAction::Open);
        assert_eq!(
            NotificationAction::from_identifier(Some("expo.modules.notifications.actions.DEFAULT")),
            NotificationAction::Open
        );
    }

    #[test]
    fn test_android_notification_is_sticky_on_call_channel() {
        let config = NotificationConfig::default();
        let notification = CallNotification::for_session(&session(true), &config, Platform::Android);

        assert!(notification.sticky);
        assert!(!notification.auto_dismiss);
        assert_eq!(notification.channel_id.as_deref(), Some("incoming-calls"));
        assert_eq!(notification.title, "+491234");
        assert_eq!(notification.body, config.video_call_label);

        let ios = CallNotification::for_session(&session(false), &config, Platform::Ios);
        assert!(ios.channel_id.is_none());
        assert_eq!(ios.body, config.audio_call_label);
    }

    #[test]
    fn test_payload_round_trips_through_json() {
        let session = session(true);
        let data = serde_json::to_value(NotificationPayload::from_session(&session)).unwrap();

        assert!(is_call_payload(&data));
        assert_eq!(payload_call_id(&data), Some(session.call_id.clone()));
        assert_eq!(data["channel"], "call_abc");
        assert!(!is_call_payload(&json!({ "type": "message" })));
    }

    #[test]
    fn test_payload_with_blank_channel_is_rejected() {
        let mut data = serde_json::to_value(NotificationPayload::from_session(&session(true))).unwrap();
        data["channel"] = json!("");

        assert!(serde_json::from_value::<NotificationPayload>(data).is_err());
    }

    #[test]
    fn test_category_has_answer_and_decline() {
        let spec = NotificationCategorySpec::from_config(&NotificationConfig::default());
        let ids: Vec<_> = spec.actions.iter().map(|a| a.identifier.as_str()).collect();
        assert_eq!(ids, vec!["answer", "decline"]);
        assert!(spec.actions[1].is_destructive);
    }
}
