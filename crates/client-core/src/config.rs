//! Call core configuration
//!
//! [`CallCoreConfig`] groups everything the components need that is not a
//! collaborator: history bounds, ringing behaviour, notification texts and
//! native call UI options. All structures are serde-serialisable so they
//! can be loaded from the host application's JSON settings.
//!
//! # Usage Examples
//!
//! ```rust
//! use callsync_client_core::config::{CallCoreConfig, RingConfig};
//! use std::time::Duration;
//!
//! let config = CallCoreConfig::new()
//!     .with_history_limit(20)
//!     .with_ring(RingConfig::default().with_ring_timeout(Duration::from_secs(45)))
//!     .with_default_video(false);
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.ring.ring_timeout, Some(Duration::from_secs(45)));
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CallError, CallResult};

/// Ended sessions retained for diagnostics
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// How long an ended channel keeps rejecting late signals
pub const DEFAULT_ENDED_CHANNEL_RETENTION: Duration = Duration::from_secs(60 * 60);

/// Ringing (vibration loop) settings for the notification fallback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RingConfig {
    /// Vibration pattern in milliseconds (alternating wait / vibrate)
    pub vibration_pattern_ms: Vec<u64>,
    /// Repeat the pattern until stopped
    pub repeat: bool,
    /// Length of the periodic emphasis pulse
    pub pulse_duration: Duration,
    /// Interval between emphasis pulses
    pub pulse_interval: Duration,
    /// Auto-timeout for an unanswered ring; `None` rings until a terminal event
    pub ring_timeout: Option<Duration>,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            vibration_pattern_ms: vec![500, 1000, 500, 1000],
            repeat: true,
            pulse_duration: Duration::from_millis(1000),
            pulse_interval: Duration::from_millis(3000),
            ring_timeout: None,
        }
    }
}

impl RingConfig {
    pub fn with_ring_timeout(mut self, timeout: Duration) -> Self {
        self.ring_timeout = Some(timeout);
        self
    }

    pub fn with_pulse(mut self, duration: Duration, interval: Duration) -> Self {
        self.pulse_duration = duration;
        self.pulse_interval = interval;
        self
    }

    pub fn with_pattern(mut self, pattern_ms: Vec<u64>) -> Self {
        self.vibration_pattern_ms = pattern_ms;
        self
    }
}

/// Texts and identifiers for the call-style fallback notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// Android notification channel id
    pub channel_id: String,
    pub channel_name: String,
    pub channel_description: String,
    /// iOS notification category id carrying the answer/decline actions
    pub category_id: String,
    pub answer_title: String,
    pub decline_title: String,
    /// Body text for video calls
    pub video_call_label: String,
    /// Body text for audio-only calls
    pub audio_call_label: String,
    /// Channel-level vibration pattern in milliseconds
    pub vibration_pattern_ms: Vec<u64>,
    /// ARGB hex colour for the channel light
    pub accent_color: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            channel_id: "incoming-calls".to_string(),
            channel_name: "Eingehende Anrufe".to_string(),
            channel_description: "Benachrichtigungen für eingehende Videoanrufe".to_string(),
            category_id: "incoming_call".to_string(),
            answer_title: "Annehmen".to_string(),
            decline_title: "Ablehnen".to_string(),
            video_call_label: "Eingehender Videoanruf".to_string(),
            audio_call_label: "Eingehender Anruf".to_string(),
            vibration_pattern_ms: vec![0, 1000, 500, 1000],
            accent_color: "#FF231F7C".to_string(),
        }
    }
}

impl NotificationConfig {
    /// Body text for a call with or without video
    pub fn body_for(&self, has_video: bool) -> &str {
        if has_video {
            &self.video_call_label
        } else {
            &self.audio_call_label
        }
    }
}

/// Options handed to the native call UI backend during setup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NativeCallOptions {
    /// Name shown on the OS call screen
    pub app_name: String,
    pub supports_video: bool,
    pub maximum_call_groups: u32,
    pub maximum_calls_per_group: u32,
    /// Android phone-account permission prompt
    pub permission_alert_title: String,
    pub permission_alert_description: String,
    pub permission_cancel_label: String,
    pub permission_ok_label: String,
    /// Android self-managed ConnectionService
    pub self_managed: bool,
}

impl Default for NativeCallOptions {
    fn default() -> Self {
        Self {
            app_name: "CallSync".to_string(),
            supports_video: true,
            maximum_call_groups: 1,
            maximum_calls_per_group: 1,
            permission_alert_title: "Berechtigung erforderlich".to_string(),
            permission_alert_description:
                "Diese App benötigt Zugriff auf Telefonkonten für Anrufe".to_string(),
            permission_cancel_label: "Abbrechen".to_string(),
            permission_ok_label: "OK".to_string(),
            self_managed: false,
        }
    }
}

/// Top-level configuration for the call core
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallCoreConfig {
    /// Ended sessions kept in history
    pub history_limit: usize,
    /// Window in which a late signal for an ended channel is rejected,
    /// independent of `history_limit`
    pub ended_channel_retention: Duration,
    pub ring: RingConfig,
    pub notifications: NotificationConfig,
    pub native: NativeCallOptions,
    /// Upper bound on each native / OS round-trip
    pub native_call_timeout: Duration,
    /// `hasVideo` assumed when a signal omits it
    pub default_has_video: bool,
}

impl Default for CallCoreConfig {
    fn default() -> Self {
        Self {
            history_limit: DEFAULT_HISTORY_LIMIT,
            ended_channel_retention: DEFAULT_ENDED_CHANNEL_RETENTION,
            ring: RingConfig::default(),
            notifications: NotificationConfig::default(),
            native: NativeCallOptions::default(),
            native_call_timeout: Duration::from_secs(5),
            default_has_video: true,
        }
    }
}

impl CallCoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from JSON; missing fields take their defaults
    pub fn from_json_str(json: &str) -> CallResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn with_ended_channel_retention(mut self, retention: Duration) -> Self {
        self.ended_channel_retention = retention;
        self
    }

    pub fn with_ring(mut self, ring: RingConfig) -> Self {
        self.ring = ring;
        self
    }

    pub fn with_notifications(mut self, notifications: NotificationConfig) -> Self {
        self.notifications = notifications;
        self
    }

    pub fn with_native_options(mut self, native: NativeCallOptions) -> Self {
        self.native = native;
        self
    }

    pub fn with_native_call_timeout(mut self, timeout: Duration) -> Self {
        self.native_call_timeout = timeout;
        self
    }

    pub fn with_default_video(mut self, has_video: bool) -> Self {
        self.default_has_video = has_video;
        self
    }

    /// Check the settings for values no component can work with
    pub fn validate(&self) -> CallResult<()> {
        if self.history_limit == 0 {
            return Err(CallError::config("history_limit", "must be at least 1"));
        }
        if self.ended_channel_retention.is_zero() {
            return Err(CallError::config("ended_channel_retention", "must be non-zero"));
        }
        if self.native_call_timeout.is_zero() {
            return Err(CallError::config("native_call_timeout", "must be non-zero"));
        }
        if self.ring.pulse_interval.is_zero() {
            return Err(CallError::config("ring.pulse_interval", "must be non-zero"));
        }
        if self.ring.pulse_duration > self.ring.pulse_interval {
            return Err(CallError::config(
                "ring.pulse_duration",
                "must not exceed ring.pulse_interval",
            ));
        }
        if matches!(self.ring.ring_timeout, Some(t) if t.is_zero()) {
            return Err(CallError::config("ring.ring_timeout", "must be non-zero when set"));
        }
        if self.notifications.channel_id.trim().is_empty() {
            return Err(CallError::config("notifications.channel_id", "must not be empty"));
        }
        if self.notifications.category_id.trim().is_empty() {
            return Err(CallError::config("notifications.category_id", "must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = CallCoreConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.history_limit, 50);
        assert_eq!(config.ended_channel_retention, Duration::from_secs(3600));
        assert_eq!(config.ring.vibration_pattern_ms, vec![500, 1000, 500, 1000]);
        assert_eq!(config.ring.ring_timeout, None);
        assert_eq!(config.notifications.channel_id, "incoming-calls");
        assert!(config.default_has_video);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let config = CallCoreConfig::new().with_history_limit(0);
        assert!(matches!(
            config.validate(),
            Err(CallError::Configuration { ref field, .. }) if field == "history_limit"
        ));

        let config = CallCoreConfig::new()
            .with_ring(RingConfig::default().with_pulse(Duration::from_secs(4), Duration::from_secs(3)));
        assert!(config.validate().is_err());

        let config = CallCoreConfig::new().with_native_call_timeout(Duration::ZERO);
        assert!(config.validate().is_err());

        let config = CallCoreConfig::new().with_ended_channel_retention(Duration::ZERO);
        assert!(matches!(
            config.validate(),
            Err(CallError::Configuration { ref field, .. }) if field == "ended_channel_retention"
        ));
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = CallCoreConfig::from_json_str(
            r#"{ "history_limit": 5, "default_has_video": false }"#,
        )
        .unwrap();

        assert_eq!(config.history_limit, 5);
        assert!(!config.default_has_video);
        assert_eq!(config.notifications.category_id, "incoming_call");

        assert!(CallCoreConfig::from_json_str(r#"{ "history_limit": 0 }"#).is_err());
        assert!(matches!(
            CallCoreConfig::from_json_str("not json"),
            Err(CallError::Serialization(_))
        ));
    }

    #[test]
    fn test_notification_body_label() {
        let config = NotificationConfig::default();
        assert_eq!(config.body_for(true), "Eingehender Videoanruf");
        assert_eq!(config.body_for(false), "Eingehender Anruf");
    }
}
