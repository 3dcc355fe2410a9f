//! Error types for the call core
//!
//! Guarded state-machine transitions never fail with a [`CallError`]; they
//! report [`AdmitOutcome`](crate::state_manager::AdmitOutcome) or
//! [`TransitionOutcome`](crate::state_manager::TransitionOutcome) instead,
//! since duplicate and stale signals are expected rather than exceptional.
//! The errors here cover malformed input and collaborator failures that
//! callers may want to surface to a top-level handler.

use std::fmt;

use thiserror::Error;

/// Result type for call core operations
pub type CallResult<T> = Result<T, CallError>;

/// Errors that can occur in the call core
#[derive(Debug, Error)]
pub enum CallError {
    /// A call signal arrived without the fields needed to admit it
    #[error("Malformed call signal: {reason}")]
    MalformedSignal { reason: String },

    /// A phone identifier normalised to nothing
    #[error("Invalid phone number: {input:?}")]
    InvalidPhoneNumber { input: String },

    /// Native call UI integration failed
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    /// Local notification subsystem failed
    #[error("Notification error: {0}")]
    Notification(#[from] NotificationError),

    /// Realtime transport failed
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// The single call slot is occupied
    #[error("Call already in progress on channel {channel}")]
    CallInProgress { channel: String },

    /// Configuration error
    #[error("Invalid configuration for {field}: {reason}")]
    Configuration { field: String, reason: String },

    /// An OS round-trip exceeded its bound
    #[error("Operation {operation} timed out after {duration_ms}ms")]
    OperationTimeout { operation: String, duration_ms: u64 },

    /// JSON payload could not be decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl CallError {
    /// Create a malformed signal error
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedSignal {
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Configuration {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the error came from an optional platform enhancement
    /// (native call UI, notifications) rather than from the call itself.
    ///
    /// Recoverable errors degrade presentation; they never fail a call.
    pub fn is_recoverable(&self) -> bool {
        match self {
            // Presentation falls back to the next path
            Self::Platform(_) | Self::Notification(_) | Self::OperationTimeout { .. } => true,

            // The signal or setup itself is wrong
            Self::MalformedSignal { .. }
            | Self::InvalidPhoneNumber { .. }
            | Self::Serialization(_)
            | Self::Configuration { .. }
            | Self::CallInProgress { .. }
            | Self::Transport(_)
            | Self::Internal { .. } => false,
        }
    }

    /// Get the error category for logging and metrics
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::MalformedSignal { .. }
            | Self::InvalidPhoneNumber { .. }
            | Self::Serialization(_) => ErrorCategory::Signal,
            Self::Platform(_) | Self::Notification(_) => ErrorCategory::Platform,
            Self::Transport(_) => ErrorCategory::Transport,
            Self::CallInProgress { .. } => ErrorCategory::State,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::OperationTimeout { .. } => ErrorCategory::Timeout,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

/// Error categories for grouping related errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Inbound signal or payload could not be decoded
    Signal,
    /// Native call UI or notification subsystem
    Platform,
    /// Realtime socket
    Transport,
    /// Call slot conflicts
    State,
    /// Configuration and parameter errors
    Configuration,
    /// OS round-trip exceeded its bound
    Timeout,
    /// Internal errors
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signal => write!(f, "Signal"),
            Self::Platform => write!(f, "Platform"),
            Self::Transport => write!(f, "Transport"),
            Self::State => write!(f, "State"),
            Self::Configuration => write!(f, "Configuration"),
            Self::Timeout => write!(f, "Timeout"),
            Self::Internal => write!(f, "Internal"),
        }
    }
}

/// Failures reported by a native call UI backend (CallKit, ConnectionService)
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlatformError {
    /// The backend library is missing on this build
    #[error("native call UI unavailable: {reason}")]
    Unavailable { reason: String },

    /// The user or OS refused the phone-account permission
    #[error("permission denied: {permission}")]
    PermissionDenied { permission: String },

    /// A native API call threw
    #[error("native call {operation} failed: {reason}")]
    ApiFailure { operation: String, reason: String },
}

impl PlatformError {
    /// Create an API failure for the named operation
    pub fn api(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ApiFailure {
            operation: operation.into(),
            reason: reason.into(),
        }
    }
}

/// Failures reported by the local notification subsystem
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NotificationError {
    /// Notification permission not granted
    #[error("notification permission denied")]
    PermissionDenied,

    /// Channel or category registration failed
    #[error("failed to configure {what}: {reason}")]
    Setup { what: String, reason: String },

    /// Scheduling or dismissing a notification failed
    #[error("notification {operation} failed: {reason}")]
    Delivery { operation: String, reason: String },
}

impl NotificationError {
    /// Create a delivery failure for the named operation
    pub fn delivery(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Delivery {
            operation: operation.into(),
            reason: reason.into(),
        }
    }
}

/// Failures reported by the realtime socket transport
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Socket is not connected
    #[error("transport not connected")]
    NotConnected,

    /// Sending failed
    #[error("failed to send {event}: {reason}")]
    Send { event: String, reason: String },

    /// Event name is not one the call core understands
    #[error("unknown transport event: {name}")]
    UnknownEvent { name: String },
}
