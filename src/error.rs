//! Custom error types for key-sequence-recorder.
//!
//! This module provides structured error types using `thiserror`. Every
//! failure in the recording/playback core is local and recoverable: an error
//! is returned before any mode flag or the sequence buffer changes.

use std::io;
use thiserror::Error;

/// Main error type for key-sequence-recorder operations.
#[derive(Error, Debug)]
pub enum KsrError {
    /// The OS refused global key interception or synthetic input posting.
    #[error("permission denied for {capability}: {reason}")]
    PermissionDenied { capability: String, reason: String },

    /// A canonical key name has no native code on this platform.
    #[error("unknown key '{key}'")]
    UnknownKey { key: String },

    /// An operation that needs recorded events was requested on an empty sequence.
    #[error("cannot {operation}: the sequence is empty")]
    EmptySequence { operation: String },

    /// Persisted sequence data is malformed.
    #[error("invalid sequence format: {0}")]
    Format(String),

    /// Recording and playback were requested at the same time.
    #[error("cannot {requested} while {active}")]
    ConcurrentModeConflict { requested: String, active: String },

    /// The sequence store reached its configured soft cap.
    #[error("sequence is full ({limit} events)")]
    Overflow { limit: usize },

    /// Another listener in this process already owns the keyboard hook.
    #[error("a global key listener is already running in this process")]
    ListenerBusy,

    /// A playback is already in progress.
    #[error("playback is already running")]
    AlreadyPlaying,

    /// Repeat counts start at one.
    #[error("invalid repeat count {0}: must be at least 1")]
    InvalidRepeatCount(u32),

    /// The playback worker thread is no longer accepting commands.
    #[error("playback worker error: {0}")]
    Playback(String),

    /// Configuration validation error.
    #[error("configuration error: {0}")]
    ConfigValidation(String),

    /// Error reading or parsing configuration file.
    #[error("failed to load config from '{path}': {reason}")]
    ConfigLoad { path: String, reason: String },

    /// Error writing configuration file.
    #[error("failed to save config to '{path}': {reason}")]
    ConfigSave { path: String, reason: String },

    /// Error parsing duration string.
    #[error("invalid duration '{value}': {reason}")]
    InvalidDuration { value: String, reason: String },

    /// Platform-specific operation is not supported.
    #[error("operation not supported on this platform: {0}")]
    UnsupportedPlatform(String),

    /// Error registering or handling hotkey.
    #[error("hotkey error: {0}")]
    Hotkey(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for key-sequence-recorder operations.
pub type Result<T> = std::result::Result<T, KsrError>;

impl KsrError {
    /// Create a new PermissionDenied error.
    pub fn permission_denied(capability: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PermissionDenied {
            capability: capability.into(),
            reason: reason.into(),
        }
    }

    /// Create a new UnknownKey error.
    pub fn unknown_key(key: impl Into<String>) -> Self {
        Self::UnknownKey { key: key.into() }
    }

    /// Create a new EmptySequence error.
    pub fn empty_sequence(operation: impl Into<String>) -> Self {
        Self::EmptySequence {
            operation: operation.into(),
        }
    }

    /// Create a new Format error.
    pub fn format(message: impl Into<String>) -> Self {
        Self::Format(message.into())
    }

    /// Create a new ConcurrentModeConflict error.
    pub fn mode_conflict(requested: impl Into<String>, active: impl Into<String>) -> Self {
        Self::ConcurrentModeConflict {
            requested: requested.into(),
            active: active.into(),
        }
    }

    /// Create a new ConfigValidation error.
    pub fn config_validation(message: impl Into<String>) -> Self {
        Self::ConfigValidation(message.into())
    }

    /// Create a new ConfigLoad error.
    pub fn config_load(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a new ConfigSave error.
    pub fn config_save(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigSave {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a new InvalidDuration error.
    pub fn invalid_duration(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDuration {
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create a new UnsupportedPlatform error.
    pub fn unsupported_platform(message: impl Into<String>) -> Self {
        Self::UnsupportedPlatform(message.into())
    }

    /// Create a new Hotkey error.
    pub fn hotkey(message: impl Into<String>) -> Self {
        Self::Hotkey(message.into())
    }

    /// Create a new Playback error.
    pub fn playback(message: impl Into<String>) -> Self {
        Self::Playback(message.into())
    }

    /// True for errors caused by missing OS authorization.
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied { .. })
    }
}
