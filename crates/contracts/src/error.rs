//! Layered error definitions
//!
//! Categorized by source: config / device / event loop

use thiserror::Error;

use crate::FrameKind;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Device Errors =====
    /// Driver context could not be acquired
    #[error("device context init error: {message}")]
    ContextInit { message: String },

    /// Device could not be opened
    #[error("could not open device {index}: {message}")]
    DeviceOpen { index: u32, message: String },

    /// Stream mode / start / stop failure
    #[error("{kind} stream error: {message}")]
    StreamControl { kind: FrameKind, message: String },

    // ===== Event Loop Errors =====
    /// Event processing reported a fatal error
    #[error("event loop error: {message}")]
    EventLoop { message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create context init error
    pub fn context_init(message: impl Into<String>) -> Self {
        Self::ContextInit {
            message: message.into(),
        }
    }

    /// Create device open error
    pub fn device_open(index: u32, message: impl Into<String>) -> Self {
        Self::DeviceOpen {
            index,
            message: message.into(),
        }
    }

    /// Create stream control error
    pub fn stream_control(kind: FrameKind, message: impl Into<String>) -> Self {
        Self::StreamControl {
            kind,
            message: message.into(),
        }
    }

    /// Create event loop error
    pub fn event_loop(message: impl Into<String>) -> Self {
        Self::EventLoop {
            message: message.into(),
        }
    }
}
