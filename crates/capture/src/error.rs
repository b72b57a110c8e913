//! Capture error types

use contracts::{ContractError, FrameKind};
use thiserror::Error;

/// Capture error
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Device collaborator failed during `initialize`
    #[error("capture initialization failed: {0}")]
    Init(#[source] ContractError),

    /// `initialize` called on an initialized session
    #[error("capture session already initialized")]
    AlreadyInitialized,

    /// Pull before a successful `initialize`
    #[error("capture session not initialized")]
    NotInitialized,

    /// `shutdown` called twice
    #[error("capture session already shut down")]
    AlreadyShutDown,

    /// Session torn down (possibly while waiting)
    #[error("capture session closed")]
    SessionClosed,

    /// The event loop died; no further frames will arrive
    #[error("event loop failed: {message}")]
    EventLoopFailed {
        /// Driver error message
        message: String,
    },

    /// Pull timed out
    #[error("no frames within {waited_ms}ms")]
    Timeout {
        /// Time waited
        waited_ms: u64,
    },

    /// Delivery of the wrong size
    #[error("{kind} delivery has {actual} bytes, expected {expected}")]
    FrameSizeMismatch {
        kind: FrameKind,
        expected: usize,
        actual: usize,
    },

    /// Caller-supplied output buffer of the wrong size
    #[error("{kind} output buffer has {actual} elements, expected {expected}")]
    BufferSizeMismatch {
        kind: FrameKind,
        expected: usize,
        actual: usize,
    },

    /// Event pump started twice
    #[error("event pump already started")]
    PumpAlreadyStarted,

    /// Event pump joined without `stop()`
    #[error("event pump joined before stop was requested")]
    PumpNotStopped,

    /// Event pump joined twice
    #[error("event pump already joined")]
    PumpAlreadyJoined,

    /// Event pump thread could not be spawned
    #[error("failed to spawn event pump: {0}")]
    PumpSpawn(#[source] std::io::Error),

    /// Event pump thread panicked
    #[error("event pump thread panicked")]
    PumpPanicked,
}

/// Capture Result type alias
pub type Result<T> = std::result::Result<T, CaptureError>;
