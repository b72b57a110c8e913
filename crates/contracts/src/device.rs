//! Device collaborator abstraction
//!
//! Splits the driver into the three handles it actually hands out:
//! a backend that can acquire contexts, a context that owns the event loop,
//! and a device that owns the streams and the delivery callbacks.
//! Real hardware and test fakes implement the same traits, so the capture
//! core never knows which one it is driving.

use std::sync::Arc;
use std::time::Duration;

use crate::{ContractError, FrameKind, FrameMode};

/// Delivery callback type
///
/// Receives exactly one frame worth of bytes and the driver timestamp.
/// Invoked on the event-loop thread, inside `DeviceContext::process_events`.
pub type FrameCallback = Arc<dyn Fn(&[u8], u32) + Send + Sync>;

/// Subdevices to claim when opening a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subdevices {
    pub camera: bool,
    pub motor: bool,
}

impl Default for Subdevices {
    fn default() -> Self {
        Self {
            camera: true,
            motor: true,
        }
    }
}

/// Entry point of a device driver
pub trait DeviceBackend: Send + Sync {
    /// Backend name, for logs
    fn name(&self) -> &str;

    /// Acquire a driver context
    fn init_context(&self) -> Result<Arc<dyn DeviceContext>, ContractError>;
}

/// Driver context
///
/// Shared between the session (device acquisition, shutdown) and the event
/// pump thread (`process_events`).
pub trait DeviceContext: Send + Sync {
    /// Select which subdevices subsequent `open_device` calls claim
    fn select_subdevices(&self, subdevices: Subdevices);

    /// Open the device at `index`
    fn open_device(&self, index: u32) -> Result<Box<dyn DeviceHandle>, ContractError>;

    /// Process one batch of device events
    ///
    /// Registered callbacks run synchronously inside this call. When
    /// `timeout` is set, implementations that support it return after at
    /// most that long even if no event arrived. An `Err` is fatal for the
    /// event loop.
    fn process_events(&self, timeout: Option<Duration>) -> Result<(), ContractError>;

    /// Release the context
    ///
    /// Called once, after every device opened from it has been closed.
    fn shutdown(&self) -> Result<(), ContractError>;
}

/// Opened device
pub trait DeviceHandle: Send {
    /// Register the delivery callback for `kind`
    fn set_frame_callback(&mut self, kind: FrameKind, callback: FrameCallback);

    /// Configure the fixed frame mode for `kind`
    fn set_frame_mode(&mut self, mode: FrameMode) -> Result<(), ContractError>;

    /// Start streaming `kind`
    fn start_stream(&mut self, kind: FrameKind) -> Result<(), ContractError>;

    /// Stop streaming `kind`
    fn stop_stream(&mut self, kind: FrameKind) -> Result<(), ContractError>;

    /// Close the device
    fn close(self: Box<Self>) -> Result<(), ContractError>;
}
