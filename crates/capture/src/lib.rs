//! # Capture
//!
//! Producer/consumer core between a callback-driven depth camera driver and
//! one consumer thread.
//!
//! Responsibilities:
//! - Keep the latest color and depth frame behind one lock (`FrameStore`)
//! - Drive the driver's event loop on a dedicated thread (`EventPump`)
//! - Acquire and release the device in a fixed order (`CaptureSession`)
//! - Hand out coherent snapshots through a blocking pull
//!
//! ## Usage Example
//!
//! ```ignore
//! use capture::CaptureSession;
//! use contracts::CaptureConfig;
//!
//! let mut session = CaptureSession::new(backend, CaptureConfig::default());
//! session.initialize()?;
//!
//! let geometry = session.geometry();
//! let mut color = vec![0u8; geometry.color_bytes()];
//! let mut depth = vec![0u16; geometry.depth_samples()];
//! let info = session.get_frames(&mut color, &mut depth)?;
//!
//! session.shutdown()?;
//! ```

mod error;
mod event_pump;
mod frame_store;
mod reader;
mod session;

pub use contracts::{FrameInfo, FrameStamp, PairingPolicy};
pub use error::{CaptureError, Result};
pub use event_pump::{EventPump, PumpExit, PumpState, PUMP_THREAD_NAME};
pub use frame_store::{CloseReason, FrameStore};
pub use reader::{FramePair, FrameReader};
pub use session::{CaptureSession, SessionState};
