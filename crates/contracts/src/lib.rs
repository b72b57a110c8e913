//! # Contracts
//!
//! Frozen interface contracts shared by every crate in the workspace.
//! Business crates depend on this crate only, never the other way round.
//!
//! ## Frame Model
//! - Two frame kinds, color and depth, each with a fixed `FrameMode`
//! - A delivery is one full frame of one kind plus the driver timestamp
//! - The device collaborator is abstracted by `DeviceBackend` /
//!   `DeviceContext` / `DeviceHandle`

mod capture_config;
mod device;
mod error;
mod frame;
mod snapshot;

pub use capture_config::*;
pub use device::{DeviceBackend, DeviceContext, DeviceHandle, FrameCallback, Subdevices};
pub use error::*;
pub use frame::*;
pub use snapshot::{FrameInfo, FrameStamp};
