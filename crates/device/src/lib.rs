//! # Device
//!
//! Device collaborators for the capture core.
//!
//! Responsibilities:
//! - Scriptable mock backend producing synthetic frames
//! - Failure injection and a probe for asserting acquire/release order
//! - Real Kinect backend through libfreenect
//!
//! ## Feature Flags
//!
//! - `libfreenect`: Enable the libfreenect backend (links against the system library)

pub mod factory;
pub mod mock;
pub mod probe;

#[cfg(feature = "libfreenect")]
pub mod freenect;

pub use factory::{backend_for, backend_available};
pub use mock::{ColorFill, DepthFill, MockBackend, MockDeviceConfig};
pub use probe::{MockProbe, ProbeEvent};

#[cfg(feature = "libfreenect")]
pub use freenect::FreenectBackend;
