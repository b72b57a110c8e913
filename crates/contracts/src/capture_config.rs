//! Capture configuration contracts that can be shared across crates.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Subdevices;

/// Top-level capture configuration
///
/// Every section has a default, so an empty file is a valid configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Device selection
    #[serde(default)]
    pub device: DeviceConfig,

    /// Consumer pull behavior
    #[serde(default)]
    pub pull: PullConfig,

    /// Event pump behavior
    #[serde(default)]
    pub pump: PumpConfig,

    /// Mock backend settings (ignored by real backends)
    #[serde(default)]
    pub mock: MockBackendConfig,
}

/// Which device collaborator drives the session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Synthetic frames, no hardware
    #[default]
    Mock,
    /// Kinect through libfreenect
    Freenect,
}

/// Device selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Driver backend
    #[serde(default)]
    pub backend: BackendKind,

    /// Index of the device to open
    #[serde(default)]
    pub index: u32,

    /// Also claim the motor subdevice
    #[serde(default = "default_true")]
    pub motor: bool,
}

impl DeviceConfig {
    /// Subdevices to select before opening
    pub fn subdevices(&self) -> Subdevices {
        Subdevices {
            camera: true,
            motor: self.motor,
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            index: 0,
            motor: true,
        }
    }
}

/// When a pull may return
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairingPolicy {
    /// Wait until both kinds were delivered since the previous snapshot
    #[default]
    Paired,
    /// Wake on a delivery of either kind; the other may be stale
    Latest,
}

/// Consumer pull configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullConfig {
    /// Freshness required before a pull returns
    #[serde(default)]
    pub pairing: PairingPolicy,

    /// Upper bound on one pull (None = wait forever)
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl PullConfig {
    /// Pull timeout as a `Duration`
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Event pump configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PumpConfig {
    /// Upper bound passed to each event-processing call
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
}

impl PumpConfig {
    /// Poll timeout as a `Duration`
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            poll_timeout_ms: default_poll_timeout_ms(),
        }
    }
}

/// Mock backend configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MockBackendConfig {
    /// Byte every color frame is filled with
    #[serde(default = "default_color_fill")]
    pub color_fill: u8,

    /// Sample every depth frame is filled with
    #[serde(default = "default_depth_fill")]
    pub depth_fill: u16,

    /// Delay per event-processing call (0 = deliver as fast as polled)
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
}

impl MockBackendConfig {
    /// Frame interval as a `Duration`
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

impl Default for MockBackendConfig {
    fn default() -> Self {
        Self {
            color_fill: default_color_fill(),
            depth_fill: default_depth_fill(),
            frame_interval_ms: default_frame_interval_ms(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_poll_timeout_ms() -> u64 {
    100
}

fn default_color_fill() -> u8 {
    0xAA
}

fn default_depth_fill() -> u16 {
    0x1234
}

fn default_frame_interval_ms() -> u64 {
    33
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: CaptureConfig = toml::from_str("").unwrap();
        assert_eq!(config, CaptureConfig::default());
        assert_eq!(config.pull.pairing, PairingPolicy::Paired);
        assert_eq!(config.pull.timeout(), None);
        assert_eq!(config.pump.poll_timeout(), Duration::from_millis(100));
        assert!(config.device.motor);
    }

    #[test]
    fn test_partial_sections() {
        let config: CaptureConfig = toml::from_str(
            r#"
[device]
backend = "freenect"
motor = false

[pull]
pairing = "latest"
timeout_ms = 250
"#,
        )
        .unwrap();

        assert_eq!(config.device.backend, BackendKind::Freenect);
        assert_eq!(config.device.index, 0);
        assert_eq!(
            config.device.subdevices(),
            Subdevices {
                camera: true,
                motor: false
            }
        );
        assert_eq!(config.pull.pairing, PairingPolicy::Latest);
        assert_eq!(config.pull.timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.mock.color_fill, 0xAA);
    }

    #[test]
    fn test_json_enum_names() {
        let json = serde_json::to_string(&PairingPolicy::Latest).unwrap();
        assert_eq!(json, "\"latest\"");
        let kind: BackendKind = serde_json::from_str("\"mock\"").unwrap();
        assert_eq!(kind, BackendKind::Mock);
    }
}
