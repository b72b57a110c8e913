//! Mock device backend
//!
//! Implements the `DeviceBackend` family of traits and generates synthetic
//! frames. Frames are delivered synchronously from `process_events`, on the
//! calling thread, the same way the real driver does it.
//! Used for testing and development without a Kinect attached.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use bytes::{BufMut, Bytes, BytesMut};
use contracts::{
    ContractError, DeviceBackend, DeviceContext, DeviceHandle, FrameCallback, FrameKind,
    FrameMode, MockBackendConfig, Subdevices,
};
use tracing::{debug, trace};

use crate::probe::{MockProbe, ProbeEvent};

/// Idle sleep when nothing is streaming
const IDLE_POLL: Duration = Duration::from_millis(1);

/// Color frame content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorFill {
    /// Every byte holds this value
    Constant(u8),
    /// Every byte holds the frame's delivery number (wrapping)
    Counter,
}

/// Depth frame content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthFill {
    /// Every sample holds this value
    Constant(u16),
    /// Every sample holds the frame's delivery number (wrapping)
    Counter,
}

/// Mock device configuration
#[derive(Debug, Clone)]
pub struct MockDeviceConfig {
    pub color_fill: ColorFill,
    pub depth_fill: DepthFill,
    /// Deliver color frames while the color stream runs
    pub deliver_color: bool,
    /// Deliver depth frames while the depth stream runs
    pub deliver_depth: bool,
    /// Delay at the start of every `process_events` call
    pub frame_interval: Duration,
    /// `init_context` fails
    pub fail_context: bool,
    /// `open_device` fails
    pub fail_open: bool,
    /// `start_stream` fails for this kind
    pub fail_stream: Option<FrameKind>,
    /// `process_events` fails once it has succeeded this many times
    pub fail_events_after: Option<u64>,
}

impl Default for MockDeviceConfig {
    fn default() -> Self {
        Self {
            color_fill: ColorFill::Constant(0xAA),
            depth_fill: DepthFill::Constant(0x1234),
            deliver_color: true,
            deliver_depth: true,
            frame_interval: Duration::from_millis(1),
            fail_context: false,
            fail_open: false,
            fail_stream: None,
            fail_events_after: None,
        }
    }
}

impl From<&MockBackendConfig> for MockDeviceConfig {
    fn from(config: &MockBackendConfig) -> Self {
        Self {
            color_fill: ColorFill::Constant(config.color_fill),
            depth_fill: DepthFill::Constant(config.depth_fill),
            frame_interval: config.frame_interval(),
            ..Default::default()
        }
    }
}

/// Mock backend
///
/// Cheap to clone; clones share the same probe, so a test can keep one
/// clone and hand the other to the session.
#[derive(Clone)]
pub struct MockBackend {
    config: MockDeviceConfig,
    probe: Arc<MockProbe>,
}

impl MockBackend {
    /// Create a mock backend
    pub fn new(config: MockDeviceConfig) -> Self {
        Self {
            config,
            probe: Arc::new(MockProbe::default()),
        }
    }

    /// Create a mock backend with default configuration
    pub fn with_defaults() -> Self {
        Self::new(MockDeviceConfig::default())
    }

    /// Create a mock backend from the `[mock]` config section
    pub fn from_config(config: &MockBackendConfig) -> Self {
        Self::new(MockDeviceConfig::from(config))
    }

    /// Probe shared by every context and device of this backend
    pub fn probe(&self) -> Arc<MockProbe> {
        self.probe.clone()
    }
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl DeviceBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn init_context(&self) -> Result<Arc<dyn DeviceContext>, ContractError> {
        if self.config.fail_context {
            return Err(ContractError::context_init("mock failure"));
        }

        self.probe.record(ProbeEvent::ContextAcquired);
        Ok(Arc::new(MockContext {
            shared: Arc::new(Shared::new(self.config.clone(), self.probe.clone())),
        }))
    }
}

/// State shared between the context and the device it opened
struct Shared {
    config: MockDeviceConfig,
    probe: Arc<MockProbe>,
    started_at: Instant,
    device_open: AtomicBool,
    callbacks: Mutex<[Option<FrameCallback>; 2]>,
    modes: Mutex<[Option<FrameMode>; 2]>,
    streaming: [AtomicBool; 2],
    frames: [AtomicU64; 2],
    /// Constant frames are built once per mode
    cached: Mutex<[Option<Bytes>; 2]>,
}

impl Shared {
    fn new(config: MockDeviceConfig, probe: Arc<MockProbe>) -> Self {
        Self {
            config,
            probe,
            started_at: Instant::now(),
            device_open: AtomicBool::new(false),
            callbacks: Mutex::new([None, None]),
            modes: Mutex::new([None, None]),
            streaming: [AtomicBool::new(false), AtomicBool::new(false)],
            frames: [AtomicU64::new(0), AtomicU64::new(0)],
            cached: Mutex::new([None, None]),
        }
    }

    fn wants(&self, kind: FrameKind) -> bool {
        let enabled = match kind {
            FrameKind::Color => self.config.deliver_color,
            FrameKind::Depth => self.config.deliver_depth,
        };
        enabled && self.streaming[kind.index()].load(Ordering::Acquire)
    }

    /// Build one frame for `mode`
    fn generate_frame(&self, mode: FrameMode, frame_id: u64) -> Bytes {
        let constant = match (mode.kind, self.config.color_fill, self.config.depth_fill) {
            (FrameKind::Color, ColorFill::Constant(_), _)
            | (FrameKind::Depth, _, DepthFill::Constant(_)) => true,
            _ => false,
        };

        if constant {
            let mut cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
            let slot = &mut cached[mode.kind.index()];
            if let Some(frame) = slot.as_ref().filter(|f| f.len() == mode.frame_bytes()) {
                return frame.clone();
            }
            let frame = self.fill(mode, frame_id);
            *slot = Some(frame.clone());
            return frame;
        }

        self.fill(mode, frame_id)
    }

    fn fill(&self, mode: FrameMode, frame_id: u64) -> Bytes {
        let mut buf = BytesMut::with_capacity(mode.frame_bytes());
        match mode.kind {
            FrameKind::Color => {
                let value = match self.config.color_fill {
                    ColorFill::Constant(v) => v,
                    ColorFill::Counter => frame_id as u8,
                };
                buf.put_bytes(value, mode.frame_bytes());
            }
            FrameKind::Depth => {
                let value = match self.config.depth_fill {
                    DepthFill::Constant(v) => v,
                    DepthFill::Counter => frame_id as u16,
                };
                for _ in 0..mode.elements() {
                    buf.put_slice(&value.to_ne_bytes());
                }
            }
        }
        buf.freeze()
    }

    fn timestamp(&self) -> u32 {
        self.started_at.elapsed().as_millis() as u32
    }

    fn deliver(&self, kind: FrameKind) -> bool {
        if !self.wants(kind) {
            return false;
        }

        let mode = self.modes.lock().unwrap_or_else(PoisonError::into_inner)[kind.index()];
        let callback = self.callbacks.lock().unwrap_or_else(PoisonError::into_inner)
            [kind.index()]
        .clone();
        let (Some(mode), Some(callback)) = (mode, callback) else {
            return false;
        };

        let frame_id = self.frames[kind.index()].fetch_add(1, Ordering::SeqCst) + 1;
        let frame = self.generate_frame(mode, frame_id);
        let timestamp = self.timestamp();

        callback(&frame[..], timestamp);
        self.probe.record_delivery(kind);

        trace!(kind = %kind, frame_id, timestamp, "mock frame delivered");
        true
    }
}

/// Mock driver context
struct MockContext {
    shared: Arc<Shared>,
}

impl DeviceContext for MockContext {
    fn select_subdevices(&self, subdevices: Subdevices) {
        self.shared
            .probe
            .record(ProbeEvent::SubdevicesSelected(subdevices));
    }

    fn open_device(&self, index: u32) -> Result<Box<dyn DeviceHandle>, ContractError> {
        if self.shared.config.fail_open {
            return Err(ContractError::device_open(index, "mock failure"));
        }
        if self.shared.device_open.swap(true, Ordering::SeqCst) {
            return Err(ContractError::device_open(index, "device already open"));
        }

        self.shared.probe.record(ProbeEvent::DeviceOpened(index));
        debug!(index, "mock device opened");
        Ok(Box::new(MockDevice {
            shared: self.shared.clone(),
        }))
    }

    fn process_events(&self, timeout: Option<Duration>) -> Result<(), ContractError> {
        let shared = &self.shared;
        let call = shared
            .probe
            .record_event_call(shared.device_open.load(Ordering::Acquire));

        if let Some(limit) = shared.config.fail_events_after {
            if call > limit {
                return Err(ContractError::event_loop(format!(
                    "mock failure after {limit} calls"
                )));
            }
        }

        if !shared.config.frame_interval.is_zero() {
            thread::sleep(shared.config.frame_interval);
        }

        let mut delivered = false;
        for kind in [FrameKind::Depth, FrameKind::Color] {
            delivered |= shared.deliver(kind);
        }

        if !delivered {
            thread::sleep(timeout.map_or(IDLE_POLL, |t| t.min(IDLE_POLL)));
        }
        Ok(())
    }

    fn shutdown(&self) -> Result<(), ContractError> {
        self.shared.probe.record(ProbeEvent::ContextReleased);
        debug!("mock context released");
        Ok(())
    }
}

/// Mock opened device
struct MockDevice {
    shared: Arc<Shared>,
}

impl DeviceHandle for MockDevice {
    fn set_frame_callback(&mut self, kind: FrameKind, callback: FrameCallback) {
        self.shared
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)[kind.index()] = Some(callback);
    }

    fn set_frame_mode(&mut self, mode: FrameMode) -> Result<(), ContractError> {
        self.shared
            .modes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)[mode.kind.index()] = Some(mode);
        self.shared.probe.record(ProbeEvent::FrameModeSet(mode.kind));
        Ok(())
    }

    fn start_stream(&mut self, kind: FrameKind) -> Result<(), ContractError> {
        if self.shared.config.fail_stream == Some(kind) {
            return Err(ContractError::stream_control(kind, "mock failure"));
        }
        let has_mode =
            self.shared.modes.lock().unwrap_or_else(PoisonError::into_inner)[kind.index()].is_some();
        if !has_mode {
            return Err(ContractError::stream_control(kind, "no frame mode set"));
        }

        self.shared.streaming[kind.index()].store(true, Ordering::Release);
        self.shared.probe.record(ProbeEvent::StreamStarted(kind));
        Ok(())
    }

    fn stop_stream(&mut self, kind: FrameKind) -> Result<(), ContractError> {
        self.shared.streaming[kind.index()].store(false, Ordering::Release);
        self.shared.probe.record(ProbeEvent::StreamStopped(kind));
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<(), ContractError> {
        *self
            .shared
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = [None, None];
        self.shared.device_open.store(false, Ordering::SeqCst);
        self.shared.probe.record(ProbeEvent::DeviceClosed);
        debug!("mock device closed");
        Ok(())
    }
}
