//! Capture session: device lifecycle around the frame store and event pump.

use std::sync::Arc;
use std::time::Duration;

use contracts::{
    CaptureConfig, ContractError, DeviceBackend, DeviceContext, DeviceHandle, FrameCallback,
    FrameGeometry, FrameInfo, FrameKind,
};
use tracing::{debug, info, instrument, warn};

use crate::error::{CaptureError, Result};
use crate::event_pump::{EventPump, PumpState};
use crate::frame_store::{CloseReason, FrameStore};
use crate::reader::{FramePair, FrameReader};

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed, or `initialize` failed
    Created,
    /// Device open, streams running, pump started
    Running,
    /// `shutdown` ran
    ShutDown,
}

/// Order streams are started in; stopped in the same order
const STREAM_ORDER: [FrameKind; 2] = [FrameKind::Depth, FrameKind::Color];

/// Capture Session
///
/// Owns the driver context, the opened device, the event pump and the
/// frame store. Teardown order is fixed: stop and join the pump first
/// (callbacks run on it), then stop streams and close the device, then
/// release the context.
pub struct CaptureSession {
    backend: Arc<dyn DeviceBackend>,
    config: CaptureConfig,
    store: Arc<FrameStore>,
    pump: EventPump,
    context: Option<Arc<dyn DeviceContext>>,
    device: Option<Box<dyn DeviceHandle>>,
    state: SessionState,
}

impl CaptureSession {
    /// Create a session; the device is not touched until `initialize`
    pub fn new(backend: Arc<dyn DeviceBackend>, config: CaptureConfig) -> Self {
        let store = Arc::new(FrameStore::new(
            FrameGeometry::default(),
            config.pull.pairing,
        ));
        let pump = EventPump::new(Some(config.pump.poll_timeout()));

        Self {
            backend,
            config,
            store,
            pump,
            context: None,
            device: None,
            state: SessionState::Created,
        }
    }

    /// Lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Frame geometry of this session
    pub fn geometry(&self) -> FrameGeometry {
        self.store.geometry()
    }

    /// Session configuration
    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Whether the event pump thread is alive
    pub fn is_pump_running(&self) -> bool {
        self.pump.is_running()
    }

    /// Acquire the device and start capturing
    ///
    /// On failure everything acquired so far is released again and the
    /// session stays in `Created`.
    #[instrument(
        name = "capture_session_initialize",
        skip(self),
        fields(backend = %self.backend.name(), device_index = self.config.device.index)
    )]
    pub fn initialize(&mut self) -> Result<()> {
        match self.state {
            SessionState::Created => {}
            SessionState::Running => return Err(CaptureError::AlreadyInitialized),
            SessionState::ShutDown => return Err(CaptureError::SessionClosed),
        }

        let context = self.backend.init_context().map_err(|e| {
            warn!(error = %e, "failed to acquire device context");
            CaptureError::Init(e)
        })?;

        context.select_subdevices(self.config.device.subdevices());

        let mut device = match context.open_device(self.config.device.index) {
            Ok(device) => device,
            Err(e) => {
                warn!(error = %e, "could not open device");
                release_context(context.as_ref());
                return Err(CaptureError::Init(e));
            }
        };

        let mut started = Vec::with_capacity(STREAM_ORDER.len());
        if let Err(e) = self.start_streams(device.as_mut(), &mut started) {
            warn!(error = %e, "failed to start streams");
            close_device(device, &started);
            release_context(context.as_ref());
            return Err(CaptureError::Init(e));
        }

        if let Err(e) = self.pump.start(context.clone(), self.store.clone()) {
            warn!(error = %e, "failed to start event pump");
            close_device(device, &started);
            release_context(context.as_ref());
            return Err(e);
        }

        self.context = Some(context);
        self.device = Some(device);
        self.state = SessionState::Running;
        info!(pairing = ?self.store.pairing(), "capture session initialized");
        Ok(())
    }

    fn start_streams(
        &self,
        device: &mut dyn DeviceHandle,
        started: &mut Vec<FrameKind>,
    ) -> std::result::Result<(), ContractError> {
        let geometry = self.store.geometry();

        for kind in FrameKind::ALL {
            device.set_frame_callback(kind, delivery_callback(self.store.clone(), kind));
            device.set_frame_mode(geometry.mode(kind))?;
        }

        for kind in STREAM_ORDER {
            device.start_stream(kind)?;
            started.push(kind);
            debug!(kind = %kind, "stream started");
        }

        Ok(())
    }

    /// Block for fresh frames and copy them into caller buffers
    ///
    /// `color_out` holds `width * height * 3` bytes, `depth_out`
    /// `width * height` samples. Waits according to the configured pairing
    /// policy and pull timeout.
    pub fn get_frames(&self, color_out: &mut [u8], depth_out: &mut [u16]) -> Result<FrameInfo> {
        self.reader()?.get_frames(color_out, depth_out)
    }

    /// Like `get_frames` with an explicit bound
    pub fn get_frames_timeout(
        &self,
        color_out: &mut [u8],
        depth_out: &mut [u16],
        timeout: Duration,
    ) -> Result<FrameInfo> {
        self.reader()?
            .get_frames_timeout(color_out, depth_out, timeout)
    }

    /// Block for fresh frames and return them in new buffers
    pub fn grab(&self) -> Result<FramePair> {
        self.reader()?.grab()
    }

    /// Pull handle usable from another thread
    pub fn reader(&self) -> Result<FrameReader> {
        match self.state {
            SessionState::Created => Err(CaptureError::NotInitialized),
            SessionState::ShutDown => Err(CaptureError::SessionClosed),
            SessionState::Running => Ok(FrameReader::new(
                self.store.clone(),
                self.config.pull.timeout(),
            )),
        }
    }

    /// Stop capturing and release the device
    ///
    /// Safe on a session that never initialized. A second call returns
    /// `AlreadyShutDown` and releases nothing.
    #[instrument(name = "capture_session_shutdown", skip(self), fields(backend = %self.backend.name()))]
    pub fn shutdown(&mut self) -> Result<()> {
        if self.state == SessionState::ShutDown {
            return Err(CaptureError::AlreadyShutDown);
        }
        self.state = SessionState::ShutDown;

        self.store.close(CloseReason::Shutdown);

        self.pump.stop();
        if self.pump.state() == PumpState::StopRequested {
            match self.pump.join() {
                Ok(exit) => debug!(exit = ?exit, "event pump finished"),
                Err(e) => warn!(error = %e, "event pump join failed"),
            }
        }

        if let Some(device) = self.device.take() {
            close_device(device, &STREAM_ORDER);
        }

        if let Some(context) = self.context.take() {
            release_context(context.as_ref());
        }

        info!("capture session shut down");
        Ok(())
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if self.state != SessionState::ShutDown {
            if let Err(e) = self.shutdown() {
                warn!(error = %e, "capture session shutdown on drop failed");
            }
        }
    }
}

fn delivery_callback(store: Arc<FrameStore>, kind: FrameKind) -> FrameCallback {
    Arc::new(move |bytes: &[u8], timestamp: u32| {
        if let Err(e) = store.deliver(kind, bytes, timestamp) {
            warn!(error = %e, "dropping delivery");
        }
    })
}

/// Stop `streams` and close the device, logging failures
fn close_device(mut device: Box<dyn DeviceHandle>, streams: &[FrameKind]) {
    for &kind in streams {
        if let Err(e) = device.stop_stream(kind) {
            warn!(kind = %kind, error = %e, "failed to stop stream");
        }
    }
    if let Err(e) = device.close() {
        warn!(error = %e, "failed to close device");
    }
}

fn release_context(context: &dyn DeviceContext) {
    if let Err(e) = context.shutdown() {
        warn!(error = %e, "failed to release device context");
    }
}
