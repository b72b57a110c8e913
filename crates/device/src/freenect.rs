//! libfreenect backend
//!
//! Drives a real Kinect through the libfreenect C API. Only the handful of
//! calls the capture core needs are bound.

use std::os::raw::{c_int, c_void};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use contracts::{
    ContractError, DeviceBackend, DeviceContext, DeviceHandle, FrameCallback, FrameKind,
    FrameMode, Subdevices,
};
use tracing::{debug, error, warn};

#[allow(non_camel_case_types, dead_code)]
mod ffi {
    use std::os::raw::{c_int, c_void};

    #[repr(C)]
    pub struct freenect_context {
        _private: [u8; 0],
    }

    #[repr(C)]
    pub struct freenect_device {
        _private: [u8; 0],
    }

    #[repr(C)]
    #[derive(Debug, Clone, Copy)]
    pub struct freenect_frame_mode {
        pub reserved: u32,
        pub resolution: c_int,
        pub format: i32,
        pub bytes: i32,
        pub width: i16,
        pub height: i16,
        pub data_bits_per_pixel: i8,
        pub padding_bits_per_pixel: i8,
        pub framerate: i8,
        pub is_valid: i8,
    }

    pub type freenect_frame_cb =
        unsafe extern "C" fn(dev: *mut freenect_device, data: *mut c_void, timestamp: u32);

    pub const FREENECT_RESOLUTION_MEDIUM: c_int = 1;
    pub const FREENECT_VIDEO_RGB: c_int = 0;
    pub const FREENECT_DEPTH_MM: c_int = 5;
    pub const FREENECT_DEVICE_MOTOR: c_int = 0x01;
    pub const FREENECT_DEVICE_CAMERA: c_int = 0x02;

    #[link(name = "freenect")]
    extern "C" {
        pub fn freenect_init(ctx: *mut *mut freenect_context, usb_ctx: *mut c_void) -> c_int;
        pub fn freenect_shutdown(ctx: *mut freenect_context) -> c_int;
        pub fn freenect_select_subdevices(ctx: *mut freenect_context, subdevs: c_int);
        pub fn freenect_process_events_timeout(
            ctx: *mut freenect_context,
            timeout: *mut libc::timeval,
        ) -> c_int;
        pub fn freenect_process_events(ctx: *mut freenect_context) -> c_int;

        pub fn freenect_open_device(
            ctx: *mut freenect_context,
            dev: *mut *mut freenect_device,
            index: c_int,
        ) -> c_int;
        pub fn freenect_close_device(dev: *mut freenect_device) -> c_int;
        pub fn freenect_set_user(dev: *mut freenect_device, user: *mut c_void);
        pub fn freenect_get_user(dev: *mut freenect_device) -> *mut c_void;

        pub fn freenect_set_depth_callback(dev: *mut freenect_device, cb: freenect_frame_cb);
        pub fn freenect_set_video_callback(dev: *mut freenect_device, cb: freenect_frame_cb);

        pub fn freenect_find_video_mode(resolution: c_int, format: c_int) -> freenect_frame_mode;
        pub fn freenect_find_depth_mode(resolution: c_int, format: c_int) -> freenect_frame_mode;
        pub fn freenect_set_video_mode(
            dev: *mut freenect_device,
            mode: freenect_frame_mode,
        ) -> c_int;
        pub fn freenect_set_depth_mode(
            dev: *mut freenect_device,
            mode: freenect_frame_mode,
        ) -> c_int;

        pub fn freenect_start_depth(dev: *mut freenect_device) -> c_int;
        pub fn freenect_start_video(dev: *mut freenect_device) -> c_int;
        pub fn freenect_stop_depth(dev: *mut freenect_device) -> c_int;
        pub fn freenect_stop_video(dev: *mut freenect_device) -> c_int;
    }
}

/// Kinect backend through libfreenect
#[derive(Debug, Default)]
pub struct FreenectBackend;

impl FreenectBackend {
    pub fn new() -> Self {
        Self
    }
}

impl DeviceBackend for FreenectBackend {
    fn name(&self) -> &str {
        "freenect"
    }

    fn init_context(&self) -> Result<Arc<dyn DeviceContext>, ContractError> {
        let mut ctx: *mut ffi::freenect_context = ptr::null_mut();
        // SAFETY: `ctx` is a valid out-pointer; a null usb context lets
        // libfreenect create its own.
        let rc = unsafe { ffi::freenect_init(&mut ctx, ptr::null_mut()) };
        if rc < 0 || ctx.is_null() {
            return Err(ContractError::context_init(format!(
                "freenect_init() failed ({rc})"
            )));
        }

        debug!("freenect context initialized");
        Ok(Arc::new(FreenectContext {
            ctx,
            released: AtomicBool::new(false),
        }))
    }
}

/// Owned `freenect_context`
struct FreenectContext {
    ctx: *mut ffi::freenect_context,
    released: AtomicBool,
}

// SAFETY: libfreenect allows the event loop to run on one thread while
// device calls are made from another; the pointer itself is never mutated.
unsafe impl Send for FreenectContext {}
unsafe impl Sync for FreenectContext {}

impl DeviceContext for FreenectContext {
    fn select_subdevices(&self, subdevices: Subdevices) {
        let mut flags = 0;
        if subdevices.camera {
            flags |= ffi::FREENECT_DEVICE_CAMERA;
        }
        if subdevices.motor {
            flags |= ffi::FREENECT_DEVICE_MOTOR;
        }
        // SAFETY: context is live until `shutdown`
        unsafe { ffi::freenect_select_subdevices(self.ctx, flags) };
    }

    fn open_device(&self, index: u32) -> Result<Box<dyn DeviceHandle>, ContractError> {
        let index_c = c_int::try_from(index)
            .map_err(|_| ContractError::device_open(index, "index out of range"))?;

        let mut dev: *mut ffi::freenect_device = ptr::null_mut();
        // SAFETY: `dev` is a valid out-pointer and the context is live
        let rc = unsafe { ffi::freenect_open_device(self.ctx, &mut dev, index_c) };
        if rc < 0 || dev.is_null() {
            return Err(ContractError::device_open(
                index,
                format!("freenect_open_device() failed ({rc})"),
            ));
        }

        let slots = Box::new(CallbackSlots::default());
        // SAFETY: `slots` is boxed and outlives the device: it is dropped
        // only after `freenect_close_device` returned.
        unsafe {
            ffi::freenect_set_user(dev, &*slots as *const CallbackSlots as *mut c_void);
            ffi::freenect_set_depth_callback(dev, depth_trampoline);
            ffi::freenect_set_video_callback(dev, video_trampoline);
        }

        debug!(index, "freenect device opened");
        Ok(Box::new(FreenectDevice {
            dev,
            slots,
            closed: false,
        }))
    }

    fn process_events(&self, timeout: Option<Duration>) -> Result<(), ContractError> {
        // SAFETY: context is live until `shutdown`, which runs after the
        // event pump has been joined.
        let rc = match timeout {
            Some(timeout) => {
                let mut tv = libc::timeval {
                    tv_sec: timeout.as_secs() as libc::time_t,
                    tv_usec: timeout.subsec_micros() as libc::suseconds_t,
                };
                unsafe { ffi::freenect_process_events_timeout(self.ctx, &mut tv) }
            }
            None => unsafe { ffi::freenect_process_events(self.ctx) },
        };

        if rc < 0 {
            return Err(ContractError::event_loop(format!(
                "freenect_process_events() failed ({rc})"
            )));
        }
        Ok(())
    }

    fn shutdown(&self) -> Result<(), ContractError> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        // SAFETY: released exactly once, guarded by `released`
        let rc = unsafe { ffi::freenect_shutdown(self.ctx) };
        if rc < 0 {
            return Err(ContractError::Other(format!(
                "freenect_shutdown() failed ({rc})"
            )));
        }
        debug!("freenect context shut down");
        Ok(())
    }
}

impl Drop for FreenectContext {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(error = %e, "freenect context shutdown on drop failed");
        }
    }
}

/// Callbacks and frame sizes reachable from the C trampolines
#[derive(Default)]
struct CallbackSlots {
    callbacks: Mutex<[Option<FrameCallback>; 2]>,
    frame_bytes: [AtomicUsize; 2],
}

impl CallbackSlots {
    fn dispatch(&self, kind: FrameKind, data: *mut c_void, timestamp: u32) {
        let len = self.frame_bytes[kind.index()].load(Ordering::Acquire);
        if data.is_null() || len == 0 {
            return;
        }
        let callback = self
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)[kind.index()]
        .clone();
        let Some(callback) = callback else {
            return;
        };

        // SAFETY: libfreenect hands out a buffer of exactly the configured
        // mode's size, valid for the duration of the callback.
        let bytes = unsafe { std::slice::from_raw_parts(data as *const u8, len) };
        if panic::catch_unwind(AssertUnwindSafe(|| callback(bytes, timestamp))).is_err() {
            error!(kind = %kind, "frame callback panicked");
        }
    }
}

unsafe extern "C" fn depth_trampoline(dev: *mut ffi::freenect_device, data: *mut c_void, ts: u32) {
    trampoline(dev, FrameKind::Depth, data, ts);
}

unsafe extern "C" fn video_trampoline(dev: *mut ffi::freenect_device, data: *mut c_void, ts: u32) {
    trampoline(dev, FrameKind::Color, data, ts);
}

unsafe fn trampoline(dev: *mut ffi::freenect_device, kind: FrameKind, data: *mut c_void, ts: u32) {
    // SAFETY: user pointer was set to the device's `CallbackSlots` in
    // `open_device` and stays valid until the device is closed.
    let slots = unsafe { ffi::freenect_get_user(dev) } as *const CallbackSlots;
    if let Some(slots) = unsafe { slots.as_ref() } {
        slots.dispatch(kind, data, ts);
    }
}

/// Opened `freenect_device`
struct FreenectDevice {
    dev: *mut ffi::freenect_device,
    slots: Box<CallbackSlots>,
    closed: bool,
}

// SAFETY: the device pointer is only used from the session thread; the
// callbacks reach `slots` through libfreenect, guarded by its mutex.
unsafe impl Send for FreenectDevice {}

impl FreenectDevice {
    fn check(kind: FrameKind, call: &str, rc: c_int) -> Result<(), ContractError> {
        if rc < 0 {
            Err(ContractError::stream_control(
                kind,
                format!("{call}() failed ({rc})"),
            ))
        } else {
            Ok(())
        }
    }

    fn close_inner(&mut self) -> Result<(), ContractError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        // SAFETY: closed exactly once; the event pump no longer runs
        let rc = unsafe { ffi::freenect_close_device(self.dev) };
        if rc < 0 {
            return Err(ContractError::Other(format!(
                "freenect_close_device() failed ({rc})"
            )));
        }
        debug!("freenect device closed");
        Ok(())
    }
}

impl DeviceHandle for FreenectDevice {
    fn set_frame_callback(&mut self, kind: FrameKind, callback: FrameCallback) {
        self.slots
            .callbacks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)[kind.index()] = Some(callback);
    }

    fn set_frame_mode(&mut self, mode: FrameMode) -> Result<(), ContractError> {
        // SAFETY: device is open
        let (found, rc) = unsafe {
            match mode.kind {
                FrameKind::Color => {
                    let found = ffi::freenect_find_video_mode(
                        ffi::FREENECT_RESOLUTION_MEDIUM,
                        ffi::FREENECT_VIDEO_RGB,
                    );
                    (found, ffi::freenect_set_video_mode(self.dev, found))
                }
                FrameKind::Depth => {
                    let found = ffi::freenect_find_depth_mode(
                        ffi::FREENECT_RESOLUTION_MEDIUM,
                        ffi::FREENECT_DEPTH_MM,
                    );
                    (found, ffi::freenect_set_depth_mode(self.dev, found))
                }
            }
        };

        if found.is_valid == 0 {
            return Err(ContractError::stream_control(mode.kind, "mode not supported"));
        }
        Self::check(mode.kind, "freenect_set_mode", rc)?;

        if found.bytes as usize != mode.frame_bytes() {
            return Err(ContractError::stream_control(
                mode.kind,
                format!(
                    "driver frame is {} bytes, expected {}",
                    found.bytes,
                    mode.frame_bytes()
                ),
            ));
        }
        self.slots.frame_bytes[mode.kind.index()].store(mode.frame_bytes(), Ordering::Release);
        Ok(())
    }

    fn start_stream(&mut self, kind: FrameKind) -> Result<(), ContractError> {
        // SAFETY: device is open
        let rc = unsafe {
            match kind {
                FrameKind::Color => ffi::freenect_start_video(self.dev),
                FrameKind::Depth => ffi::freenect_start_depth(self.dev),
            }
        };
        Self::check(kind, "freenect_start", rc)
    }

    fn stop_stream(&mut self, kind: FrameKind) -> Result<(), ContractError> {
        // SAFETY: device is open
        let rc = unsafe {
            match kind {
                FrameKind::Color => ffi::freenect_stop_video(self.dev),
                FrameKind::Depth => ffi::freenect_stop_depth(self.dev),
            }
        };
        Self::check(kind, "freenect_stop", rc)
    }

    fn close(mut self: Box<Self>) -> Result<(), ContractError> {
        self.close_inner()
    }
}

impl Drop for FreenectDevice {
    fn drop(&mut self) {
        if let Err(e) = self.close_inner() {
            warn!(error = %e, "freenect device close on drop failed");
        }
    }
}
