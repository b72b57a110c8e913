//! Event pump: drives the device event loop on a dedicated thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use contracts::DeviceContext;
use observability::metrics::record_pump_failure;
use tracing::{debug, info, warn};

use crate::error::{CaptureError, Result};
use crate::frame_store::{CloseReason, FrameStore};

/// Name of the pump thread
pub const PUMP_THREAD_NAME: &str = "capture-event-pump";

/// Lifecycle of an `EventPump`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpState {
    NotStarted,
    Running,
    StopRequested,
    Joined,
}

/// How the pump thread ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PumpExit {
    /// Observed the stop flag
    Stopped,
    /// The device event loop reported a fatal error
    Failed(String),
}

/// Event Pump
///
/// Calls `DeviceContext::process_events` in a loop until `stop()` is
/// requested or the driver reports an error. Delivery callbacks run inside
/// that call, on the pump thread. Stopping is cooperative: an in-flight
/// `process_events` call finishes first, bounded by the poll timeout.
pub struct EventPump {
    state: PumpState,
    stop_requested: Arc<AtomicBool>,
    poll_timeout: Option<Duration>,
    handle: Option<JoinHandle<PumpExit>>,
}

impl EventPump {
    /// Create a pump; nothing runs until `start`
    pub fn new(poll_timeout: Option<Duration>) -> Self {
        Self {
            state: PumpState::NotStarted,
            stop_requested: Arc::new(AtomicBool::new(false)),
            poll_timeout,
            handle: None,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> PumpState {
        self.state
    }

    /// Whether the pump thread is still alive
    pub fn is_running(&self) -> bool {
        self.handle
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Spawn the pump thread
    ///
    /// On a driver error or a panic the thread closes `store` so blocked consumers
    /// return instead of waiting for frames that will never come.
    pub fn start(&mut self, context: Arc<dyn DeviceContext>, store: Arc<FrameStore>) -> Result<()> {
        if self.state != PumpState::NotStarted {
            return Err(CaptureError::PumpAlreadyStarted);
        }

        let stop_requested = self.stop_requested.clone();
        let poll_timeout = self.poll_timeout;

        let handle = thread::Builder::new()
            .name(PUMP_THREAD_NAME.to_string())
            .spawn(move || run(context.as_ref(), &store, &stop_requested, poll_timeout))
            .map_err(CaptureError::PumpSpawn)?;

        self.handle = Some(handle);
        self.state = PumpState::Running;
        debug!(poll_timeout = ?poll_timeout, "event pump started");
        Ok(())
    }

    /// Request the loop to exit at its next iteration boundary
    ///
    /// No-op unless the pump is running.
    pub fn stop(&mut self) {
        if self.state == PumpState::Running {
            self.stop_requested.store(true, Ordering::Release);
            self.state = PumpState::StopRequested;
            debug!("event pump stop requested");
        }
    }

    /// Wait for the pump thread to exit
    ///
    /// Valid once, after `stop()`.
    pub fn join(&mut self) -> Result<PumpExit> {
        match self.state {
            PumpState::NotStarted | PumpState::Running => return Err(CaptureError::PumpNotStopped),
            PumpState::Joined => return Err(CaptureError::PumpAlreadyJoined),
            PumpState::StopRequested => {}
        }

        self.state = PumpState::Joined;
        let handle = self.handle.take().ok_or(CaptureError::PumpAlreadyJoined)?;
        let exit = handle.join().map_err(|_| CaptureError::PumpPanicked)?;
        debug!(exit = ?exit, "event pump joined");
        Ok(exit)
    }
}

impl Drop for EventPump {
    fn drop(&mut self) {
        if self.state == PumpState::Running {
            self.stop();
        }
        if self.state == PumpState::StopRequested {
            if let Err(e) = self.join() {
                warn!(error = %e, "event pump did not exit cleanly");
            }
        }
    }
}

fn run(
    context: &dyn DeviceContext,
    store: &FrameStore,
    stop_requested: &AtomicBool,
    poll_timeout: Option<Duration>,
) -> PumpExit {
    let _guard = ClosesStoreOnPanic { store };
    let mut iterations: u64 = 0;

    let exit = loop {
        if stop_requested.load(Ordering::Acquire) {
            break PumpExit::Stopped;
        }

        if let Err(e) = context.process_events(poll_timeout) {
            let message = e.to_string();
            warn!(error = %message, iterations, "device event loop failed, pump exiting");
            record_pump_failure();
            store.close(CloseReason::EventLoopFailed(message.clone()));
            break PumpExit::Failed(message);
        }
        iterations += 1;
    };

    info!(iterations, exit = ?exit, "event pump exited");
    exit
}

/// Closes the store if the pump thread unwinds
///
/// A panic in `process_events` or in a delivery callback would otherwise
/// leave consumers waiting on a store nobody feeds.
struct ClosesStoreOnPanic<'a> {
    store: &'a FrameStore,
}

impl Drop for ClosesStoreOnPanic<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            warn!("event pump panicked, closing frame store");
            record_pump_failure();
            self.store
                .close(CloseReason::EventLoopFailed(PUMP_PANIC_MESSAGE.to_string()));
        }
    }
}

const PUMP_PANIC_MESSAGE: &str = "event pump panicked";

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{ContractError, DeviceHandle, FrameGeometry, PairingPolicy, Subdevices};
    use std::sync::atomic::AtomicU64;
    use std::time::Instant;

    /// Context whose event loop only counts, sleeps and optionally fails
    #[derive(Default)]
    struct ScriptedContext {
        calls: AtomicU64,
        fail_on_call: Option<u64>,
        panic_on_call: Option<u64>,
        latency: Duration,
    }

    impl DeviceContext for ScriptedContext {
        fn select_subdevices(&self, _subdevices: Subdevices) {}

        fn open_device(&self, index: u32) -> std::result::Result<Box<dyn DeviceHandle>, ContractError> {
            Err(ContractError::device_open(index, "scripted context has no devices"))
        }

        fn process_events(&self, _timeout: Option<Duration>) -> std::result::Result<(), ContractError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.panic_on_call == Some(call) {
                panic!("scripted panic");
            }
            if self.fail_on_call == Some(call) {
                return Err(ContractError::event_loop("scripted failure"));
            }
            thread::sleep(self.latency);
            Ok(())
        }

        fn shutdown(&self) -> std::result::Result<(), ContractError> {
            Ok(())
        }
    }

    fn store() -> Arc<FrameStore> {
        Arc::new(FrameStore::new(FrameGeometry::default(), PairingPolicy::Latest))
    }

    fn wait_until_finished(pump: &EventPump) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while pump.is_running() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_stop_then_join() {
        let context = Arc::new(ScriptedContext {
            latency: Duration::from_millis(1),
            ..Default::default()
        });
        let mut pump = EventPump::new(None);
        pump.start(context.clone(), store()).unwrap();
        assert_eq!(pump.state(), PumpState::Running);

        thread::sleep(Duration::from_millis(20));
        pump.stop();
        assert_eq!(pump.state(), PumpState::StopRequested);
        assert_eq!(pump.join().unwrap(), PumpExit::Stopped);
        assert_eq!(pump.state(), PumpState::Joined);
        assert!(context.calls.load(Ordering::SeqCst) > 0);
    }

    #[test]
    fn test_stop_is_observed_within_one_iteration() {
        let context = Arc::new(ScriptedContext {
            latency: Duration::from_millis(50),
            ..Default::default()
        });
        let mut pump = EventPump::new(Some(Duration::from_millis(50)));
        pump.start(context.clone(), store()).unwrap();

        thread::sleep(Duration::from_millis(10));
        let stopped_at = Instant::now();
        pump.stop();
        let calls_at_stop = context.calls.load(Ordering::SeqCst);
        pump.join().unwrap();

        // One in-flight call may finish, no new call may start
        assert!(stopped_at.elapsed() < Duration::from_millis(500));
        assert!(context.calls.load(Ordering::SeqCst) <= calls_at_stop + 1);
    }

    #[test]
    fn test_misuse_is_reported() {
        let mut pump = EventPump::new(None);
        assert!(matches!(pump.join(), Err(CaptureError::PumpNotStopped)));

        let context = Arc::new(ScriptedContext::default());
        pump.start(context.clone(), store()).unwrap();
        assert!(matches!(
            pump.start(context, store()),
            Err(CaptureError::PumpAlreadyStarted)
        ));
        assert!(matches!(pump.join(), Err(CaptureError::PumpNotStopped)));

        pump.stop();
        pump.join().unwrap();
        assert!(matches!(pump.join(), Err(CaptureError::PumpAlreadyJoined)));
    }

    #[test]
    fn test_driver_error_ends_loop_and_closes_store() {
        let context = Arc::new(ScriptedContext {
            fail_on_call: Some(1),
            ..Default::default()
        });
        let store = store();
        let mut pump = EventPump::new(None);
        pump.start(context.clone(), store.clone()).unwrap();

        wait_until_finished(&pump);
        assert!(!pump.is_running());
        assert_eq!(context.calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            store.close_reason(),
            Some(CloseReason::EventLoopFailed(_))
        ));

        // A dead pump still goes through stop/join
        pump.stop();
        assert!(matches!(pump.join().unwrap(), PumpExit::Failed(m) if m.contains("scripted failure")));

        let mut color = vec![0u8; FrameGeometry::default().color_bytes()];
        let mut depth = vec![0u16; FrameGeometry::default().depth_samples()];
        let err = store.await_and_copy(&mut color, &mut depth, None).unwrap_err();
        assert!(matches!(err, CaptureError::EventLoopFailed { .. }));
    }

    #[test]
    fn test_panicking_pump_is_reported() {
        let context = Arc::new(ScriptedContext {
            panic_on_call: Some(1),
            ..Default::default()
        });
        let mut pump = EventPump::new(None);
        pump.start(context, store()).unwrap();

        wait_until_finished(&pump);
        pump.stop();
        assert!(matches!(pump.join(), Err(CaptureError::PumpPanicked)));
    }

    #[test]
    fn test_panicking_pump_closes_store() {
        let context = Arc::new(ScriptedContext {
            panic_on_call: Some(3),
            latency: Duration::from_millis(1),
            ..Default::default()
        });
        let store = store();
        let mut pump = EventPump::new(None);
        pump.start(context, store.clone()).unwrap();

        wait_until_finished(&pump);
        assert!(!pump.is_running());
        assert_eq!(
            store.close_reason(),
            Some(CloseReason::EventLoopFailed("event pump panicked".to_string()))
        );

        // Untimed pull must return rather than wait on a dead pump
        let mut color = vec![0u8; FrameGeometry::default().color_bytes()];
        let mut depth = vec![0u16; FrameGeometry::default().depth_samples()];
        let err = store.await_and_copy(&mut color, &mut depth, None).unwrap_err();
        assert!(matches!(err, CaptureError::EventLoopFailed { .. }));

        pump.stop();
        assert!(matches!(pump.join(), Err(CaptureError::PumpPanicked)));
    }

    #[test]
    fn test_drop_stops_running_pump() {
        let context = Arc::new(ScriptedContext {
            latency: Duration::from_millis(1),
            ..Default::default()
        });
        {
            let mut pump = EventPump::new(None);
            pump.start(context.clone(), store()).unwrap();
            thread::sleep(Duration::from_millis(5));
        }
        let calls = context.calls.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(context.calls.load(Ordering::SeqCst), calls);
    }
}
