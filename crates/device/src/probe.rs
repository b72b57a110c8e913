//! Mock probe
//!
//! Records what the capture core did to the mock collaborator, so tests can
//! assert acquire/release ordering and that nothing is released twice.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use contracts::{FrameKind, Subdevices};

/// One lifecycle call observed by the mock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeEvent {
    ContextAcquired,
    SubdevicesSelected(Subdevices),
    DeviceOpened(u32),
    FrameModeSet(FrameKind),
    StreamStarted(FrameKind),
    StreamStopped(FrameKind),
    DeviceClosed,
    ContextReleased,
}

/// Counters and an ordered event log shared by every handle of one backend
#[derive(Debug, Default)]
pub struct MockProbe {
    events: Mutex<Vec<ProbeEvent>>,
    event_calls: AtomicU64,
    events_while_closed: AtomicU64,
    delivered: [AtomicU64; 2],
}

impl MockProbe {
    pub(crate) fn record(&self, event: ProbeEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    pub(crate) fn record_event_call(&self, device_open: bool) -> u64 {
        if !device_open {
            self.events_while_closed.fetch_add(1, Ordering::SeqCst);
        }
        self.event_calls.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub(crate) fn record_delivery(&self, kind: FrameKind) {
        self.delivered[kind.index()].fetch_add(1, Ordering::SeqCst);
    }

    /// Lifecycle calls in the order they happened
    pub fn events(&self) -> Vec<ProbeEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn count(&self, matches: impl Fn(&ProbeEvent) -> bool) -> u64 {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| matches(e))
            .count() as u64
    }

    pub fn contexts_acquired(&self) -> u64 {
        self.count(|e| matches!(e, ProbeEvent::ContextAcquired))
    }

    pub fn contexts_released(&self) -> u64 {
        self.count(|e| matches!(e, ProbeEvent::ContextReleased))
    }

    pub fn devices_opened(&self) -> u64 {
        self.count(|e| matches!(e, ProbeEvent::DeviceOpened(_)))
    }

    pub fn devices_closed(&self) -> u64 {
        self.count(|e| matches!(e, ProbeEvent::DeviceClosed))
    }

    pub fn streams_started(&self, kind: FrameKind) -> u64 {
        self.count(|e| *e == ProbeEvent::StreamStarted(kind))
    }

    pub fn streams_stopped(&self, kind: FrameKind) -> u64 {
        self.count(|e| *e == ProbeEvent::StreamStopped(kind))
    }

    /// Last subdevice selection, if any
    pub fn subdevices(&self) -> Option<Subdevices> {
        self.events().iter().rev().find_map(|e| match e {
            ProbeEvent::SubdevicesSelected(s) => Some(*s),
            _ => None,
        })
    }

    /// Number of `process_events` calls
    pub fn event_calls(&self) -> u64 {
        self.event_calls.load(Ordering::SeqCst)
    }

    /// `process_events` calls made while no device was open
    pub fn events_while_closed(&self) -> u64 {
        self.events_while_closed.load(Ordering::SeqCst)
    }

    /// Frames handed to delivery callbacks
    pub fn frames_delivered(&self, kind: FrameKind) -> u64 {
        self.delivered[kind.index()].load(Ordering::SeqCst)
    }
}
