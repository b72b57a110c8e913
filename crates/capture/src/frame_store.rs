//! Latest-frame store shared between the event pump and the consumer.
//!
//! One slot per frame kind, one `Mutex` over both slots and one `Condvar`
//! signalled on every delivery. Slots are overwritten in place; nothing is
//! queued. Every slot carries a delivery sequence number and the sequence
//! the previous snapshot saw, which is how a pull decides whether anything
//! new has arrived.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use contracts::{FrameGeometry, FrameInfo, FrameKind, FrameStamp, PairingPolicy};
use observability::metrics::{record_frame_delivered, record_frame_rejected, record_snapshot};
use tracing::{debug, trace};

use crate::error::{CaptureError, Result};

/// Why the store stopped accepting pulls
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Session shut down
    Shutdown,
    /// Event loop died with the given message
    EventLoopFailed(String),
}

impl CloseReason {
    fn to_error(&self) -> CaptureError {
        match self {
            CloseReason::Shutdown => CaptureError::SessionClosed,
            CloseReason::EventLoopFailed(message) => CaptureError::EventLoopFailed {
                message: message.clone(),
            },
        }
    }
}

#[derive(Debug)]
struct FrameSlot {
    data: Vec<u8>,
    sequence: u64,
    timestamp: u32,
    /// Sequence number handed out by the previous snapshot
    seen: u64,
}

impl FrameSlot {
    fn new(len: usize) -> Self {
        Self {
            data: vec![0; len],
            sequence: 0,
            timestamp: 0,
            seen: 0,
        }
    }

    #[inline]
    fn is_fresh(&self) -> bool {
        self.sequence > self.seen
    }

    /// Mark the current frame as seen and describe it
    fn take_stamp(&mut self) -> FrameStamp {
        let fresh = self.is_fresh();
        let skipped = if fresh {
            self.sequence - self.seen - 1
        } else {
            0
        };
        self.seen = self.sequence;

        FrameStamp {
            sequence: self.sequence,
            timestamp: self.timestamp,
            fresh,
            skipped,
        }
    }
}

#[derive(Debug)]
struct StoreState {
    slots: [FrameSlot; 2],
    closed: Option<CloseReason>,
}

impl StoreState {
    fn is_ready(&self, pairing: PairingPolicy) -> bool {
        match pairing {
            PairingPolicy::Latest => self.slots.iter().any(FrameSlot::is_fresh),
            PairingPolicy::Paired => self.slots.iter().all(FrameSlot::is_fresh),
        }
    }

    fn must_wait(&self, pairing: PairingPolicy) -> bool {
        self.closed.is_none() && !self.is_ready(pairing)
    }
}

/// Frame Store
///
/// Holds the most recent frame of each kind. `deliver` is called from the
/// event pump thread, `await_and_copy` from the consumer; all buffer access
/// happens under the one lock.
#[derive(Debug)]
pub struct FrameStore {
    geometry: FrameGeometry,
    pairing: PairingPolicy,
    state: Mutex<StoreState>,
    arrived: Condvar,
}

impl FrameStore {
    /// Create a store with zeroed buffers sized by `geometry`
    pub fn new(geometry: FrameGeometry, pairing: PairingPolicy) -> Self {
        Self {
            geometry,
            pairing,
            state: Mutex::new(StoreState {
                slots: [
                    FrameSlot::new(geometry.color_bytes()),
                    FrameSlot::new(geometry.depth_bytes()),
                ],
                closed: None,
            }),
            arrived: Condvar::new(),
        }
    }

    /// Frame geometry
    pub fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    /// Pairing policy used by pulls
    pub fn pairing(&self) -> PairingPolicy {
        self.pairing
    }

    /// Overwrite the slot for `kind` and wake the consumer
    ///
    /// `bytes` must be exactly one frame of `kind`; anything else is
    /// rejected without touching the slot. Deliveries to a closed store are
    /// dropped.
    pub fn deliver(&self, kind: FrameKind, bytes: &[u8], timestamp: u32) -> Result<()> {
        let expected = self.geometry.mode(kind).frame_bytes();
        if bytes.len() != expected {
            record_frame_rejected(kind);
            return Err(CaptureError::FrameSizeMismatch {
                kind,
                expected,
                actual: bytes.len(),
            });
        }

        let mut state = self.lock();
        if state.closed.is_some() {
            trace!(kind = %kind, "store closed, dropping delivery");
            return Ok(());
        }

        let slot = &mut state.slots[kind.index()];
        slot.data.copy_from_slice(bytes);
        slot.sequence += 1;
        slot.timestamp = timestamp;
        let sequence = slot.sequence;

        self.arrived.notify_all();
        drop(state);

        record_frame_delivered(kind);
        trace!(kind = %kind, sequence, timestamp, "frame delivered");
        Ok(())
    }

    /// Wait for fresh frames and copy both slots out
    ///
    /// Blocks until the pairing policy is satisfied relative to the previous
    /// snapshot, the store is closed, or `timeout` elapses (`None` waits
    /// forever). `color_out` must hold one color frame in bytes and
    /// `depth_out` one depth frame in samples.
    pub fn await_and_copy(
        &self,
        color_out: &mut [u8],
        depth_out: &mut [u16],
        timeout: Option<Duration>,
    ) -> Result<FrameInfo> {
        self.check_output(FrameKind::Color, color_out.len(), self.geometry.color_bytes())?;
        self.check_output(FrameKind::Depth, depth_out.len(), self.geometry.depth_samples())?;

        let started = Instant::now();
        let pairing = self.pairing;
        let guard = self.lock();

        let mut state = match timeout {
            None => self
                .arrived
                .wait_while(guard, |state| state.must_wait(pairing))
                .unwrap_or_else(PoisonError::into_inner),
            Some(timeout) => {
                let (state, result) = self
                    .arrived
                    .wait_timeout_while(guard, timeout, |state| state.must_wait(pairing))
                    .unwrap_or_else(PoisonError::into_inner);
                if result.timed_out() && state.must_wait(pairing) {
                    debug!(timeout_ms = timeout.as_millis() as u64, "pull timed out");
                    return Err(CaptureError::Timeout {
                        waited_ms: started.elapsed().as_millis() as u64,
                    });
                }
                state
            }
        };

        if let Some(reason) = &state.closed {
            return Err(reason.to_error());
        }

        color_out.copy_from_slice(&state.slots[FrameKind::Color.index()].data);
        bytemuck::cast_slice_mut::<u16, u8>(depth_out)
            .copy_from_slice(&state.slots[FrameKind::Depth.index()].data);

        let info = FrameInfo {
            color: state.slots[FrameKind::Color.index()].take_stamp(),
            depth: state.slots[FrameKind::Depth.index()].take_stamp(),
        };
        drop(state);

        record_snapshot(&info, started.elapsed());
        trace!(
            color_sequence = info.color.sequence,
            depth_sequence = info.depth.sequence,
            paired = info.is_paired(),
            "snapshot copied"
        );
        Ok(info)
    }

    /// Stop serving pulls and wake every waiter
    ///
    /// The first reason wins; later calls are no-ops.
    pub fn close(&self, reason: CloseReason) {
        let mut state = self.lock();
        if state.closed.is_none() {
            debug!(reason = ?reason, "frame store closed");
            state.closed = Some(reason);
        }
        self.arrived.notify_all();
    }

    /// Reason the store was closed, if it was
    pub fn close_reason(&self) -> Option<CloseReason> {
        self.lock().closed.clone()
    }

    /// Whether the store was closed
    pub fn is_closed(&self) -> bool {
        self.lock().closed.is_some()
    }

    fn check_output(&self, kind: FrameKind, actual: usize, expected: usize) -> Result<()> {
        if actual == expected {
            Ok(())
        } else {
            Err(CaptureError::BufferSizeMismatch {
                kind,
                expected,
                actual,
            })
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        // Slots hold plain bytes; a panic elsewhere cannot leave them torn
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
