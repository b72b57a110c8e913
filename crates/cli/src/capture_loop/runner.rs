//! Blocking capture loop.
//!
//! Runs on a blocking task: owns the session for the whole run and pulls
//! frames until the frame budget is reached or a stop is requested.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use capture::{CaptureError, CaptureSession, FrameInfo};
use contracts::{CaptureConfig, DeviceBackend, FrameGeometry};
use tracing::{debug, info, warn};

use super::RunStats;

/// Wait slice when no pull timeout is configured, so a stop request is
/// noticed between waits
const STOP_POLL: Duration = Duration::from_millis(500);

/// Run configuration
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Session configuration
    pub capture: CaptureConfig,

    /// Frame pairs to pull (None = until stopped)
    pub frames: Option<u64>,

    /// Print one report per frame pair
    pub print_frames: bool,
}

/// Capture runner
pub struct CaptureRunner {
    config: RunConfig,
    backend: Arc<dyn DeviceBackend>,
}

impl CaptureRunner {
    pub fn new(config: RunConfig, backend: Arc<dyn DeviceBackend>) -> Self {
        Self { config, backend }
    }

    /// Initialize a session, pull frames, shut the session down
    pub fn run(self, stop: &AtomicBool) -> Result<RunStats> {
        let started = Instant::now();
        let mut session = CaptureSession::new(self.backend.clone(), self.config.capture.clone());
        session
            .initialize()
            .with_context(|| format!("Failed to initialize {} device", self.backend.name()))?;
        info!(backend = self.backend.name(), "Capture session running");

        let mut stats = RunStats::default();
        let result = self.pull_loop(&session, stop, &mut stats);
        stats.duration = started.elapsed();

        if let Err(e) = session.shutdown() {
            warn!(error = %e, "Session shutdown reported an error");
        }

        result.context("Frame pull failed")?;
        Ok(stats)
    }

    fn pull_loop(
        &self,
        session: &CaptureSession,
        stop: &AtomicBool,
        stats: &mut RunStats,
    ) -> std::result::Result<(), CaptureError> {
        let configured = self.config.capture.pull.timeout();
        let wait = configured.unwrap_or(STOP_POLL);
        let geometry = session.geometry();
        let mut color = vec![0u8; geometry.color_bytes()];
        let mut depth = vec![0u16; geometry.depth_samples()];

        loop {
            if stop.load(Ordering::Acquire) {
                info!("Stop requested");
                return Ok(());
            }
            if self
                .config
                .frames
                .is_some_and(|limit| stats.frames_pulled >= limit)
            {
                return Ok(());
            }

            let pulled_at = Instant::now();
            match session.get_frames_timeout(&mut color, &mut depth, wait) {
                Ok(info) => {
                    stats.record(&info, pulled_at.elapsed());
                    if self.config.print_frames {
                        println!(
                            "{}",
                            FrameReport::new(stats.frames_pulled, &geometry, &color, &depth, &info)
                        );
                    }
                }
                Err(CaptureError::Timeout { .. }) if configured.is_none() => {
                    stats.idle_polls += 1;
                    debug!("No frames yet, still waiting");
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Per-frame report: shape and value range of both frames
pub struct FrameReport {
    index: u64,
    color_shape: (u32, u32, u32),
    depth_shape: (u32, u32),
    color_range: (u8, u8),
    depth_range: (u16, u16),
    info: FrameInfo,
}

impl FrameReport {
    pub fn new(
        index: u64,
        geometry: &FrameGeometry,
        color: &[u8],
        depth: &[u16],
        info: &FrameInfo,
    ) -> Self {
        Self {
            index,
            color_shape: (
                geometry.color.height,
                geometry.color.width,
                geometry.color.bytes_per_element,
            ),
            depth_shape: (geometry.depth.height, geometry.depth.width),
            color_range: range(color),
            depth_range: range(depth),
            info: *info,
        }
    }
}

fn range<T: Copy + Ord + Default>(values: &[T]) -> (T, T) {
    let lo = values.iter().copied().min().unwrap_or_default();
    let hi = values.iter().copied().max().unwrap_or_default();
    (lo, hi)
}

impl std::fmt::Display for FrameReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (h, w, c) = self.color_shape;
        let (dh, dw) = self.depth_shape;
        writeln!(
            f,
            "Frame {}: RGB shape: ({h}, {w}, {c}), Depth shape: ({dh}, {dw})",
            self.index
        )?;
        writeln!(
            f,
            "  RGB min: {}, max: {}{}",
            self.color_range.0,
            self.color_range.1,
            if self.info.color.fresh { "" } else { " (stale)" }
        )?;
        write!(
            f,
            "  Depth min: {}, max: {}{}",
            self.depth_range.0,
            self.depth_range.1,
            if self.info.depth.fresh { "" } else { " (stale)" }
        )
    }
}
