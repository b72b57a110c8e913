//! Capture metrics
//!
//! Free functions record into the global `metrics` recorder (a no-op until
//! an exporter is installed). `CaptureMetricsAggregator` keeps the same
//! numbers in memory so a run can print its own summary.

use std::time::Duration;

use contracts::{FrameInfo, FrameKind};
use metrics::{counter, gauge, histogram};

/// Record one accepted delivery
pub fn record_frame_delivered(kind: FrameKind) {
    counter!("depth_capture_frames_delivered_total", "kind" => kind.as_str()).increment(1);
}

/// Record a delivery rejected for having the wrong size
pub fn record_frame_rejected(kind: FrameKind) {
    counter!("depth_capture_frames_rejected_total", "kind" => kind.as_str()).increment(1);
}

/// Record a snapshot handed to the consumer
///
/// # Example
///
/// ```ignore
/// let started = Instant::now();
/// let info = store.await_and_copy(&mut color, &mut depth, None)?;
/// record_snapshot(&info, started.elapsed());
/// ```
pub fn record_snapshot(info: &FrameInfo, waited: Duration) {
    counter!("depth_capture_snapshots_total").increment(1);
    histogram!("depth_capture_pull_wait_ms").record(waited.as_secs_f64() * 1000.0);

    for kind in FrameKind::ALL {
        let stamp = info.stamp(kind);
        if stamp.skipped > 0 {
            counter!("depth_capture_frames_overwritten_total", "kind" => kind.as_str())
                .increment(stamp.skipped);
        }
        if !stamp.fresh {
            counter!("depth_capture_stale_frames_total", "kind" => kind.as_str()).increment(1);
        }
        gauge!("depth_capture_last_sequence", "kind" => kind.as_str()).set(stamp.sequence as f64);
    }
}

/// Record the event pump dying on a driver error
pub fn record_pump_failure() {
    counter!("depth_capture_pump_failures_total").increment(1);
}

/// In-memory capture statistics
#[derive(Debug, Clone, Default)]
pub struct CaptureMetricsAggregator {
    /// Snapshots taken
    pub snapshots: u64,

    /// Snapshots where both frames were fresh
    pub paired_snapshots: u64,

    /// Stale frames handed out, per kind (color, depth)
    pub stale: [u64; 2],

    /// Deliveries overwritten before being seen, per kind (color, depth)
    pub overwritten: [u64; 2],

    /// Time spent waiting inside a pull (ms)
    pub wait_stats: RunningStats,
}

impl CaptureMetricsAggregator {
    /// Create an empty aggregator
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one snapshot into the statistics
    pub fn update(&mut self, info: &FrameInfo, waited: Duration) {
        self.snapshots += 1;
        if info.is_paired() {
            self.paired_snapshots += 1;
        }

        for kind in FrameKind::ALL {
            let stamp = info.stamp(kind);
            self.overwritten[kind.index()] += stamp.skipped;
            if !stamp.fresh {
                self.stale[kind.index()] += 1;
            }
        }

        self.wait_stats.push(waited.as_secs_f64() * 1000.0);
    }

    /// Build a summary
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            snapshots: self.snapshots,
            paired_snapshots: self.paired_snapshots,
            paired_rate: if self.snapshots > 0 {
                self.paired_snapshots as f64 / self.snapshots as f64 * 100.0
            } else {
                0.0
            },
            stale_color: self.stale[FrameKind::Color.index()],
            stale_depth: self.stale[FrameKind::Depth.index()],
            overwritten_color: self.overwritten[FrameKind::Color.index()],
            overwritten_depth: self.overwritten[FrameKind::Depth.index()],
            wait_ms: StatsSummary::from(&self.wait_stats),
        }
    }

    /// Reset all statistics
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Summary of a capture run
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub snapshots: u64,
    pub paired_snapshots: u64,
    pub paired_rate: f64,
    pub stale_color: u64,
    pub stale_depth: u64,
    pub overwritten_color: u64,
    pub overwritten_depth: u64,
    pub wait_ms: StatsSummary,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Capture Metrics Summary ===")?;
        writeln!(f, "Snapshots: {}", self.snapshots)?;
        writeln!(
            f,
            "Paired snapshots: {} ({:.2}%)",
            self.paired_snapshots, self.paired_rate
        )?;
        writeln!(
            f,
            "Stale frames: color={}, depth={}",
            self.stale_color, self.stale_depth
        )?;
        writeln!(
            f,
            "Overwritten frames: color={}, depth={}",
            self.overwritten_color, self.overwritten_depth
        )?;
        writeln!(f, "Pull wait (ms): {}", self.wait_ms)
    }
}

/// Statistics summary
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online statistics (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// Add a sample
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
