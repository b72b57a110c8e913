//! Run statistics.

use std::time::Duration;

use capture::FrameInfo;
use observability::CaptureMetricsAggregator;

/// Statistics from a capture run
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    /// Frame pairs handed to the caller
    pub frames_pulled: u64,

    /// Bounded waits that ended without frames (only when no pull timeout is configured)
    pub idle_polls: u64,

    /// Total duration of the run
    pub duration: Duration,

    /// Per-snapshot metrics
    pub capture_metrics: CaptureMetricsAggregator,
}

impl RunStats {
    /// Record one pulled snapshot
    pub fn record(&mut self, info: &FrameInfo, waited: Duration) {
        self.frames_pulled += 1;
        self.capture_metrics.update(info, waited);
    }

    /// Frame pairs per second
    pub fn fps(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.frames_pulled as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n=== Run Summary ===");
        println!("  Duration: {:.2}s", self.duration.as_secs_f64());
        println!("  Frames pulled: {}", self.frames_pulled);
        println!("  FPS: {:.2}", self.fps());
        if self.idle_polls > 0 {
            println!("  Idle polls: {}", self.idle_polls);
        }
        println!();
        print!("{}", self.capture_metrics.summary());
        println!();
    }
}
