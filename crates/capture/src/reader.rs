//! Consumer-side pull API.

use std::sync::Arc;
use std::time::Duration;

use contracts::{FrameGeometry, FrameInfo};

use crate::error::Result;
use crate::frame_store::FrameStore;

/// One owned color + depth snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramePair {
    /// RGB888, row-major
    pub color: Vec<u8>,
    /// Depth in millimetres, row-major
    pub depth: Vec<u16>,
    pub info: FrameInfo,
}

impl FramePair {
    /// Smallest and largest color byte
    pub fn color_range(&self) -> Option<(u8, u8)> {
        min_max(&self.color)
    }

    /// Smallest and largest depth sample
    pub fn depth_range(&self) -> Option<(u16, u16)> {
        min_max(&self.depth)
    }
}

fn min_max<T: Copy + Ord>(values: &[T]) -> Option<(T, T)> {
    let first = *values.first()?;
    Some(
        values
            .iter()
            .fold((first, first), |(lo, hi), &v| (lo.min(v), hi.max(v))),
    )
}

/// Cloneable handle for pulling frames
///
/// Lets a thread other than the session owner pull. Once the session shuts
/// down, every pull (including one already waiting) fails with
/// `SessionClosed`.
#[derive(Debug, Clone)]
pub struct FrameReader {
    store: Arc<FrameStore>,
    timeout: Option<Duration>,
}

impl FrameReader {
    pub(crate) fn new(store: Arc<FrameStore>, timeout: Option<Duration>) -> Self {
        Self { store, timeout }
    }

    /// Frame geometry; output buffers must match it
    pub fn geometry(&self) -> FrameGeometry {
        self.store.geometry()
    }

    /// Block for fresh frames and copy them into caller buffers
    ///
    /// Uses the session's configured timeout.
    pub fn get_frames(&self, color_out: &mut [u8], depth_out: &mut [u16]) -> Result<FrameInfo> {
        self.store.await_and_copy(color_out, depth_out, self.timeout)
    }

    /// Like `get_frames` with an explicit bound
    pub fn get_frames_timeout(
        &self,
        color_out: &mut [u8],
        depth_out: &mut [u16],
        timeout: Duration,
    ) -> Result<FrameInfo> {
        self.store.await_and_copy(color_out, depth_out, Some(timeout))
    }

    /// Block for fresh frames and return them in new buffers
    pub fn grab(&self) -> Result<FramePair> {
        let geometry = self.store.geometry();
        let mut color = vec![0u8; geometry.color_bytes()];
        let mut depth = vec![0u16; geometry.depth_samples()];
        let info = self.get_frames(&mut color, &mut depth)?;
        Ok(FramePair { color, depth, info })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{FrameKind, PairingPolicy};

    #[test]
    fn test_grab_allocates_full_frames() {
        let geometry = FrameGeometry::default();
        let store = Arc::new(FrameStore::new(geometry, PairingPolicy::Latest));
        let reader = FrameReader::new(store.clone(), Some(Duration::from_millis(100)));

        let mut raw_depth = vec![0u8; geometry.depth_bytes()];
        for (i, chunk) in raw_depth.chunks_exact_mut(2).enumerate() {
            chunk.copy_from_slice(&((i % 4000) as u16).to_ne_bytes());
        }
        store.deliver(FrameKind::Depth, &raw_depth, 1).unwrap();

        let pair = reader.grab().unwrap();
        assert_eq!(pair.color.len(), 640 * 480 * 3);
        assert_eq!(pair.depth.len(), 640 * 480);
        assert_eq!(pair.depth_range(), Some((0, 3999)));
        assert_eq!(pair.color_range(), Some((0, 0)));
        assert!(pair.info.depth.fresh);
    }

    #[test]
    fn test_min_max_empty() {
        assert_eq!(min_max::<u8>(&[]), None);
        assert_eq!(min_max(&[3u16, 1, 2]), Some((1, 3)));
    }
}
