//! Frame kinds and fixed frame geometry.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Frame kind
///
/// Each kind has its own buffer, callback and stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    /// RGB888 video frame
    Color,
    /// 16-bit depth frame (millimetres)
    Depth,
}

impl FrameKind {
    /// Both kinds, color first
    pub const ALL: [FrameKind; 2] = [FrameKind::Color, FrameKind::Depth];

    /// Stable slot index (color = 0, depth = 1)
    #[inline]
    pub fn index(self) -> usize {
        match self {
            FrameKind::Color => 0,
            FrameKind::Depth => 1,
        }
    }

    /// Lowercase name, used as a metric label
    pub fn as_str(self) -> &'static str {
        match self {
            FrameKind::Color => "color",
            FrameKind::Depth => "depth",
        }
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Frame mode of one stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameMode {
    /// Frame kind this mode applies to
    pub kind: FrameKind,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Bytes per pixel (color) or per sample (depth)
    pub bytes_per_element: u32,
}

impl FrameMode {
    /// 640x480 RGB, 3 bytes per pixel
    pub const COLOR_DEFAULT: FrameMode = FrameMode {
        kind: FrameKind::Color,
        width: 640,
        height: 480,
        bytes_per_element: 3,
    };

    /// 640x480 depth in millimetres, 2 bytes per sample
    pub const DEPTH_DEFAULT: FrameMode = FrameMode {
        kind: FrameKind::Depth,
        width: 640,
        height: 480,
        bytes_per_element: 2,
    };

    /// Number of pixels / samples in one frame
    #[inline]
    pub fn elements(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Size of one frame in bytes
    #[inline]
    pub fn frame_bytes(&self) -> usize {
        self.elements() * self.bytes_per_element as usize
    }
}

/// Geometry of the color + depth pair
///
/// Fixed for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameGeometry {
    pub color: FrameMode,
    pub depth: FrameMode,
}

impl FrameGeometry {
    /// Mode for the given kind
    #[inline]
    pub fn mode(&self, kind: FrameKind) -> FrameMode {
        match kind {
            FrameKind::Color => self.color,
            FrameKind::Depth => self.depth,
        }
    }

    /// Color frame size in bytes
    #[inline]
    pub fn color_bytes(&self) -> usize {
        self.color.frame_bytes()
    }

    /// Depth frame size in bytes
    #[inline]
    pub fn depth_bytes(&self) -> usize {
        self.depth.frame_bytes()
    }

    /// Number of 16-bit depth samples per frame
    #[inline]
    pub fn depth_samples(&self) -> usize {
        self.depth.elements()
    }
}

impl Default for FrameGeometry {
    fn default() -> Self {
        Self {
            color: FrameMode::COLOR_DEFAULT,
            depth: FrameMode::DEPTH_DEFAULT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_geometry_sizes() {
        let geometry = FrameGeometry::default();
        assert_eq!(geometry.color_bytes(), 640 * 480 * 3);
        assert_eq!(geometry.depth_bytes(), 640 * 480 * 2);
        assert_eq!(geometry.depth_samples(), 640 * 480);
    }

    #[test]
    fn test_kind_index_and_label() {
        assert_eq!(FrameKind::Color.index(), 0);
        assert_eq!(FrameKind::Depth.index(), 1);
        assert_eq!(FrameKind::Depth.to_string(), "depth");
        assert_eq!(
            FrameGeometry::default().mode(FrameKind::Depth),
            FrameMode::DEPTH_DEFAULT
        );
    }
}
