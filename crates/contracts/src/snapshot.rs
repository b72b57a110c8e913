//! Snapshot metadata returned by a pull.

use serde::{Deserialize, Serialize};

use crate::FrameKind;

/// Per-kind provenance of a snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameStamp {
    /// Delivery sequence number of the copied frame (1-based, 0 = never delivered)
    pub sequence: u64,

    /// Driver timestamp of the copied frame
    pub timestamp: u32,

    /// Delivered since the previous snapshot
    pub fresh: bool,

    /// Deliveries overwritten before any snapshot saw them
    pub skipped: u64,
}

/// Metadata of one snapshot copy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameInfo {
    pub color: FrameStamp,
    pub depth: FrameStamp,
}

impl FrameInfo {
    /// Stamp for the given kind
    #[inline]
    pub fn stamp(&self, kind: FrameKind) -> &FrameStamp {
        match kind {
            FrameKind::Color => &self.color,
            FrameKind::Depth => &self.depth,
        }
    }

    /// Both frames were delivered since the previous snapshot
    #[inline]
    pub fn is_paired(&self) -> bool {
        self.color.fresh && self.depth.fresh
    }
}
