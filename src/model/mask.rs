//! Stitch mask: per-edge pixel insets trimmed before stitching.

use serde::{Deserialize, Serialize};

/// Border exclusion in natural image pixels.
///
/// Each field is the number of pixels removed from that edge of every image
/// in a directory. This is not a rectangle: `right` counts from the right edge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropMask {
    pub left: u32,
    pub right: u32,
    pub top: u32,
    pub bottom: u32,
}

impl CropMask {
    pub fn new(left: u32, right: u32, top: u32, bottom: u32) -> Self {
        Self {
            left,
            right,
            top,
            bottom,
        }
    }

    /// Insets in persisted order: `[left, right, top, bottom]`.
    pub fn to_array(&self) -> [u32; 4] {
        [self.left, self.right, self.top, self.bottom]
    }

    /// Size of the region kept from a `width` x `height` image.
    pub fn kept_size(&self, width: u32, height: u32) -> (u32, u32) {
        (
            width.saturating_sub(self.left.saturating_add(self.right)),
            height.saturating_sub(self.top.saturating_add(self.bottom)),
        )
    }
}
