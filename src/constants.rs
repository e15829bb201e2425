//! Global constants for plot marking.

use std::time::Duration;

/// Maximum number of plot-membership entries kept per directory.
pub const PLOT_CACHE_CAPACITY: usize = 50;

/// Delay between the last cursor movement and the committed index update.
pub const COMMIT_DEBOUNCE: Duration = Duration::from_millis(50);

/// Images skipped by a single jump.
pub const JUMP_STEP: usize = 10;

/// Neighbouring offsets whose image bytes are preloaded.
pub const NEIGHBOR_PREFETCH_OFFSETS: &[isize] = &[-3, -2, -1, 1, 2, 3];

/// Jump-target offsets whose image bytes are preloaded.
pub const JUMP_PREFETCH_OFFSETS: &[isize] = &[-30, -20, -10, 10, 20, 30];

/// Images on each side of the committed one whose metadata is warmed.
pub const METADATA_PREFETCH_RADIUS: usize = 2;

/// Concurrent background prefetch jobs.
pub const PREFETCH_MAX_IN_FLIGHT: usize = 4;

/// Default crop box side as a fraction of the smaller rendered dimension.
pub const CROP_DEFAULT_FRACTION: f64 = 0.3;

/// Smallest crop box edge, in display pixels.
pub const CROP_MIN_SIZE: f64 = 20.0;
