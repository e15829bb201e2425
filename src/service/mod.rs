//! Contract for the storage and listing backend.
//!
//! Everything persistent (image listings, GPS tracks, marked plots, masks)
//! lives behind [`FieldService`]. The engine never assumes a transport: an
//! HTTP client, a local database or the bundled [`MemoryService`] all fit.
//!
//! Calls are blocking. Lookups and prefetches are issued from the background
//! [`LookupWorker`](crate::worker::LookupWorker); user actions call the
//! service directly.

mod error;
pub mod memory;

pub use error::ServiceError;
pub use memory::MemoryService;

use crate::model::{
    CropMask, DirectoryKey, GpsShift, GpsTrackPoint, LatLon, PlotMembership, PlotSegment,
    ShiftStatus,
};

/// Backend operations consumed by the plot-marking engine.
pub trait FieldService: Send + Sync {
    /// Ordered image names of a directory.
    fn list_images(&self, dir: &DirectoryKey) -> Result<Vec<String>, ServiceError>;

    /// Georeference and plot membership of one image.
    fn image_plot_membership(
        &self,
        dir: &DirectoryKey,
        image: &str,
    ) -> Result<PlotMembership, ServiceError>;

    /// Recorded platform track, with any active shift applied.
    fn gps_track(&self, dir: &DirectoryKey) -> Result<Vec<GpsTrackPoint>, ServiceError>;

    fn gps_reference(&self, dir: &DirectoryKey) -> Result<Option<LatLon>, ServiceError>;

    fn set_gps_reference(&self, dir: &DirectoryKey, reference: LatLon)
    -> Result<(), ServiceError>;

    /// Shift the track so that `current` lands on the stored reference.
    fn apply_gps_shift(
        &self,
        dir: &DirectoryKey,
        current: LatLon,
    ) -> Result<GpsShift, ServiceError>;

    fn undo_gps_shift(&self, dir: &DirectoryKey) -> Result<(), ServiceError>;

    fn gps_shift_status(&self, dir: &DirectoryKey) -> Result<ShiftStatus, ServiceError>;

    /// Highest plot index in use, `None` when the directory has no plots.
    fn max_plot_index(&self, dir: &DirectoryKey) -> Result<Option<u32>, ServiceError>;

    fn marked_plots(&self, dir: &DirectoryKey) -> Result<Vec<PlotSegment>, ServiceError>;

    fn mark_plot(&self, dir: &DirectoryKey, segment: &PlotSegment) -> Result<(), ServiceError>;

    fn delete_plot(&self, dir: &DirectoryKey, plot_index: u32) -> Result<(), ServiceError>;

    fn save_stitch_mask(&self, dir: &DirectoryKey, mask: CropMask) -> Result<(), ServiceError>;

    /// Previously saved mask. Backends without mask readback return `None`.
    fn stitch_mask(&self, _dir: &DirectoryKey) -> Result<Option<CropMask>, ServiceError> {
        Ok(None)
    }

    /// Re-derive plot boundaries from the current (possibly shifted) track.
    fn refilter_plot_borders(&self, dir: &DirectoryKey) -> Result<(), ServiceError>;

    /// Resolved URL of an image; prefetch deduplication keys on this.
    fn image_url(&self, dir: &DirectoryKey, image: &str) -> String {
        format!("/images/{}/{}", dir, image)
    }

    /// Fetch image bytes to warm the transport cache. Returns the byte count.
    fn fetch_image(&self, url: &str) -> Result<usize, ServiceError>;
}
