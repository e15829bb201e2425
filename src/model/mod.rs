//! Data models for plot marking.

mod directory;
mod gps;
mod mask;
mod plot;

pub use directory::DirectoryKey;
pub use gps::{GpsShift, GpsTrackPoint, LatLon, ShiftStatus};
pub use mask::CropMask;
pub use plot::{PlotMembership, PlotSegment, StitchDirection};
