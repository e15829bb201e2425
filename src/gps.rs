//! GPS reference capture and whole-track shift.
//!
//! The operator marks where the displayed image truly is (the reference),
//! navigates to the image the track currently places there, and applies a
//! shift. At most one shift is active per directory: applying again replaces
//! it, undo removes it. Every successful shift or undo clears the plot cache
//! before returning, so the re-filter that follows never reads stale entries.

use crate::cache::PlotIndexCache;
use crate::error::SessionError;
use crate::model::{DirectoryKey, GpsShift, GpsTrackPoint, LatLon};
use crate::service::FieldService;

/// Reference, shift and track state for one directory.
#[derive(Debug, Clone, Default)]
pub struct GpsAlignment {
    reference: Option<LatLon>,
    shift: Option<GpsShift>,
    track: Vec<GpsTrackPoint>,
}

impl GpsAlignment {
    /// Load the stored reference, shift status and track.
    pub fn load(service: &dyn FieldService, dir: &DirectoryKey) -> Result<Self, SessionError> {
        let reference = service.gps_reference(dir)?;
        let status = service.gps_shift_status(dir)?;
        let track = service.gps_track(dir)?;
        log::debug!(
            "GPS: loaded {} track points, reference {:?}, shift {:?}",
            track.len(),
            reference,
            status.shift
        );
        Ok(Self {
            reference,
            shift: status.shift.filter(|_| status.has_shift),
            track,
        })
    }

    pub fn reference(&self) -> Option<LatLon> {
        self.reference
    }

    pub fn shift(&self) -> Option<GpsShift> {
        self.shift
    }

    pub fn has_shift(&self) -> bool {
        self.shift.is_some()
    }

    pub fn track(&self) -> &[GpsTrackPoint] {
        &self.track
    }

    /// Store `current` as the reference, replacing any previous one.
    pub fn mark_reference(
        &mut self,
        service: &dyn FieldService,
        dir: &DirectoryKey,
        current: Option<LatLon>,
    ) -> Result<LatLon, SessionError> {
        let current = current.ok_or(SessionError::NoCurrentPosition)?;
        service.set_gps_reference(dir, current)?;
        log::info!("GPS: reference set to ({:.7}, {:.7})", current.lat, current.lon);
        self.reference = Some(current);
        Ok(current)
    }

    /// Shift the track so that `current` moves onto the reference.
    pub fn apply_shift(
        &mut self,
        service: &dyn FieldService,
        dir: &DirectoryKey,
        current: Option<LatLon>,
        cache: &mut PlotIndexCache,
    ) -> Result<GpsShift, SessionError> {
        let reference = self.reference.ok_or(SessionError::MissingReference)?;
        let current = current.ok_or(SessionError::NoCurrentPosition)?;
        let shift = GpsShift::between(reference, current);

        let reported = service.apply_gps_shift(dir, current)?;
        if (reported.lat_shift - shift.lat_shift).abs() > 1e-9
            || (reported.lon_shift - shift.lon_shift).abs() > 1e-9
        {
            log::warn!(
                "GPS: backend reported shift {:?}, expected {:?}",
                reported,
                shift
            );
        }

        if let Some(previous) = self.shift.replace(shift) {
            log::info!("GPS: replaced shift {:?}", previous);
        }
        log::info!(
            "GPS: applied shift lat {:+.7}, lon {:+.7}",
            shift.lat_shift,
            shift.lon_shift
        );
        cache.invalidate_all();
        Ok(shift)
    }

    /// Remove the active shift.
    pub fn undo_shift(
        &mut self,
        service: &dyn FieldService,
        dir: &DirectoryKey,
        cache: &mut PlotIndexCache,
    ) -> Result<(), SessionError> {
        if self.shift.is_none() {
            return Err(SessionError::NoActiveShift);
        }
        service.undo_gps_shift(dir)?;
        self.shift = None;
        log::info!("GPS: shift undone");
        cache.invalidate_all();
        Ok(())
    }

    /// Re-read the (possibly shifted) track.
    pub fn reload_track(
        &mut self,
        service: &dyn FieldService,
        dir: &DirectoryKey,
    ) -> Result<(), SessionError> {
        self.track = service.gps_track(dir)?;
        Ok(())
    }
}
