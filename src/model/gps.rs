//! GPS coordinates, reference points and track shifts.

use serde::{Deserialize, Serialize};

/// A WGS84 coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

impl LatLon {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Translate this coordinate by a shift.
    pub fn shifted(&self, shift: &GpsShift) -> Self {
        Self::new(self.lat + shift.lat_shift, self.lon + shift.lon_shift)
    }
}

/// One recorded fix of the platform track, in capture order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsTrackPoint {
    pub lon: f64,
    pub lat: f64,
}

impl GpsTrackPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lon, lat }
    }
}

impl From<GpsTrackPoint> for LatLon {
    fn from(p: GpsTrackPoint) -> Self {
        LatLon::new(p.lat, p.lon)
    }
}

/// Constant offset applied to a whole track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsShift {
    pub lat_shift: f64,
    pub lon_shift: f64,
}

impl GpsShift {
    /// Shift that moves `observed` onto `reference`.
    pub fn between(reference: LatLon, observed: LatLon) -> Self {
        Self {
            lat_shift: reference.lat - observed.lat,
            lon_shift: reference.lon - observed.lon,
        }
    }
}

/// Shift state reported by the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ShiftStatus {
    pub has_shift: bool,
    pub shift: Option<GpsShift>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-9;

    #[test]
    fn test_shift_moves_observed_onto_reference() {
        let reference = LatLon::new(38.0, -121.0);
        let observed = LatLon::new(38.0002, -121.0001);
        let shift = GpsShift::between(reference, observed);

        assert!((shift.lat_shift - -0.0002).abs() < EPSILON);
        assert!((shift.lon_shift - 0.0001).abs() < EPSILON);

        let corrected = observed.shifted(&shift);
        assert!((corrected.lat - reference.lat).abs() < EPSILON);
        assert!((corrected.lon - reference.lon).abs() < EPSILON);
    }
}
