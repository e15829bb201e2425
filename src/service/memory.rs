//! In-process [`FieldService`] backend.
//!
//! Keeps every directory in memory. Positions are stored unshifted and the
//! active shift is applied on read, matching how a real backend serves a
//! corrected track. Each call is counted under its method name, and a single
//! failure can be armed per method with [`MemoryService::fail_next`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use super::{FieldService, ServiceError};
use crate::model::{
    CropMask, DirectoryKey, GpsShift, GpsTrackPoint, LatLon, PlotMembership, PlotSegment,
    ShiftStatus,
};

#[derive(Debug, Default)]
struct DirectoryData {
    images: Vec<String>,
    /// Unshifted georeference per image
    positions: HashMap<String, LatLon>,
    /// Unshifted track
    track: Vec<GpsTrackPoint>,
    reference: Option<LatLon>,
    shift: Option<GpsShift>,
    plots: BTreeMap<u32, PlotSegment>,
    mask: Option<CropMask>,
}

impl DirectoryData {
    fn index_of(&self, image: &str) -> Option<usize> {
        self.images.iter().position(|i| i == image)
    }

    fn shifted(&self, p: LatLon) -> LatLon {
        match &self.shift {
            Some(shift) => p.shifted(shift),
            None => p,
        }
    }

    fn plot_containing(&self, image: &str) -> Option<&PlotSegment> {
        let idx = self.index_of(image)?;
        self.plots.values().find(|plot| {
            match (self.index_of(&plot.start_image), self.index_of(&plot.end_image)) {
                (Some(a), Some(b)) => (a.min(b)..=a.max(b)).contains(&idx),
                _ => false,
            }
        })
    }
}

#[derive(Debug, Default)]
struct State {
    directories: HashMap<DirectoryKey, DirectoryData>,
    calls: HashMap<&'static str, usize>,
    armed_failures: HashSet<&'static str>,
}

/// In-memory backend with call accounting and failure injection.
#[derive(Debug, Default)]
pub struct MemoryService {
    state: Mutex<State>,
    /// Artificial delay applied to lookups and image fetches
    latency: Duration,
}

impl MemoryService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every membership lookup and image fetch by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Register a directory. `positions` aligns with `images` by index;
    /// missing trailing positions leave those images without a coordinate.
    pub fn add_directory(&self, dir: DirectoryKey, images: Vec<String>, positions: Vec<LatLon>) {
        let mut data = DirectoryData {
            track: positions
                .iter()
                .map(|p| GpsTrackPoint::new(p.lat, p.lon))
                .collect(),
            ..Default::default()
        };
        for (image, pos) in images.iter().zip(positions) {
            data.positions.insert(image.clone(), pos);
        }
        data.images = images;

        if let Ok(mut state) = self.state.lock() {
            log::debug!("Memory backend: added directory {}", dir);
            state.directories.insert(dir, data);
        }
    }

    /// Make the next call to `operation` fail with [`ServiceError::Unavailable`].
    pub fn fail_next(&self, operation: &'static str) {
        if let Ok(mut state) = self.state.lock() {
            state.armed_failures.insert(operation);
        }
    }

    /// Number of calls made to `operation` so far.
    pub fn call_count(&self, operation: &str) -> usize {
        self.state
            .lock()
            .map(|s| s.calls.get(operation).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    fn call<T>(
        &self,
        operation: &'static str,
        dir: &DirectoryKey,
        f: impl FnOnce(&mut DirectoryData) -> Result<T, ServiceError>,
    ) -> Result<T, ServiceError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| ServiceError::Unavailable("memory backend lock poisoned".to_string()))?;
        *state.calls.entry(operation).or_insert(0) += 1;
        if state.armed_failures.remove(operation) {
            return Err(ServiceError::Unavailable(format!(
                "{} failed (injected)",
                operation
            )));
        }
        let data = state
            .directories
            .get_mut(dir)
            .ok_or_else(|| ServiceError::NotFound(dir.to_string()))?;
        f(data)
    }

    fn delay(&self) {
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
    }
}

impl FieldService for MemoryService {
    fn list_images(&self, dir: &DirectoryKey) -> Result<Vec<String>, ServiceError> {
        self.call("list_images", dir, |d| Ok(d.images.clone()))
    }

    fn image_plot_membership(
        &self,
        dir: &DirectoryKey,
        image: &str,
    ) -> Result<PlotMembership, ServiceError> {
        self.delay();
        self.call("image_plot_membership", dir, |d| {
            if d.index_of(image).is_none() {
                return Err(ServiceError::NotFound(image.to_string()));
            }
            let position = d.positions.get(image).map(|p| d.shifted(*p));
            let plot = d.plot_containing(image);
            Ok(PlotMembership {
                plot_index: plot.map(|p| p.plot_index),
                lat: position.map(|p| p.lat),
                lon: position.map(|p| p.lon),
                plot_label: plot.and_then(|p| p.plot_label.clone()),
                accession: plot.and_then(|p| p.accession.clone()),
            })
        })
    }

    fn gps_track(&self, dir: &DirectoryKey) -> Result<Vec<GpsTrackPoint>, ServiceError> {
        self.call("gps_track", dir, |d| {
            Ok(d
                .track
                .iter()
                .map(|p| {
                    let s = d.shifted((*p).into());
                    GpsTrackPoint::new(s.lat, s.lon)
                })
                .collect())
        })
    }

    fn gps_reference(&self, dir: &DirectoryKey) -> Result<Option<LatLon>, ServiceError> {
        self.call("gps_reference", dir, |d| Ok(d.reference))
    }

    fn set_gps_reference(
        &self,
        dir: &DirectoryKey,
        reference: LatLon,
    ) -> Result<(), ServiceError> {
        self.call("set_gps_reference", dir, |d| {
            d.reference = Some(reference);
            Ok(())
        })
    }

    fn apply_gps_shift(
        &self,
        dir: &DirectoryKey,
        current: LatLon,
    ) -> Result<GpsShift, ServiceError> {
        self.call("apply_gps_shift", dir, |d| {
            let reference = d
                .reference
                .ok_or_else(|| ServiceError::rejected("apply_gps_shift", "no reference set"))?;
            let shift = GpsShift::between(reference, current);
            d.shift = Some(shift);
            Ok(shift)
        })
    }

    fn undo_gps_shift(&self, dir: &DirectoryKey) -> Result<(), ServiceError> {
        self.call("undo_gps_shift", dir, |d| {
            d.shift
                .take()
                .map(|_| ())
                .ok_or_else(|| ServiceError::rejected("undo_gps_shift", "no shift active"))
        })
    }

    fn gps_shift_status(&self, dir: &DirectoryKey) -> Result<ShiftStatus, ServiceError> {
        self.call("gps_shift_status", dir, |d| {
            Ok(ShiftStatus {
                has_shift: d.shift.is_some(),
                shift: d.shift,
            })
        })
    }

    fn max_plot_index(&self, dir: &DirectoryKey) -> Result<Option<u32>, ServiceError> {
        self.call("max_plot_index", dir, |d| Ok(d.plots.keys().next_back().copied()))
    }

    fn marked_plots(&self, dir: &DirectoryKey) -> Result<Vec<PlotSegment>, ServiceError> {
        self.call("marked_plots", dir, |d| Ok(d.plots.values().cloned().collect()))
    }

    fn mark_plot(&self, dir: &DirectoryKey, segment: &PlotSegment) -> Result<(), ServiceError> {
        self.call("mark_plot", dir, |d| {
            for image in [&segment.start_image, &segment.end_image] {
                if d.index_of(image).is_none() {
                    return Err(ServiceError::NotFound(image.clone()));
                }
            }
            d.plots.insert(segment.plot_index, segment.clone());
            Ok(())
        })
    }

    fn delete_plot(&self, dir: &DirectoryKey, plot_index: u32) -> Result<(), ServiceError> {
        self.call("delete_plot", dir, |d| {
            d.plots
                .remove(&plot_index)
                .map(|_| ())
                .ok_or_else(|| ServiceError::NotFound(format!("plot {}", plot_index)))
        })
    }

    fn save_stitch_mask(&self, dir: &DirectoryKey, mask: CropMask) -> Result<(), ServiceError> {
        self.call("save_stitch_mask", dir, |d| {
            d.mask = Some(mask);
            Ok(())
        })
    }

    fn stitch_mask(&self, dir: &DirectoryKey) -> Result<Option<CropMask>, ServiceError> {
        self.call("stitch_mask", dir, |d| Ok(d.mask))
    }

    fn refilter_plot_borders(&self, dir: &DirectoryKey) -> Result<(), ServiceError> {
        self.call("refilter_plot_borders", dir, |_| Ok(()))
    }

    fn fetch_image(&self, url: &str) -> Result<usize, ServiceError> {
        self.delay();
        let mut state = self
            .state
            .lock()
            .map_err(|_| ServiceError::Unavailable("memory backend lock poisoned".to_string()))?;
        *state.calls.entry("fetch_image").or_insert(0) += 1;
        if state.armed_failures.remove("fetch_image") {
            return Err(ServiceError::Unavailable("fetch_image failed (injected)".to_string()));
        }
        Ok(url.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StitchDirection;

    fn dir() -> DirectoryKey {
        DirectoryKey::new("2024", "Trial", "Davis", "Pop1", "2024-06-01", "Amiga", "RGB")
    }

    fn service() -> MemoryService {
        let svc = MemoryService::new();
        let images: Vec<String> = (0..5).map(|i| format!("img_{:03}.jpg", i)).collect();
        let positions = (0..5)
            .map(|i| LatLon::new(38.0 + i as f64 * 0.0001, -121.0))
            .collect();
        svc.add_directory(dir(), images, positions);
        svc
    }

    #[test]
    fn test_membership_reflects_marked_plot() {
        let svc = service();
        let plot = PlotSegment::new(7, "img_001.jpg", "img_003.jpg", StitchDirection::Down)
            .with_label("A1");
        svc.mark_plot(&dir(), &plot).unwrap();

        let inside = svc.image_plot_membership(&dir(), "img_002.jpg").unwrap();
        assert_eq!(inside.plot_index, Some(7));
        assert_eq!(inside.plot_label.as_deref(), Some("A1"));

        let outside = svc.image_plot_membership(&dir(), "img_004.jpg").unwrap();
        assert_eq!(outside.plot_index, None);
        assert_eq!(svc.max_plot_index(&dir()).unwrap(), Some(7));
    }

    #[test]
    fn test_shift_applies_to_positions_and_track() {
        let svc = service();
        svc.set_gps_reference(&dir(), LatLon::new(38.5, -121.5)).unwrap();
        let shift = svc
            .apply_gps_shift(&dir(), LatLon::new(38.0, -121.0))
            .unwrap();
        assert!((shift.lat_shift - 0.5).abs() < 1e-9);

        let m = svc.image_plot_membership(&dir(), "img_000.jpg").unwrap();
        assert!((m.lat.unwrap() - 38.5).abs() < 1e-9);
        assert!((svc.gps_track(&dir()).unwrap()[0].lon - -121.5).abs() < 1e-9);

        svc.undo_gps_shift(&dir()).unwrap();
        assert!(!svc.gps_shift_status(&dir()).unwrap().has_shift);
        assert!(svc.undo_gps_shift(&dir()).is_err());
    }

    #[test]
    fn test_shift_without_reference_is_rejected() {
        let svc = service();
        let err = svc
            .apply_gps_shift(&dir(), LatLon::new(38.0, -121.0))
            .unwrap_err();
        assert!(matches!(err, ServiceError::Rejected { .. }));
    }

    #[test]
    fn test_fail_next_is_one_shot() {
        let svc = service();
        svc.fail_next("list_images");
        assert!(svc.list_images(&dir()).is_err());
        assert_eq!(svc.list_images(&dir()).unwrap().len(), 5);
        assert_eq!(svc.call_count("list_images"), 2);
    }

    #[test]
    fn test_unknown_directory() {
        let svc = service();
        let other = DirectoryKey::new("2023", "x", "y", "z", "d", "p", "s");
        assert!(matches!(
            svc.list_images(&other),
            Err(ServiceError::NotFound(_))
        ));
    }
}
