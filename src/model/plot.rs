//! Plot segments and per-image plot membership.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Direction the platform travelled while capturing a plot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StitchDirection {
    Up,
    Down,
    Left,
    Right,
}

impl StitchDirection {
    /// Get the display name for this direction.
    pub fn name(&self) -> &'static str {
        match self {
            StitchDirection::Up => "Up",
            StitchDirection::Down => "Down",
            StitchDirection::Left => "Left",
            StitchDirection::Right => "Right",
        }
    }

    /// Get all directions in prompt order.
    pub fn all() -> &'static [StitchDirection] {
        &[
            StitchDirection::Up,
            StitchDirection::Down,
            StitchDirection::Left,
            StitchDirection::Right,
        ]
    }
}

impl fmt::Display for StitchDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StitchDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StitchDirection::all()
            .iter()
            .copied()
            .find(|d| d.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown stitch direction '{}'", s))
    }
}

/// A committed plot: a contiguous image range stitched into one mosaic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotSegment {
    /// Plot number, unique within a directory
    pub plot_index: u32,
    /// First image of the plot
    pub start_image: String,
    /// Last image of the plot (may equal `start_image`)
    pub end_image: String,
    /// Travel direction for the stitcher
    pub stitch_direction: StitchDirection,
    /// Camera the images came from
    pub camera_id: String,
    /// Whether the whole track is shifted along with this plot
    #[serde(default)]
    pub shift_all: bool,
    /// Field-design label, when imported
    #[serde(default)]
    pub plot_label: Option<String>,
    /// Accession (genotype) identifier, when imported
    #[serde(default)]
    pub accession: Option<String>,
}

impl PlotSegment {
    pub fn new(
        plot_index: u32,
        start_image: impl Into<String>,
        end_image: impl Into<String>,
        stitch_direction: StitchDirection,
    ) -> Self {
        Self {
            plot_index,
            start_image: start_image.into(),
            end_image: end_image.into(),
            stitch_direction,
            camera_id: String::new(),
            shift_all: false,
            plot_label: None,
            accession: None,
        }
    }

    pub fn with_camera(mut self, camera_id: impl Into<String>) -> Self {
        self.camera_id = camera_id.into();
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.plot_label = Some(label.into());
        self
    }

    pub fn with_accession(mut self, accession: impl Into<String>) -> Self {
        self.accession = Some(accession.into());
        self
    }

    pub fn with_shift_all(mut self, shift_all: bool) -> Self {
        self.shift_all = shift_all;
        self
    }
}

/// Georeference and plot membership of a single image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlotMembership {
    /// Plot the image falls in, if any
    pub plot_index: Option<u32>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub plot_label: Option<String>,
    pub accession: Option<String>,
}

impl PlotMembership {
    /// The image's coordinate, when both components are known.
    pub fn position(&self) -> Option<super::LatLon> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Some(super::LatLon::new(lat, lon)),
            _ => None,
        }
    }
}
