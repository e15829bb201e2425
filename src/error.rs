//! Error types for session operations.

use thiserror::Error;

use crate::service::ServiceError;

/// Errors surfaced by plot-marking operations.
///
/// None of these are fatal: each leaves the session in its pre-call state
/// and the action can be retried.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    /// A collaborator call failed
    #[error("Network error: {0}")]
    Network(#[from] ServiceError),

    /// The displayed image has no resolvable coordinate
    #[error("No GPS position available for the current image")]
    NoCurrentPosition,

    /// A shift was requested before a reference point was marked
    #[error("No GPS reference point has been set")]
    MissingReference,

    /// Undo was requested with no shift applied
    #[error("No GPS shift is active")]
    NoActiveShift,

    /// Segmentation action not valid in the current state
    #[error("Cannot {action} while {state}")]
    InvalidSegmentState {
        /// Attempted action
        action: &'static str,
        /// Name of the current state
        state: &'static str,
    },

    /// A plot with this index already exists in the directory
    #[error("Plot {0} is already marked")]
    DuplicatePlotIndex(u32),

    /// No plot with this index exists in the directory
    #[error("Plot {0} not found")]
    PlotNotFound(u32),

    /// Operation needs a loaded directory
    #[error("No directory selected")]
    NoDirectory,

    /// The loaded directory contains no images
    #[error("Directory has no images")]
    NoImages,

    /// Crop action not valid in the current editor state
    #[error("Cannot {action} while the crop editor is {state}")]
    InvalidCropState {
        action: &'static str,
        state: &'static str,
    },

    /// Drawn image cannot hold a minimum-size crop box
    #[error("Image is too small to crop ({width:.0}x{height:.0} px)")]
    ImageTooSmall { width: f64, height: f64 },

    /// Background lookup thread could not be started
    #[error("Lookup worker unavailable: {0}")]
    Worker(String),
}

impl SessionError {
    pub(crate) fn invalid_segment(action: &'static str, state: &'static str) -> Self {
        Self::InvalidSegmentState { action, state }
    }

    pub(crate) fn invalid_crop(action: &'static str, state: &'static str) -> Self {
        Self::InvalidCropState { action, state }
    }
}
