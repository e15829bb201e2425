//! Plot Marker - plot segmentation and GPS alignment for field-survey imagery
//!
//! An operator steps through the ordered images of a capture run, marks
//! contiguous ranges as plots, corrects the GPS track against a known
//! reference point and sets a border mask for stitching. Storage and
//! listing live behind the [`FieldService`] trait; [`Session`] drives
//! everything for one directory at a time.

pub mod cache;
pub mod config;
pub mod constants;
pub mod crop;
pub mod error;
pub mod folder;
pub mod gps;
pub mod model;
pub mod navigator;
pub mod prefetch;
pub mod registry;
pub mod segmentation;
pub mod service;
pub mod session;
pub mod timer;
pub mod worker;

pub use config::AppConfig;
pub use error::SessionError;
pub use service::{FieldService, MemoryService, ServiceError};
pub use session::{MarkEnd, Notice, NoticeLevel, Session, SessionConfig};
