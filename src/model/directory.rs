//! Directory key identifying one image capture run.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Compound key for one capture run.
///
/// All per-directory state (plots, GPS reference and shift, stitch mask)
/// is scoped to one of these.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DirectoryKey {
    pub year: String,
    pub experiment: String,
    pub location: String,
    pub population: String,
    pub date: String,
    pub platform: String,
    pub sensor: String,
    /// Camera subfolder, present for multi-camera platforms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera: Option<String>,
}

impl DirectoryKey {
    /// Create a key without a camera component.
    pub fn new(
        year: impl Into<String>,
        experiment: impl Into<String>,
        location: impl Into<String>,
        population: impl Into<String>,
        date: impl Into<String>,
        platform: impl Into<String>,
        sensor: impl Into<String>,
    ) -> Self {
        Self {
            year: year.into(),
            experiment: experiment.into(),
            location: location.into(),
            population: population.into(),
            date: date.into(),
            platform: platform.into(),
            sensor: sensor.into(),
            camera: None,
        }
    }

    /// Set the camera component.
    pub fn with_camera(mut self, camera: impl Into<String>) -> Self {
        self.camera = Some(camera.into());
        self
    }

    /// Parse a `/`-separated path of 7 or 8 components.
    pub fn parse(path: &str) -> Option<Self> {
        let parts: Vec<&str> = path
            .trim_matches('/')
            .split('/')
            .filter(|p| !p.is_empty())
            .collect();
        if parts.len() != 7 && parts.len() != 8 {
            return None;
        }
        let key = Self::new(
            parts[0], parts[1], parts[2], parts[3], parts[4], parts[5], parts[6],
        );
        Some(match parts.get(7) {
            Some(camera) => key.with_camera(*camera),
            None => key,
        })
    }

    /// Camera identifier recorded on new plots, or `fallback` when the key has none.
    pub fn camera_id_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.camera.as_deref().unwrap_or(fallback)
    }
}

impl fmt::Display for DirectoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}/{}/{}/{}",
            self.year,
            self.experiment,
            self.location,
            self.population,
            self.date,
            self.platform,
            self.sensor
        )?;
        if let Some(camera) = &self.camera {
            write!(f, "/{}", camera)?;
        }
        Ok(())
    }
}
