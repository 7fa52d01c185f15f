//! Optical ground stations (OGS)
//!
//! The station record the link engine reads, plus the JSON file store the
//! planner persists its station list in.

use serde::{Deserialize, Serialize};

use crate::core::coordinates::{CoordError, Geodetic, validate_lat_lon};

pub mod store;

pub use store::StationStore;

/// Default telescope aperture for stations saved without one (m).
pub const DEFAULT_APERTURE_M: f64 = 1.0;

/// Accepted telescope aperture range (m).
pub const MIN_APERTURE_M: f64 = 0.1;
pub const MAX_APERTURE_M: f64 = 15.0;

/// Optical ground station on the spherical Earth model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundStation {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default = "default_aperture_m", alias = "aperture_m")]
    pub aperture_m: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

fn default_aperture_m() -> f64 {
    DEFAULT_APERTURE_M
}

impl GroundStation {
    pub fn new(id: impl Into<String>, name: impl Into<String>, lat: f64, lon: f64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            lat,
            lon,
            aperture_m: DEFAULT_APERTURE_M,
            notes: None,
        }
    }

    /// Matera Laser Ranging Observatory, the reference station.
    pub fn matera() -> Self {
        Self::new("station-matera", "Matera", 40.649, 16.704)
    }

    pub fn geodetic(&self) -> Geodetic {
        Geodetic::new(self.lat, self.lon, 0.0)
    }

    /// Field checks applied before a station is persisted.
    pub fn validate(&self) -> Result<(), CoordError> {
        if self.name.trim().is_empty() {
            return Err(CoordError {
                msg: "Station name must not be empty".to_string(),
            });
        }
        validate_lat_lon(self.lat, self.lon)?;
        if !(MIN_APERTURE_M..=MAX_APERTURE_M).contains(&self.aperture_m) {
            return Err(CoordError {
                msg: format!(
                    "Invalid aperture: {:?} m (expected {}..={})",
                    self.aperture_m, MIN_APERTURE_M, MAX_APERTURE_M
                ),
            });
        }
        if !is_in_europe_bbox(self.lat, self.lon) {
            return Err(CoordError {
                msg: format!(
                    "Location ({:.3}, {:.3}) is outside the European planning area",
                    self.lat, self.lon
                ),
            });
        }
        Ok(())
    }
}

/// Planning area accepted for new stations.
pub fn is_in_europe_bbox(lat: f64, lon: f64) -> bool {
    (25.0..=72.0).contains(&lat) && (-31.0..=45.0).contains(&lon)
}
