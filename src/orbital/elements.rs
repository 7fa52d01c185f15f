//! Orbital element inputs for the propagator

use serde::{Deserialize, Serialize};

use crate::core::constants::clamp_semi_major_axis_km;

/// Classical Keplerian elements, angles in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrbitalElements {
    /// Semi-major axis in km, clamped into the LEO band at propagation time
    pub semi_major_axis_km: f64,
    /// 0 <= e < 1
    pub eccentricity: f64,
    pub inclination_deg: f64,
    /// Right ascension of the ascending node
    pub raan_deg: f64,
    pub arg_perigee_deg: f64,
    pub mean_anomaly_deg: f64,
}

impl Default for OrbitalElements {
    fn default() -> Self {
        Self {
            semi_major_axis_km: 6771.0,
            eccentricity: 0.001,
            inclination_deg: 53.0,
            raan_deg: 0.0,
            arg_perigee_deg: 0.0,
            mean_anomaly_deg: 0.0,
        }
    }
}

impl OrbitalElements {
    /// Semi-major axis after clamping into the supported band.
    pub fn clamped_semi_major_axis_km(&self) -> f64 {
        clamp_semi_major_axis_km(self.semi_major_axis_km)
    }

    /// Angular elements in radians: (inclination, raan, arg perigee, mean anomaly).
    pub fn angles_rad(&self) -> (f64, f64, f64, f64) {
        (
            self.inclination_deg.to_radians(),
            self.raan_deg.to_radians(),
            self.arg_perigee_deg.to_radians(),
            self.mean_anomaly_deg.to_radians(),
        )
    }
}

/// Optional repeating-ground-track constraint.
///
/// `orbits` revolutions per `rotations` sidereal days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResonanceConfig {
    pub enabled: bool,
    pub orbits: u32,
    pub rotations: u32,
}

impl Default for ResonanceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            orbits: 14,
            rotations: 1,
        }
    }
}

impl ResonanceConfig {
    pub fn new(orbits: u32, rotations: u32) -> Self {
        Self {
            enabled: true,
            orbits,
            rotations,
        }
    }

    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }
}
