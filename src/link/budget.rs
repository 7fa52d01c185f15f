//! Optical ground-link geometry and coupling loss
//!
//! For every propagated sample this computes, relative to one ground station:
//! slant range, elevation, azimuth, the Doppler factor, and the geometric
//! (diffraction-limited) coupling loss of the downlink beam into the ground
//! telescope. No atmospheric terms are included here.

use bevy::math::{DMat3, DVec3};
use serde::{Deserialize, Serialize};

use crate::core::constants::SPEED_OF_LIGHT_KM_S;
use crate::core::coordinates::{enu_basis, geodetic_to_ecef_km};
use crate::orbital::propagation::StateVector;
use crate::stations::GroundStation;

/// Smallest spot radius (m) used in the coupling ratio.
pub const MIN_SPOT_RADIUS_M: f64 = 1e-6;

/// Coupling floor; bounds the loss at 90 dB instead of infinity.
pub const MIN_COUPLING: f64 = 1e-9;

/// Optical terminal parameters for the downlink
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OpticalConfig {
    /// Satellite transmit aperture diameter in metres
    pub sat_aperture_m: f64,
    /// Ground telescope aperture diameter in metres
    pub ground_aperture_m: f64,
    /// Downlink wavelength in nanometres
    pub wavelength_nm: f64,
}

impl Default for OpticalConfig {
    fn default() -> Self {
        Self {
            sat_aperture_m: 0.1,     // small-sat class terminal
            ground_aperture_m: 1.0,  // 1 m OGS telescope
            wavelength_nm: 810.0,    // typical QKD downlink band
        }
    }
}

impl OpticalConfig {
    /// Same optics with the ground aperture taken from a station record.
    pub fn with_station_aperture(self, station: &GroundStation) -> Self {
        Self {
            ground_aperture_m: station.aperture_m,
            ..self
        }
    }
}

/// Per-sample link metrics, index-aligned with the trajectory timeline.
///
/// All five arrays always have the same length: the number of samples, or
/// zero when no station was supplied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkMetrics {
    pub distance_km: Vec<f64>,
    pub elevation_deg: Vec<f64>,
    pub azimuth_deg: Vec<f64>,
    pub loss_db: Vec<f64>,
    pub doppler_factor: Vec<f64>,
}

impl LinkMetrics {
    pub fn empty() -> Self {
        Self::default()
    }

    fn with_capacity(n: usize) -> Self {
        Self {
            distance_km: Vec::with_capacity(n),
            elevation_deg: Vec::with_capacity(n),
            azimuth_deg: Vec::with_capacity(n),
            loss_db: Vec::with_capacity(n),
            doppler_factor: Vec::with_capacity(n),
        }
    }

    pub fn len(&self) -> usize {
        self.distance_km.len()
    }

    pub fn is_empty(&self) -> bool {
        self.distance_km.is_empty()
    }

    /// Indices of samples with the satellite above the local horizon.
    pub fn visible_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.elevation_deg
            .iter()
            .enumerate()
            .filter(|(_, el)| **el > 0.0)
            .map(|(i, _)| i)
    }
}

/// Pass figures over the samples with positive elevation.
///
/// Every optional field is `None` when the satellite never rises.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassSummary {
    pub visible_samples: usize,
    pub first_visible_s: Option<f64>,
    pub last_visible_s: Option<f64>,
    pub max_elevation_deg: Option<f64>,
    pub min_distance_km: Option<f64>,
    pub min_loss_db: Option<f64>,
    pub doppler_min: Option<f64>,
    pub doppler_max: Option<f64>,
}

fn fold_min(acc: Option<f64>, v: f64) -> Option<f64> {
    Some(acc.map_or(v, |a| a.min(v)))
}

fn fold_max(acc: Option<f64>, v: f64) -> Option<f64> {
    Some(acc.map_or(v, |a| a.max(v)))
}

impl LinkMetrics {
    /// Summarize the visible samples; `timeline` is index-aligned with the metrics.
    pub fn summarize(&self, timeline: &[f64]) -> PassSummary {
        let mut summary = PassSummary::default();
        for i in self.visible_indices() {
            summary.visible_samples += 1;
            if let Some(&t) = timeline.get(i) {
                summary.first_visible_s.get_or_insert(t);
                summary.last_visible_s = Some(t);
            }
            summary.max_elevation_deg = fold_max(summary.max_elevation_deg, self.elevation_deg[i]);
            summary.min_distance_km = fold_min(summary.min_distance_km, self.distance_km[i]);
            summary.min_loss_db = fold_min(summary.min_loss_db, self.loss_db[i]);
            summary.doppler_min = fold_min(summary.doppler_min, self.doppler_factor[i]);
            summary.doppler_max = fold_max(summary.doppler_max, self.doppler_factor[i]);
        }
        summary
    }
}

/// Range and pointing from a station to a satellite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LookAngles {
    pub distance_km: f64,
    pub elevation_deg: f64,
    /// Clockwise from north, in [0, 360)
    pub azimuth_deg: f64,
}

/// Station ECEF position (km) on the spherical Earth, for placing markers.
pub fn station_ecef(station: &GroundStation) -> DVec3 {
    geodetic_to_ecef_km(&station.geodetic())
}

/// Look angles for a satellite ECEF position, given the station position and its ENU basis.
pub fn look_angles(station_ecef_km: DVec3, enu: &DMat3, sat_ecef_km: DVec3) -> LookAngles {
    let delta = sat_ecef_km - station_ecef_km;
    let local = *enu * delta;
    let (east, north, up) = (local.x, local.y, local.z);

    let elevation_deg = up.atan2(east.hypot(north)).to_degrees();
    let azimuth_deg = (east.atan2(north).to_degrees() + 360.0) % 360.0;

    LookAngles {
        distance_km: delta.length(),
        elevation_deg,
        azimuth_deg,
    }
}

/// Received/transmitted frequency ratio (non-relativistic).
///
/// The radial velocity is the satellite Earth-fixed velocity projected on the
/// signal path (satellite towards station), so an approaching satellite gives
/// a factor above one and a receding one a factor below one. Coincident
/// positions give exactly one.
pub fn doppler_factor(station_ecef_km: DVec3, sat_ecef_km: DVec3, sat_vel_ecef_km_s: DVec3) -> f64 {
    let towards_station = (station_ecef_km - sat_ecef_km).normalize_or_zero();
    let v_radial = sat_vel_ecef_km_s.dot(towards_station);
    1.0 / (1.0 - v_radial / SPEED_OF_LIGHT_KM_S)
}

/// Diffraction-limited beam divergence half-angle (rad): 1.22 λ / D.
pub fn beam_divergence_rad(optical: &OpticalConfig) -> f64 {
    1.22 * (optical.wavelength_nm * 1e-9) / optical.sat_aperture_m
}

/// Beam spot radius (m) at slant range `distance_km`, floored at [`MIN_SPOT_RADIUS_M`].
pub fn spot_radius_m(distance_km: f64, optical: &OpticalConfig) -> f64 {
    let theta = beam_divergence_rad(optical);
    (theta * distance_km * 1000.0 / 2.0).max(MIN_SPOT_RADIUS_M)
}

/// Fraction of the spot captured by the ground aperture, in (0, 1].
pub fn coupling_efficiency(distance_km: f64, optical: &OpticalConfig) -> f64 {
    let capture_radius = optical.ground_aperture_m / 2.0;
    let ratio = capture_radius / spot_radius_m(distance_km, optical);
    (ratio * ratio).min(1.0)
}

/// Geometric coupling loss in dB, non-negative and capped by [`MIN_COUPLING`].
pub fn coupling_loss_db(distance_km: f64, optical: &OpticalConfig) -> f64 {
    -10.0 * coupling_efficiency(distance_km, optical).max(MIN_COUPLING).log10()
}

/// Link metrics for every sample of a trajectory.
///
/// Returns all-empty arrays when `station` is `None`.
pub fn compute_station_metrics(
    data_points: &[StateVector],
    station: Option<&GroundStation>,
    optical: &OpticalConfig,
) -> LinkMetrics {
    let Some(station) = station else {
        return LinkMetrics::empty();
    };
    debug_assert!(
        optical.sat_aperture_m > 0.0 && optical.ground_aperture_m > 0.0,
        "apertures must be positive: {:?}",
        optical
    );

    let station_pos = station_ecef(station);
    let enu = enu_basis(station.lat, station.lon);
    let mut metrics = LinkMetrics::with_capacity(data_points.len());

    for sample in data_points {
        let look = look_angles(station_pos, &enu, sample.r_ecef);
        metrics.distance_km.push(look.distance_km);
        metrics.elevation_deg.push(look.elevation_deg);
        metrics.azimuth_deg.push(look.azimuth_deg);
        metrics.loss_db.push(coupling_loss_db(look.distance_km, optical));
        metrics
            .doppler_factor
            .push(doppler_factor(station_pos, sample.r_ecef, sample.v_ecef));
    }

    metrics
}
