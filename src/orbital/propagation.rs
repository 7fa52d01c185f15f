//! Two-body Keplerian propagation over a sampled timeline
//!
//! Turns a set of orbital elements into time-stamped state vectors in ECI and
//! ECEF plus the sub-satellite ground track. The propagator is a pure function
//! of its inputs; the optional timeline argument is an explicit cache hint.

use bevy::log::debug;
use bevy::math::{DMat3, DVec3};
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;

use crate::core::constants::{
    DEFAULT_TOTAL_ORBITS, MU_EARTH_KM3_S2, clamp_semi_major_axis_km,
};
use crate::core::coordinates::{
    earth_rotation_angle_rad, eci_to_ecef_km, eci_to_ecef_velocity_km_s, ecef_to_geodetic,
    perifocal_to_eci_matrix, wrap_longitude_deg,
};
use crate::orbital::elements::{OrbitalElements, ResonanceConfig};
use crate::orbital::kepler::{eccentric_to_true_anomaly, solve_eccentric_anomaly};
use crate::orbital::resonance::resonant_semi_major_axis_km;

/// Satellite state at one timeline sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateVector {
    /// Seconds since epoch
    pub t: f64,
    pub r_eci: DVec3,
    pub v_eci: DVec3,
    pub r_ecef: DVec3,
    /// Velocity relative to the rotating Earth
    pub v_ecef: DVec3,
    pub lat: f64,
    /// Wrapped to (-180, 180]
    pub lon: f64,
    /// km above the spherical Earth radius
    pub alt: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroundTrackPoint {
    pub lat: f64,
    pub lon: f64,
}

impl From<&StateVector> for GroundTrackPoint {
    fn from(s: &StateVector) -> Self {
        Self {
            lat: s.lat,
            lon: s.lon,
        }
    }
}

/// Output of [`propagate_orbit`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropagationResult {
    /// Semi-major axis actually used (resonance-derived and/or clamped)
    pub semi_major_km: f64,
    pub orbit_period_s: f64,
    pub total_time_s: f64,
    pub timeline: Vec<f64>,
    pub data_points: Vec<StateVector>,
    pub ground_track: Vec<GroundTrackPoint>,
}

/// Mean motion (rad/s) for a semi-major axis in km.
pub fn mean_motion_rad_s(a_km: f64) -> f64 {
    (MU_EARTH_KM3_S2 / (a_km * a_km * a_km)).sqrt()
}

/// Orbital period (s) for a semi-major axis in km.
pub fn orbital_period_s(a_km: f64) -> f64 {
    TAU / mean_motion_rad_s(a_km)
}

/// Number of timeline samples for a propagation span, never fewer than two.
pub fn sample_count(samples_per_orbit: u32, total_orbits: u32) -> usize {
    (samples_per_orbit as usize * total_orbits as usize).max(2)
}

/// Uniform timeline of `count` samples spanning `[0, total_time_s]`.
pub fn build_timeline(total_time_s: f64, count: usize) -> Vec<f64> {
    let count = count.max(2);
    let step = total_time_s / (count - 1) as f64;
    (0..count).map(|i| i as f64 * step).collect()
}

/// Precomputed two-body orbit ready to be sampled.
#[derive(Debug, Clone)]
pub struct KeplerOrbit {
    pub semi_major_km: f64,
    pub eccentricity: f64,
    pub mean_anomaly_at_epoch: f64,
    pub mean_motion: f64,
    rotation: DMat3,
}

impl KeplerOrbit {
    /// Build from elements with an explicit semi-major axis (already clamped).
    pub fn new(elements: &OrbitalElements, semi_major_km: f64) -> Self {
        let (inc, raan, argp, m0) = elements.angles_rad();
        Self {
            semi_major_km,
            eccentricity: elements.eccentricity,
            mean_anomaly_at_epoch: m0,
            mean_motion: mean_motion_rad_s(semi_major_km),
            rotation: perifocal_to_eci_matrix(inc, raan, argp),
        }
    }

    pub fn period_s(&self) -> f64 {
        TAU / self.mean_motion
    }

    /// ECI position (km) and velocity (km/s) at `t` seconds from epoch.
    pub fn eci_state(&self, t: f64) -> (DVec3, DVec3) {
        let e = self.eccentricity;
        let a = self.semi_major_km;

        let mean_anomaly = (self.mean_anomaly_at_epoch + self.mean_motion * t).rem_euclid(TAU);
        let e_anomaly = solve_eccentric_anomaly(mean_anomaly, e);
        let nu = eccentric_to_true_anomaly(e_anomaly, e);

        let p = a * (1.0 - e * e);
        let (sin_nu, cos_nu) = nu.sin_cos();
        let r = p / (1.0 + e * cos_nu);
        let r_pf = DVec3::new(r * cos_nu, r * sin_nu, 0.0);
        let v_scale = (MU_EARTH_KM3_S2 / p).sqrt();
        let v_pf = DVec3::new(-v_scale * sin_nu, v_scale * (e + cos_nu), 0.0);

        (self.rotation * r_pf, self.rotation * v_pf)
    }

    /// Full state vector at `t`, including the Earth-fixed frame and ground point.
    pub fn state_at(&self, t: f64) -> StateVector {
        let (r_eci, v_eci) = self.eci_state(t);
        let theta = earth_rotation_angle_rad(t);
        let r_ecef = eci_to_ecef_km(r_eci, theta);
        let v_ecef = eci_to_ecef_velocity_km_s(v_eci, r_ecef, theta);
        let geo = ecef_to_geodetic(r_ecef);
        StateVector {
            t,
            r_eci,
            v_eci,
            r_ecef,
            v_ecef,
            lat: geo.lat_deg,
            lon: wrap_longitude_deg(geo.lon_deg),
            alt: geo.alt_km,
        }
    }
}

/// Semi-major axis used for a propagation request, after resonance and clamping.
pub fn effective_semi_major_axis_km(elements: &OrbitalElements, resonance: &ResonanceConfig) -> f64 {
    let raw = if resonance.enabled {
        let a = resonant_semi_major_axis_km(resonance.orbits, resonance.rotations);
        debug!(
            "resonance {}:{} overrides semi-major axis {:.1} km -> {:.1} km",
            resonance.orbits, resonance.rotations, elements.semi_major_axis_km, a
        );
        a
    } else {
        elements.semi_major_axis_km
    };
    let clamped = clamp_semi_major_axis_km(raw);
    if clamped != raw {
        debug!("semi-major axis {:.1} km clamped to {:.1} km", raw, clamped);
    }
    clamped
}

/// Revolutions covered by one propagation: the resonance orbit count, or three.
pub fn total_orbits(resonance: &ResonanceConfig) -> u32 {
    if resonance.enabled {
        resonance.orbits
    } else {
        DEFAULT_TOTAL_ORBITS
    }
}

/// Time span (s) [`propagate_orbit`] will cover for these inputs.
pub fn total_span_s(elements: &OrbitalElements, resonance: &ResonanceConfig) -> f64 {
    orbital_period_s(effective_semi_major_axis_km(elements, resonance)) * total_orbits(resonance) as f64
}

/// Propagate `elements` over the requested span.
///
/// The span is `resonance.orbits` revolutions when resonance is enabled,
/// otherwise three. `existing_timeline` is reused verbatim when its length
/// equals the requested sample count; the caller decides whether it is still
/// valid for the new span.
pub fn propagate_orbit(
    elements: &OrbitalElements,
    resonance: &ResonanceConfig,
    samples_per_orbit: u32,
    existing_timeline: Option<&[f64]>,
) -> PropagationResult {
    debug_assert!(samples_per_orbit > 0, "samples_per_orbit must be positive");

    let semi_major_km = effective_semi_major_axis_km(elements, resonance);
    let orbit = KeplerOrbit::new(elements, semi_major_km);
    let orbit_period_s = orbit.period_s();

    let total_orbits = total_orbits(resonance);
    let total_time_s = orbit_period_s * total_orbits as f64;

    let count = sample_count(samples_per_orbit, total_orbits);
    let timeline = match existing_timeline {
        Some(existing) if existing.len() == count => existing.to_vec(),
        _ => build_timeline(total_time_s, count),
    };

    let data_points: Vec<StateVector> = timeline.iter().map(|&t| orbit.state_at(t)).collect();
    let ground_track = data_points.iter().map(GroundTrackPoint::from).collect();

    debug!(
        "propagated a={:.1} km e={:.4} over {:.0} s ({} samples)",
        semi_major_km,
        elements.eccentricity,
        total_time_s,
        data_points.len()
    );

    PropagationResult {
        semi_major_km,
        orbit_period_s,
        total_time_s,
        timeline,
        data_points,
        ground_track,
    }
}
