//! Scene resources: current inputs and memoized outputs.

use bevy::prelude::*;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::{Duration, Instant};

use crate::config::ScenarioConfig;
use crate::link::atmosphere::AtmosphericProfile;
use crate::link::budget::{LinkMetrics, OpticalConfig};
use crate::orbital::elements::{OrbitalElements, ResonanceConfig};
use crate::orbital::propagation::PropagationResult;
use crate::stations::GroundStation;

/// Inputs of the current planning scenario
#[derive(Resource, Debug, Clone, PartialEq)]
pub struct LinkScenario {
    pub elements: OrbitalElements,
    pub resonance: ResonanceConfig,
    pub samples_per_orbit: u32,
    pub optical: OpticalConfig,
    /// Station the link metrics are computed for
    pub station: Option<GroundStation>,
}

impl Default for LinkScenario {
    fn default() -> Self {
        Self::from_config(&ScenarioConfig::default(), Some(GroundStation::matera()))
    }
}

impl LinkScenario {
    pub fn from_config(config: &ScenarioConfig, station: Option<GroundStation>) -> Self {
        Self {
            elements: config.elements,
            resonance: config.resonance,
            samples_per_orbit: config.samples_per_orbit,
            optical: config.optical,
            station,
        }
    }

    /// Optics with the ground aperture taken from the selected station.
    pub fn effective_optical(&self) -> OpticalConfig {
        match &self.station {
            Some(station) => self.optical.with_station_aperture(station),
            None => self.optical,
        }
    }

    /// Hash of everything the propagator reads.
    pub fn propagation_key(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        let e = &self.elements;
        for v in [
            e.semi_major_axis_km,
            e.eccentricity,
            e.inclination_deg,
            e.raan_deg,
            e.arg_perigee_deg,
            e.mean_anomaly_deg,
        ] {
            v.to_bits().hash(&mut hasher);
        }
        self.resonance.hash(&mut hasher);
        self.samples_per_orbit.hash(&mut hasher);
        hasher.finish()
    }

    /// Hash of the link metric inputs on top of a propagation key.
    pub fn metrics_key(&self, propagation_key: u64) -> u64 {
        let mut hasher = DefaultHasher::new();
        propagation_key.hash(&mut hasher);
        let o = &self.optical;
        for v in [o.sat_aperture_m, o.ground_aperture_m, o.wavelength_nm] {
            v.to_bits().hash(&mut hasher);
        }
        match &self.station {
            Some(s) => {
                s.id.hash(&mut hasher);
                s.lat.to_bits().hash(&mut hasher);
                s.lon.to_bits().hash(&mut hasher);
                s.aperture_m.to_bits().hash(&mut hasher);
            }
            None => 0u8.hash(&mut hasher),
        }
        hasher.finish()
    }
}

/// Latest propagation and the input key it was computed for
#[derive(Resource, Debug, Default)]
pub struct PropagationCache {
    pub key: Option<u64>,
    pub result: Option<PropagationResult>,
    /// Bumped on every recompute
    pub revision: u64,
}

/// Link metrics of the selected station for the cached propagation
#[derive(Resource, Debug, Default)]
pub struct LinkMetricsCache {
    pub key: Option<u64>,
    pub metrics: LinkMetrics,
    pub revision: u64,
}

/// Forecast-driven atmosphere for the selected station
#[derive(Resource, Debug, Default)]
pub struct AtmosphereState {
    /// Station id of the outstanding or last completed request
    pub requested_for: Option<String>,
    pub requested_at: Option<Instant>,
    pub pending: bool,
    pub profile: Option<AtmosphericProfile>,
    pub error: Option<String>,
}

impl AtmosphereState {
    /// Still waiting on a request sent at least `timeout` ago.
    pub fn timed_out(&self, timeout: Duration) -> bool {
        self.pending && self.requested_at.is_some_and(|at| at.elapsed() >= timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_propagation_key_tracks_orbit_inputs() {
        let base = LinkScenario::default();
        let key = base.propagation_key();
        assert_eq!(key, LinkScenario::default().propagation_key());

        let mut changed = base.clone();
        changed.elements.raan_deg = 10.0;
        assert_ne!(changed.propagation_key(), key);

        let mut changed = base.clone();
        changed.samples_per_orbit = 90;
        assert_ne!(changed.propagation_key(), key);

        let mut changed = base.clone();
        changed.resonance = ResonanceConfig::new(15, 1);
        assert_ne!(changed.propagation_key(), key);

        // Station and optics do not affect the trajectory
        let mut changed = base.clone();
        changed.station = None;
        changed.optical.wavelength_nm = 1550.0;
        assert_eq!(changed.propagation_key(), key);
    }

    #[test]
    fn test_metrics_key_tracks_station_and_optics() {
        let base = LinkScenario::default();
        let key = base.metrics_key(1);
        assert_ne!(base.metrics_key(2), key);

        let mut changed = base.clone();
        changed.station = None;
        assert_ne!(changed.metrics_key(1), key);

        let mut changed = base.clone();
        changed.optical.ground_aperture_m = 1.5;
        assert_ne!(changed.metrics_key(1), key);
    }

    #[test]
    fn test_atmosphere_timeout_runs_from_request_time() {
        let mut state = AtmosphereState::default();
        assert!(!state.timed_out(Duration::ZERO));

        state.pending = true;
        state.requested_at = Some(Instant::now());
        assert!(state.timed_out(Duration::ZERO));
        assert!(!state.timed_out(Duration::from_secs(3600)));

        // A completed request never times out
        state.pending = false;
        assert!(!state.timed_out(Duration::ZERO));
    }
}
