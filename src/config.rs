//! Scenario configuration file
//!
//! The planner reads its inputs from a JSON file so runs are reproducible:
//! - macOS: ~/Library/Application Support/qkdplanner/scenario.json
//! - Linux: ~/.config/qkdplanner/scenario.json
//! - Windows: %APPDATA%\qkdplanner\config\scenario.json

use anyhow::{Context, Result};
use bevy::log::{info, warn};
use bevy::prelude::Resource;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::link::atmosphere::TurbulenceModel;
use crate::link::budget::OpticalConfig;
use crate::orbital::elements::{OrbitalElements, ResonanceConfig};

const CONFIG_FILE_NAME: &str = "scenario.json";

/// Default trajectory resolution.
pub const DEFAULT_SAMPLES_PER_ORBIT: u32 = 180;

/// Atmospheric profile settings for the selected station
#[derive(Resource, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AtmosphereSettings {
    /// Query the forecast service for the selected station
    pub enabled: bool,
    pub model: TurbulenceModel,
    /// Ground-level Cn² used between 06:00 and 18:00 UTC (m^-2/3)
    pub ground_cn2_day: f64,
    pub ground_cn2_night: f64,
}

impl Default for AtmosphereSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            model: TurbulenceModel::HufnagelValley,
            ground_cn2_day: 1.7e-14, // HV 5/7 ground strength
            ground_cn2_night: 5e-15,
        }
    }
}

/// Everything needed to reproduce one planning run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScenarioConfig {
    pub elements: OrbitalElements,
    pub resonance: ResonanceConfig,
    pub samples_per_orbit: u32,
    pub optical: OpticalConfig,
    /// Station id from the station store; the reference station when unset
    pub selected_station_id: Option<String>,
    pub atmosphere: AtmosphereSettings,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            elements: OrbitalElements::default(),
            resonance: ResonanceConfig::default(),
            samples_per_orbit: DEFAULT_SAMPLES_PER_ORBIT,
            optical: OpticalConfig::default(),
            selected_station_id: None,
            atmosphere: AtmosphereSettings::default(),
        }
    }
}

impl ScenarioConfig {
    pub fn default_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("", "", "qkdplanner")
            .ok_or_else(|| anyhow::anyhow!("Failed to resolve config directory"))?;
        Ok(proj_dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Load from the platform config directory, or defaults when no file exists.
    pub fn load_or_default() -> Result<Self> {
        Self::load_from(&Self::default_path()?)
    }

    /// Load from `path`; a missing file yields defaults, a malformed one is an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("no scenario file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents =
            fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("parsing scenario {}", path.display()))?;
        Ok(config.sanitized())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating config directory {}", parent.display()))?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        fs::write(path, contents).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    }

    /// Repair values the engine treats as contract violations.
    fn sanitized(mut self) -> Self {
        if self.samples_per_orbit == 0 {
            warn!("samplesPerOrbit must be positive, using {}", DEFAULT_SAMPLES_PER_ORBIT);
            self.samples_per_orbit = DEFAULT_SAMPLES_PER_ORBIT;
        }
        let e = self.elements.eccentricity;
        if !(0.0..1.0).contains(&e) {
            let clamped = if e.is_nan() { 0.0 } else { e.clamp(0.0, 0.99) };
            warn!("eccentricity {} outside [0, 1), using {}", e, clamped);
            self.elements.eccentricity = clamped;
        }
        if self.resonance.enabled && (self.resonance.orbits == 0 || self.resonance.rotations == 0) {
            warn!("resonance ratio must be positive, disabling resonance");
            self.resonance.enabled = false;
        }
        let defaults = OpticalConfig::default();
        if self.optical.sat_aperture_m <= 0.0 {
            self.optical.sat_aperture_m = defaults.sat_aperture_m;
        }
        if self.optical.ground_aperture_m <= 0.0 {
            self.optical.ground_aperture_m = defaults.ground_aperture_m;
        }
        if self.optical.wavelength_nm <= 0.0 {
            self.optical.wavelength_nm = defaults.wavelength_nm;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn unique_temp_dir(test_name: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        std::env::temp_dir().join(format!(
            "qkdplanner-config-{}-{}-{}",
            test_name,
            std::process::id(),
            nanos
        ))
    }

    #[test]
    fn test_defaults_match_reference_scenario() {
        let config = ScenarioConfig::default();
        assert_eq!(config.elements.semi_major_axis_km, 6771.0);
        assert_eq!(config.elements.eccentricity, 0.001);
        assert_eq!(config.elements.inclination_deg, 53.0);
        assert_eq!(config.samples_per_orbit, 180);
        assert_eq!(config.optical.sat_aperture_m, 0.1);
        assert_eq!(config.optical.ground_aperture_m, 1.0);
        assert_eq!(config.optical.wavelength_nm, 810.0);
        assert!(!config.resonance.enabled);
        assert!(!config.atmosphere.enabled);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let path = unique_temp_dir("missing").join(CONFIG_FILE_NAME);
        let config = ScenarioConfig::load_from(&path).unwrap();
        assert_eq!(config, ScenarioConfig::default());
        assert!(!path.exists());
    }

    #[test]
    fn test_save_and_load() {
        let path = unique_temp_dir("roundtrip").join(CONFIG_FILE_NAME);
        let mut config = ScenarioConfig::default();
        config.resonance = ResonanceConfig::new(15, 1);
        config.selected_station_id = Some("station-1234abcd".to_string());
        config.atmosphere.model = TurbulenceModel::Bufton;
        config.save_to(&path).unwrap();

        let loaded = ScenarioConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"samplesPerOrbit\""));
        assert!(raw.contains("\"bufton\""));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = unique_temp_dir("partial");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(CONFIG_FILE_NAME);
        fs::write(&path, r#"{"samplesPerOrbit": 90, "optical": {"wavelengthNm": 1550.0}}"#).unwrap();

        let config = ScenarioConfig::load_from(&path).unwrap();
        assert_eq!(config.samples_per_orbit, 90);
        assert_eq!(config.optical.wavelength_nm, 1550.0);
        assert_eq!(config.optical.sat_aperture_m, 0.1);
        assert_eq!(config.elements, OrbitalElements::default());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = unique_temp_dir("malformed");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(CONFIG_FILE_NAME);
        fs::write(&path, "{\"samplesPerOrbit\": \"many\"}").unwrap();
        assert!(ScenarioConfig::load_from(&path).is_err());
    }

    #[test]
    fn test_contract_violations_are_repaired() {
        let dir = unique_temp_dir("sanitize");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(CONFIG_FILE_NAME);
        fs::write(
            &path,
            r#"{"samplesPerOrbit": 0,
                "elements": {"eccentricity": 1.5},
                "resonance": {"enabled": true, "orbits": 0, "rotations": 1},
                "optical": {"satApertureM": -1.0}}"#,
        )
        .unwrap();

        let config = ScenarioConfig::load_from(&path).unwrap();
        assert_eq!(config.samples_per_orbit, DEFAULT_SAMPLES_PER_ORBIT);
        assert!(config.elements.eccentricity < 1.0);
        assert!(!config.resonance.enabled);
        assert_eq!(config.optical.sat_aperture_m, 0.1);
    }
}
