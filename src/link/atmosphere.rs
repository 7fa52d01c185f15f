//! Atmospheric turbulence profiles above a ground station
//!
//! Builds a layered Cn² profile from one of three empirical models, driven by
//! upper-air winds for the station and hour, and reduces it to the usual
//! zenith seeing figures (Fried parameter, isoplanatic angle, Greenwood
//! frequency, coherence time) plus rough aerosol/absorption losses.

use anyhow::{Result, anyhow, bail};
use chrono::{DateTime, SecondsFormat, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

/// Cn² floor at ground level (m^-2/3).
const MIN_GROUND_CN2: f64 = 1e-17;

/// Used when neither the layers nor the caller supply a usable wind speed (m/s).
const DEFAULT_WIND_MPS: f64 = 15.0;

/// Empirical Cn² model used for a profile
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TurbulenceModel {
    #[default]
    HufnagelValley,
    Bufton,
    Greenwood,
}

impl TurbulenceModel {
    pub fn name(&self) -> &'static str {
        match self {
            TurbulenceModel::HufnagelValley => "hufnagel-valley",
            TurbulenceModel::Bufton => "bufton",
            TurbulenceModel::Greenwood => "greenwood",
        }
    }

    /// Pressure levels (hPa) whose winds the model needs.
    pub fn wind_levels(&self) -> &'static [u32] {
        match self {
            TurbulenceModel::HufnagelValley => &[300],
            TurbulenceModel::Bufton => &[300, 500, 850],
            TurbulenceModel::Greenwood => &[300, 500, 700],
        }
    }

    /// Open-Meteo hourly variables the model reads.
    pub fn hourly_variables(&self) -> Vec<String> {
        let mut vars: Vec<String> = self
            .wind_levels()
            .iter()
            .flat_map(|level| {
                [
                    format!("wind_u_component_{}hPa", level),
                    format!("wind_v_component_{}hPa", level),
                ]
            })
            .collect();
        if *self == TurbulenceModel::Bufton {
            vars.push("temperature_850hPa".to_string());
        }
        vars
    }

    /// Sampling altitudes (km) of the layered profile.
    fn altitudes_km(&self) -> &'static [f64] {
        match self {
            TurbulenceModel::HufnagelValley => &[0.0, 0.2, 0.5, 1.0, 2.0, 5.0, 10.0, 15.0, 20.0],
            TurbulenceModel::Bufton => &[0.0, 0.25, 0.5, 1.0, 2.0, 3.0, 5.0, 8.0, 12.0],
            TurbulenceModel::Greenwood => &[0.0, 0.2, 0.5, 1.0, 2.0, 3.0, 5.0, 7.0, 10.0, 15.0],
        }
    }

    /// Base (aerosol, absorption) losses in dB.
    fn base_losses_db(&self) -> (f64, f64) {
        match self {
            TurbulenceModel::HufnagelValley => (0.2, 0.1),
            TurbulenceModel::Bufton => (0.25, 0.12),
            TurbulenceModel::Greenwood => (0.22, 0.11),
        }
    }
}

impl fmt::Display for TurbulenceModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TurbulenceModel {
    type Err = anyhow::Error;

    /// Empty and "auto" select Hufnagel-Valley; "hv57" is an alias.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "" | "auto" | "hufnagel-valley" | "hv57" => Ok(TurbulenceModel::HufnagelValley),
            "bufton" => Ok(TurbulenceModel::Bufton),
            "greenwood" => Ok(TurbulenceModel::Greenwood),
            _ => Err(anyhow!("Atmospheric model '{}' is not available", s)),
        }
    }
}

/// Station, time and optical inputs of a profile request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtmosphereQuery {
    pub lat: f64,
    pub lon: f64,
    pub timestamp: DateTime<Utc>,
    pub model: TurbulenceModel,
    pub ground_cn2_day: f64,
    pub ground_cn2_night: f64,
    pub wavelength_nm: f64,
}

impl AtmosphereQuery {
    /// Daytime is 06:00 to 18:00 UTC.
    pub fn is_day(&self) -> bool {
        (6..18).contains(&self.timestamp.hour())
    }

    pub fn ground_cn2(&self) -> f64 {
        if self.is_day() {
            self.ground_cn2_day
        } else {
            self.ground_cn2_night
        }
    }

    /// Hourly-forecast key, e.g. `2025-06-01T14:00`.
    pub fn hour_key(&self) -> String {
        self.timestamp.format("%Y-%m-%dT%H:00").to_string()
    }

    pub fn date_key(&self) -> String {
        self.timestamp.format("%Y-%m-%d").to_string()
    }
}

/// Upper-air conditions at one hour, wind speeds in m/s.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpperAirWinds {
    pub wind_300: Option<f64>,
    pub wind_500: Option<f64>,
    pub wind_700: Option<f64>,
    pub wind_850: Option<f64>,
    /// °C
    pub temperature_850: Option<f64>,
}

impl UpperAirWinds {
    pub fn set_level(&mut self, level_hpa: u32, speed_mps: f64) {
        match level_hpa {
            300 => self.wind_300 = Some(speed_mps),
            500 => self.wind_500 = Some(speed_mps),
            700 => self.wind_700 = Some(speed_mps),
            850 => self.wind_850 = Some(speed_mps),
            _ => {}
        }
    }

    pub fn level(&self, level_hpa: u32) -> Option<f64> {
        match level_hpa {
            300 => self.wind_300,
            500 => self.wind_500,
            700 => self.wind_700,
            850 => self.wind_850,
            _ => None,
        }
    }

    fn require(&self, level_hpa: u32) -> Result<f64> {
        self.level(level_hpa)
            .ok_or_else(|| anyhow!("Missing wind component for {}hPa", level_hpa))
    }
}

/// Wind speed from u/v components.
pub fn wind_speed(u: f64, v: f64) -> f64 {
    u.hypot(v)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtmosphericLayer {
    pub alt_km: f64,
    pub cn2: Option<f64>,
    pub wind_mps: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature_k: Option<f64>,
}

/// Zenith seeing figures of a profile
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtmosphericSummary {
    /// Fried parameter (m)
    pub r0_zenith: Option<f64>,
    /// Greenwood frequency (Hz)
    #[serde(rename = "fGZenith")]
    pub fg_zenith: Option<f64>,
    /// Isoplanatic angle (arcsec)
    pub theta0_zenith: Option<f64>,
    pub wind_rms: Option<f64>,
    pub loss_aod_db: Option<f64>,
    pub loss_abs_db: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coherence_time_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scintillation_index: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtmosphericProfile {
    pub model: TurbulenceModel,
    pub status: String,
    /// ISO-8601 UTC, second precision
    pub timestamp: String,
    pub summary: AtmosphericSummary,
    pub layers: Vec<AtmosphericLayer>,
    pub provider: String,
    pub variables: Vec<String>,
    pub daytime: bool,
    pub wavelength_nm: f64,
    pub ground_cn2: f64,
    /// Wind speed per pressure level used by the model, keyed like `300hPa`
    pub wind_speeds: BTreeMap<String, f64>,
}

/// Profile for `query` from the given upper-air conditions.
///
/// Fails when the model needs a wind level that `winds` lacks.
pub fn build_profile(query: &AtmosphereQuery, winds: &UpperAirWinds) -> Result<AtmosphericProfile> {
    if query.wavelength_nm.is_nan() || query.wavelength_nm <= 0.0 {
        bail!("wavelength must be positive, got {} nm", query.wavelength_nm);
    }
    let model = query.model;
    let a = query.ground_cn2().max(MIN_GROUND_CN2);
    let (base_aod, base_abs) = model.base_losses_db();

    let mut wind_speeds = BTreeMap::new();
    for &level in model.wind_levels() {
        wind_speeds.insert(format!("{}hPa", level), winds.require(level)?);
    }

    let (layers, summary) = match model {
        TurbulenceModel::HufnagelValley => {
            let w = winds.require(300)?.max(5.0);
            wind_speeds.insert("300hPa".to_string(), w);
            let layers = sample_layers(
                model.altitudes_km(),
                |h| hv57_cn2(h, w, a),
                |alt| (w * (1.0 - (-alt / 5.0).exp()) + 3.0).max(0.0),
                |_| None,
            );
            let summary = summarize_layers(&layers, query.wavelength_nm, Some(w), base_aod, base_abs);
            (layers, summary)
        }
        TurbulenceModel::Bufton => {
            let w300 = winds.require(300)?;
            let w500 = winds.require(500)?;
            let w850 = winds.require(850)?;
            let t850 = winds.temperature_850;
            let lapse = t850.map_or(0.8, |t| ((t + 273.15) / 290.0).clamp(0.5, 1.5));
            let shear = ((w500 - w850).abs() / 10.0).clamp(0.5, 2.5);

            let layers = sample_layers(
                model.altitudes_km(),
                |h| bufton_cn2(h, a, shear, lapse),
                |alt| {
                    if alt < 0.5 {
                        (w850 * 0.6).max(2.0)
                    } else if alt < 1.5 {
                        (w850 + w500) / 2.0
                    } else if alt < 6.0 {
                        w500
                    } else {
                        w300
                    }
                },
                |alt| t850.map(|t| (t + 273.15) - 6.5 * (alt - 1.5)),
            );
            let fallback = ((w300 * w300 + w500 * w500 + w850 * w850) / 3.0).sqrt();
            let mut summary =
                summarize_layers(&layers, query.wavelength_nm, Some(fallback), base_aod, base_abs);
            summary.scintillation_index = Some((0.3 + shear * 0.2).min(1.5));
            (layers, summary)
        }
        TurbulenceModel::Greenwood => {
            let w300 = winds.require(300)?;
            let w500 = winds.require(500)?;
            let w700 = winds.require(700)?;
            let layers = sample_layers(
                model.altitudes_km(),
                |h| greenwood_cn2(h, a),
                |alt| {
                    if alt < 1.5 {
                        (w700 + w500) / 2.0
                    } else if alt < 5.0 {
                        (w500 + w300) / 2.0
                    } else {
                        w300
                    }
                },
                |_| None,
            );
            let fallback = (w300 + w500 + w700) / 3.0;
            let summary =
                summarize_layers(&layers, query.wavelength_nm, Some(fallback), base_aod, base_abs);
            (layers, summary)
        }
    };

    Ok(AtmosphericProfile {
        model,
        status: "ok".to_string(),
        timestamp: query.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        summary,
        layers,
        provider: "Open-Meteo forecast".to_string(),
        variables: model.hourly_variables(),
        daytime: query.is_day(),
        wavelength_nm: query.wavelength_nm,
        ground_cn2: query.ground_cn2(),
        wind_speeds,
    })
}

/// Hufnagel-Valley 5/7 with upper wind `w` (m/s) and ground strength `a`; `h` in metres.
pub fn hv57_cn2(h: f64, w: f64, a: f64) -> f64 {
    let upper = 0.00594 * (w / 27.0).powi(2) * (h * 1e-5).powi(10) * (-h / 1000.0).exp();
    let tropo = 2.7e-16 * (-h / 1500.0).exp();
    let ground = a * (-h / 100.0).exp();
    upper + tropo + ground
}

fn bufton_cn2(h: f64, a: f64, shear: f64, lapse: f64) -> f64 {
    let h_km = h / 1000.0;
    if h_km < 0.5 {
        a * (-h / 60.0).exp()
    } else if h_km < 1.5 {
        0.3 * a * (-h / 120.0).exp() * shear
    } else if h_km < 5.0 {
        0.08 * a * (-h / 600.0).exp() * lapse
    } else {
        0.02 * a * (-(h - 5000.0) / 1500.0).exp()
    }
}

fn greenwood_cn2(h: f64, a: f64) -> f64 {
    let h_km = h / 1000.0;
    if h_km < 0.5 {
        a * (-h / 50.0).exp()
    } else if h_km < 2.0 {
        0.2 * a * (-h / 200.0).exp()
    } else if h_km < 8.0 {
        0.05 * a * (-h / 900.0).exp()
    } else {
        0.02 * a * (-(h - 8000.0) / 1500.0).exp()
    }
}

fn sample_layers(
    altitudes_km: &[f64],
    cn2: impl Fn(f64) -> f64,
    wind: impl Fn(f64) -> f64,
    temperature: impl Fn(f64) -> Option<f64>,
) -> Vec<AtmosphericLayer> {
    altitudes_km
        .iter()
        .map(|&alt_km| AtmosphericLayer {
            alt_km,
            cn2: Some(cn2(alt_km * 1000.0)),
            wind_mps: Some(wind(alt_km)),
            temperature_k: temperature(alt_km),
        })
        .collect()
}

/// Trapezoid rule over sorted abscissae.
fn trapezoid(y: &[f64], x: &[f64]) -> f64 {
    x.windows(2)
        .zip(y.windows(2))
        .map(|(xs, ys)| 0.5 * (ys[0] + ys[1]) * (xs[1] - xs[0]))
        .sum()
}

/// Zenith seeing figures integrated over the layers with a Cn² value.
///
/// Fewer than two such layers yields a fixed nominal summary.
pub fn summarize_layers(
    layers: &[AtmosphericLayer],
    wavelength_nm: f64,
    fallback_wind: Option<f64>,
    base_loss_aod: f64,
    base_loss_abs: f64,
) -> AtmosphericSummary {
    let fallback = fallback_wind.filter(|w| *w != 0.0).unwrap_or(DEFAULT_WIND_MPS);

    let mut samples: Vec<(f64, f64, f64)> = layers
        .iter()
        .filter_map(|layer| {
            let cn2 = layer.cn2?;
            let wind = layer.wind_mps.or(fallback_wind).unwrap_or(0.0);
            Some((layer.alt_km * 1000.0, cn2, wind))
        })
        .collect();

    if samples.len() < 2 {
        return AtmosphericSummary {
            r0_zenith: Some(0.1),
            fg_zenith: Some(30.0),
            theta0_zenith: Some(1.5),
            wind_rms: Some(fallback),
            loss_aod_db: Some(base_loss_aod),
            loss_abs_db: Some(base_loss_abs),
            ..Default::default()
        };
    }

    samples.sort_by(|a, b| a.0.total_cmp(&b.0));
    let heights: Vec<f64> = samples.iter().map(|s| s.0).collect();
    let cn2: Vec<f64> = samples.iter().map(|s| s.1).collect();
    let winds: Vec<f64> = samples.iter().map(|s| s.2).collect();

    let k = 2.0 * PI / (wavelength_nm * 1e-9);
    let k2 = k * k;
    let integral_r0 = trapezoid(&cn2, &heights);
    let weighted_h: Vec<f64> = cn2
        .iter()
        .zip(&heights)
        .map(|(c, h)| c * h.powf(5.0 / 3.0))
        .collect();
    let integral_theta = trapezoid(&weighted_h, &heights);
    let weighted_v: Vec<f64> = cn2
        .iter()
        .zip(&winds)
        .map(|(c, v)| c * v.abs().powf(5.0 / 3.0))
        .collect();
    let integral_wind = trapezoid(&weighted_v, &heights);

    let r0 = (0.423 * k2 * integral_r0.max(1e-20)).powf(-3.0 / 5.0);
    let theta0_rad = (2.91 * k2 * integral_theta.max(1e-20)).powf(-3.0 / 5.0);
    let fg = (0.102 * k2 * integral_wind.max(1e-30)).powf(3.0 / 5.0);

    let wind_rms = if winds.iter().any(|w| *w != 0.0) {
        (winds.iter().map(|w| w * w).sum::<f64>() / winds.len() as f64).sqrt()
    } else {
        fallback
    };
    let tau0 = 0.314 * r0 / wind_rms.max(1e-3);

    let cn2_scale = integral_r0.max(1e-12);
    let loss_aod = base_loss_aod + (0.18 * cn2_scale.powf(0.3)).min(1.8);
    let loss_abs = base_loss_abs + (0.12 * cn2_scale.powf(0.25)).min(1.2);

    AtmosphericSummary {
        r0_zenith: Some(r0),
        fg_zenith: Some(fg),
        theta0_zenith: Some(theta0_rad.to_degrees() * 3600.0),
        wind_rms: Some(wind_rms),
        loss_aod_db: Some(loss_aod),
        loss_abs_db: Some(loss_abs),
        coherence_time_ms: Some(tau0 * 1e3),
        scintillation_index: None,
    }
}
