//! Global pressure-level weather fields sampled from the hourly forecast.
//!
//! A field is a coarse lat/lon grid of one forecast variable at one pressure
//! level and hour. Every grid point is an ordinary hourly fetch, so repeated
//! fields for the same day come from the client memo.

use anyhow::{Context, Result};
use bevy::log::{debug, info};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::fmt;

use crate::link::weather::{OpenMeteoClient, hour_index, hourly_block, sample_at};

pub const MIN_FIELD_SAMPLES: usize = 16;
pub const MAX_FIELD_SAMPLES: usize = 900;
const MIN_COLS: usize = 12;
const MIN_ROWS: usize = 6;
const LAT_LIMIT_DEG: f64 = 80.0;
const LON_LIMIT_DEG: f64 = 180.0;

/// A forecast variable and the pressure levels it is published at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariableDefinition {
    pub key: &'static str,
    pub label: &'static str,
    pub units: &'static str,
    pub levels_hpa: &'static [u32],
}

impl VariableDefinition {
    /// Forecast column name, e.g. `temperature_500hPa`.
    pub fn column(&self, level_hpa: u32) -> String {
        format!("{}_{}hPa", self.key, level_hpa)
    }
}

pub const VARIABLE_DEFINITIONS: &[VariableDefinition] = &[
    VariableDefinition {
        key: "wind_speed",
        label: "Wind speed",
        units: "m/s",
        levels_hpa: &[200, 250, 300, 500, 700, 850],
    },
    VariableDefinition {
        key: "temperature",
        label: "Temperature",
        units: "degC",
        levels_hpa: &[200, 300, 500, 700, 850],
    },
    VariableDefinition {
        key: "relative_humidity",
        label: "Relative humidity",
        units: "%",
        levels_hpa: &[700, 850, 925],
    },
    VariableDefinition {
        key: "geopotential_height",
        label: "Geopotential height",
        units: "m",
        levels_hpa: &[500, 700, 850],
    },
];

/// Unsupported variable or pressure level in a field request
#[derive(Debug, Clone, PartialEq)]
pub struct FieldParameterError {
    pub msg: String,
}

impl fmt::Display for FieldParameterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.msg)
    }
}

impl std::error::Error for FieldParameterError {}

/// Definition for `variable` (case and whitespace insensitive) at `level_hpa`.
pub fn resolve_variable(
    variable: &str,
    level_hpa: u32,
) -> Result<&'static VariableDefinition, FieldParameterError> {
    let key = variable.trim().to_ascii_lowercase();
    let definition = VARIABLE_DEFINITIONS
        .iter()
        .find(|d| d.key == key)
        .ok_or_else(|| FieldParameterError {
            msg: format!("Unsupported variable '{}'", variable),
        })?;
    if !definition.levels_hpa.contains(&level_hpa) {
        return Err(FieldParameterError {
            msg: format!("Variable '{}' is not available at {} hPa", variable, level_hpa),
        });
    }
    Ok(definition)
}

/// Regular lat/lon grid, rows run south to north and columns west to east
#[derive(Debug, Clone, PartialEq)]
pub struct FieldGrid {
    pub rows: usize,
    pub cols: usize,
    pub latitudes: Vec<f64>,
    pub longitudes: Vec<f64>,
}

impl FieldGrid {
    /// Grid of roughly `sample_hint` points, twice as wide as it is tall.
    ///
    /// The hint is clamped to 16..=900; the grid is never smaller than 6×12.
    pub fn for_samples(sample_hint: usize) -> Self {
        let samples = sample_hint.clamp(MIN_FIELD_SAMPLES, MAX_FIELD_SAMPLES);
        let cols = ((samples as f64 * 2.0).sqrt().round() as usize).max(MIN_COLS);
        let rows = samples.div_ceil(cols).max(MIN_ROWS);
        Self {
            rows,
            cols,
            latitudes: spread(-LAT_LIMIT_DEG, LAT_LIMIT_DEG, rows),
            longitudes: spread(-LON_LIMIT_DEG, LON_LIMIT_DEG, cols),
        }
    }

    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn spread(start: f64, end: f64, count: usize) -> Vec<f64> {
    if count < 2 {
        return vec![0.0; count];
    }
    (0..count)
        .map(|i| start + (end - start) * i as f64 / (count - 1) as f64)
        .collect()
}

/// Field request: one variable at one level and hour
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherFieldQuery {
    pub timestamp: DateTime<Utc>,
    pub variable: String,
    pub level_hpa: u32,
    pub samples: usize,
}

/// Extremes and mean over the valid grid values
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldStatistics {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub valid_samples: usize,
}

impl FieldStatistics {
    /// None when no value is present.
    pub fn from_values<'a>(values: impl IntoIterator<Item = &'a Option<f64>>) -> Option<Self> {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        let mut count = 0usize;
        for v in values.into_iter().flatten().copied() {
            min = min.min(v);
            max = max.max(v);
            sum += v;
            count += 1;
        }
        (count > 0 && min.is_finite() && max.is_finite()).then(|| Self {
            min,
            max,
            mean: sum / count as f64,
            valid_samples: count,
        })
    }
}

/// Sampled global field
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherField {
    pub timestamp: String,
    pub variable: String,
    pub label: String,
    pub units: String,
    pub level_hpa: u32,
    pub forecast_column: String,
    pub rows: usize,
    pub cols: usize,
    pub latitudes: Vec<f64>,
    pub longitudes: Vec<f64>,
    /// Row-major, `None` where the forecast had no value
    pub values: Vec<Vec<Option<f64>>>,
    #[serde(flatten)]
    pub stats: FieldStatistics,
    pub requested_samples: usize,
    pub actual_samples: usize,
}

/// Value of `column` at `hour_key` in one hourly body, `None` if null or missing.
fn point_value(body: &str, column: &str, hour_key: &str) -> Result<Option<f64>> {
    let hourly = hourly_block(body)?;
    let idx = hour_index(&hourly, hour_key)?;
    Ok(sample_at(&hourly, column, idx))
}

/// Sample `query.variable` over a global grid.
///
/// Fails on an unsupported variable or level (a [`FieldParameterError`]),
/// on any failed point fetch, and when no grid point has a value.
pub async fn build_weather_field(
    client: &mut OpenMeteoClient,
    query: &WeatherFieldQuery,
) -> Result<WeatherField> {
    let definition = resolve_variable(&query.variable, query.level_hpa)?;
    let column = definition.column(query.level_hpa);
    let grid = FieldGrid::for_samples(query.samples);
    let hour_key = query.timestamp.format("%Y-%m-%dT%H:00").to_string();
    let variables = [column.clone()];
    debug!(
        "sampling {} on a {}x{} grid for {}",
        column, grid.rows, grid.cols, hour_key
    );

    let mut values = Vec::with_capacity(grid.rows);
    for &lat in &grid.latitudes {
        let mut row = Vec::with_capacity(grid.cols);
        for &lon in &grid.longitudes {
            let body = client
                .fetch_hourly(lat, lon, &query.timestamp, &variables)
                .await
                .with_context(|| format!("field sample at ({:.2}, {:.2})", lat, lon))?;
            row.push(point_value(&body, &column, &hour_key)?);
        }
        values.push(row);
    }

    let stats = FieldStatistics::from_values(values.iter().flatten())
        .context("No valid samples returned by Open-Meteo")?;
    info!(
        "{} field: {} of {} points valid, {:.2}..{:.2} {}",
        column,
        stats.valid_samples,
        grid.len(),
        stats.min,
        stats.max,
        definition.units
    );

    Ok(WeatherField {
        timestamp: query.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        variable: definition.key.to_string(),
        label: definition.label.to_string(),
        units: definition.units.to_string(),
        level_hpa: query.level_hpa,
        forecast_column: column,
        rows: grid.rows,
        cols: grid.cols,
        actual_samples: grid.len(),
        latitudes: grid.latitudes,
        longitudes: grid.longitudes,
        values,
        stats,
        requested_samples: query.samples,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::weather::ForecastKey;
    use chrono::TimeZone;

    fn field_query(samples: usize) -> WeatherFieldQuery {
        WeatherFieldQuery {
            timestamp: Utc.with_ymd_and_hms(2025, 6, 1, 12, 40, 0).unwrap(),
            variable: "temperature".to_string(),
            level_hpa: 500,
            samples,
        }
    }

    fn hourly_body(column: &str, noon: Option<f64>) -> String {
        let noon = noon.map_or("null".to_string(), |v| v.to_string());
        format!(
            r#"{{"hourly": {{"time": ["2025-06-01T11:00", "2025-06-01T12:00"], "{}": [0.0, {}]}}}}"#,
            column, noon
        )
    }

    /// Client with every grid point already in the memo.
    fn seeded_client(
        query: &WeatherFieldQuery,
        value_at: impl Fn(f64, f64) -> Option<f64>,
    ) -> OpenMeteoClient {
        let mut client = OpenMeteoClient::with_base_url("http://localhost:9");
        let column = resolve_variable(&query.variable, query.level_hpa)
            .unwrap()
            .column(query.level_hpa);
        let grid = FieldGrid::for_samples(query.samples);
        for &lat in &grid.latitudes {
            for &lon in &grid.longitudes {
                let key = ForecastKey::at(lat, lon, &query.timestamp, &[column.clone()]);
                client.remember(key, hourly_body(&column, value_at(lat, lon)));
            }
        }
        client
    }

    #[test]
    fn test_grid_shape_and_clamps() {
        // round(sqrt(240)) = 15 columns, ceil(120 / 15) = 8 rows
        let grid = FieldGrid::for_samples(120);
        assert_eq!((grid.rows, grid.cols), (8, 15));

        // Below the floor: 16 samples, but never under 6x12
        let grid = FieldGrid::for_samples(1);
        assert_eq!((grid.rows, grid.cols), (6, 12));

        // Above the ceiling: 900 samples, round(sqrt(1800)) = 42, ceil(900 / 42) = 22
        let grid = FieldGrid::for_samples(5000);
        assert_eq!((grid.rows, grid.cols), (22, 42));
        assert_eq!(grid.len(), 924);
    }

    #[test]
    fn test_grid_spans_globe() {
        let grid = FieldGrid::for_samples(120);
        assert_eq!(grid.latitudes.len(), grid.rows);
        assert_eq!(grid.longitudes.len(), grid.cols);
        assert_eq!(grid.latitudes[0], -80.0);
        assert!((grid.latitudes[grid.rows - 1] - 80.0).abs() < 1e-12);
        assert_eq!(grid.longitudes[0], -180.0);
        assert!((grid.longitudes[grid.cols - 1] - 180.0).abs() < 1e-12);
        assert!(grid.latitudes.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn test_resolve_variable() {
        let def = resolve_variable("  Wind_Speed ", 250).unwrap();
        assert_eq!(def.units, "m/s");
        assert_eq!(def.column(250), "wind_speed_250hPa");
        assert_eq!(
            resolve_variable("relative_humidity", 925).unwrap().column(925),
            "relative_humidity_925hPa"
        );

        let err = resolve_variable("pressure", 500).unwrap_err();
        assert_eq!(err.msg, "Unsupported variable 'pressure'");
        let err = resolve_variable("geopotential_height", 300).unwrap_err();
        assert_eq!(err.msg, "Variable 'geopotential_height' is not available at 300 hPa");
    }

    #[test]
    fn test_field_statistics() {
        let values = [Some(2.0), None, Some(-4.0), Some(8.0), None];
        let stats = FieldStatistics::from_values(&values).unwrap();
        assert_eq!(stats.min, -4.0);
        assert_eq!(stats.max, 8.0);
        assert!((stats.mean - 2.0).abs() < 1e-12);
        assert_eq!(stats.valid_samples, 3);

        assert!(FieldStatistics::from_values(&[None, None]).is_none());
        assert!(FieldStatistics::from_values(&[]).is_none());
    }

    #[test]
    fn test_build_field_from_memo() {
        let query = field_query(120);
        // Northern hemisphere has no data
        let mut client = seeded_client(&query, |lat, lon| (lat < 0.0).then_some(lat + lon / 10.0));
        let rt = tokio::runtime::Runtime::new().unwrap();
        let field = rt.block_on(build_weather_field(&mut client, &query)).unwrap();

        assert_eq!((field.rows, field.cols), (8, 15));
        assert_eq!(field.values.len(), 8);
        assert!(field.values.iter().all(|row| row.len() == 15));
        assert!(field.values[7].iter().all(Option::is_none));
        assert_eq!(field.stats.valid_samples, 4 * 15);
        assert!((field.stats.min - (-80.0 - 18.0)).abs() < 1e-9);
        assert_eq!(field.forecast_column, "temperature_500hPa");
        assert_eq!(field.timestamp, "2025-06-01T12:40:00Z");
        assert_eq!((field.requested_samples, field.actual_samples), (120, 120));
    }

    #[test]
    fn test_build_field_errors() {
        let rt = tokio::runtime::Runtime::new().unwrap();

        let query = field_query(16);
        let mut client = seeded_client(&query, |_, _| None);
        let err = rt.block_on(build_weather_field(&mut client, &query)).unwrap_err();
        assert!(err.to_string().contains("No valid samples"), "{}", err);

        let mut bad = field_query(16);
        bad.level_hpa = 925;
        let err = rt.block_on(build_weather_field(&mut client, &bad)).unwrap_err();
        assert!(err.downcast_ref::<FieldParameterError>().is_some());

        // Hour outside the cached day
        let mut late = query.clone();
        late.timestamp = Utc.with_ymd_and_hms(2025, 6, 1, 23, 0, 0).unwrap();
        let err = rt.block_on(build_weather_field(&mut client, &late)).unwrap_err();
        assert!(err.to_string().contains("2025-06-01T23:00"), "{}", err);
    }
}
