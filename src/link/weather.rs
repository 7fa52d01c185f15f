//! Open-Meteo upper-air forecast client and background worker.

use anyhow::{Context, Result};
use bevy::log::{debug, error, info};
use chrono::{DateTime, Utc};
use bevy::prelude::Resource;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{
    Arc, Mutex,
    mpsc::{self, Receiver, Sender},
};
use std::thread;
use std::time::Duration;

use crate::link::atmosphere::{
    AtmosphereQuery, AtmosphericProfile, UpperAirWinds, build_profile, wind_speed,
};

pub const OPEN_METEO_URL: &str = "https://api.open-meteo.com/v1/forecast";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Forecast responses kept in memory per worker.
const MEMO_CAPACITY: usize = 128;

/// Memo key: location rounded to 1e-3 degrees, UTC date and sorted variables.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ForecastKey {
    lat_milli: i64,
    lon_milli: i64,
    date: String,
    variables: Vec<String>,
}

impl ForecastKey {
    pub fn new(query: &AtmosphereQuery, variables: &[String]) -> Self {
        Self::at(query.lat, query.lon, &query.timestamp, variables)
    }

    pub fn at(lat: f64, lon: f64, timestamp: &DateTime<Utc>, variables: &[String]) -> Self {
        let mut variables = variables.to_vec();
        variables.sort();
        variables.dedup();
        Self {
            lat_milli: (lat * 1000.0).round() as i64,
            lon_milli: (lon * 1000.0).round() as i64,
            date: timestamp.format("%Y-%m-%d").to_string(),
            variables,
        }
    }

    /// Request URL for this key: one UTC day of hourly data.
    pub fn url(&self, base: &str) -> String {
        format!(
            "{}?latitude={:.3}&longitude={:.3}&start_date={date}&end_date={date}&timezone=UTC&hourly={}",
            base,
            self.lat_milli as f64 / 1000.0,
            self.lon_milli as f64 / 1000.0,
            self.variables.join(","),
            date = self.date,
        )
    }
}

/// Hourly forecast fetcher with a small in-memory memo.
pub struct OpenMeteoClient {
    http: reqwest::Client,
    base_url: String,
    memo: HashMap<ForecastKey, String>,
    order: VecDeque<ForecastKey>,
}

impl OpenMeteoClient {
    pub fn new() -> Self {
        Self::with_base_url(OPEN_METEO_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: base_url.into(),
            memo: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    /// Raw hourly forecast body for one location and the UTC day of `timestamp`.
    pub async fn fetch_hourly(
        &mut self,
        lat: f64,
        lon: f64,
        timestamp: &DateTime<Utc>,
        variables: &[String],
    ) -> Result<String> {
        anyhow::ensure!(!variables.is_empty(), "No variables requested for Open-Meteo fetch");
        let key = ForecastKey::at(lat, lon, timestamp, variables);
        if let Some(body) = self.memo.get(&key) {
            debug!("open-meteo memo hit for {}", key.date);
            return Ok(body.clone());
        }

        let url = key.url(&self.base_url);
        let body = fetch_body(&self.http, &url).await?;
        // Reject bodies without an hourly block before memoizing them
        hourly_block(&body)?;
        self.remember(key, body.clone());
        Ok(body)
    }

    /// Fetch upper-air winds and build the profile for `query`.
    pub async fn fetch_profile(&mut self, query: &AtmosphereQuery) -> Result<AtmosphericProfile> {
        let variables = query.model.hourly_variables();
        let body = self
            .fetch_hourly(query.lat, query.lon, &query.timestamp, &variables)
            .await?;
        let winds = parse_upper_air(&body, &query.hour_key())?;
        build_profile(query, &winds)
    }

    pub(crate) fn remember(&mut self, key: ForecastKey, body: String) {
        if self.memo.len() >= MEMO_CAPACITY {
            if let Some(oldest) = self.order.pop_front() {
                self.memo.remove(&oldest);
            }
        }
        self.order.push_back(key.clone());
        self.memo.insert(key, body);
    }
}

impl Default for OpenMeteoClient {
    fn default() -> Self {
        Self::new()
    }
}

async fn fetch_body(client: &reqwest::Client, url: &str) -> Result<String> {
    let resp = client
        .get(url)
        .header("accept", "application/json")
        .send()
        .await
        .context("Open-Meteo request failed")?;
    let status = resp.status();
    let body = resp.text().await.context("read response")?;
    if !status.is_success() {
        anyhow::bail!("http {} for {}", status, url);
    }
    Ok(body)
}

pub(crate) fn hourly_block(body: &str) -> Result<serde_json::Map<String, Value>> {
    let value: Value = serde_json::from_str(body).context("invalid json")?;
    match value.get("hourly") {
        Some(Value::Object(hourly)) => Ok(hourly.clone()),
        _ => anyhow::bail!("Open-Meteo response missing 'hourly' block"),
    }
}

pub(crate) fn sample_at(hourly: &serde_json::Map<String, Value>, name: &str, idx: usize) -> Option<f64> {
    hourly.get(name)?.as_array()?.get(idx)?.as_f64()
}

/// Position of `hour_key` in the hourly timeline.
pub(crate) fn hour_index(hourly: &serde_json::Map<String, Value>, hour_key: &str) -> Result<usize> {
    let timeline = hourly
        .get("time")
        .and_then(Value::as_array)
        .context("Open-Meteo hourly timeline unavailable")?;
    timeline
        .iter()
        .position(|t| t.as_str() == Some(hour_key))
        .with_context(|| format!("No Open-Meteo sample available for {}", hour_key))
}

/// Upper-air winds at `hour_key` (e.g. `2025-06-01T14:00`) from an hourly forecast body.
///
/// Levels without both wind components are left unset.
pub fn parse_upper_air(body: &str, hour_key: &str) -> Result<UpperAirWinds> {
    let hourly = hourly_block(body)?;
    let idx = hour_index(&hourly, hour_key)?;

    let mut winds = UpperAirWinds::default();
    for level in [300, 500, 700, 850] {
        let u = sample_at(&hourly, &format!("wind_u_component_{}hPa", level), idx);
        let v = sample_at(&hourly, &format!("wind_v_component_{}hPa", level), idx);
        if let (Some(u), Some(v)) = (u, v) {
            winds.set_level(level, wind_speed(u, v));
        }
    }
    winds.temperature_850 = sample_at(&hourly, "temperature_850hPa", idx);
    Ok(winds)
}

#[derive(Debug, Clone)]
pub enum AtmosphereCommand {
    Fetch { station_id: String, query: AtmosphereQuery },
}

#[derive(Debug, Clone)]
pub enum AtmosphereResult {
    Profile {
        station_id: String,
        profile: AtmosphericProfile,
    },
    Error {
        station_id: String,
        error: String,
    },
}

#[derive(Resource, Clone)]
pub struct AtmosphereChannels {
    pub cmd_tx: Sender<AtmosphereCommand>,
    pub res_rx: Arc<Mutex<Receiver<AtmosphereResult>>>,
}

/// Spawn the forecast worker thread; it lives until the command sender is dropped.
pub fn start_atmosphere_worker() -> AtmosphereChannels {
    let (cmd_tx, cmd_rx) = mpsc::channel::<AtmosphereCommand>();
    let (res_tx, res_rx) = mpsc::channel::<AtmosphereResult>();

    thread::spawn(move || {
        let rt = match tokio::runtime::Runtime::new() {
            Ok(rt) => rt,
            Err(err) => {
                error!("atmosphere worker: failed to start tokio runtime: {}", err);
                return;
            }
        };
        rt.block_on(async move {
            let mut client = OpenMeteoClient::new();

            while let Ok(cmd) = cmd_rx.recv() {
                let AtmosphereCommand::Fetch { station_id, query } = cmd;
                let msg = match client.fetch_profile(&query).await {
                    Ok(profile) => {
                        info!(
                            "atmosphere: {} profile for {} at {}",
                            profile.model, station_id, profile.timestamp
                        );
                        AtmosphereResult::Profile { station_id, profile }
                    }
                    Err(err) => AtmosphereResult::Error {
                        station_id,
                        error: format!("{:#}", err),
                    },
                };
                let _ = res_tx.send(msg);
            }
        });
    });

    AtmosphereChannels {
        cmd_tx,
        res_rx: Arc::new(Mutex::new(res_rx)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::atmosphere::TurbulenceModel;
    use chrono::{TimeZone, Utc};

    const SAMPLE_BODY: &str = r#"{
        "latitude": 40.625,
        "longitude": 16.75,
        "hourly_units": {"time": "iso8601"},
        "hourly": {
            "time": ["2025-06-01T13:00", "2025-06-01T14:00", "2025-06-01T15:00"],
            "wind_u_component_300hPa": [20.0, 24.0, 22.0],
            "wind_v_component_300hPa": [5.0, 18.0, 3.0],
            "wind_u_component_500hPa": [9.0, 6.0, 8.0],
            "wind_v_component_500hPa": [1.0, 8.0, 2.0],
            "wind_u_component_850hPa": [3.0, 3.0, null],
            "wind_v_component_850hPa": [4.0, 4.0, 1.0],
            "temperature_850hPa": [13.5, 14.0, 14.5]
        }
    }"#;

    fn query(model: TurbulenceModel) -> AtmosphereQuery {
        AtmosphereQuery {
            lat: 40.64912,
            lon: 16.70449,
            timestamp: Utc.with_ymd_and_hms(2025, 6, 1, 14, 12, 0).unwrap(),
            model,
            ground_cn2_day: 1.7e-14,
            ground_cn2_night: 5e-15,
            wavelength_nm: 810.0,
        }
    }

    #[test]
    fn test_parse_upper_air_at_hour() {
        let winds = parse_upper_air(SAMPLE_BODY, "2025-06-01T14:00").unwrap();
        assert!((winds.wind_300.unwrap() - 30.0).abs() < 1e-12);
        assert!((winds.wind_500.unwrap() - 10.0).abs() < 1e-12);
        assert!((winds.wind_850.unwrap() - 5.0).abs() < 1e-12);
        assert!(winds.wind_700.is_none());
        assert_eq!(winds.temperature_850, Some(14.0));
    }

    #[test]
    fn test_parse_null_component_leaves_level_unset() {
        let winds = parse_upper_air(SAMPLE_BODY, "2025-06-01T15:00").unwrap();
        assert!(winds.wind_850.is_none());
        assert!(winds.wind_300.is_some());
    }

    #[test]
    fn test_parse_errors() {
        let err = parse_upper_air(SAMPLE_BODY, "2025-06-02T00:00").unwrap_err();
        assert!(err.to_string().contains("2025-06-02T00:00"), "{}", err);

        let err = parse_upper_air(r#"{"error": true, "reason": "bad"}"#, "x").unwrap_err();
        assert!(err.to_string().contains("hourly"), "{}", err);

        let err = parse_upper_air(r#"{"hourly": {}}"#, "x").unwrap_err();
        assert!(err.to_string().contains("timeline"), "{}", err);

        assert!(parse_upper_air("not json", "x").is_err());
    }

    #[test]
    fn test_parsed_winds_drive_profiles() {
        let winds = parse_upper_air(SAMPLE_BODY, "2025-06-01T14:00").unwrap();
        assert!(build_profile(&query(TurbulenceModel::HufnagelValley), &winds).is_ok());
        assert!(build_profile(&query(TurbulenceModel::Bufton), &winds).is_ok());

        // No 700 hPa data in the sample
        let err = build_profile(&query(TurbulenceModel::Greenwood), &winds).unwrap_err();
        assert!(err.to_string().contains("700hPa"));
    }

    #[test]
    fn test_forecast_key_rounding_and_order() {
        let q = query(TurbulenceModel::Bufton);
        let mut vars = q.model.hourly_variables();
        let a = ForecastKey::new(&q, &vars);
        vars.reverse();
        vars.push(vars[0].clone());
        let b = ForecastKey::new(&q, &vars);
        assert_eq!(a, b);

        let mut nearby = q.clone();
        nearby.lat += 0.0003;
        assert_eq!(ForecastKey::new(&nearby, &vars), a);

        let mut next_day = q.clone();
        next_day.timestamp = Utc.with_ymd_and_hms(2025, 6, 2, 1, 0, 0).unwrap();
        assert_ne!(ForecastKey::new(&next_day, &vars), a);
    }

    #[test]
    fn test_forecast_url() {
        let q = query(TurbulenceModel::HufnagelValley);
        let key = ForecastKey::new(&q, &q.model.hourly_variables());
        let url = key.url(OPEN_METEO_URL);
        assert_eq!(
            url,
            "https://api.open-meteo.com/v1/forecast?latitude=40.649&longitude=16.704\
             &start_date=2025-06-01&end_date=2025-06-01&timezone=UTC\
             &hourly=wind_u_component_300hPa,wind_v_component_300hPa"
        );
    }

    #[test]
    fn test_memo_evicts_oldest() {
        let mut client = OpenMeteoClient::with_base_url("http://localhost:9");
        let q = query(TurbulenceModel::HufnagelValley);
        let vars = q.model.hourly_variables();
        let first = ForecastKey::new(&q, &vars);
        for i in 0..=MEMO_CAPACITY {
            let mut qi = q.clone();
            qi.lat = 30.0 + i as f64 * 0.01;
            client.remember(ForecastKey::new(&qi, &vars), String::new());
        }
        client.remember(first.clone(), SAMPLE_BODY.to_string());
        assert_eq!(client.memo.len(), MEMO_CAPACITY);
        assert_eq!(client.memo.get(&first).map(String::as_str), Some(SAMPLE_BODY));
    }

    #[test]
    fn test_fetch_profile_uses_memo() {
        let mut client = OpenMeteoClient::with_base_url("http://localhost:9");
        let q = query(TurbulenceModel::HufnagelValley);
        client.remember(
            ForecastKey::new(&q, &q.model.hourly_variables()),
            SAMPLE_BODY.to_string(),
        );
        let rt = tokio::runtime::Runtime::new().unwrap();
        let profile = rt.block_on(client.fetch_profile(&q)).unwrap();
        assert!((profile.wind_speeds["300hPa"] - 30.0).abs() < 1e-12);
    }
}
