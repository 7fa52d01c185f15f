//! Ground station file store
//!
//! Persists the station list as a pretty-printed JSON array so it can be
//! edited by hand and shared between runs.

use anyhow::{Context, Result};
use bevy::log::{info, warn};
use directories::ProjectDirs;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::stations::{DEFAULT_APERTURE_M, GroundStation};

const STORE_FILE_NAME: &str = "ogs_locations.json";

/// JSON-backed list of ground stations
pub struct StationStore {
    path: PathBuf,
}

impl StationStore {
    /// Open the store in the platform data directory
    ///
    /// - macOS: ~/Library/Application Support/qkdplanner/
    /// - Linux: ~/.local/share/qkdplanner/
    /// - Windows: %APPDATA%\qkdplanner\data\
    pub fn open_default() -> Result<Self> {
        let proj_dirs = ProjectDirs::from("", "", "qkdplanner")
            .ok_or_else(|| anyhow::anyhow!("Failed to resolve data directory"))?;
        Self::open(proj_dirs.data_dir().join(STORE_FILE_NAME))
    }

    /// Open (or create as `[]`) the store file at `path`.
    pub fn open(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating station directory {}", parent.display()))?;
        }
        if !path.exists() {
            fs::write(&path, "[]").with_context(|| format!("initialising {}", path.display()))?;
            info!("created empty station store at {}", path.display());
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All stored stations.
    ///
    /// Records saved without an id or aperture are completed and the file is
    /// rewritten once so later reads see stable ids.
    pub fn list(&self) -> Result<Vec<GroundStation>> {
        let mut raw = self.read_raw()?;
        let mut needs_write = false;

        for (idx, record) in raw.iter_mut().enumerate() {
            let Some(obj) = record.as_object_mut() else {
                continue;
            };
            let has_aperture = obj
                .get("apertureM")
                .or_else(|| obj.get("aperture_m"))
                .is_some_and(Value::is_number);
            if !has_aperture {
                obj.remove("aperture_m");
                obj.insert("apertureM".to_string(), Value::from(DEFAULT_APERTURE_M));
                needs_write = true;
            }
            let has_id = obj
                .get("id")
                .and_then(Value::as_str)
                .is_some_and(|id| !id.is_empty());
            if !has_id {
                obj.insert("id".to_string(), Value::from(format!("{}-{}", new_station_id(), idx)));
                needs_write = true;
            }
        }

        if needs_write {
            warn!("normalising station records in {}", self.path.display());
            self.write_raw(&raw)?;
        }

        raw.into_iter()
            .map(|v| serde_json::from_value(v).context("decoding station record"))
            .collect()
    }

    pub fn get(&self, id: &str) -> Result<Option<GroundStation>> {
        Ok(self.list()?.into_iter().find(|s| s.id == id))
    }

    /// Insert or replace a station by id, assigning one when missing.
    pub fn upsert(&self, mut station: GroundStation) -> Result<GroundStation> {
        station.validate()?;
        if station.id.is_empty() {
            station.id = new_station_id();
        }

        let mut stations = self.list()?;
        match stations.iter_mut().find(|s| s.id == station.id) {
            Some(existing) => *existing = station.clone(),
            None => stations.push(station.clone()),
        }
        self.write(&stations)?;
        info!("saved station {} ({})", station.name, station.id);
        Ok(station)
    }

    /// Remove a station; returns false when no record had that id.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let stations = self.list()?;
        let before = stations.len();
        let kept: Vec<_> = stations.into_iter().filter(|s| s.id != id).collect();
        if kept.len() == before {
            return Ok(false);
        }
        self.write(&kept)?;
        Ok(true)
    }

    pub fn clear(&self) -> Result<()> {
        self.write(&[])
    }

    fn read_raw(&self) -> Result<Vec<Value>> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("reading {}", self.path.display()))?;
        serde_json::from_str(&contents).with_context(|| format!("parsing {}", self.path.display()))
    }

    fn write_raw(&self, raw: &[Value]) -> Result<()> {
        let contents = serde_json::to_string_pretty(raw)?;
        fs::write(&self.path, contents)?;
        Ok(())
    }

    fn write(&self, stations: &[GroundStation]) -> Result<()> {
        let contents = serde_json::to_string_pretty(stations)?;
        fs::write(&self.path, contents)?;
        Ok(())
    }
}

/// Short random id of the form `station-xxxxxxxx`.
fn new_station_id() -> String {
    format!("station-{}", &Uuid::new_v4().simple().to_string()[..8])
}
