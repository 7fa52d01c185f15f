//! Scene systems: recompute on input change, drive the atmosphere worker.

use bevy::prelude::*;
use chrono::Utc;
use std::time::Instant;

use crate::config::AtmosphereSettings;
use crate::link::atmosphere::AtmosphereQuery;
use crate::link::budget::compute_station_metrics;
use crate::link::weather::{
    AtmosphereChannels, AtmosphereCommand, AtmosphereResult, start_atmosphere_worker,
};
use crate::orbital::propagation::{propagate_orbit, total_span_s};
use crate::scene::resources::{AtmosphereState, LinkMetricsCache, LinkScenario, PropagationCache};

pub fn setup_atmosphere_worker(mut commands: Commands, settings: Res<AtmosphereSettings>) {
    if !settings.enabled {
        return;
    }
    let channels = start_atmosphere_worker();
    info!("atmosphere worker started ({} model)", settings.model);
    commands.insert_resource(channels);
}

/// Re-propagate when the orbital inputs change.
///
/// The previous timeline is offered for reuse only when the new request
/// covers the same span; otherwise the propagator builds a fresh one.
pub fn update_propagation(scenario: Res<LinkScenario>, mut cache: ResMut<PropagationCache>) {
    let key = scenario.propagation_key();
    if cache.key == Some(key) {
        return;
    }

    let span = total_span_s(&scenario.elements, &scenario.resonance);
    let hint = cache
        .result
        .as_ref()
        .filter(|prev| prev.total_time_s == span)
        .map(|prev| prev.timeline.clone());

    let result = propagate_orbit(
        &scenario.elements,
        &scenario.resonance,
        scenario.samples_per_orbit,
        hint.as_deref(),
    );
    info!(
        "propagated a={:.1} km, period {:.1} s, {} samples",
        result.semi_major_km,
        result.orbit_period_s,
        result.timeline.len()
    );

    cache.key = Some(key);
    cache.result = Some(result);
    cache.revision += 1;
}

/// Recompute link metrics when the trajectory, station or optics change.
pub fn update_link_metrics(
    scenario: Res<LinkScenario>,
    propagation: Res<PropagationCache>,
    mut cache: ResMut<LinkMetricsCache>,
) {
    let (Some(prop_key), Some(result)) = (propagation.key, propagation.result.as_ref()) else {
        return;
    };
    let key = scenario.metrics_key(prop_key);
    if cache.key == Some(key) {
        return;
    }

    cache.metrics = compute_station_metrics(
        &result.data_points,
        scenario.station.as_ref(),
        &scenario.effective_optical(),
    );
    cache.key = Some(key);
    cache.revision += 1;

    match &scenario.station {
        Some(station) => info!(
            "link metrics for {}: {} visible samples",
            station.name,
            cache.metrics.visible_indices().count()
        ),
        None => info!("no station selected, link metrics cleared"),
    }
}

/// Ask the worker for a profile whenever the selected station changes.
pub fn request_atmosphere(
    scenario: Res<LinkScenario>,
    settings: Res<AtmosphereSettings>,
    channels: Option<Res<AtmosphereChannels>>,
    mut state: ResMut<AtmosphereState>,
) {
    let Some(channels) = channels else { return };
    let Some(station) = scenario.station.as_ref() else {
        return;
    };
    if state.requested_for.as_deref() == Some(station.id.as_str()) {
        return;
    }

    let query = AtmosphereQuery {
        lat: station.lat,
        lon: station.lon,
        timestamp: Utc::now(),
        model: settings.model,
        ground_cn2_day: settings.ground_cn2_day,
        ground_cn2_night: settings.ground_cn2_night,
        wavelength_nm: scenario.optical.wavelength_nm,
    };
    let cmd = AtmosphereCommand::Fetch {
        station_id: station.id.clone(),
        query,
    };
    if channels.cmd_tx.send(cmd).is_err() {
        warn!("atmosphere worker is not running");
        state.error = Some("atmosphere worker is not running".to_string());
    } else {
        state.pending = true;
        state.requested_at = Some(Instant::now());
    }
    state.requested_for = Some(station.id.clone());
    state.profile = None;
}

/// Apply worker replies for the currently selected station.
pub fn apply_atmosphere_results(
    scenario: Res<LinkScenario>,
    channels: Option<Res<AtmosphereChannels>>,
    mut state: ResMut<AtmosphereState>,
) {
    let Some(channels) = channels else { return };
    let Ok(guard) = channels.res_rx.lock() else {
        return;
    };
    let selected = scenario.station.as_ref().map(|s| s.id.as_str());

    while let Ok(msg) = guard.try_recv() {
        match msg {
            AtmosphereResult::Profile { station_id, profile } => {
                if selected != Some(station_id.as_str()) {
                    continue;
                }
                state.profile = Some(profile);
                state.error = None;
                state.pending = false;
            }
            AtmosphereResult::Error { station_id, error } => {
                if selected != Some(station_id.as_str()) {
                    continue;
                }
                warn!("atmosphere profile for {} failed: {}", station_id, error);
                state.error = Some(error);
                state.pending = false;
            }
        }
    }
}
