use bevy::log::LogPlugin;
use bevy::prelude::*;
use std::thread;
use std::time::Duration;

use qkdplanner::config::ScenarioConfig;
use qkdplanner::scene::{
    AtmosphereState, LinkMetricsCache, LinkScenario, LinkScenePlugin, PropagationCache,
    scene_settled,
};
use qkdplanner::stations::{GroundStation, StationStore};

const MAX_SETTLE_UPDATES: usize = 10;
const ATMOSPHERE_TIMEOUT: Duration = Duration::from_secs(15);
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Station named by the scenario, falling back to the reference station.
fn resolve_station(config: &ScenarioConfig) -> GroundStation {
    let Some(id) = config.selected_station_id.as_deref() else {
        return GroundStation::matera();
    };
    match StationStore::open_default().and_then(|store| store.get(id)) {
        Ok(Some(station)) => station,
        Ok(None) => {
            warn!("station {} not found in store, using Matera", id);
            GroundStation::matera()
        }
        Err(err) => {
            warn!("station store unavailable ({:#}), using Matera", err);
            GroundStation::matera()
        }
    }
}

fn main() -> anyhow::Result<()> {
    let mut app = App::new();
    app.add_plugins((MinimalPlugins, LogPlugin::default()));

    let config = ScenarioConfig::load_or_default()?;
    let station = resolve_station(&config);
    info!(
        "scenario: a={:.1} km e={:.4} i={:.1} deg, station {} ({:.3}, {:.3})",
        config.elements.semi_major_axis_km,
        config.elements.eccentricity,
        config.elements.inclination_deg,
        station.name,
        station.lat,
        station.lon
    );

    app.insert_resource(LinkScenario::from_config(&config, Some(station)))
        .insert_resource(config.atmosphere.clone())
        .add_plugins(LinkScenePlugin);
    app.finish();
    app.cleanup();

    for _ in 0..MAX_SETTLE_UPDATES {
        app.update();
        if scene_settled(app.world()) {
            break;
        }
    }

    if config.atmosphere.enabled {
        loop {
            let state = app.world().resource::<AtmosphereState>();
            if !state.pending || state.timed_out(ATMOSPHERE_TIMEOUT) {
                break;
            }
            thread::sleep(POLL_INTERVAL);
            app.update();
        }
    }

    report(app.world());
    Ok(())
}

fn report(world: &World) {
    let Some(result) = world.resource::<PropagationCache>().result.as_ref() else {
        error!("propagation did not complete");
        return;
    };
    info!(
        "orbit: a={:.1} km, period {:.1} s, span {:.1} s, {} samples",
        result.semi_major_km,
        result.orbit_period_s,
        result.total_time_s,
        result.timeline.len()
    );

    let metrics = &world.resource::<LinkMetricsCache>().metrics;
    let pass = metrics.summarize(&result.timeline);
    match (pass.first_visible_s, pass.last_visible_s) {
        (Some(first), Some(last)) => info!(
            "visibility: {} samples between t={:.0} s and t={:.0} s, max elevation {:.1} deg",
            pass.visible_samples,
            first,
            last,
            pass.max_elevation_deg.unwrap_or_default()
        ),
        _ => info!("visibility: satellite never rises above the station horizon"),
    }
    if let (Some(range), Some(loss)) = (pass.min_distance_km, pass.min_loss_db) {
        info!("link: min range {:.1} km, min coupling loss {:.2} dB", range, loss);
    }
    if let (Some(lo), Some(hi)) = (pass.doppler_min, pass.doppler_max) {
        info!("doppler factor: {:.8} .. {:.8}", lo, hi);
    }

    let atmosphere = world.resource::<AtmosphereState>();
    if let Some(profile) = &atmosphere.profile {
        let s = &profile.summary;
        info!(
            "atmosphere ({}): r0 {:.3} m, theta0 {:.2} arcsec, tau0 {:.2} ms",
            profile.model,
            s.r0_zenith.unwrap_or_default(),
            s.theta0_zenith.unwrap_or_default(),
            s.coherence_time_ms.unwrap_or_default()
        );
    } else if let Some(err) = &atmosphere.error {
        warn!("atmosphere unavailable: {}", err);
    } else if atmosphere.pending {
        warn!("atmosphere request timed out");
    }
}
