//! Link planning scene
//!
//! Holds the current scenario as a resource and keeps the trajectory, the
//! station link metrics and the station atmosphere in sync with it. Outputs
//! are memoized on a hash of their inputs, so systems are cheap when nothing
//! changed.

use bevy::prelude::*;

use crate::config::AtmosphereSettings;

pub mod resources;
pub mod systems;

pub use resources::{AtmosphereState, LinkMetricsCache, LinkScenario, PropagationCache};

pub struct LinkScenePlugin;

impl Plugin for LinkScenePlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<LinkScenario>()
            .init_resource::<AtmosphereSettings>()
            .init_resource::<PropagationCache>()
            .init_resource::<LinkMetricsCache>()
            .init_resource::<AtmosphereState>()
            .add_systems(Startup, systems::setup_atmosphere_worker)
            .add_systems(
                Update,
                (
                    systems::update_propagation,
                    systems::update_link_metrics,
                    systems::request_atmosphere,
                    systems::apply_atmosphere_results,
                )
                    .chain(),
            );
    }
}

/// True once the trajectory and link metrics match the current scenario.
pub fn scene_settled(world: &World) -> bool {
    let scenario = world.resource::<LinkScenario>();
    let propagation = world.resource::<PropagationCache>();
    let metrics = world.resource::<LinkMetricsCache>();
    let prop_key = scenario.propagation_key();
    propagation.key == Some(prop_key) && metrics.key == Some(scenario.metrics_key(prop_key))
}
