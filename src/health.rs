use std::time::Duration;

use bevy::prelude::*;

use crate::config::ChainLightningConfig;

pub struct HealthPlugin;

impl Plugin for HealthPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            Update,
            (set_dying_system, finish_dying_system)
                .chain()
                .in_set(HealthSystems),
        );
    }
}

/// Death bookkeeping. Runs after the chain systems each frame so damage dealt
/// by a chain turns into `Dying` in the same frame.
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub struct HealthSystems;

// ── Components ──────────────────────────────────────────────────────────────

#[derive(Component, Copy, Clone, PartialEq, Debug)]
pub struct Health(pub f64);

/// Marker for entities whose health ran out. They stay in the world for
/// `linger` so anything still holding their id (a pending cascade, the
/// visual layer) can read their last position, then get despawned.
#[derive(Component, Clone, Debug)]
pub struct Dying {
    pub linger: Timer,
}

impl Dying {
    pub fn new(linger: Duration) -> Self {
        Dying {
            linger: Timer::new(linger, TimerMode::Once),
        }
    }
}

// ── Systems ─────────────────────────────────────────────────────────────────

pub fn set_dying_system(
    mut commands: Commands,
    config: Option<Res<ChainLightningConfig>>,
    query: Query<(Entity, &Health), (Without<Dying>, Changed<Health>)>,
) {
    let linger = config
        .map(|config| config.death_linger())
        .unwrap_or_else(|| ChainLightningConfig::default().death_linger());

    for (entity, health) in query.iter() {
        if health.0 <= 0.0 {
            debug!("{:?} died", entity);
            commands.entity(entity).insert(Dying::new(linger));
        }
    }
}

pub fn finish_dying_system(
    mut commands: Commands,
    time: Res<Time>,
    mut query: Query<(Entity, &mut Dying)>,
) {
    for (entity, mut dying) in query.iter_mut() {
        dying.linger.tick(time.delta());
        if dying.linger.is_finished() {
            commands.entity(entity).despawn();
        }
    }
}
