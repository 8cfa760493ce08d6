//! Headless playground: a field of targets, some of them carriers, and a
//! chain fired at a random live target every second.

use bevy::prelude::*;
use rand::{seq::IteratorRandom, Rng};

use chain_cascade::{
    config::ChainLightningConfig,
    health::{Dying, Health},
    targeting::{ChainTarget, TargetMask},
    ChainLightningArc, ChainLightningCarrier, ChainLightningStats, TriggerChainLightning,
};

const FIELD_HALF_SIZE: f32 = 400.0;
const TARGET_COUNT: usize = 60;
const CARRIER_SHARE: f64 = 0.3;
const RUN_SECS: f32 = 10.0;

pub struct SandboxPlugin;

impl Plugin for SandboxPlugin {
    fn build(&self, app: &mut App) {
        app.insert_resource(ZapTimer(Timer::from_seconds(1.0, TimerMode::Repeating)))
            .insert_resource(SandboxClock(Timer::from_seconds(RUN_SECS, TimerMode::Once)))
            .add_systems(Startup, spawn_field)
            .add_systems(
                Update,
                (zap_system, log_arcs_system, end_sandbox_system).chain(),
            );
    }
}

#[derive(Resource)]
pub struct ZapTimer(pub Timer);

#[derive(Resource)]
pub struct SandboxClock(pub Timer);

pub fn spawn_field(mut commands: Commands) {
    let mut rng = rand::thread_rng();
    let mut carriers = 0;

    for _ in 0..TARGET_COUNT {
        let position = Vec3::new(
            rng.gen_range(-FIELD_HALF_SIZE..FIELD_HALF_SIZE),
            rng.gen_range(-FIELD_HALF_SIZE..FIELD_HALF_SIZE),
            0.0,
        );
        let health = Health(rng.gen_range(5.0..30.0));

        if rng.gen_bool(CARRIER_SHARE) {
            carriers += 1;
            commands.spawn((
                Transform::from_translation(position),
                ChainTarget::new(TargetMask::CREATURES | TargetMask::CARRIERS),
                health,
                ChainLightningCarrier {
                    trigger_chance: rng.gen_range(0.3..1.0),
                },
            ));
        } else {
            commands.spawn((Transform::from_translation(position), ChainTarget::default(), health));
        }
    }

    info!("Spawned {} targets, {} of them carriers", TARGET_COUNT, carriers);
}

pub fn zap_system(
    time: Res<Time>,
    mut timer: ResMut<ZapTimer>,
    config: Res<ChainLightningConfig>,
    targets: Query<Entity, (With<ChainTarget>, Without<Dying>)>,
    mut triggers: MessageWriter<TriggerChainLightning>,
) {
    timer.0.tick(time.delta());
    if !timer.0.just_finished() {
        return;
    }

    let Some(target) = targets.iter().choose(&mut rand::thread_rng()) else {
        info!("Nothing left to zap");
        return;
    };
    triggers.write(TriggerChainLightning::with_params(target, config.ability));
}

pub fn log_arcs_system(mut arcs: MessageReader<ChainLightningArc>) {
    for arc in arcs.read() {
        info!(
            "Arc (generation {}) through {} point(s): {:?}",
            arc.generation,
            arc.points.len(),
            arc.points
        );
    }
}

pub fn end_sandbox_system(
    time: Res<Time>,
    mut clock: ResMut<SandboxClock>,
    stats: Res<ChainLightningStats>,
    survivors: Query<(), (With<Health>, Without<Dying>)>,
    mut exit: MessageWriter<AppExit>,
) {
    clock.0.tick(time.delta());
    if clock.0.just_finished() {
        info!(
            "Sandbox done: {:?}, {} of {} targets still standing",
            *stats,
            survivors.iter().count(),
            TARGET_COUNT
        );
        exit.write(AppExit::Success);
    }
}
