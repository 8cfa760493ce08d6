use rand::{rngs::StdRng, SeedableRng};

use bevy::prelude::*;

use crate::{
    cascade::{fire_cascade, CascadeQueue, CascadeReport},
    chain::ChainOutcome,
    config::{load_config, ChainLightningConfig},
    dispatch::{self, ChainRequest},
    health::{HealthPlugin, HealthSystems},
    params::AbilityParameters,
    recursion::RecursionContext,
    world::ChainWorld,
};

pub struct ChainLightningPlugin;

impl Plugin for ChainLightningPlugin {
    fn build(&self, app: &mut App) {
        app.add_message::<TriggerChainLightning>()
            .add_message::<ChainLightningArc>()
            .init_resource::<CascadeQueue>()
            .init_resource::<ChainLightningStats>()
            .add_plugins(HealthPlugin)
            .add_systems(PreStartup, load_config)
            .add_systems(Startup, setup_chain_engine);

        // The queue ticks before this frame's root chains add to it, so a new
        // batch only counts time from the frame after it was scheduled. Deaths
        // get resolved last, for everything the chains did this frame.
        app.add_systems(
            Update,
            (run_cascades_system, dispatch_triggers_system)
                .chain()
                .in_set(ChainLightningSystems)
                .before(HealthSystems),
        );
    }
}

#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChainLightningSystems;

// ── Components ──────────────────────────────────────────────────────────────

/// Marks an entity as carrying the chain ability. When a chain kills it, it
/// gets `trigger_chance` to fire a chain of its own.
#[derive(Component, Copy, Clone, PartialEq, Debug)]
pub struct ChainLightningCarrier {
    pub trigger_chance: f64,
}

impl Default for ChainLightningCarrier {
    fn default() -> Self {
        ChainLightningCarrier { trigger_chance: 1.0 }
    }
}

// ── Messages ────────────────────────────────────────────────────────────────

/// Fire the ability at `start`.
#[derive(Message, Debug, Clone, Copy, PartialEq)]
pub struct TriggerChainLightning {
    pub start: Entity,
    pub source: Option<Entity>,
    pub params: AbilityParameters,
}

impl TriggerChainLightning {
    pub fn new(
        start: Entity,
        base_damage: f64,
        max_targets: u32,
        initial_chance: f64,
        decay_factor: f64,
        damage_percent: f64,
        range: f64,
    ) -> Self {
        TriggerChainLightning {
            start,
            source: None,
            params: AbilityParameters::new(
                base_damage,
                max_targets,
                initial_chance,
                decay_factor,
                damage_percent,
                range,
            ),
        }
    }

    pub fn with_params(start: Entity, params: AbilityParameters) -> Self {
        TriggerChainLightning {
            start,
            source: None,
            params,
        }
    }

    /// Fired by a carrier, which is then never a candidate of its own chain.
    pub fn from_source(mut self, source: Entity) -> Self {
        self.source = Some(source);
        self
    }
}

/// The path one chain took, for whatever draws the lightning.
#[derive(Message, Debug, Clone, PartialEq)]
pub struct ChainLightningArc {
    /// 0 for a chain fired directly, n for the n-th cascade below it.
    pub generation: u32,
    /// Hit positions in hop order.
    pub points: Vec<Vec2>,
}

impl ChainLightningArc {
    fn from_outcome(generation: u32, outcome: &ChainOutcome) -> Option<Self> {
        (!outcome.is_empty()).then(|| ChainLightningArc {
            generation,
            points: outcome.hit_positions(),
        })
    }
}

// ── Resources ───────────────────────────────────────────────────────────────

/// The RNG every chain rolls against.
#[derive(Resource)]
pub struct ChainRng(pub StdRng);

impl ChainRng {
    pub fn new(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => ChainRng(StdRng::seed_from_u64(seed)),
            None => ChainRng(StdRng::from_entropy()),
        }
    }
}

/// Running totals, mostly for logs and tests.
#[derive(Resource, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ChainLightningStats {
    pub roots_fired: u64,
    pub roots_refused: u64,
    pub cascade: CascadeReport,
}

// ── Systems ─────────────────────────────────────────────────────────────────

/// Builds the depth budget and RNG from the loaded config. Anything inserted
/// up front is kept.
pub fn setup_chain_engine(
    mut commands: Commands,
    config: Res<ChainLightningConfig>,
    ctx: Option<Res<RecursionContext>>,
    rng: Option<Res<ChainRng>>,
) {
    if ctx.is_none() {
        commands.insert_resource(RecursionContext::new(config.max_depth));
    }
    if rng.is_none() {
        commands.insert_resource(ChainRng::new(config.rng_seed));
    }

    let worst_case = config.ability.worst_case_invocations(config.max_depth);
    info!(
        "Chain lightning ready: max depth {}, settle delay {:?}, worst case {} chain(s) per trigger",
        config.max_depth,
        config.settle_delay(),
        worst_case
    );
}

#[allow(clippy::too_many_arguments)]
pub fn dispatch_triggers_system(
    mut triggers: MessageReader<TriggerChainLightning>,
    mut arcs: MessageWriter<ChainLightningArc>,
    config: Res<ChainLightningConfig>,
    ctx: Res<RecursionContext>,
    mut queue: ResMut<CascadeQueue>,
    mut rng: ResMut<ChainRng>,
    mut stats: ResMut<ChainLightningStats>,
    mut world: ChainWorld,
) {
    for trigger in triggers.read() {
        let request = ChainRequest {
            start: trigger.start,
            source: trigger.source,
            params: trigger.params,
        };

        // Refusals were already logged.
        let Ok(dispatched) = dispatch::trigger(request, &ctx, &mut world, &mut rng.0) else {
            stats.roots_refused += 1;
            continue;
        };
        stats.roots_fired += 1;

        if let Some(arc) = ChainLightningArc::from_outcome(0, &dispatched.outcome) {
            arcs.write(arc);
        }
        queue.schedule(
            dispatched.outcome.retrigger,
            dispatched.params,
            dispatched.level,
            config.settle_delay(),
        );
    }
}

#[allow(clippy::too_many_arguments)]
pub fn run_cascades_system(
    time: Res<Time>,
    mut arcs: MessageWriter<ChainLightningArc>,
    config: Res<ChainLightningConfig>,
    ctx: Res<RecursionContext>,
    mut queue: ResMut<CascadeQueue>,
    mut rng: ResMut<ChainRng>,
    mut stats: ResMut<ChainLightningStats>,
    mut world: ChainWorld,
) {
    for due in queue.tick(time.delta()) {
        let fired = fire_cascade(due, &ctx, config.settle_delay(), &mut world, &mut rng.0);
        debug!("Cascade fired: {:?}", fired.report);
        stats.cascade.absorb(fired.report);

        for (generation, outcome) in &fired.runs {
            if let Some(arc) = ChainLightningArc::from_outcome(*generation, outcome) {
                arcs.write(arc);
            }
        }
        if let Some(next) = fired.next {
            queue.push(next);
        }
    }
}
