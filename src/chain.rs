use std::collections::HashSet;

use bevy::prelude::*;
use rand::Rng;
use thiserror::Error;

use crate::{
    params::AbilityParameters,
    recursion::DepthGuard,
    targeting::{nearest_target, TargetMask, TargetRef},
};

// ── Collaborators ───────────────────────────────────────────────────────────
//
// The chain never touches the ECS directly. It asks these three questions and
// issues one command, so the same propagation code runs against real entities
// (see `world::ChainWorld`) and against plain in-memory fixtures in tests.

/// Spatial lookups.
pub trait TargetQuery {
    /// Where the entity is right now, or `None` if it isn't a chain target
    /// any more (despawned, or lost its `ChainTarget`).
    fn position(&self, entity: Entity) -> Option<Vec2>;

    /// True while the entity can still take damage: it exists and hasn't
    /// died / transitioned yet.
    fn is_damageable(&self, entity: Entity) -> bool;

    /// Damageable entities within `radius` of `center` whose layers intersect
    /// `mask`, skipping anything in `exclude`. Order is unspecified.
    fn find_damageable_in_radius(
        &self,
        center: Vec2,
        radius: f64,
        mask: TargetMask,
        exclude: &HashSet<Entity>,
    ) -> Vec<TargetRef>;
}

/// Applies damage. What the damage does (death, state change) is not the
/// chain's business; it checks `TargetQuery::is_damageable` afterwards.
pub trait DamageSink {
    fn apply_damage(&mut self, entity: Entity, amount: f64);
}

/// Who else carries this ability.
pub trait CarrierRegistry {
    fn is_ability_carrier(&self, entity: Entity) -> bool;

    /// The carrier's own chance to re-fire when it dies, `None` for non-carriers.
    fn carrier_trigger_chance(&self, entity: Entity) -> Option<f64>;
}

/// Everything `propagate` needs from the world.
pub trait ChainHost: TargetQuery + DamageSink + CarrierRegistry {}

impl<T: TargetQuery + DamageSink + CarrierRegistry> ChainHost for T {}

// ── Results ─────────────────────────────────────────────────────────────────

/// Reasons a chain doesn't start. None of these are failures of the game,
/// they just mean "this particular chain stops here".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ChainRefusal {
    #[error("chain start {0:?} is missing, dead or not a chain target")]
    InvalidStart(Entity),
    #[error("chain depth limit reached ({depth}/{max})")]
    DepthExhausted { depth: u32, max: u32 },
}

/// One entity hit by a chain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChainHit {
    pub entity: Entity,
    pub position: Vec2,
}

/// What a single chain run did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChainOutcome {
    /// Hits in hop order. The first one is the start target.
    pub hits: Vec<ChainHit>,
    /// Carriers this run killed, in the order they died.
    pub retrigger: Vec<Entity>,
    /// The continue chance left after the last hop.
    pub final_continue_chance: f64,
}

impl ChainOutcome {
    /// Positions for the lightning visual, in hop order.
    pub fn hit_positions(&self) -> Vec<Vec2> {
        self.hits.iter().map(|hit| hit.position).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

// ── Run state ───────────────────────────────────────────────────────────────

/// Mutable state of one chain run. Created per `propagate` call and thrown
/// away at the end of it; two runs never share one.
#[derive(Debug)]
pub struct ChainRun {
    visited: HashSet<Entity>,
    hits: Vec<ChainHit>,
    retrigger: Vec<Entity>,
    /// The entity the next hop searches around.
    current_target: ChainHit,
    continue_chance: f64,
}

impl ChainRun {
    pub fn new(start: ChainHit, params: &AbilityParameters) -> Self {
        ChainRun {
            visited: HashSet::new(),
            hits: Vec::new(),
            retrigger: Vec::new(),
            current_target: start,
            continue_chance: params.initial_continue_chance,
        }
    }

    pub fn hit_count(&self) -> usize {
        self.hits.len()
    }

    /// The decay-gated continuation test. One roll per hop, against the
    /// already-decayed chance; there is no second "did the hop succeed" roll.
    fn should_continue<R: Rng>(&self, rng: &mut R) -> bool {
        rng.gen::<f64>() < self.continue_chance
    }

    fn record_hit(&mut self, hit: ChainHit) {
        self.visited.insert(hit.entity);
        self.hits.push(hit);
        self.current_target = hit;
    }

    fn decay(&mut self, factor: f64) {
        self.continue_chance *= factor;
    }

    fn finish(self) -> ChainOutcome {
        ChainOutcome {
            hits: self.hits,
            retrigger: self.retrigger,
            final_continue_chance: self.continue_chance,
        }
    }
}

// ── Propagation ─────────────────────────────────────────────────────────────

/// Runs one chain from `start`.
///
/// `level` is the proof that the depth budget let this chain in; see
/// [`crate::recursion::RecursionContext::enter`]. `origin` is the carrier that
/// fired the ability. It is never reported as a retrigger candidate, even if
/// the chain kills it.
///
/// A `start` that no longer exists is not an error: it died between being
/// picked and the chain firing. The call does nothing and returns an empty
/// outcome. A start that exists but is already dead is still struck, which is
/// how a killed carrier fires its own chain; root triggers refuse such a start
/// before getting here (see [`crate::dispatch::trigger`]).
pub fn propagate<W, R>(
    start: Entity,
    params: &AbilityParameters,
    level: &DepthGuard,
    origin: Option<Entity>,
    world: &mut W,
    rng: &mut R,
) -> ChainOutcome
where
    W: ChainHost + ?Sized,
    R: Rng,
{
    let Some(start_position) = world.position(start) else {
        debug!("Chain start {:?} vanished before the chain fired", start);
        return ChainOutcome {
            final_continue_chance: params.initial_continue_chance,
            ..default()
        };
    };

    let start_hit = ChainHit {
        entity: start,
        position: start_position,
    };
    let mut run = ChainRun::new(start_hit, params);

    let hit_damage = params.hit_damage();
    let hit_cap = params.hit_cap();

    strike(&mut run, start_hit, hit_damage, origin, world);

    while run.hit_count() < hit_cap {
        if !run.should_continue(rng) {
            break;
        }

        let from = run.current_target.position;
        let candidates =
            world.find_damageable_in_radius(from, params.range, params.target_mask, &run.visited);

        let Some(next) = nearest_target(from, &candidates) else {
            break;
        };

        strike(
            &mut run,
            ChainHit {
                entity: next.entity,
                position: next.position,
            },
            hit_damage,
            origin,
            world,
        );
        run.decay(params.decay_factor);
    }

    debug!(
        "Chain of generation {} (depth {}) hit {} target(s), {} carrier(s) to retrigger",
        level.generation(),
        level.depth(),
        run.hits.len(),
        run.retrigger.len()
    );

    run.finish()
}

/// Hits one entity and checks whether the hit turned a live carrier into a
/// retrigger candidate.
fn strike<W>(run: &mut ChainRun, hit: ChainHit, damage: f64, origin: Option<Entity>, world: &mut W)
where
    W: ChainHost + ?Sized,
{
    let was_eligible = world.is_damageable(hit.entity);
    let was_carrier = world.is_ability_carrier(hit.entity);

    world.apply_damage(hit.entity, damage);
    run.record_hit(hit);

    let transitioned = was_eligible && !world.is_damageable(hit.entity);
    if transitioned && was_carrier && origin != Some(hit.entity) {
        run.retrigger.push(hit.entity);
    }
}
