use std::{sync::Arc, time::Duration};

use bevy::prelude::*;
use rand::Rng;

use crate::{
    chain::{propagate, ChainHost, ChainOutcome, ChainRefusal},
    params::AbilityParameters,
    recursion::{DepthGuard, RecursionContext},
};

/// How long a killed carrier gets to finish dying before its own chain fires.
pub const DEFAULT_SETTLE_DELAY_SECS: f64 = 0.1;

/// Carriers killed at one level of a cascade, waiting out the settle delay.
///
/// Owns everything it needs to fire later: the candidates, the ability they
/// inherit, and the depth level that produced them. Holding that level keeps
/// it (and every level above it) claimed until the batch has fired, so a
/// cascade can't outgrow the depth budget just because its parent returned.
#[derive(Debug)]
pub struct PendingCascade {
    pub candidates: Vec<Entity>,
    pub params: AbilityParameters,
    pub timer: Timer,
    level: Arc<DepthGuard>,
}

impl PendingCascade {
    pub fn new(
        candidates: Vec<Entity>,
        params: AbilityParameters,
        level: Arc<DepthGuard>,
        settle_delay: Duration,
    ) -> Self {
        PendingCascade {
            candidates,
            params,
            timer: Timer::new(settle_delay, TimerMode::Once),
            level,
        }
    }

    /// Generation of the chains that produced this batch. Its own chains run
    /// one generation later.
    pub fn parent_generation(&self) -> u32 {
        self.level.generation()
    }
}

/// Queue of cascades waiting for their settle delay, ticked once per frame.
#[derive(Resource, Debug, Default)]
pub struct CascadeQueue {
    pending: Vec<PendingCascade>,
}

impl CascadeQueue {
    /// Queues the candidates of one finished run. Empty lists are dropped
    /// immediately, releasing the level.
    pub fn schedule(
        &mut self,
        candidates: Vec<Entity>,
        params: AbilityParameters,
        level: Arc<DepthGuard>,
        settle_delay: Duration,
    ) {
        if candidates.is_empty() {
            return;
        }
        self.pending
            .push(PendingCascade::new(candidates, params, level, settle_delay));
    }

    pub fn push(&mut self, cascade: PendingCascade) {
        if !cascade.candidates.is_empty() {
            self.pending.push(cascade);
        }
    }

    /// Advances every timer and hands back the batches whose delay is over,
    /// oldest first.
    pub fn tick(&mut self, delta: Duration) -> Vec<PendingCascade> {
        for cascade in self.pending.iter_mut() {
            cascade.timer.tick(delta);
        }

        let (due, waiting): (Vec<_>, Vec<_>) = self
            .pending
            .drain(..)
            .partition(|cascade| cascade.timer.is_finished());
        self.pending = waiting;
        due
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Tally of what happened to each candidate in one fired batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CascadeReport {
    pub fired: usize,
    /// Despawned during the settle delay.
    pub stale: usize,
    /// Still around but no longer carries the ability.
    pub not_carrier: usize,
    /// Lost its own trigger-chance roll.
    pub roll_failed: usize,
    /// The whole batch was turned away by the depth budget.
    pub refused: usize,
}

impl CascadeReport {
    pub fn absorb(&mut self, other: CascadeReport) {
        self.fired += other.fired;
        self.stale += other.stale;
        self.not_carrier += other.not_carrier;
        self.roll_failed += other.roll_failed;
        self.refused += other.refused;
    }
}

/// Chains started by one fired batch.
#[derive(Debug, Default)]
pub struct FiredCascade {
    pub report: CascadeReport,
    /// One entry per chain that actually ran, with its generation.
    pub runs: Vec<(u32, ChainOutcome)>,
    /// Carriers killed by any of those chains, as one follow-up batch.
    pub next: Option<PendingCascade>,
}

/// Fires a batch whose settle delay is over.
///
/// Claims the level below the batch's parent first; if the budget is spent
/// nothing in the batch runs. Otherwise every candidate that still exists and
/// still carries the ability rolls its own trigger chance and, on success,
/// starts a fresh chain with the inherited parameters and itself as origin.
///
/// All chains of one batch share the new level, and the carriers they kill
/// are merged into a single follow-up batch. Siblings never push each other
/// deeper; only unrelated lineages compete for the budget.
pub fn fire_cascade<W, R>(
    cascade: PendingCascade,
    ctx: &RecursionContext,
    settle_delay: Duration,
    world: &mut W,
    rng: &mut R,
) -> FiredCascade
where
    W: ChainHost + ?Sized,
    R: Rng,
{
    let mut fired = FiredCascade::default();
    let PendingCascade {
        candidates,
        params,
        level: parent,
        ..
    } = cascade;

    let level = match ctx.enter_nested(parent) {
        Ok(guard) => Arc::new(guard),
        Err(refusal) => {
            log_refusal(&refusal, candidates.len());
            fired.report.refused = candidates.len();
            return fired;
        }
    };

    let mut killed: Vec<Entity> = Vec::new();
    for &candidate in &candidates {
        if world.position(candidate).is_none() {
            fired.report.stale += 1;
            continue;
        }
        let Some(chance) = world.carrier_trigger_chance(candidate) else {
            fired.report.not_carrier += 1;
            continue;
        };
        if rng.gen::<f64>() >= chance {
            fired.report.roll_failed += 1;
            continue;
        }

        let outcome = propagate(candidate, &params, &level, Some(candidate), world, rng);
        fired.report.fired += 1;

        for entity in &outcome.retrigger {
            if !killed.contains(entity) {
                killed.push(*entity);
            }
        }
        fired.runs.push((level.generation(), outcome));
    }

    if !killed.is_empty() {
        fired.next = Some(PendingCascade::new(killed, params, level, settle_delay));
    }

    fired
}

fn log_refusal(refusal: &ChainRefusal, candidates: usize) {
    debug!("Dropping cascade of {} carrier(s): {}", candidates, refusal);
}
