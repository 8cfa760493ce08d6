use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::targeting::TargetMask;

/// Everything one chain needs to know about the ability that fired it.
///
/// Built once per trigger from the owner's current configuration and never
/// changed while the chain (and any cascade it spawns) is running. Cascaded
/// chains reuse the exact same value.
///
/// Missing fields in a config file fall back to [`AbilityParameters::default`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AbilityParameters {
    pub base_damage: f64,
    /// Hits per chain, counting the start target.
    pub max_targets: u32,
    /// Probability of making the first hop. Must be in `[0, 1]`.
    pub initial_continue_chance: f64,
    /// Multiplier applied to the continue chance after each hop. Must be in `[0, 1]`.
    pub decay_factor: f64,
    /// Fraction of `base_damage` dealt by every hop.
    pub damage_percent: f64,
    /// Search radius around the current target, in world units.
    pub range: f64,
    pub target_mask: TargetMask,
}

impl Default for AbilityParameters {
    fn default() -> Self {
        AbilityParameters {
            base_damage: 10.0,
            max_targets: 5,
            initial_continue_chance: 0.8,
            decay_factor: 0.8,
            damage_percent: 1.0,
            range: 150.0,
            target_mask: TargetMask::ALL,
        }
    }
}

impl AbilityParameters {
    /// Same argument order as the public trigger surface, mask defaults to everything.
    pub fn new(
        base_damage: f64,
        max_targets: u32,
        initial_continue_chance: f64,
        decay_factor: f64,
        damage_percent: f64,
        range: f64,
    ) -> Self {
        AbilityParameters {
            base_damage,
            max_targets,
            initial_continue_chance,
            decay_factor,
            damage_percent,
            range,
            target_mask: TargetMask::ALL,
        }
    }

    pub fn with_mask(mut self, target_mask: TargetMask) -> Self {
        self.target_mask = target_mask;
        self
    }

    /// Damage dealt to every entity the chain hits.
    pub fn hit_damage(&self) -> f64 {
        self.base_damage * self.damage_percent
    }

    /// Upper bound on hits in one run. Zero still hits the start target.
    pub fn hit_cap(&self) -> usize {
        self.max_targets.max(1) as usize
    }

    /// Clamps out-of-range values instead of rejecting them.
    ///
    /// Probabilities go to `[0, 1]`, damage and range to `>= 0`. NaN becomes 0.
    /// Logs a warning when anything had to change.
    pub fn sanitized(self) -> Self {
        let clean = AbilityParameters {
            base_damage: non_negative(self.base_damage),
            max_targets: self.max_targets,
            initial_continue_chance: probability(self.initial_continue_chance),
            decay_factor: probability(self.decay_factor),
            damage_percent: non_negative(self.damage_percent),
            range: non_negative(self.range),
            target_mask: self.target_mask,
        };
        if clean != self {
            warn!("Chain ability parameters out of range, clamped {:?} to {:?}", self, clean);
        }
        clean
    }

    /// Most propagate calls a single root trigger can cause with this ability.
    ///
    /// Every run hits at most `max_targets` entities, so at most that many
    /// candidates, and the cascade tree is at most `max_depth` levels deep:
    /// `1 + m + m^2 + ... + m^(max_depth - 1)`. Saturates instead of overflowing.
    pub fn worst_case_invocations(&self, max_depth: u32) -> u64 {
        let fan_out = self.hit_cap() as u64;
        let mut total: u64 = 0;
        let mut level: u64 = 1;
        for _ in 0..max_depth {
            total = total.saturating_add(level);
            level = level.saturating_mul(fan_out);
        }
        total
    }
}

fn probability(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

fn non_negative(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.max(0.0)
    }
}
