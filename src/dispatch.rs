use std::sync::Arc;

use bevy::prelude::*;
use rand::Rng;

use crate::{
    chain::{propagate, ChainHost, ChainOutcome, ChainRefusal},
    params::AbilityParameters,
    recursion::{DepthGuard, RecursionContext},
};

/// One request to fire the ability at `start`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChainRequest {
    pub start: Entity,
    /// The carrier that fired it, if any. It is never reported as a
    /// retrigger candidate of its own chain.
    pub source: Option<Entity>,
    pub params: AbilityParameters,
}

/// A root chain that ran.
#[derive(Debug)]
pub struct Dispatched {
    pub outcome: ChainOutcome,
    /// The sanitized parameters the chain actually used. Cascades inherit these.
    pub params: AbilityParameters,
    /// The root level. Hand it to the cascade queue together with the
    /// candidates so it stays claimed until they fire.
    pub level: Arc<DepthGuard>,
}

/// Fires a root chain.
///
/// A start that is gone, already dead, or no longer a chain target is refused
/// before any depth is claimed. Refusals are logged here; callers only need
/// to drop them.
pub fn trigger<W, R>(
    request: ChainRequest,
    ctx: &RecursionContext,
    world: &mut W,
    rng: &mut R,
) -> Result<Dispatched, ChainRefusal>
where
    W: ChainHost + ?Sized,
    R: Rng,
{
    if world.position(request.start).is_none() || !world.is_damageable(request.start) {
        let refusal = ChainRefusal::InvalidStart(request.start);
        debug!("Ignoring chain trigger: {}", refusal);
        return Err(refusal);
    }

    let params = request.params.sanitized();
    let level = ctx.enter().map_err(|refusal| {
        warn!("Chain trigger on {:?} refused: {}", request.start, refusal);
        refusal
    })?;

    let outcome = propagate(request.start, &params, &level, request.source, world, rng);

    Ok(Dispatched {
        outcome,
        params,
        level: Arc::new(level),
    })
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, panic::AssertUnwindSafe};

    use rand::{rngs::StdRng, SeedableRng};

    use super::*;
    use crate::{
        chain::{CarrierRegistry, DamageSink, TargetQuery},
        targeting::{TargetMask, TargetRef},
        test_world::{ScriptedRng, TestArena},
    };

    fn request(start: Entity, params: AbilityParameters) -> ChainRequest {
        ChainRequest {
            start,
            source: None,
            params,
        }
    }

    #[test]
    fn missing_start_is_refused_without_claiming_depth() {
        let ctx = RecursionContext::new(2);
        let mut arena = TestArena::default();
        let start = arena.spawn(Vec2::ZERO, 10.0);
        arena.despawn(start);

        let result = trigger(
            request(start, AbilityParameters::default()),
            &ctx,
            &mut arena,
            &mut ScriptedRng::always(0.0),
        );

        assert_eq!(result.unwrap_err(), ChainRefusal::InvalidStart(start));
        assert_eq!(ctx.stats().entered, 0);
        assert!(arena.damage_log.is_empty());
    }

    #[test]
    fn dead_start_is_refused_and_spares_its_neighbours() {
        let ctx = RecursionContext::new(2);
        let mut arena = TestArena::default();
        let corpse = arena.spawn(Vec2::ZERO, 0.0);
        let bystander = arena.spawn(Vec2::new(1.0, 0.0), 10.0);
        let params = AbilityParameters::new(5.0, 3, 1.0, 1.0, 1.0, 5.0);

        let result = trigger(request(corpse, params), &ctx, &mut arena, &mut ScriptedRng::always(0.0));

        assert_eq!(result.unwrap_err(), ChainRefusal::InvalidStart(corpse));
        assert_eq!(arena.health(bystander), Some(10.0));
        assert!(arena.damage_log.is_empty());
        assert_eq!(ctx.stats().entered, 0);
    }

    #[test]
    fn depth_is_released_when_the_damage_sink_panics() {
        struct Brittle(TestArena);

        impl TargetQuery for Brittle {
            fn position(&self, entity: Entity) -> Option<Vec2> {
                self.0.position(entity)
            }

            fn is_damageable(&self, entity: Entity) -> bool {
                self.0.is_damageable(entity)
            }

            fn find_damageable_in_radius(
                &self,
                center: Vec2,
                radius: f64,
                mask: TargetMask,
                exclude: &HashSet<Entity>,
            ) -> Vec<TargetRef> {
                self.0.find_damageable_in_radius(center, radius, mask, exclude)
            }
        }

        impl DamageSink for Brittle {
            fn apply_damage(&mut self, _entity: Entity, _amount: f64) {
                panic!("damage sink blew up");
            }
        }

        impl CarrierRegistry for Brittle {
            fn is_ability_carrier(&self, entity: Entity) -> bool {
                self.0.is_ability_carrier(entity)
            }

            fn carrier_trigger_chance(&self, entity: Entity) -> Option<f64> {
                self.0.carrier_trigger_chance(entity)
            }
        }

        let ctx = RecursionContext::new(2);
        let mut arena = TestArena::default();
        let start = arena.spawn(Vec2::ZERO, 10.0);
        let mut world = Brittle(arena);

        let result = std::panic::catch_unwind(AssertUnwindSafe(|| {
            trigger(
                request(start, AbilityParameters::default()),
                &ctx,
                &mut world,
                &mut ScriptedRng::always(0.0),
            )
        }));

        assert!(result.is_err());
        let stats = ctx.stats();
        assert_eq!(stats.current, 0);
        assert_eq!(stats.entered, 1);
        assert_eq!(stats.exited, 1);
    }

    #[test]
    fn exhausted_budget_refuses_and_deals_no_damage() {
        let ctx = RecursionContext::new(1);
        let _busy = ctx.enter().unwrap();
        let mut arena = TestArena::default();
        let start = arena.spawn(Vec2::ZERO, 10.0);

        let result = trigger(
            request(start, AbilityParameters::default()),
            &ctx,
            &mut arena,
            &mut StdRng::seed_from_u64(1),
        );

        assert!(matches!(result, Err(ChainRefusal::DepthExhausted { .. })));
        assert_eq!(arena.health(start), Some(10.0));
    }

    #[test]
    fn root_chain_holds_its_level_until_dropped() {
        let ctx = RecursionContext::new(3);
        let mut arena = TestArena::default();
        let start = arena.spawn(Vec2::ZERO, 10.0);
        let params = AbilityParameters::new(4.0, 1, 1.0, 1.0, 0.5, 10.0);

        let dispatched = trigger(request(start, params), &ctx, &mut arena, &mut ScriptedRng::always(0.0)).unwrap();

        assert_eq!(dispatched.outcome.hits.len(), 1);
        assert_eq!(arena.health(start), Some(8.0));
        assert_eq!(dispatched.level.generation(), 0);
        assert_eq!(ctx.current_depth(), 1);
        drop(dispatched);
        assert_eq!(ctx.current_depth(), 0);
    }

    #[test]
    fn parameters_are_sanitized_before_use() {
        let ctx = RecursionContext::new(3);
        let mut arena = TestArena::default();
        let start = arena.spawn(Vec2::ZERO, 10.0);
        let _next = arena.spawn(Vec2::new(1.0, 0.0), 10.0);
        // A chance above one still behaves like a certain hop, negative damage heals nothing.
        let params = AbilityParameters::new(-3.0, 2, 7.0, 1.0, 1.0, 5.0);

        let dispatched = trigger(request(start, params), &ctx, &mut arena, &mut ScriptedRng::always(0.99)).unwrap();

        assert_eq!(dispatched.params.initial_continue_chance, 1.0);
        assert_eq!(dispatched.params.base_damage, 0.0);
        assert_eq!(dispatched.outcome.hits.len(), 2);
        assert_eq!(arena.health(start), Some(10.0));
    }

    #[test]
    fn source_carrier_is_not_its_own_candidate() {
        let ctx = RecursionContext::new(3);
        let mut arena = TestArena::default();
        let carrier = arena.spawn_carrier(Vec2::ZERO, 1.0, 1.0);
        let params = AbilityParameters::new(5.0, 1, 1.0, 1.0, 1.0, 5.0);

        let dispatched = trigger(
            ChainRequest {
                start: carrier,
                source: Some(carrier),
                params,
            },
            &ctx,
            &mut arena,
            &mut ScriptedRng::always(0.0),
        )
        .unwrap();

        assert!(dispatched.outcome.retrigger.is_empty());
        assert_eq!(arena.health(carrier), Some(-4.0));
    }
}
