use std::collections::HashSet;

use bevy::{ecs::system::SystemParam, prelude::*};

use crate::{
    chain::{CarrierRegistry, DamageSink, TargetQuery},
    chain_lightning::ChainLightningCarrier,
    health::{Dying, Health},
    targeting::{within_range, ChainTarget, TargetMask, TargetRef},
};

/// The chain's view of the ECS.
///
/// Only entities with a `Transform`, a `ChainTarget` and `Health` exist as far
/// as the chain is concerned. An entity is damageable while its health is
/// above zero and it hasn't been marked `Dying`; damage lands on `Health` right
/// away, so a kill is visible to the chain before `Dying` is inserted.
#[derive(SystemParam)]
pub struct ChainWorld<'w, 's> {
    targets: Query<
        'w,
        's,
        (
            Entity,
            &'static Transform,
            &'static ChainTarget,
            &'static mut Health,
            Option<&'static ChainLightningCarrier>,
            Has<Dying>,
        ),
    >,
}

fn alive(health: &Health, dying: bool) -> bool {
    health.0 > 0.0 && !dying
}

impl TargetQuery for ChainWorld<'_, '_> {
    fn position(&self, entity: Entity) -> Option<Vec2> {
        let (_, transform, ..) = self.targets.get(entity).ok()?;
        Some(transform.translation.truncate())
    }

    fn is_damageable(&self, entity: Entity) -> bool {
        self.targets
            .get(entity)
            .is_ok_and(|(_, _, _, health, _, dying)| alive(health, dying))
    }

    fn find_damageable_in_radius(
        &self,
        center: Vec2,
        radius: f64,
        mask: TargetMask,
        exclude: &HashSet<Entity>,
    ) -> Vec<TargetRef> {
        self.targets
            .iter()
            .filter(|(entity, ..)| !exclude.contains(entity))
            .filter(|(_, _, target, health, _, dying)| target.accepts(mask) && alive(health, *dying))
            .map(|(entity, transform, ..)| TargetRef {
                entity,
                position: transform.translation.truncate(),
            })
            .filter(|target| within_range(center, target.position, radius))
            .collect()
    }
}

impl DamageSink for ChainWorld<'_, '_> {
    fn apply_damage(&mut self, entity: Entity, amount: f64) {
        let Ok((_, _, _, mut health, _, _)) = self.targets.get_mut(entity) else {
            return;
        };
        // Corpses don't keep soaking damage.
        if health.0 > 0.0 {
            health.0 -= amount;
        }
    }
}

impl CarrierRegistry for ChainWorld<'_, '_> {
    fn is_ability_carrier(&self, entity: Entity) -> bool {
        self.carrier_trigger_chance(entity).is_some()
    }

    fn carrier_trigger_chance(&self, entity: Entity) -> Option<f64> {
        let (.., carrier, _) = self.targets.get(entity).ok()?;
        carrier.map(|carrier| carrier.trigger_chance)
    }
}
