//! In-memory fixtures for exercising the chain without an `App`.

use std::{
    cell::Cell,
    collections::{HashMap, HashSet},
};

use bevy::prelude::*;
use rand::RngCore;

use crate::{
    chain::{CarrierRegistry, DamageSink, TargetQuery},
    targeting::{within_range, TargetMask, TargetRef},
};

#[derive(Debug, Clone)]
pub struct Body {
    pub position: Vec2,
    pub health: f64,
    pub layers: TargetMask,
    pub carrier_chance: Option<f64>,
}

/// A flat list of bodies standing in for the ECS.
///
/// Entity ids come from a private `World` so they are real, ordered `Entity`
/// values. Bodies are iterated in reverse spawn order when queried, so tests
/// that rely on the lowest-entity tie-break actually exercise it.
pub struct TestArena {
    ids: World,
    bodies: HashMap<Entity, Body>,
    order: Vec<Entity>,
    queries: Cell<usize>,
    pub damage_log: Vec<(Entity, f64)>,
}

impl Default for TestArena {
    fn default() -> Self {
        TestArena {
            ids: World::new(),
            bodies: HashMap::new(),
            order: Vec::new(),
            queries: Cell::new(0),
            damage_log: Vec::new(),
        }
    }
}

impl TestArena {
    pub fn insert(&mut self, body: Body) -> Entity {
        let entity = self.ids.spawn_empty().id();
        self.bodies.insert(entity, body);
        self.order.push(entity);
        entity
    }

    pub fn spawn(&mut self, position: Vec2, health: f64) -> Entity {
        self.spawn_with_layers(position, health, TargetMask::CREATURES)
    }

    pub fn spawn_with_layers(&mut self, position: Vec2, health: f64, layers: TargetMask) -> Entity {
        self.insert(Body {
            position,
            health,
            layers,
            carrier_chance: None,
        })
    }

    pub fn spawn_carrier(&mut self, position: Vec2, health: f64, trigger_chance: f64) -> Entity {
        self.insert(Body {
            position,
            health,
            layers: TargetMask::CREATURES | TargetMask::CARRIERS,
            carrier_chance: Some(trigger_chance),
        })
    }

    pub fn despawn(&mut self, entity: Entity) {
        self.bodies.remove(&entity);
        self.order.retain(|e| *e != entity);
    }

    pub fn strip_carrier(&mut self, entity: Entity) {
        if let Some(body) = self.bodies.get_mut(&entity) {
            body.carrier_chance = None;
        }
    }

    pub fn health(&self, entity: Entity) -> Option<f64> {
        self.bodies.get(&entity).map(|body| body.health)
    }

    pub fn queries(&self) -> usize {
        self.queries.get()
    }
}

impl TargetQuery for TestArena {
    fn position(&self, entity: Entity) -> Option<Vec2> {
        self.bodies.get(&entity).map(|body| body.position)
    }

    fn is_damageable(&self, entity: Entity) -> bool {
        self.bodies.get(&entity).is_some_and(|body| body.health > 0.0)
    }

    fn find_damageable_in_radius(
        &self,
        center: Vec2,
        radius: f64,
        mask: TargetMask,
        exclude: &HashSet<Entity>,
    ) -> Vec<TargetRef> {
        self.queries.set(self.queries.get() + 1);
        self.order
            .iter()
            .rev()
            .filter(|entity| !exclude.contains(entity))
            .filter_map(|entity| self.bodies.get(entity).map(|body| (*entity, body)))
            .filter(|(_, body)| body.health > 0.0 && body.layers.intersects(mask))
            .filter(|(_, body)| within_range(center, body.position, radius))
            .map(|(entity, body)| TargetRef {
                entity,
                position: body.position,
            })
            .collect()
    }
}

impl DamageSink for TestArena {
    fn apply_damage(&mut self, entity: Entity, amount: f64) {
        if let Some(body) = self.bodies.get_mut(&entity) {
            if body.health > 0.0 {
                body.health -= amount;
            }
            self.damage_log.push((entity, amount));
        }
    }
}

impl CarrierRegistry for TestArena {
    fn is_ability_carrier(&self, entity: Entity) -> bool {
        self.carrier_trigger_chance(entity).is_some()
    }

    fn carrier_trigger_chance(&self, entity: Entity) -> Option<f64> {
        self.bodies.get(&entity).and_then(|body| body.carrier_chance)
    }
}

/// Hands out a fixed sequence of `[0, 1)` rolls, repeating the last one.
pub struct ScriptedRng {
    rolls: Vec<f64>,
    next: usize,
}

impl ScriptedRng {
    pub fn new(rolls: Vec<f64>) -> Self {
        assert!(!rolls.is_empty());
        ScriptedRng { rolls, next: 0 }
    }

    pub fn always(roll: f64) -> Self {
        ScriptedRng::new(vec![roll])
    }

    /// `rand`'s `f64` sampling uses the top 53 bits of `next_u64`.
    fn encode(roll: f64) -> u64 {
        ((roll * (1u64 << 53) as f64) as u64) << 11
    }
}

impl RngCore for ScriptedRng {
    fn next_u32(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }

    fn next_u64(&mut self) -> u64 {
        let index = self.next.min(self.rolls.len() - 1);
        self.next += 1;
        Self::encode(self.rolls[index])
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(8) {
            let bytes = self.next_u64().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}
