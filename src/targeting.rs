use bevy::prelude::*;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Which kinds of entity an ability is allowed to hop to.
    ///
    /// Every chain target carries its own layers in [`ChainTarget`]; a hop
    /// candidate is accepted when its layers intersect the ability's mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct TargetMask: u32 {
        const CREATURES = 1 << 0;
        const CARRIERS = 1 << 1;
        const STRUCTURES = 1 << 2;
        const ALL = Self::CREATURES.bits() | Self::CARRIERS.bits() | Self::STRUCTURES.bits();
    }
}

impl Default for TargetMask {
    fn default() -> Self {
        TargetMask::ALL
    }
}

/// Marks an entity as something a chain can hit, and on which layers.
///
/// Entities without this component are invisible to the chain, even if they
/// have `Health`.
#[derive(Component, Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct ChainTarget {
    pub layers: TargetMask,
}

impl Default for ChainTarget {
    fn default() -> Self {
        ChainTarget {
            layers: TargetMask::CREATURES,
        }
    }
}

impl ChainTarget {
    pub fn new(layers: TargetMask) -> Self {
        ChainTarget { layers }
    }

    pub fn accepts(&self, mask: TargetMask) -> bool {
        self.layers.intersects(mask)
    }
}

/// One entity returned by a spatial query, with the position it was seen at.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TargetRef {
    pub entity: Entity,
    pub position: Vec2,
}

/// Picks the candidate closest to `from`.
///
/// Equal distances go to the lowest `Entity`, so the pick never depends on the
/// order the spatial query happened to return things in.
pub fn nearest_target(from: Vec2, candidates: &[TargetRef]) -> Option<TargetRef> {
    candidates.iter().copied().min_by(|a, b| {
        let dist_a = from.distance_squared(a.position);
        let dist_b = from.distance_squared(b.position);
        dist_a
            .total_cmp(&dist_b)
            .then_with(|| a.entity.cmp(&b.entity))
    })
}

/// Distance check shared by every `TargetQuery` implementation.
///
/// The ability range is `f64`; positions are `f32` like the rest of the engine.
pub fn within_range(center: Vec2, position: Vec2, radius: f64) -> bool {
    if radius <= 0.0 {
        return false;
    }
    (center.distance(position) as f64) <= radius
}
