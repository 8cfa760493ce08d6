//! Chain lightning for Bevy.
//!
//! A chain starts at one target, damages it, then keeps hopping to the
//! nearest untouched target with a chance that decays every hop. A target
//! that dies while carrying the ability can fire a chain of its own after a
//! short settle delay, and so on, bounded by one shared depth budget.
//!
//! Add [`ChainLightningPlugin`] and write [`TriggerChainLightning`] messages.
//! The propagation itself ([`chain::propagate`]) only talks to the traits in
//! [`chain`], so it also runs outside the ECS.

pub mod cascade;
pub mod chain;
pub mod chain_lightning;
pub mod config;
pub mod dispatch;
pub mod health;
pub mod params;
pub mod recursion;
pub mod targeting;
pub mod world;

#[cfg(test)]
mod test_world;

pub use chain_lightning::{
    ChainLightningArc, ChainLightningCarrier, ChainLightningPlugin, ChainLightningStats,
    TriggerChainLightning,
};
