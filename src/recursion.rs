use std::sync::{
    atomic::{AtomicU32, AtomicU64, Ordering},
    Arc,
};

use bevy::prelude::*;

use crate::chain::ChainRefusal;

/// Default ceiling on cascade depth.
pub const DEFAULT_MAX_DEPTH: u32 = 5;

/// The depth budget every chain draws from.
///
/// There is one of these for the whole game. Cloning it hands out another
/// handle to the same counter, so chains fired by unrelated systems still
/// share one budget: two big cascades running at once can't each go
/// `max_depth` deep.
///
/// Depth only goes up through [`RecursionContext::enter`] (or `enter_nested`)
/// and only comes back down when the returned [`DepthGuard`] is dropped. That covers early returns
/// and panics for free.
#[derive(Resource, Clone, Debug)]
pub struct RecursionContext {
    state: Arc<DepthState>,
}

#[derive(Debug)]
struct DepthState {
    max_depth: u32,
    current: AtomicU32,
    entered: AtomicU64,
    exited: AtomicU64,
    refused: AtomicU64,
}

impl Default for RecursionContext {
    fn default() -> Self {
        RecursionContext::new(DEFAULT_MAX_DEPTH)
    }
}

impl RecursionContext {
    pub fn new(max_depth: u32) -> Self {
        RecursionContext {
            state: Arc::new(DepthState {
                max_depth,
                current: AtomicU32::new(0),
                entered: AtomicU64::new(0),
                exited: AtomicU64::new(0),
                refused: AtomicU64::new(0),
            }),
        }
    }

    pub fn max_depth(&self) -> u32 {
        self.state.max_depth
    }

    pub fn current_depth(&self) -> u32 {
        self.state.current.load(Ordering::Acquire)
    }

    /// Claims the first level of a brand-new chain, or refuses if the budget
    /// is used up.
    pub fn enter(&self) -> Result<DepthGuard, ChainRefusal> {
        self.claim(None)
    }

    /// Claims the level below `parent`. The new guard keeps `parent` alive,
    /// so a whole lineage stays claimed for as long as its deepest pending
    /// cascade exists.
    pub fn enter_nested(&self, parent: Arc<DepthGuard>) -> Result<DepthGuard, ChainRefusal> {
        self.claim(Some(parent))
    }

    // The check and the increment are one atomic step, so two callers can't
    // both squeeze into the last level.
    fn claim(&self, parent: Option<Arc<DepthGuard>>) -> Result<DepthGuard, ChainRefusal> {
        let max = self.state.max_depth;
        let claimed = self
            .state
            .current
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |depth| {
                (depth < max).then_some(depth + 1)
            });

        match claimed {
            Ok(previous) => {
                self.state.entered.fetch_add(1, Ordering::Relaxed);
                Ok(DepthGuard {
                    state: Arc::clone(&self.state),
                    depth: previous,
                    generation: parent.as_ref().map_or(0, |p| p.generation + 1),
                    _parent: parent,
                })
            }
            Err(depth) => {
                self.state.refused.fetch_add(1, Ordering::Relaxed);
                Err(ChainRefusal::DepthExhausted { depth, max })
            }
        }
    }

    pub fn stats(&self) -> DepthStats {
        DepthStats {
            current: self.current_depth(),
            entered: self.state.entered.load(Ordering::Relaxed),
            exited: self.state.exited.load(Ordering::Relaxed),
            refused: self.state.refused.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of the depth counters, for logs and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DepthStats {
    pub current: u32,
    pub entered: u64,
    pub exited: u64,
    pub refused: u64,
}

/// One claimed level of depth. Dropping it gives the level back.
///
/// A pending cascade keeps the guard of the level that produced it alive
/// (behind an `Arc`) until it fires, and every nested guard keeps its parent
/// alive, so the levels above a pending cascade stay claimed across the
/// settle delay.
#[derive(Debug)]
pub struct DepthGuard {
    state: Arc<DepthState>,
    depth: u32,
    generation: u32,
    _parent: Option<Arc<DepthGuard>>,
}

impl DepthGuard {
    /// Shared-budget level this guard occupies, counting every lineage that
    /// was live when it was claimed.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Levels between this guard and the root trigger of its own lineage.
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl Drop for DepthGuard {
    fn drop(&mut self) {
        self.state.current.fetch_sub(1, Ordering::AcqRel);
        self.state.exited.fetch_add(1, Ordering::Relaxed);
    }
}
