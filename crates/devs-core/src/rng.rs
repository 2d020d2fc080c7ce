//! Deterministic simulation-level RNG.
//!
//! # Determinism strategy
//!
//! The only sanctioned source of randomness in the kernel is tie-breaking
//! between submodels scheduled at the same instant.  Every coordinator gets
//! its own `SmallRng` derived from the run's seed:
//!
//!   seed = global_seed XOR (node_index * MIXING_CONSTANT)
//!
//! The mixing constant is the 64-bit fractional part of the golden ratio,
//! which spreads consecutive node indices uniformly across the seed space.
//! Two runs built from the same architecture with the same seed therefore
//! make the same choices, whatever order coordinators are stepped in.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::NodeId;

/// 64-bit fractional golden-ratio constant for seed mixing.
const MIXING_CONSTANT: u64 = 0x9e37_79b9_7f4a_7c15;

/// Seeded RNG owned by one coordinator (or one test).
///
/// `!Sync` on purpose of its inner `SmallRng`; a tree is stepped by a single
/// thread, so no synchronisation is needed.
pub struct SimRng(SmallRng);

impl SimRng {
    pub fn new(seed: u64) -> Self {
        SimRng(SmallRng::seed_from_u64(seed))
    }

    /// Seed deterministically from the run's global seed and a node ID.
    pub fn for_node(global_seed: u64, node: NodeId) -> Self {
        let seed = global_seed ^ (node.0 as u64).wrapping_mul(MIXING_CONSTANT);
        SimRng(SmallRng::seed_from_u64(seed))
    }

    /// Uniform index into a collection of `len` elements; `None` if empty.
    #[inline]
    pub fn choose_index(&mut self, len: usize) -> Option<usize> {
        (len > 0).then(|| self.0.gen_range(0..len))
    }
}

impl std::fmt::Debug for SimRng {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SimRng(..)")
    }
}
