//! Tie-breaking between submodels scheduled at the same instant.

use devs_core::SimRng;

/// Chooses which of several simultaneously scheduled children steps first.
///
/// `candidates` holds the URIs of the tied children in definition order and
/// always has at least two entries.  The returned index must be in range.
///
/// Any `FnMut(&[&str]) -> usize` closure is a policy.
pub trait TieBreakPolicy {
    fn select(&mut self, candidates: &[&str]) -> usize;
}

impl<F> TieBreakPolicy for F
where
    F: FnMut(&[&str]) -> usize,
{
    fn select(&mut self, candidates: &[&str]) -> usize {
        self(candidates)
    }
}

/// Uniform random choice from a seeded RNG.  The default policy.
#[derive(Debug)]
pub struct SeededRandomSelect {
    rng: SimRng,
}

impl SeededRandomSelect {
    pub fn new(rng: SimRng) -> Self {
        Self { rng }
    }
}

impl TieBreakPolicy for SeededRandomSelect {
    fn select(&mut self, candidates: &[&str]) -> usize {
        self.rng.choose_index(candidates.len()).unwrap_or(0)
    }
}

/// Always the earliest-defined child.
#[derive(Copy, Clone, Debug, Default)]
pub struct FirstCandidate;

impl TieBreakPolicy for FirstCandidate {
    fn select(&mut self, _candidates: &[&str]) -> usize {
        0
    }
}

/// The child whose URI sorts first.
#[derive(Copy, Clone, Debug, Default)]
pub struct LexicographicSelect;

impl TieBreakPolicy for LexicographicSelect {
    fn select(&mut self, candidates: &[&str]) -> usize {
        candidates
            .iter()
            .enumerate()
            .min_by_key(|&(_, uri)| *uri)
            .map_or(0, |(i, _)| i)
    }
}
