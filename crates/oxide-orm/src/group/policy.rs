//! Replica routing policies.

use std::fmt::Debug;
use std::sync::{Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::engine::Engine;

/// Chooses the replica that serves a read.
pub trait GroupPolicy: Send + Sync + Debug {
    /// Picks one of `replicas`, which is never empty.
    fn pick<'a>(&self, replicas: &'a [Engine]) -> &'a Engine;
}

/// Index `i` repeated `weights[i]` times, in order.
fn expand_weights(weights: &[u32]) -> Vec<usize> {
    weights
        .iter()
        .enumerate()
        .flat_map(|(i, &w)| (0..w).map(move |_| i))
        .collect()
}

/// Slot `n` of `slots`, skipping slots past the replica count.
fn slot(slots: &[usize], n: usize, replicas: usize) -> usize {
    let usable: Vec<usize> = slots.iter().copied().filter(|&i| i < replicas).collect();
    if usable.is_empty() {
        return n % replicas;
    }
    usable[n % usable.len()]
}

/// Replicas in turn.
#[derive(Debug, Default)]
pub struct RoundRobinPolicy {
    next: Mutex<usize>,
}

impl RoundRobinPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl GroupPolicy for RoundRobinPolicy {
    fn pick<'a>(&self, replicas: &'a [Engine]) -> &'a Engine {
        let mut next = self.next.lock().unwrap_or_else(PoisonError::into_inner);
        let i = *next % replicas.len();
        *next = next.wrapping_add(1);
        &replicas[i]
    }
}

/// Round-robin over a schedule in which replica `i` appears `weights[i]`
/// times.
#[derive(Debug)]
pub struct WeightRoundRobinPolicy {
    slots: Vec<usize>,
    next: Mutex<usize>,
}

impl WeightRoundRobinPolicy {
    #[must_use]
    pub fn new(weights: &[u32]) -> Self {
        Self {
            slots: expand_weights(weights),
            next: Mutex::new(0),
        }
    }
}

impl GroupPolicy for WeightRoundRobinPolicy {
    fn pick<'a>(&self, replicas: &'a [Engine]) -> &'a Engine {
        let mut next = self.next.lock().unwrap_or_else(PoisonError::into_inner);
        let i = slot(&self.slots, *next, replicas.len());
        *next = next.wrapping_add(1);
        &replicas[i]
    }
}

/// Uniformly random replica.
#[derive(Debug)]
pub struct RandomPolicy {
    rng: Mutex<StdRng>,
}

impl RandomPolicy {
    /// Seeded from the operating system.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Reproducible sequence for a given seed.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Default for RandomPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl GroupPolicy for RandomPolicy {
    fn pick<'a>(&self, replicas: &'a [Engine]) -> &'a Engine {
        let i = self
            .rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .gen_range(0..replicas.len());
        &replicas[i]
    }
}

/// Random replica, replica `i` drawn with probability proportional to
/// `weights[i]`.
#[derive(Debug)]
pub struct WeightRandomPolicy {
    slots: Vec<usize>,
    rng: Mutex<StdRng>,
}

impl WeightRandomPolicy {
    #[must_use]
    pub fn new(weights: &[u32]) -> Self {
        Self {
            slots: expand_weights(weights),
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    #[must_use]
    pub fn seeded(weights: &[u32], seed: u64) -> Self {
        Self {
            slots: expand_weights(weights),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl GroupPolicy for WeightRandomPolicy {
    fn pick<'a>(&self, replicas: &'a [Engine]) -> &'a Engine {
        let n = self
            .rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .gen_range(0..self.slots.len().max(1));
        &replicas[slot(&self.slots, n, replicas.len())]
    }
}

/// Position of the smallest count, the first one on ties.
fn least_loaded(counts: impl IntoIterator<Item = u32>) -> usize {
    counts
        .into_iter()
        .enumerate()
        .min_by_key(|&(_, n)| n)
        .map_or(0, |(i, _)| i)
}

/// Replica with the fewest open connections; the first one on ties.
#[derive(Debug, Default, Clone, Copy)]
pub struct LeastConnPolicy;

impl GroupPolicy for LeastConnPolicy {
    fn pick<'a>(&self, replicas: &'a [Engine]) -> &'a Engine {
        &replicas[least_loaded(replicas.iter().map(|e| e.pool_stats().open))]
    }
}
