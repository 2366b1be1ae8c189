use serde::{Deserialize, Serialize};

use crate::types::{BestEstimate, Particle};

/// Culling is held off until the uniform start has seen a few evaluations.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy)]
pub enum Phase {
    Warmup { remaining: u64 },
    Steady,
}

#[derive(Debug, Clone)]
pub struct Tracker {
    phase: Phase,
    cycles_completed: u64,
    best: Option<BestEstimate>,
}
impl Tracker {
    pub fn new(warmup_cycles: u64) -> Self {
        let phase = if warmup_cycles == 0 {
            Phase::Steady
        } else {
            Phase::Warmup {
                remaining: warmup_cycles,
            }
        };
        Self {
            phase,
            cycles_completed: 0,
            best: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn cycles_completed(&self) -> u64 {
        self.cycles_completed
    }

    pub fn best(&self) -> Option<&BestEstimate> {
        self.best.as_ref()
    }

    /// Minimum normalised weight a particle needs to survive resampling.
    pub fn min_prob(&self, num_particles: usize) -> f64 {
        match self.phase {
            Phase::Warmup { .. } => 0.0,
            Phase::Steady => 1.0 / cast::f64(num_particles),
        }
    }

    /// Keep `particle` if it beats the best score seen so far. Returns true
    /// when the estimate changed.
    pub fn offer(&mut self, particle: Particle, score: f64) -> bool {
        let current = self.best.map(|b| b.score).unwrap_or(0.0);
        if score > current {
            log::debug!("New best estimate {} with score {}", particle, score);
            self.best = Some(BestEstimate { particle, score });
            true
        } else {
            false
        }
    }

    pub fn complete_cycle(&mut self) {
        self.cycles_completed += 1;
        self.phase = match self.phase {
            Phase::Warmup { remaining } if remaining > 1 => Phase::Warmup {
                remaining: remaining - 1,
            },
            Phase::Warmup { .. } => {
                log::info!(
                    "Warm-up finished after {} cycles, culling enabled",
                    self.cycles_completed
                );
                Phase::Steady
            }
            Phase::Steady => Phase::Steady,
        };
    }
}
