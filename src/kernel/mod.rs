use rand::Rng;

use crate::types::Particle;

pub mod gaussian;

/// Proposal used to seed a new particle from an existing one.
pub trait Kernel {
    fn perturb(&self, p: &Particle, rng: &mut impl Rng) -> Particle;
}
