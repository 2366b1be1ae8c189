use rand::Rng;

use crate::{
    error::{LocError, LocResult},
    kernel::Kernel,
    types::Particle,
};

/// Scale weights so they sum to one.
pub fn normalize(weights: &[f64]) -> LocResult<Vec<f64>> {
    let total_weight: f64 = weights.iter().sum();

    if !total_weight.is_finite() || total_weight <= 0.0 {
        return Err(LocError::DegenerateWeights(format!(
            "Weights of {} particles summed to {}",
            weights.len(),
            total_weight
        )));
    }

    Ok(weights.iter().map(|w| w / total_weight).collect())
}

const SURVIVAL_TOLERANCE: f64 = 1e-9;

/// Keep particles whose normalised weight is at least `min_prob`.
/// Returns the survivors and how many were dropped.
///
/// Summing and dividing can leave a weight of exactly `1/N` short by rounding
/// error that grows with `N`, so the threshold is relaxed by a relative
/// tolerance.
pub fn select_survivors(
    particles: &[Particle],
    normalized_weights: &[f64],
    min_prob: f64,
) -> (Vec<Particle>, usize) {
    let threshold = min_prob * (1.0 - SURVIVAL_TOLERANCE);
    let kept: Vec<Particle> = particles
        .iter()
        .zip(normalized_weights)
        .filter(|(_, w)| **w >= threshold)
        .map(|(p, _)| *p)
        .collect();
    let discarded = particles.len() - kept.len();
    (kept, discarded)
}

/// The `⌈N·top_fraction⌉` heaviest particles, heaviest first. Equal weights
/// keep their population order.
pub fn select_elite(
    particles: &[Particle],
    normalized_weights: &[f64],
    top_fraction: f64,
) -> Vec<Particle> {
    let n = particles.len().min(normalized_weights.len());
    if n == 0 {
        return Vec::new();
    }
    let top_n = ((cast::f64(n) * top_fraction).ceil() as usize).clamp(1, n);

    let mut indices: Vec<usize> = (0..n).collect();
    indices.sort_by(|&a, &b| {
        normalized_weights[b]
            .total_cmp(&normalized_weights[a])
            .then(a.cmp(&b))
    });

    indices
        .into_iter()
        .take(top_n)
        .map(|i| particles[i])
        .collect()
}

/// Seed `count` new particles from the elite, spread as evenly as possible.
/// The first `count % elite.len()` elites each seed one extra.
pub fn regenerate<K: Kernel>(
    elite: &[Particle],
    count: usize,
    kernel: &K,
    rng: &mut impl Rng,
) -> LocResult<Vec<Particle>> {
    if count == 0 {
        return Ok(Vec::new());
    }
    if elite.is_empty() {
        return Err(LocError::DegenerateWeights(format!(
            "No elite particles to regenerate {} replacements from",
            count
        )));
    }

    let per_elite = count / elite.len();
    let remainder = count % elite.len();

    let mut generated = Vec::with_capacity(count);
    for (i, seed) in elite.iter().enumerate() {
        let n = per_elite + usize::from(i < remainder);
        generated.extend((0..n).map(|_| kernel.perturb(seed, rng)));
    }
    Ok(generated)
}

/// Survivors followed by the regenerated particles, forced to exactly `n`.
pub fn next_population(
    kept: Vec<Particle>,
    regenerated: Vec<Particle>,
    n: usize,
) -> LocResult<Vec<Particle>> {
    let mut next = kept;
    next.extend(regenerated);

    if next.is_empty() && n > 0 {
        return Err(LocError::DegenerateWeights(
            "Nothing survived and nothing was regenerated".into(),
        ));
    }

    if next.len() < n {
        log::warn!("Padding next population from {} to {} particles", next.len(), n);
        let missing = n - next.len();
        let padding: Vec<Particle> = next.iter().cycle().take(missing).copied().collect();
        next.extend(padding);
    }
    next.truncate(n);
    Ok(next)
}
