use std::{f64::consts::TAU, fmt::Display};

use nalgebra::Point2;
use rand::{distributions::Uniform, prelude::Distribution, Rng};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::error::{LocError, LocResult};

/// Wrap an angle into `[0, 2π)`.
pub fn wrap_angle(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(TAU);
    // rem_euclid rounds tiny negative angles up to exactly TAU
    if wrapped >= TAU {
        0.0
    } else {
        wrapped
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Copy, Default)]
pub struct Particle {
    pub x: f64,
    pub y: f64,
    pub yaw: f64,
}
impl Particle {
    pub fn new(x: f64, y: f64, yaw: f64) -> Self {
        Self {
            x,
            y,
            yaw: wrap_angle(yaw),
        }
    }

    pub fn clip_to_bounds(&mut self, bounds: &WorldBounds) {
        self.x = self.x.clamp(bounds.x_low, bounds.x_high);
        self.y = self.y.clamp(bounds.y_low, bounds.y_high);
        self.yaw = wrap_angle(self.yaw);
    }
}

impl Display for Particle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(x: {:.3}, y: {:.3}, yaw: {:.3})", self.x, self.y, self.yaw)
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Copy)]
pub struct WorldBounds {
    pub x_low: f64,
    pub x_high: f64,
    pub y_low: f64,
    pub y_high: f64,
}
impl WorldBounds {
    pub fn new(x_low: f64, x_high: f64, y_low: f64, y_high: f64) -> LocResult<Self> {
        let bounds = Self {
            x_low,
            x_high,
            y_low,
            y_high,
        };
        bounds.validate()?;
        Ok(bounds)
    }

    pub fn validate(&self) -> LocResult<()> {
        let finite = [self.x_low, self.x_high, self.y_low, self.y_high]
            .iter()
            .all(|v| v.is_finite());
        if !finite || self.x_low >= self.x_high || self.y_low >= self.y_high {
            Err(LocError::ConfigError(format!(
                "Degenerate world bounds: {:?}",
                self
            )))
        } else {
            Ok(())
        }
    }

    pub fn contains(&self, p: &Particle) -> bool {
        p.x >= self.x_low && p.x <= self.x_high && p.y >= self.y_low && p.y <= self.y_high
    }
}

/// Pose hypotheses with an index-aligned weight vector.
///
/// Weights are only meaningful between an evaluation and the next change to
/// the particles; any mutation through this type marks them stale.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct Population {
    particles: Vec<Particle>,
    weights: Vec<f64>,
}
impl Population {
    pub fn initialize(n: usize, bounds: &WorldBounds, rng: &mut impl Rng) -> LocResult<Self> {
        if n == 0 {
            return Err(LocError::ConfigError(
                "Population needs at least one particle".into(),
            ));
        }
        bounds.validate()?;

        let x_dist = Uniform::new(bounds.x_low, bounds.x_high);
        let y_dist = Uniform::new(bounds.y_low, bounds.y_high);
        let yaw_dist = Uniform::new(0.0, TAU);

        let particles = (0..n)
            .map(|_| Particle {
                x: x_dist.sample(rng),
                y: y_dist.sample(rng),
                yaw: yaw_dist.sample(rng),
            })
            .collect();

        Ok(Self {
            particles,
            weights: Vec::new(),
        })
    }

    pub fn from_particles(particles: Vec<Particle>) -> LocResult<Self> {
        if particles.is_empty() {
            return Err(LocError::ConfigError(
                "Population needs at least one particle".into(),
            ));
        }
        Ok(Self {
            particles,
            weights: Vec::new(),
        })
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    pub fn particles_mut(&mut self) -> &mut [Particle] {
        self.weights.clear();
        &mut self.particles
    }

    pub fn weights(&self) -> Option<&[f64]> {
        if self.is_weighted() {
            Some(&self.weights)
        } else {
            None
        }
    }

    pub fn is_weighted(&self) -> bool {
        !self.weights.is_empty() && self.weights.len() == self.particles.len()
    }

    pub fn set_weights(&mut self, weights: Vec<f64>) -> LocResult<()> {
        if weights.len() != self.particles.len() {
            return Err(LocError::InfrastructureError(format!(
                "Weight vector length {} does not match population size {}",
                weights.len(),
                self.particles.len()
            )));
        }
        self.weights = weights;
        Ok(())
    }

    /// Swap in the particles of the next cycle. The size must not change.
    pub fn replace(&mut self, particles: Vec<Particle>) -> LocResult<()> {
        if particles.len() != self.particles.len() {
            return Err(LocError::InfrastructureError(format!(
                "Replacement population has {} particles, expected {}",
                particles.len(),
                self.particles.len()
            )));
        }
        self.particles = particles;
        self.weights.clear();
        Ok(())
    }

    /// Standard deviation of the cloud along x and y.
    pub fn spread(&self) -> (f64, f64) {
        let sx = self.particles.iter().map(|p| p.x).std_dev();
        let sy = self.particles.iter().map(|p| p.y).std_dev();
        (sx, sy)
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Copy, Default)]
pub struct Velocity {
    pub linear: f64,
    pub angular: f64,
}
impl Velocity {
    pub fn new(linear: f64, angular: f64) -> Self {
        Self { linear, angular }
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Copy)]
pub struct LaserBeam {
    pub range: f64,
    pub bearing: f64,
}
impl LaserBeam {
    pub fn new(range: f64, bearing: f64) -> Self {
        Self { range, bearing }
    }

    /// Beam end point in the sensor frame.
    pub fn point(&self) -> Point2<f64> {
        Point2::new(
            self.range * self.bearing.cos(),
            self.range * self.bearing.sin(),
        )
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Default)]
pub struct SensorReading {
    beams: Vec<LaserBeam>,
}
impl SensorReading {
    pub fn new(beams: Vec<LaserBeam>) -> Self {
        Self { beams }
    }

    pub fn beams(&self) -> &[LaserBeam] {
        &self.beams
    }

    pub fn len(&self) -> usize {
        self.beams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beams.is_empty()
    }
}

impl FromIterator<LaserBeam> for SensorReading {
    fn from_iter<T: IntoIterator<Item = LaserBeam>>(iter: T) -> Self {
        Self {
            beams: iter.into_iter().collect(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Copy)]
pub struct BestEstimate {
    pub particle: Particle,
    pub score: f64,
}
