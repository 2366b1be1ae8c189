use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{SystemTime, UNIX_EPOCH},
};

use rand::Rng;
use statrs::distribution::Normal;

use crate::{
    config,
    error::{LocError, LocResult},
    types::{Particle, Velocity, WorldBounds},
};

/// Source of wall-clock time in seconds.
pub trait Clock: Send {
    fn now(&self) -> f64;
}

/// Wall clock. May step backwards if the system time is adjusted.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;
impl Clock for SystemClock {
    fn now(&self) -> f64 {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_secs_f64(),
            Err(e) => -e.duration().as_secs_f64(),
        }
    }
}

/// Clock moved by hand, clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    bits: Arc<AtomicU64>,
}
impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            bits: Arc::new(AtomicU64::new(start.to_bits())),
        }
    }

    pub fn set(&self, t: f64) {
        self.bits.store(t.to_bits(), Ordering::SeqCst);
    }

    pub fn advance(&self, dt: f64) {
        self.set(self.now() + dt);
    }
}
impl Clock for ManualClock {
    fn now(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::SeqCst))
    }
}

/// Zero-mean Gaussian noise; a standard deviation of zero disables it.
#[derive(Debug, Clone, Copy)]
pub struct GaussianNoise {
    normal: Option<Normal>,
}
impl GaussianNoise {
    pub fn new(std_dev: f64) -> LocResult<Self> {
        if !std_dev.is_finite() || std_dev < 0.0 {
            return Err(LocError::ConfigError(format!(
                "Noise standard deviation must be finite and non-negative, got {}",
                std_dev
            )));
        }
        let normal = if std_dev == 0.0 {
            None
        } else {
            Some(Normal::new(0.0, std_dev)?)
        };
        Ok(Self { normal })
    }

    pub fn sample(&self, rng: &mut impl Rng) -> f64 {
        match self.normal {
            Some(normal) => rng.sample(normal),
            None => 0.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MotionModel {
    bounds: WorldBounds,
    position_noise: GaussianNoise,
    heading_noise: GaussianNoise,
}
impl MotionModel {
    pub fn new(bounds: WorldBounds, position_std: f64, heading_std: f64) -> LocResult<Self> {
        bounds.validate()?;
        Ok(Self {
            bounds,
            position_noise: GaussianNoise::new(position_std)?,
            heading_noise: GaussianNoise::new(heading_std)?,
        })
    }

    pub fn from_config(bounds: WorldBounds, config: &config::Motion) -> LocResult<Self> {
        Self::new(bounds, config.position_noise, config.heading_noise)
    }

    pub fn bounds(&self) -> &WorldBounds {
        &self.bounds
    }

    fn check_dt(dt: f64) -> LocResult<()> {
        if dt.is_finite() && dt >= 0.0 {
            Ok(())
        } else {
            Err(LocError::ClockAnomaly { dt })
        }
    }

    /// Move a pose by the commanded velocity over `dt` seconds.
    pub fn propagate(
        &self,
        particle: &Particle,
        dt: f64,
        velocity: Velocity,
        rng: &mut impl Rng,
    ) -> LocResult<Particle> {
        Self::check_dt(dt)?;
        Ok(self.propagate_unchecked(particle, dt, velocity, rng))
    }

    fn propagate_unchecked(
        &self,
        particle: &Particle,
        dt: f64,
        velocity: Velocity,
        rng: &mut impl Rng,
    ) -> Particle {
        let dx = dt * velocity.linear * particle.yaw.cos();
        let dy = dt * velocity.linear * particle.yaw.sin();
        let dyaw = dt * velocity.angular;

        let mut moved = Particle {
            x: particle.x + dx + self.position_noise.sample(rng),
            y: particle.y + dy + self.position_noise.sample(rng),
            yaw: particle.yaw + dyaw + self.heading_noise.sample(rng),
        };
        moved.clip_to_bounds(&self.bounds);
        moved
    }

    /// Move every particle in place. On a clock anomaly nothing is touched.
    pub fn propagate_all(
        &self,
        particles: &mut [Particle],
        dt: f64,
        velocity: Velocity,
        rng: &mut impl Rng,
    ) -> LocResult<()> {
        Self::check_dt(dt)?;
        for p in particles.iter_mut() {
            *p = self.propagate_unchecked(p, dt, velocity, rng);
        }
        Ok(())
    }
}
