use nalgebra::{Matrix2, Vector2};
use rand::Rng;
use statrs::distribution::Normal;

use crate::{
    config,
    error::{LocError, LocResult},
    motion::GaussianNoise,
    types::Particle,
};

use super::Kernel;

/// Draws positions from a 2-D Gaussian around the seed particle and jitters
/// its heading.
#[derive(Debug, Clone)]
pub struct GaussianKernel {
    pub covariance: Matrix2<f64>,
    cholesky_factor: Matrix2<f64>,
    standard: Normal,
    heading_noise: GaussianNoise,
}
impl GaussianKernel {
    pub fn new(covariance: Matrix2<f64>, heading_std: f64) -> LocResult<Self> {
        if covariance.iter().any(|v| !v.is_finite()) {
            return Err(LocError::ConfigError(
                "Regeneration covariance must be finite".into(),
            ));
        }
        if covariance[(0, 1)] != covariance[(1, 0)] {
            return Err(LocError::ConfigError(format!(
                "Regeneration covariance is not symmetric: {}",
                covariance
            )));
        }

        let cholesky_factor = if covariance == Matrix2::zeros() {
            Matrix2::zeros()
        } else {
            covariance
                .cholesky()
                .ok_or_else(|| {
                    LocError::ConfigError(format!(
                        "Regeneration covariance is not positive definite: {}",
                        covariance
                    ))
                })?
                .l()
        };

        Ok(Self {
            covariance,
            cholesky_factor,
            standard: Normal::new(0.0, 1.0)?,
            heading_noise: GaussianNoise::new(heading_std)?,
        })
    }

    pub fn from_config(config: &config::Resample) -> LocResult<Self> {
        let [[a, b], [c, d]] = config.position_covariance;
        Self::new(Matrix2::new(a, b, c, d), config.heading_noise)
    }
}

impl Kernel for GaussianKernel {
    fn perturb(&self, p: &Particle, rng: &mut impl Rng) -> Particle {
        let z = Vector2::new(rng.sample(self.standard), rng.sample(self.standard));
        let offset = self.cholesky_factor * z;
        Particle::new(
            p.x + offset.x,
            p.y + offset.y,
            p.yaw + self.heading_noise.sample(rng),
        )
    }
}
