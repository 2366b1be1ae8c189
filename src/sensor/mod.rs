use nalgebra::distance;

use crate::{
    error::{LocError, LocResult},
    types::{Particle, SensorReading, WorldBounds},
};

pub mod grid;

/// Produces the reading the robot would see if it stood at a given pose.
///
/// Implementations are shared between evaluation tasks and must be read-only
/// with respect to the map.
pub trait SensorModel: Send + Sync + 'static {
    fn simulate_reading_at(&self, pose: &Particle) -> LocResult<SensorReading>;
}

/// Extent of the known world and its cell scale.
pub trait MapBounds {
    fn world_bounds(&self) -> WorldBounds;

    /// Cells per metre.
    fn scale(&self) -> f64;
}

/// Similarity between a real and a simulated reading.
#[derive(Debug, Clone, Copy)]
pub struct Scorer {
    stride: usize,
}
impl Scorer {
    pub fn new(stride: usize) -> LocResult<Self> {
        if stride == 0 {
            return Err(LocError::ConfigError("Scoring stride must be positive".into()));
        }
        Ok(Self { stride })
    }

    /// Sum of `exp(-d)` over every `stride`-th pair of beam end points.
    ///
    /// Readings of different lengths are compared over the shorter one.
    pub fn score(&self, real: &SensorReading, simulated: &SensorReading) -> f64 {
        let len = real.len().min(simulated.len());
        real.beams()[..len]
            .iter()
            .zip(simulated.beams()[..len].iter())
            .step_by(self.stride)
            .map(|(r, s)| (-distance(&r.point(), &s.point())).exp())
            .sum()
    }

    /// Number of beam pairs a reading of `len` beams contributes.
    pub fn samples_for(&self, len: usize) -> usize {
        (len + self.stride - 1) / self.stride
    }
}
impl Default for Scorer {
    fn default() -> Self {
        Self { stride: 15 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LaserBeam;

    fn reading(ranges: &[f64]) -> SensorReading {
        let n = ranges.len().max(1) as f64;
        ranges
            .iter()
            .enumerate()
            .map(|(i, r)| LaserBeam::new(*r, i as f64 * std::f64::consts::PI / n))
            .collect()
    }

    #[test]
    fn identical_readings_score_sample_count() -> LocResult<()> {
        let scorer = Scorer::new(15)?;
        let r = reading(&vec![2.5; 180]);

        assert_eq!(12.0, scorer.score(&r, &r));
        assert_eq!(12, scorer.samples_for(180));

        let short = reading(&vec![1.0; 16]);
        assert_eq!(2.0, scorer.score(&short, &short));
        Ok(())
    }

    #[test]
    fn identical_is_the_maximum() -> LocResult<()> {
        let scorer = Scorer::new(1)?;
        let real = reading(&[1.0, 2.0, 3.0, 4.0]);
        let close = reading(&[1.1, 2.0, 3.0, 4.0]);
        let far = reading(&[3.0, 2.0, 3.0, 4.0]);

        let best = scorer.score(&real, &real);
        assert!(best > scorer.score(&real, &close));
        assert!(scorer.score(&real, &close) > scorer.score(&real, &far));
        assert!(scorer.score(&real, &far) > 0.0);
        Ok(())
    }

    #[test]
    fn mismatched_lengths_are_trimmed() -> LocResult<()> {
        let scorer = Scorer::new(2)?;
        let long = reading(&[1.0; 10]);
        let short: SensorReading = long.beams()[..5].iter().cloned().collect();

        assert_eq!(3.0, scorer.score(&long, &short));
        assert_eq!(3.0, scorer.score(&short, &long));
        Ok(())
    }

    #[test]
    fn empty_readings_score_zero() -> LocResult<()> {
        let scorer = Scorer::new(15)?;
        let empty = SensorReading::default();
        assert_eq!(0.0, scorer.score(&empty, &empty));
        assert_eq!(0.0, scorer.score(&empty, &reading(&[1.0; 30])));
        Ok(())
    }

    #[test]
    fn only_strided_beams_count() -> LocResult<()> {
        let scorer = Scorer::new(3)?;
        let real = reading(&[1.0, 1.0, 1.0, 1.0, 1.0, 1.0]);
        // Beams 1, 2, 4 and 5 are skipped, so disagreeing there costs nothing
        let sim = reading(&[1.0, 9.0, 9.0, 1.0, 9.0, 9.0]);
        assert_eq!(2.0, scorer.score(&real, &sim));
        Ok(())
    }

    #[test]
    fn zero_stride_is_rejected() {
        assert!(Scorer::new(0).is_err());
    }
}
