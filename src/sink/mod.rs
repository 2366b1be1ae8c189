use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::types::{Particle, SensorReading};

pub mod filesystem;

/// Point in the cycle at which a particle cloud was published.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy)]
pub enum Stage {
    Propagated,
    Resampled,
}
impl Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Propagated => write!(f, "propagated"),
            Stage::Resampled => write!(f, "resampled"),
        }
    }
}

/// Receives the particle cloud and laser scan for display.
///
/// Calls are fire-and-forget: a sink must not block the control loop and
/// has no way to report failure back to it.
pub trait VisualizationSink {
    fn show_particles(&self, cycle: u64, stage: Stage, particles: &[Particle]);
    fn show_laser(&self, cycle: u64, reading: &SensorReading);
}

pub struct NullSink;
impl VisualizationSink for NullSink {
    fn show_particles(&self, _cycle: u64, _stage: Stage, _particles: &[Particle]) {}
    fn show_laser(&self, _cycle: u64, _reading: &SensorReading) {}
}

/// Summarises each push at debug level.
pub struct LogSink;
impl VisualizationSink for LogSink {
    fn show_particles(&self, cycle: u64, stage: Stage, particles: &[Particle]) {
        log::debug!(
            "Cycle {} {}: {} particles, first {:?}",
            cycle,
            stage,
            particles.len(),
            particles.first()
        );
    }

    fn show_laser(&self, cycle: u64, reading: &SensorReading) {
        let nearest = reading
            .beams()
            .iter()
            .map(|b| b.range)
            .fold(f64::INFINITY, f64::min);
        log::debug!(
            "Cycle {} laser: {} beams, nearest return {:.3}m",
            cycle,
            reading.len(),
            nearest
        );
    }
}
