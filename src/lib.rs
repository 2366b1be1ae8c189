//! Monte Carlo localization of a laser-equipped robot on a known map.
//!
//! Each cycle moves the particle cloud by the commanded velocity, weighs
//! every particle by how well a simulated scan from its pose matches the
//! real one, then culls and regenerates the cloud around the best poses.

pub mod config;
pub mod error;
pub mod evaluation;
pub mod kernel;
pub mod localizer;
pub mod motion;
pub mod resample;
pub mod sensor;
pub mod sim;
pub mod sink;
pub mod tracker;
pub mod types;

pub use config::Config;
pub use error::{LocError, LocResult};
pub use localizer::{CycleReport, Host, Localizer, RunSummary, StopReason};
pub use sensor::SensorModel;
pub use sink::VisualizationSink;
pub use types::{BestEstimate, LaserBeam, Particle, Population, SensorReading, Velocity, WorldBounds};
