use std::fmt::Display;

use crate::types::BestEstimate;

pub type LocResult<T> = Result<T, LocError>;

#[derive(Debug)]
pub enum LocError {
    /// Invalid configuration or degenerate world bounds, fatal at startup
    ConfigError(String),

    /// Elapsed time went backwards, the motion update for the cycle is skipped
    ClockAnomaly { dt: f64 },

    /// Weights summed to zero or a non-finite value
    DegenerateWeights(String),

    /// An evaluation group errored or panicked
    EvaluationTaskFailure { group: usize, reason: String },

    SensorError(String),
    MapError(String),
    InfrastructureError(String),

    /// A fatal error, with the context needed to pick up debugging
    CycleAborted {
        cycle: u64,
        best: Option<BestEstimate>,
        source: Box<LocError>,
    },
}

impl LocError {
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::ClockAnomaly { .. } => false,
            Self::CycleAborted { source, .. } => source.is_fatal(),
            _ => true,
        }
    }
}

impl Display for LocError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConfigError(ref msg) => write!(f, "ConfigErr: {}", msg),
            Self::ClockAnomaly { dt } => write!(f, "ClockAnomaly: elapsed time was {}s", dt),
            Self::DegenerateWeights(ref msg) => write!(f, "DegenerateWeights: {}", msg),
            Self::EvaluationTaskFailure { group, ref reason } => {
                write!(f, "EvaluationTaskFailure in group {}: {}", group, reason)
            }
            Self::SensorError(ref msg) => write!(f, "SensorErr: {}", msg),
            Self::MapError(ref msg) => write!(f, "MapErr: {}", msg),
            Self::InfrastructureError(ref msg) => write!(f, "InfrastructureErr: {}", msg),
            Self::CycleAborted {
                cycle,
                best,
                ref source,
            } => match best {
                Some(best) => write!(
                    f,
                    "Cycle {} aborted (best estimate {} with score {}): {}",
                    cycle, best.particle, best.score, source
                ),
                None => write!(f, "Cycle {} aborted (no estimate yet): {}", cycle, source),
            },
        }
    }
}

impl std::error::Error for LocError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::CycleAborted { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for LocError {
    fn from(value: serde_json::Error) -> Self {
        LocError::InfrastructureError(format!("Serde Error: {}", value))
    }
}

impl From<std::io::Error> for LocError {
    fn from(value: std::io::Error) -> Self {
        LocError::InfrastructureError(format!("IO Error: {}", value))
    }
}

impl From<toml::de::Error> for LocError {
    fn from(value: toml::de::Error) -> Self {
        LocError::ConfigError(format!("TOML Error: {}", value))
    }
}

impl From<statrs::StatsError> for LocError {
    fn from(value: statrs::StatsError) -> Self {
        LocError::ConfigError(format!("Distribution Error: {}", value))
    }
}
