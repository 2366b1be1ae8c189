use std::{ops::Range, sync::Arc};

use serde::{Deserialize, Serialize};
use tokio::runtime::{Builder, Handle, Runtime};

use crate::{
    error::{LocError, LocResult},
    sensor::{Scorer, SensorModel},
    types::{Particle, SensorReading},
};

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone, Copy)]
pub struct ScoredParticle {
    /// Position in the evaluated population
    pub index: usize,
    pub particle: Particle,
    pub score: f64,
}

/// Unnormalised weights, index-aligned with the evaluated particles.
#[derive(Debug, PartialEq, Clone)]
pub struct Evaluation {
    pub weights: Vec<f64>,
    pub best: Option<ScoredParticle>,
}

#[derive(Debug)]
struct GroupOutcome {
    scores: Vec<f64>,
    best: Option<(usize, f64)>,
}

/// Split `n` items into `min(group_count, n)` contiguous ranges of equal size,
/// the last one taking the remainder.
pub fn partition(n: usize, group_count: usize) -> Vec<Range<usize>> {
    let groups = group_count.min(n);
    if groups == 0 {
        return Vec::new();
    }
    let size = n / groups;
    (0..groups)
        .map(|g| {
            let start = g * size;
            let end = if g + 1 == groups { n } else { start + size };
            start..end
        })
        .collect()
}

fn evaluate_group<S: SensorModel>(
    sensor: &S,
    scorer: Scorer,
    particles: &[Particle],
    real: &SensorReading,
) -> LocResult<GroupOutcome> {
    let mut scores = Vec::with_capacity(particles.len());
    let mut best: Option<(usize, f64)> = None;

    for (i, particle) in particles.iter().enumerate() {
        let simulated = sensor.simulate_reading_at(particle)?;
        let score = scorer.score(real, &simulated);
        if !score.is_nan() && best.map_or(true, |(_, s)| score > s) {
            best = Some((i, score));
        }
        scores.push(score);
    }

    Ok(GroupOutcome { scores, best })
}

/// Scores a population in parallel groups on a dedicated runtime.
///
/// Evaluation blocks the calling thread, so it must be driven from
/// synchronous code. Called from inside a tokio runtime it returns an
/// `InfrastructureError` instead of evaluating.
pub struct Evaluator<S: SensorModel> {
    sensor: Arc<S>,
    scorer: Scorer,
    group_count: usize,
    // Only taken in Drop
    runtime: Option<Runtime>,
}
impl<S: SensorModel> Evaluator<S> {
    pub fn new(sensor: Arc<S>, scorer: Scorer, group_count: usize) -> LocResult<Self> {
        if group_count == 0 {
            return Err(LocError::ConfigError("Group count must be positive".into()));
        }
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(group_count)
            .thread_name("mcl-eval")
            .build()?;

        Ok(Self {
            sensor,
            scorer,
            group_count,
            runtime: Some(runtime),
        })
    }

    pub fn group_count(&self) -> usize {
        self.group_count
    }

    /// Score every particle against `real`.
    ///
    /// Blocks until every group has finished, even when one of them fails, so
    /// a failed cycle never leaves work running behind it.
    pub fn evaluate(
        &self,
        particles: &[Particle],
        real: &Arc<SensorReading>,
    ) -> LocResult<Evaluation> {
        if Handle::try_current().is_ok() {
            return Err(LocError::InfrastructureError(
                "Evaluation blocks and cannot run inside an async context".into(),
            ));
        }
        let runtime = self
            .runtime
            .as_ref()
            .ok_or_else(|| LocError::InfrastructureError("Evaluation runtime is gone".into()))?;
        let ranges = partition(particles.len(), self.group_count);

        let group_futures = ranges.iter().map(|range| {
            let group = particles[range.clone()].to_vec();
            let sensor = Arc::clone(&self.sensor);
            let real = Arc::clone(real);
            let scorer = self.scorer;
            runtime.spawn_blocking(move || evaluate_group(sensor.as_ref(), scorer, &group, &real))
        });
        let joined = futures::future::join_all(group_futures);
        let outcomes = runtime.block_on(joined);

        let mut weights = Vec::with_capacity(particles.len());
        let mut best: Option<ScoredParticle> = None;

        for (group, (range, outcome)) in ranges.into_iter().zip(outcomes).enumerate() {
            let outcome = match outcome {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(e)) => {
                    return Err(LocError::EvaluationTaskFailure {
                        group,
                        reason: e.to_string(),
                    })
                }
                Err(e) => {
                    return Err(LocError::EvaluationTaskFailure {
                        group,
                        reason: format!("Task did not complete: {}", e),
                    })
                }
            };

            if outcome.scores.len() != range.len() {
                return Err(LocError::EvaluationTaskFailure {
                    group,
                    reason: format!(
                        "Returned {} scores for {} particles",
                        outcome.scores.len(),
                        range.len()
                    ),
                });
            }

            // Strictly greater, so ties go to the earlier group
            if let Some((local, score)) = outcome.best {
                if best.map_or(true, |b| score > b.score) {
                    let index = range.start + local;
                    best = Some(ScoredParticle {
                        index,
                        particle: particles[index],
                        score,
                    });
                }
            }

            weights.extend(outcome.scores);
        }

        log::debug!(
            "Evaluated {} particles in {} groups, best {:?}",
            weights.len(),
            self.group_count().min(particles.len()),
            best
        );

        Ok(Evaluation { weights, best })
    }
}

impl<S: SensorModel> Drop for Evaluator<S> {
    fn drop(&mut self) {
        // A blocking shutdown panics when dropped from async code
        if let Some(runtime) = self.runtime.take() {
            if Handle::try_current().is_ok() {
                runtime.shutdown_background();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts::FRAC_PI_2;

    use super::*;
    use crate::types::LaserBeam;

    /// Reports the pose itself as two beams, one along each axis.
    struct PoseEcho;
    impl SensorModel for PoseEcho {
        fn simulate_reading_at(&self, pose: &Particle) -> LocResult<SensorReading> {
            Ok(SensorReading::new(vec![
                LaserBeam::new(pose.x, 0.0),
                LaserBeam::new(pose.y, FRAC_PI_2),
            ]))
        }
    }

    struct FailsBeyond(f64);
    impl SensorModel for FailsBeyond {
        fn simulate_reading_at(&self, pose: &Particle) -> LocResult<SensorReading> {
            if pose.x > self.0 {
                Err(LocError::SensorError(format!("No reading at {}", pose)))
            } else {
                PoseEcho.simulate_reading_at(pose)
            }
        }
    }

    struct PanicsBeyond(f64);
    impl SensorModel for PanicsBeyond {
        fn simulate_reading_at(&self, pose: &Particle) -> LocResult<SensorReading> {
            if pose.x > self.0 {
                panic!("simulator crashed");
            }
            PoseEcho.simulate_reading_at(pose)
        }
    }

    fn evaluator<S: SensorModel>(sensor: S, groups: usize) -> Evaluator<S> {
        Evaluator::new(Arc::new(sensor), Scorer::new(1).unwrap(), groups).unwrap()
    }

    fn line(n: usize) -> Vec<Particle> {
        (0..n).map(|i| Particle::new(i as f64, 0.0, 0.0)).collect()
    }

    #[test]
    fn partition_gives_remainder_to_last_group() {
        assert_eq!(vec![0..3, 3..6, 6..10], partition(10, 3));
        assert_eq!(vec![0..1, 1..2, 2..3, 3..4], partition(4, 12));
        assert_eq!(12, partition(120, 12).len());
        assert!(partition(120, 12).iter().all(|r| r.len() == 10));
        assert!(partition(0, 3).is_empty());
    }

    #[test]
    fn merged_weights_keep_population_order() -> LocResult<()> {
        let evaluator = evaluator(PoseEcho, 3);
        assert_eq!(3, evaluator.group_count());
        let particles = line(10);
        let real = Arc::new(PoseEcho.simulate_reading_at(&Particle::new(0.0, 0.0, 0.0))?);

        let evaluation = evaluator.evaluate(&particles, &real)?;

        assert_eq!(10, evaluation.weights.len());
        for (i, w) in evaluation.weights.iter().enumerate() {
            // One beam matches exactly, the other is i metres off
            let expected = 1.0 + (-(i as f64)).exp();
            assert!((w - expected).abs() < 1e-12, "weight {} was {}", i, w);
        }
        let best = evaluation.best.unwrap();
        assert_eq!(0, best.index);
        assert_eq!(2.0, best.score);
        Ok(())
    }

    #[test]
    fn ties_go_to_the_lowest_index() -> LocResult<()> {
        let particles = vec![
            Particle::new(1.0, 1.0, 0.0),
            Particle::new(1.0, 1.0, 0.0),
            Particle::new(5.0, 5.0, 0.0),
            Particle::new(9.0, 9.0, 0.0),
        ];
        let real = Arc::new(PoseEcho.simulate_reading_at(&particles[0])?);

        for groups in [1, 2, 4, 12] {
            let evaluation = evaluator(PoseEcho, groups).evaluate(&particles, &real)?;
            let best = evaluation.best.unwrap();
            assert_eq!(0, best.index, "with {} groups", groups);
            assert_eq!(particles[0], best.particle);
            assert_eq!(evaluation.weights[0], evaluation.weights[1]);
        }
        Ok(())
    }

    #[test]
    fn async_callers_get_an_error_instead_of_a_panic() -> LocResult<()> {
        let outer = Runtime::new()?;
        let particles = line(4);
        let real = Arc::new(PoseEcho.simulate_reading_at(&particles[0])?);
        let evaluator = evaluator(PoseEcho, 2);

        let result = outer.block_on(async move {
            let result = evaluator.evaluate(&particles, &real);
            // Dropping here must not panic either
            drop(evaluator);
            result
        });

        assert!(matches!(result, Err(LocError::InfrastructureError(_))));
        Ok(())
    }

    #[test]
    fn later_group_wins_when_strictly_better() -> LocResult<()> {
        let particles = line(6);
        let real = Arc::new(PoseEcho.simulate_reading_at(&Particle::new(4.0, 0.0, 0.0))?);
        let evaluation = evaluator(PoseEcho, 3).evaluate(&particles, &real)?;
        assert_eq!(4, evaluation.best.unwrap().index);
        Ok(())
    }

    #[test]
    fn group_error_fails_the_evaluation() -> LocResult<()> {
        let particles = line(10);
        let real = Arc::new(PoseEcho.simulate_reading_at(&particles[0])?);

        match evaluator(FailsBeyond(7.5), 3).evaluate(&particles, &real) {
            Err(LocError::EvaluationTaskFailure { group, reason }) => {
                assert_eq!(2, group);
                assert!(reason.contains("No reading"));
            }
            other => panic!("Expected task failure, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn group_panic_fails_the_evaluation() -> LocResult<()> {
        let particles = line(10);
        let real = Arc::new(PoseEcho.simulate_reading_at(&particles[0])?);

        match evaluator(PanicsBeyond(4.5), 5).evaluate(&particles, &real) {
            Err(LocError::EvaluationTaskFailure { group, .. }) => assert_eq!(2, group),
            other => panic!("Expected task failure, got {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn zero_groups_is_a_config_error() {
        assert!(matches!(
            Evaluator::new(Arc::new(PoseEcho), Scorer::default(), 0),
            Err(LocError::ConfigError(_))
        ));
    }
}
