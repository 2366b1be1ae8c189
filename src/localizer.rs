use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use rand::{rngs::SmallRng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::{
    config::Config,
    error::{LocError, LocResult},
    evaluation::{Evaluator, ScoredParticle},
    kernel::gaussian::GaussianKernel,
    motion::{Clock, MotionModel, SystemClock},
    resample,
    sensor::{Scorer, SensorModel},
    sink::{Stage, VisualizationSink},
    tracker::{Phase, Tracker},
    types::{BestEstimate, Population, SensorReading, Velocity, WorldBounds},
};

/// The robot side of the loop: real laser plus the drive commands.
pub trait Host {
    fn real_reading(&mut self) -> LocResult<SensorReading>;

    fn commanded_velocity(&self) -> Velocity;
    fn set_linear_velocity(&mut self, v: f64);
    fn set_angular_velocity(&mut self, w: f64);

    /// Called before each cycle. Pacing the loop is up to the host.
    fn tick(&mut self) -> LocResult<()> {
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct CycleReport {
    pub cycle: u64,
    pub phase: Phase,
    pub dt: f64,
    pub motion_skipped: bool,
    pub discarded: usize,
    pub cycle_best: Option<ScoredParticle>,
    pub best: Option<BestEstimate>,
    pub spread: (f64, f64),
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy)]
pub enum StopReason {
    Shutdown,
    CycleLimit,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct RunSummary {
    pub cycles: u64,
    pub best: Option<BestEstimate>,
    pub stopped_by: StopReason,
}

pub struct Localizer<S: SensorModel> {
    num_particles: usize,
    elite_fraction: f64,
    population: Population,
    last_evaluated: Option<Population>,
    motion: MotionModel,
    evaluator: Evaluator<S>,
    kernel: GaussianKernel,
    tracker: Tracker,
    rng: SmallRng,
    clock: Box<dyn Clock>,
    last_update: f64,
    cycle: u64,
}
impl<S: SensorModel> Localizer<S> {
    pub fn new(config: &Config, sensor: Arc<S>, bounds: WorldBounds) -> LocResult<Self> {
        config.validate()?;
        bounds.validate()?;

        let mut rng = match config.filter.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        let population = Population::initialize(config.filter.num_particles, &bounds, &mut rng)?;
        let scorer = Scorer::new(config.sensor.stride)?;
        let clock: Box<dyn Clock> = Box::new(SystemClock);
        let last_update = clock.now();

        log::info!(
            "Localizing with {} particles in {} groups over {:?}",
            config.filter.num_particles,
            config.filter.group_count,
            bounds
        );

        Ok(Self {
            num_particles: config.filter.num_particles,
            elite_fraction: config.resample.elite_fraction,
            population,
            last_evaluated: None,
            motion: MotionModel::from_config(bounds, &config.motion)?,
            evaluator: Evaluator::new(sensor, scorer, config.filter.group_count)?,
            kernel: GaussianKernel::from_config(&config.resample)?,
            tracker: Tracker::new(config.filter.warmup_cycles),
            rng,
            clock,
            last_update,
            cycle: 0,
        })
    }

    /// Measure elapsed time with `clock` from now on.
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.last_update = clock.now();
        self.clock = Box::new(clock);
        self
    }

    /// Start from explicit poses instead of a uniform spread.
    pub fn with_population(mut self, population: Population) -> LocResult<Self> {
        if population.len() != self.num_particles {
            return Err(LocError::ConfigError(format!(
                "Population has {} particles but {} are configured",
                population.len(),
                self.num_particles
            )));
        }
        self.population = population;
        Ok(self)
    }

    pub fn population(&self) -> &Population {
        &self.population
    }

    /// Particles and normalised weights from the most recent evaluation.
    pub fn last_evaluated(&self) -> Option<&Population> {
        self.last_evaluated.as_ref()
    }

    pub fn best(&self) -> Option<&BestEstimate> {
        self.tracker.best()
    }

    pub fn phase(&self) -> Phase {
        self.tracker.phase()
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    fn abort(&self, source: LocError) -> LocError {
        log::error!(
            "Cycle {} aborted with best estimate {:?}: {}",
            self.cycle,
            self.tracker.best(),
            source
        );
        LocError::CycleAborted {
            cycle: self.cycle,
            best: self.tracker.best().copied(),
            source: Box::new(source),
        }
    }

    /// Run one predict, weigh, resample cycle.
    ///
    /// On error nothing is committed: the population, clock reference and
    /// cycle count are as they were after the previous cycle.
    pub fn step(
        &mut self,
        velocity: Velocity,
        real: SensorReading,
        sink: &dyn VisualizationSink,
    ) -> LocResult<CycleReport> {
        self.try_step(velocity, real, sink).map_err(|e| self.abort(e))
    }

    fn try_step(
        &mut self,
        velocity: Velocity,
        real: SensorReading,
        sink: &dyn VisualizationSink,
    ) -> LocResult<CycleReport> {
        let cycle = self.cycle;
        let now = self.clock.now();
        let dt = now - self.last_update;

        // Prediction
        let mut working = self.population.clone();
        let motion_skipped =
            match self
                .motion
                .propagate_all(working.particles_mut(), dt, velocity, &mut self.rng)
            {
                Ok(()) => false,
                Err(e) if !e.is_fatal() => {
                    log::warn!("Cycle {}: {}, skipping motion update", cycle, e);
                    true
                }
                Err(e) => return Err(e),
            };
        sink.show_particles(cycle, Stage::Propagated, working.particles());
        sink.show_laser(cycle, &real);

        // Weighing
        let real = Arc::new(real);
        let evaluation = self.evaluator.evaluate(working.particles(), &real)?;
        let normalized = resample::normalize(&evaluation.weights)?;
        working.set_weights(normalized)?;

        // Resampling
        let (particles, weights) = match working.weights() {
            Some(weights) => (working.particles(), weights),
            None => {
                return Err(LocError::InfrastructureError(
                    "Evaluated population lost its weights".into(),
                ))
            }
        };
        let min_prob = self.tracker.min_prob(self.num_particles);
        let (kept, discarded) = resample::select_survivors(particles, weights, min_prob);
        let elite = resample::select_elite(particles, weights, self.elite_fraction);
        let mut regenerated = resample::regenerate(&elite, discarded, &self.kernel, &mut self.rng)?;
        regenerated
            .iter_mut()
            .for_each(|p| p.clip_to_bounds(self.motion.bounds()));
        let next = resample::next_population(kept, regenerated, self.num_particles)?;
        sink.show_particles(cycle, Stage::Resampled, &next);

        // Commit
        if let Some(best) = evaluation.best {
            self.tracker.offer(best.particle, best.score);
        }
        self.population.replace(next)?;
        self.last_evaluated = Some(working);
        self.last_update = now;
        let phase = self.tracker.phase();
        self.tracker.complete_cycle();
        self.cycle += 1;

        let report = CycleReport {
            cycle,
            phase,
            dt,
            motion_skipped,
            discarded,
            cycle_best: evaluation.best,
            best: self.tracker.best().copied(),
            spread: self.population.spread(),
        };
        log::debug!("{:?}", report);
        Ok(report)
    }

    /// Drive cycles from `host` until `shutdown` is raised, `max_cycles`
    /// have run, or a cycle fails.
    ///
    /// Shutdown is checked between cycles only, so an evaluation that has
    /// started always runs to completion.
    pub fn run<H: Host>(
        &mut self,
        host: &mut H,
        sink: &dyn VisualizationSink,
        shutdown: &AtomicBool,
        max_cycles: Option<u64>,
    ) -> LocResult<RunSummary> {
        let mut cycles = 0;
        let stopped_by = loop {
            if shutdown.load(Ordering::SeqCst) {
                log::info!("Shutdown requested after {} cycles", cycles);
                break StopReason::Shutdown;
            }
            if max_cycles.map_or(false, |max| cycles >= max) {
                break StopReason::CycleLimit;
            }

            host.tick().map_err(|e| self.abort(e))?;
            let real = host.real_reading().map_err(|e| self.abort(e))?;
            let report = self.step(host.commanded_velocity(), real, sink)?;

            if let Some(best) = report.best {
                log::info!(
                    "Cycle {} ({:?}): estimate {} score {:.3}, spread ({:.3}, {:.3})",
                    report.cycle,
                    report.phase,
                    best.particle,
                    best.score,
                    report.spread.0,
                    report.spread.1
                );
            }
            cycles += 1;
        };

        Ok(RunSummary {
            cycles,
            best: self.tracker.best().copied(),
            stopped_by,
        })
    }
}
