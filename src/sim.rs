use std::{sync::Arc, time::Duration};

use rand::{rngs::SmallRng, SeedableRng};

use crate::{
    config,
    error::LocResult,
    localizer::Host,
    motion::{Clock, GaussianNoise, ManualClock, SystemClock},
    sensor::{grid::RayCaster, MapBounds},
    types::{LaserBeam, Particle, SensorReading, Velocity, WorldBounds},
};

enum Timing {
    Wall {
        clock: SystemClock,
        period: Duration,
    },
    Manual {
        clock: ManualClock,
        step: f64,
    },
}
impl Timing {
    fn now(&self) -> f64 {
        match self {
            Timing::Wall { clock, .. } => clock.now(),
            Timing::Manual { clock, .. } => clock.now(),
        }
    }
}

/// A robot driving around a grid map, standing in for real hardware.
///
/// The true pose follows the commanded velocity exactly; only the laser
/// ranges are noisy.
pub struct SimulatedRobot {
    pose: Particle,
    velocity: Velocity,
    caster: Arc<RayCaster>,
    bounds: WorldBounds,
    range_noise: GaussianNoise,
    rng: SmallRng,
    timing: Timing,
    last_tick: f64,
}
impl SimulatedRobot {
    pub fn new(caster: Arc<RayCaster>, start: Particle, range_noise: f64) -> LocResult<Self> {
        let bounds = caster.world_bounds();
        let timing = Timing::Wall {
            clock: SystemClock,
            period: Duration::ZERO,
        };
        let last_tick = timing.now();
        Ok(Self {
            pose: start,
            velocity: Velocity::default(),
            caster,
            bounds,
            range_noise: GaussianNoise::new(range_noise)?,
            rng: SmallRng::from_entropy(),
            timing,
            last_tick,
        })
    }

    pub fn from_config(
        caster: Arc<RayCaster>,
        robot: &config::Robot,
        sensor: &config::Sensor,
    ) -> LocResult<Self> {
        let [x, y, yaw] = robot.start;
        let mut sim = Self::new(caster, Particle::new(x, y, yaw), sensor.range_noise)?
            .with_period(Duration::from_millis(robot.cycle_period_ms));
        sim.set_linear_velocity(robot.linear_velocity);
        sim.set_angular_velocity(robot.angular_velocity);
        Ok(sim)
    }

    /// Sleep for `period` at the start of every cycle.
    pub fn with_period(mut self, period: Duration) -> Self {
        if let Timing::Wall { period: p, .. } = &mut self.timing {
            *p = period;
        }
        self
    }

    /// Drive time by hand: each tick moves `clock` on by `step` seconds.
    pub fn with_manual_time(mut self, clock: ManualClock, step: f64) -> Self {
        self.last_tick = clock.now();
        self.timing = Timing::Manual { clock, step };
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }

    pub fn pose(&self) -> &Particle {
        &self.pose
    }

    /// Move the true pose on by `dt` seconds.
    pub fn advance(&mut self, dt: f64) {
        if !dt.is_finite() || dt <= 0.0 {
            return;
        }
        let Velocity { linear, angular } = self.velocity;
        let mut next = Particle::new(
            self.pose.x + dt * linear * self.pose.yaw.cos(),
            self.pose.y + dt * linear * self.pose.yaw.sin(),
            self.pose.yaw + dt * angular,
        );
        next.clip_to_bounds(&self.bounds);
        self.pose = next;
    }
}

impl Host for SimulatedRobot {
    fn real_reading(&mut self) -> LocResult<SensorReading> {
        let max_range = self.caster.max_range();
        let clean = self.caster.scan(&self.pose);
        let noisy = clean
            .beams()
            .iter()
            .map(|b| {
                let range = (b.range + self.range_noise.sample(&mut self.rng)).clamp(0.0, max_range);
                LaserBeam::new(range, b.bearing)
            })
            .collect();
        Ok(noisy)
    }

    fn commanded_velocity(&self) -> Velocity {
        self.velocity
    }

    fn set_linear_velocity(&mut self, v: f64) {
        self.velocity.linear = v;
    }

    fn set_angular_velocity(&mut self, w: f64) {
        self.velocity.angular = w;
    }

    fn tick(&mut self) -> LocResult<()> {
        match &self.timing {
            Timing::Wall { period, .. } if !period.is_zero() => std::thread::sleep(*period),
            Timing::Manual { clock, step } => clock.advance(*step),
            _ => (),
        }
        let now = self.timing.now();
        self.advance(now - self.last_tick);
        self.last_tick = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::f64::consts::FRAC_PI_2;

    use super::*;
    use crate::sensor::grid::{BeamLayout, GridMap};

    fn caster() -> LocResult<Arc<RayCaster>> {
        let map = GridMap::bordered(20, 20, 0.5)?;
        let layout = BeamLayout {
            count: 3,
            field_of_view: FRAC_PI_2,
        };
        Ok(Arc::new(RayCaster::new(map, layout, 20.0)?))
    }

    #[test]
    fn manual_ticks_drive_the_true_pose() -> LocResult<()> {
        let clock = ManualClock::new(10.0);
        let mut robot = SimulatedRobot::new(caster()?, Particle::new(2.0, 2.0, 0.0), 0.0)?
            .with_manual_time(clock.clone(), 0.5);
        robot.set_linear_velocity(1.0);

        robot.tick()?;
        robot.tick()?;

        assert_eq!(11.0, clock.now());
        assert!((robot.pose().x - 3.0).abs() < 1e-12);
        assert_eq!(2.0, robot.pose().y);
        Ok(())
    }

    #[test]
    fn turning_in_place_only_changes_heading() -> LocResult<()> {
        let mut robot = SimulatedRobot::new(caster()?, Particle::new(5.0, 5.0, 0.0), 0.0)?;
        robot.set_angular_velocity(0.8);
        robot.advance(0.5);
        assert_eq!(Particle::new(5.0, 5.0, 0.4), *robot.pose());

        robot.advance(-1.0);
        assert_eq!(Particle::new(5.0, 5.0, 0.4), *robot.pose());
        Ok(())
    }

    #[test]
    fn driving_into_the_edge_stops_at_bounds() -> LocResult<()> {
        let mut robot = SimulatedRobot::new(caster()?, Particle::new(9.0, 5.0, 0.0), 0.0)?;
        robot.set_linear_velocity(1.0);
        robot.advance(5.0);
        assert_eq!(10.0, robot.pose().x);
        Ok(())
    }

    #[test]
    fn noiseless_reading_matches_the_map() -> LocResult<()> {
        let caster = caster()?;
        let pose = Particle::new(5.0, 5.0, 0.0);
        let mut robot = SimulatedRobot::new(caster.clone(), pose, 0.0)?;
        assert_eq!(caster.scan(&pose), robot.real_reading()?);
        Ok(())
    }

    #[test]
    fn noisy_ranges_stay_within_limits() -> LocResult<()> {
        let caster = caster()?;
        let mut robot = SimulatedRobot::new(caster.clone(), Particle::new(5.0, 5.0, 0.0), 2.0)?
            .with_seed(9);
        let reading = robot.real_reading()?;
        assert_eq!(3, reading.len());
        assert!(reading
            .beams()
            .iter()
            .all(|b| (0.0..=caster.max_range()).contains(&b.range)));
        Ok(())
    }
}
