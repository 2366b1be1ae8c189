use std::fmt::Debug;
use std::path::{Path, PathBuf};

use envmnt::{ExpandOptions, ExpansionType};

use crate::error::{LocError, LocResult};

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone)]
#[serde(default)]
pub struct Filter {
    pub num_particles: usize,
    pub group_count: usize,
    pub warmup_cycles: u64,
    pub seed: Option<u64>,
}
impl Default for Filter {
    fn default() -> Self {
        Self {
            num_particles: 120,
            group_count: 12,
            warmup_cycles: 3,
            seed: None,
        }
    }
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone)]
#[serde(default)]
pub struct Motion {
    pub position_noise: f64,
    pub heading_noise: f64,
}
impl Default for Motion {
    fn default() -> Self {
        Self {
            position_noise: 0.02,
            heading_noise: 0.01,
        }
    }
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone)]
#[serde(default)]
pub struct Sensor {
    pub stride: usize,
    pub beam_count: usize,
    pub field_of_view: f64,
    pub max_range: f64,
    pub range_noise: f64,
}
impl Default for Sensor {
    fn default() -> Self {
        Self {
            stride: 15,
            beam_count: 180,
            field_of_view: std::f64::consts::PI,
            max_range: 100.0,
            range_noise: 0.0,
        }
    }
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone)]
#[serde(default)]
pub struct Resample {
    pub elite_fraction: f64,
    pub position_covariance: [[f64; 2]; 2],
    pub heading_noise: f64,
}
impl Default for Resample {
    fn default() -> Self {
        Self {
            elite_fraction: 0.045,
            position_covariance: [[0.05, 0.0], [0.0, 0.05]],
            heading_noise: 0.01,
        }
    }
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone)]
#[serde(default)]
pub struct Map {
    pub path: Option<PathBuf>,
    pub resolution: f64,
    pub origin: [f64; 2],
    /// Size in cells of the bordered room used when no map file is given
    pub size: [usize; 2],
}
impl Default for Map {
    fn default() -> Self {
        Self {
            path: None,
            resolution: 0.1,
            origin: [0.0, 0.0],
            size: [100, 100],
        }
    }
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone)]
#[serde(default)]
pub struct Robot {
    pub start: [f64; 3],
    pub linear_velocity: f64,
    pub angular_velocity: f64,
    pub cycle_period_ms: u64,
}
impl Default for Robot {
    fn default() -> Self {
        Self {
            start: [1.1, 1.0, 0.0],
            linear_velocity: 0.5,
            angular_velocity: 0.8,
            cycle_period_ms: 100,
        }
    }
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, PartialEq, Default)]
#[serde(tag = "type")]
pub enum SinkConfig {
    #[default]
    Null,
    Log,
    FileSystem { base_path: String },
}
impl SinkConfig {
    /// Snapshot directory with `${VAR}` references expanded from the environment.
    pub fn expanded_base_path(&self) -> Option<PathBuf> {
        match self {
            SinkConfig::FileSystem { base_path } => {
                let mut options = ExpandOptions::new();
                options.expansion_type = Some(ExpansionType::Unix);
                Some(PathBuf::from(envmnt::expand(base_path, Some(options))))
            }
            _ => None,
        }
    }
}

#[derive(serde::Deserialize, serde::Serialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub filter: Filter,
    pub motion: Motion,
    pub sensor: Sensor,
    pub resample: Resample,
    pub map: Map,
    pub robot: Robot,
    pub sink: SinkConfig,
}
impl Config {
    pub fn from_path<P>(config_path: P) -> LocResult<Self>
    where
        P: AsRef<Path> + Debug,
    {
        let str = std::fs::read_to_string(config_path.as_ref()).map_err(|e| {
            LocError::ConfigError(format!("Failed to load config from {:?}: {}", config_path, e))
        })?;
        let mut config: Config = toml::from_str(&str)?;
        config.validate()?;

        // Relative map paths are relative to the config file
        if let Some(map_path) = config.map.path.as_mut() {
            if map_path.is_relative() {
                if let Some(dir) = config_path.as_ref().parent() {
                    *map_path = dir.join(&*map_path);
                }
            }
        }
        log::info!("Loading config: {:#?}", config);
        Ok(config)
    }

    pub fn validate(&self) -> LocResult<()> {
        fn check(ok: bool, msg: &str) -> LocResult<()> {
            if ok {
                Ok(())
            } else {
                Err(LocError::ConfigError(msg.into()))
            }
        }
        fn non_negative(v: f64) -> bool {
            v.is_finite() && v >= 0.0
        }

        check(self.filter.num_particles > 0, "filter.num_particles must be positive")?;
        check(self.filter.group_count > 0, "filter.group_count must be positive")?;
        check(
            non_negative(self.motion.position_noise) && non_negative(self.motion.heading_noise),
            "motion noise must be finite and non-negative",
        )?;
        check(self.sensor.stride > 0, "sensor.stride must be positive")?;
        check(self.sensor.beam_count > 0, "sensor.beam_count must be positive")?;
        check(
            self.sensor.max_range.is_finite() && self.sensor.max_range > 0.0,
            "sensor.max_range must be positive",
        )?;
        check(
            non_negative(self.sensor.field_of_view) && non_negative(self.sensor.range_noise),
            "sensor.field_of_view and sensor.range_noise must be non-negative",
        )?;
        check(
            self.resample.elite_fraction > 0.0 && self.resample.elite_fraction <= 1.0,
            "resample.elite_fraction must be in (0, 1]",
        )?;
        check(
            non_negative(self.resample.heading_noise),
            "resample.heading_noise must be non-negative",
        )?;
        check(
            self.map.resolution.is_finite() && self.map.resolution > 0.0,
            "map.resolution must be positive",
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_test_file_path(p: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join(p)
    }

    #[test]
    fn load_config_from_file() -> LocResult<()> {
        let config = Config::from_path(local_test_file_path("resources/test/config_test.toml"))?;

        assert_eq!(40, config.filter.num_particles);
        assert_eq!(4, config.filter.group_count);
        assert_eq!(Some(42), config.filter.seed);
        assert_eq!(5, config.sensor.stride);
        assert_eq!([[0.02, 0.0], [0.0, 0.03]], config.resample.position_covariance);
        assert_eq!(SinkConfig::Log, config.sink);
        // Sections missing from the file fall back to defaults
        assert_eq!(0.02, config.motion.position_noise);
        Ok(())
    }

    #[test]
    fn map_path_is_relative_to_the_config_file() -> LocResult<()> {
        let config = Config::from_path(local_test_file_path("resources/test/config_test.toml"))?;
        let map_path = config.map.path.unwrap();
        assert!(map_path.starts_with(local_test_file_path("resources/test")));
        assert!(map_path.is_file(), "{:?} should exist", map_path);

        let tmp_dir = tempfile::tempdir()?;
        std::fs::write(tmp_dir.path().join("tiny.txt"), "###\n#.#\n###\n")?;
        std::fs::write(
            tmp_dir.path().join("config.toml"),
            "[map]\npath = \"tiny.txt\"\nresolution = 1.0\n",
        )?;
        let config = Config::from_path(tmp_dir.path().join("config.toml"))?;
        let map = crate::sensor::grid::GridMap::from_config(&config.map)?;
        assert!(!map.is_occupied(1.5, 1.5));
        assert!(map.is_occupied(0.5, 0.5));

        // Absolute paths are left alone
        let absolute = local_test_file_path("resources/maps/room.txt");
        std::fs::write(
            tmp_dir.path().join("absolute.toml"),
            format!("[map]\npath = {:?}\n", absolute),
        )?;
        let config = Config::from_path(tmp_dir.path().join("absolute.toml"))?;
        assert_eq!(Some(absolute), config.map.path);
        Ok(())
    }

    #[test]
    fn empty_config_uses_defaults() -> LocResult<()> {
        let config: Config = toml::from_str("")?;
        config.validate()?;

        assert_eq!(120, config.filter.num_particles);
        assert_eq!(12, config.filter.group_count);
        assert_eq!(3, config.filter.warmup_cycles);
        assert_eq!([1.1, 1.0, 0.0], config.robot.start);
        assert_eq!(15, config.sensor.stride);
        assert_eq!(0.045, config.resample.elite_fraction);
        assert_eq!(SinkConfig::Null, config.sink);
        Ok(())
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut config = Config::default();
        config.filter.num_particles = 0;
        assert!(matches!(config.validate(), Err(LocError::ConfigError(_))));

        let mut config = Config::default();
        config.sensor.stride = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.resample.elite_fraction = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.motion.heading_noise = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_file_is_a_config_error() {
        match Config::from_path("does/not/exist.toml") {
            Err(LocError::ConfigError(msg)) => assert!(msg.contains("does/not/exist.toml")),
            other => panic!("Expected config error, got {:?}", other),
        }
    }

    #[test]
    fn sink_path_expands_env_var() -> LocResult<()> {
        envmnt::set("LASERMCL_TEST_OUT", "/tmp/lasermcl-out");

        let config: Config = toml::from_str(
            r#"
            [sink]
            type = "FileSystem"
            base_path = "${LASERMCL_TEST_OUT}/runs"
            "#,
        )?;

        assert_eq!(
            Some(PathBuf::from("/tmp/lasermcl-out/runs")),
            config.sink.expanded_base_path()
        );
        Ok(())
    }
}
