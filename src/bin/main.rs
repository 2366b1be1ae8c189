use std::{
    path::PathBuf,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use clap::Parser;
use lasermcl::{
    config::SinkConfig,
    sensor::{
        grid::{GridMap, RayCaster},
        MapBounds,
    },
    sim::SimulatedRobot,
    sink::{filesystem::SnapshotWriter, LogSink, NullSink},
    Config, LocError, LocResult, Localizer,
};
use path_absolutize::Absolutize;
use tokio::runtime::Runtime;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML config
    #[clap(short, long, default_value = "config.toml")]
    config: PathBuf,
    /// Stop after this many cycles instead of waiting for Ctrl-C
    #[clap(short = 'n', long)]
    cycles: Option<u64>,
    /// Overrides filter.seed from the config
    #[clap(short, long)]
    seed: Option<u64>,
}

/// Localize a simulated robot driving around the configured map.
///
/// ```
/// export RUST_LOG=error,lasermcl=info
/// cargo run --release -- --config config.toml --cycles 200
/// ```
fn main() -> LocResult<()> {
    env_logger::init();

    let args = Args::parse();
    let config_path = args.config.absolutize()?.to_path_buf();
    let mut config = Config::from_path(&config_path)?;
    if args.seed.is_some() {
        config.filter.seed = args.seed;
    }

    let map = GridMap::from_config(&config.map)?;
    let caster = Arc::new(RayCaster::from_config(map, &config.sensor)?);
    let bounds = caster.world_bounds();

    let mut robot = SimulatedRobot::from_config(caster.clone(), &config.robot, &config.sensor)?;
    if let Some(seed) = config.filter.seed {
        robot = robot.with_seed(seed.wrapping_add(1));
    }
    let mut localizer = Localizer::new(&config, caster, bounds)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            log::info!("Interrupted, stopping after the current cycle");
            shutdown.store(true, Ordering::SeqCst);
        })
        .map_err(|e| LocError::InfrastructureError(format!("Ctrl-C handler: {}", e)))?;
    }

    let summary = match &config.sink {
        SinkConfig::FileSystem { .. } => {
            let runtime = Runtime::new()?;
            let base_path = config
                .sink
                .expanded_base_path()
                .ok_or_else(|| LocError::ConfigError("Missing snapshot base path".into()))?;
            let writer = SnapshotWriter::new(base_path, runtime.handle().clone())?;
            let summary = localizer.run(&mut robot, &writer, &shutdown, args.cycles);
            runtime.block_on(writer.finish())?;
            summary?
        }
        SinkConfig::Log => localizer.run(&mut robot, &LogSink, &shutdown, args.cycles)?,
        SinkConfig::Null => localizer.run(&mut robot, &NullSink, &shutdown, args.cycles)?,
    };

    println!("Ran {} cycles ({:?})", summary.cycles, summary.stopped_by);
    match summary.best {
        Some(best) => println!(
            "Best estimate {} with score {:.3}, true pose {}",
            best.particle,
            best.score,
            robot.pose()
        ),
        None => println!("No estimate, true pose {}", robot.pose()),
    }

    Ok(())
}
