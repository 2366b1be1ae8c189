use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::{
    runtime::Handle,
    sync::mpsc::{unbounded_channel, UnboundedSender},
    task::JoinHandle,
};
use uuid::Uuid;

use crate::{
    error::{LocError, LocResult},
    types::{Particle, SensorReading},
};

use super::{Stage, VisualizationSink};

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(tag = "kind")]
pub enum Snapshot {
    Particles {
        cycle: u64,
        stage: Stage,
        particles: Vec<Particle>,
    },
    Laser {
        cycle: u64,
        reading: SensorReading,
    },
}
impl Snapshot {
    pub fn file_name(&self) -> String {
        match self {
            Snapshot::Particles { cycle, stage, .. } => format!("cycle_{:05}_{}.json", cycle, stage),
            Snapshot::Laser { cycle, .. } => format!("cycle_{:05}_laser.json", cycle),
        }
    }
}

/// Writes every push as a JSON file under `<base_path>/<run uuid>/`.
///
/// Files are written by a task on the given runtime; the control loop only
/// enqueues.
pub struct SnapshotWriter {
    run_dir: PathBuf,
    tx: UnboundedSender<Snapshot>,
    writer: JoinHandle<()>,
}
impl SnapshotWriter {
    pub fn new(base_path: PathBuf, handle: Handle) -> LocResult<Self> {
        let run_dir = base_path.join(Uuid::new_v4().to_string());
        std::fs::create_dir_all(&run_dir)?;
        log::info!("Writing snapshots to {:?}", run_dir);

        let (tx, mut rx) = unbounded_channel::<Snapshot>();
        let dir = run_dir.clone();
        let writer = handle.spawn(async move {
            while let Some(snapshot) = rx.recv().await {
                let file_path = dir.join(snapshot.file_name());
                let pretty_json = match serde_json::to_string_pretty(&snapshot) {
                    Ok(json) => json,
                    Err(e) => {
                        log::warn!("Failed to serialise {:?}: {}", file_path, e);
                        continue;
                    }
                };
                if let Err(e) = tokio::fs::write(&file_path, pretty_json).await {
                    log::warn!("Failed to write {:?}: {}", file_path, e);
                }
            }
        });

        Ok(Self {
            run_dir,
            tx,
            writer,
        })
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Stop accepting snapshots and wait for the queue to drain.
    pub async fn finish(self) -> LocResult<()> {
        drop(self.tx);
        self.writer
            .await
            .map_err(|e| LocError::InfrastructureError(format!("Snapshot writer failed: {}", e)))
    }

    fn push(&self, snapshot: Snapshot) {
        if self.tx.send(snapshot).is_err() {
            log::warn!("Snapshot writer has stopped, dropping snapshot");
        }
    }
}

impl VisualizationSink for SnapshotWriter {
    fn show_particles(&self, cycle: u64, stage: Stage, particles: &[Particle]) {
        self.push(Snapshot::Particles {
            cycle,
            stage,
            particles: particles.to_vec(),
        });
    }

    fn show_laser(&self, cycle: u64, reading: &SensorReading) {
        self.push(Snapshot::Laser {
            cycle,
            reading: reading.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use std::{fs::File, io::BufReader};

    use tokio::runtime::Runtime;

    use super::*;
    use crate::types::LaserBeam;

    fn load(path: PathBuf) -> Snapshot {
        let file = File::open(&path).unwrap_or_else(|e| panic!("Missing {:?}: {}", path, e));
        serde_json::from_reader(BufReader::new(file)).unwrap()
    }

    #[test]
    fn snapshots_are_written_per_cycle() -> LocResult<()> {
        let tmp_dir = tempfile::tempdir()?;
        let runtime = Runtime::new()?;
        let writer = SnapshotWriter::new(tmp_dir.path().to_path_buf(), runtime.handle().clone())?;
        let run_dir = writer.run_dir().to_path_buf();
        assert!(run_dir.starts_with(tmp_dir.path()));

        let particles = vec![Particle::new(1.0, 2.0, 0.5), Particle::new(3.0, 4.0, 1.5)];
        let reading = SensorReading::new(vec![LaserBeam::new(1.5, 0.0)]);

        writer.show_particles(3, Stage::Propagated, &particles);
        writer.show_laser(3, &reading);
        writer.show_particles(3, Stage::Resampled, &particles[..1]);
        runtime.block_on(writer.finish())?;

        assert_eq!(
            Snapshot::Particles {
                cycle: 3,
                stage: Stage::Propagated,
                particles: particles.clone(),
            },
            load(run_dir.join("cycle_00003_propagated.json"))
        );
        assert_eq!(
            Snapshot::Laser { cycle: 3, reading },
            load(run_dir.join("cycle_00003_laser.json"))
        );
        match load(run_dir.join("cycle_00003_resampled.json")) {
            Snapshot::Particles { particles: p, .. } => assert_eq!(1, p.len()),
            other => panic!("Unexpected snapshot {:?}", other),
        }
        Ok(())
    }

    #[test]
    fn each_run_gets_its_own_directory() -> LocResult<()> {
        let tmp_dir = tempfile::tempdir()?;
        let runtime = Runtime::new()?;
        let a = SnapshotWriter::new(tmp_dir.path().to_path_buf(), runtime.handle().clone())?;
        let b = SnapshotWriter::new(tmp_dir.path().to_path_buf(), runtime.handle().clone())?;
        assert_ne!(a.run_dir(), b.run_dir());
        runtime.block_on(async {
            a.finish().await?;
            b.finish().await
        })
    }
}
