use std::path::Path;

use crate::{
    config,
    error::{LocError, LocResult},
    types::{LaserBeam, Particle, SensorReading, WorldBounds},
};

use super::{MapBounds, SensorModel};

/// Occupancy grid. Row 0 is the bottom of the map (lowest y).
#[derive(Debug, Clone, PartialEq)]
pub struct GridMap {
    cols: usize,
    rows: usize,
    resolution: f64,
    origin: [f64; 2],
    occupied: Vec<bool>,
}
impl GridMap {
    pub fn empty(cols: usize, rows: usize, resolution: f64) -> LocResult<Self> {
        if cols == 0 || rows == 0 {
            return Err(LocError::MapError("Map must have at least one cell".into()));
        }
        if !resolution.is_finite() || resolution <= 0.0 {
            return Err(LocError::MapError(format!(
                "Map resolution must be positive, got {}",
                resolution
            )));
        }
        Ok(Self {
            cols,
            rows,
            resolution,
            origin: [0.0, 0.0],
            occupied: vec![false; cols * rows],
        })
    }

    /// A room whose outermost ring of cells is wall.
    pub fn bordered(cols: usize, rows: usize, resolution: f64) -> LocResult<Self> {
        let mut map = Self::empty(cols, rows, resolution)?;
        map.fill_rect(0, 0, cols - 1, 0);
        map.fill_rect(0, rows - 1, cols - 1, rows - 1);
        map.fill_rect(0, 0, 0, rows - 1);
        map.fill_rect(cols - 1, 0, cols - 1, rows - 1);
        Ok(map)
    }

    /// Parse a map drawn with `#` for walls and `.` (or space) for free cells.
    /// The first line of text is the top row of the map.
    pub fn from_ascii(text: &str, resolution: f64, origin: [f64; 2]) -> LocResult<Self> {
        let lines: Vec<&str> = text
            .lines()
            .map(|l| l.trim_end_matches('\r'))
            .filter(|l| !l.is_empty())
            .collect();
        let rows = lines.len();
        let cols = lines.first().map(|l| l.chars().count()).unwrap_or(0);

        let mut map = Self::empty(cols, rows, resolution)?;
        map.origin = origin;

        for (line_no, line) in lines.iter().enumerate() {
            if line.chars().count() != cols {
                return Err(LocError::MapError(format!(
                    "Map line {} has {} cells, expected {}",
                    line_no + 1,
                    line.chars().count(),
                    cols
                )));
            }
            let row = rows - 1 - line_no;
            for (col, c) in line.chars().enumerate() {
                match c {
                    '#' => map.occupied[row * cols + col] = true,
                    '.' | ' ' => (),
                    other => {
                        return Err(LocError::MapError(format!(
                            "Unexpected character {:?} on map line {}",
                            other,
                            line_no + 1
                        )))
                    }
                }
            }
        }

        Ok(map)
    }

    pub fn load<P: AsRef<Path>>(path: P, resolution: f64, origin: [f64; 2]) -> LocResult<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            LocError::MapError(format!("Failed to read map {:?}: {}", path.as_ref(), e))
        })?;
        let map = Self::from_ascii(&text, resolution, origin)?;
        log::info!(
            "Loaded {}x{} map from {:?} at {}m per cell",
            map.cols,
            map.rows,
            path.as_ref(),
            resolution
        );
        Ok(map)
    }

    /// The configured map file, or a plain bordered room when none is given.
    pub fn from_config(config: &config::Map) -> LocResult<Self> {
        match &config.path {
            Some(path) => Self::load(path, config.resolution, config.origin),
            None => {
                let mut map = Self::bordered(config.size[0], config.size[1], config.resolution)?;
                map.origin = config.origin;
                Ok(map)
            }
        }
    }

    /// Mark every cell in the inclusive column/row rectangle as occupied.
    /// Cells outside the grid are ignored.
    pub fn fill_rect(&mut self, col0: usize, row0: usize, col1: usize, row1: usize) {
        for row in row0..=row1.min(self.rows - 1) {
            for col in col0..=col1.min(self.cols - 1) {
                self.occupied[row * self.cols + col] = true;
            }
        }
    }

    pub fn resolution(&self) -> f64 {
        self.resolution
    }

    pub fn cell_at(&self, x: f64, y: f64) -> Option<(usize, usize)> {
        let col = ((x - self.origin[0]) / self.resolution).floor();
        let row = ((y - self.origin[1]) / self.resolution).floor();
        if col < 0.0 || row < 0.0 || col >= self.cols as f64 || row >= self.rows as f64 {
            None
        } else {
            Some((col as usize, row as usize))
        }
    }

    /// Anything off the map counts as a wall.
    pub fn is_occupied(&self, x: f64, y: f64) -> bool {
        match self.cell_at(x, y) {
            Some((col, row)) => self.occupied[row * self.cols + col],
            None => true,
        }
    }
}

impl MapBounds for GridMap {
    fn world_bounds(&self) -> WorldBounds {
        WorldBounds {
            x_low: self.origin[0],
            x_high: self.origin[0] + self.cols as f64 * self.resolution,
            y_low: self.origin[1],
            y_high: self.origin[1] + self.rows as f64 * self.resolution,
        }
    }

    fn scale(&self) -> f64 {
        1.0 / self.resolution
    }
}

/// Bearings of a scan, spread evenly and centred on the robot heading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeamLayout {
    pub count: usize,
    pub field_of_view: f64,
}
impl BeamLayout {
    pub fn bearing(&self, i: usize) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            -self.field_of_view / 2.0 + i as f64 * self.field_of_view / (self.count - 1) as f64
        }
    }
}

/// Simulated laser: marches each beam through the grid until it hits a wall.
#[derive(Debug, Clone)]
pub struct RayCaster {
    map: GridMap,
    layout: BeamLayout,
    max_range: f64,
    max_steps: usize,
}
impl RayCaster {
    pub fn new(map: GridMap, layout: BeamLayout, max_range: f64) -> LocResult<Self> {
        if !max_range.is_finite() || max_range <= 0.0 {
            return Err(LocError::ConfigError(format!(
                "Maximum laser range must be positive, got {}",
                max_range
            )));
        }
        // Half-cell steps over the range expressed in cells
        let max_steps = (max_range * map.scale() * 2.0).ceil() as usize;
        Ok(Self {
            map,
            layout,
            max_range,
            max_steps,
        })
    }

    pub fn from_config(map: GridMap, config: &config::Sensor) -> LocResult<Self> {
        let layout = BeamLayout {
            count: config.beam_count,
            field_of_view: config.field_of_view,
        };
        Self::new(map, layout, config.max_range)
    }

    pub fn max_range(&self) -> f64 {
        self.max_range
    }

    pub fn cast(&self, pose: &Particle, bearing: f64) -> f64 {
        let angle = pose.yaw + bearing;
        let (sin, cos) = angle.sin_cos();
        let step = self.map.resolution() / 2.0;

        for i in 1..=self.max_steps {
            let t = i as f64 * step;
            if t > self.max_range {
                break;
            }
            if self.map.is_occupied(pose.x + t * cos, pose.y + t * sin) {
                return t;
            }
        }
        self.max_range
    }

    pub fn scan(&self, pose: &Particle) -> SensorReading {
        (0..self.layout.count)
            .map(|i| {
                let bearing = self.layout.bearing(i);
                LaserBeam::new(self.cast(pose, bearing), bearing)
            })
            .collect()
    }
}

impl SensorModel for RayCaster {
    fn simulate_reading_at(&self, pose: &Particle) -> LocResult<SensorReading> {
        Ok(self.scan(pose))
    }
}

impl MapBounds for RayCaster {
    fn world_bounds(&self) -> WorldBounds {
        self.map.world_bounds()
    }

    fn scale(&self) -> f64 {
        self.map.scale()
    }
}
