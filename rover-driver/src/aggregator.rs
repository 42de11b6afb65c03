//! Groups scan points into directional sectors.
//!
//! Angles are measured in the rover frame: 0 degree is straight ahead and
//! angles grow clockwise, as on the LD19.

use crate::error::ConfigError;
use crate::margin::ScanDynamics;
use crate::numeric::normalize_degree;
use rover_data::{ScanFrame, SectorMap, SectorRole};
use serde::{Deserialize, Serialize};

// Upper bound of frames buffered for one revolution, in case the sweep never closes.
const MAX_REVOLUTION_FRAMES: usize = 128;

/// How many frames a decision is based on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AggregationWindow {
    /// Decide on every frame. Lowest latency, but a frame only sweeps a few
    /// degrees; cycles that do not sweep the front hold the previous command.
    LatestFrame,
    /// Accumulate frames until a full sweep has been covered.
    #[default]
    Revolution,
}

/// Angular range `[start_deg, end_deg)` of one sector, clockwise. May wrap past 360.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SectorBounds {
    pub role: SectorRole,
    pub start_deg: f64,
    pub end_deg: f64,
}

impl SectorBounds {
    pub fn new(role: SectorRole, start_deg: f64, end_deg: f64) -> SectorBounds {
        SectorBounds {
            role,
            start_deg,
            end_deg,
        }
    }

    fn span(&self) -> f64 {
        normalize_degree(self.end_deg - self.start_deg)
    }

    fn contains(&self, angle: f64) -> bool {
        normalize_degree(angle - self.start_deg) < self.span()
    }

    /// Whether a sweep of `span` degrees clockwise from `start` enters this sector.
    fn overlaps(&self, start: f64, span: f64) -> bool {
        normalize_degree(self.start_deg - start) < span
            || normalize_degree(start - self.start_deg) < self.span()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SectorConfig {
    pub sectors: Vec<SectorBounds>,
    /// Returns at or below this intensity are unreliable and ignored.
    pub noise_floor: u8,
    /// Added to device angles to obtain rover angles. The default of 0 assumes
    /// the LiDAR's 0 degree faces forward; an LD19 mounted sideways needs 90.
    pub mount_offset_deg: f64,
}

impl Default for SectorConfig {
    fn default() -> Self {
        SectorConfig {
            sectors: vec![
                SectorBounds::new(SectorRole::Front, 330., 30.),
                SectorBounds::new(SectorRole::FrontRight, 30., 60.),
                SectorBounds::new(SectorRole::Right, 60., 150.),
                SectorBounds::new(SectorRole::Rear, 150., 210.),
                SectorBounds::new(SectorRole::Left, 210., 300.),
                SectorBounds::new(SectorRole::FrontLeft, 300., 330.),
            ],
            noise_floor: 20,
            mount_offset_deg: 0.,
        }
    }
}

impl SectorConfig {
    /// Checks that every role appears once and that the sectors tile the full circle.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for role in SectorRole::ALL {
            let n = self.sectors.iter().filter(|s| s.role == role).count();
            if n != 1 {
                return Err(ConfigError::InvalidSectors(format!(
                    "{:?} is configured {} times",
                    role, n
                )));
            }
        }
        for s in &self.sectors {
            let in_range = |v: f64| v.is_finite() && (0. ..360.).contains(&v);
            if !in_range(s.start_deg) || !in_range(s.end_deg) {
                return Err(ConfigError::InvalidSectors(format!(
                    "{:?} bounds must lie in [0, 360)",
                    s.role
                )));
            }
            if s.span() == 0. {
                return Err(ConfigError::InvalidSectors(format!("{:?} is empty", s.role)));
            }
        }

        let mut sorted = self.sectors.iter().collect::<Vec<_>>();
        sorted.sort_by(|a, b| a.start_deg.total_cmp(&b.start_deg));
        for (i, s) in sorted.iter().enumerate() {
            let next = sorted[(i + 1) % sorted.len()];
            if (s.end_deg - next.start_deg).abs() > 1e-9 {
                return Err(ConfigError::InvalidSectors(format!(
                    "{:?} ends at {} but {:?} starts at {}",
                    s.role, s.end_deg, next.role, next.start_deg
                )));
            }
        }
        let total = self.sectors.iter().map(|s| s.span()).sum::<f64>();
        if (total - 360.).abs() > 1e-6 {
            return Err(ConfigError::InvalidSectors(format!(
                "sectors cover {} degrees",
                total
            )));
        }
        Ok(())
    }

    pub fn role_for(&self, rover_angle: f64) -> Option<SectorRole> {
        self.sectors
            .iter()
            .find(|s| s.contains(rover_angle))
            .map(|s| s.role)
    }
}

/// Builds the sector map of the given frames from scratch.
///
/// Sectors the frames did not sweep stay unseen rather than clear.
pub fn build_sector_map<'a>(
    config: &SectorConfig,
    frames: impl IntoIterator<Item = &'a ScanFrame>,
) -> SectorMap {
    let mut map = SectorMap::unseen();
    for frame in frames {
        let start = normalize_degree(frame.start_angle + config.mount_offset_deg);
        let span = frame.angular_span();
        for bounds in &config.sectors {
            if bounds.overlaps(start, span) {
                map.get_mut(bounds.role).swept = true;
            }
        }
        for point in &frame.points {
            if point.intensity <= config.noise_floor {
                continue;
            }
            let angle = normalize_degree(point.angle + config.mount_offset_deg);
            if let Some(role) = config.role_for(angle) {
                map.get_mut(role).observe(point.distance, point.intensity);
            }
        }
    }
    map
}

/// Mean rotation speed and angular density of the given frames.
pub fn scan_dynamics<'a>(frames: impl IntoIterator<Item = &'a ScanFrame>) -> ScanDynamics {
    let mut n = 0usize;
    let mut speed = 0.;
    let mut density = 0.;
    for frame in frames {
        n += 1;
        speed += frame.rotation_speed;
        density += frame.angular_density();
    }
    if n == 0 {
        return ScanDynamics::default();
    }
    ScanDynamics {
        rotation_speed: speed / n as f64,
        angular_density: density / n as f64,
    }
}

/// Input of one decision cycle.
#[derive(Clone, Debug, PartialEq)]
pub struct Aggregate {
    pub sectors: SectorMap,
    pub dynamics: ScanDynamics,
    pub n_frames: usize,
}

impl Aggregate {
    /// Cycle input when no frame arrived in time.
    pub fn empty() -> Aggregate {
        Aggregate {
            sectors: SectorMap::clear(),
            dynamics: ScanDynamics::default(),
            n_frames: 0,
        }
    }
}

/// Buffers frames according to the aggregation window.
pub struct PointAggregator {
    window: AggregationWindow,
    frames: Vec<ScanFrame>,
    swept_deg: f64,
}

impl PointAggregator {
    pub fn new(window: AggregationWindow) -> PointAggregator {
        PointAggregator {
            window,
            frames: Vec::new(),
            swept_deg: 0.,
        }
    }

    /// Adds a frame and tells whether the window is complete.
    pub fn push(&mut self, frame: ScanFrame) -> bool {
        self.swept_deg += match self.frames.last() {
            Some(prev) => normalize_degree(frame.end_angle - prev.end_angle),
            None => frame.angular_span(),
        };
        self.frames.push(frame);
        self.is_ready()
    }

    pub fn is_ready(&self) -> bool {
        match self.window {
            AggregationWindow::LatestFrame => !self.frames.is_empty(),
            AggregationWindow::Revolution => {
                self.swept_deg >= 360. || self.frames.len() >= MAX_REVOLUTION_FRAMES
            }
        }
    }

    /// Summarizes the buffered frames and starts a new window.
    pub fn drain(&mut self, config: &SectorConfig) -> Aggregate {
        let aggregate = Aggregate {
            sectors: build_sector_map(config, &self.frames),
            dynamics: scan_dynamics(&self.frames),
            n_frames: self.frames.len(),
        };
        self.frames.clear();
        self.swept_deg = 0.;
        aggregate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rover_data::{ScanPoint, NO_RETURN};

    fn frame(start_angle: f64, end_angle: f64, points: Vec<(f64, u16, u8)>) -> ScanFrame {
        ScanFrame {
            rotation_speed: 3600.,
            start_angle,
            end_angle,
            points: points
                .into_iter()
                .map(|(angle, distance, intensity)| ScanPoint {
                    angle,
                    distance,
                    intensity,
                })
                .collect(),
            samples: 12,
            timestamp: 0,
        }
    }

    #[test]
    fn test_default_sectors_are_valid() {
        assert!(SectorConfig::default().validate().is_ok());
    }

    #[test]
    fn test_role_for() {
        let config = SectorConfig::default();
        assert_eq!(config.role_for(0.), Some(SectorRole::Front));
        assert_eq!(config.role_for(359.9), Some(SectorRole::Front));
        assert_eq!(config.role_for(330.), Some(SectorRole::Front));
        assert_eq!(config.role_for(30.), Some(SectorRole::FrontRight));
        assert_eq!(config.role_for(90.), Some(SectorRole::Right));
        assert_eq!(config.role_for(180.), Some(SectorRole::Rear));
        assert_eq!(config.role_for(270.), Some(SectorRole::Left));
        assert_eq!(config.role_for(315.), Some(SectorRole::FrontLeft));
    }

    #[test]
    fn test_validate_rejects_gap_and_overlap() {
        let mut config = SectorConfig::default();
        config.sectors[1].end_deg = 50.; // gap between 50 and 60
        assert!(matches!(config.validate(), Err(ConfigError::InvalidSectors(_))));

        let mut config = SectorConfig::default();
        config.sectors[1].end_deg = 70.; // overlaps with Right
        assert!(config.validate().is_err());

        let mut config = SectorConfig::default();
        config.sectors.pop();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_nearest_point_above_noise_floor() {
        let config = SectorConfig::default();
        let f = frame(
            350.,
            10.,
            vec![
                (355., 400, 5), // below the noise floor
                (0., 900, 100),
                (5., 700, 80),
                (20., 20, 20), // at the noise floor
            ],
        );
        let map = build_sector_map(&config, [&f]);
        let front = map.get(SectorRole::Front);
        assert_eq!(front.distance, 700);
        assert_eq!(front.intensity, 80);
        assert_eq!(front.n_points, 2);
        for role in [SectorRole::Left, SectorRole::Right, SectorRole::Rear] {
            assert_eq!(map.distance(role), NO_RETURN);
        }
    }

    #[test]
    fn test_unswept_sectors_are_unseen() {
        let config = SectorConfig::default();
        // 90..100 lies in the right sector only, and has no return
        let f = frame(90., 100., vec![]);
        let map = build_sector_map(&config, [&f]);
        assert!(map.get(SectorRole::Right).swept);
        assert!(map.get(SectorRole::Right).is_clear());
        for role in [SectorRole::Front, SectorRole::FrontLeft, SectorRole::Rear] {
            assert!(!map.get(role).swept);
        }

        // a sweep across 0 degree touches the front only
        let f = frame(350., 10., vec![]);
        let map = build_sector_map(&config, [&f]);
        assert!(map.get(SectorRole::Front).swept);
        assert!(!map.get(SectorRole::FrontRight).swept);
        assert!(!map.get(SectorRole::FrontLeft).swept);

        // ending exactly where the front starts does not sweep it
        let f = frame(320., 330., vec![]);
        let map = build_sector_map(&config, [&f]);
        assert!(map.get(SectorRole::FrontLeft).swept);
        assert!(!map.get(SectorRole::Front).swept);
    }

    #[test]
    fn test_mount_offset() {
        let config = SectorConfig {
            mount_offset_deg: 90.,
            ..SectorConfig::default()
        };
        let f = frame(268., 272., vec![(270., 500, 100)]);
        let map = build_sector_map(&config, [&f]);
        assert_eq!(map.distance(SectorRole::Front), 500);
    }

    #[test]
    fn test_latest_frame_window() {
        let config = SectorConfig::default();
        let mut aggregator = PointAggregator::new(AggregationWindow::LatestFrame);
        assert!(aggregator.push(frame(0., 10., vec![(5., 800, 100)])));
        let aggregate = aggregator.drain(&config);
        assert_eq!(aggregate.n_frames, 1);
        assert_eq!(aggregate.sectors.distance(SectorRole::Front), 800);
        assert_eq!(aggregate.dynamics.rotation_speed, 3600.);
        assert!(!aggregator.is_ready());
    }

    #[test]
    fn test_revolution_window() {
        let config = SectorConfig::default();
        let mut aggregator = PointAggregator::new(AggregationWindow::Revolution);
        let mut ready = false;
        let mut n = 0;
        // 36 frames of 10 degrees each
        while !ready {
            let start = (n * 10) as f64;
            let f = frame(start, start + 10., vec![(start, 1000 + n as u16, 100)]);
            ready = aggregator.push(f);
            n += 1;
            assert!(n <= 40);
        }
        assert_eq!(n, 36);
        let aggregate = aggregator.drain(&config);
        assert_eq!(aggregate.n_frames, 36);
        assert_eq!(aggregate.sectors.distance(SectorRole::Front), 1000);
        assert_eq!(aggregate.sectors.distance(SectorRole::Rear), 1015);
        for role in SectorRole::ALL {
            assert!(!aggregate.sectors.get(role).is_clear());
        }
    }

    #[test]
    fn test_scan_dynamics_of_nothing() {
        assert_eq!(scan_dynamics(&Vec::new()), ScanDynamics::default());
    }
}
