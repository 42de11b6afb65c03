//! Runtime configuration, read once from TOML at startup.
//!
//! Every field has a default, so an empty file describes an LD19 on
//! `/dev/ttyUSB0` and a Waveshare rover on `/dev/serial0`.

use crate::actuator::DriveProfile;
use crate::aggregator::{AggregationWindow, SectorConfig};
use crate::constants::{
    LIDAR_BAUD_RATE, LIDAR_MAX_DISTANCE_VALUE, ROVER_BAUD_RATE, SERIAL_TIMEOUT_MS,
};
use crate::decision::DecisionConfig;
use crate::error::{ConfigError, RoverError};
use crate::margin::MarginConfig;
use crate::packet::FrameLayout;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialConfig {
    /// Serial port name such as `/dev/ttyUSB0`.
    pub port: String,
    /// Falls back to the device default when absent.
    #[serde(default)]
    pub baud_rate: Option<u32>,
}

impl SerialConfig {
    fn new(port: &str) -> SerialConfig {
        SerialConfig {
            port: port.to_string(),
            baud_rate: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Serial read timeout of the sensing thread.
    pub read_timeout_ms: u64,
    /// A cycle without any decided frame after this long counts as stalled.
    pub cycle_timeout_ms: u64,
    /// Consecutive failed writes before the actuation thread gives up.
    pub max_write_failures: usize,
    /// Returns farther than this are dropped at decode time.
    pub max_distance_mm: u16,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            read_timeout_ms: SERIAL_TIMEOUT_MS,
            cycle_timeout_ms: 100,
            max_write_failures: 5,
            max_distance_mm: LIDAR_MAX_DISTANCE_VALUE,
        }
    }
}

impl PipelineConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_millis(self.cycle_timeout_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoverConfig {
    pub lidar: SerialConfig,
    pub rover: SerialConfig,
    pub layout: FrameLayout,
    pub aggregation: AggregationWindow,
    pub sectors: SectorConfig,
    pub margin: MarginConfig,
    pub decision: DecisionConfig,
    pub drive: DriveProfile,
    pub pipeline: PipelineConfig,
}

impl Default for RoverConfig {
    fn default() -> Self {
        RoverConfig {
            lidar: SerialConfig::new("/dev/ttyUSB0"),
            rover: SerialConfig::new("/dev/serial0"),
            layout: FrameLayout::default(),
            aggregation: AggregationWindow::default(),
            sectors: SectorConfig::default(),
            margin: MarginConfig::default(),
            decision: DecisionConfig::default(),
            drive: DriveProfile::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl RoverConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(text: &str) -> Result<RoverConfig, ConfigError> {
        let config: RoverConfig =
            toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<RoverConfig, RoverError> {
        let text = std::fs::read_to_string(path)?;
        Ok(RoverConfig::from_toml_str(&text)?)
    }

    pub fn lidar_baud_rate(&self) -> u32 {
        self.lidar.baud_rate.unwrap_or(LIDAR_BAUD_RATE)
    }

    pub fn rover_baud_rate(&self) -> u32 {
        self.rover.baud_rate.unwrap_or(ROVER_BAUD_RATE)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_layout(&self.layout)?;
        self.sectors.validate()?;
        self.margin.validate()?;
        self.decision.validate()?;
        if (self.decision.critical_stop_mm as f64) >= self.margin.minimum_mm {
            return Err(ConfigError::InvalidValue {
                field: "critical_stop_mm",
                reason: format!(
                    "must be below the minimum safety margin ({} mm)",
                    self.margin.minimum_mm
                ),
            });
        }
        if self.pipeline.read_timeout_ms == 0 || self.pipeline.cycle_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pipeline",
                reason: "timeouts must be positive".to_string(),
            });
        }
        if self.pipeline.max_write_failures == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_write_failures",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

fn validate_layout(layout: &FrameLayout) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidValue {
        field: "layout",
        reason: reason.to_string(),
    };
    if layout.n_points() == 0 {
        return Err(invalid("ver_len must encode at least one point"));
    }
    if layout.point_size < 3 || layout.trailer_size < 5 {
        return Err(invalid("points need 3 bytes and the trailer 5 bytes"));
    }
    let header_fields = [layout.speed_offset, layout.start_angle_offset];
    if header_fields.iter().any(|o| *o < 2 || o + 2 > layout.points_offset) {
        return Err(invalid("speed and start angle must sit between the header and the points"));
    }
    Ok(())
}
