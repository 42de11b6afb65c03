use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Scan dynamics of the frames a decision is based on.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ScanDynamics {
    /// Rotation speed in degree per second.
    pub rotation_speed: f64,
    /// Samples per degree.
    pub angular_density: f64,
}

/// Parameters of the adaptive safety margin, all distances in mm.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarginConfig {
    /// Margin before speed and density adjustments.
    pub baseline_mm: f64,
    /// Added margin per degree/second of rotation speed.
    pub speed_gain_mm_per_dps: f64,
    /// Removed margin per sample/degree of angular density.
    pub density_gain_mm_per_ppd: f64,
    /// Stopping-distance floor of the rover.
    pub minimum_mm: f64,
    pub maximum_mm: f64,
}

impl Default for MarginConfig {
    fn default() -> Self {
        MarginConfig {
            baseline_mm: 900.,
            speed_gain_mm_per_dps: 0.1,
            density_gain_mm_per_ppd: 100.,
            minimum_mm: 300.,
            maximum_mm: 2000.,
        }
    }
}

impl MarginConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let finite = [
            self.baseline_mm,
            self.speed_gain_mm_per_dps,
            self.density_gain_mm_per_ppd,
            self.minimum_mm,
            self.maximum_mm,
        ]
        .iter()
        .all(|v| v.is_finite());
        if !finite {
            return Err(ConfigError::InvalidMargin("values must be finite".to_string()));
        }
        if self.speed_gain_mm_per_dps < 0. || self.density_gain_mm_per_ppd < 0. {
            return Err(ConfigError::InvalidMargin("gains must not be negative".to_string()));
        }
        if self.minimum_mm <= 0. || self.minimum_mm > self.maximum_mm {
            return Err(ConfigError::InvalidMargin(format!(
                "expected 0 < minimum ({}) <= maximum ({})",
                self.minimum_mm, self.maximum_mm
            )));
        }
        Ok(())
    }
}

/// Computes the safety margin (mm) for the given scan dynamics.
///
/// Non-decreasing in rotation speed, non-increasing in angular density, and
/// always within `[minimum_mm, maximum_mm]`.
pub fn safety_margin(config: &MarginConfig, dynamics: &ScanDynamics) -> f64 {
    let speed = dynamics.rotation_speed.max(0.);
    let density = dynamics.angular_density.max(0.);
    let margin = config.baseline_mm + config.speed_gain_mm_per_dps * speed
        - config.density_gain_mm_per_ppd * density;
    margin.clamp(config.minimum_mm, config.maximum_mm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn dynamics(rotation_speed: f64, angular_density: f64) -> ScanDynamics {
        ScanDynamics {
            rotation_speed,
            angular_density,
        }
    }

    #[test]
    fn test_nominal_ld19_margin() {
        // 10 Hz, 12 points over roughly 9.6 degrees
        let margin = safety_margin(&MarginConfig::default(), &dynamics(3600., 1.25));
        assert!((margin - 1135.).abs() < 1e-9);
    }

    #[test]
    fn test_margin_is_clamped() {
        let config = MarginConfig::default();
        assert_eq!(safety_margin(&config, &dynamics(100_000., 0.)), 2000.);
        assert_eq!(safety_margin(&config, &dynamics(0., 100.)), 300.);
        assert_eq!(safety_margin(&config, &dynamics(-5., -5.)), 900.);
    }

    #[test]
    fn test_validate() {
        assert!(MarginConfig::default().validate().is_ok());

        let config = MarginConfig {
            speed_gain_mm_per_dps: -1.,
            ..MarginConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidMargin(_))));

        let config = MarginConfig {
            minimum_mm: 3000.,
            ..MarginConfig::default()
        };
        assert!(config.validate().is_err());

        let config = MarginConfig {
            baseline_mm: f64::NAN,
            ..MarginConfig::default()
        };
        assert!(config.validate().is_err());
    }

    proptest! {
        #[test]
        fn margin_non_decreasing_in_speed(
            speed in 0.0..20_000.0f64,
            delta in 0.0..5_000.0f64,
            density in 0.0..10.0f64,
        ) {
            let config = MarginConfig::default();
            let slow = safety_margin(&config, &dynamics(speed, density));
            let fast = safety_margin(&config, &dynamics(speed + delta, density));
            prop_assert!(fast >= slow);
        }

        #[test]
        fn margin_non_increasing_in_density(
            speed in 0.0..20_000.0f64,
            density in 0.0..10.0f64,
            delta in 0.0..10.0f64,
        ) {
            let config = MarginConfig::default();
            let sparse = safety_margin(&config, &dynamics(speed, density));
            let dense = safety_margin(&config, &dynamics(speed, density + delta));
            prop_assert!(dense <= sparse);
        }

        #[test]
        fn margin_within_bounds(speed in -1e6..1e6f64, density in -1e3..1e3f64) {
            let config = MarginConfig::default();
            let margin = safety_margin(&config, &dynamics(speed, density));
            prop_assert!(margin >= config.minimum_mm && margin <= config.maximum_mm);
        }
    }
}
